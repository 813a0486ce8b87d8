use crate::chart::chart_title;
use crate::descriptor::{Cell, ReportDescriptor, Table, TableSource};
use crate::html::DEFAULT_PAGE_TITLE;
use crate::sections::{notes_title, DEFAULT_METRIC_LABEL, DEFAULT_METRIC_VALUE, DEFAULT_TABLE_TITLE};

pub fn render_markdown(desc: &ReportDescriptor) -> String {
    let mut s = String::new();
    let title = desc.title.as_deref().filter(|t| !t.is_empty()).unwrap_or(DEFAULT_PAGE_TITLE);
    s.push_str(&format!("# {}\n\n", title));
    if let Some(v) = desc.subtitle.as_deref().filter(|v| !v.is_empty()) { s.push_str(&format!("_{}_\n\n", v)); }
    if let Some(v) = desc.summary.as_deref().filter(|v| !v.is_empty()) { s.push_str(&format!("{}\n\n", v)); }

    if !desc.metrics().is_empty() {
        s.push_str("## Key Metrics\n");
        for m in desc.metrics() {
            let field = |c: &Option<Cell>, d: &str| c.as_ref().and_then(Cell::truthy_text).unwrap_or_else(|| d.to_string());
            let delta = field(&m.delta, "");
            let delta = if delta.is_empty() { String::new() } else { format!(" ({})", delta) };
            s.push_str(&format!("- {}: {}{}\n", field(&m.label, DEFAULT_METRIC_LABEL), field(&m.value, DEFAULT_METRIC_VALUE), delta));
        }
        s.push('\n');
    }

    for (i, chart) in desc.charts() {
        s.push_str(&format!("## {}\n", chart_title(chart, i)));
        let series = chart.series.as_deref().unwrap_or_default();
        let labels = chart.labels.as_deref().unwrap_or_default();
        let rows = series.iter().map(|x| x.data.as_ref().map_or(0, Vec::len)).max().unwrap_or(0).max(labels.len());
        if series.is_empty() || rows == 0 { s.push_str("No data\n\n"); continue; }
        let mut header = vec![String::new()];
        for (j, x) in series.iter().enumerate() { header.push(x.label.clone().filter(|l| !l.is_empty()).unwrap_or_else(|| format!("Series {}", j + 1))); }
        let body: Vec<Vec<String>> = (0..rows).map(|r| {
            let mut row = vec![labels.get(r).map(Cell::text).unwrap_or_default()];
            for x in series { row.push(x.data.as_ref().and_then(|d| d.get(r).copied().flatten()).map(|v| v.to_string()).unwrap_or_default()); }
            row
        }).collect();
        push_grid(&mut s, &header, &body);
    }

    match desc.table_source() {
        TableSource::Plural(tables) => { for t in tables.iter().filter(|t| t.is_renderable()) { push_table(&mut s, t); } }
        TableSource::Singular(t) => push_table(&mut s, t),
        TableSource::None => {}
    }

    if !desc.notes().is_empty() {
        s.push_str(&format!("## {}\n", notes_title(desc)));
        for n in desc.notes() { s.push_str(&format!("- {}\n", n.text().replace('\n', " "))); }
        s.push('\n');
    }
    s
}

fn push_table(s: &mut String, t: &Table) {
    let (Some(columns), Some(rows)) = (t.columns.as_ref(), t.rows.as_ref()) else { return };
    s.push_str(&format!("## {}\n", t.title.as_deref().filter(|v| !v.is_empty()).unwrap_or(DEFAULT_TABLE_TITLE)));
    let header: Vec<String> = columns.iter().map(Cell::text).collect();
    let body: Vec<Vec<String>> = rows.iter().map(|r| r.iter().map(Cell::text).collect()).collect();
    push_grid(s, &header, &body);
}

fn push_grid(s: &mut String, header: &[String], body: &[Vec<String>]) {
    let width = body.iter().map(Vec::len).max().unwrap_or(0).max(header.len()).max(1);
    let line = |cells: &[String]| {
        let mut out = String::from("|");
        for i in 0..width { out.push_str(&format!(" {} |", cells.get(i).map(|c| cell(c)).unwrap_or_default())); }
        out.push('\n');
        out
    };
    s.push_str(&line(header));
    s.push('|');
    for _ in 0..width { s.push_str(" --- |"); }
    s.push('\n');
    for r in body { s.push_str(&line(r)); }
    s.push('\n');
}

fn cell(v: &str) -> String { v.replace('|', "\\|").replace('\n', " ") }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse_descriptor;

    #[test]
    fn full_report() {
        let d = parse_descriptor(r#"{"title":"Q3","summary":"All green","metrics":[{"label":"Latency","value":"122ms","delta":"-4%"},{}],
            "charts":[{"labels":["Jan","Feb"],"series":[{"label":"p50","data":[1,null]}]}],
            "tables":[{"title":"Hosts","columns":["name","state"],"rows":[["a|b","up"]]},{"columns":["x"]}],
            "table":{"columns":["legacy"],"rows":[]},"notes":["All clear"]}"#);
        let md = render_markdown(&d);
        assert!(md.starts_with("# Q3\n\nAll green\n\n## Key Metrics\n- Latency: 122ms (-4%)\n- Metric: 0\n"));
        assert!(md.contains("## Chart 1\n|  | p50 |\n| --- | --- |\n| Jan | 1 |\n| Feb |  |\n"));
        assert!(md.contains("## Hosts\n| name | state |\n| --- | --- |\n| a\\|b | up |\n"));
        assert!(!md.contains("legacy"));
        assert!(md.ends_with("## Highlights\n- All clear\n\n"));
    }

    #[test]
    fn blank_series_labels_fall_back_to_position() {
        let d = parse_descriptor(r#"{"charts":[{"labels":["a"],"series":[{"label":"","data":[1]},{"data":[2]}]}]}"#);
        assert!(render_markdown(&d).contains("|  | Series 1 | Series 2 |\n"));
    }

    #[test]
    fn empty_report_has_only_a_heading() {
        assert_eq!(render_markdown(&parse_descriptor("")), "# AI Report\n\n");
    }

    #[test]
    fn legacy_table_without_plural() {
        let d = parse_descriptor(r#"{"table":{"columns":["a"],"rows":[["1"]]}}"#);
        assert!(render_markdown(&d).contains("## Details\n| a |\n| --- |\n| 1 |\n"));
    }
}
