use crate::chart::{build_chart_spec, chart_title, ChartBackend};
use crate::descriptor::{Cell, Metric, ReportDescriptor, Table, TableSource};
use crate::document::{Element, Region};

pub const DEFAULT_METRIC_LABEL: &str = "Metric";
pub const DEFAULT_METRIC_VALUE: &str = "0";
pub const DEFAULT_TABLE_TITLE: &str = "Details";
pub const DEFAULT_NOTES_TITLE: &str = "Highlights";
pub const PLURAL_TABLE_CLASS: &str = "table-card";
pub const SINGLE_TABLE_CLASS: &str = "table";

pub fn metric_card(metric: &Metric) -> Element {
    let field = |c: &Option<Cell>, default: &str| c.as_ref().and_then(Cell::truthy_text).unwrap_or_else(|| default.to_string());
    Element::new("div").class("metric-card")
        .child(Element::new("div").class("metric-label").text(field(&metric.label, DEFAULT_METRIC_LABEL)))
        .child(Element::new("div").class("metric-value").text(field(&metric.value, DEFAULT_METRIC_VALUE)))
        .child(Element::new("div").class("metric-delta").text(field(&metric.delta, "")))
}

pub fn render_metrics(desc: &ReportDescriptor, target: Option<&mut Region>) {
    let Some(region) = target else { return };
    let metrics = desc.metrics();
    if metrics.is_empty() { region.hide(); return; }
    for m in metrics { region.push(metric_card(m)); }
}

pub fn render_charts(desc: &ReportDescriptor, target: Option<&mut Region>, backend: &mut dyn ChartBackend) {
    let Some(region) = target else { return };
    let charts = desc.charts();
    if charts.is_empty() { region.hide(); return; }
    for &(i, chart) in &charts {
        let spec = build_chart_spec(chart, i);
        let mut card = Element::new("div").class("chart-card").child(Element::new("h3").text(chart_title(chart, i)));
        for node in backend.mount(&format!("chart-{}", i + 1), &spec) { card.push(node); }
        region.push(card);
    }
    log::debug!("Rendered {} chart(s)", charts.len());
}

/// Builds one table block; `None` when the entry lacks columns or rows.
pub fn build_table(table: &Table, class: &str) -> Option<Element> {
    let (columns, rows) = (table.columns.as_ref()?, table.rows.as_ref()?);
    let mut head_row = Element::new("tr");
    for col in columns { head_row.push(Element::new("th").text(col.text())); }
    let mut body = Element::new("tbody");
    for row in rows {
        let mut tr = Element::new("tr");
        for cell in row { tr.push(Element::new("td").text(cell.text())); }
        body.push(tr);
    }
    let heading = table.title.clone().filter(|t| !t.is_empty()).unwrap_or_else(|| DEFAULT_TABLE_TITLE.to_string());
    Some(Element::new("div").class(class)
        .child(Element::new("h3").text(heading))
        .child(Element::new("table").child(Element::new("thead").child(head_row)).child(body)))
}

pub fn render_tables(desc: &ReportDescriptor, plural: Option<&mut Region>, singular: Option<&mut Region>) {
    match desc.table_source() {
        TableSource::Plural(tables) => {
            if let Some(region) = plural {
                let mut drawn = 0;
                for (i, t) in tables.iter().enumerate() {
                    match build_table(t, PLURAL_TABLE_CLASS) {
                        Some(el) => { region.push(el); drawn += 1; }
                        None => log::debug!("Skipping table {}: missing columns or rows", i + 1),
                    }
                }
                if drawn == 0 { region.hide(); }
            }
            if let Some(region) = singular { region.hide(); }
        }
        TableSource::Singular(table) => {
            if let Some(region) = plural { region.hide(); }
            if let Some(region) = singular && let Some(el) = build_table(table, SINGLE_TABLE_CLASS) { region.push(el); }
        }
        TableSource::None => {
            if let Some(region) = plural { region.hide(); }
            if let Some(region) = singular { region.hide(); }
        }
    }
}

pub fn notes_title(desc: &ReportDescriptor) -> String {
    desc.notes_title.clone().filter(|t| !t.is_empty()).unwrap_or_else(|| DEFAULT_NOTES_TITLE.to_string())
}

pub fn render_notes(desc: &ReportDescriptor, target: Option<&mut Region>) {
    let Some(region) = target else { return };
    let notes = desc.notes();
    if notes.is_empty() { region.hide(); return; }
    let mut list = Element::new("ul");
    for n in notes { list.push(Element::new("li").text(n.text())); }
    region.push(Element::new("h3").text(notes_title(desc)));
    region.push(list);
}
