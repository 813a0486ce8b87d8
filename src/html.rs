use chrono::{DateTime, Local};
use crate::actions::{wire_actions, Control};
use crate::chart::ChartBackend;
use crate::descriptor::ReportDescriptor;
use crate::document::{script_json, Element, Node, Region};
use crate::sections::{render_charts, render_metrics, render_notes, render_tables};

pub const DEFAULT_PAGE_TITLE: &str = "AI Report";

const STYLE: &str = ":root{--bg:#070a12;--panel:#0c101c;--card:#111728;--fg:#e6f3ff;--muted:#9bb0c9;--border:#1d2640;--accent:#4cc3ff;--accent2:#b44bff} \
*{box-sizing:border-box} body{margin:0;background:radial-gradient(circle at top,#10162a 0,var(--bg) 60%);color:var(--fg);font-family:-apple-system,Segoe UI,system-ui,Arial,sans-serif} \
.container{max-width:1200px;margin:0 auto;padding:28px} .header{display:flex;align-items:flex-start;justify-content:space-between;gap:16px;margin-bottom:20px} \
.title{font-size:26px;font-weight:700;letter-spacing:.2px;margin:0} .subtitle{color:var(--muted);font-size:14px;margin-top:4px} .summary{color:var(--fg);opacity:.85;font-size:14px;margin-top:10px;max-width:760px;line-height:1.5} \
.actions{display:flex;gap:8px} .btn{background:var(--card);color:var(--fg);border:1px solid var(--border);border-radius:999px;padding:8px 14px;font-size:12px;cursor:pointer} .btn:hover{border-color:var(--accent)} \
.section{margin-top:18px} .section h2{margin:0 0 10px 0;font-size:15px;font-weight:600;color:var(--muted);text-transform:uppercase;letter-spacing:.8px} \
.metric-grid{display:grid;grid-template-columns:repeat(4,minmax(0,1fr));gap:12px} .metric-card,.chart-card,.table-card,.table,.notes{background:var(--card);border:1px solid var(--border);border-radius:12px;padding:14px} \
.metric-label{color:var(--muted);font-size:12px} .metric-value{font-size:24px;font-weight:700;margin-top:4px} .metric-delta{color:#2ee6c7;font-size:12px;margin-top:2px;min-height:14px} \
.chart-grid{display:grid;grid-template-columns:repeat(2,minmax(0,1fr));gap:12px} .chart-card h3,.table-card h3,.table h3,.notes h3{margin:0 0 10px 0;font-size:15px;font-weight:600} .chart-svg{width:100%;height:auto;display:block} \
.tables{display:grid;gap:12px} table{width:100%;border-collapse:separate;border-spacing:0} th{text-align:left;color:var(--muted);font-weight:600;padding:8px 10px;border-bottom:1px solid var(--border)} \
td{padding:8px 10px;border-bottom:1px solid var(--border);vertical-align:top} tbody tr:nth-child(odd) td{background:var(--panel)} \
.notes ul{margin:0;padding-left:18px;line-height:1.6} .hidden{display:none!important} .footer{margin-top:24px;color:var(--muted);font-size:12px} \
@media (max-width:900px){.metric-grid{grid-template-columns:repeat(2,minmax(0,1fr))}.chart-grid{grid-template-columns:1fr}} @media (max-width:600px){.metric-grid{grid-template-columns:1fr}.header{flex-direction:column}} \
@media print{body{background:#fff;color:#000}.actions{display:none}.metric-card,.chart-card,.table-card,.table,.notes{border-color:#ccc;background:#fff}}";

pub struct HtmlOptions {
    pub generated_at: Option<DateTime<Local>>,
}

/// The page layout: which containers and controls the shell provides.
pub struct Page {
    pub metrics: Option<Region>,
    pub charts: Option<Region>,
    pub tables: Option<Region>,
    pub table: Option<Region>,
    pub notes: Option<Region>,
    pub print: Option<Control>,
    pub copy: Option<Control>,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            metrics: Some(Region::new("metrics", "section").with_chrome(Element::new("h2").text("Key metrics")).with_body("metric-grid")),
            charts: Some(Region::new("charts", "section chart-grid")),
            tables: Some(Region::new("tables", "section tables")),
            table: Some(Region::new("table", "section table-single")),
            notes: Some(Region::new("notes", "section notes")),
            print: Some(Control::print()),
            copy: Some(Control::copy()),
        }
    }
}

impl Page {
    /// One render pass; each section only touches its own region.
    pub fn render(&mut self, desc: &ReportDescriptor, backend: &mut dyn ChartBackend) {
        render_metrics(desc, self.metrics.as_mut());
        render_charts(desc, self.charts.as_mut(), backend);
        render_tables(desc, self.tables.as_mut(), self.table.as_mut());
        render_notes(desc, self.notes.as_mut());
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        [&self.metrics, &self.charts, &self.tables, &self.table, &self.notes].into_iter().flatten()
    }
}

pub fn render_html(desc: &ReportDescriptor, backend: &mut dyn ChartBackend, opts: &HtmlOptions) -> String {
    let mut page = Page::default();
    page.render(desc, backend);
    render_page(desc, &page, backend, opts)
}

pub fn render_page(desc: &ReportDescriptor, page: &Page, backend: &dyn ChartBackend, opts: &HtmlOptions) -> String {
    let title = desc.title.clone().filter(|t| !t.is_empty()).unwrap_or_else(|| DEFAULT_PAGE_TITLE.to_string());
    let mut head = Element::new("head")
        .child(Element::new("meta").attr("charset", "utf-8"))
        .child(Element::new("meta").attr("name", "viewport").attr("content", "width=device-width, initial-scale=1"))
        .child(Element::new("title").text(title.as_str()))
        .child(Element::new("style").child(Node::Raw(STYLE.to_string())));
    if let Some(n) = backend.head() { head.push(n); }

    let mut heading = Element::new("div").child(Element::new("h1").class("title").text(title.as_str()));
    if let Some(s) = desc.subtitle.as_ref().filter(|s| !s.is_empty()) { heading.push(Element::new("div").class("subtitle").text(s.as_str())); }
    if let Some(s) = desc.summary.as_ref().filter(|s| !s.is_empty()) { heading.push(Element::new("p").class("summary").text(s.as_str())); }
    let mut header = Element::new("header").class("header").child(heading);
    if page.print.is_some() || page.copy.is_some() {
        let mut actions = Element::new("div").class("actions");
        for c in [&page.print, &page.copy].into_iter().flatten() { actions.push(c.to_element()); }
        header.push(actions);
    }

    let mut container = Element::new("div").class("container").child(header);
    for r in page.regions() { container.push(r.to_element()); }
    let footer = match opts.generated_at { Some(t) => format!("Generated by ReportKit · {}", t.format("%Y-%m-%d %H:%M")), None => "Generated by ReportKit".to_string() };
    container.push(Element::new("div").class("footer").text(footer));

    let payload = serde_json::to_string(desc).unwrap_or_else(|_| "{}".to_string());
    let mut body = Element::new("body").child(container)
        .child(Element::new("script").id("report-data").attr("type", "application/json").child(Node::Raw(script_json(&payload))));
    if let Some(wiring) = wire_actions(desc, page.print.as_ref(), page.copy.as_ref()) { body.push(wiring); }

    let html = Element::new("html").attr("lang", "en").child(head).child(body);
    let mut s = String::from("<!DOCTYPE html>");
    html.write_html(&mut s);
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartJsBackend;
    use crate::descriptor::{from_embedded_html, parse_descriptor};
    use crate::svg::SvgBackend;

    fn opts() -> HtmlOptions { HtmlOptions { generated_at: None } }

    #[test]
    fn metrics_and_notes_only_report() {
        let d = parse_descriptor(r#"{"metrics":[{"label":"Latency","value":"122ms"}],"notes":["All clear"]}"#);
        let mut page = Page::default();
        page.render(&d, &mut ChartJsBackend::default());
        let metrics = page.metrics.as_ref().unwrap();
        assert!(!metrics.hidden);
        assert_eq!(metrics.children.len(), 1);
        for r in [&page.charts, &page.tables, &page.table] {
            let r = r.as_ref().unwrap();
            assert!(r.hidden && r.children.is_empty());
        }
        let notes = page.notes.as_ref().unwrap();
        assert!(!notes.hidden);
        let html = notes.to_element().to_html();
        assert!(html.contains("<h3>Highlights</h3><ul><li>All clear</li></ul>"));
    }

    #[test]
    fn empty_report_renders_chrome_only() {
        let html = render_html(&parse_descriptor("not json"), &mut SvgBackend, &opts());
        assert!(html.starts_with("<!DOCTYPE html><html lang=\"en\">"));
        assert!(html.contains("<h1 class=\"title\">AI Report</h1>"));
        assert!(html.contains("id=\"metrics-section\""));
        assert!(html.contains("class=\"section chart-grid hidden\" id=\"charts\""));
        assert!(html.contains("class=\"section notes hidden\" id=\"notes\""));
        assert!(!html.contains("<svg"));
        assert!(html.contains("<script id=\"report-data\" type=\"application/json\">{}</script>"));
        assert!(html.ends_with("</script></body></html>"));
    }

    #[test]
    fn embedded_payload_round_trips() {
        let d = parse_descriptor(r#"{"title":"Q3 </script><b>","summary":"All green","charts":[{"type":"bar","labels":["a"],"series":[{"label":"s","data":[1.5,null]}]}],"tables":[{"columns":["a"],"rows":[[1,"x"]]}],"notes":["n"]}"#);
        let html = render_html(&d, &mut ChartJsBackend::default(), &opts());
        assert_eq!(from_embedded_html(&html), d);
        assert!(html.contains("<h1 class=\"title\">Q3 &lt;/script&gt;&lt;b&gt;</h1>"));
        assert_eq!(html.matches("</script><b>").count(), 0);
    }

    #[test]
    fn chart_js_is_loaded_only_by_the_script_backend() {
        let d = parse_descriptor(r#"{"charts":[{"series":[{"data":[1,2]}]}]}"#);
        let js = render_html(&d, &mut ChartJsBackend { src: "chart.js".to_string() }, &opts());
        assert!(js.contains("<script src=\"chart.js\"></script>"));
        assert!(js.contains("<canvas id=\"chart-1\""));
        let svg = render_html(&d, &mut SvgBackend, &opts());
        assert!(!svg.contains("chart.js"));
        assert!(svg.contains("<svg id=\"chart-1\""));
    }

    #[test]
    fn layout_without_controls_has_no_wiring() {
        let d = parse_descriptor(r#"{"title":"Q3"}"#);
        let page = Page { print: None, copy: None, ..Default::default() };
        let html = render_page(&d, &page, &SvgBackend, &opts());
        assert!(!html.contains("class=\"actions\""));
        assert!(!html.contains("addEventListener"));
        let html = render_html(&d, &mut SvgBackend, &opts());
        assert!(html.contains("<button id=\"print-btn\""));
        assert!(html.contains("<button id=\"copy-btn\" class=\"btn\" type=\"button\">Copy summary</button>"));
    }
}
