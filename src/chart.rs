use serde::Serialize;
use crate::descriptor::{Cell, Chart};
use crate::document::{script_json, Element, Node};

pub const PALETTE: [&str; 5] = ["#4cc3ff", "#b44bff", "#ff4fd8", "#2ee6c7", "#6aa9ff"];
pub const FILL_ALPHA: &str = "66";
pub const LINE_TENSION: f64 = 0.35;
pub const DEFAULT_CHART_TYPE: &str = "line";
pub const CANVAS_HEIGHT: u32 = 180;
pub const DEFAULT_CHART_JS_SRC: &str = "https://cdn.jsdelivr.net/npm/chart.js@4.4.1/dist/chart.umd.min.js";

pub const DARK_THEME: ThemeOptions = ThemeOptions { legend_color: "#e6f3ff", tick_color: "#9bb0c9", grid_color: "rgba(255,255,255,0.05)" };

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeOptions {
    pub legend_color: &'static str,
    pub tick_color: &'static str,
    pub grid_color: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub label: String,
    pub data: Vec<Option<f64>>,
    pub border_color: String,
    pub background_color: String,
    pub tension: f64,
    pub fill: bool,
}

/// Everything the charting collaborator receives for one chart.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
    pub theme_options: ThemeOptions,
    /// Whether any source series carried its own label.
    #[serde(skip)]
    pub legend: bool,
}

impl ChartSpec {
    pub fn is_line(&self) -> bool { self.kind == DEFAULT_CHART_TYPE }

    /// Longest of the label list and every series, the x extent of the plot.
    pub fn point_count(&self) -> usize {
        self.datasets.iter().map(|d| d.data.len()).chain(std::iter::once(self.labels.len())).max().unwrap_or(0)
    }
}

pub fn series_color(chart_index: usize, series_index: usize) -> &'static str {
    PALETTE[(chart_index + series_index) % PALETTE.len()]
}

pub fn chart_title(chart: &Chart, index: usize) -> String {
    chart.title.clone().filter(|t| !t.is_empty()).unwrap_or_else(|| format!("Chart {}", index + 1))
}

pub fn build_chart_spec(chart: &Chart, index: usize) -> ChartSpec {
    let kind = chart.kind.clone().filter(|k| !k.is_empty()).unwrap_or_else(|| DEFAULT_CHART_TYPE.to_string());
    let fill = kind == DEFAULT_CHART_TYPE;
    let datasets = chart.series.as_deref().unwrap_or_default().iter().enumerate().map(|(j, s)| {
        let color = series_color(index, j);
        Dataset {
            label: s.label.clone().filter(|l| !l.is_empty()).unwrap_or_else(|| format!("Series {}", j + 1)),
            data: s.data.clone().unwrap_or_default(),
            border_color: color.to_string(),
            background_color: format!("{}{}", color, FILL_ALPHA),
            tension: LINE_TENSION,
            fill,
        }
    }).collect();
    let legend = chart.series.as_deref().unwrap_or_default().iter().any(|s| s.label.as_deref().is_some_and(|l| !l.is_empty()));
    ChartSpec { kind, labels: chart.labels.as_deref().unwrap_or_default().iter().map(Cell::text).collect(), datasets, theme_options: DARK_THEME, legend }
}

/// The pixel-level charting collaborator. Each call returns the nodes to
/// mount in the chart card; nothing is read back.
pub trait ChartBackend {
    /// Markup the page head needs before any chart can draw.
    fn head(&self) -> Option<Node> { None }
    fn mount(&mut self, canvas_id: &str, spec: &ChartSpec) -> Vec<Node>;
}

pub struct ChartJsBackend {
    pub src: String,
}

impl Default for ChartJsBackend {
    fn default() -> Self { ChartJsBackend { src: DEFAULT_CHART_JS_SRC.to_string() } }
}

impl ChartJsBackend {
    pub fn config(spec: &ChartSpec) -> serde_json::Value {
        let axis = serde_json::json!({
            "ticks": { "color": spec.theme_options.tick_color },
            "grid": { "color": spec.theme_options.grid_color },
        });
        serde_json::json!({
            "type": spec.kind,
            "data": { "labels": spec.labels, "datasets": spec.datasets },
            "options": {
                "responsive": true,
                "plugins": { "legend": { "labels": { "color": spec.theme_options.legend_color } } },
                "scales": { "x": axis, "y": axis },
            },
        })
    }
}

impl ChartBackend for ChartJsBackend {
    fn head(&self) -> Option<Node> {
        Some(Element::new("script").attr("src", self.src.as_str()).into())
    }

    fn mount(&mut self, canvas_id: &str, spec: &ChartSpec) -> Vec<Node> {
        let canvas = Element::new("canvas").id(canvas_id).attr("height", CANVAS_HEIGHT.to_string());
        let cfg = script_json(&Self::config(spec).to_string());
        let boot = format!("(function(){{var el=document.getElementById({});if(el&&window.Chart){{new Chart(el,{});}}}})();", serde_json::Value::from(canvas_id), cfg);
        vec![canvas.into(), Element::new("script").child(Node::Raw(boot)).into()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse_descriptor;

    fn specs(json: &str) -> Vec<ChartSpec> {
        parse_descriptor(json).charts().into_iter().map(|(i, c)| build_chart_spec(c, i)).collect()
    }

    #[test]
    fn palette_cycles_by_chart_and_series_index() {
        let json = r#"{"charts":[{"series":[{},{}]},{"series":[{},{},{},{},{}]}]}"#;
        let a = specs(json);
        for (i, spec) in a.iter().enumerate() {
            for (j, d) in spec.datasets.iter().enumerate() {
                assert_eq!(d.border_color, PALETTE[(i + j) % PALETTE.len()]);
                assert_eq!(d.background_color, format!("{}66", d.border_color));
            }
        }
        assert_eq!(a[1].datasets[4].border_color, "#4cc3ff");
        assert_eq!(a, specs(json));
    }

    #[test]
    fn only_line_charts_fill() {
        let s = specs(r#"{"charts":[{"series":[{"data":[1]}]},{"type":"bar","series":[{"data":[1]}]}]}"#);
        assert_eq!(s[0].kind, "line");
        assert!(s[0].datasets.iter().all(|d| d.fill));
        assert!(s[1].datasets.iter().all(|d| !d.fill));
        assert!(s.iter().flat_map(|c| &c.datasets).all(|d| d.tension == LINE_TENSION));
    }

    #[test]
    fn titles_and_labels_default_one_based() {
        let d = parse_descriptor(r#"{"charts":[{"title":"Revenue"},{"series":[{"label":"EU"},{}]}]}"#);
        let charts = d.charts();
        assert_eq!(chart_title(charts[0].1, 0), "Revenue");
        assert_eq!(chart_title(charts[1].1, 1), "Chart 2");
        let spec = build_chart_spec(charts[1].1, 1);
        assert_eq!(spec.datasets[0].label, "EU");
        assert_eq!(spec.datasets[1].label, "Series 2");
    }

    #[test]
    fn chart_js_config_carries_the_dark_theme() {
        let s = &specs(r#"{"charts":[{"type":"bar","labels":["Q1"],"series":[{"data":[3]}]}]}"#)[0];
        let cfg = ChartJsBackend::config(s);
        assert_eq!(cfg["type"], "bar");
        assert_eq!(cfg["options"]["plugins"]["legend"]["labels"]["color"], "#e6f3ff");
        assert_eq!(cfg["options"]["scales"]["y"]["ticks"]["color"], "#9bb0c9");
        assert_eq!(cfg["options"]["scales"]["x"]["grid"]["color"], "rgba(255,255,255,0.05)");
        assert_eq!(cfg["data"]["datasets"][0]["backgroundColor"], "#4cc3ff66");
        assert_eq!(cfg["data"]["datasets"][0]["fill"], false);
    }

    #[test]
    fn chart_js_mount_emits_canvas_and_bootstrap() {
        let s = &specs(r#"{"charts":[{"series":[{"label":"</script>","data":[1]}]}]}"#)[0];
        let nodes = ChartJsBackend::default().mount("chart-1", s);
        assert_eq!(nodes.len(), 2);
        let html: String = nodes.iter().map(|n| match n { Node::Element(e) => e.to_html(), _ => String::new() }).collect();
        assert!(html.starts_with("<canvas id=\"chart-1\" height=\"180\"></canvas><script>"));
        assert!(!html.contains("\"</script>\""));
    }
}
