use std::fmt::Write;
use crate::chart::{ChartBackend, ChartSpec, Dataset};
use crate::document::{escape_attr, escape_text, Node};

const WIDTH: f64 = 460.0;
const HEIGHT: f64 = 280.0;
const LEFT: f64 = 44.0;
const RIGHT: f64 = 12.0;
const TOP: f64 = 12.0;
const LEGEND_H: f64 = 18.0;
const BOTTOM: f64 = 28.0;
const GRID_LINES: usize = 4;
const PLOT_BG: &str = "#0c101c";
const BAR_GROUP_WIDTH: f64 = 0.75;

/// Renders charts as inline SVG so the page needs no script to show them.
#[derive(Default)]
pub struct SvgBackend;

impl ChartBackend for SvgBackend {
    fn mount(&mut self, canvas_id: &str, spec: &ChartSpec) -> Vec<Node> {
        vec![Node::Raw(render_svg(canvas_id, spec))]
    }
}

struct Plot { left: f64, top: f64, width: f64, height: f64, min: f64, max: f64, points: usize }

impl Plot {
    fn y(&self, v: f64) -> f64 { self.top + self.height - (v - self.min) / (self.max - self.min) * self.height }

    fn step(&self) -> f64 { self.width / self.points.max(1) as f64 }

    // Line charts span the plot edge to edge; bars sit centered in slots.
    fn line_x(&self, i: usize) -> f64 {
        if self.points <= 1 { return self.left + self.width / 2.0; }
        self.left + self.width * i as f64 / (self.points - 1) as f64
    }

    fn slot_x(&self, i: usize) -> f64 { self.left + (i as f64 + 0.5) * self.step() }
}

fn value_range(spec: &ChartSpec) -> (f64, f64) {
    let values: Vec<f64> = spec.datasets.iter().flat_map(|d| d.data.iter().flatten().copied()).filter(|v| v.is_finite()).collect();
    let mut min = values.iter().copied().fold(0.0_f64, f64::min);
    let mut max = values.iter().copied().fold(0.0_f64, f64::max);
    if (max - min).abs() < f64::EPSILON { max = min + 1.0; }
    if min > 0.0 { min = 0.0; }
    (min, max)
}

fn fmt_tick(v: f64) -> String {
    if v.fract().abs() < 1e-9 { return format!("{}", v.round() as i64); }
    let s = format!("{:.2}", v);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

pub fn render_svg(id: &str, spec: &ChartSpec) -> String {
    let legend = spec.legend && !spec.datasets.is_empty();
    let top = TOP + if legend { LEGEND_H } else { 0.0 };
    let (min, max) = value_range(spec);
    let plot = Plot { left: LEFT, top, width: WIDTH - LEFT - RIGHT, height: HEIGHT - top - BOTTOM, min, max, points: spec.point_count() };
    let theme = spec.theme_options;
    let mut s = String::new();
    let _ = write!(s, "<svg id=\"{}\" class=\"chart-svg\" viewBox=\"0 0 {} {}\" role=\"img\" xmlns=\"http://www.w3.org/2000/svg\">", escape_attr(id), WIDTH, HEIGHT);
    let _ = write!(s, "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\" rx=\"6\"/>", plot.left, plot.top, plot.width, plot.height, PLOT_BG);
    for g in 0..=GRID_LINES {
        let v = min + (max - min) * g as f64 / GRID_LINES as f64;
        let y = plot.y(v);
        let _ = write!(s, "<line x1=\"{}\" y1=\"{:.1}\" x2=\"{}\" y2=\"{:.1}\" stroke=\"{}\" stroke-width=\"1\"/>", plot.left, y, plot.left + plot.width, y, theme.grid_color);
        let _ = write!(s, "<text x=\"{}\" y=\"{:.1}\" fill=\"{}\" font-size=\"10\" text-anchor=\"end\">{}</text>", plot.left - 6.0, y + 3.0, theme.tick_color, fmt_tick(v));
    }
    for (i, label) in spec.labels.iter().enumerate() {
        let x = if spec.is_line() { plot.line_x(i) } else { plot.slot_x(i) };
        let _ = write!(s, "<text x=\"{:.1}\" y=\"{}\" fill=\"{}\" font-size=\"10\" text-anchor=\"middle\">{}</text>", x, plot.top + plot.height + 16.0, theme.tick_color, escape_text(label));
    }
    if spec.is_line() {
        for d in &spec.datasets { line_series(&mut s, &plot, d); }
    } else {
        let n = spec.datasets.len().max(1);
        let bar_w = plot.step() * BAR_GROUP_WIDTH / n as f64;
        for (k, d) in spec.datasets.iter().enumerate() {
            let offset = (k as f64 - (n as f64 - 1.0) / 2.0) * bar_w;
            for (i, v) in d.data.iter().enumerate() {
                let Some(v) = v.filter(|v| v.is_finite()) else { continue };
                let (y0, y1) = (plot.y(0.0_f64.max(min)), plot.y(v));
                let _ = write!(s, "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"{}\" stroke=\"{}\" stroke-width=\"1\"/>", plot.slot_x(i) + offset - bar_w / 2.0, y0.min(y1), bar_w, (y0 - y1).abs(), d.background_color, d.border_color);
            }
        }
    }
    if legend {
        let mut x = plot.left;
        for d in &spec.datasets {
            let _ = write!(s, "<rect x=\"{:.1}\" y=\"{}\" width=\"10\" height=\"10\" fill=\"{}\"/>", x, TOP, d.border_color);
            let _ = write!(s, "<text x=\"{:.1}\" y=\"{}\" fill=\"{}\" font-size=\"10\">{}</text>", x + 14.0, TOP + 9.0, theme.legend_color, escape_text(&d.label));
            x += 24.0 + d.label.chars().count() as f64 * 6.0;
        }
    }
    s.push_str("</svg>");
    s
}

fn line_series(s: &mut String, plot: &Plot, d: &Dataset) {
    // A missing point breaks the line into separate segments.
    let mut segments: Vec<Vec<(f64, f64)>> = vec![Vec::new()];
    for (i, v) in d.data.iter().enumerate() {
        match v.filter(|v| v.is_finite()) {
            Some(v) => if let Some(seg) = segments.last_mut() { seg.push((plot.line_x(i), plot.y(v))); },
            None => segments.push(Vec::new()),
        }
    }
    let base = plot.y(0.0_f64.max(plot.min));
    for seg in segments.iter().filter(|seg| !seg.is_empty()) {
        let pts: Vec<String> = seg.iter().map(|(x, y)| format!("{:.1},{:.1}", x, y)).collect();
        if d.fill && seg.len() > 1 {
            let (first, last) = (seg[0].0, seg[seg.len() - 1].0);
            let _ = write!(s, "<polygon points=\"{:.1},{:.1} {} {:.1},{:.1}\" fill=\"{}\" stroke=\"none\"/>", first, base, pts.join(" "), last, base, d.background_color);
        }
        if seg.len() == 1 {
            let _ = write!(s, "<circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"2.5\" fill=\"{}\"/>", seg[0].0, seg[0].1, d.border_color);
        } else {
            let _ = write!(s, "<polyline points=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"2\" stroke-linejoin=\"round\"/>", pts.join(" "), d.border_color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::build_chart_spec;
    use crate::descriptor::parse_descriptor;

    fn spec(json: &str) -> ChartSpec {
        build_chart_spec(parse_descriptor(json).charts()[0].1, 0)
    }

    #[test]
    fn line_chart_draws_filled_polyline_per_series() {
        let svg = render_svg("c1", &spec(r#"{"charts":[{"labels":["a","b","c"],"series":[{"data":[1,3,2]},{"data":[2,2,2]}]}]}"#));
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert_eq!(svg.matches("<polygon").count(), 2);
        assert!(svg.contains("stroke=\"#4cc3ff\""));
        assert!(svg.contains("fill=\"#b44bff66\""));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn gaps_split_segments() {
        let svg = render_svg("c1", &spec(r#"{"charts":[{"series":[{"data":[1,2,null,4,5]}]}]}"#));
        assert_eq!(svg.matches("<polyline").count(), 2);
    }

    #[test]
    fn bar_chart_draws_one_rect_per_point() {
        let svg = render_svg("c1", &spec(r#"{"charts":[{"type":"bar","labels":["a","b"],"series":[{"label":"EU","data":[1,2]},{"data":[3,-1]}]}]}"#));
        // background + legend swatches + bars
        assert_eq!(svg.matches("<rect").count(), 1 + 2 + 4);
        assert!(!svg.contains("<polyline"));
    }

    #[test]
    fn legend_only_when_a_series_is_labelled() {
        let unlabelled = render_svg("c1", &spec(r#"{"charts":[{"series":[{"data":[1,2]},{"label":"","data":[2,1]}]}]}"#));
        assert!(!unlabelled.contains("Series 1"));
        assert_eq!(unlabelled.matches("<rect").count(), 1);
        let labelled = render_svg("c1", &spec(r#"{"charts":[{"series":[{"data":[1,2]},{"label":"EU","data":[2,1]}]}]}"#));
        assert!(labelled.contains(">Series 1</text>"));
        assert!(labelled.contains(">EU</text>"));
    }

    #[test]
    fn labels_are_escaped_and_empty_data_draws_nothing() {
        let svg = render_svg("c1", &spec(r#"{"charts":[{"labels":["<x>"],"series":[{"label":"a&b"}]}]}"#));
        assert!(svg.contains("&lt;x&gt;"));
        assert!(svg.contains("a&amp;b"));
        assert!(!svg.contains("<polyline"));
    }

    #[test]
    fn ticks_trim_trailing_zeros() {
        assert_eq!(fmt_tick(2.0), "2");
        assert_eq!(fmt_tick(0.25), "0.25");
        assert_eq!(fmt_tick(1.5), "1.5");
    }
}
