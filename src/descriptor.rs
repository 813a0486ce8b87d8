use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use anyhow::Context;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const CSV_REPORT_TITLE: &str = "AI Report";
pub const CSV_REPORT_SUMMARY: &str = "Generated from CSV source.";
pub const CSV_TABLE_TITLE: &str = "Source data";
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

static EMBED_RE: OnceLock<Regex> = OnceLock::new();

/// A primitive JSON value rendered as text (table cells, labels, notes).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cell(pub Value);

impl Cell {
    pub fn text(&self) -> String {
        match &self.0 {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(n.as_f64().unwrap_or_default(), n),
            other => other.to_string(),
        }
    }

    /// Text of the cell unless it is falsy (null, false, 0, empty string).
    pub fn truthy_text(&self) -> Option<String> {
        match &self.0 {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) if s.is_empty() => None,
            Value::Number(n) if n.as_f64().is_some_and(|f| f == 0.0 || f.is_nan()) => None,
            _ => Some(self.text()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self { Cell(Value::String(s.to_string())) }
}

impl From<String> for Cell {
    fn from(s: String) -> Self { Cell(Value::String(s)) }
}

fn format_number(f: f64, n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() { return n.to_string(); }
    if f.fract() == 0.0 && f.abs() < 1e15 { return format!("{}", f as i64); }
    format!("{}", f)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub copy_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub notes_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_vec")]
    pub metrics: Option<Vec<Metric>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_slots")]
    pub charts: Option<Vec<Option<Chart>>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_tables")]
    pub tables: Option<Vec<Table>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub table: Option<Table>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_cells")]
    pub notes: Option<Vec<Cell>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Cell>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_cells")]
    pub labels: Option<Vec<Cell>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_vec")]
    pub series: Option<Vec<Series>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_points")]
    pub data: Option<Vec<Option<f64>>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_cells")]
    pub columns: Option<Vec<Cell>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_rows")]
    pub rows: Option<Vec<Vec<Cell>>>,
}

impl Table {
    pub fn is_renderable(&self) -> bool { self.columns.is_some() && self.rows.is_some() }
}

/// Which table container draws, decided once before either is written.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TableSource<'a> {
    Plural(&'a [Table]),
    Singular(&'a Table),
    None,
}

impl ReportDescriptor {
    pub fn table_source(&self) -> TableSource<'_> {
        if let Some(tables) = self.tables.as_deref() && !tables.is_empty() { return TableSource::Plural(tables); }
        match self.table.as_ref() {
            Some(t) if t.is_renderable() => TableSource::Singular(t),
            _ => TableSource::None,
        }
    }

    pub fn metrics(&self) -> &[Metric] { self.metrics.as_deref().unwrap_or_default() }
    /// Usable charts with their position in the source list; skipped entries keep their slot.
    pub fn charts(&self) -> Vec<(usize, &Chart)> {
        self.charts.as_deref().unwrap_or_default().iter().enumerate().filter_map(|(i, c)| c.as_ref().map(|c| (i, c))).collect()
    }
    pub fn notes(&self) -> &[Cell] { self.notes.as_deref().unwrap_or_default() }
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(Cell(v).text()),
        Some(Value::Null) | None => None,
        Some(other) => { log::debug!("Ignoring non-text value {}", other); None }
    })
}

// Structs only decode from objects; serde would otherwise map an array onto fields by position.
fn object<T: DeserializeOwned>(v: Value) -> Option<T> {
    match v {
        Value::Object(_) => serde_json::from_value(v).map_err(|e| log::debug!("Skipping malformed entry: {}", e)).ok(),
        other => { log::debug!("Skipping non-object entry {}", other); None }
    }
}

fn lenient<'de, D: Deserializer<'de>, T: DeserializeOwned>(d: D) -> Result<Option<T>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.and_then(object))
}

fn entries<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<Value>>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => Some(items),
        Some(Value::Null) | None => None,
        Some(other) => { log::debug!("Expected a list, got {}", other); None }
    })
}

fn lenient_vec<'de, D: Deserializer<'de>, T: DeserializeOwned>(d: D) -> Result<Option<Vec<T>>, D::Error> {
    Ok(entries(d)?.map(|items| items.into_iter().filter_map(object).collect()))
}

fn lenient_slots<'de, D: Deserializer<'de>, T: DeserializeOwned>(d: D) -> Result<Option<Vec<Option<T>>>, D::Error> {
    Ok(entries(d)?.map(|items| items.into_iter().map(object).collect()))
}

fn lenient_cells<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<Cell>>, D::Error> {
    Ok(entries(d)?.map(|items| items.into_iter().map(Cell).collect()))
}

// Unusable entries still count towards a non-empty `tables` list so the legacy table stays suppressed.
fn lenient_tables<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<Table>>, D::Error> {
    Ok(entries(d)?.map(|items| items.into_iter().map(|v| object(v).unwrap_or_default()).collect()))
}

fn lenient_rows<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<Vec<Cell>>>, D::Error> {
    Ok(entries(d)?.map(|rows| rows.into_iter().filter_map(|r| match r {
        Value::Array(cells) => Some(cells.into_iter().map(Cell).collect()),
        other => { log::debug!("Skipping malformed row {}", other); None }
    }).collect()))
}

fn lenient_points<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<Option<f64>>>, D::Error> {
    Ok(entries(d)?.map(|points| points.into_iter().map(|p| match p {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }).collect()))
}

fn from_value(v: Value, format: &str) -> ReportDescriptor {
    match v {
        Value::Object(_) => serde_json::from_value(v).unwrap_or_else(|e| { log::warn!("{} report data could not be decoded, rendering an empty report: {}", format, e); ReportDescriptor::default() }),
        Value::Null => ReportDescriptor::default(),
        other => { log::warn!("{} report data is not an object, rendering an empty report: {}", format, other); ReportDescriptor::default() }
    }
}

/// Parses a serialized descriptor; anything unparsable is an empty report.
pub fn parse_descriptor(text: &str) -> ReportDescriptor {
    if text.trim().is_empty() { return ReportDescriptor::default(); }
    match serde_json::from_str::<Value>(text) {
        Ok(v) => from_value(v, "JSON"),
        Err(e) => { log::warn!("Report data could not be parsed, rendering an empty report: {}", e); ReportDescriptor::default() }
    }
}

pub fn parse_yaml_descriptor(text: &str) -> ReportDescriptor {
    match serde_yaml::from_str::<Value>(text) {
        Ok(v) => from_value(v, "YAML"),
        Err(e) => { log::warn!("YAML report data could not be parsed, rendering an empty report: {}", e); ReportDescriptor::default() }
    }
}

/// Reads the `report-data` payload embedded in a rendered page.
pub fn from_embedded_html(html: &str) -> ReportDescriptor {
    let re = EMBED_RE.get_or_init(|| Regex::new(r#"(?is)<script[^>]*\bid\s*=\s*["']report-data["'][^>]*>(.*?)</script>"#).expect("report-data pattern"));
    match re.captures(html).and_then(|c| c.get(1)) {
        Some(m) => parse_descriptor(m.as_str()),
        None => { log::debug!("No embedded report-data element"); ReportDescriptor::default() }
    }
}

pub fn parse_csv_descriptor(text: &str) -> anyhow::Result<ReportDescriptor> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_reader(text.as_bytes());
    let mut records: Vec<Vec<Cell>> = Vec::new();
    for rec in rdr.records() {
        let rec = rec.context("malformed CSV record")?;
        records.push(rec.iter().map(Cell::from).collect());
    }
    let mut d = ReportDescriptor { title: Some(CSV_REPORT_TITLE.to_string()), ..Default::default() };
    if records.is_empty() {
        d.table = Some(Table { title: None, columns: Some(vec![]), rows: Some(vec![]) });
        return Ok(d);
    }
    let columns = records.remove(0);
    d.summary = Some(CSV_REPORT_SUMMARY.to_string());
    d.table = Some(Table { title: Some(CSV_TABLE_TITLE.to_string()), columns: Some(columns), rows: Some(records) });
    Ok(d)
}

fn parse_by_extension(ext: &str, text: &str, origin: &str) -> anyhow::Result<ReportDescriptor> {
    log::debug!("Loading report data from {} ({} bytes)", origin, text.len());
    match ext {
        "csv" => parse_csv_descriptor(text).with_context(|| format!("failed to read CSV {}", origin)),
        "yaml" | "yml" => Ok(parse_yaml_descriptor(text)),
        "html" | "htm" => Ok(from_embedded_html(text)),
        _ => Ok(parse_descriptor(text)),
    }
}

/// Loads a descriptor from a JSON, YAML, CSV or previously rendered HTML file.
pub fn load_source(path: &Path) -> anyhow::Result<ReportDescriptor> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read report data {}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).unwrap_or_default();
    parse_by_extension(&ext, &text, &path.display().to_string())
}

pub fn is_url(s: &str) -> bool {
    let lower = s.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Extension of the last path segment, ignoring query and fragment.
fn url_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    let last = path.split_once('/').map_or("", |(_, p)| p).rsplit('/').next().unwrap_or_default();
    last.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()).unwrap_or_default()
}

pub trait Fetch {
    fn fetch(&self, url: &str) -> anyhow::Result<String>;
}

/// Blocking HTTP(S) GET with a request timeout.
pub struct HttpFetcher {
    pub timeout: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self { HttpFetcher { timeout: FETCH_TIMEOUT } }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> anyhow::Result<String> {
        let client = reqwest::blocking::Client::builder().timeout(self.timeout).build().context("failed to build HTTP client")?;
        let resp = client.get(url).send().with_context(|| format!("failed to fetch {}", url))?;
        let resp = resp.error_for_status().with_context(|| format!("failed to fetch {}", url))?;
        resp.text().with_context(|| format!("failed to read response body from {}", url))
    }
}

pub fn load_url(url: &str, fetcher: &dyn Fetch) -> anyhow::Result<ReportDescriptor> {
    let text = fetcher.fetch(url).with_context(|| format!("failed to read report data {}", url))?;
    parse_by_extension(&url_extension(url), &text, url)
}

/// Local path or `http(s)` URL.
pub fn load_data(location: &str, fetcher: &dyn Fetch) -> anyhow::Result<ReportDescriptor> {
    if is_url(location) { load_url(location.trim(), fetcher) } else { load_source(Path::new(location)) }
}
