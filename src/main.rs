use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;
use anyhow::Context;
use clap::{Parser, ValueEnum, ColorChoice, ArgAction, CommandFactory};
use clap::error::ErrorKind;
use clap_complete::Shell;
use comfy_table::{Table, ContentArrangement};
use serde::{Deserialize, Serialize};
use is_terminal::IsTerminal;
mod descriptor;
mod document;
mod chart;
mod svg;
mod sections;
mod actions;
mod html;
mod markdown;
mod viewer;

use crate::actions::{resolve_copy_text, Clipboard, CopyControl, CopyOutcome, SystemClipboard};
use crate::chart::{ChartBackend, ChartJsBackend, DEFAULT_CHART_JS_SRC};
use crate::descriptor::{Cell, HttpFetcher, ReportDescriptor, TableSource};
use crate::svg::SvgBackend;
use crate::viewer::{Frame, Location, SystemViewer, ViewerHost, ViewerRequest, DEFAULT_SCREEN};

static ENABLE_COLOR: OnceLock<bool> = OnceLock::new();

const CELL_WIDTH: usize = 48;

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OutputFmt { Text, Json, None }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
enum LogLevel { Error, Warn, Info, Debug, Trace }

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogFormat { Text, Json }

#[derive(Parser, Debug)]
#[command(
    name = "ReportKit",
    about = "Renders report data into a dark-theme HTML report",
    long_about = "Renders a report descriptor (JSON, YAML, CSV or a previously rendered page) into a self-contained dark-theme HTML report with metrics, charts, tables and notes, and opens it in a viewer window.",
    after_long_help = "Examples:\n  ReportKit --data report.json\n  ReportKit --data sales.csv --out sales.html --no-open\n  ReportKit --data report.yaml --static-charts --md-path report.md\n  ReportKit --view report.html --view-title \"Q3 Report\"\n  ReportKit --completions bash",
    color = ColorChoice::Auto
)]
struct Args {
    /// Report data (path or http(s) URL): JSON, YAML, CSV, or an HTML page with embedded report-data
    #[arg(long, short = 'd')]
    data: Option<String>,
    #[arg(long, short = 'O', default_value = "report.html")]
    out: String,
    #[arg(long)]
    md_path: Option<String>,
    #[arg(long, short = 'j')]
    json_path: Option<String>,
    /// Draw charts as inline SVG instead of loading Chart.js
    #[arg(long, default_value_t = false)]
    static_charts: bool,
    #[arg(long)]
    chart_js_src: Option<String>,
    /// Viewer window title (default: report title)
    #[arg(long, short = 't')]
    title: Option<String>,
    /// Copy the report summary to the clipboard
    #[arg(long, default_value_t = false)]
    copy: bool,
    #[arg(long, default_value_t = false)]
    no_open: bool,
    /// Chromium-style browser to open reports in app mode
    #[arg(long)]
    browser: Option<String>,
    #[arg(long)]
    screen_width: Option<u32>,
    #[arg(long)]
    screen_height: Option<u32>,
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFmt,
    /// Open an existing report (path or http(s) URL) and exit
    #[arg(long)]
    view: Option<String>,
    #[arg(long, requires = "view")]
    view_title: Option<String>,
    #[arg(long, short = 'C', default_value_t = false)]
    no_color: bool,
    #[arg(long, default_value_t = false)]
    force_color: bool,
    #[arg(long)]
    log_level: Option<LogLevel>,
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
    #[arg(long)]
    log_path: Option<String>,
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
    #[arg(short = 'q', long, default_value_t = false)]
    quiet: bool,
    #[arg(long, value_enum)]
    completions: Option<Shell>,
    #[arg(long)]
    completions_out: Option<String>,
    #[arg(long)]
    config: Option<String>,
}

impl Default for Args {
    fn default() -> Self {
        Args {
            data: None,
            out: "report.html".to_string(),
            md_path: None,
            json_path: None,
            static_charts: false,
            chart_js_src: None,
            title: None,
            copy: false,
            no_open: false,
            browser: None,
            screen_width: None,
            screen_height: None,
            output: OutputFmt::Text,
            view: None,
            view_title: None,
            no_color: false,
            force_color: false,
            log_level: None,
            log_format: None,
            log_path: None,
            verbose: 0,
            quiet: false,
            completions: None,
            completions_out: None,
            config: None,
        }
    }
}

#[derive(Deserialize, Default)]
struct AppConfig {
    out: Option<String>,
    md_path: Option<String>,
    json_path: Option<String>,
    static_charts: Option<bool>,
    chart_js_src: Option<String>,
    no_open: Option<bool>,
    browser: Option<String>,
    screen_width: Option<u32>,
    screen_height: Option<u32>,
    log_format: Option<LogFormat>,
    log_path: Option<String>,
    force_color: Option<bool>,
    output: Option<OutputFmt>,
}

fn main() {
    let mut args = Args::parse();
    if let Some(sh) = args.completions {
        let mut cmd = Args::command();
        if let Some(path) = args.completions_out.as_ref() {
            if let Ok(mut f) = std::fs::File::create(path) { clap_complete::generate(sh, &mut cmd, "ReportKit", &mut f); } else { clap_complete::generate(sh, &mut cmd, "ReportKit", &mut std::io::stdout()); }
        } else {
            clap_complete::generate(sh, &mut cmd, "ReportKit", &mut std::io::stdout());
        }
        return;
    }
    if let Some(p) = args.config.as_ref()
        && let Ok(s) = std::fs::read_to_string(p)
        && let Ok(cfg) = toml::from_str::<AppConfig>(&s) { apply_config(&mut args, cfg); }
    else {
        let def = "ReportKit.toml";
        if let Ok(s) = std::fs::read_to_string(def)
            && let Ok(cfg) = toml::from_str::<AppConfig>(&s) { apply_config(&mut args, cfg); }
    }
    init_logging(&args);
    let term = std::env::var("TERM").unwrap_or_default();
    let no_color_env = std::env::var_os("NO_COLOR").is_some();
    let color_default = std::io::stdout().is_terminal() && !no_color_env && term != "dumb";
    let enable_color = if args.force_color { true } else { color_default && !args.no_color };
    let _ = ENABLE_COLOR.set(enable_color);

    match view_request(&args) {
        Err(e) => e.exit(),
        Ok(Some(req)) => {
            if let Err(e) = viewer(&args).open(&req) {
                log::error!("{:#}", e);
                eprintln!("{}", paint(&format!("Failed to open viewer: {:#}", e), "1;31"));
                std::process::exit(1);
            }
            return;
        }
        Ok(None) => {}
    }
    if let Err(e) = require_data(&args) { e.exit(); }
    if let Err(e) = run(&args) {
        log::error!("{:#}", e);
        eprintln!("{}", paint(&format!("Error: {:#}", e), "1;31"));
        std::process::exit(1);
    }
}

fn view_request(args: &Args) -> Result<Option<ViewerRequest>, clap::Error> {
    let Some(loc) = args.view.as_ref() else { return Ok(None) };
    let location = Location::parse(loc).ok_or_else(|| Args::command().error(ErrorKind::InvalidValue, "--view needs a path or http(s) URL; usage: ReportKit --view <LOCATION> [--view-title <TITLE>]"))?;
    Ok(Some(ViewerRequest::new(location, args.view_title.as_deref(), screen_frame(args))))
}

fn require_data(args: &Args) -> Result<(), clap::Error> {
    if args.data.as_deref().is_some_and(|d| !d.trim().is_empty()) { return Ok(()); }
    Err(Args::command().error(ErrorKind::MissingRequiredArgument, "--data <PATH|URL> is required unless --view or --completions is given"))
}

fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    if let Some(f) = level_filter(args) { builder.filter_level(f); }
    if let Some(fmt) = args.log_format {
        match fmt {
            LogFormat::Json => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let ts = chrono::Local::now().to_rfc3339();
                    let obj = serde_json::json!({
                        "ts": ts,
                        "level": record.level().to_string(),
                        "target": record.target(),
                        "msg": record.args().to_string(),
                    });
                    writeln!(buf, "{}", obj)
                });
            }
            LogFormat::Text => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let ts = chrono::Local::now().format("%H:%M:%S");
                    writeln!(buf, "[{:<5} {}] {}", record.level(), ts, record.args())
                });
            }
        }
    }
    if let Some(path) = log_sink(args) {
        match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(f) => { builder.target(env_logger::Target::Pipe(Box::new(f))); }
            Err(e) => { eprintln!("Failed to open log file {}: {}", path, e); }
        }
    }
    builder.init();
}

fn level_filter(args: &Args) -> Option<log::LevelFilter> {
    if args.quiet { return Some(log::LevelFilter::Error); }
    if let Some(lvl) = args.log_level {
        return Some(match lvl { LogLevel::Error => log::LevelFilter::Error, LogLevel::Warn => log::LevelFilter::Warn, LogLevel::Info => log::LevelFilter::Info, LogLevel::Debug => log::LevelFilter::Debug, LogLevel::Trace => log::LevelFilter::Trace });
    }
    match args.verbose { 0 => None, 1 => Some(log::LevelFilter::Info), 2 => Some(log::LevelFilter::Debug), _ => Some(log::LevelFilter::Trace) }
}

fn log_sink(args: &Args) -> Option<String> {
    args.log_path.clone().or_else(|| std::env::var("REPORTKIT_LOG").ok()).filter(|p| !p.trim().is_empty())
}

fn apply_config(args: &mut Args, cfg: AppConfig) {
    if args.out == "report.html" && let Some(v) = cfg.out { args.out = v; }
    if args.md_path.is_none() && let Some(v) = cfg.md_path { args.md_path = Some(v); }
    if args.json_path.is_none() && let Some(v) = cfg.json_path { args.json_path = Some(v); }
    if let Some(v) = cfg.static_charts { args.static_charts |= v; }
    if args.chart_js_src.is_none() && let Some(v) = cfg.chart_js_src { args.chart_js_src = Some(v); }
    if let Some(v) = cfg.no_open { args.no_open |= v; }
    if args.browser.is_none() && let Some(v) = cfg.browser { args.browser = Some(v); }
    if args.screen_width.is_none() && let Some(v) = cfg.screen_width { args.screen_width = Some(v); }
    if args.screen_height.is_none() && let Some(v) = cfg.screen_height { args.screen_height = Some(v); }
    if args.log_format.is_none() && let Some(v) = cfg.log_format { args.log_format = Some(v); }
    if args.log_path.is_none() && let Some(v) = cfg.log_path { args.log_path = Some(v); }
    if let Some(v) = cfg.force_color { args.force_color |= v; }
    if args.output == OutputFmt::Text && let Some(v) = cfg.output { args.output = v; }
}

fn screen_frame(args: &Args) -> Frame {
    Frame {
        width: args.screen_width.map(f64::from).unwrap_or(DEFAULT_SCREEN.width),
        height: args.screen_height.map(f64::from).unwrap_or(DEFAULT_SCREEN.height),
        ..DEFAULT_SCREEN
    }
}

fn viewer(args: &Args) -> SystemViewer {
    SystemViewer { browser: args.browser.clone().or_else(|| std::env::var("REPORTKIT_BROWSER").ok()) }
}

fn chart_backend(args: &Args) -> Box<dyn ChartBackend> {
    if args.static_charts { return Box::new(SvgBackend); }
    Box::new(ChartJsBackend { src: args.chart_js_src.clone().unwrap_or_else(|| DEFAULT_CHART_JS_SRC.to_string()) })
}

fn viewer_title(args: &Args, desc: &ReportDescriptor) -> Option<String> {
    args.title.clone().or_else(|| desc.title.clone()).filter(|t| !t.trim().is_empty())
}

fn run(args: &Args) -> anyhow::Result<()> {
    let data = args.data.as_deref().context("no report data given")?;
    let desc = crate::descriptor::load_data(data, &HttpFetcher::default())?;
    log::info!("Loaded report data from {}: {} metric(s), {} chart(s), {} note(s)", data, desc.metrics().len(), desc.charts().len(), desc.notes().len());

    let mut backend = chart_backend(args);
    let html = crate::html::render_html(&desc, backend.as_mut(), &crate::html::HtmlOptions { generated_at: Some(chrono::Local::now()) });
    let out = PathBuf::from(&args.out);
    if let Some(dir) = out.parent() && !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    std::fs::write(&out, html).with_context(|| format!("failed to write {}", out.display()))?;
    if !args.quiet && args.output == OutputFmt::Text { println!("{}", paint(&format!("HTML generated: {}", out.display()), "1;36")); }

    if let Some(p) = args.md_path.as_ref() {
        match std::fs::write(p, crate::markdown::render_markdown(&desc)) {
            Ok(_) => { if !args.quiet && args.output == OutputFmt::Text { println!("{}", paint(&format!("Markdown written: {}", p), "1;36")); } }
            Err(e) => log::error!("Markdown write failed for {}: {}", p, e),
        }
    }
    if let Some(p) = args.json_path.as_ref() {
        match write_json(p, &desc) {
            Ok(_) => { if !args.quiet && args.output == OutputFmt::Text { println!("{}", paint(&format!("JSON written: {}", p), "1;36")); } }
            Err(e) => log::error!("{:#}", e),
        }
    }

    let mut control = CopyControl::default();
    let copied = if args.copy { Some(copy_summary(&desc, &mut control, &mut SystemClipboard, Instant::now())) } else { None };
    match args.output {
        OutputFmt::Text => { if !args.quiet { print_text(&desc); } }
        OutputFmt::Json => println!("{}", serde_json::to_string_pretty(&run_summary(&desc, &out, copied))?),
        OutputFmt::None => {}
    }
    if copied == Some(CopyOutcome::Failed) { log::warn!("Summary was not copied"); }

    if !args.no_open {
        let location = Location::File(std::path::absolute(&out).unwrap_or(out.clone()));
        let req = ViewerRequest::new(location, viewer_title(args, &desc).as_deref(), screen_frame(args));
        if let Err(e) = viewer(args).open(&req) { log::error!("{:#}", e); }
    }
    control.tick(Instant::now());
    if let Some(at) = control.pending_revert() { log::debug!("Copy control shows \"{}\" for another {} ms", control.label(), at.saturating_duration_since(Instant::now()).as_millis()); }
    Ok(())
}

fn write_json(path: &str, desc: &ReportDescriptor) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(desc).context("failed to serialize report data")?;
    std::fs::write(path, body).with_context(|| format!("JSON write failed for {}", path))
}

fn copy_summary(desc: &ReportDescriptor, control: &mut CopyControl, clipboard: &mut dyn Clipboard, now: Instant) -> CopyOutcome {
    let outcome = control.activate(resolve_copy_text(desc).as_deref(), clipboard, now);
    match outcome {
        CopyOutcome::Copied => log::info!("Summary copied; control shows \"{}\"", control.label()),
        CopyOutcome::Nothing => log::info!("Nothing to copy: report has no title, summary or copyText"),
        CopyOutcome::Failed => {}
    }
    outcome
}

fn run_summary(desc: &ReportDescriptor, out: &Path, copied: Option<CopyOutcome>) -> serde_json::Value {
    let tables = match desc.table_source() {
        TableSource::Plural(t) => t.iter().filter(|t| t.is_renderable()).count(),
        TableSource::Singular(_) => 1,
        TableSource::None => 0,
    };
    serde_json::json!({
        "html": out.to_string_lossy(),
        "title": desc.title.clone().filter(|t| !t.is_empty()).unwrap_or_else(|| crate::html::DEFAULT_PAGE_TITLE.to_string()),
        "metrics": desc.metrics().len(),
        "charts": desc.charts().len(),
        "tables": tables,
        "notes": desc.notes().len(),
        "copied": copied.map(|c| c == CopyOutcome::Copied),
    })
}

fn print_text(desc: &ReportDescriptor) {
    let title = desc.title.as_deref().filter(|t| !t.is_empty()).unwrap_or(crate::html::DEFAULT_PAGE_TITLE);
    println!("{}", paint(title, "1"));
    if let Some(s) = desc.subtitle.as_deref().filter(|s| !s.is_empty()) { println!("{}", paint(s, "2")); }
    if let Some(s) = desc.summary.as_deref().filter(|s| !s.is_empty()) { println!("{}", s); }
    if let Some(t) = metrics_table(desc) { println!("{}", paint("Key Metrics:", "1")); println!("{}", t); }
    for (i, c) in desc.charts() {
        let series = c.series.as_ref().map_or(0, Vec::len);
        println!("{} {} ({}, {} series)", paint("Chart:", "1"), crate::chart::chart_title(c, i), c.kind.as_deref().filter(|k| !k.is_empty()).unwrap_or(crate::chart::DEFAULT_CHART_TYPE), series);
    }
    for (heading, t) in data_tables(desc) { println!("{}", paint(&format!("{}:", heading), "1")); println!("{}", t); }
    if !desc.notes().is_empty() {
        println!("{}", paint(&format!("{}:", crate::sections::notes_title(desc)), "1"));
        for n in desc.notes() { println!("- {}", n.text()); }
    }
}

fn metrics_table(desc: &ReportDescriptor) -> Option<Table> {
    if desc.metrics().is_empty() { return None; }
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![paint("Metric", "1"), paint("Value", "1"), paint("Delta", "1")]);
    for m in desc.metrics() {
        let field = |c: &Option<Cell>, d: &str| c.as_ref().and_then(Cell::truthy_text).unwrap_or_else(|| d.to_string());
        table.add_row(vec![
            truncate(&field(&m.label, crate::sections::DEFAULT_METRIC_LABEL), CELL_WIDTH),
            truncate(&field(&m.value, crate::sections::DEFAULT_METRIC_VALUE), CELL_WIDTH),
            truncate(&field(&m.delta, ""), CELL_WIDTH),
        ]);
    }
    Some(table)
}

fn data_tables(desc: &ReportDescriptor) -> Vec<(String, Table)> {
    let source: Vec<&crate::descriptor::Table> = match desc.table_source() {
        TableSource::Plural(t) => t.iter().filter(|t| t.is_renderable()).collect(),
        TableSource::Singular(t) => vec![t],
        TableSource::None => Vec::new(),
    };
    source.into_iter().filter_map(|t| {
        let (columns, rows) = (t.columns.as_ref()?, t.rows.as_ref()?);
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(columns.iter().map(|c| paint(&c.text(), "1")).collect::<Vec<_>>());
        for r in rows { table.add_row(r.iter().map(|c| truncate(&c.text(), CELL_WIDTH)).collect::<Vec<_>>()); }
        let heading = t.title.clone().filter(|v| !v.is_empty()).unwrap_or_else(|| crate::sections::DEFAULT_TABLE_TITLE.to_string());
        Some((heading, table))
    }).collect()
}

fn truncate(s: &str, n: usize) -> String {
    let mut out: String = s.chars().take(n).collect();
    if s.chars().count() > n { out.push_str("..."); }
    out
}

fn paint(s: &str, code: &str) -> String {
    if *ENABLE_COLOR.get().unwrap_or(&true) { format!("\x1b[{}m{}\x1b[0m", code, s) } else { s.to_string() }
}
