use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use anyhow::Context;

pub const DEFAULT_TITLE: &str = "AI Report";
pub const SCREEN_FRACTION: f64 = 0.8;
pub const MAX_WIDTH: f64 = 1200.0;
pub const MAX_HEIGHT: f64 = 860.0;
pub const DEFAULT_SCREEN: Frame = Frame { x: 0.0, y: 0.0, width: 1440.0, height: 900.0 };

#[derive(Clone, Debug, PartialEq)]
pub enum Location {
    File(PathBuf),
    Url(String),
}

impl Location {
    /// `None` for an empty location.
    pub fn parse(s: &str) -> Option<Location> {
        let s = s.trim();
        if s.is_empty() { return None; }
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") { return Some(Location::Url(s.to_string())); }
        let p = PathBuf::from(s);
        Some(Location::File(std::path::absolute(&p).unwrap_or(p)))
    }

    /// Directory the viewer may read from; only local documents get one.
    pub fn access_scope(&self) -> Option<&Path> {
        match self {
            Location::File(p) => p.parent(),
            Location::Url(_) => None,
        }
    }

    pub fn to_url(&self) -> String {
        match self {
            Location::Url(u) => u.clone(),
            Location::File(p) => {
                let s = p.to_string_lossy().replace('\\', "/");
                if s.starts_with('/') { format!("file://{}", s) } else { format!("file:///{}", s) }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Frame {
    /// Viewer window: a fraction of the screen, capped, centered.
    pub fn centered_in(screen: Frame) -> Frame {
        let width = MAX_WIDTH.min(screen.width * SCREEN_FRACTION);
        let height = MAX_HEIGHT.min(screen.height * SCREEN_FRACTION);
        Frame { x: screen.x + (screen.width - width) / 2.0, y: screen.y + (screen.height - height) / 2.0, width, height }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ViewerRequest {
    pub location: Location,
    pub title: String,
    pub frame: Frame,
}

impl ViewerRequest {
    pub fn new(location: Location, title: Option<&str>, screen: Frame) -> Self {
        let title = title.filter(|t| !t.trim().is_empty()).unwrap_or(DEFAULT_TITLE).to_string();
        ViewerRequest { location, title, frame: Frame::centered_in(screen) }
    }
}

/// Displays a rendered document; nothing flows back into the renderer.
pub trait ViewerHost {
    fn open(&self, req: &ViewerRequest) -> anyhow::Result<Child>;
}

/// Opens documents with a configured app-mode browser, else the platform opener.
pub struct SystemViewer {
    pub browser: Option<String>,
}

impl SystemViewer {
    pub fn command(&self, req: &ViewerRequest) -> Command {
        let mut cmd = match self.browser.as_deref().filter(|b| !b.is_empty()) {
            Some(browser) => {
                let mut c = Command::new(browser);
                c.arg(format!("--app={}", req.location.to_url()))
                    .arg(format!("--window-size={},{}", req.frame.width.round() as i64, req.frame.height.round() as i64))
                    .arg(format!("--window-position={},{}", req.frame.x.round() as i64, req.frame.y.round() as i64));
                c
            }
            None => platform_opener(&req.location),
        };
        if let Some(dir) = req.location.access_scope() { cmd.current_dir(dir); }
        cmd
    }
}

impl ViewerHost for SystemViewer {
    fn open(&self, req: &ViewerRequest) -> anyhow::Result<Child> {
        let mut cmd = self.command(req);
        log::info!("Opening \"{}\" at {} ({}x{})", req.title, req.location.to_url(), req.frame.width, req.frame.height);
        if let Some(dir) = req.location.access_scope() { log::debug!("Viewer read access scoped to {}", dir.display()); }
        cmd.spawn().with_context(|| format!("failed to launch viewer for {}", req.location.to_url()))
    }
}

#[cfg(target_os = "windows")]
fn platform_opener(loc: &Location) -> Command {
    let target = match loc {
        Location::File(p) => {
            let s = p.to_string_lossy().into_owned();
            s.trim_start_matches("\\\\?\\").to_string()
        }
        Location::Url(u) => u.clone(),
    };
    let mut c = Command::new("cmd");
    c.args(["/C", "start", "", &target]);
    c
}

#[cfg(target_os = "macos")]
fn platform_opener(loc: &Location) -> Command {
    let mut c = Command::new("open");
    match loc { Location::File(p) => c.arg(p), Location::Url(u) => c.arg(u) };
    c
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn platform_opener(loc: &Location) -> Command {
    let mut c = Command::new("xdg-open");
    match loc { Location::File(p) => c.arg(p), Location::Url(u) => c.arg(u) };
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(w: f64, h: f64) -> Frame { Frame { x: 0.0, y: 0.0, width: w, height: h } }

    #[test]
    fn frame_is_capped_and_centered() {
        let f = Frame::centered_in(screen(1920.0, 1080.0));
        assert_eq!(f, Frame { x: 360.0, y: 110.0, width: 1200.0, height: 860.0 });
        let f = Frame::centered_in(screen(1000.0, 700.0));
        assert_eq!((f.width, f.height), (800.0, 560.0));
        assert_eq!((f.x, f.y), (100.0, 70.0));
    }

    #[test]
    fn locations() {
        assert_eq!(Location::parse("  "), None);
        assert_eq!(Location::parse("https://example.com/r.html"), Some(Location::Url("https://example.com/r.html".to_string())));
        let loc = Location::parse("out/report.html").unwrap();
        assert!(matches!(&loc, Location::File(p) if p.is_absolute()));
        assert!(loc.access_scope().unwrap().ends_with("out"));
        assert!(Location::Url("https://x".to_string()).access_scope().is_none());
    }

    #[test]
    fn title_defaults() {
        let loc = Location::Url("https://x".to_string());
        assert_eq!(ViewerRequest::new(loc.clone(), None, DEFAULT_SCREEN).title, DEFAULT_TITLE);
        assert_eq!(ViewerRequest::new(loc, Some("Q3"), DEFAULT_SCREEN).title, "Q3");
    }

    #[test]
    fn browser_app_mode_uses_the_frame() {
        let req = ViewerRequest::new(Location::Url("https://x/r.html".to_string()), None, screen(1920.0, 1080.0));
        let cmd = SystemViewer { browser: Some("chromium".to_string()) }.command(&req);
        assert_eq!(cmd.get_program(), "chromium");
        let args: Vec<String> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["--app=https://x/r.html", "--window-size=1200,860", "--window-position=360,110"]);
        assert!(cmd.get_current_dir().is_none());
    }

    #[test]
    fn local_documents_run_in_their_directory() {
        let dir = std::env::temp_dir();
        let req = ViewerRequest::new(Location::File(dir.join("r.html")), None, DEFAULT_SCREEN);
        let cmd = SystemViewer { browser: None }.command(&req);
        assert_eq!(cmd.get_current_dir(), Some(dir.as_path()));
    }
}
