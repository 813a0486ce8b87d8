use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use crate::descriptor::ReportDescriptor;
use crate::document::{script_json, Element, Node};

pub const PRINT_CONTROL_ID: &str = "print-btn";
pub const COPY_CONTROL_ID: &str = "copy-btn";
pub const PRINT_LABEL: &str = "Print / Save PDF";
pub const COPY_LABEL: &str = "Copy summary";
pub const COPIED_LABEL: &str = "Copied";
pub const REVERT_DELAY: Duration = Duration::from_millis(1500);

/// A button the page shell may or may not include.
#[derive(Clone, Debug, PartialEq)]
pub struct Control {
    pub id: &'static str,
    pub label: &'static str,
}

impl Control {
    pub fn print() -> Self { Control { id: PRINT_CONTROL_ID, label: PRINT_LABEL } }
    pub fn copy() -> Self { Control { id: COPY_CONTROL_ID, label: COPY_LABEL } }

    pub fn to_element(&self) -> Element {
        Element::new("button").id(self.id).class("btn").attr("type", "button").text(self.label)
    }
}

/// `copyText` when given, else title and summary separated by a blank line.
pub fn resolve_copy_text(desc: &ReportDescriptor) -> Option<String> {
    if let Some(t) = desc.copy_text.as_ref() && !t.is_empty() { return Some(t.clone()); }
    let parts: Vec<&str> = [desc.title.as_deref(), desc.summary.as_deref()].into_iter().flatten().filter(|s| !s.is_empty()).collect();
    if parts.is_empty() { None } else { Some(parts.join("\n\n")) }
}

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("no clipboard utility found (tried {0})")]
    Unavailable(String),
    #[error("clipboard utility {program} failed: {source}")]
    Io { program: String, source: std::io::Error },
    #[error("clipboard utility {program} exited with {status}")]
    Rejected { program: String, status: std::process::ExitStatus },
}

pub trait Clipboard {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}

/// Writes through the platform clipboard utility.
#[derive(Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    pub fn candidates() -> Vec<(&'static str, Vec<&'static str>)> {
        if cfg!(target_os = "macos") { return vec![("pbcopy", vec![])]; }
        if cfg!(target_os = "windows") { return vec![("clip", vec![])]; }
        vec![("wl-copy", vec![]), ("xclip", vec!["-selection", "clipboard"]), ("xsel", vec!["--clipboard", "--input"])]
    }
}

impl Clipboard for SystemClipboard {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        let candidates = Self::candidates();
        for (program, args) in &candidates {
            let mut child = match Command::new(program).args(args).stdin(Stdio::piped()).stdout(Stdio::null()).stderr(Stdio::null()).spawn() {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => { log::debug!("Clipboard utility {} not found", program); continue }
                Err(e) => return Err(ClipboardError::Io { program: program.to_string(), source: e }),
            };
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(text.as_bytes()).map_err(|e| ClipboardError::Io { program: program.to_string(), source: e })?;
            }
            let status = child.wait().map_err(|e| ClipboardError::Io { program: program.to_string(), source: e })?;
            if !status.success() { return Err(ClipboardError::Rejected { program: program.to_string(), status }); }
            return Ok(());
        }
        Err(ClipboardError::Unavailable(candidates.iter().map(|(p, _)| *p).collect::<Vec<_>>().join(", ")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyOutcome { Nothing, Copied, Failed }

/// The copy control's label state with a single cancellable reversion.
#[derive(Clone, Debug)]
pub struct CopyControl {
    label: &'static str,
    revert_at: Option<Instant>,
}

impl Default for CopyControl {
    fn default() -> Self { CopyControl { label: COPY_LABEL, revert_at: None } }
}

impl CopyControl {
    pub fn label(&self) -> &'static str { self.label }

    pub fn pending_revert(&self) -> Option<Instant> { self.revert_at }

    pub fn activate(&mut self, text: Option<&str>, clipboard: &mut dyn Clipboard, now: Instant) -> CopyOutcome {
        let Some(text) = text.filter(|t| !t.is_empty()) else { return CopyOutcome::Nothing };
        match clipboard.write_text(text) {
            Ok(()) => {
                self.label = COPIED_LABEL;
                // Replaces any reversion still pending from an earlier activation.
                self.revert_at = Some(now + REVERT_DELAY);
                CopyOutcome::Copied
            }
            Err(e) => { log::error!("Clipboard copy failed: {}", e); CopyOutcome::Failed }
        }
    }

    pub fn tick(&mut self, now: Instant) {
        if let Some(at) = self.revert_at && now >= at {
            self.label = COPY_LABEL;
            self.revert_at = None;
        }
    }
}

/// Script attaching print and copy behavior to whichever controls exist.
pub fn wire_actions(desc: &ReportDescriptor, print: Option<&Control>, copy: Option<&Control>) -> Option<Node> {
    if print.is_none() && copy.is_none() { return None; }
    let mut js = String::from("(function(){");
    if let Some(p) = print {
        js.push_str(&format!("var printBtn=document.getElementById({});if(printBtn){{printBtn.addEventListener(\"click\",function(){{window.print();}});}}", js_str(p.id)));
    }
    if let Some(c) = copy {
        let text = resolve_copy_text(desc).unwrap_or_default();
        js.push_str(&format!(
            "var copyBtn=document.getElementById({id});var copyText={text};var revertTimer=null;\
if(copyBtn){{copyBtn.addEventListener(\"click\",function(){{if(!copyText){{return;}}\
if(!navigator.clipboard){{console.error(\"Clipboard copy failed\",\"clipboard unavailable\");return;}}\
navigator.clipboard.writeText(copyText).then(function(){{copyBtn.textContent={copied};\
if(revertTimer){{clearTimeout(revertTimer);}}\
revertTimer=setTimeout(function(){{copyBtn.textContent={label};revertTimer=null;}},{delay});}})\
.catch(function(error){{console.error(\"Clipboard copy failed\",error);}});}});}}",
            id = js_str(c.id), text = js_str(&text), copied = js_str(COPIED_LABEL), label = js_str(c.label), delay = REVERT_DELAY.as_millis(),
        ));
    }
    js.push_str("})();");
    Some(Element::new("script").child(Node::Raw(js)).into())
}

fn js_str(s: &str) -> String { script_json(&serde_json::Value::from(s).to_string()) }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse_descriptor;

    #[derive(Default)]
    struct FakeClipboard { written: Vec<String>, deny: bool }

    impl Clipboard for FakeClipboard {
        fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
            if self.deny { return Err(ClipboardError::Unavailable("fake".to_string())); }
            self.written.push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn copy_text_resolution() {
        let d = parse_descriptor(r#"{"title":"Q3 Report","summary":"All green"}"#);
        assert_eq!(resolve_copy_text(&d).as_deref(), Some("Q3 Report\n\nAll green"));
        let d = parse_descriptor(r#"{"title":"Q3 Report"}"#);
        assert_eq!(resolve_copy_text(&d).as_deref(), Some("Q3 Report"));
        let d = parse_descriptor(r#"{"summary":"All green","copyText":"custom"}"#);
        assert_eq!(resolve_copy_text(&d).as_deref(), Some("custom"));
        assert_eq!(resolve_copy_text(&parse_descriptor("{}")), None);
    }

    #[test]
    fn empty_copy_text_is_a_no_op() {
        let mut cb = FakeClipboard::default();
        let mut ctl = CopyControl::default();
        assert_eq!(ctl.activate(None, &mut cb, Instant::now()), CopyOutcome::Nothing);
        assert_eq!(ctl.activate(Some(""), &mut cb, Instant::now()), CopyOutcome::Nothing);
        assert!(cb.written.is_empty());
        assert_eq!(ctl.label(), COPY_LABEL);
    }

    #[test]
    fn copied_label_reverts_after_delay() {
        let mut cb = FakeClipboard::default();
        let mut ctl = CopyControl::default();
        let t0 = Instant::now();
        assert_eq!(ctl.activate(Some("Q3 Report"), &mut cb, t0), CopyOutcome::Copied);
        assert_eq!(cb.written, vec!["Q3 Report"]);
        assert_eq!(ctl.label(), COPIED_LABEL);
        ctl.tick(t0 + Duration::from_millis(1499));
        assert_eq!(ctl.label(), COPIED_LABEL);
        ctl.tick(t0 + REVERT_DELAY);
        assert_eq!(ctl.label(), COPY_LABEL);
        assert!(ctl.pending_revert().is_none());
    }

    #[test]
    fn repeated_activation_keeps_one_pending_reversion() {
        let mut cb = FakeClipboard::default();
        let mut ctl = CopyControl::default();
        let t0 = Instant::now();
        ctl.activate(Some("x"), &mut cb, t0);
        ctl.activate(Some("x"), &mut cb, t0 + Duration::from_millis(1000));
        assert_eq!(ctl.pending_revert(), Some(t0 + Duration::from_millis(2500)));
        ctl.tick(t0 + Duration::from_millis(1600));
        assert_eq!(ctl.label(), COPIED_LABEL);
        ctl.tick(t0 + Duration::from_millis(2500));
        assert_eq!(ctl.label(), COPY_LABEL);
    }

    #[test]
    fn clipboard_failure_leaves_control_unchanged() {
        let mut cb = FakeClipboard { deny: true, ..Default::default() };
        let mut ctl = CopyControl::default();
        assert_eq!(ctl.activate(Some("x"), &mut cb, Instant::now()), CopyOutcome::Failed);
        assert_eq!(ctl.label(), COPY_LABEL);
        assert!(ctl.pending_revert().is_none());
    }

    #[test]
    fn wiring_covers_only_present_controls() {
        let d = parse_descriptor(r#"{"title":"Q3 </script>"}"#);
        assert!(wire_actions(&d, None, None).is_none());
        let Some(Node::Element(script)) = wire_actions(&d, Some(&Control::print()), None) else { panic!("expected script") };
        let html = script.to_html();
        assert!(html.contains("window.print()"));
        assert!(!html.contains("copy-btn"));
        let Some(Node::Element(script)) = wire_actions(&d, None, Some(&Control::copy())) else { panic!("expected script") };
        let html = script.to_html();
        assert!(html.contains("clearTimeout(revertTimer)"));
        assert!(html.contains(",1500)"));
        assert!(html.contains("\"Q3 \\u003c/script>\""));
        assert!(!html.contains("printBtn"));
    }
}
