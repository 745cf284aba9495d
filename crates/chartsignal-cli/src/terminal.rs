use std::io::{self, BufRead, Write};
use std::path::Path;

use chartsignal_contracts::analysis::ResultPanel;
use chartsignal_contracts::ui::{AuthButtons, Modal, ModalKind, UploadWidget};
use chartsignal_contracts::upload::ChartFile;
use chartsignal_engine::files::load_chart_file;
use chartsignal_engine::view::{AuthView, Notifier, ResultView, UploadView};

/// Prints every page update to stdout. The file picker prompts for a path on stdin.
#[derive(Debug, Default)]
pub struct TerminalView {
    pub interactive: bool,
}

impl TerminalView {
    pub fn interactive() -> Self {
        Self { interactive: true }
    }
}

pub fn format_panel(panel: &ResultPanel) -> String {
    let mut lines = vec![
        format!("Signal: {} [{}]", panel.badge_text, panel.signal_class.as_str()),
        panel.confidence_text.clone(),
        format!("Reasoning: {}", panel.reasoning),
    ];
    for row in &panel.details {
        lines.push(format!("  {}: {}", row.label, row.value));
    }
    lines.join("\n")
}

fn read_path_from_stdin() -> Option<String> {
    print!("choose file> ");
    io::stdout().flush().ok()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok()?;
    let path = line.trim();
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

impl UploadView for TerminalView {
    fn render_widget(&mut self, widget: &UploadWidget) {
        let template = widget.template();
        let mut line = format!("[upload:{}] {}", widget.state().name(), template.title);
        if !template.body.is_empty() {
            line.push_str(&format!(" ({})", template.body));
        }
        if let Some(label) = template.button_label {
            line.push_str(&format!(" [{label}]"));
        }
        println!("{line}");
    }

    fn set_dragover(&mut self, active: bool) {
        println!("[upload] drag highlight {}", if active { "on" } else { "off" });
    }

    fn open_file_picker(&mut self) -> Option<ChartFile> {
        if !self.interactive {
            return None;
        }
        let path = read_path_from_stdin()?;
        match load_chart_file(Path::new(&path)) {
            Ok(file) => Some(file),
            Err(err) => {
                println!("[upload] could not read file: {err:#}");
                None
            }
        }
    }
}

impl ResultView for TerminalView {
    fn show_results(&mut self, panel: &ResultPanel) {
        println!("{}", format_panel(panel));
    }

    fn set_report_button(&mut self, busy: bool, label: &str) {
        if busy {
            println!("[report] {label}");
        }
    }

    fn show_report(&mut self, report: &str) {
        println!("[report]\n{report}");
    }

    fn hide_report(&mut self) {
        println!("[report] closed");
    }
}

impl AuthView for TerminalView {
    fn set_auth_buttons(&mut self, buttons: AuthButtons) {
        let mut visible = Vec::new();
        if buttons.sign_in {
            visible.push("Sign In");
        }
        if buttons.get_started {
            visible.push("Get Started");
        }
        if buttons.logout {
            visible.push("Logout");
        }
        println!("[auth] {}", visible.join(" | "));
    }

    fn render_modal(&mut self, kind: ModalKind, modal: &Modal) {
        let state = if modal.is_shown() { "open" } else { "closed" };
        if modal.error.is_empty() {
            println!("[modal:{}] {state}", kind.name());
        } else {
            println!("[modal:{}] {state}: {}", kind.name(), modal.error);
        }
    }
}

impl Notifier for TerminalView {
    fn alert(&mut self, message: &str) {
        println!("[alert] {message}");
    }
}
