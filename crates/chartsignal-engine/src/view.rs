use chartsignal_contracts::analysis::ResultPanel;
use chartsignal_contracts::ui::{AuthButtons, Modal, ModalKind, UploadWidget};
use chartsignal_contracts::upload::ChartFile;

pub const REPORT_BUTTON_LABEL: &str = "Get Detailed Analysis";
pub const REPORT_BUTTON_BUSY_LABEL: &str = "Generating Report...";

/// Upload area and hidden file input.
pub trait UploadView {
    fn render_widget(&mut self, widget: &UploadWidget);
    fn set_dragover(&mut self, active: bool);
    /// Opens the native picker. `None` when the user cancels.
    fn open_file_picker(&mut self) -> Option<ChartFile>;
}

/// Results panel and the detailed report panel under it.
pub trait ResultView {
    fn show_results(&mut self, panel: &ResultPanel);
    fn set_report_button(&mut self, busy: bool, label: &str);
    fn show_report(&mut self, report: &str);
    fn hide_report(&mut self);
}

/// Header buttons and the two auth modals.
pub trait AuthView {
    fn set_auth_buttons(&mut self, buttons: AuthButtons);
    fn render_modal(&mut self, kind: ModalKind, modal: &Modal);
}

pub trait Notifier {
    fn alert(&mut self, message: &str);
}

/// Everything the page surface has to provide.
pub trait PageView: UploadView + ResultView + AuthView + Notifier {}

impl<T: UploadView + ResultView + AuthView + Notifier> PageView for T {}
