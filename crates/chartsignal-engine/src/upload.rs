use serde_json::json;

use chartsignal_contracts::analysis::ResultPanel;
use chartsignal_contracts::errors::ChartError;
use chartsignal_contracts::events::{payload, EventWriter};
use chartsignal_contracts::ui::{
    click_target, UploadWidget, WidgetCommand, WidgetEvent, WidgetState, ANALYSIS_FAILED_MESSAGE,
};
use chartsignal_contracts::upload::{ChartFile, UploadedImage};

use crate::gateway::AnalysisGateway;
use crate::render::ResultRenderer;
use crate::view::{Notifier, ResultView, UploadView};

#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// Failed validation; nothing was stored or sent.
    Rejected(ChartError),
    Rendered(ResultPanel),
    Failed(ChartError),
}

/// Owns the upload widget and the last accepted image.
#[derive(Debug)]
pub struct UploadController {
    widget: UploadWidget,
    stored: Option<UploadedImage>,
    events: EventWriter,
}

impl UploadController {
    pub fn new(events: EventWriter) -> Self {
        Self {
            widget: UploadWidget::new(),
            stored: None,
            events,
        }
    }

    pub fn widget(&self) -> &UploadWidget {
        &self.widget
    }

    pub fn stored_image(&self) -> Option<&UploadedImage> {
        self.stored.as_ref()
    }

    /// Pushes the current widget to the view; used once at startup.
    pub fn show<V: UploadView + ?Sized>(&self, view: &mut V) {
        view.render_widget(&self.widget);
    }

    pub fn handle_event<V: UploadView + ResultView + Notifier + ?Sized>(
        &mut self,
        event: WidgetEvent,
        gateway: &AnalysisGateway,
        renderer: &ResultRenderer,
        view: &mut V,
    ) -> Option<UploadOutcome> {
        let event = match event {
            WidgetEvent::Click(control) => WidgetEvent::Click(click_target(control)),
            other => other,
        };
        let tracks_drag = matches!(
            event,
            WidgetEvent::DragOver | WidgetEvent::DragLeave | WidgetEvent::Drop(_)
        );
        let command = self.widget.dispatch(event);
        if tracks_drag {
            view.set_dragover(self.widget.is_dragover());
        }

        match command? {
            WidgetCommand::OpenFilePicker => {
                let file = view.open_file_picker()?;
                self.handle_event(WidgetEvent::FileChosen(file), gateway, renderer, view)
            }
            WidgetCommand::AcceptFile(file) => Some(self.accept_file(file, gateway, renderer, view)),
            WidgetCommand::Retry => {
                self.transition(WidgetState::Idle, view);
                None
            }
        }
    }

    pub fn accept_file<V: UploadView + ResultView + Notifier + ?Sized>(
        &mut self,
        file: ChartFile,
        gateway: &AnalysisGateway,
        renderer: &ResultRenderer,
        view: &mut V,
    ) -> UploadOutcome {
        if let Err(err) = file.validate() {
            self.events.record(
                "upload_rejected",
                payload(json!({
                    "file": file.name,
                    "media_type": file.media_type,
                    "bytes": file.size(),
                    "reason": err.to_string(),
                })),
            );
            view.alert(&err.to_string());
            return UploadOutcome::Rejected(err);
        }

        self.transition(WidgetState::Loading, view);
        let image = file.to_data_url();
        self.events.record(
            "upload_accepted",
            payload(json!({
                "file": file.name,
                "media_type": file.media_type,
                "bytes": file.size(),
                "image": image.fingerprint(),
            })),
        );
        self.stored = Some(image.clone());

        match gateway.quick_analyze(&image) {
            Ok(result) => {
                let panel = renderer.render(&result, view);
                self.transition(WidgetState::Idle, view);
                UploadOutcome::Rendered(panel)
            }
            Err(err) => {
                self.transition(WidgetState::Error(ANALYSIS_FAILED_MESSAGE.to_string()), view);
                UploadOutcome::Failed(err)
            }
        }
    }

    fn transition<V: UploadView + ?Sized>(&mut self, state: WidgetState, view: &mut V) {
        let from = self.widget.state().name();
        self.widget.set_state(state);
        self.events.record(
            "widget_state",
            payload(json!({
                "from": from,
                "to": self.widget.state().name(),
                "generation": self.widget.generation(),
            })),
        );
        view.render_widget(&self.widget);
    }
}
