use serde_json::json;

use chartsignal_contracts::analysis::{AnalysisResult, ResultPanel, UnknownSignalPolicy};
use chartsignal_contracts::errors::ChartError;
use chartsignal_contracts::events::{payload, EventWriter};
use chartsignal_contracts::upload::UploadedImage;

use crate::gateway::AnalysisGateway;
use crate::view::{Notifier, ResultView, REPORT_BUTTON_BUSY_LABEL, REPORT_BUTTON_LABEL};

pub const NO_CHART_MESSAGE: &str = "Please upload a chart first to get a detailed analysis.";
pub const REPORT_FAILED_MESSAGE: &str = "Failed to generate detailed report. Please try again.";

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultRenderer {
    policy: UnknownSignalPolicy,
}

impl ResultRenderer {
    pub fn new(policy: UnknownSignalPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> UnknownSignalPolicy {
        self.policy
    }

    /// Replaces the whole results panel and makes it visible.
    pub fn render<V: ResultView + ?Sized>(&self, result: &AnalysisResult, view: &mut V) -> ResultPanel {
        let panel = ResultPanel::project(result, self.policy);
        view.show_results(&panel);
        panel
    }
}

/// The "Get Detailed Analysis" button and the report panel it fills.
///
/// `request` blocks until the model answers, so the button shows its busy label only
/// for the length of that call.
#[derive(Debug)]
pub struct DetailedReport {
    content: Option<String>,
    events: EventWriter,
}

impl DetailedReport {
    pub fn new(events: EventWriter) -> Self {
        Self {
            content: None,
            events,
        }
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn request<V: ResultView + Notifier + ?Sized>(
        &mut self,
        stored: Option<&UploadedImage>,
        gateway: &AnalysisGateway,
        view: &mut V,
    ) -> Result<(), ChartError> {
        let Some(image) = stored else {
            view.alert(NO_CHART_MESSAGE);
            return Err(ChartError::Validation(NO_CHART_MESSAGE.to_string()));
        };

        view.set_report_button(true, REPORT_BUTTON_BUSY_LABEL);
        let outcome = gateway.detailed_analyze(image);
        view.set_report_button(false, REPORT_BUTTON_LABEL);

        match outcome {
            Ok(report) => {
                view.show_report(&report);
                self.content = Some(report);
                Ok(())
            }
            Err(err) => {
                view.alert(REPORT_FAILED_MESSAGE);
                Err(err)
            }
        }
    }

    pub fn close<V: ResultView + ?Sized>(&mut self, view: &mut V) {
        self.content = None;
        view.hide_report();
        self.events.record("report_closed", payload(json!({})));
    }
}
