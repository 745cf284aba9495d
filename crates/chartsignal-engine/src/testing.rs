//! Fakes shared by the engine unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use indexmap::IndexMap;

use chartsignal_contracts::analysis::ResultPanel;
use chartsignal_contracts::events::EventWriter;
use chartsignal_contracts::models::{ModelRegistry, ModelSelector, ModelSpec};
use chartsignal_contracts::ui::{AuthButtons, Modal, ModalKind, UploadWidget};
use chartsignal_contracts::upload::ChartFile;

use crate::gateway::AnalysisGateway;
use crate::providers::{Completion, CompletionProvider, CompletionProviderRegistry, CompletionRequest};
use crate::view::{AuthView, Notifier, ResultView, UploadView};

pub const SCRIPTED_MODEL: &str = "scripted-vision";

#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(String),
    Fail(String),
}

/// Replays canned replies in order and keeps every request it saw.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    seen: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.seen
            .lock()
            .map_err(|_| anyhow!("scripted provider lock poisoned"))?
            .push(request.clone());
        let next = self
            .script
            .lock()
            .map_err(|_| anyhow!("scripted provider lock poisoned"))?
            .pop_front();
        match next {
            Some(Scripted::Reply(content)) => Ok(Completion {
                content,
                model: request.model.clone(),
                finish_reason: Some("stop".to_string()),
            }),
            Some(Scripted::Fail(message)) => bail!("{message}"),
            None => bail!("no scripted reply left"),
        }
    }
}

pub fn scripted_gateway(script: Vec<Scripted>) -> (AnalysisGateway, ScriptedProvider) {
    let provider = ScriptedProvider::new(script);
    let mut providers = CompletionProviderRegistry::new();
    providers.register(provider.clone());
    let mut models = IndexMap::new();
    models.insert(
        SCRIPTED_MODEL.to_string(),
        ModelSpec::new(SCRIPTED_MODEL, "scripted", &["vision", "json"], None),
    );
    let selector = ModelSelector::new(Some(ModelRegistry::new(Some(models))));
    let gateway = AnalysisGateway::new(
        providers,
        selector,
        Some(SCRIPTED_MODEL.to_string()),
        EventWriter::in_memory("test-trace"),
    );
    (gateway, provider)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewCall {
    Widget(String),
    Dragover(bool),
    OpenPicker,
    ShowResults(ResultPanel),
    ReportButton(bool, String),
    ShowReport(String),
    HideReport,
    AuthButtons(AuthButtons),
    Modal(ModalKind, Modal),
    Alert(String),
}

/// Records every view call in order.
#[derive(Debug, Default)]
pub struct RecordingView {
    pub calls: Vec<ViewCall>,
    pub picker_queue: VecDeque<ChartFile>,
}

impl RecordingView {
    pub fn alerts(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ViewCall::Alert(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn widget_states(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ViewCall::Widget(state) => Some(state.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn shown_panels(&self) -> Vec<ResultPanel> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ViewCall::ShowResults(panel) => Some(panel.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_buttons(&self) -> Option<AuthButtons> {
        self.calls.iter().rev().find_map(|call| match call {
            ViewCall::AuthButtons(buttons) => Some(*buttons),
            _ => None,
        })
    }

    pub fn last_modal(&self, kind: ModalKind) -> Option<Modal> {
        self.calls.iter().rev().find_map(|call| match call {
            ViewCall::Modal(seen, modal) if *seen == kind => Some(modal.clone()),
            _ => None,
        })
    }
}

impl UploadView for RecordingView {
    fn render_widget(&mut self, widget: &UploadWidget) {
        self.calls
            .push(ViewCall::Widget(widget.state().name().to_string()));
    }

    fn set_dragover(&mut self, active: bool) {
        self.calls.push(ViewCall::Dragover(active));
    }

    fn open_file_picker(&mut self) -> Option<ChartFile> {
        self.calls.push(ViewCall::OpenPicker);
        self.picker_queue.pop_front()
    }
}

impl ResultView for RecordingView {
    fn show_results(&mut self, panel: &ResultPanel) {
        self.calls.push(ViewCall::ShowResults(panel.clone()));
    }

    fn set_report_button(&mut self, busy: bool, label: &str) {
        self.calls
            .push(ViewCall::ReportButton(busy, label.to_string()));
    }

    fn show_report(&mut self, report: &str) {
        self.calls.push(ViewCall::ShowReport(report.to_string()));
    }

    fn hide_report(&mut self) {
        self.calls.push(ViewCall::HideReport);
    }
}

impl AuthView for RecordingView {
    fn set_auth_buttons(&mut self, buttons: AuthButtons) {
        self.calls.push(ViewCall::AuthButtons(buttons));
    }

    fn render_modal(&mut self, kind: ModalKind, modal: &Modal) {
        self.calls.push(ViewCall::Modal(kind, modal.clone()));
    }
}

impl Notifier for RecordingView {
    fn alert(&mut self, message: &str) {
        self.calls.push(ViewCall::Alert(message.to_string()));
    }
}
