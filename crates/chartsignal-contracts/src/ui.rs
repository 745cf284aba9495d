//! Page-side state: the upload widget state machine, modals and auth buttons.

use serde::Serialize;

use crate::session::Session;
use crate::upload::ChartFile;

pub const LOADING_TITLE: &str = "Analyzing your chart...";
pub const ANALYSIS_FAILED_MESSAGE: &str = "Analysis failed. Please try again.";
pub const DRAGOVER_CLASS: &str = "dragover";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum WidgetState {
    Idle,
    Loading,
    Error(String),
}

impl WidgetState {
    pub fn name(&self) -> &'static str {
        match self {
            WidgetState::Idle => "idle",
            WidgetState::Loading => "loading",
            WidgetState::Error(_) => "error",
        }
    }
}

/// Interactive elements the widget can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    UploadArea,
    ChooseFileButton,
    FileInput,
    RetryButton,
}

impl Control {
    /// Buttons handle their own clicks; an area click landing on one is not forwarded.
    pub fn is_actionable_button(self) -> bool {
        matches!(self, Control::ChooseFileButton | Control::RetryButton)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Click,
    Change,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetAction {
    OpenFilePicker,
    AcceptFile,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub control: Control,
    pub trigger: Trigger,
    pub action: WidgetAction,
}

const fn bind(control: Control, trigger: Trigger, action: WidgetAction) -> Binding {
    Binding {
        control,
        trigger,
        action,
    }
}

/// Fixed markup for one widget state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetTemplate {
    pub icon: Option<&'static str>,
    pub title: String,
    pub body: String,
    pub button_label: Option<&'static str>,
}

impl WidgetTemplate {
    fn for_state(state: &WidgetState) -> Self {
        match state {
            WidgetState::Idle => Self {
                icon: Some("📊"),
                title: "Upload another chart".to_string(),
                body: "Supports PNG, JPG, JPEG files up to 10MB".to_string(),
                button_label: Some("Choose File"),
            },
            WidgetState::Loading => Self {
                icon: None,
                title: LOADING_TITLE.to_string(),
                body: "Our AI is processing your image and analyzing patterns".to_string(),
                button_label: None,
            },
            WidgetState::Error(message) => Self {
                icon: Some("❌"),
                title: "Analysis Failed".to_string(),
                body: message.clone(),
                button_label: Some("Try Again"),
            },
        }
    }
}

/// Input gestures the page forwards to the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    Click(Control),
    FileChosen(ChartFile),
    DragOver,
    DragLeave,
    Drop(Vec<ChartFile>),
}

/// What the controller should do in response to a widget event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetCommand {
    OpenFilePicker,
    AcceptFile(ChartFile),
    Retry,
}

/// The upload area. Each `set_state` replaces the template and its bindings wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadWidget {
    state: WidgetState,
    template: WidgetTemplate,
    bindings: Vec<Binding>,
    dragover: bool,
    generation: u64,
}

impl Default for UploadWidget {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadWidget {
    pub fn new() -> Self {
        let state = WidgetState::Idle;
        Self {
            template: WidgetTemplate::for_state(&state),
            bindings: bindings_for(&state),
            state,
            dragover: false,
            generation: 0,
        }
    }

    pub fn set_state(&mut self, state: WidgetState) {
        self.template = WidgetTemplate::for_state(&state);
        self.bindings = bindings_for(&state);
        self.state = state;
        self.generation += 1;
    }

    pub fn state(&self) -> &WidgetState {
        &self.state
    }

    pub fn template(&self) -> &WidgetTemplate {
        &self.template
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn is_dragover(&self) -> bool {
        self.dragover
    }

    /// Number of transitions so far; the view re-renders when it changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn action_for(&self, control: Control, trigger: Trigger) -> Option<WidgetAction> {
        self.bindings
            .iter()
            .find(|binding| binding.control == control && binding.trigger == trigger)
            .map(|binding| binding.action)
    }

    pub fn dispatch(&mut self, event: WidgetEvent) -> Option<WidgetCommand> {
        match event {
            WidgetEvent::Click(control) => {
                match self.action_for(control, Trigger::Click)? {
                    WidgetAction::OpenFilePicker => Some(WidgetCommand::OpenFilePicker),
                    WidgetAction::Retry => Some(WidgetCommand::Retry),
                    WidgetAction::AcceptFile => None,
                }
            }
            WidgetEvent::FileChosen(file) => match self.action_for(Control::FileInput, Trigger::Change)? {
                WidgetAction::AcceptFile => Some(WidgetCommand::AcceptFile(file)),
                _ => None,
            },
            WidgetEvent::DragOver => {
                self.dragover = true;
                None
            }
            WidgetEvent::DragLeave => {
                self.dragover = false;
                None
            }
            WidgetEvent::Drop(files) => {
                self.dragover = false;
                files.into_iter().next().map(WidgetCommand::AcceptFile)
            }
        }
    }

    pub fn has_control(&self, control: Control) -> bool {
        self.bindings.iter().any(|binding| binding.control == control)
    }
}

fn bindings_for(state: &WidgetState) -> Vec<Binding> {
    let file_input = bind(Control::FileInput, Trigger::Change, WidgetAction::AcceptFile);
    match state {
        WidgetState::Idle => vec![
            bind(Control::ChooseFileButton, Trigger::Click, WidgetAction::OpenFilePicker),
            file_input,
            bind(Control::UploadArea, Trigger::Click, WidgetAction::OpenFilePicker),
        ],
        WidgetState::Loading => vec![file_input],
        WidgetState::Error(_) => vec![
            bind(Control::RetryButton, Trigger::Click, WidgetAction::Retry),
            file_input,
        ],
    }
}

/// Resolves a click somewhere in the upload area to the control that handles it.
pub fn click_target(clicked: Control) -> Control {
    if clicked.is_actionable_button() {
        clicked
    } else {
        Control::UploadArea
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalKind {
    SignIn,
    SignUp,
}

impl ModalKind {
    pub fn name(self) -> &'static str {
        match self {
            ModalKind::SignIn => "signin",
            ModalKind::SignUp => "signup",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "signin" | "login" => Some(ModalKind::SignIn),
            "signup" | "register" | "getstarted" => Some(ModalKind::SignUp),
            _ => None,
        }
    }

    pub fn success_message(self) -> &'static str {
        match self {
            ModalKind::SignIn => "Signed in successfully!",
            ModalKind::SignUp => {
                "Signed up successfully! Please check your email to confirm your account."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalVisibility {
    #[default]
    Hidden,
    Shown,
}

/// One modal dialog with its inline error slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Modal {
    pub visibility: ModalVisibility,
    pub error: String,
}

impl Modal {
    pub fn open(&mut self) {
        self.visibility = ModalVisibility::Shown;
    }

    pub fn close(&mut self) {
        self.visibility = ModalVisibility::Hidden;
        self.error.clear();
    }

    pub fn is_shown(&self) -> bool {
        self.visibility == ModalVisibility::Shown
    }
}

/// Visibility of the three header auth buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthButtons {
    pub sign_in: bool,
    pub get_started: bool,
    pub logout: bool,
}

impl AuthButtons {
    pub fn for_session(session: Option<&Session>) -> Self {
        let signed_in = session.is_some();
        Self {
            sign_in: !signed_in,
            get_started: !signed_in,
            logout: signed_in,
        }
    }
}
