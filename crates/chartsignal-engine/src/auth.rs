use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response as HttpResponse};
use serde_json::{json, Value};

use chartsignal_contracts::errors::{clip, ChartError};
use chartsignal_contracts::events::{payload, EventWriter};
use chartsignal_contracts::session::{Credentials, Session, SessionEvent, SessionEventKind};
use chartsignal_contracts::ui::{AuthButtons, Modal, ModalKind};

use crate::view::{AuthView, Notifier};

pub const LOGGED_OUT_MESSAGE: &str = "Logged out successfully!";
pub const LOGOUT_FAILED_MESSAGE: &str = "Failed to log out. Please try again.";

/// Externally managed authentication.
///
/// Session changes are broadcast to every receiver handed out by `subscribe`, in the
/// order they happened.
pub trait AuthBackend: Send + Sync {
    fn name(&self) -> &str;
    fn sign_in(&self, credentials: Credentials<'_>) -> Result<Session, ChartError>;
    /// `None` when the account still needs email confirmation.
    fn sign_up(&self, credentials: Credentials<'_>) -> Result<Option<Session>, ChartError>;
    fn sign_out(&self) -> Result<(), ChartError>;
    fn current_session(&self) -> Result<Option<Session>, ChartError>;
    fn subscribe(&self) -> Receiver<SessionEvent>;
}

/// Current session plus the notification fan-out shared by the backends.
#[derive(Default)]
pub struct SessionHub {
    current: Mutex<Option<Session>>,
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
}

impl SessionHub {
    pub fn current(&self) -> Result<Option<Session>, ChartError> {
        self.current
            .lock()
            .map(|current| current.clone())
            .map_err(|_| ChartError::Auth("session store lock poisoned".to_string()))
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        let snapshot = self.current().unwrap_or_default();
        // Receivers start with the session as it is right now.
        let _ = tx.send(SessionEvent::new(SessionEventKind::InitialSession, snapshot));
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn publish(&self, kind: SessionEventKind, session: Option<Session>) {
        if let Ok(mut current) = self.current.lock() {
            *current = session.clone();
        }
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(SessionEvent::new(kind, session.clone())).is_ok());
        }
    }
}

/// Supabase GoTrue over REST.
pub struct SupabaseAuth {
    url: String,
    anon_key: String,
    http: HttpClient,
    hub: SessionHub,
}

impl SupabaseAuth {
    pub fn new(url: &str, anon_key: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("failed building Supabase HTTP client")?;
        Ok(Self {
            url: url.trim().trim_end_matches('/').to_string(),
            anon_key: anon_key.trim().to_string(),
            http,
            hub: SessionHub::default(),
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.url)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(self.endpoint(path))
            .header("apikey", &self.anon_key)
            .header("accept", "application/json")
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<Value, ChartError> {
        let response = request
            .send()
            .with_context(|| format!("Supabase {what} request failed"))
            .map_err(|err| ChartError::remote(&err))?;
        gotrue_json(response)
    }
}

fn gotrue_json(response: HttpResponse) -> Result<Value, ChartError> {
    let status = response.status();
    let body = response
        .text()
        .context("Supabase response body read failed")
        .map_err(|err| ChartError::remote(&err))?;
    if !status.is_success() {
        return Err(ChartError::Auth(gotrue_error_message(status.as_u16(), &body)));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|err| ChartError::Parse(format!("Supabase returned invalid JSON: {err}")))
}

/// Picks the human-readable message out of a GoTrue error body.
pub fn gotrue_error_message(status: u16, body: &str) -> String {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    ["error_description", "msg", "message", "error"]
        .iter()
        .filter_map(|key| parsed.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|message| !message.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("auth request failed ({status}): {}", clip(body, 256)))
}

/// Reads a session out of a token or signup response. Signup without a session (email
/// confirmation pending) yields `None`.
pub fn session_from_payload(payload: &Value) -> Option<Session> {
    let access_token = payload
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())?;
    let user = payload.get("user");
    Some(Session {
        access_token: access_token.to_string(),
        refresh_token: payload
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(str::to_string),
        user_id: user
            .and_then(|user| user.get("id"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        email: user
            .and_then(|user| user.get("email"))
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

impl AuthBackend for SupabaseAuth {
    fn name(&self) -> &str {
        "supabase"
    }

    fn sign_in(&self, credentials: Credentials<'_>) -> Result<Session, ChartError> {
        let payload = self.send(
            self.post("token?grant_type=password").json(&credentials),
            "sign-in",
        )?;
        let session = session_from_payload(&payload)
            .ok_or_else(|| ChartError::Parse("token response carried no access_token".to_string()))?;
        self.hub
            .publish(SessionEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    fn sign_up(&self, credentials: Credentials<'_>) -> Result<Option<Session>, ChartError> {
        let payload = self.send(self.post("signup").json(&credentials), "sign-up")?;
        let session = session_from_payload(&payload);
        if let Some(session) = &session {
            self.hub
                .publish(SessionEventKind::SignedIn, Some(session.clone()));
        }
        Ok(session)
    }

    fn sign_out(&self) -> Result<(), ChartError> {
        if let Some(session) = self.hub.current()? {
            self.send(
                self.post("logout").bearer_auth(&session.access_token),
                "logout",
            )?;
        }
        self.hub.publish(SessionEventKind::SignedOut, None);
        Ok(())
    }

    fn current_session(&self) -> Result<Option<Session>, ChartError> {
        self.hub.current()
    }

    fn subscribe(&self) -> Receiver<SessionEvent> {
        self.hub.subscribe()
    }
}

pub const DRYRUN_INVALID_CREDENTIALS: &str = "Invalid login credentials";
pub const DRYRUN_ALREADY_REGISTERED: &str = "User already registered";
pub const DRYRUN_MISSING_EMAIL: &str = "missing email or phone";

struct DryrunAccount {
    password: String,
    user_id: String,
}

/// In-memory accounts for running without an auth service. Sign-ups are confirmed
/// immediately but, like a confirming backend, do not start a session.
#[derive(Default)]
pub struct DryrunAuth {
    accounts: Mutex<BTreeMap<String, DryrunAccount>>,
    hub: SessionHub,
}

impl DryrunAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, email: &str, password: &str) -> Self {
        if let Ok(mut accounts) = self.accounts.lock() {
            accounts.insert(
                email.trim().to_ascii_lowercase(),
                DryrunAccount {
                    password: password.to_string(),
                    user_id: uuid::Uuid::new_v4().to_string(),
                },
            );
        }
        self
    }

    fn accounts(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, DryrunAccount>>, ChartError> {
        self.accounts
            .lock()
            .map_err(|_| ChartError::Auth("account store lock poisoned".to_string()))
    }
}

impl AuthBackend for DryrunAuth {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn sign_in(&self, credentials: Credentials<'_>) -> Result<Session, ChartError> {
        let email = credentials.email.trim().to_ascii_lowercase();
        if email.is_empty() {
            return Err(ChartError::Auth(DRYRUN_MISSING_EMAIL.to_string()));
        }
        let session = {
            let accounts = self.accounts()?;
            let Some(account) = accounts
                .get(&email)
                .filter(|account| account.password == credentials.password)
            else {
                return Err(ChartError::Auth(DRYRUN_INVALID_CREDENTIALS.to_string()));
            };
            Session {
                access_token: uuid::Uuid::new_v4().to_string(),
                refresh_token: Some(uuid::Uuid::new_v4().to_string()),
                user_id: account.user_id.clone(),
                email: Some(email),
            }
        };
        self.hub
            .publish(SessionEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    fn sign_up(&self, credentials: Credentials<'_>) -> Result<Option<Session>, ChartError> {
        let email = credentials.email.trim().to_ascii_lowercase();
        if email.is_empty() {
            return Err(ChartError::Auth(DRYRUN_MISSING_EMAIL.to_string()));
        }
        let mut accounts = self.accounts()?;
        if accounts.contains_key(&email) {
            return Err(ChartError::Auth(DRYRUN_ALREADY_REGISTERED.to_string()));
        }
        accounts.insert(
            email,
            DryrunAccount {
                password: credentials.password.to_string(),
                user_id: uuid::Uuid::new_v4().to_string(),
            },
        );
        Ok(None)
    }

    fn sign_out(&self) -> Result<(), ChartError> {
        self.hub.publish(SessionEventKind::SignedOut, None);
        Ok(())
    }

    fn current_session(&self) -> Result<Option<Session>, ChartError> {
        self.hub.current()
    }

    fn subscribe(&self) -> Receiver<SessionEvent> {
        self.hub.subscribe()
    }
}

/// Header auth buttons, the two modals, and the session feed that drives them.
pub struct AuthPanel {
    sign_in: Modal,
    sign_up: Modal,
    buttons: AuthButtons,
    receiver: Option<Receiver<SessionEvent>>,
    events: EventWriter,
}

impl AuthPanel {
    pub fn new(events: EventWriter) -> Self {
        Self {
            sign_in: Modal::default(),
            sign_up: Modal::default(),
            buttons: AuthButtons::for_session(None),
            receiver: None,
            events,
        }
    }

    pub fn buttons(&self) -> AuthButtons {
        self.buttons
    }

    pub fn modal(&self, kind: ModalKind) -> &Modal {
        match kind {
            ModalKind::SignIn => &self.sign_in,
            ModalKind::SignUp => &self.sign_up,
        }
    }

    fn modal_mut(&mut self, kind: ModalKind) -> &mut Modal {
        match kind {
            ModalKind::SignIn => &mut self.sign_in,
            ModalKind::SignUp => &mut self.sign_up,
        }
    }

    /// Subscribes to session changes and applies the current snapshot.
    pub fn start<V: AuthView + ?Sized>(
        &mut self,
        backend: &dyn AuthBackend,
        view: &mut V,
    ) -> Result<(), ChartError> {
        self.receiver = Some(backend.subscribe());
        match backend.current_session() {
            Ok(session) => {
                self.apply(session.as_ref(), view);
                Ok(())
            }
            Err(err) => {
                self.events.record(
                    "auth_failed",
                    payload(json!({"op": "session_snapshot", "error": err.to_string()})),
                );
                self.apply(None, view);
                Err(err)
            }
        }
    }

    pub fn apply<V: AuthView + ?Sized>(&mut self, session: Option<&Session>, view: &mut V) {
        self.buttons = AuthButtons::for_session(session);
        view.set_auth_buttons(self.buttons);
    }

    /// Applies every queued session notification in order. Returns how many were applied.
    pub fn pump<V: AuthView + ?Sized>(&mut self, view: &mut V) -> usize {
        let mut queued = Vec::new();
        let mut disconnected = false;
        if let Some(receiver) = &self.receiver {
            loop {
                match receiver.try_recv() {
                    Ok(event) => queued.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }
        if disconnected {
            self.receiver = None;
        }
        let applied = queued.len();
        for event in queued {
            self.events.record(
                "session_changed",
                payload(json!({
                    "kind": event.kind,
                    "signed_in": event.session.is_some(),
                })),
            );
            self.apply(event.session.as_ref(), view);
        }
        applied
    }

    pub fn open_modal<V: AuthView + ?Sized>(&mut self, kind: ModalKind, view: &mut V) {
        self.modal_mut(kind).open();
        view.render_modal(kind, self.modal(kind));
    }

    pub fn close_modal<V: AuthView + ?Sized>(&mut self, kind: ModalKind, view: &mut V) {
        self.modal_mut(kind).close();
        view.render_modal(kind, self.modal(kind));
    }

    /// A click on the backdrop closes the modal it belongs to.
    pub fn click_outside<V: AuthView + ?Sized>(&mut self, kind: ModalKind, view: &mut V) {
        if self.modal(kind).is_shown() {
            self.close_modal(kind, view);
        }
    }

    pub fn submit<V: AuthView + Notifier + ?Sized>(
        &mut self,
        kind: ModalKind,
        email: &str,
        password: &str,
        backend: &dyn AuthBackend,
        view: &mut V,
    ) -> Result<(), ChartError> {
        self.modal_mut(kind).error.clear();
        view.render_modal(kind, self.modal(kind));
        self.events.record(
            "auth_submitted",
            payload(json!({"modal": kind.name(), "backend": backend.name()})),
        );

        let credentials = Credentials { email, password };
        let outcome = match kind {
            ModalKind::SignIn => backend.sign_in(credentials).map(|_| ()),
            ModalKind::SignUp => backend.sign_up(credentials).map(|_| ()),
        };
        match outcome {
            Ok(()) => {
                self.close_modal(kind, view);
                view.alert(kind.success_message());
                self.events
                    .record("auth_succeeded", payload(json!({"modal": kind.name()})));
                Ok(())
            }
            Err(err) => {
                let message = match &err {
                    ChartError::Auth(message) => message.clone(),
                    other => other.to_string(),
                };
                self.modal_mut(kind).error = message;
                view.render_modal(kind, self.modal(kind));
                self.events.record(
                    "auth_failed",
                    payload(json!({"modal": kind.name(), "error_kind": err.kind()})),
                );
                Err(err)
            }
        }
    }

    /// Button visibility is left to the session notification that follows.
    pub fn logout<V: Notifier + ?Sized>(
        &mut self,
        backend: &dyn AuthBackend,
        view: &mut V,
    ) -> Result<(), ChartError> {
        match backend.sign_out() {
            Ok(()) => {
                view.alert(LOGGED_OUT_MESSAGE);
                self.events.record("logout_succeeded", payload(json!({})));
                Ok(())
            }
            Err(err) => {
                view.alert(LOGOUT_FAILED_MESSAGE);
                self.events.record(
                    "logout_failed",
                    payload(json!({"error": err.to_string()})),
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use chartsignal_contracts::errors::ChartError;
    use chartsignal_contracts::events::EventWriter;
    use chartsignal_contracts::session::{Credentials, Session, SessionEventKind};
    use chartsignal_contracts::ui::{AuthButtons, ModalKind};

    use super::{
        gotrue_error_message, session_from_payload, AuthBackend, AuthPanel, DryrunAuth,
        SupabaseAuth, DRYRUN_ALREADY_REGISTERED, DRYRUN_INVALID_CREDENTIALS, LOGGED_OUT_MESSAGE,
    };
    use crate::testing::RecordingView;

    fn signed_in() -> AuthButtons {
        AuthButtons {
            sign_in: false,
            get_started: false,
            logout: true,
        }
    }

    #[test]
    fn wrong_password_keeps_modal_open_with_backend_message() {
        let backend = DryrunAuth::new().with_account("trader@example.com", "right");
        let mut panel = AuthPanel::new(EventWriter::in_memory("t"));
        let mut view = RecordingView::default();
        panel.open_modal(ModalKind::SignIn, &mut view);

        let outcome = panel.submit(
            ModalKind::SignIn,
            "trader@example.com",
            "wrong",
            &backend,
            &mut view,
        );

        assert_eq!(
            outcome,
            Err(ChartError::Auth(DRYRUN_INVALID_CREDENTIALS.to_string()))
        );
        let modal = panel.modal(ModalKind::SignIn);
        assert!(modal.is_shown());
        assert_eq!(modal.error, DRYRUN_INVALID_CREDENTIALS);
        assert_eq!(view.last_modal(ModalKind::SignIn).as_ref(), Some(modal));
        assert!(view.alerts().is_empty());
    }

    #[test]
    fn successful_sign_in_closes_modal_and_notification_flips_buttons() -> anyhow::Result<()> {
        let backend = DryrunAuth::new().with_account("trader@example.com", "right");
        let mut panel = AuthPanel::new(EventWriter::in_memory("t"));
        let mut view = RecordingView::default();
        panel.start(&backend, &mut view)?;
        assert_eq!(view.last_buttons(), Some(AuthButtons::for_session(None)));

        panel.open_modal(ModalKind::SignIn, &mut view);
        panel.submit(ModalKind::SignIn, "trader@example.com", "right", &backend, &mut view)?;
        assert!(!panel.modal(ModalKind::SignIn).is_shown());
        assert_eq!(view.alerts(), vec![ModalKind::SignIn.success_message()]);
        // Buttons only move once the notification is pumped.
        assert_eq!(panel.buttons(), AuthButtons::for_session(None));

        // Initial snapshot plus the sign-in.
        assert_eq!(panel.pump(&mut view), 2);
        assert_eq!(panel.buttons(), signed_in());
        assert_eq!(view.last_buttons(), Some(signed_in()));
        Ok(())
    }

    #[test]
    fn present_session_notification_shows_logout_only() {
        let mut panel = AuthPanel::new(EventWriter::in_memory("t"));
        let mut view = RecordingView::default();
        let session = Session {
            access_token: "tok".to_string(),
            refresh_token: None,
            user_id: "u1".to_string(),
            email: None,
        };
        panel.apply(Some(&session), &mut view);
        assert_eq!(view.last_buttons(), Some(signed_in()));
        panel.apply(None, &mut view);
        assert_eq!(view.last_buttons(), Some(AuthButtons::for_session(None)));
    }

    #[test]
    fn sign_up_reports_confirmation_and_rejects_duplicates() {
        let backend = DryrunAuth::new();
        let mut panel = AuthPanel::new(EventWriter::in_memory("t"));
        let mut view = RecordingView::default();
        panel.open_modal(ModalKind::SignUp, &mut view);

        assert!(panel
            .submit(ModalKind::SignUp, "new@example.com", "pw", &backend, &mut view)
            .is_ok());
        assert_eq!(view.alerts(), vec![ModalKind::SignUp.success_message()]);
        assert!(matches!(backend.current_session(), Ok(None)));

        panel.open_modal(ModalKind::SignUp, &mut view);
        let again = panel.submit(ModalKind::SignUp, "NEW@example.com", "pw", &backend, &mut view);
        assert_eq!(again, Err(ChartError::Auth(DRYRUN_ALREADY_REGISTERED.to_string())));
        assert_eq!(panel.modal(ModalKind::SignUp).error, DRYRUN_ALREADY_REGISTERED);

        // Dryrun sign-ups are confirmed on the spot.
        let credentials = Credentials {
            email: "new@example.com",
            password: "pw",
        };
        assert!(backend.sign_in(credentials).is_ok());
    }

    #[test]
    fn close_and_outside_click_clear_the_error_slot() {
        let backend = DryrunAuth::new();
        let mut panel = AuthPanel::new(EventWriter::in_memory("t"));
        let mut view = RecordingView::default();
        panel.open_modal(ModalKind::SignIn, &mut view);
        let _ = panel.submit(ModalKind::SignIn, "ghost@example.com", "x", &backend, &mut view);
        assert!(!panel.modal(ModalKind::SignIn).error.is_empty());

        panel.click_outside(ModalKind::SignIn, &mut view);
        assert!(!panel.modal(ModalKind::SignIn).is_shown());
        assert!(panel.modal(ModalKind::SignIn).error.is_empty());

        panel.open_modal(ModalKind::SignUp, &mut view);
        panel.close_modal(ModalKind::SignUp, &mut view);
        assert!(!panel.modal(ModalKind::SignUp).is_shown());
    }

    #[test]
    fn logout_alerts_and_publishes_signed_out() -> anyhow::Result<()> {
        let backend = DryrunAuth::new().with_account("a@example.com", "pw");
        let mut panel = AuthPanel::new(EventWriter::in_memory("t"));
        let mut view = RecordingView::default();
        panel.start(&backend, &mut view)?;
        backend.sign_in(Credentials {
            email: "a@example.com",
            password: "pw",
        })?;
        panel.logout(&backend, &mut view)?;
        assert_eq!(view.alerts(), vec![LOGGED_OUT_MESSAGE]);

        let receiver = backend.subscribe();
        let initial = receiver.try_recv()?;
        assert_eq!(initial.kind, SessionEventKind::InitialSession);
        assert_eq!(initial.session, None);

        assert_eq!(panel.pump(&mut view), 3);
        assert_eq!(view.last_buttons(), Some(AuthButtons::for_session(None)));
        Ok(())
    }

    #[test]
    fn gotrue_error_message_prefers_description_fields() {
        assert_eq!(
            gotrue_error_message(
                400,
                r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#
            ),
            "Invalid login credentials"
        );
        assert_eq!(
            gotrue_error_message(422, r#"{"code":422,"msg":"User already registered"}"#),
            "User already registered"
        );
        assert_eq!(
            gotrue_error_message(502, "<html>bad gateway</html>"),
            "auth request failed (502): <html>bad gateway</html>"
        );
    }

    #[test]
    fn session_parsing_handles_confirmation_pending_signup() {
        let session = session_from_payload(&json!({
            "access_token": "at",
            "refresh_token": "rt",
            "user": {"id": "u-1", "email": "a@example.com"}
        }));
        assert_eq!(
            session.map(|session| (session.user_id, session.email)),
            Some(("u-1".to_string(), Some("a@example.com".to_string())))
        );
        assert_eq!(
            session_from_payload(&json!({"id": "u-1", "email": "a@example.com"})),
            None
        );
    }

    #[test]
    fn supabase_endpoints_are_rooted_at_auth_v1() -> anyhow::Result<()> {
        let auth = SupabaseAuth::new("https://demo.supabase.co/", "anon", None)?;
        assert_eq!(
            auth.endpoint("token?grant_type=password"),
            "https://demo.supabase.co/auth/v1/token?grant_type=password"
        );
        assert!(matches!(auth.current_session(), Ok(None)));
        Ok(())
    }
}
