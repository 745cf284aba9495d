use serde_json::json;

use chartsignal_contracts::errors::ChartError;
use chartsignal_contracts::events::{payload, EventWriter};
use chartsignal_contracts::ui::{ModalKind, WidgetEvent};

use crate::auth::{AuthBackend, AuthPanel};
use crate::gateway::AnalysisGateway;
use crate::render::{DetailedReport, ResultRenderer};
use crate::upload::{UploadController, UploadOutcome};
use crate::view::PageView;

/// One user gesture on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Widget(WidgetEvent),
    GetDetailedAnalysis,
    CloseReport,
    OpenModal(ModalKind),
    CloseModal(ModalKind),
    ClickOutsideModal(ModalKind),
    Submit {
        kind: ModalKind,
        email: String,
        password: String,
    },
    Logout,
}

/// The whole page: upload widget, results, report panel and auth header.
///
/// Events are handled one at a time. Every error is already surfaced to the view by the
/// time `handle` returns it.
pub struct ChartApp<V: PageView> {
    view: V,
    controller: UploadController,
    gateway: AnalysisGateway,
    renderer: ResultRenderer,
    report: DetailedReport,
    auth_panel: AuthPanel,
    auth: Box<dyn AuthBackend>,
    events: EventWriter,
}

impl<V: PageView> ChartApp<V> {
    pub fn new(
        view: V,
        gateway: AnalysisGateway,
        renderer: ResultRenderer,
        auth: Box<dyn AuthBackend>,
        events: EventWriter,
    ) -> Self {
        Self {
            view,
            controller: UploadController::new(events.clone()),
            gateway,
            renderer,
            report: DetailedReport::new(events.clone()),
            auth_panel: AuthPanel::new(events.clone()),
            auth,
            events,
        }
    }

    pub fn start(&mut self) -> Result<(), ChartError> {
        self.events.record(
            "app_started",
            payload(json!({
                "model": self.gateway.model(),
                "auth_backend": self.auth.name(),
                "unknown_signal": format!("{:?}", self.renderer.policy()),
            })),
        );
        self.controller.show(&mut self.view);
        self.auth_panel.start(self.auth.as_ref(), &mut self.view)
    }

    pub fn handle(&mut self, event: PageEvent) -> Result<(), ChartError> {
        match event {
            PageEvent::Widget(event) => {
                match self.controller.handle_event(
                    event,
                    &self.gateway,
                    &self.renderer,
                    &mut self.view,
                ) {
                    Some(UploadOutcome::Rejected(err)) | Some(UploadOutcome::Failed(err)) => Err(err),
                    Some(UploadOutcome::Rendered(_)) | None => Ok(()),
                }
            }
            PageEvent::GetDetailedAnalysis => self.report.request(
                self.controller.stored_image(),
                &self.gateway,
                &mut self.view,
            ),
            PageEvent::CloseReport => {
                self.report.close(&mut self.view);
                Ok(())
            }
            PageEvent::OpenModal(kind) => {
                self.auth_panel.open_modal(kind, &mut self.view);
                Ok(())
            }
            PageEvent::CloseModal(kind) => {
                self.auth_panel.close_modal(kind, &mut self.view);
                Ok(())
            }
            PageEvent::ClickOutsideModal(kind) => {
                self.auth_panel.click_outside(kind, &mut self.view);
                Ok(())
            }
            PageEvent::Submit {
                kind,
                email,
                password,
            } => self.auth_panel.submit(
                kind,
                &email,
                &password,
                self.auth.as_ref(),
                &mut self.view,
            ),
            PageEvent::Logout => self.auth_panel.logout(self.auth.as_ref(), &mut self.view),
        }
    }

    /// Applies queued session notifications; call once per page tick.
    pub fn pump_session_events(&mut self) -> usize {
        self.auth_panel.pump(&mut self.view)
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn controller(&self) -> &UploadController {
        &self.controller
    }

    pub fn report(&self) -> &DetailedReport {
        &self.report
    }

    pub fn auth_panel(&self) -> &AuthPanel {
        &self.auth_panel
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use chartsignal_contracts::errors::ChartError;
    use chartsignal_contracts::events::EventWriter;
    use chartsignal_contracts::ui::{AuthButtons, ModalKind, WidgetEvent, WidgetState};
    use chartsignal_contracts::upload::{ChartFile, NOT_AN_IMAGE_MESSAGE};

    use super::{ChartApp, PageEvent};
    use crate::auth::DryrunAuth;
    use crate::render::ResultRenderer;
    use crate::testing::{scripted_gateway, RecordingView, Scripted, ScriptedProvider, ViewCall};

    fn app(script: Vec<Scripted>) -> (ChartApp<RecordingView>, ScriptedProvider) {
        let (gateway, provider) = scripted_gateway(script);
        let auth = DryrunAuth::new().with_account("trader@example.com", "secret");
        let app = ChartApp::new(
            RecordingView::default(),
            gateway,
            ResultRenderer::default(),
            Box::new(auth),
            EventWriter::in_memory("app-test"),
        );
        (app, provider)
    }

    fn chosen(name: &str, media_type: &str) -> PageEvent {
        PageEvent::Widget(WidgetEvent::FileChosen(ChartFile::new(
            name,
            media_type,
            vec![1, 2, 3, 4],
        )))
    }

    #[test]
    fn detailed_report_reuses_the_stored_data_url() -> anyhow::Result<()> {
        let (mut app, provider) = app(vec![
            Scripted::Reply(r#"{"signal":"BUY","confidence":70}"#.to_string()),
            Scripted::Reply("Long form report".to_string()),
        ]);
        app.start()?;
        app.handle(chosen("btc.png", "image/png"))?;
        app.handle(PageEvent::GetDetailedAnalysis)?;

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].first_image_url(), requests[1].first_image_url());
        assert_eq!(
            requests[1].first_image_url(),
            app.controller().stored_image().map(|image| image.data_url())
        );
        assert_eq!(app.report().content(), Some("Long form report"));

        app.handle(PageEvent::CloseReport)?;
        assert_eq!(app.report().content(), None);
        Ok(())
    }

    #[test]
    fn text_upload_never_enters_loading() -> anyhow::Result<()> {
        let (mut app, provider) = app(Vec::new());
        app.start()?;
        let outcome = app.handle(chosen("notes.txt", "text/plain"));
        assert_eq!(
            outcome,
            Err(ChartError::Validation(NOT_AN_IMAGE_MESSAGE.to_string()))
        );
        assert_eq!(app.view().widget_states(), vec!["idle"]);
        assert_eq!(app.controller().widget().state(), &WidgetState::Idle);
        assert!(provider.requests().is_empty());
        Ok(())
    }

    #[test]
    fn report_before_any_upload_makes_no_call() -> anyhow::Result<()> {
        let (mut app, provider) = app(Vec::new());
        app.start()?;
        assert!(app.handle(PageEvent::GetDetailedAnalysis).is_err());
        assert!(provider.requests().is_empty());
        assert_eq!(app.view().alerts().len(), 1);
        Ok(())
    }

    #[test]
    fn sign_in_then_logout_drives_buttons_through_notifications() -> anyhow::Result<()> {
        let (mut app, _) = app(Vec::new());
        app.start()?;
        app.handle(PageEvent::OpenModal(ModalKind::SignIn))?;

        let wrong = app.handle(PageEvent::Submit {
            kind: ModalKind::SignIn,
            email: "trader@example.com".to_string(),
            password: "nope".to_string(),
        });
        assert!(matches!(wrong, Err(ChartError::Auth(_))));
        assert!(app.auth_panel().modal(ModalKind::SignIn).is_shown());

        app.handle(PageEvent::Submit {
            kind: ModalKind::SignIn,
            email: "trader@example.com".to_string(),
            password: "secret".to_string(),
        })?;
        app.pump_session_events();
        assert_eq!(
            app.view().last_buttons(),
            Some(AuthButtons {
                sign_in: false,
                get_started: false,
                logout: true
            })
        );

        app.handle(PageEvent::Logout)?;
        app.pump_session_events();
        assert_eq!(app.view().last_buttons(), Some(AuthButtons::for_session(None)));
        assert!(app.events().recent_types().contains(&"session_changed".to_string()));
        Ok(())
    }

    #[test]
    fn failed_analysis_then_retry_then_success() -> anyhow::Result<()> {
        let (mut app, _) = app(vec![
            Scripted::Fail("boom".to_string()),
            Scripted::Reply(r#"{"signal":"SELL"}"#.to_string()),
        ]);
        app.start()?;
        assert!(app.handle(chosen("a.png", "image/png")).is_err());
        app.handle(PageEvent::Widget(WidgetEvent::Click(
            chartsignal_contracts::ui::Control::RetryButton,
        )))?;
        app.handle(chosen("a.png", "image/png"))?;
        assert_eq!(
            app.view().widget_states(),
            vec!["idle", "loading", "error", "idle", "loading", "idle"]
        );
        assert!(matches!(
            app.view().calls.iter().rev().find(|call| matches!(call, ViewCall::ShowResults(_))),
            Some(ViewCall::ShowResults(panel)) if panel.badge_text == "SELL"
        ));
        Ok(())
    }
}
