pub mod app;
pub mod auth;
pub mod config;
pub mod files;
pub mod gateway;
pub mod providers;
pub mod render;
pub mod upload;
pub mod view;

#[cfg(test)]
mod testing;

pub use app::{ChartApp, PageEvent};
pub use auth::{AuthBackend, AuthPanel, DryrunAuth, SupabaseAuth};
pub use config::AppConfig;
pub use gateway::AnalysisGateway;
pub use render::{DetailedReport, ResultRenderer};
pub use upload::{UploadController, UploadOutcome};
pub use view::{AuthView, Notifier, PageView, ResultView, UploadView};
