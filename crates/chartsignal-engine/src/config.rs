use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use chartsignal_contracts::analysis::UnknownSignalPolicy;
use chartsignal_contracts::events::EventWriter;
use chartsignal_contracts::models::{
    ModelRegistry, ModelSelector, ModelSpec, CAPABILITY_JSON, CAPABILITY_VISION,
};

use crate::auth::{AuthBackend, DryrunAuth, SupabaseAuth};
use crate::gateway::AnalysisGateway;
use crate::providers::{CompletionProviderRegistry, DryrunProvider, OpenAiChatProvider};

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_ONLINE_MODEL: &str = "gpt-4o";
pub const DEFAULT_OFFLINE_MODEL: &str = "dryrun-vision-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    pub model: String,
    pub request_timeout: Option<Duration>,
    pub unknown_signal: UnknownSignalPolicy,
    pub supabase: Option<SupabaseConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let openai_api_key = non_empty("OPENAI_API_KEY").or_else(|| non_empty("OPENAI_API_KEY_BACKUP"));
        let model = non_empty("CHARTSIGNAL_MODEL").unwrap_or_else(|| {
            if openai_api_key.is_some() {
                DEFAULT_ONLINE_MODEL.to_string()
            } else {
                DEFAULT_OFFLINE_MODEL.to_string()
            }
        });

        let request_timeout = match non_empty("CHARTSIGNAL_REQUEST_TIMEOUT") {
            Some(raw) => {
                let seconds: f64 = raw
                    .parse()
                    .with_context(|| format!("CHARTSIGNAL_REQUEST_TIMEOUT is not a number: {raw}"))?;
                if !seconds.is_finite() || seconds <= 0.0 {
                    bail!("CHARTSIGNAL_REQUEST_TIMEOUT must be a positive number of seconds, got {raw}");
                }
                match Duration::try_from_secs_f64(seconds) {
                    Ok(timeout) => Some(timeout),
                    Err(err) => bail!("CHARTSIGNAL_REQUEST_TIMEOUT is out of range ({raw}): {err}"),
                }
            }
            None => None,
        };

        let unknown_signal = match non_empty("CHARTSIGNAL_UNKNOWN_SIGNAL") {
            Some(raw) => match UnknownSignalPolicy::parse(&raw) {
                Some(policy) => policy,
                None => bail!("CHARTSIGNAL_UNKNOWN_SIGNAL must be 'buy' or 'unknown', got {raw}"),
            },
            None => UnknownSignalPolicy::default(),
        };

        let supabase = match (non_empty("SUPABASE_URL"), non_empty("SUPABASE_ANON_KEY")) {
            (Some(url), Some(anon_key)) => Some(SupabaseConfig { url, anon_key }),
            (None, None) => None,
            (Some(_), None) => bail!("SUPABASE_URL is set but SUPABASE_ANON_KEY is missing"),
            (None, Some(_)) => bail!("SUPABASE_ANON_KEY is set but SUPABASE_URL is missing"),
        };

        Ok(Self {
            openai_api_key,
            openai_api_base: non_empty("OPENAI_API_BASE")
                .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string()),
            model,
            request_timeout,
            unknown_signal,
            supabase,
        })
    }

    pub fn with_model(mut self, model: Option<&str>) -> Self {
        if let Some(model) = model.map(str::trim).filter(|model| !model.is_empty()) {
            self.model = model.to_string();
        }
        self
    }

    /// Default registry, plus the configured model as an OpenAI vision model when it is
    /// not already known.
    pub fn model_registry(&self) -> ModelRegistry {
        let mut registry = ModelRegistry::new(None);
        if registry.get(&self.model).is_none() {
            registry.register(ModelSpec::new(
                &self.model,
                "openai",
                &[CAPABILITY_VISION, CAPABILITY_JSON],
                None,
            ));
        }
        registry
    }

    pub fn providers(&self) -> Result<CompletionProviderRegistry> {
        let mut providers = CompletionProviderRegistry::new();
        providers.register(DryrunProvider);
        providers.register(OpenAiChatProvider::new(
            &self.openai_api_base,
            self.openai_api_key.clone(),
            self.request_timeout,
        )?);
        Ok(providers)
    }

    pub fn gateway(&self, events: EventWriter) -> Result<AnalysisGateway> {
        Ok(AnalysisGateway::new(
            self.providers()?,
            ModelSelector::new(Some(self.model_registry())),
            Some(self.model.clone()),
            events,
        ))
    }

    pub fn auth_backend(&self) -> Result<Box<dyn AuthBackend>> {
        match &self.supabase {
            Some(supabase) => Ok(Box::new(SupabaseAuth::new(
                &supabase.url,
                &supabase.anon_key,
                self.request_timeout,
            )?)),
            None => Ok(Box::new(DryrunAuth::new())),
        }
    }
}
