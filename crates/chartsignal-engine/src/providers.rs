use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use chartsignal_contracts::errors::clip;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One role-tagged chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// A user turn carrying instruction text followed by one image.
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }

    pub fn image_urls(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Ask the provider for a JSON object instead of free text.
    pub json: bool,
}

impl CompletionRequest {
    pub fn first_image_url(&self) -> Option<&str> {
        self.messages
            .iter()
            .flat_map(|message| message.image_urls())
            .next()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
}

pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}

#[derive(Default)]
pub struct CompletionProviderRegistry {
    providers: BTreeMap<String, Box<dyn CompletionProvider>>,
}

impl CompletionProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: CompletionProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn CompletionProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

/// OpenAI-compatible `chat/completions` transport.
pub struct OpenAiChatProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl OpenAiChatProvider {
    pub fn new(api_base: &str, api_key: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("failed building OpenAI HTTP client")?;
        Ok(Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_key,
            http,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    pub fn payload(request: &CompletionRequest) -> Value {
        let mut payload = json!({
            "model": request.model,
            "messages": request.messages,
        });
        if request.json {
            if let Some(obj) = payload.as_object_mut() {
                obj.insert(
                    "response_format".to_string(),
                    json!({ "type": "json_object" }),
                );
            }
        }
        payload
    }

    pub fn extract_completion(payload: &Value, fallback_model: &str) -> Result<Completion> {
        let choice = payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first());
        let finish_reason = choice
            .and_then(|row| row.get("finish_reason"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let content = choice
            .and_then(|row| row.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(content_text);
        let Some(content) = content else {
            bail!(
                "OpenAI chat response returned no message content (finish_reason={})",
                finish_reason.as_deref().unwrap_or("unknown")
            );
        };
        let model = payload
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(fallback_model)
            .to_string();
        Ok(Completion {
            content,
            model,
            finish_reason,
        })
    }
}

fn content_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let joined = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<&str>>()
                .join("");
            if joined.is_empty() {
                None
            } else {
                Some(joined)
            }
        }
        _ => None,
    }
}

impl CompletionProvider for OpenAiChatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("OPENAI_API_KEY or OPENAI_API_KEY_BACKUP not set");
        };
        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .header("accept", "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(&Self::payload(request))
            .send()
            .with_context(|| format!("OpenAI chat request failed ({endpoint})"))?;
        let payload = response_json_or_error("OpenAI chat", response)?;
        Self::extract_completion(&payload, &request.model)
    }
}

pub(crate) fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            clip(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Offline provider. Answers are derived from a hash of the image, so the same chart
/// always gets the same reading.
pub struct DryrunProvider;

const DRYRUN_SIGNALS: [(&str, &str); 3] = [
    ("BUY", "Bullish Engulfing"),
    ("SELL", "Evening Star"),
    ("HOLD", "Doji"),
];
const DRYRUN_STRENGTHS: [&str; 3] = ["WEAK", "MODERATE", "STRONG"];

impl DryrunProvider {
    fn digest(request: &CompletionRequest) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(request.first_image_url().unwrap_or_default().as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    fn structured(digest: &[u8; 32]) -> Value {
        let (signal, pattern) = DRYRUN_SIGNALS[digest[0] as usize % DRYRUN_SIGNALS.len()];
        let strength = DRYRUN_STRENGTHS[digest[1] as usize % DRYRUN_STRENGTHS.len()];
        let confidence = 40 + u64::from(digest[2]) % 56;
        let rsi = 20.0 + f64::from(digest[3] % 60) + f64::from(digest[4] % 10) / 10.0;
        let rsi_status = if rsi < 30.0 {
            "Oversold"
        } else if rsi > 70.0 {
            "Overbought"
        } else {
            "Neutral"
        };
        let macd = if signal == "SELL" {
            "Bearish Crossover"
        } else {
            "Bullish Crossover"
        };
        let risk = if strength == "STRONG" {
            "Moderate Risk"
        } else {
            "High Risk"
        };
        json!({
            "signal": signal,
            "strength": strength,
            "confidence": confidence,
            "reasoning": format!(
                "Offline reading: {pattern} near the latest candles with RSI at {rsi:.1}."
            ),
            "patterns": [pattern],
            "indicators": {
                "rsi": format!("{rsi:.1} ({rsi_status})"),
                "macd": macd,
            },
            "timeframe": null,
            "symbol": null,
            "risk_assessment": risk,
        })
    }
}

impl CompletionProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        if request.first_image_url().is_none() {
            bail!("dryrun provider needs an image part");
        }
        let digest = Self::digest(request);
        let structured = Self::structured(&digest);
        let content = if request.json {
            serde_json::to_string(&structured)?
        } else {
            format!(
                "Detailed report (offline)\n\nSignal: {} {}\nPatterns: {}\nRSI: {}\n\n{}",
                structured["strength"].as_str().unwrap_or_default(),
                structured["signal"].as_str().unwrap_or_default(),
                structured["patterns"][0].as_str().unwrap_or_default(),
                structured["indicators"]["rsi"].as_str().unwrap_or_default(),
                structured["reasoning"].as_str().unwrap_or_default(),
            )
        };
        Ok(Completion {
            content,
            model: request.model.clone(),
            finish_reason: Some("stop".to_string()),
        })
    }
}
