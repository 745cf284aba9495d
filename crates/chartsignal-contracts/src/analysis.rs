use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::ChartError;

pub const NO_REASONING_PLACEHOLDER: &str = "No specific reasoning provided.";

/// Structured signal returned by the quick analysis.
///
/// Every field is optional on the wire. `signal` and `strength` pass through whatever
/// string the model sent; only the prompt asks for BUY/SELL/HOLD and WEAK/MODERATE/STRONG.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, deserialize_with = "lenient_text")]
    pub signal: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub strength: Option<String>,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: Option<u32>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub reasoning: Option<String>,
    #[serde(default, deserialize_with = "lenient_patterns")]
    pub patterns: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub indicators: IndexMap<String, Value>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub timeframe: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub risk_assessment: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Scalars other than strings show as their JSON text; falsy values count as absent.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(indicator_display(&raw))
}

fn lenient_patterns<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.iter().filter_map(indicator_display).collect()),
        other => Err(serde::de::Error::custom(format!(
            "patterns must be a list, got {}",
            json_kind(&other)
        ))),
    }
}

fn lenient_confidence<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(confidence_from_value(&raw))
}

fn confidence_from_value(value: &Value) -> Option<u32> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() || number < 0.0 {
        return None;
    }
    Some(number.round() as u32)
}

/// Parses the completion text of a structured request.
///
/// Tolerates surrounding whitespace and a single Markdown code fence; anything that is
/// not a JSON object is a `Parse` error.
pub fn parse_analysis_content(content: &str) -> Result<AnalysisResult, ChartError> {
    let body = strip_code_fence(content.trim());
    let value: Value =
        serde_json::from_str(body).map_err(|err| ChartError::Parse(err.to_string()))?;
    if !value.is_object() {
        return Err(ChartError::Parse(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    }
    serde_json::from_value(value).map_err(|err| ChartError::Parse(err.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalClass {
    Buy,
    Sell,
    Hold,
    Unknown,
}

impl SignalClass {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalClass::Buy => "buy",
            SignalClass::Sell => "sell",
            SignalClass::Hold => "hold",
            SignalClass::Unknown => "unknown",
        }
    }
}

/// What to show when the signal text names no direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownSignalPolicy {
    #[default]
    DefaultBuy,
    Unknown,
}

impl UnknownSignalPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy" | "default_buy" => Some(UnknownSignalPolicy::DefaultBuy),
            "unknown" => Some(UnknownSignalPolicy::Unknown),
            _ => None,
        }
    }
}

/// Case-insensitive substring match, buy before sell before hold.
pub fn classify_signal(signal: Option<&str>, policy: UnknownSignalPolicy) -> SignalClass {
    let fallback = match policy {
        UnknownSignalPolicy::DefaultBuy => SignalClass::Buy,
        UnknownSignalPolicy::Unknown => SignalClass::Unknown,
    };
    let Some(signal) = signal else {
        return fallback;
    };
    let lowered = signal.to_lowercase();
    if lowered.contains("buy") {
        SignalClass::Buy
    } else if lowered.contains("sell") {
        SignalClass::Sell
    } else if lowered.contains("hold") {
        SignalClass::Hold
    } else {
        fallback
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailRow {
    pub label: String,
    pub value: String,
}

impl DetailRow {
    fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Everything the results panel shows for one analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultPanel {
    pub badge_text: String,
    pub signal_class: SignalClass,
    pub confidence_text: String,
    pub reasoning: String,
    pub details: Vec<DetailRow>,
}

impl ResultPanel {
    pub fn project(result: &AnalysisResult, policy: UnknownSignalPolicy) -> Self {
        let strength = non_empty(result.strength.as_deref()).unwrap_or_default();
        let signal = non_empty(result.signal.as_deref()).unwrap_or("N/A");
        let badge_text = format!("{strength} {signal}").trim().to_string();

        let confidence_text = match result.confidence.filter(|value| *value != 0) {
            Some(value) => format!("{value}% Confidence"),
            None => "N/A% Confidence".to_string(),
        };

        let reasoning = non_empty(result.reasoning.as_deref())
            .unwrap_or(NO_REASONING_PLACEHOLDER)
            .to_string();

        Self {
            badge_text,
            signal_class: classify_signal(result.signal.as_deref(), policy),
            confidence_text,
            reasoning,
            details: detail_rows(result),
        }
    }
}

fn detail_rows(result: &AnalysisResult) -> Vec<DetailRow> {
    let mut rows = Vec::new();
    if !result.patterns.is_empty() {
        rows.push(DetailRow::new("Patterns Detected", result.patterns.join(", ")));
    }
    for (key, value) in &result.indicators {
        if let Some(display) = indicator_display(value) {
            rows.push(DetailRow::new(indicator_label(key), display));
        }
    }
    if let Some(symbol) = non_empty(result.symbol.as_deref()) {
        rows.push(DetailRow::new("Symbol", symbol));
    }
    if let Some(timeframe) = non_empty(result.timeframe.as_deref()) {
        rows.push(DetailRow::new("Timeframe", timeframe));
    }
    if let Some(risk) = non_empty(result.risk_assessment.as_deref()) {
        rows.push(DetailRow::new("Risk Assessment", risk));
    }
    rows
}

pub fn indicator_label(key: &str) -> String {
    key.replace('_', " ").to_uppercase()
}

/// Display text for an indicator value; `None` for the falsy ones the panel skips.
pub fn indicator_display(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) if number.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.is_empty())
}
