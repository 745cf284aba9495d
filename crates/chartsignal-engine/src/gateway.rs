use std::time::Instant;

use serde_json::json;

use chartsignal_contracts::analysis::{parse_analysis_content, AnalysisResult};
use chartsignal_contracts::errors::ChartError;
use chartsignal_contracts::events::{payload, EventWriter};
use chartsignal_contracts::models::{ModelSelector, ModelSpec, CAPABILITY_VISION};
use chartsignal_contracts::upload::UploadedImage;

use crate::providers::{ChatMessage, CompletionProvider, CompletionProviderRegistry, CompletionRequest};

pub const SIGNAL_SYSTEM_PROMPT: &str = r#"You are an expert trading analyst. Read the chart image you are given and produce a clear, actionable trading signal.

Reply with a single JSON object and nothing else, using exactly these keys:
{
  "signal": "BUY" | "SELL" | "HOLD",
  "strength": "WEAK" | "MODERATE" | "STRONG",
  "confidence": integer from 1 to 100,
  "reasoning": "explanation naming the patterns and indicators that drive the call",
  "patterns": ["every relevant pattern you detect, e.g. Bullish Engulfing, Doji; empty if none"],
  "indicators": {
    "rsi": "value and status, e.g. 28.4 (Oversold)",
    "macd": "status, e.g. Bullish Crossover",
    "support": "price level, e.g. $42,850",
    "resistance": "price level, e.g. $45,000"
  },
  "timeframe": "timeframe shown on the chart, e.g. 1-hour or Daily; null if not visible",
  "symbol": "asset symbol shown on the chart, e.g. BTC/USD or AAPL; null if not visible",
  "risk_assessment": "short overall risk, e.g. Low Risk, Moderate Risk, High Risk"
}

Pick BUY or SELL whenever there is a directional bias. Use HOLD only when the evidence is genuinely ambiguous or the market shows no clear direction.

Base the call on candlestick patterns (Doji, Hammer, Engulfing, Morning/Evening Star, Head and Shoulders, Double Top/Bottom, Triangles), support and resistance, visible indicators (RSI, MACD, Bollinger Bands, moving averages), the prevailing trend, and the likely next move with its risks."#;

pub const SIGNAL_USER_TEXT: &str =
    "Please analyze this trading chart and provide a comprehensive trading signal.";

pub const REPORT_SYSTEM_PROMPT: &str = r#"You are an expert trading analyst. Write a long, well-structured analysis report for the chart image you are given.

Cover the detected patterns, the indicators, support and resistance, the trend, and plausible future moves, going deeper than a one-line signal.

Reply in plain text, not JSON."#;

pub const REPORT_USER_TEXT: &str =
    "Generate a comprehensive detailed analysis report for this trading chart.";

/// Sends chart images to the completion service.
///
/// Stateless between calls: nothing is cached and identical images are sent again.
pub struct AnalysisGateway {
    providers: CompletionProviderRegistry,
    selector: ModelSelector,
    model: Option<String>,
    events: EventWriter,
}

impl AnalysisGateway {
    pub fn new(
        providers: CompletionProviderRegistry,
        selector: ModelSelector,
        model: Option<String>,
        events: EventWriter,
    ) -> Self {
        Self {
            providers,
            selector,
            model,
            events,
        }
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn selector(&self) -> &ModelSelector {
        &self.selector
    }

    pub fn quick_analyze(&self, image: &UploadedImage) -> Result<AnalysisResult, ChartError> {
        let started = Instant::now();
        let outcome = self
            .send("analysis", SIGNAL_SYSTEM_PROMPT, SIGNAL_USER_TEXT, true, image)
            .and_then(|content| parse_analysis_content(&content));
        match &outcome {
            Ok(result) => self.events.record(
                "analysis_completed",
                payload(json!({
                    "image": image.fingerprint(),
                    "signal": result.signal,
                    "confidence": result.confidence,
                    "elapsed_ms": started.elapsed().as_millis() as u64,
                })),
            ),
            Err(err) => self.record_failure("analysis_failed", image, err),
        }
        outcome
    }

    pub fn detailed_analyze(&self, image: &UploadedImage) -> Result<String, ChartError> {
        let started = Instant::now();
        let outcome = self.send("report", REPORT_SYSTEM_PROMPT, REPORT_USER_TEXT, false, image);
        match &outcome {
            Ok(report) => self.events.record(
                "report_completed",
                payload(json!({
                    "image": image.fingerprint(),
                    "chars": report.chars().count(),
                    "elapsed_ms": started.elapsed().as_millis() as u64,
                })),
            ),
            Err(err) => self.record_failure("report_failed", image, err),
        }
        outcome
    }

    fn resolve(&self) -> Result<(ModelSpec, &dyn CompletionProvider, Option<String>), ChartError> {
        let selection = self
            .selector
            .select(self.model.as_deref(), CAPABILITY_VISION)?;
        let Some(provider) = self.providers.get(&selection.model.provider) else {
            return Err(ChartError::Remote(format!(
                "no completion provider registered for '{}'",
                selection.model.provider
            )));
        };
        Ok((selection.model, provider, selection.fallback_reason))
    }

    fn send(
        &self,
        purpose: &str,
        system_prompt: &str,
        user_text: &str,
        json: bool,
        image: &UploadedImage,
    ) -> Result<String, ChartError> {
        let (model, provider, fallback_reason) = self.resolve()?;
        self.events.record(
            &format!("{purpose}_started"),
            payload(json!({
                "image": image.fingerprint(),
                "model": model.name,
                "provider": provider.name(),
                "fallback_reason": fallback_reason,
            })),
        );
        let request = CompletionRequest {
            model: model.name.clone(),
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user_with_image(user_text, image.data_url()),
            ],
            json,
        };
        provider
            .complete(&request)
            .map(|completion| completion.content)
            .map_err(|err| ChartError::remote(&err))
    }

    fn record_failure(&self, event_type: &str, image: &UploadedImage, err: &ChartError) {
        self.events.record(
            event_type,
            payload(json!({
                "image": image.fingerprint(),
                "error_kind": err.kind(),
                "error": err.to_string(),
            })),
        );
    }
}

#[cfg(test)]
mod tests {
    use chartsignal_contracts::errors::ChartError;
    use chartsignal_contracts::upload::UploadedImage;

    use super::{REPORT_USER_TEXT, SIGNAL_USER_TEXT};
    use crate::testing::{scripted_gateway, Scripted};

    fn image() -> UploadedImage {
        UploadedImage::from_data_url("data:image/png;base64,iVBORw0KGgo=")
    }

    #[test]
    fn quick_analyze_sends_json_request_with_image_and_parses() -> anyhow::Result<()> {
        let (gateway, provider) = scripted_gateway(vec![Scripted::Reply(
            r#"{"signal":"SELL","strength":"MODERATE","confidence":64}"#.to_string(),
        )]);
        let result = gateway.quick_analyze(&image())?;
        assert_eq!(result.signal.as_deref(), Some("SELL"));
        assert_eq!(result.confidence, Some(64));

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].json);
        assert_eq!(requests[0].messages[0].role, "system");
        assert_eq!(requests[0].first_image_url(), Some(image().data_url()));
        let user = serde_json::to_value(&requests[0].messages[1])?;
        assert_eq!(user["content"][0]["text"], SIGNAL_USER_TEXT);
        Ok(())
    }

    #[test]
    fn quick_analyze_passes_unexpected_signal_through() -> anyhow::Result<()> {
        let (gateway, _) = scripted_gateway(vec![Scripted::Reply(
            r#"{"signal":"ACCUMULATE"}"#.to_string(),
        )]);
        assert_eq!(
            gateway.quick_analyze(&image())?.signal.as_deref(),
            Some("ACCUMULATE")
        );
        Ok(())
    }

    #[test]
    fn quick_analyze_distinguishes_parse_and_remote_errors() {
        let (gateway, _) = scripted_gateway(vec![
            Scripted::Reply("Looks bullish to me.".to_string()),
            Scripted::Fail("upstream 502".to_string()),
        ]);
        assert!(matches!(gateway.quick_analyze(&image()), Err(ChartError::Parse(_))));
        assert!(matches!(
            gateway.quick_analyze(&image()),
            Err(ChartError::Remote(message)) if message.contains("upstream 502")
        ));
    }

    #[test]
    fn detailed_analyze_returns_text_verbatim_without_json_flag() -> anyhow::Result<()> {
        let (gateway, provider) = scripted_gateway(vec![Scripted::Reply(
            "## Overview\n{not json}".to_string(),
        )]);
        assert_eq!(gateway.detailed_analyze(&image())?, "## Overview\n{not json}");
        let requests = provider.requests();
        assert!(!requests[0].json);
        let user = serde_json::to_value(&requests[0].messages[1])?;
        assert_eq!(user["content"][0]["text"], REPORT_USER_TEXT);
        Ok(())
    }

    #[test]
    fn calls_are_not_cached() -> anyhow::Result<()> {
        let (gateway, provider) = scripted_gateway(vec![
            Scripted::Reply(r#"{"signal":"BUY"}"#.to_string()),
            Scripted::Reply(r#"{"signal":"HOLD"}"#.to_string()),
        ]);
        assert_eq!(gateway.quick_analyze(&image())?.signal.as_deref(), Some("BUY"));
        assert_eq!(gateway.quick_analyze(&image())?.signal.as_deref(), Some("HOLD"));
        assert_eq!(provider.requests().len(), 2);
        Ok(())
    }
}
