use thiserror::Error;

/// Failures surfaced to whoever started a page action.
///
/// `Remote` and `Parse` look the same to the user on the upload path; they are kept
/// apart so the event log can tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    #[error("{0}")]
    Validation(String),
    #[error("remote request failed: {0}")]
    Remote(String),
    #[error("invalid structured response: {0}")]
    Parse(String),
    #[error("{0}")]
    Auth(String),
}

impl ChartError {
    pub fn kind(&self) -> &'static str {
        match self {
            ChartError::Validation(_) => "validation",
            ChartError::Remote(_) => "remote",
            ChartError::Parse(_) => "parse",
            ChartError::Auth(_) => "auth",
        }
    }

    /// Builds a `Remote` error from an anyhow chain.
    pub fn remote(err: &anyhow::Error) -> Self {
        ChartError::Remote(chain_summary(err, 512))
    }
}

/// Distinct causes of `err`, outermost first, joined with `": "` and clipped to `limit` chars.
pub fn chain_summary(err: &anyhow::Error, limit: usize) -> String {
    let mut causes: Vec<String> = err
        .chain()
        .map(|cause| cause.to_string().trim().to_string())
        .filter(|cause| !cause.is_empty())
        .collect();
    causes.dedup();
    clip(&causes.join(": "), limit)
}

/// Keeps the first `limit` chars of `text`, marking the cut with `...`.
pub fn clip(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
