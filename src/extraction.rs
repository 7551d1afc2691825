use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::FutureExt as _;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::completion::{CompletionClient, ParseRequest};
use crate::segment::Segment;

pub const NO_MATCH_TEXT: &str = "[No matching information found in this chunk.]";
pub const TIMEOUT_TEXT: &str = "[Parsing aborted due to timeout]";
pub const RETRIES_EXHAUSTED_TEXT: &str = "[Max retries reached; no response]";
pub const UNEXPECTED_ERROR_TEXT: &str = "[Error during parsing]";

const SNIPPET_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    /// Wall-clock budget measured from the first attempt.
    pub max_duration: Duration,
    /// Pause between a failed attempt and the next one.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            max_duration: Duration::from_secs(120),
            delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("extraction budget of {}s exceeded after {attempts} attempt(s)", .budget.as_secs_f64())]
    Timeout { budget: Duration, attempts: u32 },
    #[error("all {attempts} attempt(s) failed; last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Matched,
    NoMatch,
    Error,
}

/// Why an outcome landed in [`Category::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    RetriesExhausted,
    Unexpected,
}

impl FailureKind {
    pub fn placeholder(self) -> &'static str {
        match self {
            Self::Timeout => TIMEOUT_TEXT,
            Self::RetriesExhausted => RETRIES_EXHAUSTED_TEXT,
            Self::Unexpected => UNEXPECTED_ERROR_TEXT,
        }
    }
}

impl From<&ExtractionError> for FailureKind {
    fn from(err: &ExtractionError) -> Self {
        match err {
            ExtractionError::Timeout { .. } => Self::Timeout,
            ExtractionError::RetriesExhausted { .. } => Self::RetriesExhausted,
            ExtractionError::Unexpected(_) => Self::Unexpected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub source_url: String,
    pub captured_at: DateTime<Utc>,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub text: String,
}

impl ExtractionOutcome {
    fn from_response(segment: &Segment, raw: &str) -> Self {
        let (category, text) = classify_response(raw);
        Self {
            source_url: segment.source_url.clone(),
            captured_at: segment.captured_at,
            category,
            failure: None,
            text,
        }
    }

    fn from_error(segment: &Segment, err: &ExtractionError) -> Self {
        let failure = FailureKind::from(err);
        Self {
            source_url: segment.source_url.clone(),
            captured_at: segment.captured_at,
            category: Category::Error,
            failure: Some(failure),
            text: failure.placeholder().to_owned(),
        }
    }

    pub fn captured_at_iso(&self) -> String {
        self.captured_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub matched: usize,
    pub no_match: usize,
    pub error: usize,
}

impl Summary {
    pub fn from_outcomes(outcomes: &[ExtractionOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome.category {
                Category::Matched => summary.matched += 1,
                Category::NoMatch => summary.no_match += 1,
                Category::Error => summary.error += 1,
            }
        }
        summary
    }
}

/// Trims the model reply and maps empty answers to [`Category::NoMatch`].
pub fn classify_response(raw: &str) -> (Category, String) {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "''" || trimmed == "\"\"" {
        return (Category::NoMatch, NO_MATCH_TEXT.to_owned());
    }
    (Category::Matched, trimmed.to_owned())
}

/// Calls `client` up to `retries + 1` times. The budget is checked before
/// every attempt; an attempt already in flight is never interrupted.
pub async fn safe_invoke(
    client: &dyn CompletionClient,
    request: &ParseRequest<'_>,
    policy: &RetryPolicy,
) -> Result<String, ExtractionError> {
    let started_at = Instant::now();
    let attempts = policy.retries.saturating_add(1);
    let mut last_error = String::new();

    for attempt in 0..attempts {
        let elapsed = started_at.elapsed();
        if elapsed > policy.max_duration {
            tracing::warn!(
                attempts_made = attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = policy.max_duration.as_millis() as u64,
                "completion budget exceeded; aborting"
            );
            return Err(ExtractionError::Timeout {
                budget: policy.max_duration,
                attempts: attempt,
            });
        }

        tracing::debug!(attempt = attempt + 1, attempts, "sending to model");
        match client.invoke(request).await {
            Ok(response) => {
                tracing::debug!(attempt = attempt + 1, response = %response, "model responded");
                return Ok(response);
            }
            Err(err) => {
                last_error = format!("{err:#}");
                tracing::warn!(
                    attempt = attempt + 1,
                    attempts,
                    error = %last_error,
                    "completion attempt failed"
                );
                if attempt + 1 < attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    tracing::warn!(attempts, "max retries reached");
    Err(ExtractionError::RetriesExhausted {
        attempts,
        last_error,
    })
}

/// Runs every segment through the model, one at a time and in order.
///
/// Always returns exactly one outcome per segment: failures, including a
/// panicking client, are recorded as [`Category::Error`] for that segment
/// and processing moves on.
pub async fn extract_all(
    client: &dyn CompletionClient,
    segments: &[Segment],
    description: &str,
    policy: &RetryPolicy,
) -> Vec<ExtractionOutcome> {
    let started_at = Instant::now();
    let total = segments.len();
    let mut outcomes = Vec::with_capacity(total);

    for (index, segment) in segments.iter().enumerate() {
        let request = ParseRequest::new(&segment.text, description);
        let guarded = AssertUnwindSafe(safe_invoke(client, &request, policy))
            .catch_unwind()
            .await;
        let result = guarded.unwrap_or_else(|payload| {
            Err(ExtractionError::Unexpected(panic_message(payload.as_ref())))
        });

        let outcome = match result {
            Ok(raw) => ExtractionOutcome::from_response(segment, &raw),
            Err(err) => {
                tracing::error!(
                    chunk = index + 1,
                    total,
                    url = %segment.source_url,
                    %err,
                    "failed to parse chunk"
                );
                tracing::debug!(
                    chunk = index + 1,
                    snippet = %snippet(&segment.text),
                    "chunk text"
                );
                ExtractionOutcome::from_error(segment, &err)
            }
        };

        tracing::info!(
            chunk = index + 1,
            total,
            url = %segment.source_url,
            category = ?outcome.category,
            "parsed chunk"
        );
        outcomes.push(outcome);
    }

    tracing::info!(
        chunks = total,
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "total parse time"
    );
    outcomes
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "completion client panicked".to_owned()
}

fn snippet(text: &str) -> String {
    let mut out: String = text.chars().take(SNIPPET_CHARS).collect();
    if text.chars().nth(SNIPPET_CHARS).is_some() {
        out.push_str("...");
    }
    out
}
