//! Deadline- and cancellation-aware access to the generation port, plus
//! helpers for pulling JSON out of free-text model output.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use schemars::JsonSchema;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::GenerationError;
use crate::ports::ContentGenerationPort;

/// Default per-call deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("FENCE_RE regex should compile")
});

/// Shared handle on the generation port. Every call carries a deadline and
/// races the run's cancellation token.
#[derive(Clone)]
pub struct LlmCaller {
    port: Arc<dyn ContentGenerationPort>,
    timeout: Duration,
}

impl LlmCaller {
    pub fn new(port: Arc<dyn ContentGenerationPort>, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn port(&self) -> &Arc<dyn ContentGenerationPort> {
        &self.port
    }

    /// One generation call; a timeout or cancellation is a transport failure.
    pub async fn call(
        &self,
        preamble: Option<&str>,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, GenerationError> {
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        let request = async {
            match preamble {
                Some(p) => self.port.generate_with_preamble(p, prompt).await,
                None => self.port.generate(prompt).await,
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, request) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    debug!(timeout_ms = self.timeout.as_millis() as u64, "generation call timed out");
                    Err(GenerationError::Timeout(self.timeout))
                }
            },
        }
    }
}

impl std::fmt::Debug for LlmCaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmCaller")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn strip_fences(raw: &str) -> &str {
    match FENCE_RE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => raw.trim(),
    }
}

/// The outermost `{...}` span of `raw`, ignoring fences and surrounding prose.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let stripped = strip_fences(raw);
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    (end > start).then(|| &stripped[start..=end])
}

/// The outermost `[...]` span of `raw`, ignoring fences and surrounding prose.
pub fn extract_json_array(raw: &str) -> Option<&str> {
    let stripped = strip_fences(raw);
    let start = stripped.find('[')?;
    let end = stripped.rfind(']')?;
    (end > start).then(|| &stripped[start..=end])
}

/// Pretty JSON schema for `T`, embedded in prompts to pin the response shape.
pub fn schema_json<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
