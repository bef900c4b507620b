//! Degraded judgments with explicit fallback provenance.
//!
//! Every judgment that depends on a language model can fall back to a
//! deterministic substitute. Rather than hiding the fallback, producers wrap
//! their output in a [`DegradedResponse`] that records which path served it.
//!
//! ```text
//! LLM judgment
//!   ├─ call + parse succeed        → DegradedResponse { level: Full, ... }
//!   ├─ deterministic substitute    → DegradedResponse { level: Partial, reason, ... }
//!   └─ nothing usable              → DegradedResponse { level: Unavailable, reason, ... }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::EvaluationResult;

/// How much of the primary capability produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    /// Primary path succeeded.
    Full,
    /// A deterministic fallback served the response.
    Partial,
    /// Nothing usable was produced; payload is a neutral default.
    Unavailable,
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Why a response was degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    /// The generation port failed, timed out, or was cancelled.
    TransportFailure,
    /// The response was not parseable JSON of the expected shape.
    ParseFailure,
    /// Required fields were absent from an otherwise valid response.
    MissingFields,
    /// The caller disabled the primary path.
    Disabled,
}

impl DegradedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransportFailure => "transport_failure",
            Self::ParseFailure => "parse_failure",
            Self::MissingFields => "missing_fields",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload wrapped with degradation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradedResponse<T> {
    pub payload: T,
    pub level: DegradationLevel,
    /// Set whenever `level` is not `Full`.
    pub reason: Option<DegradedReason>,
    /// Confidence in the payload (0.0–1.0).
    pub confidence: f64,
    /// Which path produced the payload (e.g. "llm", "rule_based").
    pub served_by: String,
    /// Diagnostics collected along the way.
    pub warnings: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> DegradedResponse<T> {
    /// Primary path succeeded.
    pub fn full(payload: T, served_by: &str) -> Self {
        Self {
            payload,
            level: DegradationLevel::Full,
            reason: None,
            confidence: 1.0,
            served_by: served_by.to_string(),
            warnings: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// A fallback produced the payload.
    pub fn partial(
        payload: T,
        served_by: &str,
        confidence: f64,
        reason: DegradedReason,
        warning: &str,
    ) -> Self {
        Self {
            payload,
            level: DegradationLevel::Partial,
            reason: Some(reason),
            confidence: confidence.clamp(0.0, 1.0),
            served_by: served_by.to_string(),
            warnings: vec![warning.to_string()],
            timestamp: Utc::now(),
        }
    }

    /// Nothing usable; `payload` is a best-effort default.
    pub fn unavailable(payload: T, reason: DegradedReason, warning: &str) -> Self {
        Self {
            payload,
            level: DegradationLevel::Unavailable,
            reason: Some(reason),
            confidence: 0.0,
            served_by: "none".to_string(),
            warnings: vec![warning.to_string()],
            timestamp: Utc::now(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.level == DegradationLevel::Full
    }

    pub fn is_degraded(&self) -> bool {
        self.level != DegradationLevel::Full
    }

    /// Transform the payload, keeping the provenance.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DegradedResponse<U> {
        DegradedResponse {
            payload: f(self.payload),
            level: self.level,
            reason: self.reason,
            confidence: self.confidence,
            served_by: self.served_by,
            warnings: self.warnings,
            timestamp: self.timestamp,
        }
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

impl DegradedResponse<EvaluationResult> {
    /// Collapse into a plain result, stamping degradation into its metadata.
    pub fn into_result(self) -> EvaluationResult {
        match self.reason {
            Some(reason) if self.is_degraded() => self.payload.mark_degraded(reason.as_str()),
            _ => self.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_response() {
        let resp = DegradedResponse::full(42, "llm");
        assert!(resp.is_full());
        assert!(!resp.is_degraded());
        assert_eq!(resp.confidence, 1.0);
        assert!(resp.reason.is_none());
    }

    #[test]
    fn test_partial_clamps_confidence() {
        let resp = DegradedResponse::partial(
            "x",
            "rule_based",
            1.7,
            DegradedReason::ParseFailure,
            "model output was not JSON",
        );
        assert!(resp.is_degraded());
        assert_eq!(resp.confidence, 1.0);
        assert_eq!(resp.reason, Some(DegradedReason::ParseFailure));
        assert_eq!(resp.warnings.len(), 1);
    }

    #[test]
    fn test_map_keeps_provenance() {
        let resp = DegradedResponse::unavailable(2, DegradedReason::TransportFailure, "timeout")
            .map(|n| n * 10);
        assert_eq!(resp.payload, 20);
        assert_eq!(resp.level, DegradationLevel::Unavailable);
        assert_eq!(resp.served_by, "none");
    }

    #[test]
    fn test_into_result_stamps_metadata() {
        let result = EvaluationResult::zero(0, 0.8);
        let degraded = DegradedResponse::partial(
            result.clone(),
            "rule_based",
            0.5,
            DegradedReason::MissingFields,
            "missing clarity",
        )
        .into_result();
        assert!(degraded.is_degraded());
        assert_eq!(degraded.degraded_reason(), Some("missing_fields"));

        let full = DegradedResponse::full(result, "llm").into_result();
        assert!(!full.is_degraded());
    }

    #[test]
    fn test_level_display() {
        assert_eq!(DegradationLevel::Partial.to_string(), "partial");
        assert_eq!(DegradedReason::Disabled.to_string(), "disabled");
    }
}
