//! Deterministic core of the iterative evaluation engine.
//!
//! Everything here is pure computation over text and scores: the data
//! model, rule-based scoring, expert consensus, critic robustness, the
//! adversarial arena state machine, meta-evaluation statistics and revision
//! prompt construction. Nothing in this crate calls a language model or
//! touches I/O; the `refine-agents` crate drives these pieces against a
//! generation port.

pub mod arena;
pub mod config;
pub mod consensus;
pub mod critique;
pub mod meta;
pub mod model;
pub mod resilience;
pub mod revision;
pub mod rules;
pub mod stats;
pub mod text;

pub use arena::{AdversarialRound, ArenaConfig, ArenaPhase, ArenaSession, ArenaStep, FinalAssessment};
pub use config::{EvaluationConfig, StrategyKind};
pub use consensus::{canonical_profiles, Disagreement, ExpertProfile, ExpertVerdict};
pub use critique::{Criticism, Severity, SeverityWeights};
pub use meta::{BiasKind, HealthStatus, LlmMetaAssessment, MetaReport, Stability, Trend};
pub use model::{Dimension, EvaluationDimensions, EvaluationResult, TaskContext};
pub use resilience::{DegradationLevel, DegradedReason, DegradedResponse};
pub use revision::RevisionPromptBuilder;
pub use rules::RuleBasedScorer;
