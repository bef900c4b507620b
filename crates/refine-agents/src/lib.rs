//! Iterative generate → evaluate → revise engine.
//!
//! The deterministic scoring core lives in the `evaluation` crate; this
//! crate adds the LLM-backed strategies, the iteration controller, the run
//! pool and the adapters that connect them to real services.

pub mod config;
pub mod context;
pub mod controller;
pub mod engine;
pub mod errors;
pub mod llm;
pub mod meta;
pub mod persistence;
pub mod ports;
pub mod rig_adapter;
pub mod state_machine;
pub mod strategies;

pub use config::EngineConfig;
pub use controller::{IterationController, RunResult, RunStatus};
pub use engine::{Engine, RunRequest};
pub use errors::{EngineConfigError, GenerationError, PersistenceError, TaskContextError};
pub use ports::{ContentGenerationPort, EvaluationRecord, PersistencePort, TaskContextPort};
pub use strategies::EvaluationStrategy;
