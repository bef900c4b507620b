//! Error taxonomy for the runtime layer.
//!
//! None of these cross the strategy/controller boundary: generation and
//! parse failures degrade to fallback results, persistence failures are
//! counted and logged. They exist so adapters can report precisely what went
//! wrong and callers can classify without string matching.
//!
//! | Category      | Retriable |
//! |---------------|-----------|
//! | Transient     | yes       |
//! | RateLimit     | yes       |
//! | Timeout       | yes       |
//! | Configuration | no        |
//! | Cancelled     | no        |

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Classification used by callers deciding whether an error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Network / backend error.
    Transient,
    /// Provider rate limit; retry with back-off.
    RateLimit,
    /// Call exceeded its deadline.
    Timeout,
    /// Bad endpoint, model or key; do not retry.
    Configuration,
    /// Explicitly cancelled; terminal.
    Cancelled,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimit | Self::Timeout)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Timeout => write!(f, "timeout"),
            Self::Configuration => write!(f, "configuration"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Failure of a single content-generation call.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Inference request failed (network, backend crash, bad status).
    #[error("Generation transport failure: {0}")]
    Transport(String),

    #[error("Rate limit: {0}")]
    RateLimit(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Generator configuration error: {0}")]
    Configuration(String),
}

impl GenerationError {
    pub fn category(&self) -> RetryCategory {
        match self {
            Self::Transport(_) => RetryCategory::Transient,
            Self::RateLimit(_) => RetryCategory::RateLimit,
            Self::Timeout(_) => RetryCategory::Timeout,
            Self::Configuration(_) => RetryCategory::Configuration,
            Self::Cancelled => RetryCategory::Cancelled,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failure writing or reading evaluation history.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Persistence backend unavailable: {0}")]
    Unavailable(String),

    #[error("Persistence rejected record for task {task_id} iteration {iteration}: {reason}")]
    Rejected {
        task_id: String,
        iteration: u32,
        reason: String,
    },
}

/// Failure resolving a task reference.
#[derive(Debug, Error)]
pub enum TaskContextError {
    #[error("Unknown task: {0}")]
    NotFound(String),

    #[error("Task context service unavailable: {0}")]
    Unavailable(String),
}

/// Failure loading or validating engine configuration.
#[derive(Debug, Error)]
pub enum EngineConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for environment variable {var}")]
    Env { var: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
