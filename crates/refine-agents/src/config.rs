//! Engine configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (`REFINE_*`)
//! 2. Values from a TOML file
//! 3. Built-in defaults
//!
//! ## Environment variables
//!
//! | Variable                      | Field                              |
//! |-------------------------------|------------------------------------|
//! | `REFINE_STRATEGY`             | `strategy`                         |
//! | `REFINE_QUALITY_THRESHOLD`    | `evaluation.quality_threshold`     |
//! | `REFINE_MAX_ITERATIONS`       | `evaluation.max_iterations`        |
//! | `REFINE_REVIEW_THRESHOLD`     | `evaluation.review_threshold`      |
//! | `REFINE_STRICT_MODE`          | `evaluation.strict_mode`           |
//! | `REFINE_BASE_URL`             | `llm.base_url`                     |
//! | `REFINE_API_KEY`              | `llm.api_key`                      |
//! | `REFINE_MODEL`                | `llm.model`                        |
//! | `REFINE_TEMPERATURE`          | `llm.temperature`                  |
//! | `REFINE_CALL_TIMEOUT_SECS`    | `llm.call_timeout_secs`            |
//! | `REFINE_MAX_CONCURRENT_RUNS`  | `pool.max_concurrent_runs`         |
//! | `REFINE_LLM_META`             | `meta.llm_meta_enabled`            |

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use evaluation::{canonical_profiles, ArenaConfig, EvaluationConfig, ExpertProfile, StrategyKind};
use serde::{Deserialize, Serialize};

use crate::errors::EngineConfigError;

/// Default OpenAI-compatible endpoint (local vLLM / llama.cpp server).
const DEFAULT_BASE_URL: &str = "http://localhost:8080/v1";
const DEFAULT_MODEL: &str = "Qwen3.5-397B-A17B";
const DEFAULT_TEMPERATURE: f64 = 0.3;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;

const ENV_STRATEGY: &str = "REFINE_STRATEGY";
const ENV_QUALITY_THRESHOLD: &str = "REFINE_QUALITY_THRESHOLD";
const ENV_MAX_ITERATIONS: &str = "REFINE_MAX_ITERATIONS";
const ENV_REVIEW_THRESHOLD: &str = "REFINE_REVIEW_THRESHOLD";
const ENV_STRICT_MODE: &str = "REFINE_STRICT_MODE";
const ENV_BASE_URL: &str = "REFINE_BASE_URL";
const ENV_API_KEY: &str = "REFINE_API_KEY";
const ENV_MODEL: &str = "REFINE_MODEL";
const ENV_TEMPERATURE: &str = "REFINE_TEMPERATURE";
const ENV_CALL_TIMEOUT_SECS: &str = "REFINE_CALL_TIMEOUT_SECS";
const ENV_MAX_CONCURRENT_RUNS: &str = "REFINE_MAX_CONCURRENT_RUNS";
const ENV_LLM_META: &str = "REFINE_LLM_META";

/// OpenAI-compatible inference endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmProviderConfig {
    /// Base URL for the OpenAI-compatible API (e.g. `http://localhost:8080/v1`).
    pub base_url: String,
    /// Most local servers accept any non-empty value.
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    /// Deadline applied to every generation call.
    pub call_timeout_secs: u64,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: "local".to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
        }
    }
}

impl LlmProviderConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("llm.base_url must not be empty".to_string());
        }
        if self.model.trim().is_empty() {
            return Err("llm.model must not be empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "llm.temperature must be in [0, 2], got {}",
                self.temperature
            ));
        }
        if self.call_timeout_secs == 0 {
            return Err("llm.call_timeout_secs must be > 0".to_string());
        }
        Ok(())
    }
}

/// Cross-run worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_concurrent_runs: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: DEFAULT_MAX_CONCURRENT_RUNS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaConfig {
    /// Ask the model to audit evaluation histories.
    pub llm_meta_enabled: bool,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            llm_meta_enabled: true,
        }
    }
}

/// Everything the engine needs to build strategies and run loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub evaluation: EvaluationConfig,
    pub strategy: StrategyKind,
    pub llm: LlmProviderConfig,
    pub arena: ArenaConfig,
    pub experts: Vec<ExpertProfile>,
    pub pool: PoolConfig,
    pub meta: MetaConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evaluation: EvaluationConfig::default(),
            strategy: StrategyKind::default(),
            llm: LlmProviderConfig::default(),
            arena: ArenaConfig::default(),
            experts: canonical_profiles(),
            pool: PoolConfig::default(),
            meta: MetaConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing sections keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, EngineConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, EngineConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| EngineConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Defaults, then the optional TOML file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, EngineConfigError> {
        Self::load_with(path, |var| std::env::var(var).ok())
    }

    /// Like [`load`](Self::load) with an injectable environment lookup.
    pub fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, EngineConfigError> {
        let mut config = match path {
            Some(p) => Self::from_toml_file(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides(lookup)?;
        config.validate().map_err(EngineConfigError::Invalid)?;
        Ok(config)
    }

    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), EngineConfigError> {
        if let Some(v) = lookup(ENV_STRATEGY) {
            self.strategy = parse_env(ENV_STRATEGY, &v)?;
        }
        if let Some(v) = lookup(ENV_QUALITY_THRESHOLD) {
            self.evaluation.quality_threshold = parse_env(ENV_QUALITY_THRESHOLD, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_ITERATIONS) {
            self.evaluation.max_iterations = parse_env(ENV_MAX_ITERATIONS, &v)?;
        }
        if let Some(v) = lookup(ENV_REVIEW_THRESHOLD) {
            self.evaluation.review_threshold = parse_env(ENV_REVIEW_THRESHOLD, &v)?;
        }
        if let Some(v) = lookup(ENV_STRICT_MODE) {
            self.evaluation.strict_mode = parse_env_bool(ENV_STRICT_MODE, &v)?;
        }
        if let Some(v) = lookup(ENV_BASE_URL) {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup(ENV_API_KEY) {
            self.llm.api_key = v;
        }
        if let Some(v) = lookup(ENV_MODEL) {
            self.llm.model = v;
        }
        if let Some(v) = lookup(ENV_TEMPERATURE) {
            self.llm.temperature = parse_env(ENV_TEMPERATURE, &v)?;
        }
        if let Some(v) = lookup(ENV_CALL_TIMEOUT_SECS) {
            self.llm.call_timeout_secs = parse_env(ENV_CALL_TIMEOUT_SECS, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_CONCURRENT_RUNS) {
            self.pool.max_concurrent_runs = parse_env(ENV_MAX_CONCURRENT_RUNS, &v)?;
        }
        if let Some(v) = lookup(ENV_LLM_META) {
            self.meta.llm_meta_enabled = parse_env_bool(ENV_LLM_META, &v)?;
        }
        Ok(())
    }

    /// Validate all sub-configs.
    pub fn validate(&self) -> Result<(), String> {
        self.evaluation.validate()?;
        self.llm.validate()?;
        self.arena.validate()?;
        if self.pool.max_concurrent_runs == 0 {
            return Err("pool.max_concurrent_runs must be > 0".to_string());
        }
        if self.strategy == StrategyKind::MultiExpert && self.experts.is_empty() {
            return Err("multi_expert strategy needs at least one expert".to_string());
        }
        for expert in &self.experts {
            expert.validate()?;
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(var: &str, value: &str) -> Result<T, EngineConfigError> {
    value.trim().parse().map_err(|_| EngineConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn parse_env_bool(var: &str, value: &str) -> Result<bool, EngineConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(EngineConfigError::Env {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn default_config_validates() {
        let cfg = EngineConfig::default();
        cfg.validate().expect("default config should be valid");
        assert_eq!(cfg.experts.len(), 5);
        assert_eq!(cfg.strategy, StrategyKind::RuleBased);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            strategy = "multi_expert"

            [evaluation]
            quality_threshold = 0.9

            [arena]
            max_rounds = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.strategy, StrategyKind::MultiExpert);
        assert_eq!(cfg.evaluation.quality_threshold, 0.9);
        assert_eq!(cfg.evaluation.max_iterations, 3);
        assert_eq!(cfg.arena.max_rounds, 5);
        assert_eq!(cfg.arena.improvement_threshold, 0.1);
        assert_eq!(cfg.llm, LlmProviderConfig::default());
    }

    #[test]
    fn env_overrides_toml() {
        let mut cfg = EngineConfig::from_toml_str("[evaluation]\nmax_iterations = 7\n").unwrap();
        cfg.apply_env_overrides(env(&[
            (ENV_MAX_ITERATIONS, "2"),
            (ENV_STRATEGY, "llm-graded"),
            (ENV_STRICT_MODE, "yes"),
            (ENV_MODEL, "local-model"),
        ]))
        .unwrap();
        assert_eq!(cfg.evaluation.max_iterations, 2);
        assert_eq!(cfg.strategy, StrategyKind::LlmGraded);
        assert!(cfg.evaluation.strict_mode);
        assert_eq!(cfg.llm.model, "local-model");
    }

    #[test]
    fn bad_env_value_rejected() {
        let mut cfg = EngineConfig::default();
        let err = cfg
            .apply_env_overrides(env(&[(ENV_QUALITY_THRESHOLD, "high")]))
            .unwrap_err();
        assert!(matches!(err, EngineConfigError::Env { ref var, .. } if var == ENV_QUALITY_THRESHOLD));
    }

    #[test]
    fn invalid_values_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.pool.max_concurrent_runs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.llm.call_timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.strategy = StrategyKind::MultiExpert;
        cfg.experts.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = EngineConfig::from_toml_str("strategy = ").unwrap_err();
        assert!(matches!(err, EngineConfigError::Parse(_)));
    }
}
