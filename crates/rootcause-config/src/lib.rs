//! Engine configuration and dependency graph loading for rootcause.

mod graph;

pub use graph::{DependencyGraph, GraphDefinition};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Error
// ─────────────────────────────────────────────────────────────────────────────

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Triage Thresholds
// ─────────────────────────────────────────────────────────────────────────────

/// Static golden-signal thresholds used by the deterministic triage pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageThresholds {
    /// p99 over baseline ratio that counts as a latency symptom.
    pub latency_ratio: f64,
    /// Absolute p99 limit used when no baseline is known.
    pub latency_static_ms: f64,
    /// Error rate considered anomalous regardless of baseline.
    pub error_rate: f64,
    /// Error rate over baseline ratio that counts as a symptom.
    pub error_ratio: f64,
    pub saturation: f64,
    /// Relative deviation of request rate from baseline, either direction.
    pub traffic_deviation: f64,
}

impl Default for TriageThresholds {
    fn default() -> Self {
        Self {
            latency_ratio: 2.0,
            latency_static_ms: 2000.0,
            error_rate: 0.05,
            error_ratio: 2.0,
            saturation: 0.9,
            traffic_deviation: 0.5,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine Config
// ─────────────────────────────────────────────────────────────────────────────

/// Upper bound for `run_timeout_secs`: one week.
pub const MAX_RUN_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Workers running at the same time.
    pub max_parallelism: usize,
    /// Tool calls granted to each worker.
    pub tool_budget: u32,
    /// Tasks the planner emits before deferring the rest.
    pub max_planned_tasks: usize,
    /// Hop bound for dependency closures.
    pub closure_hops: usize,
    /// Dispatch rounds including the first; the supervisor finalizes after the last.
    pub max_rounds: u32,
    /// Tasks the supervisor may add per feedback round.
    pub max_tasks_per_round: usize,
    /// Re-prompts after an invalid oracle answer.
    pub submission_retries: u32,
    /// Wall-clock ceiling for the whole run, shared by every dispatch round.
    pub run_timeout_secs: u64,
    pub insight_max_chars: usize,
    pub triage: TriageThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallelism: 3,
            tool_budget: 8,
            max_planned_tasks: 5,
            closure_hops: 2,
            max_rounds: 3,
            max_tasks_per_round: 2,
            submission_retries: 2,
            run_timeout_secs: 600,
            insight_max_chars: 480,
            triage: TriageThresholds::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `ROOTCAUSE_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_override(&lookup, "ROOTCAUSE_MAX_TOOL_CALLS")? {
            self.tool_budget = v;
        }
        if let Some(v) = parse_override(&lookup, "ROOTCAUSE_MAX_PARALLELISM")? {
            self.max_parallelism = v;
        }
        if let Some(v) = parse_override(&lookup, "ROOTCAUSE_MAX_ROUNDS")? {
            self.max_rounds = v;
        }
        if let Some(v) = parse_override(&lookup, "ROOTCAUSE_RUN_TIMEOUT_SECS")? {
            self.run_timeout_secs = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallelism == 0 {
            return Err(ConfigError::Invalid("max_parallelism must be at least 1".into()));
        }
        if self.tool_budget == 0 {
            return Err(ConfigError::Invalid("tool_budget must be at least 1".into()));
        }
        if self.max_rounds == 0 {
            return Err(ConfigError::Invalid("max_rounds must be at least 1".into()));
        }
        if self.max_planned_tasks == 0 {
            return Err(ConfigError::Invalid("max_planned_tasks must be at least 1".into()));
        }
        if self.run_timeout_secs > MAX_RUN_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "run_timeout_secs must be at most {}",
                MAX_RUN_TIMEOUT_SECS
            )));
        }
        Ok(())
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

fn parse_override<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::Invalid(format!("{}={}", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_investigation_budget() {
        let config = EngineConfig::default();
        assert_eq!(config.tool_budget, 8);
        assert_eq!(config.max_parallelism, 3);
        assert_eq!(config.max_rounds, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"tool_budget": 3, "triage": {"saturation": 0.8}}"#).unwrap();
        assert_eq!(config.tool_budget, 3);
        assert_eq!(config.closure_hops, 2);
        assert_eq!(config.triage.saturation, 0.8);
        assert_eq!(config.triage.latency_ratio, 2.0);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ROOTCAUSE_MAX_TOOL_CALLS", "4"),
            ("ROOTCAUSE_MAX_ROUNDS", "2"),
        ]);
        let config = EngineConfig::default()
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.tool_budget, 4);
        assert_eq!(config.max_rounds, 2);
        assert_eq!(config.max_parallelism, 3);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let result = EngineConfig::default().apply_overrides(|k| {
            (k == "ROOTCAUSE_MAX_PARALLELISM").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = EngineConfig::default().apply_overrides(|k| {
            (k == "ROOTCAUSE_MAX_PARALLELISM").then(|| "0".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_run_timeout_bounded() {
        let at_bound = EngineConfig {
            run_timeout_secs: MAX_RUN_TIMEOUT_SECS,
            ..Default::default()
        };
        assert!(at_bound.validate().is_ok());

        let config = EngineConfig {
            run_timeout_secs: u64::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let result = EngineConfig::default().apply_overrides(|k| {
            (k == "ROOTCAUSE_RUN_TIMEOUT_SECS").then(|| u64::MAX.to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
