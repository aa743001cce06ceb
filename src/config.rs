// SPDX-License-Identifier: MIT

//! Runtime configuration
//!
//! Values come from an optional YAML file and are then overridden by
//! `PACKFLOW_*` environment variables (a `.env` file is honoured when the
//! binary loads it with dotenv).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::PackflowError;

pub const ENV_EVENT_HISTORY: &str = "PACKFLOW_EVENT_HISTORY";
pub const ENV_MAX_STEPS: &str = "PACKFLOW_MAX_STEPS";
pub const ENV_STRICT_CONTRACTS: &str = "PACKFLOW_STRICT_CONTRACTS";

/// Engine and bus settings shared by every flow built from one runtime
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Number of events the bus keeps for post-mortem inspection (0 = off)
    #[serde(default = "default_event_history")]
    pub event_history: usize,
    /// Upper bound on node invocations per `run()`, guards routing cycles
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Treat a missing value for a required input contract as a violation
    #[serde(default)]
    pub strict_contracts: bool,
}

fn default_event_history() -> usize {
    256
}

fn default_max_steps() -> usize {
    1000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_history: default_event_history(),
            max_steps: default_max_steps(),
            strict_contracts: false,
        }
    }
}

impl RuntimeConfig {
    /// Load from an optional YAML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, PackflowError> {
        let mut config = match path {
            Some(path) => Self::from_yaml(&fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        log::debug!("Runtime config: {:?}", config);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, PackflowError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), PackflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_EVENT_HISTORY) {
            self.event_history = parse_var(ENV_EVENT_HISTORY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_STEPS) {
            self.max_steps = parse_var(ENV_MAX_STEPS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_STRICT_CONTRACTS) {
            self.strict_contracts = parse_var(ENV_STRICT_CONTRACTS, &raw)?;
        }
        if self.max_steps == 0 {
            return Err(PackflowError::config("max_steps must be at least 1"));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, PackflowError> {
    raw.trim()
        .parse()
        .map_err(|_| PackflowError::config(format!("{} has invalid value '{}'", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.event_history, 256);
        assert_eq!(config.max_steps, 1000);
        assert!(!config.strict_contracts);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = RuntimeConfig::from_yaml("max_steps: 10").unwrap();
        assert_eq!(config.max_steps, 10);
        assert_eq!(config.event_history, 256);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_EVENT_HISTORY, "0"),
            (ENV_MAX_STEPS, " 25 "),
            (ENV_STRICT_CONTRACTS, "true"),
        ]
        .into_iter()
        .collect();

        let mut config = RuntimeConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.event_history, 0);
        assert_eq!(config.max_steps, 25);
        assert!(config.strict_contracts);
    }

    #[test]
    fn test_invalid_override() {
        let mut config = RuntimeConfig::default();
        let err = config
            .apply_overrides(|name| (name == ENV_MAX_STEPS).then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, PackflowError::Config(_)));

        let err = config
            .apply_overrides(|name| (name == ENV_MAX_STEPS).then(|| "0".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("max_steps"));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            RuntimeConfig::from_yaml("max_steps: [1, 2]"),
            Err(PackflowError::Yaml(_))
        ));
    }
}
