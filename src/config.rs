use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::{
    diagnostics::Result,
    runtime::{ExecutionLimits, DEFAULT_MAX_STEPS},
};

/// Engine settings read from a TOML file. Every key is optional.
///
/// ```toml
/// max_steps = 500000
/// timeout_ms = 2000
/// log_level = "info"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub max_steps: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: Some(DEFAULT_MAX_STEPS),
            timeout_ms: None,
            log_level: "warn".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// A `max_steps` of zero disables the step budget.
    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            max_steps: self.max_steps.filter(|&steps| steps > 0),
            timeout: self.timeout_ms.map(Duration::from_millis),
        }
    }
}
