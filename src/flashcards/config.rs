use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How strictly the store checks its sort-order invariants after a write
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum InvariantCheckMode {
    /// Validate every write and reject it with an error on failure
    #[default]
    Always,
    /// Validate under `debug_assertions` only, panicking on failure
    DebugAssert,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default)]
    pub invariant_checks: InvariantCheckMode,
    /// Seed a freshly built store with the default deck
    #[serde(default)]
    pub seed_defaults: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            invariant_checks: InvariantCheckMode::Always,
            seed_defaults: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl StoreConfig {
    /// Parse a TOML document, e.g.
    ///
    /// ```toml
    /// invariantChecks = "debugAssert"
    /// seedDefaults = true
    /// ```
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Whether writes should run the full invariant check in this build
    pub(crate) fn checks_enabled(&self) -> bool {
        match self.invariant_checks {
            InvariantCheckMode::Always => true,
            InvariantCheckMode::DebugAssert => cfg!(debug_assertions),
        }
    }
}
