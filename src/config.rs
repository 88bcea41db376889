use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};

use crate::error::{RateLimitError, Result};

/// Pseudo-role applied when the caller presents no role, and the fallback
/// for roles missing from the quota table.
pub const UNAUTHENTICATED_ROLE: &str = "unauthenticated";

/// What the service does with a request when the counter store fails.
///
/// This is deliberately an explicit setting: a store outage is never an
/// implicit Allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Admit the request and log the store failure.
    FailOpen,
    /// Surface the store failure so the edge can answer 503.
    FailClosed,
}

/// Limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Length of the fixed counting window, in seconds.
    pub window_secs: u64,
    /// Role label -> requests permitted per window (inclusive of the
    /// request that starts the window).
    pub quotas: HashMap<String, u64>,
    /// Role assumed when the caller presents none.
    pub default_role: String,
    /// Behavior on counter store failure.
    pub failure_mode: FailureMode,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            quotas: default_quotas(),
            default_role: UNAUTHENTICATED_ROLE.to_string(),
            failure_mode: FailureMode::FailClosed,
        }
    }
}

fn default_quotas() -> HashMap<String, u64> {
    HashMap::from([
        ("gold".to_string(), 10),
        ("silver".to_string(), 5),
        ("bronze".to_string(), 2),
        (UNAUTHENTICATED_ROLE.to_string(), 1),
    ])
}

impl LimiterConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Quota for a role. Lookup is total: an unknown role resolves to the
    /// unauthenticated quota, and a table that omits even that falls back
    /// to 1 — never to a more permissive limit.
    pub fn quota_for(&self, role: &str) -> u64 {
        self.quotas.get(role).copied().unwrap_or_else(|| {
            self.quotas
                .get(UNAUTHENTICATED_ROLE)
                .copied()
                .unwrap_or(1)
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_secs == 0 {
            return Err(RateLimitError::Config(
                "window_secs must be greater than zero".to_string(),
            ));
        }
        if self.default_role.is_empty() {
            return Err(RateLimitError::Config(
                "default_role must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from YAML string
pub fn load_config_from_yaml(yaml: &str) -> Result<LimiterConfig> {
    let config: LimiterConfig = serde_yaml::from_str(yaml)
        .map_err(|e| RateLimitError::Config(format!("Failed to parse YAML: {}", e)))?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from YAML file
pub fn load_config_from_file(path: &str) -> Result<LimiterConfig> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_yaml(&content)
}
