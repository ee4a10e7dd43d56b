//! Runtime configuration
//!
//! Values come from an optional TOML file and are then overridden by
//! environment variables:
//!
//! | variable | field |
//! |----------|-------|
//! | `RLPOD_PODS_DIR` | `pods_dir` |
//! | `RLPOD_DEFAULT_PERIOD` | `window.period` |
//! | `RLPOD_DEFAULT_INTERVAL` | `window.interval` |
//! | `RLPOD_DEFAULT_GRANULARITY` | `window.granularity` |
//! | `RLPOD_FETCH_TIMEOUT_SECS` | `fetch.timeout_secs` |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{PodError, Result};

/// Window values applied when a manifest omits them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDefaults {
    /// Default period
    #[serde(default = "default_period")]
    pub period: String,
    /// Default interval
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Default granularity
    #[serde(default = "default_granularity")]
    pub granularity: String,
}

fn default_period() -> String {
    "72h".to_string()
}

fn default_interval() -> String {
    "1m".to_string()
}

fn default_granularity() -> String {
    "10s".to_string()
}

impl Default for WindowDefaults {
    fn default() -> Self {
        Self {
            period: default_period(),
            interval: default_interval(),
            granularity: default_granularity(),
        }
    }
}

/// Fetch behaviour
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Deadline for a whole aggregation, in seconds; none by default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl FetchConfig {
    /// Deadline as a duration
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Top-level runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directory scanned for pod manifests
    #[serde(default = "default_pods_dir")]
    pub pods_dir: PathBuf,
    /// Window defaults
    #[serde(default)]
    pub window: WindowDefaults,
    /// Fetch behaviour
    #[serde(default)]
    pub fetch: FetchConfig,
}

fn default_pods_dir() -> PathBuf {
    PathBuf::from("pods")
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pods_dir: default_pods_dir(),
            window: WindowDefaults::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PodError::config(format!("invalid config: {e}")))
    }

    /// Load from a file (if given) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up by variable name
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("RLPOD_PODS_DIR") {
            self.pods_dir = PathBuf::from(dir);
        }
        if let Some(period) = lookup("RLPOD_DEFAULT_PERIOD") {
            self.window.period = period;
        }
        if let Some(interval) = lookup("RLPOD_DEFAULT_INTERVAL") {
            self.window.interval = interval;
        }
        if let Some(granularity) = lookup("RLPOD_DEFAULT_GRANULARITY") {
            self.window.granularity = granularity;
        }
        if let Some(secs) = lookup("RLPOD_FETCH_TIMEOUT_SECS") {
            let secs = secs.trim().parse().map_err(|_| {
                PodError::config(format!("RLPOD_FETCH_TIMEOUT_SECS must be an integer, got '{secs}'"))
            })?;
            self.fetch.timeout_secs = Some(secs);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.pods_dir, PathBuf::from("pods"));
        assert_eq!(config.window.period, "72h");
        assert_eq!(config.window.interval, "1m");
        assert_eq!(config.window.granularity, "10s");
        assert_eq!(config.fetch.timeout(), None);
    }

    #[test]
    fn test_partial_toml() {
        let config = RuntimeConfig::from_toml(
            r#"
pods_dir = "/srv/pods"

[window]
period = "24h"

[fetch]
timeout_secs = 30
"#,
        )
        .unwrap();

        assert_eq!(config.pods_dir, PathBuf::from("/srv/pods"));
        assert_eq!(config.window.period, "24h");
        assert_eq!(config.window.interval, "1m");
        assert_eq!(config.fetch.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RLPOD_DEFAULT_GRANULARITY", "5s"),
            ("RLPOD_FETCH_TIMEOUT_SECS", "12"),
        ]
        .into_iter()
        .collect();

        let config = RuntimeConfig::default()
            .with_overrides(|key| vars.get(key).map(ToString::to_string))
            .unwrap();
        assert_eq!(config.window.granularity, "5s");
        assert_eq!(config.fetch.timeout_secs, Some(12));

        let err = RuntimeConfig::default()
            .with_overrides(|key| (key == "RLPOD_FETCH_TIMEOUT_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, PodError::Configuration(_)));
    }
}
