//! Engine configuration
//!
//! This module provides the tunables of the auto-save engine and the instance
//! coordinator. Every field has a default, so a config file only needs to name
//! the values it overrides.

use crate::error::{PrefError, Result};
use crate::types::{file_name, ValueType};
use crate::value::Value;
use prefstore_retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for a settings store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefStoreConfig {
    /// Base name of the rotation and marker files
    pub file_stem: String,
    /// Settle period before the background loop writes, in milliseconds
    pub debounce_ms: u64,
    /// How many times the coordinator tries to open or read the lock file
    pub lock_attempts: usize,
    /// Pause between lock attempts, in milliseconds
    pub lock_retry_pause_ms: u64,
    /// Whether written documents start with a generated-file comment
    pub write_header: bool,
}

impl Default for PrefStoreConfig {
    fn default() -> Self {
        Self {
            file_stem: "settings".to_string(),
            debounce_ms: 500,
            lock_attempts: 5,
            lock_retry_pause_ms: 200,
            write_header: true,
        }
    }
}

impl PrefStoreConfig {
    /// Parse a JSON configuration, then validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        file_name()
            .decode(&Value::from(self.file_stem.as_str()))
            .map_err(|e| PrefError::config(format!("file_stem: {e}")))?;
        if self.lock_attempts == 0 {
            return Err(PrefError::config("lock_attempts must be at least 1"));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Retry policy for lock acquisition
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.lock_attempts,
            Duration::from_millis(self.lock_retry_pause_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PrefStoreConfig::default();
        assert_eq!(config.file_stem, "settings");
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert!(config.write_header);
        assert!(config.validate().is_ok());

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.pause, Duration::from_millis(200));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PrefStoreConfig::from_json_str(r#"{"debounce_ms": 50}"#).unwrap();
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.lock_attempts, 5);
        assert_eq!(config.file_stem, "settings");
    }

    #[test]
    fn test_invalid_stem_rejected() {
        for stem in ["", "a/b", "..", "name."] {
            let config = PrefStoreConfig {
                file_stem: stem.to_string(),
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(PrefError::Config(_))),
                "stem {stem:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_zero_lock_attempts_rejected() {
        let err = PrefStoreConfig::from_json_str(r#"{"lock_attempts": 0}"#).unwrap_err();
        assert!(err.to_string().contains("lock_attempts"));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            PrefStoreConfig::from_json_str("{not json"),
            Err(PrefError::Json(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"file_stem": "session", "write_header": false}}"#).unwrap();
        let config = PrefStoreConfig::load(file.path()).unwrap();
        assert_eq!(config.file_stem, "session");
        assert!(!config.write_header);
    }
}
