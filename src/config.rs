//! Engine configuration.
//!
//! Defaults match a stock installation of the client: `yaz-client` on the
//! `PATH` and a 10 second response timeout. Every key is optional in a JSON
//! configuration file.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings for one client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Protocol client executable
    pub client_program: String,
    /// How long to wait for a complete response (milliseconds)
    pub response_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_program: "yaz-client".to_string(),
            response_timeout_ms: 10_000,
        }
    }
}

impl SessionConfig {
    /// Response timeout as a [`Duration`].
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Top-level engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Client session settings
    pub session: SessionConfig,
    /// Fetch record 1 as part of each successful search
    pub prefetch_first_record: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            prefetch_first_record: true,
        }
    }
}

impl EngineConfig {
    /// Load settings from a JSON file; missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.session.client_program, "yaz-client");
        assert_eq!(config.session.response_timeout(), Duration::from_secs(10));
        assert!(config.prefetch_first_record);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"session": {"response_timeout_ms": 2500}}"#).unwrap();
        assert_eq!(config.session.client_program, "yaz-client");
        assert_eq!(config.session.response_timeout(), Duration::from_millis(2500));
        assert!(config.prefetch_first_record);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"prefetch_first_record": false}"#).unwrap();
        let config = EngineConfig::from_json_file(&path).unwrap();
        assert!(!config.prefetch_first_record);
    }
}
