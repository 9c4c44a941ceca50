//! Session configuration
//!
//! Loads [`SessionConfig`] from JSON and validates it once, before any
//! coordinator is built from it.

pub mod schema;

pub use schema::{DataChannelConfig, RecorderConfig, SessionConfig};

use crate::utils::error::{MediaError, MediaResult};
use std::fs;
use std::path::Path;

impl SessionConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(content: &str) -> MediaResult<Self> {
        let config: SessionConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_file(path: &Path) -> MediaResult<Self> {
        if !path.is_file() {
            return Err(MediaError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;

        tracing::debug!("Loaded session config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> MediaResult<()> {
        if self.ice_servers.iter().any(|server| server.urls.is_empty()) {
            return Err(MediaError::Config(
                "every ICE server needs at least one url".to_string(),
            ));
        }
        if self.data_channel.label.is_empty() {
            return Err(MediaError::Config(
                "data channel label must not be empty".to_string(),
            ));
        }
        if self.recorder.mime_preferences.is_empty() {
            return Err(MediaError::Config(
                "recorder needs at least one preferred mime type".to_string(),
            ));
        }
        if self.recorder.timeslice_ms == 0 {
            return Err(MediaError::Config(
                "recorder timeslice must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
