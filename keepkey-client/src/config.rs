//! Client tuning knobs

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ClientError;

/// Timing and buffering for sessions and discovery
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// poll_interval_ms = 250
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Interval between polling reads of each session
    pub poll_interval_ms: u64,
    /// Interval between device enumerations
    pub discovery_interval_ms: u64,
    /// Wait for the first report of a polled message
    pub read_timeout_ms: u64,
    /// Wait for each continuation report
    pub segment_timeout_ms: u64,
    /// Buffered events per session before slow subscribers lag
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            discovery_interval_ms: 1000,
            read_timeout_ms: 50,
            segment_timeout_ms: 1000,
            event_capacity: 64,
        }
    }
}

impl ClientConfig {
    /// Parse from TOML text
    pub fn from_toml(text: &str) -> Result<Self, ClientError> {
        toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn segment_timeout(&self) -> Duration {
        Duration::from_millis(self.segment_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = ClientConfig::default();
        assert_eq!(c.poll_interval(), Duration::from_secs(1));
        assert_eq!(c.read_timeout(), Duration::from_millis(50));
        assert_eq!(c.event_capacity, 64);
    }

    #[test]
    fn test_partial_toml() {
        let c = ClientConfig::from_toml("poll_interval_ms = 250\n").unwrap();
        assert_eq!(c.poll_interval_ms, 250);
        assert_eq!(c.discovery_interval_ms, 1000);
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            ClientConfig::from_toml("poll_interval_ms = \"fast\""),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn test_zero_interval_clamped() {
        let c = ClientConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(c.poll_interval(), Duration::from_millis(1));
    }
}
