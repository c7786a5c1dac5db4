use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.trafikinfo.trafikverket.se/v2/data.json";

/// Longest polling interval accepted, one week.
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Environment variable holding the Trafikverket authentication key.
pub const API_KEY_VAR: &str = "TRAFIKVERKET_API_KEY";

/// Monitor settings.
///
/// Stored as a JSON object on disk; every field is optional:
/// ```json
/// {
///   "location_signature": "G",
///   "hours_back": 3,
///   "hours_ahead": 6,
///   "interval_minutes": 1,
///   "snapshot_path": "TrainData/current_train_delays.csv"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Station code, `G` is Göteborg C.
    pub location_signature: String,
    pub api_url: String,
    pub hours_back: i64,
    pub hours_ahead: i64,
    pub interval_minutes: u64,
    /// Arrivals reported longer ago than this are dropped before classification.
    pub stale_arrival_minutes: i64,
    pub request_timeout_secs: u64,
    /// Wait after a cycle fails for any reason other than fetching.
    pub error_backoff_secs: u64,
    pub snapshot_path: PathBuf,
    pub history_path: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            location_signature: "G".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            hours_back: 3,
            hours_ahead: 6,
            interval_minutes: 1,
            stale_arrival_minutes: 60,
            request_timeout_secs: 30,
            error_backoff_secs: 60,
            snapshot_path: PathBuf::from("TrainData/current_train_delays.csv"),
            history_path: PathBuf::from("TrainData/train_delays_history.csv"),
        }
    }
}

impl MonitorConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config {path}"))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {path}"))?;
        Ok(config)
    }

    pub fn interval(&self) -> Duration {
        interval_from_minutes(self.interval_minutes)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

/// Polling interval for `minutes`, clamped to `1..=MAX_INTERVAL_MINUTES`.
pub fn interval_from_minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.clamp(1, MAX_INTERVAL_MINUTES) * 60)
}

/// Reads the API key from the environment (after `.env` has been loaded).
pub fn api_key_from_env() -> Result<String> {
    std::env::var(API_KEY_VAR).with_context(|| format!("{API_KEY_VAR} must be set"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::temp_dir;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.location_signature, "G");
        assert_eq!(config.hours_back, 3);
        assert_eq!(config.hours_ahead, 6);
        assert_eq!(config.error_backoff(), Duration::from_secs(60));
        assert_eq!(config.interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = temp_dir("config_partial");
        let path = dir.join("monitor.json");
        fs::write(&path, r#"{"location_signature": "Cst", "interval_minutes": 5}"#).unwrap();

        let config = MonitorConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.location_signature, "Cst");
        assert_eq!(config.interval(), Duration::from_secs(300));
        assert_eq!(config.hours_ahead, 6);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let dir = temp_dir("config_bad");
        let path = dir.join("monitor.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(MonitorConfig::load(path.to_str().unwrap()).is_err());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = MonitorConfig {
            interval_minutes: 0,
            ..Default::default()
        };
        assert_eq!(config.interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_huge_interval_is_clamped() {
        let config = MonitorConfig {
            interval_minutes: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.interval(), Duration::from_secs(MAX_INTERVAL_MINUTES * 60));
    }
}
