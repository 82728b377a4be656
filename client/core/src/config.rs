//! Client configuration

use crate::{LiveError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Env var overriding `api_url`
pub const ENV_API_URL: &str = "TICKET_LIVE_API_URL";
/// Env var overriding `api_token`
pub const ENV_API_TOKEN: &str = "TICKET_LIVE_API_TOKEN";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// API base URL, including the version prefix
    pub api_url: String,
    /// Bearer token sent with every request
    pub api_token: Option<String>,
    /// Event stream path relative to `api_url`
    pub events_path: String,
    /// Wait before reconnecting a dropped stream
    pub reconnect_delay_ms: u64,
    /// How long an updated row stays highlighted
    pub highlight_window_ms: u64,
    /// Wait after triggering enrichment before reloading
    pub enrich_settle_ms: u64,
    pub list_poll_secs: u64,
    pub detail_poll_secs: u64,
    /// Retained notifications
    pub notification_cap: usize,
    pub page_size: u32,
    pub request_timeout_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/api/v1".into(),
            api_token: None,
            events_path: "/events".into(),
            reconnect_delay_ms: 3000,
            highlight_window_ms: 2000,
            enrich_settle_ms: 1500,
            list_poll_secs: 15,
            detail_poll_secs: 10,
            notification_cap: 20,
            page_size: 20,
            request_timeout_secs: 30,
        }
    }
}

impl LiveConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults with env overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply `TICKET_LIVE_*` overrides
    pub fn with_env(self) -> Self {
        self.with_overrides(
            std::env::var(ENV_API_URL).ok(),
            std::env::var(ENV_API_TOKEN).ok(),
        )
    }

    fn with_overrides(mut self, api_url: Option<String>, api_token: Option<String>) -> Self {
        if let Some(url) = api_url.filter(|u| !u.is_empty()) {
            self.api_url = url;
        }
        if let Some(token) = api_token.filter(|t| !t.is_empty()) {
            self.api_token = Some(token);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            return Err(LiveError::Config("api_url is empty".into()));
        }
        let non_zero = [
            ("reconnect_delay_ms", self.reconnect_delay_ms),
            ("highlight_window_ms", self.highlight_window_ms),
            ("list_poll_secs", self.list_poll_secs),
            ("detail_poll_secs", self.detail_poll_secs),
            ("notification_cap", self.notification_cap as u64),
            ("page_size", self.page_size as u64),
            ("request_timeout_secs", self.request_timeout_secs),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(LiveError::Config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    /// Full URL of the event stream
    pub fn events_url(&self) -> String {
        let base = self.api_url.trim_end_matches('/');
        let path = self.events_path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn highlight_window(&self) -> Duration {
        Duration::from_millis(self.highlight_window_ms)
    }

    pub fn enrich_settle(&self) -> Duration {
        Duration::from_millis(self.enrich_settle_ms)
    }

    pub fn list_poll_interval(&self) -> Duration {
        Duration::from_secs(self.list_poll_secs)
    }

    pub fn detail_poll_interval(&self) -> Duration {
        Duration::from_secs(self.detail_poll_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LiveConfig::default();
        assert_eq!(config.reconnect_delay(), Duration::from_millis(3000));
        assert_eq!(config.highlight_window(), Duration::from_millis(2000));
        assert_eq!(config.enrich_settle(), Duration::from_millis(1500));
        assert_eq!(config.list_poll_interval(), Duration::from_secs(15));
        assert_eq!(config.detail_poll_interval(), Duration::from_secs(10));
        assert_eq!(config.notification_cap, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_events_url_joins_cleanly() {
        let mut config = LiveConfig::default();
        assert_eq!(config.events_url(), "http://localhost:8080/api/v1/events");

        config.api_url = "https://fire.example/api/v1/".into();
        config.events_path = "events".into();
        assert_eq!(config.events_url(), "https://fire.example/api/v1/events");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: LiveConfig =
            serde_json::from_str(r#"{"api_url":"http://10.0.0.5/api/v1","list_poll_secs":30}"#).unwrap();
        assert_eq!(config.api_url, "http://10.0.0.5/api/v1");
        assert_eq!(config.list_poll_secs, 30);
        assert_eq!(config.detail_poll_secs, 10);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = LiveConfig {
            list_poll_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LiveError::Config(_))));
    }

    #[test]
    fn test_overrides_skip_empty_values() {
        let config = LiveConfig::default()
            .with_overrides(Some("http://api.internal/v1".into()), Some(String::new()));
        assert_eq!(config.api_url, "http://api.internal/v1");
        assert_eq!(config.api_token, None);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("ticket-live-{}.json", std::process::id()));
        let config = LiveConfig {
            api_token: Some("secret".into()),
            page_size: 50,
            ..Default::default()
        };

        config.save(&path).unwrap();
        let loaded = LiveConfig::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }
}
