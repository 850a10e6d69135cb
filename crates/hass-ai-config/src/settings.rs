//! Typed service configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use hass_ai_core::{
    Language, AI_PROVIDER_LOCAL, DEFAULT_BATCH_SIZE, DEFAULT_SCAN_INTERVAL_DAYS, MAX_WEIGHT,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::YamlLoader;

/// Agent id that selects the first non-default conversation agent
pub const AUTO_AGENT: &str = "auto";

/// Inclusive bounds of the config entry's rescan interval (days)
const SCAN_INTERVAL_RANGE: (u32, u32) = (1, 30);

/// Inclusive bounds of a requested batch size
const BATCH_SIZE_RANGE: (usize, usize) = (1, 50);

/// Root of `hass_ai.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HassAiConfig {
    pub server: ServerSettings,
    pub home_assistant: Option<HomeAssistantSettings>,
    /// Config entry data; absent means the integration is not configured
    pub integration: Option<ConfigEntry>,
    pub scan: ScanSettings,
    pub alerts: AlertSettings,
    /// Directory holding `.storage/`
    pub data_dir: PathBuf,
}

impl HassAiConfig {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let value = YamlLoader::for_file(path)?.load_file(path)?;
        let config: HassAiConfig =
            serde_yaml::from_value(value).map_err(|e| ConfigError::InvalidValue {
                key: path.display().to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        info!(
            path = %path.display(),
            configured = config.integration.is_some(),
            "loaded configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(entry) = &self.integration {
            entry.validate()?;
        }
        self.scan.validate()?;
        self.alerts.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Token WebSocket clients must present; any token is accepted when unset
    pub api_token: Option<String>,
    /// Directory with the panel's static files
    pub panel_dir: Option<PathBuf>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8099".to_string(),
            api_token: None,
            panel_dir: None,
        }
    }
}

/// Connection to a running Home Assistant instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeAssistantSettings {
    pub url: String,
    pub token: String,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_sync_interval() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    120
}

/// Data of the integration's config entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    #[serde(default = "default_provider")]
    pub ai_provider: String,
    /// Days between automatic rescans
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u32,
    /// Agent id, `"auto"`, or absent for the host default
    #[serde(default)]
    pub conversation_agent: Option<String>,
}

fn default_provider() -> String {
    AI_PROVIDER_LOCAL.to_string()
}

fn default_scan_interval() -> u32 {
    DEFAULT_SCAN_INTERVAL_DAYS
}

impl Default for ConfigEntry {
    fn default() -> Self {
        Self {
            ai_provider: default_provider(),
            scan_interval: default_scan_interval(),
            conversation_agent: None,
        }
    }
}

impl ConfigEntry {
    pub fn validate(&self) -> ConfigResult<()> {
        let (min, max) = SCAN_INTERVAL_RANGE;
        if !(min..=max).contains(&self.scan_interval) {
            return Err(ConfigError::InvalidValue {
                key: "scan_interval".to_string(),
                reason: format!("must be between {min} and {max} days"),
            });
        }
        if self.ai_provider.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "ai_provider".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Configured agent, with blank strings treated as unset
    pub fn agent(&self) -> Option<&str> {
        self.conversation_agent
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }

    pub fn rescan_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.scan_interval) * 24 * 60 * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub batch_size: usize,
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,
    pub language: Language,
    /// Directory of the JSONL AI interaction logs
    pub log_dir: PathBuf,
    pub correlation_timeout_secs: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            pacing_min_ms: 1500,
            pacing_max_ms: 2500,
            language: Language::En,
            log_dir: PathBuf::from("logs"),
            correlation_timeout_secs: 30,
        }
    }
}

impl ScanSettings {
    pub fn validate(&self) -> ConfigResult<()> {
        check_batch_size(self.batch_size)?;
        if self.pacing_min_ms > self.pacing_max_ms {
            return Err(ConfigError::InvalidValue {
                key: "scan.pacing_min_ms".to_string(),
                reason: "must not exceed scan.pacing_max_ms".to_string(),
            });
        }
        Ok(())
    }

    pub fn pacing(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.pacing_min_ms),
            Duration::from_millis(self.pacing_max_ms),
        )
    }
}

/// Validate a batch size requested by config or a client
pub fn check_batch_size(batch_size: usize) -> ConfigResult<()> {
    let (min, max) = BATCH_SIZE_RANGE;
    if (min..=max).contains(&batch_size) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: "batch_size".to_string(),
            reason: format!("must be between {min} and {max}"),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub enabled: bool,
    /// Entities below this weight are not monitored
    pub min_weight_filter: u8,
    pub use_friendly_messages: bool,
    pub poll_interval_secs: u64,
    pub error_backoff_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_weight_filter: 3,
            use_friendly_messages: true,
            poll_interval_secs: 10,
            error_backoff_secs: 30,
        }
    }
}

impl AlertSettings {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_weight_filter > MAX_WEIGHT {
            return Err(ConfigError::InvalidValue {
                key: "alerts.min_weight_filter".to_string(),
                reason: format!("must be at most {MAX_WEIGHT}"),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "alerts.poll_interval_secs".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config: HassAiConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.integration.is_none());
        assert_eq!(config.scan.batch_size, 10);
        assert_eq!(config.alerts.min_weight_filter, 3);
        assert_eq!(config.server.bind, "0.0.0.0:8099");
        config.validate().unwrap();
    }

    #[test]
    fn test_entry_defaults_and_agent() {
        let entry: ConfigEntry = serde_yaml::from_str("conversation_agent: '  '").unwrap();
        assert_eq!(entry.ai_provider, "Local Agent");
        assert_eq!(entry.scan_interval, 7);
        assert_eq!(entry.agent(), None);

        let entry: ConfigEntry = serde_yaml::from_str("conversation_agent: auto").unwrap();
        assert_eq!(entry.agent(), Some(AUTO_AGENT));
        assert_eq!(entry.rescan_period(), Duration::from_secs(7 * 86_400));
    }

    #[test]
    fn test_scan_interval_bounds() {
        for (days, ok) in [(0, false), (1, true), (30, true), (31, false)] {
            let entry = ConfigEntry {
                scan_interval: days,
                ..Default::default()
            };
            assert_eq!(entry.validate().is_ok(), ok, "days = {days}");
        }
    }

    #[test]
    fn test_batch_size_bounds() {
        assert!(check_batch_size(0).is_err());
        assert!(check_batch_size(1).is_ok());
        assert!(check_batch_size(50).is_ok());
        assert!(check_batch_size(51).is_err());
    }

    #[test]
    fn test_load_file_with_secret() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("secrets.yaml"), "ha_token: abc123\n").unwrap();
        let path = dir.path().join("hass_ai.yaml");
        std::fs::write(
            &path,
            "home_assistant:\n  url: http://ha.local:8123\n  token: !secret ha_token\nintegration:\n  scan_interval: 3\n  conversation_agent: conversation.gpt\nscan:\n  language: it\n",
        )
        .unwrap();

        let config = HassAiConfig::load(&path).unwrap();
        let ha = config.home_assistant.unwrap();
        assert_eq!(ha.token, "abc123");
        assert_eq!(ha.sync_interval_secs, 10);
        let entry = config.integration.unwrap();
        assert_eq!(entry.scan_interval, 3);
        assert_eq!(entry.agent(), Some("conversation.gpt"));
        assert_eq!(config.scan.language, Language::It);
    }

    #[test]
    fn test_load_rejects_invalid_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hass_ai.yaml");
        std::fs::write(&path, "integration:\n  scan_interval: 90\n").unwrap();
        assert!(matches!(
            HassAiConfig::load(&path),
            Err(ConfigError::InvalidValue { key, .. }) if key == "scan_interval"
        ));
    }
}
