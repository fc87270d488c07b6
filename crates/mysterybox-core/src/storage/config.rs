//! TOML-based application configuration.
//!
//! Stores runtime settings including:
//! - Gateway endpoint, tracked token and expected account network
//! - Balance polling cadence
//! - Idle timeout and fallback tick
//! - Mint endpoint and offline queue retention
//!
//! Configuration is stored at `~/.config/mysterybox/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;

/// Ledger gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub url: String,
    /// Resource address whose balance is displayed.
    #[serde(default = "default_token_address")]
    pub token_address: String,
    /// Prefix every connected account address must carry.
    #[serde(default = "default_network_prefix")]
    pub account_prefix: String,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    /// Whole-request timeout for gateway calls.
    #[serde(default = "default_gateway_timeout_ms")]
    pub timeout_ms: u64,
}

/// Balance polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

/// Idle session guard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleConfig {
    #[serde(default = "default_idle_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_idle_tick_secs")]
    pub tick_secs: u64,
}

/// Mint submission configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintConfig {
    #[serde(default = "default_mint_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/mysterybox/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub idle: IdleConfig,
    #[serde(default)]
    pub mint: MintConfig,
}

// Default functions
fn default_gateway_url() -> String {
    "https://stokenet.radixdlt.com".into()
}
fn default_token_address() -> String {
    "resource_tdx_2_1tknxxxxxxxxxradxrdxxxxxxxxx009923554798xxxxxxxxxtfd2jc".into()
}
fn default_network_prefix() -> String {
    "account_tdx_2_".into()
}
fn default_page_limit() -> u32 {
    200
}
fn default_gateway_timeout_ms() -> u64 {
    10_000
}
fn default_poll_interval_ms() -> u64 {
    5_000
}
fn default_idle_timeout_secs() -> u64 {
    300
}
fn default_idle_tick_secs() -> u64 {
    5
}
fn default_mint_endpoint() -> String {
    "http://localhost:8080/api/mint".into()
}
fn default_retention_hours() -> u64 {
    24
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            token_address: default_token_address(),
            account_prefix: default_network_prefix(),
            page_limit: default_page_limit(),
            timeout_ms: default_gateway_timeout_ms(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_idle_timeout_secs(),
            tick_secs: default_idle_tick_secs(),
        }
    }
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            endpoint: default_mint_endpoint(),
            retention_hours: default_retention_hours(),
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl IdleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

/// Longest queue retention accepted: one year.
pub const MAX_RETENTION_HOURS: u64 = 24 * 365;

impl MintConfig {
    /// Retention window, clamped to `1..=MAX_RETENTION_HOURS` hours.
    pub fn retention(&self) -> chrono::Duration {
        let hours = self.retention_hours.clamp(1, MAX_RETENTION_HOURS) as i64;
        chrono::TimeDelta::try_hours(hours).unwrap_or_else(chrono::TimeDelta::zero)
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Load from disk or return (and write) the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_toml(&content),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Parse a TOML document; missing fields take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let cfg: Config =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, raw) in [
            ("gateway.url", &self.gateway.url),
            ("mint.endpoint", &self.mint.endpoint),
        ] {
            let parsed = url::Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("unsupported scheme '{}'", parsed.scheme()),
                });
            }
        }
        if self.gateway.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "gateway.timeout_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        if !(1..=MAX_RETENTION_HOURS).contains(&self.mint.retention_hours) {
            return Err(ConfigError::InvalidValue {
                key: "mint.retention_hours".into(),
                message: format!("must be between 1 and {MAX_RETENTION_HOURS}"),
            });
        }
        if self.polling.interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "polling.interval_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.idle.tick_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "idle.tick_secs".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key without persisting.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and save. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed = Config::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.polling.interval_ms, 5_000);
        assert_eq!(parsed.idle.timeout_secs, 300);
        assert_eq!(parsed.mint.retention_hours, 24);
    }

    #[test]
    fn partial_file_takes_defaults() {
        let cfg = Config::from_toml("[polling]\ninterval_ms = 1500\n").unwrap();
        assert_eq!(cfg.polling.interval(), Duration::from_millis(1500));
        assert_eq!(cfg.gateway.account_prefix, "account_tdx_2_");
        assert_eq!(cfg.idle.tick(), Duration::from_secs(5));
    }

    #[test]
    fn get_by_dot_path() {
        let cfg = Config::default();
        assert_eq!(cfg.get("polling.interval_ms").as_deref(), Some("5000"));
        assert_eq!(
            cfg.get("gateway.url").as_deref(),
            Some("https://stokenet.radixdlt.com")
        );
        assert!(cfg.get("gateway.nope").is_none());
        assert!(cfg.get("").is_none());
    }

    #[test]
    fn apply_updates_numbers_and_strings() {
        let mut cfg = Config::default();
        cfg.apply("idle.timeout_secs", "120").unwrap();
        cfg.apply("mint.endpoint", "https://box.example/api/mint").unwrap();
        assert_eq!(cfg.idle.timeout_secs, 120);
        assert_eq!(cfg.mint.endpoint, "https://box.example/api/mint");
    }

    #[test]
    fn apply_rejects_unknown_and_malformed() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.apply("idle.nope", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.apply("idle.timeout_secs", "soon"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.apply("polling.interval_ms", "0"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.apply("gateway.url", "not a url"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(cfg.polling.interval_ms, 5_000);
    }

    #[test]
    fn retention_out_of_range_is_rejected() {
        let mut cfg = Config::default();
        for bad in ["0", "9999999999999", "18446744073709551615"] {
            assert!(matches!(
                cfg.apply("mint.retention_hours", bad),
                Err(ConfigError::InvalidValue { .. })
            ));
        }
        assert_eq!(cfg.mint.retention_hours, 24);
        cfg.apply("mint.retention_hours", "8760").unwrap();
        assert_eq!(cfg.mint.retention(), chrono::Duration::hours(8760));
    }

    #[test]
    fn retention_never_panics_on_unchecked_values() {
        let mint = MintConfig {
            retention_hours: u64::MAX,
            ..MintConfig::default()
        };
        assert_eq!(mint.retention(), chrono::Duration::hours(MAX_RETENTION_HOURS as i64));
        let mint = MintConfig {
            retention_hours: 0,
            ..MintConfig::default()
        };
        assert_eq!(mint.retention(), chrono::Duration::hours(1));
    }

    #[test]
    fn endpoints_must_be_http() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.apply("mint.endpoint", "ftp://localhost/api/mint"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(cfg.mint.endpoint, "http://localhost:8080/api/mint");
    }

    #[test]
    fn gateway_timeout_has_default_and_must_be_positive() {
        let mut cfg = Config::default();
        assert_eq!(cfg.gateway.timeout(), Duration::from_secs(10));
        assert!(matches!(
            cfg.apply("gateway.timeout_ms", "0"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
