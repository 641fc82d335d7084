//! Configuration management

use crate::usb::transfers::DEFAULT_TIMEOUT;
use anyhow::{Context, Result, anyhow};
use protocol::DeviceMatcher;
use protocol::types::{ACCEPTED_PRODUCT_IDS, ACCEPTED_VENDOR_IDS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WidgetConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    /// Settle times after reset commands
    #[serde(default)]
    pub timing: TimingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "AppSettings::default_log_level")]
    pub log_level: String,
    /// Log file used while the terminal UI is running
    /// If None, uses ~/.local/share/widget-control/widget-control.log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            log_file: None,
        }
    }
}

impl AppSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }

    /// Configured log file, or the default under the local data directory
    pub fn log_path(&self) -> PathBuf {
        if let Some(path) = &self.log_file {
            return PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
        }

        if let Some(data_dir) = dirs::data_local_dir() {
            data_dir.join("widget-control").join("widget-control.log")
        } else {
            PathBuf::from("widget-control.log")
        }
    }
}

/// Device selection and transfer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Accepted vendor ids ("0x16c0" format)
    #[serde(default = "DeviceSettings::default_vendor_ids")]
    pub vendor_ids: Vec<String>,
    /// Accepted product ids ("0x03e8" format)
    #[serde(default = "DeviceSettings::default_product_ids")]
    pub product_ids: Vec<String>,
    /// Timeout of a single control transfer in milliseconds
    #[serde(default = "DeviceSettings::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            vendor_ids: Self::default_vendor_ids(),
            product_ids: Self::default_product_ids(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

impl DeviceSettings {
    fn default_vendor_ids() -> Vec<String> {
        ACCEPTED_VENDOR_IDS.iter().map(|id| format!("0x{:04x}", id)).collect()
    }

    fn default_product_ids() -> Vec<String> {
        ACCEPTED_PRODUCT_IDS.iter().map(|id| format!("0x{:04x}", id)).collect()
    }

    fn default_timeout_ms() -> u64 {
        DEFAULT_TIMEOUT.as_millis() as u64
    }
}

/// How long to wait for the device to come back after a reset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Interactive soft reset
    #[serde(default = "TimingSettings::default_reset_settle_ms")]
    pub reset_settle_ms: u64,
    /// Interactive factory reset
    #[serde(default = "TimingSettings::default_factory_reset_settle_ms")]
    pub factory_reset_settle_ms: u64,
    /// Reset requested by a batch file
    #[serde(default = "TimingSettings::default_reset_settle_ms")]
    pub batch_reset_settle_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            reset_settle_ms: Self::default_reset_settle_ms(),
            factory_reset_settle_ms: Self::default_factory_reset_settle_ms(),
            batch_reset_settle_ms: Self::default_reset_settle_ms(),
        }
    }
}

impl TimingSettings {
    fn default_reset_settle_ms() -> u64 {
        5000
    }

    fn default_factory_reset_settle_ms() -> u64 {
        5
    }

    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }

    pub fn factory_reset_settle(&self) -> Duration {
        Duration::from_millis(self.factory_reset_settle_ms)
    }

    pub fn batch_reset_settle(&self) -> Duration {
        Duration::from_millis(self.batch_reset_settle_ms)
    }
}

impl WidgetConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/widget-control/config.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: WidgetConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("widget-control").join("config.toml")
        } else {
            PathBuf::from(".config/widget-control/config.toml")
        }
    }

    /// Accepted VID/PID sets
    pub fn matcher(&self) -> Result<DeviceMatcher> {
        Ok(DeviceMatcher {
            vendor_ids: Self::parse_ids(&self.device.vendor_ids, "VID")?,
            product_ids: Self::parse_ids(&self.device.product_ids, "PID")?,
        })
    }

    /// Control transfer timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.device.timeout_ms)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.app.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.app.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.device.vendor_ids.is_empty() || self.device.product_ids.is_empty() {
            return Err(anyhow!("vendor_ids and product_ids must not be empty"));
        }
        for id in &self.device.vendor_ids {
            Self::validate_hex_id(id, "VID")?;
        }
        for id in &self.device.product_ids {
            Self::validate_hex_id(id, "PID")?;
        }

        if self.device.timeout_ms == 0 {
            return Err(anyhow!("timeout_ms must be greater than 0"));
        }

        Ok(())
    }

    fn parse_ids(ids: &[String], name: &str) -> Result<Vec<u16>> {
        ids.iter().map(|id| Self::parse_hex_id(id, name)).collect()
    }

    /// Validate a hex ID (VID or PID)
    fn validate_hex_id(id: &str, name: &str) -> Result<()> {
        Self::parse_hex_id(id, name).map(|_| ())
    }

    fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
        let Some(hex_part) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) else {
            return Err(anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x16c0')",
                name,
                id
            ));
        };

        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(anyhow!(
                "Invalid {} '{}', hex part must be 1-4 digits",
                name,
                id
            ));
        }

        u16::from_str_radix(hex_part, 16)
            .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
    }
}

/// Load configuration from a user-supplied path, expanding `~`
pub fn load_config(path: &Path) -> Result<WidgetConfig> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    WidgetConfig::load(Some(PathBuf::from(expanded)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WidgetConfig::default();
        assert_eq!(config.app.log_level, "info");
        assert_eq!(config.device.timeout_ms, 1000);
        assert_eq!(config.timing.reset_settle_ms, 5000);
        assert_eq!(config.timing.factory_reset_settle_ms, 5);
        assert_eq!(config.timing.batch_reset_settle_ms, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_matcher_is_accepted_set() {
        let matcher = WidgetConfig::default().matcher().unwrap();
        assert_eq!(matcher, DeviceMatcher::default());
    }

    #[test]
    fn test_validate_hex_id() {
        assert!(WidgetConfig::validate_hex_id("0x16c0", "VID").is_ok());
        assert!(WidgetConfig::validate_hex_id("0XFFFE", "VID").is_ok());
        assert!(WidgetConfig::validate_hex_id("0x7", "PID").is_ok());

        assert!(WidgetConfig::validate_hex_id("16c0", "VID").is_err());
        assert!(WidgetConfig::validate_hex_id("0x", "VID").is_err());
        assert!(WidgetConfig::validate_hex_id("0x12345", "VID").is_err());
        assert!(WidgetConfig::validate_hex_id("0xGHIJ", "VID").is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = WidgetConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = WidgetConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.app.log_level, parsed.app.log_level);
        assert_eq!(config.device.vendor_ids, parsed.device.vendor_ids);
        assert_eq!(
            config.timing.factory_reset_settle_ms,
            parsed.timing.factory_reset_settle_ms
        );
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = WidgetConfig::default();
        config.app.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.app.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_path() {
        let mut settings = AppSettings::default();
        assert!(settings.log_path().ends_with("widget-control.log"));

        settings.log_file = Some(PathBuf::from("/tmp/widget.log"));
        assert_eq!(settings.log_path(), PathBuf::from("/tmp/widget.log"));
    }

    #[test]
    fn test_empty_id_list_rejected() {
        let mut config = WidgetConfig::default();
        config.device.product_ids.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations() {
        let config = WidgetConfig::from_toml("[timing]\nreset_settle_ms = 250\n").unwrap();
        assert_eq!(config.timing.reset_settle(), Duration::from_millis(250));
        assert_eq!(config.timing.factory_reset_settle(), Duration::from_millis(5));
        assert_eq!(config.timing.batch_reset_settle(), Duration::from_millis(5000));
        assert_eq!(config.timeout(), Duration::from_millis(1000));
    }
}
