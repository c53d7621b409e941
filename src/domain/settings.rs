use crate::domain::controller::ControllerConfig;
use crate::domain::protocol;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "led_control".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Which BLE stack drives the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Live,
    Simulated,
}

/// A fake peripheral offered by the simulated backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulatedDeviceSettings {
    pub address: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub battery_voltage: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub backend: Backend,

    // BLE identifiers
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: String,
    #[serde(default = "default_led_uuid")]
    pub ble_led_char_uuid: String,
    #[serde(default = "default_battery_uuid")]
    pub ble_battery_char_uuid: Option<String>,

    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    #[serde(default = "default_simulated_devices")]
    pub simulated_devices: Vec<SimulatedDeviceSettings>,

    #[serde(default)]
    pub last_connected_address: Option<u64>,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            ble_service_uuid: default_service_uuid(),
            ble_led_char_uuid: default_led_uuid(),
            ble_battery_char_uuid: default_battery_uuid(),
            scan_timeout_secs: default_scan_timeout_secs(),
            simulated_devices: default_simulated_devices(),
            last_connected_address: None,
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    /// Validate the BLE fields and build the controller configuration
    pub fn controller_config(&self) -> anyhow::Result<ControllerConfig> {
        let battery_char_uuid = match self.ble_battery_char_uuid.as_deref() {
            Some(s) if !s.trim().is_empty() => Some(protocol::parse_uuid(s)?),
            _ => None,
        };
        if self.scan_timeout_secs == 0 {
            anyhow::bail!("Scan timeout must be at least one second");
        }

        Ok(ControllerConfig {
            service_uuid: protocol::parse_uuid(&self.ble_service_uuid)?,
            led_char_uuid: protocol::parse_uuid(&self.ble_led_char_uuid)?,
            battery_char_uuid,
            scan_timeout: Duration::from_secs(self.scan_timeout_secs),
        })
    }
}

fn default_service_uuid() -> String {
    protocol::SERVICE_UUID.to_string()
}
fn default_led_uuid() -> String {
    protocol::LED_CHAR_UUID.to_string()
}
fn default_battery_uuid() -> Option<String> {
    Some(protocol::BATTERY_CHAR_UUID.to_string())
}
fn default_scan_timeout_secs() -> u64 {
    10
}
fn default_simulated_devices() -> Vec<SimulatedDeviceSettings> {
    vec![SimulatedDeviceSettings {
        address: 0x24_0A_C4_12_34_56,
        name: Some("ESP32-LED".to_string()),
        battery_voltage: Some("3.92".to_string()),
    }]
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::load(settings_path))
    }

    /// Load from an explicit path, falling back to defaults when the file is
    /// missing or unreadable
    pub fn load(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!("Using default settings ({}): {}", settings_path.display(), e);
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("LEDControl");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn remember_device(&mut self, address: u64) -> anyhow::Result<()> {
        if self.settings.last_connected_address != Some(address) {
            self.settings.last_connected_address = Some(address);
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("led_control_{}_{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join("settings.json")
    }

    #[test]
    fn test_defaults_build_stock_config() {
        let config = Settings::default().controller_config().unwrap();
        assert_eq!(config, protocol::default_config());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "backend": "simulated", "scan_timeout_secs": 5 }"#).unwrap();
        assert_eq!(settings.backend, Backend::Simulated);
        assert_eq!(settings.scan_timeout_secs, 5);
        assert_eq!(settings.ble_led_char_uuid, default_led_uuid());
        assert_eq!(settings.log_settings, LogSettings::default());
    }

    #[test]
    fn test_rejects_bad_uuid() {
        let settings = Settings {
            ble_led_char_uuid: "not-a-uuid".to_string(),
            ..Settings::default()
        };
        assert!(settings.controller_config().is_err());
    }

    #[test]
    fn test_blank_battery_uuid_disables_battery() {
        let settings = Settings {
            ble_battery_char_uuid: Some(String::new()),
            ..Settings::default()
        };
        assert_eq!(settings.controller_config().unwrap().battery_char_uuid, None);
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let path = temp_path("corrupt");
        fs::write(&path, "{ not json").unwrap();
        let service = SettingsService::load(path);
        assert_eq!(service.get(), &Settings::default());
    }

    #[test]
    fn test_save_and_reload() {
        let path = temp_path("roundtrip");
        let mut service = SettingsService::load(path.clone());
        service.get_mut().backend = Backend::Simulated;
        service.remember_device(0xAABB).unwrap();

        let reloaded = SettingsService::load(path);
        assert_eq!(reloaded.get().backend, Backend::Simulated);
        assert_eq!(reloaded.get().last_connected_address, Some(0xAABB));
    }
}
