/*
 * This file is part of Terrarium.
 *
 * Copyright (C) 2025 Terrarium contributors
 *
 * Terrarium is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Terrarium is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Terrarium. If not, see <https://www.gnu.org/licenses/>.
 */

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tr_core::constants::{link as link_const, paths, remote, timing};
use tr_core::ControlTuning;
use tr_error::{Result, TerrariumError};
use tr_protocol::Settings;

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Device paths probed in order; the first that opens wins
    pub ports: Vec<String>,
    pub baud_rate: u32,
    pub reopen_delay_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ports: link_const::DEFAULT_PORTS.iter().map(|p| p.to_string()).collect(),
            baud_rate: link_const::DEFAULT_BAUD_RATE,
            reopen_delay_ms: link_const::REOPEN_DELAY.as_millis() as u64,
        }
    }
}

impl LinkConfig {
    pub fn reopen_delay(&self) -> Duration {
        Duration::from_millis(self.reopen_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlConfig {
    /// Minimum spacing of outbound commands
    pub send_interval_ms: u64,
    pub tuning: ControlTuning,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            send_interval_ms: timing::SEND_INTERVAL.as_millis() as u64,
            tuning: ControlTuning::default(),
        }
    }
}

impl ControlConfig {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}

/// Remote telemetry and settings channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub base_url: String,
    pub upload_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub write_api_key: Option<String>,
    pub settings_channel_id: Option<String>,
    pub read_api_key: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: remote::DEFAULT_BASE_URL.to_string(),
            upload_interval_ms: timing::UPLOAD_INTERVAL.as_millis() as u64,
            poll_interval_ms: timing::SETTINGS_POLL_INTERVAL.as_millis() as u64,
            request_timeout_ms: timing::REQUEST_TIMEOUT.as_millis() as u64,
            write_api_key: None,
            settings_channel_id: None,
            read_api_key: None,
        }
    }
}

impl TelemetryConfig {
    pub fn upload_interval(&self) -> Duration {
        Duration::from_millis(self.upload_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Uploads need a write key
    pub fn upload_enabled(&self) -> bool {
        self.enabled && has_value(&self.write_api_key)
    }

    /// Polling needs a channel id; the read key is optional for public channels
    pub fn poll_enabled(&self) -> bool {
        self.enabled && has_value(&self.settings_channel_id)
    }
}

fn has_value(v: &Option<String>) -> bool {
    v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
}

/// Full daemon configuration; every field has a default so an empty file is valid
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub link: LinkConfig,
    pub control: ControlConfig,
    /// Setpoints used until the first successful settings poll
    pub defaults: Settings,
    pub telemetry: TelemetryConfig,
}

impl DaemonConfig {
    /// Credentials from the environment take precedence over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = env::var(paths::WRITE_KEY_ENV) {
            self.telemetry.write_api_key = Some(key);
        }
        if let Ok(id) = env::var(paths::SETTINGS_CHANNEL_ENV) {
            self.telemetry.settings_channel_id = Some(id);
        }
        if let Ok(key) = env::var(paths::READ_KEY_ENV) {
            self.telemetry.read_api_key = Some(key);
        }
    }

    /// Reject values that would stall or break the daemon
    ///
    /// Telemetry without any usable credential is switched off with a warning
    /// instead of failing startup.
    pub fn validate(&mut self) -> Result<()> {
        if self.link.ports.is_empty() {
            return Err(TerrariumError::invalid_config("link.ports", "at least one port is required"));
        }
        if self.link.baud_rate == 0 {
            return Err(TerrariumError::invalid_config("link.baud_rate", "must be positive"));
        }
        if self.link.reopen_delay_ms == 0 {
            return Err(TerrariumError::invalid_config("link.reopen_delay_ms", "must be positive"));
        }
        if self.control.send_interval_ms == 0 {
            return Err(TerrariumError::invalid_config("control.send_interval_ms", "must be positive"));
        }
        self.control.tuning.validate()?;
        self.defaults.validate()?;

        let t = &self.telemetry;
        if t.upload_interval_ms == 0 || t.poll_interval_ms == 0 || t.request_timeout_ms == 0 {
            return Err(TerrariumError::invalid_config("telemetry", "intervals and timeout must be positive"));
        }
        if t.base_url.trim().is_empty() {
            return Err(TerrariumError::invalid_config("telemetry.base_url", "must not be empty"));
        }

        if t.enabled && !t.upload_enabled() && !t.poll_enabled() {
            warn!(
                "Telemetry enabled but neither {} nor {} is set - disabling telemetry",
                paths::WRITE_KEY_ENV,
                paths::SETTINGS_CHANNEL_ENV
            );
            self.telemetry.enabled = false;
        }
        Ok(())
    }
}

/// Resolve the config path: explicit argument, then environment, then the system default
pub fn config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = env::var(paths::CONFIG_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    PathBuf::from(paths::DEFAULT_CONFIG_FILE)
}

/// Load, override from the environment and validate
///
/// A missing file yields defaults; a malformed one is an error.
pub fn load_config(path: &Path) -> Result<DaemonConfig> {
    let mut config = if path.exists() {
        let data = fs::read_to_string(path).map_err(|source| TerrariumError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str::<DaemonConfig>(&data)?
    } else {
        debug!("Config file {} not found, using defaults", path.display());
        DaemonConfig::default()
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn clear_env() {
        env::remove_var(paths::WRITE_KEY_ENV);
        env::remove_var(paths::SETTINGS_CHANNEL_ENV);
        env::remove_var(paths::READ_KEY_ENV);
        env::remove_var(paths::CONFIG_ENV);
    }

    #[test]
    #[serial]
    fn test_missing_file_gives_defaults() {
        clear_env();
        let cfg = load_config(Path::new("/nonexistent/terrarium/config.json")).unwrap();
        assert_eq!(cfg.link.ports.len(), 4);
        assert_eq!(cfg.link.baud_rate, 9600);
        assert_eq!(cfg.control.send_interval(), Duration::from_secs(2));
        assert_eq!(cfg.defaults, Settings::default());
        // No credentials: telemetry switched off
        assert!(!cfg.telemetry.enabled);
    }

    #[test]
    #[serial]
    fn test_partial_file_keeps_other_defaults() {
        clear_env();
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "link": {{ "ports": ["/dev/ttyACM0"] }},
                "defaults": {{ "temp_target": 27.5 }},
                "telemetry": {{ "write_api_key": "W", "settings_channel_id": "123" }}
            }}"#
        )
        .unwrap();

        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.link.ports, vec!["/dev/ttyACM0".to_string()]);
        assert_eq!(cfg.link.baud_rate, 9600);
        assert_eq!(cfg.defaults.temp_target, 27.5);
        assert_eq!(cfg.defaults.hum_target, 30.0);
        assert!(cfg.telemetry.upload_enabled());
        assert!(cfg.telemetry.poll_enabled());
    }

    #[test]
    #[serial]
    fn test_malformed_file_is_error() {
        clear_env();
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(load_config(file.path()), Err(TerrariumError::JsonParse(_))));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "unknown_section": 1 }}"#).unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides_credentials() {
        clear_env();
        env::set_var(paths::WRITE_KEY_ENV, "ENVKEY");
        env::set_var(paths::SETTINGS_CHANNEL_ENV, "42");

        let cfg = load_config(Path::new("/nonexistent/config.json")).unwrap();
        assert_eq!(cfg.telemetry.write_api_key.as_deref(), Some("ENVKEY"));
        assert_eq!(cfg.telemetry.settings_channel_id.as_deref(), Some("42"));
        assert!(cfg.telemetry.enabled);
        assert!(cfg.telemetry.read_api_key.is_none());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_path_resolution() {
        clear_env();
        assert_eq!(config_path(None), PathBuf::from(paths::DEFAULT_CONFIG_FILE));

        env::set_var(paths::CONFIG_ENV, "/tmp/terrarium.json");
        assert_eq!(config_path(None), PathBuf::from("/tmp/terrarium.json"));
        assert_eq!(config_path(Some(Path::new("/opt/t.json"))), PathBuf::from("/opt/t.json"));
        clear_env();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = DaemonConfig::default();
        cfg.link.ports.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = DaemonConfig::default();
        cfg.control.send_interval_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = DaemonConfig::default();
        cfg.control.tuning.min_out = 255;
        cfg.control.tuning.max_out = 100;
        assert!(cfg.validate().is_err());

        let mut cfg = DaemonConfig::default();
        cfg.defaults.temp_target = f32::INFINITY;
        assert!(cfg.validate().is_err());
    }
}
