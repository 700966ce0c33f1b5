//! Application settings management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Delays of every simulated transition and pipeline, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// `starting` → `running`
    pub boot_delay_ms: u64,
    /// `stopping` → `offline`
    pub stop_delay_ms: u64,
    /// From a restart request until its start is issued
    pub restart_delay_ms: u64,
    /// Echo of an unrecognized console command
    pub echo_delay_ms: u64,
    /// Archive extraction
    pub unzip_delay_ms: u64,
    /// From project creation until image deployment begins
    pub deploy_start_delay_ms: u64,
    /// From the fetch line until the first install tick
    pub install_fetch_delay_ms: u64,
    /// Between install progress ticks
    pub install_tick_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            boot_delay_ms: 1500,
            stop_delay_ms: 1000,
            restart_delay_ms: 2000,
            echo_delay_ms: 200,
            unzip_delay_ms: 800,
            deploy_start_delay_ms: 500,
            install_fetch_delay_ms: 400,
            install_tick_ms: 150,
        }
    }
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Custom data directory
    pub data_directory: Option<PathBuf>,
    /// Address assigned to new instances
    pub default_ip: String,
    /// Enable debug logging
    pub debug_logging: bool,
    /// Simulation delays
    pub timings: Timings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_directory: None,
            default_ip: "192.168.1.10".to_string(),
            debug_logging: false,
            timings: Timings::default(),
        }
    }
}

impl Settings {
    /// Get the data directory, using default if not set
    pub fn get_data_directory(&self) -> PathBuf {
        self.data_directory.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("PteroEngine")
        })
    }

    /// Path of the state database
    pub fn get_database_path(&self) -> PathBuf {
        self.get_data_directory().join("pteroengine.db")
    }

    /// Validate settings and fix any invalid values
    pub fn validate(&mut self) {
        if self.default_ip.trim().is_empty() {
            self.default_ip = Settings::default().default_ip;
        }
        let t = &mut self.timings;
        t.install_tick_ms = t.install_tick_ms.max(1);
        // The stop runs inside the restart window
        t.restart_delay_ms = t.restart_delay_ms.max(t.stop_delay_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_fixes_values() {
        let mut settings = Settings {
            default_ip: "  ".into(),
            timings: Timings {
                install_tick_ms: 0,
                stop_delay_ms: 3000,
                restart_delay_ms: 100,
                ..Timings::default()
            },
            ..Settings::default()
        };
        settings.validate();

        assert_eq!(settings.default_ip, "192.168.1.10");
        assert_eq!(settings.timings.install_tick_ms, 1);
        assert_eq!(settings.timings.restart_delay_ms, 3000);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"timings": {"boot_delay_ms": 10}}"#).unwrap();
        assert_eq!(settings.timings.boot_delay_ms, 10);
        assert_eq!(settings.timings.stop_delay_ms, 1000);
        assert_eq!(settings.default_ip, "192.168.1.10");
    }

    #[test]
    fn test_database_path_under_data_directory() {
        let settings = Settings {
            data_directory: Some(PathBuf::from("/tmp/ptero")),
            ..Settings::default()
        };
        assert_eq!(
            settings.get_database_path(),
            PathBuf::from("/tmp/ptero/pteroengine.db")
        );
    }
}
