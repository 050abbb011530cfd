//! Persistent Settings Management
//!
//! Handles saving/loading the user's toggles to disk.
//!
//! # Storage Locations
//! - macOS: `~/Library/Application Support/com.podrouter.podrouter/settings.json`
//! - Linux: `~/.config/podrouter/settings.json`

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::error::SettingsError;

/// Root settings structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Apply routing automatically when devices change
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,

    /// Start the daemon at login
    #[serde(default)]
    pub launch_at_login: bool,

    /// Replaces the built-in Bluetooth name hints when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bluetooth_name_hints: Option<Vec<String>>,
}

fn default_enabled() -> bool {
    true
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            is_enabled: true,
            launch_at_login: false,
            bluetooth_name_hints: None,
        }
    }
}

impl RouterSettings {
    /// Load settings from the default location
    pub fn load() -> Self {
        match Self::get_config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("Could not determine config path, using default settings");
                Self::default()
            }
        }
    }

    /// Load settings from `path`, or return default if missing/corrupt
    ///
    /// A missing file is treated as a first run: defaults are written so the
    /// enabled flag is persisted.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            let settings = Self::default();
            match settings.save_to(path) {
                Ok(()) => info!("First run, wrote default settings to {:?}", path),
                Err(e) => warn!("Failed to write default settings: {}", e),
            }
            return settings;
        }

        match fs::File::open(path) {
            Ok(file) => match serde_json::from_reader(file) {
                Ok(settings) => {
                    info!("Settings loaded from {:?}", path);
                    return settings;
                }
                Err(e) => {
                    error!("Failed to parse settings file: {}", e);
                }
            },
            Err(e) => {
                error!("Failed to open settings file: {}", e);
            }
        }

        info!("Using default settings");
        Self::default()
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::get_config_path().ok_or(SettingsError::NoConfigPath)?;
        self.save_to(&path)
    }

    /// Save settings to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        info!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Engine configuration with these settings applied
    pub fn engine_config(&self) -> EngineConfig {
        let config = EngineConfig::default();
        match &self.bluetooth_name_hints {
            Some(hints) => config.with_bluetooth_name_hints(hints.clone()),
            None => config,
        }
    }

    /// Get the platform-specific configuration file path
    pub fn get_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "podrouter", "podrouter")
            .map(|proj| proj.config_dir().join("settings.json"))
    }
}
