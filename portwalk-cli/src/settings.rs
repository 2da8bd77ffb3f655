//! User settings

use std::path::{Path, PathBuf};

use portwalk_core::Mode;
use serde::{Deserialize, Serialize};

/// Settings read from `settings.json`; command line flags override them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Line parameters for `monitor`
    #[serde(default)]
    pub mode: Mode,
    /// Extra port name fragments to hide from listings
    #[serde(default)]
    pub skip_patterns: Vec<String>,
    /// How often `find --wait` re-enumerates
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Show received bytes as hex in `monitor`
    #[serde(default)]
    pub show_hex: bool,
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            skip_patterns: Vec::new(),
            poll_interval_ms: default_poll_interval_ms(),
            show_hex: false,
        }
    }
}

impl Settings {
    /// Get the XDG config directory for portwalk
    /// Uses $XDG_CONFIG_HOME/portwalk on Linux/macOS, falls back to ~/.config/portwalk
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("portwalk"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("portwalk"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from the default location
    pub fn load() -> Self {
        Self::settings_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from a file, falling back to defaults when it is
    /// missing or malformed
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }
}
