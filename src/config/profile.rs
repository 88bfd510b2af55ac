//! Profile-based configuration
//!
//! The settings file holds global daemon behavior plus any number of named
//! profiles, each an ordered list of window rules. Exactly one profile is
//! active at a time; the engine receives it as an immutable snapshot.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::constants;

/// Top-level configuration with profile support
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalSettings,
    #[serde(default = "default_profiles")]
    pub profiles: Vec<Profile>,
}

/// Global daemon behavior (applies to all profiles)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default = "default_profile_name")]
    pub selected_profile: String,
    /// Interval between continuous ticks
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Named, ordered set of window rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub windows: Vec<WindowConfig>,
}

/// One window rule: which process/window to match and where it should go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Image name, matched case-insensitively and exactly (`.exe` ignored)
    pub process_name: String,
    /// Case-insensitive substring of the window title; empty matches any window
    #[serde(default)]
    pub title_hint: String,
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub control_position: bool,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,

    #[serde(default)]
    pub control_size: bool,
    #[serde(default)]
    pub width: i32,
    #[serde(default)]
    pub height: i32,

    /// Executable started by activate-or-launch when nothing matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub launch_args: Vec<String>,
    #[serde(default)]
    pub launch_elevated: bool,
}

fn default_profile_name() -> String {
    constants::config::DEFAULT_PROFILE.to_string()
}

fn default_poll_interval_ms() -> u64 {
    constants::engine::DEFAULT_POLL_INTERVAL_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_profiles() -> Vec<Profile> {
    vec![Profile {
        name: default_profile_name(),
        description: "Default profile".to_string(),
        windows: Vec::new(),
    }]
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            selected_profile: default_profile_name(),
            poll_interval_ms: default_poll_interval_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global: GlobalSettings::default(),
            profiles: default_profiles(),
        }
    }
}

impl WindowConfig {
    /// Rule matching `process_name` with nothing controlled
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
            title_hint: String::new(),
            enabled: true,
            control_position: false,
            x: 0,
            y: 0,
            control_size: false,
            width: 0,
            height: 0,
            launch_path: None,
            launch_args: Vec::new(),
            launch_elevated: false,
        }
    }

    pub fn with_title_hint(mut self, hint: impl Into<String>) -> Self {
        self.title_hint = hint.into();
        self
    }

    pub fn with_position(mut self, x: i32, y: i32) -> Self {
        self.control_position = true;
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_size(mut self, width: i32, height: i32) -> Self {
        self.control_size = true;
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_launch_path(mut self, path: impl Into<String>) -> Self {
        self.launch_path = Some(path.into());
        self
    }

    /// A controlled size that can never produce a valid rect
    pub fn has_degenerate_size(&self) -> bool {
        self.control_size && (self.width <= 0 || self.height <= 0)
    }

    /// Launch target: the configured executable, else the process name
    pub fn launch_target(&self) -> &str {
        self.launch_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.process_name)
    }
}

impl Profile {
    pub fn new(name: impl Into<String>, windows: Vec<WindowConfig>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            windows,
        }
    }
}

impl Config {
    pub fn path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(constants::config::APP_DIR);
        path.push(constants::config::FILENAME);
        path
    }

    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    /// Load configuration from `path` or create a default file there
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, creating default config");
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse JSON from {}", path.display()))?;

        config.validate_and_clamp();
        if config.profiles.is_empty() {
            anyhow::bail!("Config at {} has no profiles", path.display());
        }

        info!(profiles = config.profiles.len(), path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Clamp global values to safe ranges and flag rules the engine will skip
    fn validate_and_clamp(&mut self) {
        use crate::constants::engine::{MAX_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS};

        if self.global.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            warn!(poll_interval_ms = self.global.poll_interval_ms, min = MIN_POLL_INTERVAL_MS, "poll_interval_ms below minimum, clamping");
            self.global.poll_interval_ms = MIN_POLL_INTERVAL_MS;
        } else if self.global.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            warn!(poll_interval_ms = self.global.poll_interval_ms, max = MAX_POLL_INTERVAL_MS, "poll_interval_ms exceeds maximum, clamping");
            self.global.poll_interval_ms = MAX_POLL_INTERVAL_MS;
        }

        // Degenerate sizes are left alone; the engine skips them every tick
        for profile in &self.profiles {
            for window in profile.windows.iter().filter(|w| w.has_degenerate_size()) {
                warn!(
                    profile = %profile.name,
                    process = %window.process_name,
                    width = window.width,
                    height = window.height,
                    "Rule controls size with a non-positive dimension and will be skipped"
                );
            }
        }
    }

    /// Resolve the active profile: `name_override`, else the selected one.
    /// Falls back to the first profile when the selected name is unknown.
    pub fn active_profile(&self, name_override: Option<&str>) -> Result<Profile> {
        let wanted = name_override.unwrap_or(&self.global.selected_profile);
        if let Some(profile) = self.profiles.iter().find(|p| p.name == wanted) {
            return Ok(profile.clone());
        }

        if name_override.is_some() {
            anyhow::bail!("Profile '{}' does not exist", wanted);
        }

        let first = self
            .profiles
            .first()
            .context("Config must have at least one profile")?;
        warn!(selected = %wanted, using = %first.name, "Selected profile not found, using first profile");
        Ok(first.clone())
    }
}
