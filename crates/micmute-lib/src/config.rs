//! Application configuration: TOML-based, platform-aware paths.
//!
//! The `hotkey` field doubles as the persisted hotkey store: [`ConfigStore`]
//! reads it at startup and rewrites only that field on bind or clear.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::hotkey::{HotkeyStore, KeyCombo};
use crate::lighting::{chroma, parse_color};

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# MicMute configuration. Changes made outside the app may be overwritten.\n\n";

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 500;
pub const MIN_TICK_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Global hotkey that toggles mute. Absent = no binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotkey: Option<String>,

    /// Usage poll period in milliseconds. Default: 500, minimum 50.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Drive keyboard lighting while the microphone is in use.
    #[serde(default = "default_true")]
    pub lighting_enabled: bool,

    /// Keyboard colour while muted (hex or name). Default: "#FF0000".
    #[serde(default = "default_muted_color")]
    pub muted_color: String,

    /// Keyboard colour while live (hex or name). Default: "#00FF00".
    #[serde(default = "default_unmuted_color")]
    pub unmuted_color: String,

    /// Show the opposite colour on the Macro-4 key.
    #[serde(default = "default_true")]
    pub accent_key_enabled: bool,

    /// Chroma REST endpoint.
    #[serde(default = "default_chroma_url")]
    pub chroma_url: String,
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}
fn default_muted_color() -> String {
    "#FF0000".into()
}
fn default_unmuted_color() -> String {
    "#00FF00".into()
}
fn default_chroma_url() -> String {
    chroma::DEFAULT_URL.into()
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: None,
            tick_interval_ms: default_tick_interval_ms(),
            lighting_enabled: true,
            muted_color: default_muted_color(),
            unmuted_color: default_unmuted_color(),
            accent_key_enabled: true,
            chroma_url: default_chroma_url(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A colour field could not be parsed.
    InvalidColor { field: &'static str, reason: String },
    /// `hotkey` is present but blank.
    EmptyHotkey,
    /// `hotkey` is not a usable key combination.
    InvalidHotkey(String),
    /// `tick_interval_ms` is below the minimum.
    TickIntervalTooShort(u64),
    /// `chroma_url` is not an http(s) URL.
    InvalidChromaUrl(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidColor { field, reason } => {
                write!(f, "Invalid {field}: {reason}")
            }
            ValidationError::EmptyHotkey => write!(f, "Hotkey cannot be empty"),
            ValidationError::InvalidHotkey(e) => write!(f, "{e}"),
            ValidationError::TickIntervalTooShort(ms) => write!(
                f,
                "tick_interval_ms must be at least {MIN_TICK_INTERVAL_MS} (got {ms})"
            ),
            ValidationError::InvalidChromaUrl(u) => {
                write!(f, "chroma_url must start with http:// or https:// (got \"{u}\")")
            }
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        #[cfg(windows)]
        {
            dirs::config_dir().map(|p| p.join("MicMute"))
        }
        #[cfg(not(windows))]
        {
            dirs::config_dir().map(|p| p.join("micmute"))
        }
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Full path to the log file (tray app).
    pub fn log_path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("micmute.log"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Save config to the default platform path.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            ));
        };
        self.save_to(&path)
    }

    /// Poll period, clamped to the minimum.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(MIN_TICK_INTERVAL_MS))
    }

    /// Check every field and return all problems found.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("muted_color", &self.muted_color),
            ("unmuted_color", &self.unmuted_color),
        ] {
            if let Err(e) = parse_color(value) {
                errors.push(ValidationError::InvalidColor {
                    field,
                    reason: e.to_string(),
                });
            }
        }

        if let Some(hotkey) = &self.hotkey {
            if hotkey.trim().is_empty() {
                errors.push(ValidationError::EmptyHotkey);
            } else if let Err(e) = KeyCombo::parse(hotkey) {
                errors.push(ValidationError::InvalidHotkey(e.to_string()));
            }
        }

        if self.tick_interval_ms < MIN_TICK_INTERVAL_MS {
            errors.push(ValidationError::TickIntervalTooShort(self.tick_interval_ms));
        }

        if !(self.chroma_url.starts_with("http://") || self.chroma_url.starts_with("https://")) {
            errors.push(ValidationError::InvalidChromaUrl(self.chroma_url.clone()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Hotkey persistence backed by the `hotkey` field of a config file.
///
/// Every write re-reads the file so settings edited elsewhere are kept.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform config path.
    pub fn platform() -> Option<Self> {
        Config::path().map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, hotkey: Option<String>) -> crate::error::Result<()> {
        let (mut config, warnings) = Config::load_from(&self.path);
        for w in &warnings {
            log::warn!("{w}");
        }
        config.hotkey = hotkey;
        config.save_to(&self.path)?;
        Ok(())
    }
}

impl HotkeyStore for ConfigStore {
    fn load(&self) -> Option<String> {
        Config::load_from(&self.path)
            .0
            .hotkey
            .filter(|h| !h.trim().is_empty())
    }

    fn store(&mut self, combo: &KeyCombo) -> crate::error::Result<()> {
        self.update(Some(combo.to_string()))
    }

    fn clear(&mut self) -> crate::error::Result<()> {
        self.update(None)
    }
}
