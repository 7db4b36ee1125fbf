//! User preferences and their persistence
//!
//! The player only needs a handful of values from its environment (volume,
//! mute, the last station). `Persistence` is that seam; `SettingsStore` is the
//! JSON-file implementation used by the CLI.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::app::{DEFAULT_VOLUME, NAME, SETTINGS_FILE};
use crate::error::{RadioError, Result};
use crate::station::Station;

/// Settings file format version for migrations
const SETTINGS_VERSION: u32 = 1;

/// Preference storage the player reads and writes through
pub trait Persistence: Send {
    /// Stored volume (0.0 - 1.0)
    fn volume(&self) -> f32;

    /// Stored mute flag
    fn is_muted(&self) -> bool;

    fn set_volume(&mut self, volume: f32);

    fn set_muted(&mut self, muted: bool);

    /// Remember the station most recently started
    fn record_last_station(&mut self, station: &Station);
}

/// Persisted user preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// File format version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Volume level (0.0 - 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,

    #[serde(default)]
    pub muted: bool,

    /// Last played station (restored at startup)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_station: Option<Station>,

    /// Show a notification when a station starts playing
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,

    /// Draw the oscilloscope
    #[serde(default = "default_true")]
    pub visualizer_enabled: bool,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_volume() -> f32 {
    DEFAULT_VOLUME
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            volume: default_volume(),
            muted: false,
            last_station: None,
            notifications_enabled: true,
            visualizer_enabled: true,
        }
    }
}

impl Settings {
    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&default_path()?)
    }

    /// Load settings from a specific path, falling back to defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        Ok(load_json::<Settings>(path)?.unwrap_or_default())
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&default_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        save_json(path, self)
    }

    /// Set volume (clamped to 0.0 - 1.0)
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// Volume after mute is applied
    pub fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
    }
}

/// Default settings file path (`<config dir>/radioscope/settings.json`)
pub fn default_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join(NAME).join(SETTINGS_FILE))
        .ok_or_else(|| {
            RadioError::Settings(
                "Could not determine config directory. HOME environment variable may not be set."
                    .to_string(),
            )
        })
}

/// Load a JSON document; a missing or empty file yields `None`
fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(RadioError::Settings(format!(
                "Permission denied: cannot read {:?}",
                path
            )))
        }
        Err(e) => {
            return Err(RadioError::Settings(format!(
                "Failed to read {:?}: {}",
                path, e
            )))
        }
    };

    if content.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| RadioError::Settings(format!("Failed to parse {:?}: {}", path, e)))
}

/// Write a JSON document, creating parent directories as needed
fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                RadioError::Settings(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }
    }

    let content = serde_json::to_string_pretty(data)
        .map_err(|e| RadioError::Settings(format!("Failed to serialize settings: {}", e)))?;

    fs::write(path, content).map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => {
            RadioError::Settings(format!("Permission denied: cannot write to {:?}", path))
        }
        _ => RadioError::Settings(format!("Failed to write to {:?}: {}", path, e)),
    })
}

/// `Settings` backed by a JSON file, saved on every change.
///
/// Without a path the store is memory-only. Save failures are logged and
/// otherwise ignored so a read-only config directory never breaks playback.
#[derive(Debug, Default)]
pub struct SettingsStore {
    settings: Settings,
    path: Option<PathBuf>,
}

impl SettingsStore {
    /// Open the store at the default location
    pub fn open_default() -> Result<Self> {
        Self::open(default_path()?)
    }

    /// Open the store at `path`, loading whatever is already there
    pub fn open(path: PathBuf) -> Result<Self> {
        let settings = Settings::load_from(&path)?;
        Ok(Self {
            settings,
            path: Some(path),
        })
    }

    /// A store that never touches the disk
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            settings,
            path: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Mutate the settings and persist the result
    pub fn update(&mut self, f: impl FnOnce(&mut Settings)) {
        f(&mut self.settings);
        self.persist();
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = self.settings.save_to(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to save settings");
        }
    }
}

impl Persistence for SettingsStore {
    fn volume(&self) -> f32 {
        self.settings.volume
    }

    fn is_muted(&self) -> bool {
        self.settings.muted
    }

    fn set_volume(&mut self, volume: f32) {
        self.update(|s| s.set_volume(volume));
    }

    fn set_muted(&mut self, muted: bool) {
        self.update(|s| s.muted = muted);
    }

    fn record_last_station(&mut self, station: &Station) {
        let unchanged = self
            .settings
            .last_station
            .as_ref()
            .is_some_and(|last| last.same_details(station));
        if unchanged {
            return;
        }
        let station = station.clone();
        self.update(|s| s.last_station = Some(station));
    }
}
