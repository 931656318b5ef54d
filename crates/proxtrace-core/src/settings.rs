//! Persisted trace settings.
//!
//! Two values survive restarts: the paused flag and the identity secret.
//! [`FileSettingsStore`] keeps them in a JSON file; [`MemorySettingsStore`]
//! is used by tests and the simulated radio.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name used inside the data directory.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Errors raised by a settings store.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    ReadError {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The settings file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The settings file is not valid JSON.
    #[error("Failed to parse {}: {source}", path.display())]
    ParseError {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The settings could not be serialized.
    #[error("Failed to serialize settings: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// The data directory could not be created.
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDirError {
        /// Directory that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Key-value store for the persisted trace settings.
///
/// Implementations provide their own atomicity; the coordinator never holds a
/// store-level lock across calls.
pub trait SettingsStore: Send + Sync {
    /// Read the paused flag. Defaults to `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn paused(&self) -> Result<bool, SettingsError>;

    /// Persist the paused flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn set_paused(&self, paused: bool) -> Result<(), SettingsError>;

    /// Read the identity secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn secret(&self) -> Result<Option<String>, SettingsError>;

    /// Persist the identity secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn set_secret(&self, secret: &str) -> Result<(), SettingsError>;

    /// Remove the identity secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn clear_secret(&self) -> Result<(), SettingsError>;
}

/// On-disk representation of the settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct PersistedSettings {
    paused: bool,
    secret: Option<String>,
}

/// Settings stored as pretty-printed JSON in `<data_dir>/settings.json`.
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileSettingsStore {
    /// Create a store rooted at `data_dir`.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Directory to store the settings file in
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SETTINGS_FILE_NAME),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the settings file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<PersistedSettings, SettingsError> {
        if !self.path.exists() {
            return Ok(PersistedSettings::default());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|source| {
            SettingsError::ReadError {
                path: self.path.clone(),
                source,
            }
        })?;
        serde_json::from_str(&content).map_err(|source| SettingsError::ParseError {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, settings: &PersistedSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::CreateDirError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, content).map_err(|source| SettingsError::WriteError {
            path: self.path.clone(),
            source,
        })
    }

    fn update(&self, apply: impl FnOnce(&mut PersistedSettings)) -> Result<(), SettingsError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut settings = self.load()?;
        apply(&mut settings);
        self.save(&settings)
    }
}

impl SettingsStore for FileSettingsStore {
    fn paused(&self) -> Result<bool, SettingsError> {
        Ok(self.load()?.paused)
    }

    fn set_paused(&self, paused: bool) -> Result<(), SettingsError> {
        self.update(|s| s.paused = paused)
    }

    fn secret(&self) -> Result<Option<String>, SettingsError> {
        Ok(self.load()?.secret)
    }

    fn set_secret(&self, secret: &str) -> Result<(), SettingsError> {
        self.update(|s| s.secret = Some(secret.to_string()))
    }

    fn clear_secret(&self) -> Result<(), SettingsError> {
        self.update(|s| s.secret = None)
    }
}

/// Settings kept in memory only.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    inner: Mutex<PersistedSettings>,
}

impl MemorySettingsStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a secret.
    #[must_use]
    pub fn with_secret(secret: &str) -> Self {
        Self {
            inner: Mutex::new(PersistedSettings {
                paused: false,
                secret: Some(secret.to_string()),
            }),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut PersistedSettings) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl SettingsStore for MemorySettingsStore {
    fn paused(&self) -> Result<bool, SettingsError> {
        Ok(self.with(|s| s.paused))
    }

    fn set_paused(&self, paused: bool) -> Result<(), SettingsError> {
        self.with(|s| s.paused = paused);
        Ok(())
    }

    fn secret(&self) -> Result<Option<String>, SettingsError> {
        Ok(self.with(|s| s.secret.clone()))
    }

    fn set_secret(&self, secret: &str) -> Result<(), SettingsError> {
        self.with(|s| s.secret = Some(secret.to_string()));
        Ok(())
    }

    fn clear_secret(&self) -> Result<(), SettingsError> {
        self.with(|s| s.secret = None);
        Ok(())
    }
}

/// Get the default data directory.
///
/// On Linux: `/var/lib/proxtrace/`
/// Elsewhere: the platform data directory.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/lib/proxtrace")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "proxtrace").map_or_else(
            || PathBuf::from("./data"),
            |dirs| dirs.data_dir().to_path_buf(),
        )
    }
}
