//! User Preferences
//!
//! Small persisted settings owned by the user rather than the deployment,
//! currently the preferred response tone. Stored as TOML next to the client
//! configuration. A missing or unreadable file yields defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Preference persistence failures
#[derive(Debug, Error)]
pub enum PreferencesError {
    /// File could not be read or written
    #[error("preferences I/O failed at {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Preferences could not be serialized
    #[error("failed to serialize preferences: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// No config directory on this platform
    #[error("no configuration directory available")]
    NoConfigDir,

    /// Unknown tone name
    #[error("unknown tone '{0}' (expected concise, balanced or detailed)")]
    UnknownTone(String),
}

/// How verbose the assistant should be
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseTone {
    /// Short answers
    Concise,
    /// Default verbosity
    #[default]
    Balanced,
    /// Thorough answers
    Detailed,
}

impl fmt::Display for ResponseTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concise => write!(f, "concise"),
            Self::Balanced => write!(f, "balanced"),
            Self::Detailed => write!(f, "detailed"),
        }
    }
}

impl FromStr for ResponseTone {
    type Err = PreferencesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "concise" => Ok(Self::Concise),
            "balanced" => Ok(Self::Balanced),
            "detailed" => Ok(Self::Detailed),
            other => Err(PreferencesError::UnknownTone(other.to_string())),
        }
    }
}

/// Persisted user preferences
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Preferred response tone
    pub tone: ResponseTone,
}

/// Reads and writes [`Preferences`]
#[derive(Clone, Debug)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    /// Store backed by `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `$XDG_CONFIG_HOME/assistant-session/preferences.toml`
    ///
    /// # Errors
    ///
    /// [`PreferencesError::NoConfigDir`] if the platform has no config dir.
    pub fn default_location() -> Result<Self, PreferencesError> {
        dirs::config_dir()
            .map(|p| Self::new(p.join("assistant-session").join("preferences.toml")))
            .ok_or(PreferencesError::NoConfigDir)
    }

    /// File path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load preferences, falling back to defaults
    pub async fn load(&self) -> Preferences {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable preferences");
                Preferences::default()
            }),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "No saved preferences");
                Preferences::default()
            }
        }
    }

    /// Persist preferences, creating the parent directory if needed
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, prefs: &Preferences) -> Result<(), PreferencesError> {
        let content = toml::to_string(prefs)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PreferencesError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|source| PreferencesError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_tone_parsing() {
        assert_eq!("Concise".parse::<ResponseTone>().unwrap(), ResponseTone::Concise);
        assert_eq!(" detailed ".parse::<ResponseTone>().unwrap(), ResponseTone::Detailed);
        assert!(matches!(
            "chatty".parse::<ResponseTone>(),
            Err(PreferencesError::UnknownTone(_))
        ));
        assert_eq!(ResponseTone::Balanced.to_string(), "balanced");
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = PreferenceStore::new(dir.path().join("nope.toml"));
        assert_eq!(store.load().await, Preferences::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = PreferenceStore::new(dir.path().join("nested").join("preferences.toml"));
        let prefs = Preferences {
            tone: ResponseTone::Detailed,
        };
        store.save(&prefs).await.unwrap();
        assert_eq!(store.load().await, prefs);

        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert!(raw.contains("tone = \"detailed\""));
    }

    #[tokio::test]
    async fn test_corrupt_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.toml");
        tokio::fs::write(&path, "tone = 42").await.unwrap();
        assert_eq!(PreferenceStore::new(path).load().await, Preferences::default());
    }
}
