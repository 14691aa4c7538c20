//! Locating and reading the bridge config file.

use std::path::{Path, PathBuf};

use super::BridgeConfig;

/// Config file looked up in the current directory.
pub const PROJECT_CONFIG_FILE: &str = ".gemini-bridge.toml";

/// A parsed config together with the file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub config: BridgeConfig,
    /// `None` when no file was found and defaults apply.
    pub source: Option<PathBuf>,
}

/// Where the bridge looks for its config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigLoader {
    /// `./.gemini-bridge.toml`, then `<config dir>/gemini-bridge/config.toml`.
    #[default]
    Search,
    /// Only the file passed with `--config`.
    Explicit(PathBuf),
}

impl ConfigLoader {
    /// Loader for the `--config` flag: explicit when given, searching otherwise.
    #[must_use]
    pub fn from_flag(path: Option<PathBuf>) -> Self {
        path.map_or(Self::Search, Self::Explicit)
    }

    /// The config file that would be read, if any exists.
    #[must_use]
    pub fn locate(&self) -> Option<PathBuf> {
        match self {
            Self::Explicit(path) => path.is_file().then(|| path.clone()),
            Self::Search => std::iter::once(PathBuf::from(PROJECT_CONFIG_FILE))
                .chain(user_config_path())
                .find(|path| path.is_file()),
        }
    }

    /// Read and parse the located file, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let Some(path) = self.locate() else {
            tracing::debug!(loader = ?self, "No config file found, using defaults");
            return Ok(LoadedConfig {
                config: BridgeConfig::default(),
                source: None,
            });
        };

        let config = parse_file(&path)?;
        Ok(LoadedConfig {
            config,
            source: Some(path),
        })
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gemini-bridge").join("config.toml"))
}

fn parse_file(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Errors that can occur while loading the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
