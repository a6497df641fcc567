//! Loading [`PluginConfig`] from disk.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::PluginConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Reads and parses the TOML file at `path`.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`] if
/// it is not a valid config document.
pub fn load(path: &Path) -> Result<PluginConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(PluginConfig::from_toml_str(&raw)?)
}

/// Like [`load`], but `None` means "use the defaults".
///
/// # Errors
///
/// As [`load`].
pub fn load_optional(path: Option<&Path>) -> Result<PluginConfig, ConfigError> {
    match path {
        Some(path) => load(path),
        None => Ok(PluginConfig::default()),
    }
}
