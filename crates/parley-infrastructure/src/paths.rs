//! Unified path management for parley files.
//!
//! ```text
//! ~/.config/parley/            # Config directory
//! ├── config.toml              # Engine and logging configuration
//! ├── session_state.toml       # Persisted session identity tier
//! └── logs/                    # Application logs
//!     └── parley.log.YYYY-MM-DD
//! ```

use std::path::PathBuf;

/// Name of the application directory under the platform config directory.
const APP_DIR: &str = "parley";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for parley_core::ParleyError {
    fn from(err: PathError) -> Self {
        parley_core::ParleyError::config(err.to_string())
    }
}

/// Files parley keeps on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Config,
    SessionState,
    Logs,
}

/// Resolves parley paths, either under the platform config directory or
/// under an explicit base directory.
#[derive(Debug, Clone, Default)]
pub struct ParleyPaths {
    base_dir: Option<PathBuf>,
}

impl ParleyPaths {
    /// Creates a resolver. `base_dir` replaces the platform config directory
    /// when given.
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }

    /// Returns the parley configuration directory (e.g. `~/.config/parley/`).
    pub fn config_dir(&self) -> Result<PathBuf, PathError> {
        match &self.base_dir {
            Some(base) => Ok(base.clone()),
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or(PathError::HomeDirNotFound),
        }
    }

    /// Returns the path of a parley file or directory.
    pub fn get_path(&self, service: ServiceType) -> Result<PathBuf, PathError> {
        let dir = self.config_dir()?;
        Ok(match service {
            ServiceType::Config => dir.join("config.toml"),
            ServiceType::SessionState => dir.join("session_state.toml"),
            ServiceType::Logs => dir.join("logs"),
        })
    }
}
