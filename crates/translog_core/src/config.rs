//! Log configuration and destinations.

use crate::error::{LogError, LogResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Destination literal for a process-local store that is never persisted.
pub const MEMORY_DESTINATION: &str = ":memory:";

/// Environment variable naming the schema descriptor used for new stores.
pub const SCHEMA_PATH_ENV: &str = "TRANSLOG_SCHEMA_PATH";

/// Where a log keeps its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Process-local store, see [`MEMORY_DESTINATION`].
    Memory,
    /// A single file.
    File(PathBuf),
}

impl Destination {
    /// Interprets a destination string: [`MEMORY_DESTINATION`] or a path.
    #[must_use]
    pub fn parse(destination: &str) -> Self {
        if destination == MEMORY_DESTINATION {
            Self::Memory
        } else {
            Self::File(PathBuf::from(destination))
        }
    }
}

impl From<&str> for Destination {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for Destination {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<&Path> for Destination {
    fn from(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

impl From<PathBuf> for Destination {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<&PathBuf> for Destination {
    fn from(path: &PathBuf) -> Self {
        Self::File(path.clone())
    }
}

/// How a log is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Existing store, queries only.
    #[default]
    Read,
    /// Store is created if missing; inserts allowed; takes the write lock.
    ReadWrite,
}

impl OpenMode {
    /// Whether inserts are allowed.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

/// Options applied when a log is opened.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Flush and sync the backend after every insert.
    pub sync_on_insert: bool,

    /// Create missing parent directories of a file destination.
    pub create_dirs: bool,

    /// Schema descriptor checked when a new store is created.
    pub schema_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            sync_on_insert: true,
            create_dirs: false,
            schema_path: None,
        }
    }
}

impl LogConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with `schema_path` taken from [`SCHEMA_PATH_ENV`].
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            schema_path: std::env::var_os(SCHEMA_PATH_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            ..Self::default()
        }
    }

    /// Sets whether every insert is flushed and synced.
    #[must_use]
    pub const fn sync_on_insert(mut self, value: bool) -> Self {
        self.sync_on_insert = value;
        self
    }

    /// Sets whether parent directories are created.
    #[must_use]
    pub const fn create_dirs(mut self, value: bool) -> Self {
        self.create_dirs = value;
        self
    }

    /// Sets the schema descriptor location.
    #[must_use]
    pub fn schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = Some(path.into());
        self
    }
}

/// The JSON document found at [`LogConfig::schema_path`].
///
/// ```json
/// { "version": "0.1.0", "description": "optional free text" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SchemaDescriptor {
    pub version: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub description: Option<String>,
}

impl SchemaDescriptor {
    pub(crate) fn load(path: &Path) -> LogResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LogError::schema(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| LogError::schema(format!("cannot parse {}: {e}", path.display())))
    }
}
