//! Error types for Shepherd Core
//!
//! Provides error handling for:
//! - Configuration loading and validation
//! - Record projection inside the in-memory broker

use std::path::PathBuf;

/// Main core error type
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Configuration value out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration text could not be parsed
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be rendered
    #[error("configuration render error: {0}")]
    ConfigRender(#[from] toml::ser::Error),

    /// IO error while reading configuration
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record could not be projected for filtering or sorting
    #[error("record projection failed: {0}")]
    Projection(#[from] serde_json::Error),
}

impl CoreError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if error comes from configuration
    #[inline]
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::ConfigParse(_) | Self::ConfigRender(_) | Self::Io { .. }
        )
    }
}
