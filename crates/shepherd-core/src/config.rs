//! Shepherd configuration
//!
//! Loaded from TOML; every field has a default so a partial file (or no
//! file at all) is valid.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Entity store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Seconds an idle entity stays tracked before housekeeping evicts it
    pub idle_timeout_secs: u64,
    /// Run housekeeping on every dispatch
    pub housekeeping: bool,
    /// Maximum pending mutations per entity
    pub max_queue_depth: usize,
}

impl StoreConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With idle timeout
    #[inline]
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_secs = timeout.as_secs();
        self
    }

    /// With housekeeping enabled or disabled
    #[inline]
    #[must_use]
    pub fn with_housekeeping(mut self, enabled: bool) -> Self {
        self.housekeeping = enabled;
        self
    }

    /// With maximum queue depth
    #[inline]
    #[must_use]
    pub fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }

    /// Idle timeout as a duration
    #[inline]
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Validate value ranges
    ///
    /// # Errors
    /// - `CoreError::InvalidConfig` if the queue depth is zero
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_queue_depth == 0 {
            return Err(CoreError::InvalidConfig(
                "store.max_queue_depth must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
            housekeeping: true,
            max_queue_depth: 1024,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShepherdConfig {
    /// Entity store settings
    pub store: StoreConfig,
    /// Default page size for list queries
    pub page_size: usize,
}

impl ShepherdConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With store settings
    #[inline]
    #[must_use]
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// With default page size
    #[inline]
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// - `CoreError::ConfigParse` on malformed TOML
    /// - `CoreError::InvalidConfig` on out-of-range values
    pub fn from_toml_str(text: &str) -> Result<Self, CoreError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// - `CoreError::Io` if the file cannot be read
    /// - any error from [`ShepherdConfig::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::io_error(path, e))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// - `CoreError::ConfigRender` if serialization fails
    pub fn to_toml_string(&self) -> Result<String, CoreError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate value ranges
    ///
    /// # Errors
    /// - `CoreError::InvalidConfig` on a zero page size or invalid store settings
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.page_size == 0 {
            return Err(CoreError::InvalidConfig(
                "page_size must be positive".to_string(),
            ));
        }
        self.store.validate()
    }
}

impl Default for ShepherdConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            page_size: 25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = ShepherdConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.idle_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config = ShepherdConfig::from_toml_str("[store]\nidle_timeout_secs = 5\n").unwrap();
        assert_eq!(config.store.idle_timeout_secs, 5);
        assert_eq!(config.store.max_queue_depth, 1024);
        assert_eq!(config.page_size, 25);
    }

    #[test]
    fn zero_page_size_rejected() {
        let err = ShepherdConfig::from_toml_str("page_size = 0\n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn zero_queue_depth_rejected() {
        let err = ShepherdConfig::from_toml_str("[store]\nmax_queue_depth = 0\n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_toml_rejected() {
        let err = ShepherdConfig::from_toml_str("page_size = [").unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse(_)));
    }

    #[test]
    fn toml_round_trip() {
        let config = ShepherdConfig::new()
            .with_page_size(50)
            .with_store(StoreConfig::new().with_housekeeping(false));
        let text = config.to_toml_string().unwrap();
        assert_eq!(ShepherdConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "page_size = 10").unwrap();

        let config = ShepherdConfig::load(file.path()).unwrap();
        assert_eq!(config.page_size, 10);
    }

    #[test]
    fn load_missing_file() {
        let err = ShepherdConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }
}
