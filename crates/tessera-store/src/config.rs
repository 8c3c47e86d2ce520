use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Runtime settings of a [`Store`](crate::Store).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Registrations between sweeps of dead identity-registry entries.
    pub registry_sweep_interval: usize,
    /// Whether models without a `list` hook can list their cached entities.
    pub list_fallback: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            registry_sweep_interval: 1024,
            list_fallback: true,
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Config {
            path: "<inline>".into(),
            message: e.to_string(),
        })
    }

    /// Read settings from a TOML file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| StoreError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| StoreError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.registry_sweep_interval, 1024);
        assert!(c.list_fallback);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = StoreConfig::from_toml_str("list_fallback = false").unwrap();
        assert!(!c.list_fallback);
        assert_eq!(c.registry_sweep_interval, 1024);
    }

    #[test]
    fn invalid_toml_is_reported() {
        let err = StoreConfig::from_toml_str("registry_sweep_interval = \"often\"").unwrap_err();
        assert!(matches!(err, StoreError::Config { .. }));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "registry_sweep_interval = 8").unwrap();
        let c = StoreConfig::load(file.path()).unwrap();
        assert_eq!(c.registry_sweep_interval, 8);
        assert!(c.list_fallback);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            StoreConfig::load(&missing),
            Err(StoreError::Config { path, .. }) if path == missing
        ));
    }
}
