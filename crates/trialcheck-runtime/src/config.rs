//! Runtime configuration.
//!
//! Durations are written as human-readable strings (`"300ms"`, `"1h"`).
//!
//! ```yaml
//! debounce: 300ms
//! metadata_cache:
//!   max_entries: 1000
//!   ttl: 1h
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RuntimeError;

/// Configuration for the validation runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Quiescence window before a triggered re-validation runs
    #[serde(with = "duration_str")]
    pub debounce: Duration,

    /// Study metadata cache settings
    pub metadata_cache: MetadataCacheConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            metadata_cache: MetadataCacheConfig::default(),
        }
    }
}

/// Study metadata cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataCacheConfig {
    /// Maximum cached studies
    pub max_entries: u64,

    /// Time before a cached study is fetched again
    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for MetadataCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl RuntimeConfig {
    /// Parse a config from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, RuntimeError> {
        let config: RuntimeConfig =
            serde_yaml::from_str(yaml).map_err(|e| RuntimeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| RuntimeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&contents)
    }

    fn validate(&self) -> Result<(), RuntimeError> {
        if self.metadata_cache.max_entries == 0 {
            return Err(RuntimeError::Config(
                "metadata_cache.max_entries must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
