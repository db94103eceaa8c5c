use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where items land and how their directory and filename are derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PathSettings {
    pub base_directory: PathBuf,
    pub directory: Vec<String>,
    pub filename: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            base_directory: PathBuf::from("."),
            directory: vec!["{category}".to_string()],
            filename: "{filename}.{extension}".to_string(),
        }
    }
}

/// Raw option object of one configured postprocessor, including its `name`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginOptions(Map<String, Value>);

impl PluginOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, mostly for tests and programmatic setups.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// The `name` entry; not necessarily a string.
    pub fn name(&self) -> Option<&Value> {
        self.0.get("name")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Deserialize the plugin-specific options, ignoring `name`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let mut options = self.0.clone();
        options.remove("name");
        serde_json::from_value(Value::Object(options))
    }
}

impl From<Map<String, Value>> for PluginOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Job-level configuration: path layout plus the ordered postprocessor chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PipelineConfig {
    #[serde(flatten)]
    pub paths: PathSettings,
    pub postprocessors: Vec<PluginOptions>,
}

impl PipelineConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}
