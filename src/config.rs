use crate::errors::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub const DEFAULT_EXTENSION: &str = ".json";
pub const DEFAULT_IDENTIFYING_SCHEME: &str = "flat_db";

/// What a tree walk does with a blob whose view name the resolved type does
/// not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownViewPolicy {
    #[default]
    Skip,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DbConfig {
    pub extensions: Vec<String>,
    pub identifying_scheme: String,
    pub unknown_view: UnknownViewPolicy,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            extensions: vec![DEFAULT_EXTENSION.to_string()],
            identifying_scheme: DEFAULT_IDENTIFYING_SCHEME.to_string(),
            unknown_view: UnknownViewPolicy::Skip,
        }
    }
}

impl DbConfig {
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_identifying_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.identifying_scheme = scheme.into();
        self
    }

    pub fn with_unknown_view(mut self, policy: UnknownViewPolicy) -> Self {
        self.unknown_view = policy;
        self
    }

    /// Loads a config from a `.json`, `.yaml` or `.yml` file. Keys left out
    /// keep their defaults.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|error| StoreError::Io(format!("{}: {}", path.to_string_lossy(), error)))?;
        let config: Self = match path.extension().and_then(|value| value.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)?,
            _ => {
                return Err(StoreError::UnsupportedExtension(format!(
                    "config file must be json or yaml: {}",
                    path.to_string_lossy()
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Extensions start with a dot and carry no other dot or separator, so that
    /// blob names split back into view and extension unambiguously.
    pub fn validate(&self) -> StoreResult<()> {
        if self.extensions.is_empty() {
            return Err(StoreError::Config("at least one extension is required".to_string()));
        }
        for ext in &self.extensions {
            let Some(rest) = ext.strip_prefix('.') else {
                return Err(StoreError::Config(format!(
                    "extension '{}' must start with a dot",
                    ext
                )));
            };
            if rest.is_empty() || rest.contains(['.', '/', '\\']) {
                return Err(StoreError::Config(format!("invalid extension '{}'", ext)));
            }
        }
        let scheme = self.identifying_scheme.trim();
        if scheme.is_empty() {
            return Err(StoreError::Config(
                "identifying scheme cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Extensions in configured order with duplicates dropped.
    pub fn ordered_extensions(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.extensions
            .iter()
            .filter(|ext| seen.insert(ext.as_str()))
            .cloned()
            .collect()
    }
}
