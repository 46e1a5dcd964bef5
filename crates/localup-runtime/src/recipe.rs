use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// Capability label selecting identity provisioning and config generation.
pub const LABEL_STORJ: &str = "storj";
/// Capability label for database services.
pub const LABEL_DB: &str = "db";

/// Declarative description of one service to instantiate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    /// Container image; ignored by the standalone runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default, alias = "label")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Extra `key: value` lines appended to the service config.
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl Recipe {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        if !self.has_label(&label) {
            self.labels.push(label);
        }
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Ordered list of recipes, as loaded from a YAML stack file:
///
/// ```yaml
/// services:
///   - name: satellite-api
///     command: [satellite, run, api]
///     labels: [storj, core]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    #[serde(default)]
    pub services: Vec<Recipe>,
}

impl Stack {
    pub fn from_yaml_str(content: &str) -> Result<Self, RuntimeError> {
        let stack: Stack = serde_yaml::from_str(content)?;
        if let Some(unnamed) = stack.services.iter().position(|r| r.name.trim().is_empty()) {
            return Err(RuntimeError::Recipe(format!(
                "service #{unnamed} has no name"
            )));
        }
        Ok(stack)
    }

    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn get(&self, name: &str) -> Option<&Recipe> {
        self.services.iter().find(|r| r.name == name)
    }
}
