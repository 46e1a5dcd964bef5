use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::instance::ServiceInstance;

/// A registered service instance and its launch configuration.
///
/// Values stored here are already rendered; use the owning runtime's
/// `add_flag`/`add_config` to render templates against this instance.
#[derive(Debug, Clone, Serialize)]
pub struct Service {
    id: ServiceInstance,
    dir: PathBuf,
    labels: Vec<String>,
    /// Container image; only used by the compose runtime.
    pub image: Option<String>,
    pub command: Vec<String>,
    pub environment: BTreeMap<String, String>,
    flags: Vec<String>,
    config: Vec<String>,
}

impl Service {
    pub fn new(id: ServiceInstance, dir: PathBuf, labels: Vec<String>) -> Self {
        Self {
            id,
            dir,
            labels,
            image: None,
            command: Vec::new(),
            environment: BTreeMap::new(),
            flags: Vec::new(),
            config: Vec::new(),
        }
    }

    pub fn id(&self) -> &ServiceInstance {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn config(&self) -> &[String] {
        &self.config
    }

    pub(crate) fn set_config(&mut self, lines: Vec<String>) {
        self.config = lines;
    }

    /// Add a flag, replacing any existing flag with the same key.
    ///
    /// The key is the text before the first `=`, so `--log.level=info`
    /// replaces `--log.level=debug`.
    pub fn add_flag(&mut self, flag: impl Into<String>) {
        let flag = flag.into();
        let key = flag_key(&flag).to_string();
        match self.flags.iter_mut().find(|f| flag_key(f) == key) {
            Some(existing) => *existing = flag,
            None => self.flags.push(flag),
        }
    }

    /// Remove every flag with the given key. Returns true if anything was removed.
    pub fn remove_flag(&mut self, key: &str) -> bool {
        let key = flag_key(key).to_string();
        let before = self.flags.len();
        self.flags.retain(|f| flag_key(f) != key);
        before != self.flags.len()
    }

    /// Set `key: value` in the config, replacing an active line for the same key.
    ///
    /// Commented-out defaults are left in place as documentation.
    pub fn add_config(&mut self, key: &str, value: &str) {
        let line = format!("{key}: {value}");
        let prefix = format!("{key}:");
        match self
            .config
            .iter_mut()
            .find(|l| l.trim_start().starts_with(&prefix))
        {
            Some(existing) => *existing = line,
            None => self.config.push(line),
        }
    }

    pub fn add_environment(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.environment.insert(key.into(), value.into());
    }

    /// Full argv: the launch command followed by all flags.
    pub fn argv(&self) -> Vec<String> {
        self.command.iter().chain(self.flags.iter()).cloned().collect()
    }
}

fn flag_key(flag: &str) -> &str {
    flag.split_once('=').map_or(flag, |(key, _)| key)
}
