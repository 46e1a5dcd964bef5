use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use localup_runtime::{AccessGrantSource, RootCredentials, RootIdentity, StaticAccessGrants};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "localup.toml";

#[derive(Debug, Default, Deserialize)]
pub struct LocalupConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    pub root_identity: Option<RootIdentityConfig>,
    #[serde(default)]
    pub health: HealthConfig,
    /// Per-service variable overrides: `[variables.redis] url = "..."`.
    #[serde(default)]
    pub variables: BTreeMap<String, BTreeMap<String, String>>,
    /// Grant handed out for every `accessGrant` lookup.
    pub access_grant: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
    #[serde(default = "default_clean")]
    pub clean: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            project_dir: default_project_dir(),
            clean: default_clean(),
        }
    }
}

fn default_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".localup"))
        .unwrap_or_else(|| PathBuf::from(".localup"))
}
fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_clean() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct RootIdentityConfig {
    #[serde(default = "default_root_service")]
    pub service: String,
    /// Directory holding `ca.cert`, `ca.key`, `identity.cert` and `identity.key`.
    pub dir: PathBuf,
}

fn default_root_service() -> String {
    localup_runtime::identity::DEFAULT_ROOT_SERVICE.into()
}

#[derive(Debug, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_number")]
    pub number: i64,
    /// Zero waits forever.
    #[serde(default)]
    pub timeout_secs: u64,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            table: default_table(),
            number: default_number(),
            timeout_secs: 0,
            interval_ms: default_interval_ms(),
        }
    }
}

fn default_database_url() -> String {
    "postgres://root@localhost:26257/master?sslmode=disable".into()
}
fn default_table() -> String {
    "nodes".into()
}
fn default_number() -> i64 {
    10
}
fn default_interval_ms() -> u64 {
    1000
}

impl HealthConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl LocalupConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.health.interval_ms > 0,
            "health.interval_ms must be greater than zero"
        );
        Ok(())
    }

    /// Load `explicit`, or the first of `./localup.toml` and
    /// `~/.config/localup/localup.toml` that exists, or built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let candidates = [
            Some(PathBuf::from(CONFIG_FILE)),
            dirs::config_dir().map(|d| d.join("localup").join(CONFIG_FILE)),
        ];
        for path in candidates.into_iter().flatten() {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Using config file");
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn build_root_identity(&self) -> Result<Option<RootIdentity>> {
        let Some(root) = &self.root_identity else {
            return Ok(None);
        };
        let credentials = RootCredentials::from_dir(&root.dir).with_context(|| {
            format!("failed to load root credentials from {}", root.dir.display())
        })?;
        Ok(Some(RootIdentity::new(root.service.clone(), credentials)))
    }

    /// `LOCALUP_ACCESS_GRANT` takes precedence over the file value.
    pub fn build_access_grants(&self) -> Option<Arc<dyn AccessGrantSource>> {
        std::env::var("LOCALUP_ACCESS_GRANT")
            .ok()
            .or_else(|| self.access_grant.clone())
            .map(|grant| Arc::new(StaticAccessGrants::constant(grant)) as Arc<dyn AccessGrantSource>)
    }

    /// `(service, key, value)` triples of the `[variables]` overrides.
    pub fn variable_overrides(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.variables.iter().flat_map(|(service, vars)| {
            vars.iter()
                .map(move |(key, value)| (service.as_str(), key.as_str(), value.as_str()))
        })
    }
}
