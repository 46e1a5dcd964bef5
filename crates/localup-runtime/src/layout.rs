use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::RuntimeError;
use crate::instance::ServiceInstance;

pub const CONFIG_FILE: &str = "config.yaml";
pub const CA_CERT_FILE: &str = "ca.cert";
pub const CA_KEY_FILE: &str = "ca.key";
pub const IDENTITY_CERT_FILE: &str = "identity.cert";
pub const IDENTITY_KEY_FILE: &str = "identity.key";
pub const LAUNCHER_FILE: &str = "run.sh";

/// Working directory of one service instance.
///
/// Layout under the runtime root:
/// ```text
/// {root}/{name}/{index}/
///   config.yaml     - generated config, defaults commented out
///   ca.cert         - CA certificate (PEM)
///   ca.key          - CA private key (PEM)
///   identity.cert   - leaf certificate signed by the CA (PEM)
///   identity.key    - leaf private key (PEM)
///   run.sh          - launcher written by `Standalone::write`
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceLayout {
    dir: PathBuf,
}

impl InstanceLayout {
    pub fn new(root: &Path, instance: &ServiceInstance) -> Self {
        Self {
            dir: root.join(&instance.name).join(instance.instance.to_string()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn ca_cert_path(&self) -> PathBuf {
        self.dir.join(CA_CERT_FILE)
    }

    pub fn ca_key_path(&self) -> PathBuf {
        self.dir.join(CA_KEY_FILE)
    }

    pub fn identity_cert_path(&self) -> PathBuf {
        self.dir.join(IDENTITY_CERT_FILE)
    }

    pub fn identity_key_path(&self) -> PathBuf {
        self.dir.join(IDENTITY_KEY_FILE)
    }

    pub fn launcher_path(&self) -> PathBuf {
        self.dir.join(LAUNCHER_FILE)
    }

    /// Remove the directory and everything below it. Missing dirs are fine.
    pub fn clean(&self) -> Result<(), RuntimeError> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn init(&self) -> Result<(), RuntimeError> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Hex SHA-256 of the CA certificate, used as the instance's node id.
    pub fn node_id(&self) -> Result<String, RuntimeError> {
        let bytes = std::fs::read(self.ca_cert_path())?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}
