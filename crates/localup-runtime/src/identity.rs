//! Certificate authority and leaf identity provisioning.
//!
//! Every instance that needs an identity gets four PEM files in its working
//! directory (see [`InstanceLayout`]). Provisioning only ever creates
//! material: existing files are never regenerated, and a half-present
//! cert/key pair is reported as [`RuntimeError::IdentityConflict`] without
//! touching anything on disk.

use std::path::Path;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose,
};

use crate::error::RuntimeError;
use crate::instance::ServiceInstance;
use crate::layout::{
    CA_CERT_FILE, CA_KEY_FILE, IDENTITY_CERT_FILE, IDENTITY_KEY_FILE, InstanceLayout,
};

/// Service whose first instance receives the fixed root credentials by default.
pub const DEFAULT_ROOT_SERVICE: &str = "satellite-api";

/// Pre-generated credentials written verbatim for the root instance, so that
/// values derived from its identity (node id, issued API keys) are stable
/// across runs.
#[derive(Clone, PartialEq, Eq)]
pub struct RootCredentials {
    pub ca_cert: Vec<u8>,
    pub ca_key: Vec<u8>,
    pub identity_cert: Vec<u8>,
    pub identity_key: Vec<u8>,
}

impl std::fmt::Debug for RootCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootCredentials")
            .field("ca_cert", &self.ca_cert.len())
            .field("ca_key", &"<redacted>")
            .field("identity_cert", &self.identity_cert.len())
            .field("identity_key", &"<redacted>")
            .finish()
    }
}

impl RootCredentials {
    /// Read `ca.cert`, `ca.key`, `identity.cert` and `identity.key` from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, RuntimeError> {
        Ok(Self {
            ca_cert: std::fs::read(dir.join(CA_CERT_FILE))?,
            ca_key: std::fs::read(dir.join(CA_KEY_FILE))?,
            identity_cert: std::fs::read(dir.join(IDENTITY_CERT_FILE))?,
            identity_key: std::fs::read(dir.join(IDENTITY_KEY_FILE))?,
        })
    }

    /// Generate a fresh CA and leaf in memory, e.g. to seed a credentials dir.
    pub fn generate(common_name: &str) -> Result<Self, RuntimeError> {
        let (ca_cert, ca_key) = create_ca(common_name)?;
        let (leaf_cert, leaf_key) = issue_leaf(common_name, &ca_cert, &ca_key)?;
        Ok(Self {
            ca_cert: ca_cert.pem().into_bytes(),
            ca_key: ca_key.serialize_pem().into_bytes(),
            identity_cert: leaf_cert.pem().into_bytes(),
            identity_key: leaf_key.serialize_pem().into_bytes(),
        })
    }

    pub fn write_to(&self, layout: &InstanceLayout) -> Result<(), RuntimeError> {
        layout.init()?;
        std::fs::write(layout.ca_cert_path(), &self.ca_cert)?;
        std::fs::write(layout.ca_key_path(), &self.ca_key)?;
        std::fs::write(layout.identity_key_path(), &self.identity_key)?;
        std::fs::write(layout.identity_cert_path(), &self.identity_cert)?;
        Ok(())
    }
}

/// The single instance that receives [`RootCredentials`]: index 0 of `service`.
#[derive(Debug, Clone)]
pub struct RootIdentity {
    pub service: String,
    pub credentials: RootCredentials,
}

impl RootIdentity {
    pub fn new(service: impl Into<String>, credentials: RootCredentials) -> Self {
        Self {
            service: service.into(),
            credentials,
        }
    }

    pub fn instance(&self) -> ServiceInstance {
        ServiceInstance::new(self.service.clone(), 0)
    }

    fn matches(&self, instance: &ServiceInstance) -> bool {
        instance.instance == 0 && instance.name == self.service
    }
}

/// Outcome of a successful [`IdentityProvisioner::provision`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// Leaf certificate already present; nothing was written.
    Existing,
    /// Root credentials were written verbatim.
    Root,
    /// A leaf was issued (and a CA created unless a complete one existed).
    Generated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaterialStatus {
    Missing,
    Partial,
    Complete,
}

fn status(cert: &Path, key: &Path) -> MaterialStatus {
    match (cert.exists(), key.exists()) {
        (false, false) => MaterialStatus::Missing,
        (true, true) => MaterialStatus::Complete,
        _ => MaterialStatus::Partial,
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdentityProvisioner {
    root: Option<RootIdentity>,
}

impl IdentityProvisioner {
    pub fn new(root: Option<RootIdentity>) -> Self {
        Self { root }
    }

    pub fn root(&self) -> Option<&RootIdentity> {
        self.root.as_ref()
    }

    /// Make sure `layout` holds a CA and a leaf identity for `instance`.
    pub fn provision(
        &self,
        instance: &ServiceInstance,
        layout: &InstanceLayout,
    ) -> Result<Provisioned, RuntimeError> {
        if layout.identity_cert_path().exists() {
            tracing::debug!(%instance, "Identity already present");
            return Ok(Provisioned::Existing);
        }

        if let Some(root) = self.root.as_ref().filter(|r| r.matches(instance)) {
            root.credentials.write_to(layout)?;
            tracing::info!(%instance, dir = %layout.dir().display(), "Root identity written");
            return Ok(Provisioned::Root);
        }

        let ca_status = status(&layout.ca_cert_path(), &layout.ca_key_path());
        if ca_status == MaterialStatus::Partial {
            return Err(RuntimeError::IdentityConflict {
                kind: "CA",
                dir: layout.dir().to_path_buf(),
            });
        }
        if status(&layout.identity_cert_path(), &layout.identity_key_path())
            != MaterialStatus::Missing
        {
            return Err(RuntimeError::IdentityConflict {
                kind: "Identity",
                dir: layout.dir().to_path_buf(),
            });
        }

        layout.init()?;
        let common_name = instance.to_string();
        let (ca_cert, ca_key) = if ca_status == MaterialStatus::Complete {
            tracing::debug!(%instance, "Reusing existing CA");
            load_ca(layout)?
        } else {
            let (cert, key) = create_ca(&common_name)?;
            std::fs::write(layout.ca_key_path(), key.serialize_pem())?;
            std::fs::write(layout.ca_cert_path(), cert.pem())?;
            (cert, key)
        };

        let (leaf_cert, leaf_key) = issue_leaf(&common_name, &ca_cert, &ca_key)?;
        std::fs::write(layout.identity_key_path(), leaf_key.serialize_pem())?;
        std::fs::write(layout.identity_cert_path(), leaf_cert.pem())?;

        tracing::info!(%instance, dir = %layout.dir().display(), "Identity generated");
        Ok(Provisioned::Generated)
    }
}

fn create_ca(common_name: &str) -> Result<(Certificate, KeyPair), RuntimeError> {
    let key = KeyPair::generate()?;
    let mut params = CertificateParams::new(Vec::<String>::new())?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, format!("{common_name} CA"));
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    let cert = params.self_signed(&key)?;
    Ok((cert, key))
}

fn load_ca(layout: &InstanceLayout) -> Result<(Certificate, KeyPair), RuntimeError> {
    let key = KeyPair::from_pem(&std::fs::read_to_string(layout.ca_key_path())?)?;
    let params = CertificateParams::from_ca_cert_pem(&std::fs::read_to_string(
        layout.ca_cert_path(),
    )?)?;
    let cert = params.self_signed(&key)?;
    Ok((cert, key))
}

fn issue_leaf(
    common_name: &str,
    ca_cert: &Certificate,
    ca_key: &KeyPair,
) -> Result<(Certificate, KeyPair), RuntimeError> {
    let key = KeyPair::generate()?;
    let mut params = CertificateParams::new(Vec::<String>::new())?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params.is_ca = IsCa::NoCa;
    params.use_authority_key_identifier_extension = true;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    let cert = params.signed_by(&key, ca_cert, ca_key)?;
    Ok((cert, key))
}
