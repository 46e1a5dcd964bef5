use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// `output` holds the command's stdout followed by its stderr.
    #[error("setup of {service} failed ({status}):\n{output}")]
    SetupFailed {
        service: String,
        status: String,
        output: String,
    },

    #[error("cannot read generated config {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind} certificate and/or key already exists in {}, NOT overwriting", dir.display())]
    IdentityConflict { kind: &'static str, dir: PathBuf },

    #[error("no port convention for {service}/{kind}")]
    PortUnknown { service: String, kind: String },

    #[error("template error: {0}")]
    Template(String),

    #[error("invalid service instance: {0}")]
    InvalidInstance(String),

    #[error("service not registered: {0}")]
    ServiceNotFound(String),

    #[error("not implemented for this runtime: {0}")]
    NotImplemented(&'static str),

    #[error("certificate generation failed: {0}")]
    Certificate(String),

    #[error("access grant unavailable: {0}")]
    AccessGrant(String),

    #[error("invalid recipe: {0}")]
    Recipe(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl From<rcgen::Error> for RuntimeError {
    fn from(e: rcgen::Error) -> Self {
        RuntimeError::Certificate(e.to_string())
    }
}
