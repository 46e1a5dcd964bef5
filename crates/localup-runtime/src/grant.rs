use std::collections::HashMap;

use crate::error::RuntimeError;
use crate::instance::ServiceInstance;
use crate::port::{HostKind, PORT_PUBLIC};
use crate::runtime::{Runtime, VAR_NODE_ID};

/// Issues access credentials from a running satellite.
///
/// `satellite_url` has the form `<nodeId>@<host>:<port>`. Implementations talk
/// to the satellite; the runtime only builds the address.
pub trait AccessGrantSource: Send + Sync {
    fn api_key(&self, satellite_url: &str) -> Result<String, RuntimeError>;

    /// Backend name for logging.
    fn backend_name(&self) -> &str;
}

/// Fixed grants, keyed by satellite URL, with an optional fallback value.
#[derive(Debug, Default, Clone)]
pub struct StaticAccessGrants {
    grants: HashMap<String, String>,
    fallback: Option<String>,
}

impl StaticAccessGrants {
    pub fn new(grants: HashMap<String, String>) -> Self {
        Self {
            grants,
            fallback: None,
        }
    }

    /// A source returning `grant` for every satellite.
    pub fn constant(grant: impl Into<String>) -> Self {
        Self {
            grants: HashMap::new(),
            fallback: Some(grant.into()),
        }
    }
}

impl AccessGrantSource for StaticAccessGrants {
    fn api_key(&self, satellite_url: &str) -> Result<String, RuntimeError> {
        self.grants
            .get(satellite_url)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| RuntimeError::AccessGrant(format!("no grant for {satellite_url}")))
    }

    fn backend_name(&self) -> &str {
        "static"
    }
}

/// `<nodeId>@<external host>:<public port>` of `satellite` within `runtime`.
pub fn satellite_url<R: Runtime + ?Sized>(
    runtime: &R,
    satellite: &ServiceInstance,
) -> Result<String, RuntimeError> {
    let node_id = runtime.get(satellite, VAR_NODE_ID)?;
    if node_id.is_empty() {
        return Err(RuntimeError::AccessGrant(format!(
            "{satellite} has no identity yet"
        )));
    }
    Ok(format!(
        "{node_id}@{}:{}",
        runtime.host(satellite, HostKind::External),
        runtime.port(satellite, PORT_PUBLIC)?
    ))
}

pub(crate) fn resolve_access_grant<R: Runtime + ?Sized>(
    runtime: &R,
    source: Option<&dyn AccessGrantSource>,
    satellite: &ServiceInstance,
) -> Result<String, RuntimeError> {
    let source = source
        .ok_or_else(|| RuntimeError::AccessGrant("no access grant source configured".into()))?;
    let url = satellite_url(runtime, satellite)?;
    tracing::debug!(%satellite, backend = source.backend_name(), url, "Requesting access grant");
    source.api_key(&url)
}
