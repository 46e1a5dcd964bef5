use std::fmt;
use std::str::FromStr;

use crate::error::RuntimeError;
use crate::instance::ServiceInstance;

/// Which address of a service is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKind {
    /// Address used by other services of the cluster.
    Internal,
    /// Address used from the host machine.
    External,
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKind::Internal => f.write_str("internal"),
            HostKind::External => f.write_str("external"),
        }
    }
}

impl FromStr for HostKind {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(HostKind::Internal),
            "external" => Ok(HostKind::External),
            other => Err(RuntimeError::Template(format!("unknown host kind: {other}"))),
        }
    }
}

pub const PORT_PUBLIC: &str = "public";
pub const PORT_PRIVATE: &str = "private";
pub const PORT_DEBUG: &str = "debug";
pub const PORT_CONSOLE: &str = "console";

/// (service, port kind, base port)
const CONVENTIONS: &[(&str, &str, u16)] = &[
    ("satellite-api", PORT_PUBLIC, 7777),
    ("satellite-api", PORT_PRIVATE, 7778),
    ("satellite-api", PORT_CONSOLE, 10000),
    ("satellite-api", PORT_DEBUG, 11111),
    ("satellite-core", PORT_DEBUG, 11112),
    ("satellite-admin", PORT_CONSOLE, 8080),
    ("satellite-admin", PORT_DEBUG, 11113),
    ("satellite-gc", PORT_DEBUG, 11114),
    ("satellite-bf", PORT_DEBUG, 11115),
    ("satellite-rangedloop", PORT_DEBUG, 11116),
    ("storagenode", PORT_CONSOLE, 30000),
    ("storagenode", PORT_PUBLIC, 30001),
    ("storagenode", PORT_PRIVATE, 30002),
    ("storagenode", PORT_DEBUG, 30003),
    ("gateway-mt", PORT_PUBLIC, 9999),
    ("gateway-mt", PORT_DEBUG, 11120),
    ("authservice", PORT_PUBLIC, 8888),
    ("authservice", PORT_DEBUG, 11121),
    ("linksharing", PORT_PUBLIC, 9090),
    ("linksharing", PORT_DEBUG, 11122),
    ("versioncontrol", PORT_PUBLIC, 7070),
    ("cockroach", PORT_PUBLIC, 26257),
    ("cockroach", PORT_CONSOLE, 8086),
    ("redis", PORT_PUBLIC, 6379),
];

/// Port distance between consecutive instances of the same service.
fn instance_stride(service: &str) -> u16 {
    match service {
        "storagenode" => 10,
        _ => 1,
    }
}

/// Deterministic port for an instance, shared by every runtime backend.
///
/// Instance `n` of a service gets `base + n * stride`.
pub fn port_convention(instance: &ServiceInstance, kind: &str) -> Result<u16, RuntimeError> {
    let unknown = || RuntimeError::PortUnknown {
        service: instance.name.clone(),
        kind: kind.to_string(),
    };
    let base = CONVENTIONS
        .iter()
        .find(|(service, k, _)| *service == instance.name && *k == kind)
        .map(|(_, _, port)| *port)
        .ok_or_else(unknown)?;

    u16::try_from(instance.instance)
        .ok()
        .and_then(|n| n.checked_mul(instance_stride(&instance.name)))
        .and_then(|offset| base.checked_add(offset))
        .ok_or_else(unknown)
}
