use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// One running copy of a named service.
///
/// Identity is the `(name, instance)` pair. The canonical text form is
/// `<name>/<index>`; a bare name parses as index 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub name: String,
    pub instance: usize,
}

impl ServiceInstance {
    pub fn new(name: impl Into<String>, instance: usize) -> Self {
        Self {
            name: name.into(),
            instance,
        }
    }

    /// Strip an optional `/<index>` suffix, returning the bare service name.
    pub fn base_name(name: &str) -> &str {
        match name.rsplit_once('/') {
            Some((base, index)) if index.parse::<usize>().is_ok() => base,
            _ => name,
        }
    }
}

impl fmt::Display for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.instance)
    }
}

impl FromStr for ServiceInstance {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, instance) = match s.rsplit_once('/') {
            Some((name, index)) => {
                let instance = index
                    .parse::<usize>()
                    .map_err(|_| RuntimeError::InvalidInstance(s.to_string()))?;
                (name, instance)
            }
            None => (s, 0),
        };
        if name.is_empty() || name.contains('/') {
            return Err(RuntimeError::InvalidInstance(s.to_string()));
        }
        Ok(Self::new(name, instance))
    }
}
