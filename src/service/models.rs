//! Host-facing data carriers
//!
//! The host framework is schemaless at this boundary: resources are named
//! by strings and values travel as tagged string/number payloads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-device protocol properties supplied by the host, e.g.
/// `{"tcp": {"host": "192.168.1.78", "port": "5084"}}`.
pub type ProtocolProperties = HashMap<String, HashMap<String, String>>;

/// One resource the host wants read or written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub resource: String,
}

impl CommandRequest {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
        }
    }
}

/// A typed value attached to a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandValue {
    pub resource: String,
    pub value: ValueKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueKind {
    String(String),
    Uint32(u32),
}

impl CommandValue {
    pub fn string(resource: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            value: ValueKind::String(value.into()),
        }
    }

    pub fn uint32(resource: impl Into<String>, value: u32) -> Self {
        Self {
            resource: resource.into(),
            value: ValueKind::Uint32(value),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            ValueKind::String(s) => Some(s),
            ValueKind::Uint32(_) => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self.value {
            ValueKind::Uint32(n) => Some(n),
            ValueKind::String(_) => None,
        }
    }
}

/// Readings pushed to the host outside a command cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncValues {
    pub device_name: String,
    pub values: Vec<CommandValue>,
}

/// A reader found by the discovery probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub name: String,
    pub protocols: ProtocolProperties,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_accessors() {
        let s = CommandValue::string("ReaderConfig", "{}");
        assert_eq!(s.as_str(), Some("{}"));
        assert_eq!(s.as_u32(), None);

        let n = CommandValue::uint32("ROSpecID", 7);
        assert_eq!(n.as_u32(), Some(7));
        assert_eq!(n.as_str(), None);
    }
}
