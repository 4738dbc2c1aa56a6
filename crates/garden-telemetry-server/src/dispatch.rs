//! Device dispatcher — resolves hex-encoded friendly names to registered
//! garden devices and checks the request method against what the device
//! accepts.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::DeviceEntry;
use crate::types::{ServerError, ServerResult};

/// Device record returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRecord {
    pub addr: String,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceRecord>,
}

impl DeviceRegistry {
    pub fn new(entries: &[DeviceEntry]) -> Self {
        let devices = entries
            .iter()
            .map(|e| {
                let record = DeviceRecord {
                    addr: e.addr.clone(),
                    methods: e.methods.iter().map(|m| m.to_ascii_uppercase()).collect(),
                };
                (device_uid(&e.name), record)
            })
            .collect();
        Self { devices }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Look up `uid` and check that `method` is allowed for it.
    pub fn resolve(&self, uid: &str, method: &str) -> ServerResult<&DeviceRecord> {
        let record = self
            .devices
            .get(uid)
            .ok_or_else(|| ServerError::DeviceNotFound(uid.to_string()))?;
        if !record.methods.iter().any(|m| m == method) {
            return Err(ServerError::MethodNotAllowed {
                methods: record.methods.clone(),
                req_method: method.to_string(),
            });
        }
        Ok(record)
    }
}

/// Dispatcher uid of a friendly device name.
pub fn device_uid(name: &str) -> String {
    hex::encode(name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DeviceRegistry {
        DeviceRegistry::new(&[
            DeviceEntry::new("carrot patch", "127.0.0.1:9090", &["GET", "POST"]),
            DeviceEntry::new("duck pond", "127.0.0.1:1010", &["get"]),
        ])
    }

    #[test]
    fn test_uid_is_hex_of_name() {
        assert_eq!(device_uid("duck pond"), "6475636b20706f6e64");
    }

    #[test]
    fn test_resolve() {
        let reg = registry();
        let record = reg.resolve(&device_uid("carrot patch"), "POST").unwrap();
        assert_eq!(record.addr, "127.0.0.1:9090");

        let err = reg.resolve(&device_uid("duck pond"), "POST").unwrap_err();
        match err {
            ServerError::MethodNotAllowed { methods, req_method } => {
                assert_eq!(methods, vec!["GET"]);
                assert_eq!(req_method, "POST");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(
            reg.resolve("carrot patch", "GET"),
            Err(ServerError::DeviceNotFound(_))
        ));
    }
}
