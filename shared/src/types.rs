use std::net::IpAddr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// A discovered service instance.
/// Snapshot handed to consumers; the session keeps the authoritative copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceEntry {
    /// Service type, e.g. "_http._tcp"
    pub service_type: String,

    /// Bare instance name, e.g. "fileserver"
    pub instance_name: String,

    /// Hostname, e.g. "nas.local." (empty until resolved)
    pub hostname: String,

    /// Resolved addresses
    pub addresses: Vec<IpAddr>,

    /// Service port (0 until resolved)
    pub port: u16,

    /// TXT record key-value pairs, in record order
    pub txt: Vec<(String, String)>,

    /// First time this instance was seen
    pub first_seen: DateTime<Utc>,

    /// Last time the backend reported this instance
    pub last_seen: DateTime<Utc>,

    /// Whether host, port and TXT data have arrived
    pub resolved: bool,
}

impl InstanceEntry {
    /// Look up a TXT value by key
    pub fn txt_value(&self, key: &str) -> Option<&str> {
        self.txt
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_entry() -> InstanceEntry {
        InstanceEntry {
            service_type: "_test._tcp".to_string(),
            instance_name: "node-1".to_string(),
            hostname: "node.local.".to_string(),
            addresses: vec!["192.168.1.20".parse().unwrap()],
            port: 4000,
            txt: vec![
                ("role".to_string(), "leader".to_string()),
                ("zone".to_string(), String::new()),
            ],
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            resolved: true,
        }
    }

    #[test]
    fn test_txt_value_lookup() {
        let entry = test_entry();
        assert_eq!(entry.txt_value("role"), Some("leader"));
        assert_eq!(entry.txt_value("zone"), Some(""));
        assert_eq!(entry.txt_value("missing"), None);
    }

    #[test]
    fn test_json_keeps_txt_order() {
        let json = serde_json::to_value(test_entry()).unwrap();
        assert_eq!(json["instance_name"], "node-1");
        assert_eq!(json["txt"][0][0], "role");
        assert_eq!(json["txt"][1][0], "zone");
    }
}
