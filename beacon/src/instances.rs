use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use chrono::{DateTime, Utc};

/// A discovered instance as tracked by a session
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    /// Empty until the backend resolves the instance
    pub host: String,
    pub port: u16,
    pub addresses: Vec<IpAddr>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub resolved: bool,
    generation: u64,
}

/// Membership transitions since the previous pump
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Changes {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Discovered instances in first-seen order.
///
/// `visible` is the membership listeners were last told about; `take_changes`
/// diffs the live table against it.
#[derive(Debug, Default)]
pub struct InstanceTable {
    order: Vec<String>,
    entries: HashMap<String, Instance>,
    visible: Vec<String>,
    generation: u64,
    resync_pending: bool,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `name`, appending it if unknown. Returns true for a new instance.
    pub fn insert(&mut self, name: &str) -> bool {
        let now = Utc::now();
        if let Some(instance) = self.entries.get_mut(name) {
            instance.generation = self.generation;
            instance.last_seen = now;
            return false;
        }

        self.order.push(name.to_string());
        self.entries.insert(
            name.to_string(),
            Instance {
                name: name.to_string(),
                host: String::new(),
                port: 0,
                addresses: Vec::new(),
                first_seen: now,
                last_seen: now,
                resolved: false,
                generation: self.generation,
            },
        );
        true
    }

    /// Record resolution data. Returns false when `name` is not tracked.
    pub fn resolve(&mut self, name: &str, host: String, port: u16, addresses: Vec<IpAddr>) -> bool {
        let Some(instance) = self.entries.get_mut(name) else {
            return false;
        };
        instance.host = host;
        instance.port = port;
        instance.addresses = addresses;
        instance.resolved = true;
        instance.generation = self.generation;
        instance.last_seen = Utc::now();
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        if self.entries.remove(name).is_none() {
            return false;
        }
        self.order.retain(|n| n != name);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.entries.get(name)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Mark every tracked instance stale until the backend reports it again
    pub fn begin_resync(&mut self) {
        self.generation += 1;
        self.resync_pending = true;
    }

    /// Drop instances not reconfirmed since `begin_resync`, returning their names
    pub fn finish_resync(&mut self) -> Vec<String> {
        if !self.resync_pending {
            return Vec::new();
        }
        self.resync_pending = false;

        let generation = self.generation;
        let stale: Vec<String> = self
            .order
            .iter()
            .filter(|name| {
                self.entries
                    .get(name.as_str())
                    .is_some_and(|i| i.generation < generation)
            })
            .cloned()
            .collect();
        for name in &stale {
            self.remove(name);
        }
        stale
    }

    /// Diff the table against what listeners last saw and advance that snapshot
    pub fn take_changes(&mut self) -> Changes {
        let before: HashSet<&str> = self.visible.iter().map(String::as_str).collect();
        let after: HashSet<&str> = self.order.iter().map(String::as_str).collect();

        let changes = Changes {
            removed: self
                .visible
                .iter()
                .filter(|n| !after.contains(n.as_str()))
                .cloned()
                .collect(),
            added: self
                .order
                .iter()
                .filter(|n| !before.contains(n.as_str()))
                .cloned()
                .collect(),
        };
        self.visible = self.order.clone();
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_not_lexicographic() {
        let mut table = InstanceTable::new();
        assert!(table.insert("zeta"));
        assert!(table.insert("alpha"));
        assert!(!table.insert("zeta"));
        assert_eq!(table.names(), ["zeta", "alpha"]);
    }

    #[test]
    fn test_readded_instance_appended() {
        let mut table = InstanceTable::new();
        table.insert("a");
        table.insert("b");
        table.remove("a");
        table.insert("a");
        assert_eq!(table.names(), ["b", "a"]);
    }

    #[test]
    fn test_resolve_untracked_discarded() {
        let mut table = InstanceTable::new();
        assert!(!table.resolve("ghost", "ghost.local.".into(), 80, Vec::new()));
        assert!(table.is_empty());

        table.insert("real");
        assert!(table.get("real").is_some_and(|i| i.host.is_empty() && !i.resolved));
        assert!(table.resolve("real", "real.local.".into(), 80, Vec::new()));
        let instance = table.get("real").unwrap();
        assert_eq!(instance.host, "real.local.");
        assert!(instance.resolved);
    }

    #[test]
    fn test_changes_are_set_difference() {
        let mut table = InstanceTable::new();
        table.insert("a");
        table.insert("b");
        assert_eq!(
            table.take_changes(),
            Changes {
                added: vec!["a".into(), "b".into()],
                removed: vec![],
            }
        );

        // remove then re-add inside one pump nets out
        table.remove("a");
        table.insert("a");
        table.remove("b");
        table.insert("c");
        assert_eq!(
            table.take_changes(),
            Changes {
                added: vec!["c".into()],
                removed: vec!["b".into()],
            }
        );
        assert!(table.take_changes().is_empty());
    }

    #[test]
    fn test_add_then_remove_in_one_pump_is_silent() {
        let mut table = InstanceTable::new();
        table.insert("flash");
        table.remove("flash");
        assert!(table.take_changes().is_empty());
    }

    #[test]
    fn test_resync_drops_unconfirmed() {
        let mut table = InstanceTable::new();
        table.insert("stays");
        table.insert("left");
        table.insert("resolved");

        table.begin_resync();
        table.insert("stays");
        table.resolve("resolved", "h.local.".into(), 1, Vec::new());
        table.insert("new");

        assert_eq!(table.finish_resync(), vec!["left".to_string()]);
        assert_eq!(table.names(), ["stays", "resolved", "new"]);
        assert!(table.finish_resync().is_empty());
    }
}
