//! The service session state machine.
//!
//! A session owns its attribute scopes, its instance table, its listener
//! registry, and exactly one backend adapter. Two independent axes of state:
//! announced / idle, and browsing / not browsing.
//!
//! All table mutation happens on the caller's thread inside `browse`,
//! `discover`, `begin_browsing`, and the announce calls. `browse` without a
//! prior `begin_browsing` is always safe: it runs a one-shot browse over all
//! interfaces and stops it again before returning.

use std::sync::{Arc, OnceLock};
use shared::types::InstanceEntry;
use crate::adapter::{self, BackendAdapter, BackendKind, Interfaces, RawEvent, Resolution, Wait};
use crate::attributes::{AttributeStore, Attributes};
use crate::config::Config;
use crate::error::SessionError;
use crate::instances::InstanceTable;
use crate::listener::{Listener, ListenerId, ListenerRegistry};
use crate::status::Status;

pub struct ServiceSession {
    service_type: String,
    adapter: Box<dyn BackendAdapter>,
    attributes: AttributeStore,
    instances: InstanceTable,
    listeners: ListenerRegistry,
    announced: bool,
    browsing: bool,
}

impl ServiceSession {
    /// Create a session with the default backend order
    pub fn new(service_type: &str) -> Result<Self, SessionError> {
        Self::with_config(service_type, &Config::default())
    }

    /// Create a session, binding the first available backend from `config`.
    ///
    /// No available backend is not an error; the session then answers
    /// `NOT_SUPPORTED`. A backend that probes available but cannot be opened is.
    pub fn with_config(service_type: &str, config: &Config) -> Result<Self, SessionError> {
        validate_service_type(service_type)?;
        let adapter = adapter::select(service_type, config)?;
        Ok(Self::bind(service_type, adapter))
    }

    /// Create a session over an explicitly constructed adapter
    pub fn with_adapter(service_type: &str, adapter: Box<dyn BackendAdapter>) -> Result<Self, SessionError> {
        validate_service_type(service_type)?;
        Ok(Self::bind(service_type, adapter))
    }

    fn bind(service_type: &str, adapter: Box<dyn BackendAdapter>) -> Self {
        Self {
            service_type: service_type.to_string(),
            adapter,
            attributes: AttributeStore::new(),
            instances: InstanceTable::new(),
            listeners: ListenerRegistry::new(),
            announced: false,
            browsing: false,
        }
    }

    /// Whether any backend in the default order works on this host.
    /// Memoized for the life of the process.
    pub fn is_available() -> bool {
        static AVAILABLE: OnceLock<bool> = OnceLock::new();
        *AVAILABLE.get_or_init(|| adapter::any_available(&Config::default()))
    }

    /// The service type this session was created for
    pub fn name(&self) -> &str {
        &self.service_type
    }

    pub fn backend(&self) -> BackendKind {
        self.adapter.kind()
    }

    /// Publish the local attributes under `instance_name`.
    ///
    /// Calling it again while announced re-publishes with the current
    /// attributes; that is the only way attribute changes reach the network.
    /// A failed re-announce leaves the previous announcement in place.
    pub fn announce(&mut self, port: u16, instance_name: &str) -> Status {
        if instance_name.is_empty() {
            return Status::BAD_PARAM;
        }

        match self.adapter.advertise(port, instance_name, self.attributes.local()) {
            Ok(()) => {
                self.announced = true;
                Status::SUCCESS
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to announce {} as {}: {}",
                    self.service_type,
                    instance_name,
                    e
                );
                e.into()
            }
        }
    }

    /// Stop publishing. A no-op when not announced.
    pub fn withdraw(&mut self) {
        if self.announced {
            self.adapter.unadvertise();
            self.announced = false;
        }
    }

    pub fn is_announced(&self) -> bool {
        self.announced
    }

    /// Set a local attribute for future announcements
    pub fn set(&mut self, key: &str, value: &str) {
        self.attributes.set_local(key, value);
    }

    /// Set a value in an instance scope, `""` meaning local. A remote value
    /// lasts until the instance's next resolution; unknown instances are ignored.
    pub fn set_for(&mut self, instance: &str, key: &str, value: &str) {
        if !self.attributes.set_in(instance, key, value) {
            tracing::debug!("Ignoring set for unknown instance {}", instance);
        }
    }

    /// Local attribute value, "" if absent
    pub fn get(&self, key: &str) -> &str {
        self.attributes.local().get(key).unwrap_or_default()
    }

    /// Attribute of a discovered instance (`""` is the local scope),
    /// "" if instance or key is absent
    pub fn get_for(&self, instance: &str, key: &str) -> &str {
        self.attributes.get(instance, key).unwrap_or_default()
    }

    /// Local attribute keys in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.attributes.local().keys().map(str::to_string).collect()
    }

    /// Attribute keys of an instance; empty for unknown instances
    pub fn keys_for(&self, instance: &str) -> Vec<String> {
        self.attributes
            .scope(instance)
            .map(|scope| scope.keys().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn contains_key(&self, instance: &str, key: &str) -> bool {
        self.attributes
            .scope(instance)
            .is_some_and(|scope| scope.contains_key(key))
    }

    /// Known instance names in first-seen order
    pub fn instances(&self) -> Vec<String> {
        self.instances.names().to_vec()
    }

    /// Resolved host of an instance, "" if unknown or not yet resolved
    pub fn host(&self, instance: &str) -> &str {
        self.instances
            .get(instance)
            .map(|i| i.host.as_str())
            .unwrap_or_default()
    }

    /// Full snapshot of one discovered instance
    pub fn instance(&self, name: &str) -> Option<InstanceEntry> {
        let instance = self.instances.get(name)?;
        Some(InstanceEntry {
            service_type: self.service_type.clone(),
            instance_name: instance.name.clone(),
            hostname: instance.host.clone(),
            addresses: instance.addresses.clone(),
            port: instance.port,
            txt: self
                .attributes
                .scope(name)
                .map(Attributes::to_vec)
                .unwrap_or_default(),
            first_seen: instance.first_seen,
            last_seen: instance.last_seen,
            resolved: instance.resolved,
        })
    }

    /// Start the backend's continuous event source.
    ///
    /// Returns `PENDING` if already browsing; the running browse is kept.
    pub fn begin_browsing(&mut self, scope: Interfaces) -> Status {
        if self.browsing {
            return Status::PENDING;
        }

        match self.adapter.start_browse(scope) {
            Ok(()) => {
                self.browsing = true;
                self.instances.begin_resync();
                tracing::debug!("Browsing {} ({:?})", self.service_type, scope);
                Status::SUCCESS
            }
            Err(e) => {
                tracing::warn!("Failed to browse {}: {}", self.service_type, e);
                e.into()
            }
        }
    }

    /// Pump backend events for up to `timeout_ms` milliseconds.
    ///
    /// 0 only drains what is queued; a negative value waits for at least one
    /// event, bounded by the backend's idle limit. All events are applied and
    /// listeners notified before this returns.
    pub fn browse(&mut self, timeout_ms: i32) -> Status {
        if self.browsing {
            return self.pump(timeout_ms);
        }

        let status = self.begin_browsing(Interfaces::All);
        if !status.is_success() {
            return status;
        }
        let status = self.pump(timeout_ms);
        self.end_browsing();
        status
    }

    /// Stop browsing. Known instances stay queryable.
    pub fn end_browsing(&mut self) {
        if self.browsing {
            self.adapter.stop_browse();
            self.browsing = false;
        }
    }

    pub fn is_browsing(&self) -> bool {
        self.browsing
    }

    /// One-shot discovery: browse `scope` for `timeout_ms` and return the
    /// instance snapshot. Leaves an explicitly begun browse running.
    pub fn discover(&mut self, scope: Interfaces, timeout_ms: i32) -> Vec<String> {
        let began = !self.browsing;
        if began && !self.begin_browsing(scope).is_success() {
            return self.instances();
        }

        let status = self.pump(timeout_ms);
        if !status.is_success() {
            tracing::debug!("Discovery pump for {} returned {}", self.service_type, status);
        }
        if began {
            self.end_browsing();
        }
        self.instances()
    }

    /// Register a listener without taking ownership of it
    pub fn add_listener<L: Listener + 'static>(&mut self, listener: &Arc<L>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn pump(&mut self, timeout_ms: i32) -> Status {
        let events = match self.adapter.pump_events(Wait::from_millis(timeout_ms)) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("Event pump for {} failed: {}", self.service_type, e);
                return e.into();
            }
        };

        for event in events {
            self.apply(event);
        }
        for name in self.instances.finish_resync() {
            tracing::debug!("Instance {} not seen again, dropping", name);
            self.attributes.remove_remote(&name);
        }

        // snapshot the diff first so listeners observe a settled table
        let changes = self.instances.take_changes();
        self.listeners.prune();
        let session: &Self = self;
        session.listeners.notify(session, &changes);
        Status::SUCCESS
    }

    fn apply(&mut self, event: RawEvent) {
        match event {
            RawEvent::InstanceFound { name } => {
                if self.instances.insert(&name) {
                    tracing::debug!("Found {} instance {}", self.service_type, name);
                    self.attributes.ensure_remote(&name);
                }
            }
            RawEvent::InstanceResolved { name, resolution } => {
                let Resolution {
                    host,
                    port,
                    addresses,
                    attributes,
                } = resolution;
                if !self.instances.resolve(&name, host, port, addresses) {
                    tracing::trace!("Discarding resolution for untracked instance {}", name);
                    return;
                }
                tracing::debug!("Resolved {} instance {}", self.service_type, name);
                self.attributes.replace_remote(&name, attributes);
            }
            RawEvent::InstanceLost { name } => {
                if self.instances.remove(&name) {
                    tracing::debug!("Lost {} instance {}", self.service_type, name);
                    self.attributes.remove_remote(&name);
                }
            }
        }
    }
}

impl Drop for ServiceSession {
    fn drop(&mut self) {
        self.end_browsing();
        self.withdraw();
    }
}

/// Accepts "_name._tcp" and "_name._udp", with `name` an RFC 6335 service name:
/// at most 15 letters, digits and hyphens, at least one letter, no leading,
/// trailing or doubled hyphen.
fn validate_service_type(service_type: &str) -> Result<(), SessionError> {
    let invalid = || SessionError::InvalidServiceType(service_type.to_string());

    let (name, protocol) = service_type.split_once('.').ok_or_else(invalid)?;
    let label = name.strip_prefix('_').ok_or_else(invalid)?;
    let label_ok = !label.is_empty()
        && label.len() <= 15
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && label.chars().any(|c| c.is_ascii_alphabetic())
        && !label.starts_with('-')
        && !label.ends_with('-')
        && !label.contains("--");
    if !label_ok || !matches!(protocol, "_tcp" | "_udp") {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::UnavailableAdapter;

    #[test]
    fn test_validate_service_type() {
        assert!(validate_service_type("_test._tcp").is_ok());
        assert!(validate_service_type("_daqri-service._udp").is_ok());
        assert!(validate_service_type("_h2o._tcp").is_ok());
        assert!(validate_service_type("_x-1._tcp").is_ok());

        for bad in [
            "",
            "test._tcp",
            "_._tcp",
            "_test",
            "_test._sctp",
            "_a._tcp.local.",
            "_has space._tcp",
            "_123._tcp",
            "_a--b._tcp",
            "_-ab._tcp",
            "_ab-._udp",
            "_sixteen-letters1._tcp",
        ] {
            assert!(
                matches!(validate_service_type(bad), Err(SessionError::InvalidServiceType(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_unavailable_session_never_fails_hard() {
        let mut session = ServiceSession::with_adapter("_test._tcp", Box::new(UnavailableAdapter)).unwrap();
        assert_eq!(session.backend(), BackendKind::Unavailable);
        assert!(!session.is_announced());

        assert_eq!(session.announce(4000, "node-1"), Status::NOT_SUPPORTED);
        assert!(!session.is_announced());
        assert_eq!(session.begin_browsing(Interfaces::All), Status::NOT_SUPPORTED);
        assert!(!session.is_browsing());
        assert_eq!(session.browse(0), Status::NOT_SUPPORTED);
        assert!(session.discover(Interfaces::Local, 10).is_empty());
        session.withdraw();
        session.end_browsing();
    }

    #[test]
    fn test_empty_instance_name_rejected() {
        let mut session = ServiceSession::with_adapter("_test._tcp", Box::new(UnavailableAdapter)).unwrap();
        assert_eq!(session.announce(4000, ""), Status::BAD_PARAM);
    }

    #[test]
    fn test_local_attribute_round_trip() {
        let mut session = ServiceSession::with_adapter("_test._tcp", Box::new(UnavailableAdapter)).unwrap();
        session.set("priority", "1");
        session.set("UUID", "42");
        session.set("priority", "2");

        assert_eq!(session.get("priority"), "2");
        assert_eq!(session.get("UUID"), "42");
        assert_eq!(session.get("42"), "");
        assert_eq!(session.keys(), vec!["priority", "UUID"]);

        session.set_for("", "scoped", "yes");
        assert_eq!(session.get("scoped"), "yes");
    }

    #[test]
    fn test_queries_on_unknown_instance() {
        let mut session = ServiceSession::with_adapter("_test._tcp", Box::new(UnavailableAdapter)).unwrap();
        session.set("k", "local");
        session.set_for("ghost", "k", "v");

        assert_eq!(session.get_for("ghost", "k"), "");
        assert_eq!(session.get_for("", "k"), "local");
        assert_eq!(session.keys_for(""), vec!["k"]);
        assert!(session.keys_for("ghost").is_empty());
        assert!(!session.contains_key("ghost", "k"));
        assert_eq!(session.host("ghost"), "");
        assert!(session.instance("ghost").is_none());
        assert!(session.instances().is_empty());
    }
}
