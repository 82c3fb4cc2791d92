//! Backend adapters: the narrow interface a session drives.
//!
//! Every backend, whether it is polled or calls back from its own thread,
//! surfaces discovery as a sequence of [`RawEvent`]s returned from
//! [`BackendAdapter::pump_events`] on the caller's thread.

pub mod callback;
pub mod loopback;
pub mod mdns;
pub mod unavailable;

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use serde::Deserialize;
use crate::attributes::Attributes;
use crate::config::Config;
use crate::error::{BackendError, SessionError};

pub use callback::{Advertisement, CallbackAdapter, CallbackClient, EventSink};
pub use loopback::{LoopbackClient, LoopbackRegistry};
pub use mdns::MdnsSdAdapter;
pub use unavailable::UnavailableAdapter;

/// Which interfaces a browse covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interfaces {
    /// Only instances hosted on this machine
    Local,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Multicast responder from the `mdns-sd` crate
    MdnsSd,
    /// In-process registry shared by sessions of this process
    Loopback,
    Unavailable,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::MdnsSd => "mdns-sd",
            BackendKind::Loopback => "loopback",
            BackendKind::Unavailable => "unavailable",
        })
    }
}

impl BackendKind {
    /// Capability probe for this kind of backend on this host
    pub fn is_available(self) -> bool {
        match self {
            BackendKind::MdnsSd => mdns::probe(),
            BackendKind::Loopback => LoopbackRegistry::global().is_running(),
            BackendKind::Unavailable => false,
        }
    }

    fn open(self, service_type: &str, config: &Config) -> Result<Box<dyn BackendAdapter>, BackendError> {
        match self {
            BackendKind::MdnsSd => Ok(Box::new(MdnsSdAdapter::open(service_type, config)?)),
            BackendKind::Loopback => {
                let client = LoopbackRegistry::global().open(service_type)?;
                Ok(Box::new(CallbackAdapter::new(client, config.discovery.idle_timeout())))
            }
            BackendKind::Unavailable => Ok(Box::new(UnavailableAdapter)),
        }
    }
}

/// How long a pump may wait for backend events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Take only what is already queued
    Drain,
    /// Collect everything that arrives until the deadline
    For(Duration),
    /// Block until at least one event arrives or the backend's idle limit passes
    UntilEvent,
}

impl Wait {
    /// 0 drains, negative waits for an event, positive bounds the wait
    pub fn from_millis(timeout_ms: i32) -> Self {
        match timeout_ms {
            0 => Wait::Drain,
            ms if ms < 0 => Wait::UntilEvent,
            ms => Wait::For(Duration::from_millis(ms.unsigned_abs() as u64)),
        }
    }
}

/// Resolution data for one instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub host: String,
    pub port: u16,
    pub addresses: Vec<IpAddr>,
    pub attributes: Attributes,
}

/// Backend-neutral discovery event
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    InstanceFound { name: String },
    InstanceResolved { name: String, resolution: Resolution },
    InstanceLost { name: String },
}

/// Native discovery backend bound to one service type
pub trait BackendAdapter: Send {
    fn kind(&self) -> BackendKind;

    /// Publish (or re-publish) this process under `instance_name`
    fn advertise(&mut self, port: u16, instance_name: &str, attributes: &Attributes) -> Result<(), BackendError>;

    fn unadvertise(&mut self);

    fn start_browse(&mut self, scope: Interfaces) -> Result<(), BackendError>;

    /// Stop the event source. No event produced by the backend after this
    /// returns is ever handed out by `pump_events`.
    fn stop_browse(&mut self);

    fn pump_events(&mut self, wait: Wait) -> Result<Vec<RawEvent>, BackendError>;
}

/// Bind the first available backend from `config.discovery.backends`.
///
/// Finding none is not an error: the session gets an [`UnavailableAdapter`].
pub fn select(service_type: &str, config: &Config) -> Result<Box<dyn BackendAdapter>, SessionError> {
    for &kind in &config.discovery.backends {
        if !kind.is_available() {
            tracing::debug!("Backend {} not available for {}", kind, service_type);
            continue;
        }

        let adapter = kind
            .open(service_type, config)
            .map_err(|source| SessionError::Construction { backend: kind, source })?;
        tracing::info!("Bound {} backend for {}", kind, service_type);
        return Ok(adapter);
    }

    tracing::info!("No zeroconf backend available for {}", service_type);
    Ok(Box::new(UnavailableAdapter))
}

/// True iff any backend in the configured order is available
pub fn any_available(config: &Config) -> bool {
    config.discovery.backends.iter().any(|kind| kind.is_available())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_from_millis() {
        assert_eq!(Wait::from_millis(0), Wait::Drain);
        assert_eq!(Wait::from_millis(-1), Wait::UntilEvent);
        assert_eq!(Wait::from_millis(1500), Wait::For(Duration::from_millis(1500)));
    }

    #[test]
    fn test_select_with_no_backends_binds_unavailable() {
        let mut config = Config::default();
        config.discovery.backends.clear();
        let adapter = select("_test._tcp", &config).unwrap();
        assert_eq!(adapter.kind(), BackendKind::Unavailable);
        assert!(!any_available(&config));
    }

    #[test]
    fn test_unavailable_kind_is_never_available() {
        let mut config = Config::default();
        config.discovery.backends = vec![BackendKind::Unavailable];
        assert!(!any_available(&config));
        assert_eq!(select("_test._tcp", &config).unwrap().kind(), BackendKind::Unavailable);
    }
}
