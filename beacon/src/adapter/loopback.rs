//! In-process DNS-SD style registry.
//!
//! Sessions in the same process announce into and browse from a shared
//! [`LoopbackRegistry`]. It behaves like a callback-driven system service:
//! clients open a connection, registrations are pushed to every browser of
//! the same service type, and new browsers get the current registrations
//! replayed. Deliveries happen under the registry lock on the thread that
//! caused them, never on the browsing session's thread.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use shared::protocol::{DNSSD_NAME_CONFLICT, DNSSD_NO_AUTH, DNSSD_SERVICE_NOT_RUNNING};
use crate::error::BackendError;
use super::callback::{Advertisement, CallbackClient, EventSink};
use super::{mdns, BackendKind, Interfaces, RawEvent, Resolution};

#[derive(Clone)]
pub struct LoopbackRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

struct RegistryState {
    running: bool,
    refuse_clients: bool,
    next_client: u64,
    registrations: Vec<Registration>,
    browsers: Vec<Browser>,
}

struct Registration {
    owner: u64,
    service_type: String,
    instance_name: String,
    resolution: Resolution,
}

struct Browser {
    owner: u64,
    service_type: String,
    sink: EventSink,
}

impl RegistryState {
    fn broadcast(&mut self, service_type: &str, events: &[RawEvent]) {
        self.browsers.retain(|browser| {
            if browser.service_type != service_type {
                return true;
            }
            events.iter().all(|event| browser.sink.deliver(event.clone()))
        });
    }
}

fn not_running() -> BackendError {
    BackendError::failure(DNSSD_SERVICE_NOT_RUNNING, "loopback registry not running")
}

fn resolved_events(registration: &Registration) -> [RawEvent; 2] {
    [
        RawEvent::InstanceFound {
            name: registration.instance_name.clone(),
        },
        RawEvent::InstanceResolved {
            name: registration.instance_name.clone(),
            resolution: registration.resolution.clone(),
        },
    ]
}

impl LoopbackRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryState {
                running: true,
                refuse_clients: false,
                next_client: 0,
                registrations: Vec::new(),
                browsers: Vec::new(),
            })),
        }
    }

    /// Registry shared by every session bound to the loopback backend
    pub fn global() -> &'static LoopbackRegistry {
        static GLOBAL: OnceLock<LoopbackRegistry> = OnceLock::new();
        GLOBAL.get_or_init(LoopbackRegistry::new)
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    /// Connect a client for `service_type`
    pub fn open(&self, service_type: &str) -> Result<LoopbackClient, BackendError> {
        let mut state = self.state();
        if !state.running {
            return Err(not_running());
        }
        if state.refuse_clients {
            return Err(BackendError::failure(DNSSD_NO_AUTH, "loopback registry refused client"));
        }

        let id = state.next_client;
        state.next_client += 1;
        Ok(LoopbackClient {
            registry: self.clone(),
            id,
            service_type: service_type.to_string(),
            host_name: mdns::local_host_name(),
        })
    }

    /// Stop the registry: browsers see every instance leave, then their
    /// event source closes. Registrations are dropped.
    pub fn shutdown(&self) {
        let mut state = self.state();
        state.running = false;

        let registrations = std::mem::take(&mut state.registrations);
        for registration in &registrations {
            state.broadcast(
                &registration.service_type,
                &[RawEvent::InstanceLost {
                    name: registration.instance_name.clone(),
                }],
            );
        }
        state.browsers.clear();
        tracing::info!("Loopback registry stopped");
    }

    pub fn restart(&self) {
        self.state().running = true;
    }

    /// Reject new clients, like a daemon the caller lacks permission for
    pub fn refuse_clients(&self, refuse: bool) {
        self.state().refuse_clients = refuse;
    }

    /// Instance names currently registered for `service_type`
    pub fn instances(&self, service_type: &str) -> Vec<String> {
        self.state()
            .registrations
            .iter()
            .filter(|r| r.service_type == service_type)
            .map(|r| r.instance_name.clone())
            .collect()
    }
}

impl Default for LoopbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// One connection to a [`LoopbackRegistry`]; owns at most one registration
/// and one browse.
pub struct LoopbackClient {
    registry: LoopbackRegistry,
    id: u64,
    service_type: String,
    host_name: String,
}

impl LoopbackClient {
    pub fn service_type(&self) -> &str {
        &self.service_type
    }
}

impl CallbackClient for LoopbackClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Loopback
    }

    fn register(&mut self, advertisement: Advertisement<'_>) -> Result<(), BackendError> {
        let mut state = self.registry.state();
        if !state.running {
            return Err(not_running());
        }

        let name = advertisement.instance_name;
        if state
            .registrations
            .iter()
            .any(|r| r.owner != self.id && r.service_type == self.service_type && r.instance_name == name)
        {
            return Err(BackendError::failure(
                DNSSD_NAME_CONFLICT,
                format!("instance name {name:?} already registered"),
            ));
        }

        let resolution = Resolution {
            host: self.host_name.clone(),
            port: advertisement.port,
            addresses: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            attributes: advertisement.attributes.clone(),
        };

        match state.registrations.iter().position(|r| r.owner == self.id) {
            Some(index) if state.registrations[index].instance_name == name => {
                // same name: refresh in place, browsers only see new data
                state.registrations[index].resolution = resolution.clone();
                state.broadcast(
                    &self.service_type,
                    &[RawEvent::InstanceResolved {
                        name: name.to_string(),
                        resolution,
                    }],
                );
            }
            existing => {
                if let Some(index) = existing {
                    let old = state.registrations.remove(index);
                    state.broadcast(&self.service_type, &[RawEvent::InstanceLost { name: old.instance_name }]);
                }
                let registration = Registration {
                    owner: self.id,
                    service_type: self.service_type.clone(),
                    instance_name: name.to_string(),
                    resolution,
                };
                let events = resolved_events(&registration);
                state.registrations.push(registration);
                state.broadcast(&self.service_type, &events);
            }
        }
        Ok(())
    }

    fn unregister(&mut self) {
        let mut state = self.registry.state();
        if let Some(index) = state.registrations.iter().position(|r| r.owner == self.id) {
            let old = state.registrations.remove(index);
            state.broadcast(&self.service_type, &[RawEvent::InstanceLost { name: old.instance_name }]);
        }
    }

    fn start_browse(&mut self, _scope: Interfaces, sink: EventSink) -> Result<(), BackendError> {
        let mut state = self.registry.state();
        if !state.running {
            return Err(not_running());
        }

        for registration in state.registrations.iter().filter(|r| r.service_type == self.service_type) {
            for event in resolved_events(registration) {
                sink.deliver(event);
            }
        }
        state.browsers.retain(|b| b.owner != self.id);
        state.browsers.push(Browser {
            owner: self.id,
            service_type: self.service_type.clone(),
            sink,
        });
        Ok(())
    }

    fn stop_browse(&mut self) {
        self.registry.state().browsers.retain(|b| b.owner != self.id);
    }
}

impl Drop for LoopbackClient {
    fn drop(&mut self) {
        self.stop_browse();
        self.unregister();
    }
}
