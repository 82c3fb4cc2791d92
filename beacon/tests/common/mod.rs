#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;
use beacon::adapter::CallbackAdapter;
use beacon::{Listener, LoopbackRegistry, ServiceSession};

pub const PROPAGATION_MS: i32 = 50;
pub const PROPAGATION_TRIES: usize = 20;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("beacon=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn loopback_session(registry: &LoopbackRegistry, service_type: &str) -> ServiceSession {
    let client = registry.open(service_type).unwrap();
    let adapter = CallbackAdapter::new(client, Duration::from_millis(PROPAGATION_MS as u64));
    ServiceSession::with_adapter(service_type, Box::new(adapter)).unwrap()
}

/// Records "+name" / "-name" per notification, plus the "role" attribute
/// visible at the time of each add.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
    roles: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn roles(&self) -> Vec<String> {
        self.roles.lock().unwrap().clone()
    }
}

impl Listener for Recorder {
    fn instance_added(&self, session: &ServiceSession, instance: &str) {
        self.events.lock().unwrap().push(format!("+{instance}"));
        self.roles
            .lock()
            .unwrap()
            .push(session.get_for(instance, "role").to_string());
    }

    fn instance_removed(&self, session: &ServiceSession, instance: &str) {
        assert!(
            !session.instances().iter().any(|i| i == instance),
            "removed instance still listed"
        );
        self.events.lock().unwrap().push(format!("-{instance}"));
    }
}
