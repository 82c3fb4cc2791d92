//! Poll-driven adapter over the `mdns-sd` multicast responder.
//!
//! The responder runs its own daemon thread and hands events over a flume
//! channel. This adapter only reads that channel when the session pumps it.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use flume::RecvTimeoutError;
use mdns_sd::{IfKind, ServiceDaemon, ServiceEvent, ServiceInfo};
use crate::attributes::Attributes;
use crate::config::Config;
use crate::error::BackendError;
use super::{BackendAdapter, BackendKind, Interfaces, RawEvent, Resolution, Wait};

impl From<mdns_sd::Error> for BackendError {
    fn from(err: mdns_sd::Error) -> Self {
        BackendError::unknown(err.to_string())
    }
}

/// Whether a responder can be started on this host. Computed once per process.
pub fn probe() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| match ServiceDaemon::new() {
        Ok(daemon) => {
            if let Err(e) = daemon.shutdown() {
                tracing::debug!("Failed to shut down probe daemon: {}", e);
            }
            true
        }
        Err(e) => {
            tracing::debug!("mDNS responder unavailable: {}", e);
            false
        }
    })
}

/// "<hostname>.local." for this machine
pub(crate) fn local_host_name() -> String {
    let name = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .and_then(|h| h.split('.').next().map(str::to_string))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    format!("{}.local.", name)
}

/// Turns daemon events for one browse into [`RawEvent`]s
struct EventFilter {
    ty_domain: String,
    host_name: String,
    scope: Interfaces,
    /// Instances already reported as found during this browse
    reported: HashSet<String>,
}

impl EventFilter {
    fn new(ty_domain: &str, host_name: &str, scope: Interfaces) -> Self {
        Self {
            ty_domain: ty_domain.to_string(),
            host_name: host_name.to_string(),
            scope,
            reported: HashSet::new(),
        }
    }

    fn translate(&mut self, event: ServiceEvent, out: &mut Vec<RawEvent>) {
        match event {
            ServiceEvent::ServiceFound(_ty, fullname) => {
                // local-only browses wait for the resolution to know the host
                if self.scope == Interfaces::All {
                    let name = instance_name(&fullname, &self.ty_domain);
                    if self.reported.insert(name.clone()) {
                        out.push(RawEvent::InstanceFound { name });
                    }
                }
            }
            ServiceEvent::ServiceResolved(info) => {
                let name = instance_name(info.get_fullname(), &self.ty_domain);
                if self.scope == Interfaces::Local && !self.is_local(&info) {
                    tracing::trace!("Skipping non-local instance {}", name);
                    return;
                }
                if self.reported.insert(name.clone()) {
                    out.push(RawEvent::InstanceFound { name: name.clone() });
                }
                out.push(RawEvent::InstanceResolved {
                    name,
                    resolution: resolution(&info),
                });
            }
            ServiceEvent::ServiceRemoved(_ty, fullname) => {
                let name = instance_name(&fullname, &self.ty_domain);
                if self.reported.remove(&name) {
                    out.push(RawEvent::InstanceLost { name });
                }
            }
            other => tracing::trace!("Ignoring mDNS event {:?}", other),
        }
    }

    fn is_local(&self, info: &ServiceInfo) -> bool {
        info.get_hostname().eq_ignore_ascii_case(&self.host_name)
            || info.get_addresses().iter().any(|addr| addr.is_loopback())
    }
}

struct BrowseState {
    receiver: mdns_sd::Receiver<ServiceEvent>,
    filter: EventFilter,
}

pub struct MdnsSdAdapter {
    daemon: ServiceDaemon,
    ty_domain: String,
    host_name: String,
    idle_timeout: Duration,
    registered: Option<String>,
    browse: Option<BrowseState>,
}

impl MdnsSdAdapter {
    pub fn open(service_type: &str, config: &Config) -> Result<Self, BackendError> {
        let daemon = ServiceDaemon::new()?;

        if let Some(interface) = &config.mdns.interface {
            daemon.disable_interface(IfKind::All)?;
            daemon.enable_interface(interface.as_str())?;
            tracing::debug!("mDNS responder restricted to {}", interface);
        }

        Ok(Self {
            daemon,
            ty_domain: ty_domain(service_type, &config.mdns.domain),
            host_name: config.mdns.host_name.clone().unwrap_or_else(local_host_name),
            idle_timeout: config.discovery.idle_timeout(),
            registered: None,
            browse: None,
        })
    }

    fn unregister(&mut self, fullname: &str) {
        match self.daemon.unregister(fullname) {
            Ok(status) => {
                // wait for the goodbye so a quick re-register does not race it
                if let Err(e) = status.recv_timeout(Duration::from_secs(1)) {
                    tracing::debug!("No unregister confirmation for {}: {}", fullname, e);
                }
                tracing::info!("Unregistered {}", fullname);
            }
            Err(e) => tracing::error!("Failed to unregister {}: {}", fullname, e),
        }
    }
}

impl BackendAdapter for MdnsSdAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::MdnsSd
    }

    /// A failed re-advertise leaves the previous registration live and tracked
    fn advertise(&mut self, port: u16, instance_name: &str, attributes: &Attributes) -> Result<(), BackendError> {
        let service_info = service_info(&self.ty_domain, instance_name, &self.host_name, port, attributes)?;
        let fullname = service_info.get_fullname().to_string();

        self.daemon.register(service_info)?;
        tracing::info!(
            "Registered {} as {} on port {}",
            self.ty_domain,
            instance_name,
            port
        );

        if let Some(previous) = self.registered.replace(fullname) {
            if self.registered.as_deref() != Some(previous.as_str()) {
                self.unregister(&previous);
            }
        }
        Ok(())
    }

    fn unadvertise(&mut self) {
        if let Some(fullname) = self.registered.take() {
            self.unregister(&fullname);
        }
    }

    fn start_browse(&mut self, scope: Interfaces) -> Result<(), BackendError> {
        if self.browse.is_some() {
            return Ok(());
        }

        let receiver = self.daemon.browse(&self.ty_domain)?;
        tracing::debug!("Browsing {}", self.ty_domain);
        self.browse = Some(BrowseState {
            receiver,
            filter: EventFilter::new(&self.ty_domain, &self.host_name, scope),
        });
        Ok(())
    }

    fn stop_browse(&mut self) {
        if self.browse.take().is_some() {
            if let Err(e) = self.daemon.stop_browse(&self.ty_domain) {
                tracing::warn!("Failed to stop browsing {}: {}", self.ty_domain, e);
            }
        }
    }

    fn pump_events(&mut self, wait: Wait) -> Result<Vec<RawEvent>, BackendError> {
        let Some(state) = self.browse.as_mut() else {
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        let mut closed = false;
        let deadline = match wait {
            Wait::Drain => None,
            Wait::For(timeout) => Some(Instant::now() + timeout),
            Wait::UntilEvent => Some(Instant::now() + self.idle_timeout),
        };

        if let Some(deadline) = deadline {
            loop {
                match state.receiver.recv_deadline(deadline) {
                    Ok(event) => {
                        state.filter.translate(event, &mut events);
                        if wait == Wait::UntilEvent && !events.is_empty() {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            }
        }
        for event in state.receiver.try_iter() {
            state.filter.translate(event, &mut events);
        }

        if closed && events.is_empty() {
            return Err(BackendError::Poll(format!(
                "mDNS responder closed the {} browse",
                self.ty_domain
            )));
        }
        Ok(events)
    }
}

impl Drop for MdnsSdAdapter {
    fn drop(&mut self) {
        self.stop_browse();
        self.unadvertise();
        if let Err(e) = self.daemon.shutdown() {
            tracing::error!("Failed to shutdown mDNS daemon: {}", e);
        }
    }
}

fn ty_domain(service_type: &str, domain: &str) -> String {
    let domain = domain.trim_matches('.');
    format!("{}.{}.", service_type.trim_end_matches('.'), domain)
}

/// "node-1._test._tcp.local." -> "node-1"
fn instance_name(fullname: &str, ty_domain: &str) -> String {
    fullname
        .strip_suffix(ty_domain)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(fullname)
        .to_string()
}

/// TXT records go out as an ordered slice so discoverers see the announcer's key order
fn service_info(
    ty_domain: &str,
    instance_name: &str,
    host_name: &str,
    port: u16,
    attributes: &Attributes,
) -> Result<ServiceInfo, BackendError> {
    let properties = attributes.to_vec();
    let info = ServiceInfo::new(ty_domain, instance_name, host_name, "", port, &properties[..])?;
    Ok(info.enable_addr_auto())
}

fn resolution(info: &ServiceInfo) -> Resolution {
    let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
    addresses.sort();

    Resolution {
        host: info.get_hostname().to_string(),
        port: info.get_port(),
        addresses,
        attributes: info
            .get_properties()
            .iter()
            .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
            .collect(),
    }
}
