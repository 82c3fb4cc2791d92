//! Continuous browsing on a blocking worker, for async callers.
//!
//! The session itself never spawns anything. [`spawn_browser`] moves a
//! session onto a `spawn_blocking` worker the caller owns through the
//! returned [`BrowserHandle`], pumping it until cancelled.

use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use shared::types::InstanceEntry;
use crate::adapter::Interfaces;
use crate::listener::Listener;
use crate::session::ServiceSession;
use crate::status::Status;

/// Membership change forwarded to async consumers
#[derive(Debug, Clone)]
pub enum BrowseEvent {
    Added(InstanceEntry),
    Removed(String),
}

struct ChannelListener {
    tx: mpsc::Sender<BrowseEvent>,
}

impl Listener for ChannelListener {
    fn instance_added(&self, session: &ServiceSession, instance: &str) {
        let Some(entry) = session.instance(instance) else {
            return;
        };
        if let Err(e) = self.tx.blocking_send(BrowseEvent::Added(entry)) {
            tracing::debug!("Dropping added event, receiver gone: {}", e);
        }
    }

    fn instance_removed(&self, _session: &ServiceSession, instance: &str) {
        if let Err(e) = self.tx.blocking_send(BrowseEvent::Removed(instance.to_string())) {
            tracing::debug!("Dropping removed event, receiver gone: {}", e);
        }
    }
}

pub struct BrowserHandle {
    cancel: CancellationToken,
    handle: JoinHandle<ServiceSession>,
}

impl BrowserHandle {
    /// Stop browsing and get the session back
    pub async fn stop(self) -> Result<ServiceSession> {
        self.cancel.cancel();
        let session = self.handle.await?;
        Ok(session)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Browse `scope` continuously, sending membership changes to `tx` until
/// `cancel` fires or `tx`'s receiver is dropped.
///
/// Must be called from within a tokio runtime.
pub fn spawn_browser(
    mut session: ServiceSession,
    scope: Interfaces,
    poll_interval: Duration,
    tx: mpsc::Sender<BrowseEvent>,
    cancel: CancellationToken,
) -> BrowserHandle {
    let slice = i32::try_from(poll_interval.as_millis()).unwrap_or(i32::MAX).max(1);
    let worker_cancel = cancel.clone();

    let handle = tokio::task::spawn_blocking(move || {
        let listener = Arc::new(ChannelListener { tx: tx.clone() });
        let id = session.add_listener(&listener);

        let began = session.begin_browsing(scope);
        if began.is_success() || began == Status::PENDING {
            tracing::info!("Watching {} instances", session.name());
            while !worker_cancel.is_cancelled() && !tx.is_closed() {
                let status = session.browse(slice);
                if status == Status::POLL_ERROR {
                    tracing::warn!("Browse of {} failed: {}", session.name(), status);
                    std::thread::sleep(Duration::from_millis(u64::from(slice.unsigned_abs())));
                }
            }
            tracing::info!("Stopped watching {}", session.name());
        } else {
            tracing::error!("Failed to watch {}: {}", session.name(), began);
        }

        session.remove_listener(id);
        if began.is_success() {
            session.end_browsing();
        }
        session
    });

    BrowserHandle { cancel, handle }
}
