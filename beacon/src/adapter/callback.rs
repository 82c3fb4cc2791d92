//! Adapter for client libraries that report discovery through callbacks.
//!
//! The client invokes an [`EventSink`] from whatever thread it owns. The sink
//! only enqueues; events are translated into table updates later, when
//! `pump_events` drains the queue on the session's thread.

use std::time::{Duration, Instant};
use crate::attributes::Attributes;
use crate::error::BackendError;
use super::{BackendAdapter, BackendKind, Interfaces, RawEvent, Wait};

/// What to publish
#[derive(Debug, Clone, Copy)]
pub struct Advertisement<'a> {
    pub instance_name: &'a str,
    pub port: u16,
    pub attributes: &'a Attributes,
}

/// Thread-safe entry point for backend callbacks
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: flume::Sender<RawEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: flume::Sender<RawEvent>) -> Self {
        Self { tx }
    }

    /// Queue an event. Returns false once the browse that owns the queue is gone.
    pub fn deliver(&self, event: RawEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// A callback-driven native client bound to one service type
pub trait CallbackClient: Send {
    fn kind(&self) -> BackendKind;

    fn register(&mut self, advertisement: Advertisement<'_>) -> Result<(), BackendError>;

    fn unregister(&mut self);

    /// Begin delivering events to `sink` from the client's own context
    fn start_browse(&mut self, scope: Interfaces, sink: EventSink) -> Result<(), BackendError>;

    /// Detach the sink. Must not return while a callback into it can still run.
    fn stop_browse(&mut self);
}

pub struct CallbackAdapter<C: CallbackClient> {
    client: C,
    queue: Option<flume::Receiver<RawEvent>>,
    idle_timeout: Duration,
}

impl<C: CallbackClient> CallbackAdapter<C> {
    pub fn new(client: C, idle_timeout: Duration) -> Self {
        Self {
            client,
            queue: None,
            idle_timeout,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: CallbackClient> BackendAdapter for CallbackAdapter<C> {
    fn kind(&self) -> BackendKind {
        self.client.kind()
    }

    fn advertise(&mut self, port: u16, instance_name: &str, attributes: &Attributes) -> Result<(), BackendError> {
        self.client.register(Advertisement {
            instance_name,
            port,
            attributes,
        })
    }

    fn unadvertise(&mut self) {
        self.client.unregister();
    }

    fn start_browse(&mut self, scope: Interfaces) -> Result<(), BackendError> {
        if self.queue.is_some() {
            return Ok(());
        }

        let (tx, rx) = flume::unbounded();
        self.client.start_browse(scope, EventSink::new(tx))?;
        self.queue = Some(rx);
        Ok(())
    }

    fn stop_browse(&mut self) {
        if self.queue.take().is_some() {
            self.client.stop_browse();
        }
    }

    fn pump_events(&mut self, wait: Wait) -> Result<Vec<RawEvent>, BackendError> {
        let Some(queue) = self.queue.as_ref() else {
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        match wait {
            Wait::Drain => {}
            Wait::For(timeout) => {
                let deadline = Instant::now() + timeout;
                while let Ok(event) = queue.recv_deadline(deadline) {
                    events.push(event);
                }
            }
            Wait::UntilEvent => {
                if let Ok(event) = queue.recv_timeout(self.idle_timeout) {
                    events.push(event);
                }
            }
        }
        events.extend(queue.try_iter());

        if events.is_empty() && queue.is_disconnected() {
            return Err(BackendError::Poll(format!("{} event source closed", self.client.kind())));
        }
        for event in &events {
            tracing::trace!("{} event: {:?}", self.client.kind(), event);
        }
        Ok(events)
    }
}

impl<C: CallbackClient> Drop for CallbackAdapter<C> {
    fn drop(&mut self) {
        self.stop_browse();
        self.client.unregister();
    }
}
