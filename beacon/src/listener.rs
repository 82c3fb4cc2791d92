//! Observers of instance membership changes.
//!
//! The registry only holds [`Weak`] handles: it never keeps a listener alive,
//! and a listener dropped without deregistering is skipped and pruned.

use std::sync::{Arc, Weak};
use crate::instances::Changes;
use crate::session::ServiceSession;

/// Receives add/remove notifications from a [`ServiceSession`].
///
/// Callbacks run on the thread calling `browse`/`discover`, after the
/// session's tables are fully updated. Only the instance name is passed;
/// query `session` for details.
pub trait Listener: Send + Sync {
    fn instance_added(&self, session: &ServiceSession, instance: &str);
    fn instance_removed(&self, session: &ServiceSession, instance: &str);
}

/// Handle returned by [`ServiceSession::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    slots: Vec<(ListenerId, Weak<dyn Listener>)>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`; registering the same object twice returns its existing id
    pub fn add<L: Listener + 'static>(&mut self, listener: &Arc<L>) -> ListenerId {
        let listener: Arc<dyn Listener> = listener.clone();
        let handle = Arc::downgrade(&listener);
        if let Some((id, _)) = self.slots.iter().find(|(_, w)| w.ptr_eq(&handle)) {
            return *id;
        }

        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.slots.push((id, handle));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|(slot, _)| *slot != id);
        self.slots.len() != before
    }

    /// Forget listeners whose owners dropped them
    pub fn prune(&mut self) {
        self.slots.retain(|(_, w)| w.strong_count() > 0);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Removals first, then additions, each in table order
    pub fn notify(&self, session: &ServiceSession, changes: &Changes) {
        if changes.is_empty() {
            return;
        }
        let live: Vec<Arc<dyn Listener>> = self.slots.iter().filter_map(|(_, w)| w.upgrade()).collect();

        for name in &changes.removed {
            for listener in &live {
                listener.instance_removed(session, name);
            }
        }
        for name in &changes.added {
            for listener in &live {
                listener.instance_added(session, name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    impl Listener for Nop {
        fn instance_added(&self, _: &ServiceSession, _: &str) {}
        fn instance_removed(&self, _: &ServiceSession, _: &str) {}
    }

    #[test]
    fn test_same_listener_registered_once() {
        let mut registry = ListenerRegistry::new();
        let listener = Arc::new(Nop);
        let first = registry.add(&listener);
        let second = registry.add(&listener);
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);

        let other = registry.add(&Arc::new(Nop));
        assert_ne!(first, other);
    }

    #[test]
    fn test_remove_by_id() {
        let mut registry = ListenerRegistry::new();
        let listener = Arc::new(Nop);
        let id = registry.add(&listener);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_does_not_own_listeners() {
        let mut registry = ListenerRegistry::new();
        let listener = Arc::new(Nop);
        registry.add(&listener);
        assert_eq!(Arc::strong_count(&listener), 1);

        drop(listener);
        registry.prune();
        assert!(registry.is_empty());
    }
}
