//! Copy-on-write listener registry for the reader loop.
//!
//! Dispatch takes a snapshot of the list and iterates it without holding the
//! lock, so listeners may be added or removed from inside a callback. A
//! listener added during a dispatch is first called on the next event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::input_event::RawInputEvent;
use super::reader_loop::ReaderError;

/// Trait for reacting to events read from a device.
pub trait InputEventListener: Send + Sync {
    fn on_input_event(&self, event: &RawInputEvent);

    /// Called once when the reader loop stops on a read failure.
    fn on_error(&self, _error: &ReaderError) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ListenerList = Vec<(ListenerId, Arc<dyn InputEventListener>)>;

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Arc<ListenerList>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener at the end of the dispatch order.
    pub fn add(&self, listener: Arc<dyn InputEventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut next = ListenerList::clone(&guard);
        next.push((id, listener));
        *guard = Arc::new(next);
        id
    }

    /// Returns false if the id was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut guard = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !guard.iter().any(|(existing, _)| *existing == id) {
            return false;
        }
        let next: ListenerList = guard
            .iter()
            .filter(|(existing, _)| *existing != id)
            .cloned()
            .collect();
        *guard = Arc::new(next);
        true
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.snapshot().len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<ListenerList> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls every listener in registration order.
    pub fn dispatch(&self, event: &RawInputEvent) {
        for (_, listener) in self.snapshot().iter() {
            listener.on_input_event(event);
        }
    }

    pub fn dispatch_error(&self, error: &ReaderError) {
        for (_, listener) in self.snapshot().iter() {
            listener.on_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(&'static str, i32)>>,
    }

    struct Named {
        name: &'static str,
        log: Arc<Recorder>,
    }

    impl InputEventListener for Named {
        fn on_input_event(&self, event: &RawInputEvent) {
            self.log.seen.lock().unwrap().push((self.name, event.value));
        }
    }

    #[test]
    fn dispatches_in_registration_order() {
        let log = Arc::new(Recorder::default());
        let registry = ListenerRegistry::new();
        for name in ["first", "second", "third"] {
            registry.add(Arc::new(Named {
                name,
                log: log.clone(),
            }));
        }

        registry.dispatch(&RawInputEvent::new(1, 1, 9));

        let seen = log.seen.lock().unwrap();
        assert_eq!(*seen, vec![("first", 9), ("second", 9), ("third", 9)]);
    }

    #[test]
    fn remove_unknown_id_is_reported() {
        let registry = ListenerRegistry::new();
        let id = registry.add(Arc::new(Named {
            name: "only",
            log: Arc::new(Recorder::default()),
        }));
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    // Removes itself and registers a newcomer from inside the callback.
    struct SelfRemoving {
        registry: Arc<ListenerRegistry>,
        own_id: Mutex<Option<ListenerId>>,
        newcomer: Arc<Recorder>,
        calls: Mutex<usize>,
    }

    impl InputEventListener for SelfRemoving {
        fn on_input_event(&self, _event: &RawInputEvent) {
            *self.calls.lock().unwrap() += 1;
            if let Some(id) = self.own_id.lock().unwrap().take() {
                self.registry.remove(id);
                self.registry.add(Arc::new(Named {
                    name: "newcomer",
                    log: self.newcomer.clone(),
                }));
            }
        }
    }

    #[test]
    fn mutation_during_dispatch_applies_to_next_event() {
        let registry = Arc::new(ListenerRegistry::new());
        let newcomer = Arc::new(Recorder::default());
        let listener = Arc::new(SelfRemoving {
            registry: registry.clone(),
            own_id: Mutex::new(None),
            newcomer: newcomer.clone(),
            calls: Mutex::new(0),
        });
        let id = registry.add(listener.clone());
        *listener.own_id.lock().unwrap() = Some(id);

        registry.dispatch(&RawInputEvent::new(1, 1, 1));
        assert!(newcomer.seen.lock().unwrap().is_empty());

        registry.dispatch(&RawInputEvent::new(1, 1, 2));
        assert_eq!(*listener.calls.lock().unwrap(), 1);
        assert_eq!(*newcomer.seen.lock().unwrap(), vec![("newcomer", 2)]);
    }
}
