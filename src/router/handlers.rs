use std::collections::HashMap;

use crate::reader::RawInputEvent;

pub type EventHandler = Box<dyn Fn(&RawInputEvent) + Send + Sync>;

/// Which codes of an event type a handler is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeFilter {
    All,
    Code(u16),
}

/// Handler table keyed by (event type, code).
///
/// A handler for a specific code wins over the `All` handler of the same type.
#[derive(Default)]
pub struct EventHandlers {
    handlers: HashMap<(u16, CodeFilter), EventHandler>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one for the same key.
    pub fn register_handler(&mut self, ev_type: u16, codes: CodeFilter, handler: EventHandler) {
        self.handlers.insert((ev_type, codes), handler);
    }

    /// Returns false when no handler matched.
    pub fn handle_event(&self, event: &RawInputEvent) -> bool {
        let handler = self
            .handlers
            .get(&(event.ev_type, CodeFilter::Code(event.code)))
            .or_else(|| self.handlers.get(&(event.ev_type, CodeFilter::All)));

        match handler {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::input_event::{EV_ABS, EV_KEY, EV_REL};
    use std::sync::{Arc, Mutex};

    fn recording(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> EventHandler {
        let log = log.clone();
        Box::new(move |_| log.lock().unwrap().push(name))
    }

    #[test]
    fn specific_code_wins_over_wildcard() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut handlers = EventHandlers::new();
        handlers.register_handler(EV_ABS, CodeFilter::All, recording(&log, "any-abs"));
        handlers.register_handler(EV_ABS, CodeFilter::Code(5), recording(&log, "abs-5"));

        assert!(handlers.handle_event(&RawInputEvent::new(EV_ABS, 5, 1)));
        assert!(handlers.handle_event(&RawInputEvent::new(EV_ABS, 0, 1)));
        assert_eq!(*log.lock().unwrap(), vec!["abs-5", "any-abs"]);
    }

    #[test]
    fn unmatched_events_are_reported() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut handlers = EventHandlers::new();
        handlers.register_handler(EV_KEY, CodeFilter::Code(272), recording(&log, "btn-left"));

        assert!(!handlers.handle_event(&RawInputEvent::new(EV_KEY, 273, 1)));
        assert!(!handlers.handle_event(&RawInputEvent::new(EV_REL, 0, 1)));
        assert!(log.lock().unwrap().is_empty());
    }
}
