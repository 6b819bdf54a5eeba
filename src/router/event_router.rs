use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::axis_state::{AbsState, AxisState, RelState};
use super::fixed_rate::spawn_fixed_rate;
use super::handlers::{CodeFilter, EventHandler, EventHandlers};
use crate::publish::{Channel, Message, Publisher};
use crate::reader::input_event::{EV_ABS, EV_KEY, EV_REL};
use crate::reader::{EventType, InputEventListener, RawInputEvent, ReaderError};

fn publish_or_warn(publisher: &dyn Publisher, channel: Channel, message: &Message) {
    if let Err(e) = publisher.publish(channel, message) {
        warn!("Failed to publish on {}: {}", channel, e);
    }
}

// One flush tick: publish and clear if anything changed
fn flush_axis(state: &dyn AxisState, publisher: &dyn Publisher, channel: Channel) {
    if let Some(values) = state.take_dirty() {
        trace!("Flushing {} axes on {}", values.len(), channel);
        publish_or_warn(publisher, channel, &Message::Axes(values));
    }
}

/// Aggregates and publishes categorized input events.
///
/// Key events are published on `key` as they arrive. Absolute and relative
/// axis events are folded into their [`AxisState`] and flushed on `abs` and
/// `rel` by two fixed-rate loops started with [`EventRouter::startup`].
/// The loops stop at [`EventRouter::shutdown`] or when the router is dropped.
pub struct EventRouter {
    publisher: Arc<dyn Publisher>,
    rel_to_abs: bool,
    handlers: EventHandlers,
    abs_state: Arc<AbsState>,
    rel_state: Arc<RelState>,
    // Held from snapshot to publish so abs messages leave in snapshot order
    abs_gate: Arc<Mutex<()>>,
    cancel: CancellationToken,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl EventRouter {
    pub fn new(publisher: Arc<dyn Publisher>, rel_to_abs: bool) -> Self {
        let abs_state = Arc::new(AbsState::new());
        let rel_state = Arc::new(RelState::new());
        let mut handlers = EventHandlers::new();

        let key_writer = publisher.clone();
        handlers.register_handler(
            EV_KEY,
            CodeFilter::All,
            Box::new(move |event| {
                publish_or_warn(&*key_writer, Channel::Key, &Message::Event(*event));
            }),
        );

        let abs = abs_state.clone();
        handlers.register_handler(
            EV_ABS,
            CodeFilter::All,
            Box::new(move |event| abs.update(event.code, event.value)),
        );

        let rel = rel_state.clone();
        handlers.register_handler(
            EV_REL,
            CodeFilter::All,
            Box::new(move |event| rel.update(event.code, event.value)),
        );

        Self {
            publisher,
            rel_to_abs,
            handlers,
            abs_state,
            rel_state,
            abs_gate: Arc::new(Mutex::new(())),
            cancel: CancellationToken::new(),
            loops: Mutex::new(Vec::new()),
        }
    }

    /// Adds or replaces a handler. A specific code overrides the built-in
    /// handler of its type for that code only.
    pub fn register_handler(&mut self, ev_type: u16, codes: CodeFilter, handler: EventHandler) {
        self.handlers.register_handler(ev_type, codes, handler);
    }

    pub fn abs_state(&self) -> &AbsState {
        &self.abs_state
    }

    pub fn rel_state(&self) -> &RelState {
        &self.rel_state
    }

    pub fn flush_abs(&self) {
        let _gate = self.abs_gate.lock().unwrap_or_else(PoisonError::into_inner);
        flush_axis(&*self.abs_state, &*self.publisher, Channel::Abs);
    }

    pub fn flush_rel(&self) {
        flush_axis(&*self.rel_state, &*self.publisher, Channel::Rel);
    }

    /// Publishes the complete absolute state whether or not it changed.
    pub fn sync_abs(&self) {
        let _gate = self.abs_gate.lock().unwrap_or_else(PoisonError::into_inner);
        let values = self.abs_state.sync();
        debug!("Syncing {} absolute axes", values.len());
        publish_or_warn(&*self.publisher, Channel::Abs, &Message::Axes(values));
    }

    /// Spawns the abs and rel publish loops.
    pub fn startup(&self, rate_hz: f64) {
        let mut loops = self.loops.lock().unwrap_or_else(PoisonError::into_inner);
        if !loops.is_empty() {
            warn!("Publish loops already running");
            return;
        }

        let abs = self.abs_state.clone();
        let abs_writer = self.publisher.clone();
        let abs_gate = self.abs_gate.clone();
        loops.push(spawn_fixed_rate(
            "abs publish",
            rate_hz,
            self.cancel.child_token(),
            move || {
                let _gate = abs_gate.lock().unwrap_or_else(PoisonError::into_inner);
                flush_axis(&*abs, &*abs_writer, Channel::Abs)
            },
        ));

        let rel = self.rel_state.clone();
        let rel_writer = self.publisher.clone();
        loops.push(spawn_fixed_rate(
            "rel publish",
            rate_hz,
            self.cancel.child_token(),
            move || flush_axis(&*rel, &*rel_writer, Channel::Rel),
        ));
    }

    /// Cancels both publish loops and waits for them. Pending state is
    /// not flushed.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let loops = std::mem::take(&mut *self.loops.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in loops {
            if let Err(e) = handle.await {
                error!("Publish loop failed: {}", e);
            }
        }
        info!("Event router shut down");
    }
}

impl Drop for EventRouter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl InputEventListener for EventRouter {
    fn on_input_event(&self, event: &RawInputEvent) {
        let event = if self.rel_to_abs && event.event_type() == EventType::Relative {
            event.with_type(EventType::Absolute)
        } else {
            *event
        };

        if !self.handlers.handle_event(&event) {
            trace!("No handler for {}", event);
        }
    }

    fn on_error(&self, error: &ReaderError) {
        error!("Event router lost its reader: {}", error);
    }
}

/// Publishes every decoded record verbatim on `raw`.
pub struct RawEventWriter {
    publisher: Arc<dyn Publisher>,
}

impl RawEventWriter {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }
}

impl InputEventListener for RawEventWriter {
    fn on_input_event(&self, event: &RawInputEvent) {
        publish_or_warn(&*self.publisher, Channel::Raw, &Message::Event(*event));
    }
}
