//! Lifecycle of one device bridge.
//!
//! ```text
//! start ──► (reading) ──► activate* ──► check_state* ──► stop
//! ```
//!
//! A bridge owns one reader loop, its router and the router's two publish
//! loops. Several bridges can run in one process, one per device.

use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, info_span};

use crate::config::{refresh_period, ConfigError, DeviceConfig};
use crate::publish::Publisher;
use crate::reader::{
    Created, EvdevReader, InputEventListener, RawInputEvent, ReaderError, ReaderHandle,
    ReaderStatus, StopReason,
};
use crate::router::{EventRouter, RawEventWriter};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Reader error: {0}")]
    Reader(#[from] ReaderError),
}

// Remembers the fatal read error for the host
#[derive(Default)]
struct FailureWatch {
    failure: Mutex<Option<String>>,
}

impl InputEventListener for FailureWatch {
    fn on_input_event(&self, _event: &RawInputEvent) {}

    fn on_error(&self, error: &ReaderError) {
        error!("Error in reader loop: {}", error);
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.to_string());
    }
}

pub struct EvdevBridge {
    label: String,
    reader: ReaderHandle,
    router: Arc<EventRouter>,
    failure: Arc<FailureWatch>,
}

impl EvdevBridge {
    /// Opens the configured device and starts reading and publishing.
    /// Must be called inside a tokio runtime.
    pub fn start(config: &DeviceConfig, publisher: Arc<dyn Publisher>) -> Result<Self, BridgeError> {
        validate_rate(config)?;
        let reader = EvdevReader::open(&config.location)?;
        Self::start_with_reader(config, reader, publisher)
    }

    /// Starts a bridge on an already opened reader, e.g. a replayed capture.
    pub fn start_with_reader(
        config: &DeviceConfig,
        reader: EvdevReader<Created>,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self, BridgeError> {
        validate_rate(config)?;
        let label = config.label();
        let _span = info_span!("bridge", device = %label).entered();
        info!(
            "Starting bridge for {} (rel_to_abs: {}, {:.1} Hz)",
            reader.label(),
            config.rel_to_abs,
            config.refresh_rate_hz
        );

        if config.publish_raw {
            reader.add_listener(Arc::new(RawEventWriter::new(publisher.clone())));
        }

        let router = Arc::new(EventRouter::new(publisher, config.rel_to_abs));
        reader.add_listener(router.clone());

        let failure = Arc::new(FailureWatch::default());
        reader.add_listener(failure.clone());

        router.startup(config.refresh_rate_hz);
        let reader = reader.start();

        info!("Bridge started");
        Ok(Self {
            label,
            reader,
            router,
            failure,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Publishes the full absolute state so newly connected consumers
    /// learn the current position.
    pub fn activate(&self) {
        info!("Activating bridge {}", self.label);
        self.router.sync_abs();
    }

    /// Whether the reader loop is still running.
    pub fn check_state(&self) -> bool {
        self.reader.is_running()
    }

    pub fn status(&self) -> ReaderStatus {
        self.reader.status()
    }

    /// Description of the read error that stopped the bridge, if any.
    pub fn failure(&self) -> Option<String> {
        self.failure
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reader(&self) -> &ReaderHandle {
        &self.reader
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Cancels the reader and both publish loops and releases the device.
    pub async fn stop(self) -> StopReason {
        info!("Stopping bridge {}", self.label);
        self.reader.cancel();
        let reason = self.reader.join().await;
        self.router.shutdown().await;
        info!("Bridge {} stopped ({:?})", self.label, reason);
        reason
    }
}

fn validate_rate(config: &DeviceConfig) -> Result<(), ConfigError> {
    refresh_period(config.refresh_rate_hz).map(|_| ())
}
