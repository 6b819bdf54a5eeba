use chrono::Local;
use statum::{machine, state};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use super::device::{open_device, EventSource};
use super::input_event::{RawInputEvent, INPUT_EVENT_SIZE};
use super::listeners::{InputEventListener, ListenerId, ListenerRegistry};

// Reader errors
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("Device {path} is unavailable: {source}")]
    DeviceUnavailable {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read from {label}: {source}")]
    Read {
        label: String,
        #[source]
        source: io::Error,
    },
}

// Why the read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    EndOfStream,
    Failed,
}

// Runtime view of the reader lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderStatus {
    Created,
    Running,
    Stopped(StopReason),
}

// Result of filling one record buffer
#[derive(Debug)]
enum ReadOutcome {
    Cancelled,
    EndOfStream,
    Failed(io::Error),
}

// Define reader states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum ReaderState {
    Created,
    Running,
}

#[machine]
pub struct EvdevReader<S: ReaderState> {
    // Device path or a caller-supplied label, used in logs
    label: String,

    // Byte source; dropping it closes the device
    source: EventSource,

    // Observers called for every decoded record
    listeners: Arc<ListenerRegistry>,

    // Cancels a pending read
    cancel: CancellationToken,

    // Lifecycle status shared with the handle
    status: Arc<watch::Sender<ReaderStatus>>,
}

// Implementation of methods available in all states
impl<S: ReaderState> EvdevReader<S> {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn add_listener(&self, listener: Arc<dyn InputEventListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

// Implementation for Created state
impl EvdevReader<Created> {
    /// Opens the device read-only. Fails if the path is missing or unreadable.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReaderError> {
        let path = path.as_ref();
        info!("Opening input device {}", path.display());

        let source = match open_device(path) {
            Ok(source) => source,
            Err(e) => {
                error!("Failed to open {}: {}", path.display(), e);
                return Err(ReaderError::DeviceUnavailable {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };

        Ok(Self::from_source(path.display().to_string(), source))
    }

    /// Wraps an already opened byte source, e.g. a recorded capture.
    pub fn from_source(label: impl Into<String>, source: EventSource) -> Self {
        let (status, _) = watch::channel(ReaderStatus::Created);
        Self::new(
            label.into(),
            source,
            Arc::new(ListenerRegistry::new()),
            CancellationToken::new(),
            Arc::new(status),
        )
    }

    /// Transitions to Running and spawns the read loop as a tokio task.
    pub fn start(self) -> ReaderHandle {
        let label = self.label.clone();
        info!("Starting reader loop for {}", label);

        let listeners = self.listeners.clone();
        let cancel = self.cancel.clone();
        let status = self.status.subscribe();
        self.status.send_replace(ReaderStatus::Running);

        let running: EvdevReader<Running> = self.transition();
        let span = info_span!("reader", device = %label);
        let task = tokio::spawn(running.run().instrument(span));

        ReaderHandle {
            label,
            listeners,
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            status,
            task,
        }
    }
}

// Implementation for Running state
impl EvdevReader<Running> {
    async fn run(mut self) -> StopReason {
        let reason = self.read_loop().await;

        let status = self.status.clone();
        // Closes the device handle
        drop(self);

        status.send_replace(ReaderStatus::Stopped(reason));
        info!("Reader loop stopped: {:?}", reason);
        reason
    }

    async fn read_loop(&mut self) -> StopReason {
        let mut buf = [0u8; INPUT_EVENT_SIZE];

        // Stats for performance monitoring
        let mut event_count: u64 = 0;
        let mut last_stats_time = Local::now();
        let stats_interval = chrono::Duration::seconds(30);

        loop {
            match self.read_record(&mut buf).await {
                Ok(()) => {
                    let event = RawInputEvent::decode(&buf);
                    trace!("Read event: {}", event);
                    self.listeners.dispatch(&event);
                    event_count += 1;
                }
                Err(ReadOutcome::Cancelled) => {
                    debug!("Read cancelled");
                    return StopReason::Cancelled;
                }
                Err(ReadOutcome::EndOfStream) => {
                    info!("End of stream on {}", self.label);
                    return StopReason::EndOfStream;
                }
                Err(ReadOutcome::Failed(e)) => {
                    self.cancel.cancel();
                    let error = ReaderError::Read {
                        label: self.label.clone(),
                        source: e,
                    };
                    error!("Reader loop terminated: {}", error);
                    self.listeners.dispatch_error(&error);
                    return StopReason::Failed;
                }
            }

            let now = Local::now();
            if now - last_stats_time > stats_interval {
                let elapsed_seconds = (now - last_stats_time).num_seconds().max(1);
                info!(
                    "Reader stats: {} events in {} seconds (avg {:.2}/sec)",
                    event_count,
                    elapsed_seconds,
                    event_count as f64 / elapsed_seconds as f64
                );
                event_count = 0;
                last_stats_time = now;
            }
        }
    }

    // Fill the buffer with exactly one record; reads may return partial data
    async fn read_record(&mut self, buf: &mut [u8; INPUT_EVENT_SIZE]) -> Result<(), ReadOutcome> {
        let mut filled = 0;
        while filled < INPUT_EVENT_SIZE {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ReadOutcome::Cancelled),
                read = self.source.read(&mut buf[filled..]) => read,
            };

            match read {
                Ok(0) => {
                    if filled > 0 {
                        warn!("Discarding {} bytes of a truncated record", filled);
                    }
                    return Err(ReadOutcome::EndOfStream);
                }
                Ok(len) => filled += len,
                // Errors caused by our own shutdown are not failures
                Err(_) if self.cancel.is_cancelled() => return Err(ReadOutcome::Cancelled),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ReadOutcome::Failed(e)),
            }
        }
        Ok(())
    }
}

/// Handle to a running reader loop.
///
/// Dropping the handle cancels the loop, which then closes the device.
pub struct ReaderHandle {
    label: String,
    listeners: Arc<ListenerRegistry>,
    cancel: CancellationToken,
    _cancel_on_drop: DropGuard,
    status: watch::Receiver<ReaderStatus>,
    task: JoinHandle<StopReason>,
}

impl ReaderHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn add_listener(&self, listener: Arc<dyn InputEventListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn status(&self) -> ReaderStatus {
        *self.status.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.status() == ReaderStatus::Running
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ReaderStatus> {
        self.status.clone()
    }

    /// Requests shutdown; a pending read is abandoned immediately.
    pub fn cancel(&self) {
        debug!("Cancelling reader loop for {}", self.label);
        self.cancel.cancel();
    }

    /// Waits for the read loop to end.
    pub async fn join(self) -> StopReason {
        match self.task.await {
            Ok(reason) => reason,
            Err(e) => {
                error!("Reader task for {} failed: {}", self.label, e);
                StopReason::Failed
            }
        }
    }
}
