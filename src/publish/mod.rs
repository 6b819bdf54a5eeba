//! # Outbound publishing
//!
//! Everything the bridge emits goes through one primitive:
//! `publish(channel, message)`. The router never knows which transport sits
//! behind it.
//!
//! ## Channels
//!
//! | channel | cadence        | payload                                  |
//! |---------|----------------|------------------------------------------|
//! | `raw`   | every record   | `{"type": t, "code": c, "value": v}`     |
//! | `key`   | every key edge | `{"type": t, "code": c, "value": v}`     |
//! | `abs`   | fixed rate     | `{code: value}` for non-zero axes        |
//! | `rel`   | fixed rate     | `{code: delta}` accumulated since flush  |
//!
//! ## Backends
//!
//! - [`ChannelPublisher`] forwards into a tokio mpsc channel
//! - [`log_publisher::LogPublisher`] prints JSON lines to stdout
//! - [`mqtt_publisher::MqttPublisher`] publishes to `<prefix>/<channel>`

pub mod log_publisher;
pub mod mqtt_publisher;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::reader::RawInputEvent;

/// Axis code to value (absolute) or accumulated delta (relative).
pub type AxisValues = BTreeMap<u16, i32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Raw,
    Key,
    Abs,
    Rel,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Raw => "raw",
            Channel::Key => "key",
            Channel::Abs => "abs",
            Channel::Rel => "rel",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Message {
    Event(RawInputEvent),
    Axes(AxisValues),
}

impl Message {
    pub fn to_json(&self) -> Result<String, PublishError> {
        serde_json::to_string(self).map_err(|e| PublishError::Serialization(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("publisher queue is full")]
    QueueFull,

    #[error("publisher closed")]
    Closed,

    #[error("MQTT client error: {0}")]
    Mqtt(String),
}

/// Trait for outbound publishers.
///
/// Called from the reader task (raw, key) and the flush tasks (abs, rel),
/// so implementations must not block.
pub trait Publisher: Send + Sync {
    fn publish(&self, channel: Channel, message: &Message) -> Result<(), PublishError>;
}

/// Publisher that forwards every message into a bounded mpsc channel.
#[derive(Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<(Channel, Message)>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<(Channel, Message)>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, channel: Channel, message: &Message) -> Result<(), PublishError> {
        match self.sender.try_send((channel, message.clone())) {
            Ok(_) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PublishError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(PublishError::Closed),
        }
    }
}
