//! Bridge from a Linux evdev device to a structured message stream.
//!
//! ```text
//! device bytes ──► reader ──► router ──┬─► "key" (immediately)
//!                    │                 └─► AxisState ──► "abs" / "rel" (fixed rate)
//!                    └──────────────────────────────────► "raw"
//! ```
//!
//! [`EvdevBridge`] wires one device to one [`Publisher`].

pub mod bridge;
pub mod config;
pub mod publish;
pub mod reader;
pub mod router;

pub use bridge::{BridgeError, EvdevBridge};
pub use config::{BridgeConfig, DeviceConfig, MqttConfig};
pub use publish::{Channel, Message, Publisher};
