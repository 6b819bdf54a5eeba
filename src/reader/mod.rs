//! Device reader subsystem
//!
//! Turns the byte stream of an evdev character device into decoded events:
//!
//! 1. [`device`] - Opens the device node as an async byte source
//! 2. [`input_event`] - Decodes fixed-size `struct input_event` records
//! 3. [`reader_loop`] - Cancellable read loop and its lifecycle handle
//! 4. [`listeners`] - Copy-on-write registry the loop dispatches to
//!
//! # Architecture
//!
//! ```text
//! /dev/input/eventN ──► EvdevReader ──► ListenerRegistry ──► listeners
//!                       (24-byte records)  (in registration order)
//! ```
//!
//! Dispatch is synchronous on the reader task. Listeners that need to do
//! slow work must hand it off themselves.

pub mod device;
pub mod input_event;
pub mod listeners;
pub mod reader_loop;

pub use device::EventSource;
pub use input_event::{EventType, RawInputEvent, INPUT_EVENT_SIZE};
pub use listeners::{InputEventListener, ListenerId, ListenerRegistry};
pub use reader_loop::{
    Created, EvdevReader, ReaderError, ReaderHandle, ReaderStatus, Running, StopReason,
};
