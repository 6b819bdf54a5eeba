//! Decoding of kernel `struct input_event` records.
//!
//! The layout matches a 64-bit Linux host:
//!
//! ```text
//! offset  size  field
//!  0      16    struct timeval (ignored)
//! 16       2    type   (u16 LE)
//! 18       2    code   (u16 LE)
//! 20       4    value  (i32 LE)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size in bytes of one `struct input_event` on a 64-bit host.
pub const INPUT_EVENT_SIZE: usize = 24;

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;
pub const EV_MSC: u16 = 0x04;
pub const EV_SW: u16 = 0x05;
pub const EV_LED: u16 = 0x11;
pub const EV_SND: u16 = 0x12;
pub const EV_REP: u16 = 0x14;
pub const EV_FF: u16 = 0x15;
pub const EV_PWR: u16 = 0x16;
pub const EV_FF_STATUS: u16 = 0x17;

// Kernel event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Syn,
    Key,
    Relative,
    Absolute,
    Misc,
    Switch,
    Led,
    Sound,
    Repeat,
    ForceFeedback,
    Power,
    ForceFeedbackStatus,
    Unknown(u16),
}

impl EventType {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            EV_SYN => EventType::Syn,
            EV_KEY => EventType::Key,
            EV_REL => EventType::Relative,
            EV_ABS => EventType::Absolute,
            EV_MSC => EventType::Misc,
            EV_SW => EventType::Switch,
            EV_LED => EventType::Led,
            EV_SND => EventType::Sound,
            EV_REP => EventType::Repeat,
            EV_FF => EventType::ForceFeedback,
            EV_PWR => EventType::Power,
            EV_FF_STATUS => EventType::ForceFeedbackStatus,
            other => EventType::Unknown(other),
        }
    }

    pub fn to_raw(self) -> u16 {
        match self {
            EventType::Syn => EV_SYN,
            EventType::Key => EV_KEY,
            EventType::Relative => EV_REL,
            EventType::Absolute => EV_ABS,
            EventType::Misc => EV_MSC,
            EventType::Switch => EV_SW,
            EventType::Led => EV_LED,
            EventType::Sound => EV_SND,
            EventType::Repeat => EV_REP,
            EventType::ForceFeedback => EV_FF,
            EventType::Power => EV_PWR,
            EventType::ForceFeedbackStatus => EV_FF_STATUS,
            EventType::Unknown(raw) => raw,
        }
    }
}

/// One decoded input event. The kernel timestamp is not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInputEvent {
    #[serde(rename = "type")]
    pub ev_type: u16,
    pub code: u16,
    pub value: i32,
}

impl RawInputEvent {
    pub fn new(ev_type: u16, code: u16, value: i32) -> Self {
        Self {
            ev_type,
            code,
            value,
        }
    }

    /// Decode one record. The fixed-size window makes this infallible.
    pub fn decode(buf: &[u8; INPUT_EVENT_SIZE]) -> Self {
        let ev_type = u16::from_le_bytes([buf[16], buf[17]]);
        let code = u16::from_le_bytes([buf[18], buf[19]]);
        let value = i32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]);
        Self::new(ev_type, code, value)
    }

    /// Encode into the kernel layout with a zeroed timestamp.
    ///
    /// Used to build captures for replay through [`EvdevReader::from_source`].
    ///
    /// [`EvdevReader::from_source`]: crate::reader::EvdevReader::from_source
    pub fn encode(&self) -> [u8; INPUT_EVENT_SIZE] {
        let mut buf = [0u8; INPUT_EVENT_SIZE];
        buf[16..18].copy_from_slice(&self.ev_type.to_le_bytes());
        buf[18..20].copy_from_slice(&self.code.to_le_bytes());
        buf[20..24].copy_from_slice(&self.value.to_le_bytes());
        buf
    }

    pub fn event_type(&self) -> EventType {
        EventType::from_raw(self.ev_type)
    }

    /// Copy of this event with its type replaced.
    pub fn with_type(self, event_type: EventType) -> Self {
        Self {
            ev_type: event_type.to_raw(),
            ..self
        }
    }
}

impl fmt::Display for RawInputEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:?} code={} value={}",
            self.event_type(),
            self.code,
            self.value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_little_endian_fields_after_timestamp() {
        let mut buf = [0xAAu8; INPUT_EVENT_SIZE];
        buf[16..24].copy_from_slice(&[0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00]);

        let event = RawInputEvent::decode(&buf);
        assert_eq!(event, RawInputEvent::new(1, 2, 3));
        assert_eq!(event.event_type(), EventType::Key);
    }

    #[test]
    fn decodes_negative_values() {
        let mut buf = [0u8; INPUT_EVENT_SIZE];
        buf[16..18].copy_from_slice(&EV_REL.to_le_bytes());
        buf[18..20].copy_from_slice(&8u16.to_le_bytes());
        buf[20..24].copy_from_slice(&(-120i32).to_le_bytes());

        let event = RawInputEvent::decode(&buf);
        assert_eq!(event.event_type(), EventType::Relative);
        assert_eq!(event.code, 8);
        assert_eq!(event.value, -120);
    }

    #[test]
    fn unknown_types_keep_their_raw_value() {
        let event = RawInputEvent::new(0x1f, 0, 0);
        assert_eq!(event.event_type(), EventType::Unknown(0x1f));
        assert_eq!(event.event_type().to_raw(), 0x1f);
    }

    #[test]
    fn with_type_only_changes_the_type() {
        let event = RawInputEvent::new(EV_REL, 4, -7).with_type(EventType::Absolute);
        assert_eq!(event, RawInputEvent::new(EV_ABS, 4, -7));
    }

    #[test]
    fn serializes_with_type_key() {
        let json = serde_json::to_string(&RawInputEvent::new(1, 30, 1)).unwrap();
        assert_eq!(json, r#"{"type":1,"code":30,"value":1}"#);
    }
}
