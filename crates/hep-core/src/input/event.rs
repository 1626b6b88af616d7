// Hep Input Layer - Raw Events
// Typed input events and wire-level value normalization

use std::fmt;

/// EV_SYN event type code from linux/input-event-codes.h
pub const EV_SYN: u16 = 0x00;
/// EV_KEY event type code
pub const EV_KEY: u16 = 0x01;
/// EV_REL event type code
pub const EV_REL: u16 = 0x02;
/// EV_ABS event type code
pub const EV_ABS: u16 = 0x03;
/// EV_MSC event type code
pub const EV_MSC: u16 = 0x04;
/// EV_SW event type code
pub const EV_SW: u16 = 0x05;
/// EV_LED event type code
pub const EV_LED: u16 = 0x11;
/// EV_SND event type code
pub const EV_SND: u16 = 0x12;

/// A single decoded input event as delivered by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawEvent {
    /// Event type (EV_KEY, EV_REL, ...)
    pub event_type: u16,
    /// Event code within the type
    pub code: u16,
    /// Signed event value
    pub value: i32,
}

impl RawEvent {
    pub fn new(event_type: u16, code: u16, value: i32) -> Self {
        Self {
            event_type,
            code,
            value,
        }
    }

    /// The value reinterpreted as its 32-bit two's-complement unsigned form.
    pub fn normalized_value(&self) -> u32 {
        normalize_value(self.value)
    }

    /// Lowercase hex of [`RawEvent::normalized_value`], without prefix.
    pub fn hex_value(&self) -> String {
        format!("{:x}", self.normalized_value())
    }

    /// Synchronization markers carry no user-facing input.
    pub fn is_sync(&self) -> bool {
        self.event_type == EV_SYN
    }
}

impl fmt::Display for RawEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type={}, code={}, value={}",
            self.event_type,
            self.code,
            self.hex_value()
        )
    }
}

/// Map a signed value onto `[0, 2^32)`: negative `v` becomes `v + 2^32`.
pub fn normalize_value(value: i32) -> u32 {
    value as u32
}

/// Normalize a configured integer the same way event values are normalized.
///
/// Accepts `[-2^31, 2^32)`; anything else cannot appear on the wire.
pub fn normalize_configured(value: i64) -> Option<u32> {
    if value < 0 {
        i32::try_from(value).ok().map(normalize_value)
    } else {
        u32::try_from(value).ok()
    }
}
