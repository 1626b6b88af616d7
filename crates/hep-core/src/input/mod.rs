// Hep Input Layer
// Raw events, device identity and the device backends

mod device;
pub mod event;
#[cfg(feature = "evdev-backend")]
mod evdev_backend;

pub use device::{CapabilityMap, DeviceError, DeviceIdentity, DeviceInfo, DeviceSource, InputDevice};
pub use event::{normalize_configured, normalize_value, RawEvent};
#[cfg(feature = "evdev-backend")]
pub use evdev_backend::{EvdevDevice, EvdevSource};
