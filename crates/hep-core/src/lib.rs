// Hep Core Library
// Rule matching and device lifecycle for running commands on input events

pub mod config;
pub mod dispatch;
pub mod event;
pub mod input;
pub mod matching;
pub mod placeholder;
pub mod registry;

pub use config::{ConfigError, DeviceFilter, KeyRule, Pattern, RuleBlock, RuleSet};
pub use dispatch::{DispatchError, DispatchOutcome, Dispatcher, Launch};
pub use event::{spawn_signal_handler, EventLoopError, EventLoopResult, Processor, ShutdownHandle};
pub use input::{
    CapabilityMap, DeviceError, DeviceIdentity, DeviceInfo, DeviceSource, InputDevice, RawEvent,
};
pub use matching::{Firing, MatchEngine};
pub use placeholder::{resolve_command, PlaceholderError};
pub use registry::{DeviceLookup, DeviceRegistry, ResyncReport, SharedRegistry};

#[cfg(feature = "evdev-backend")]
pub use input::{EvdevDevice, EvdevSource};
