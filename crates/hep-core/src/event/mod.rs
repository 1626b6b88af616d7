// Hep Event Handling
// Readiness multiplexing, the dispatch loop and signal handling

pub mod multiplexer;
pub mod r#loop;
pub mod signal;

pub use multiplexer::{DeviceEvents, Multiplexer, Waker};
pub use r#loop::{
    EventLoopError, EventLoopResult, Processor, ResyncTimer, ShutdownHandle,
    DEFAULT_RESYNC_INTERVAL,
};
pub use signal::spawn_signal_handler;
