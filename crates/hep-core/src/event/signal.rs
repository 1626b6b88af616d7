// Hep Signal Handling
// Reacts to termination signals from a thread of its own

use std::os::raw::c_int;
use std::thread::JoinHandle;

use signal_hook::iterator::Signals;

use super::r#loop::{EventLoopError, EventLoopResult, ShutdownHandle};

/// Watch `signals` on a dedicated thread.
///
/// The first delivery runs `on_signal` and then requests shutdown. The
/// callback runs on the signal thread, so it is not delayed by a foreground
/// command blocking the run loop; the CLI uses it to exit the process.
pub fn spawn_signal_handler<F>(
    signals: &[c_int],
    shutdown: ShutdownHandle,
    on_signal: F,
) -> EventLoopResult<JoinHandle<()>>
where
    F: FnOnce(c_int) + Send + 'static,
{
    let mut signals = Signals::new(signals).map_err(EventLoopError::Signal)?;

    std::thread::Builder::new()
        .name("hep-signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                log::info!("Received signal {}, shutting down", signal);
                on_signal(signal);
                shutdown.shutdown();
            }
        })
        .map_err(EventLoopError::Signal)
}
