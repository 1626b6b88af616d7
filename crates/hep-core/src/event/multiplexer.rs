// Hep Multiplexer
// Blocking readiness wait across every watched device

use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::input::RawEvent;
use crate::registry::SharedRegistry;

use super::r#loop::{EventLoopError, EventLoopResult};

/// Events read from one ready device, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvents {
    pub path: PathBuf,
    pub events: Vec<RawEvent>,
}

/// Interrupts a blocked [`Multiplexer::wait`] from another thread.
#[derive(Debug, Clone)]
pub struct Waker {
    tx: Arc<UnixStream>,
}

impl Waker {
    pub fn wake(&self) {
        // A full socket buffer already guarantees a pending wakeup
        if let Err(e) = (&*self.tx).write(&[1]) {
            if e.kind() != io::ErrorKind::WouldBlock {
                log::warn!("Failed to wake event loop: {}", e);
            }
        }
    }
}

/// Waits on the fds of every registered device plus a wake channel.
///
/// The registry lock is never held while blocked in `poll`: targets are
/// snapshotted first and re-checked under the lock before reading, so a
/// device removed in between is simply skipped.
pub struct Multiplexer {
    registry: SharedRegistry,
    wake_rx: UnixStream,
    waker: Waker,
}

impl Multiplexer {
    /// Create a multiplexer and install its waker in the registry.
    pub fn new(registry: SharedRegistry) -> EventLoopResult<Self> {
        let (rx, tx) = UnixStream::pair()?;
        rx.set_nonblocking(true)?;
        tx.set_nonblocking(true)?;

        let waker = Waker { tx: Arc::new(tx) };
        registry.lock().set_waker(waker.clone());

        Ok(Self {
            registry,
            wake_rx: rx,
            waker,
        })
    }

    pub fn waker(&self) -> Waker {
        self.waker.clone()
    }

    /// Block until a device is ready (or `timeout` elapses, or a wake arrives).
    ///
    /// Returns every event available on every ready device. An empty result
    /// means a timeout, a wakeup, or an interrupted system call. Read errors
    /// on a device are handled here: the device is dropped and the registry
    /// is resynced.
    pub fn wait(&mut self, timeout: Option<Duration>) -> EventLoopResult<Vec<DeviceEvents>> {
        let targets = self.registry.lock().poll_targets();

        let mut poll_fds = Vec::with_capacity(targets.len() + 1);
        poll_fds.push(libc::pollfd {
            fd: self.wake_rx.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        });
        poll_fds.extend(targets.iter().map(|(_, fd)| libc::pollfd {
            fd: *fd,
            events: libc::POLLIN,
            revents: 0,
        }));

        let timeout_ms = timeout
            .map(|t| i32::try_from(t.as_millis()).unwrap_or(i32::MAX))
            .unwrap_or(-1);

        let poll_result = unsafe {
            libc::poll(
                poll_fds.as_mut_ptr(),
                poll_fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        let mut ready = Vec::new();

        if poll_result < 0 {
            let err = io::Error::last_os_error();
            // A delivered signal is not fatal; the caller re-checks its shutdown flag.
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(ready);
            }
            return Err(EventLoopError::Io(err));
        }

        if poll_result == 0 {
            return Ok(ready);
        }

        if poll_fds[0].revents != 0 {
            self.drain_wakeups();
        }

        let ready_mask = libc::POLLIN | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;
        for ((path, _), pfd) in targets.into_iter().zip(&poll_fds[1..]) {
            if pfd.revents & ready_mask == 0 {
                continue;
            }

            let mut registry = self.registry.lock();
            match registry.fetch_events(&path) {
                None => continue,
                Some(Ok(events)) => {
                    if !events.is_empty() {
                        ready.push(DeviceEvents { path, events });
                    }
                }
                Some(Err(e)) => {
                    log::debug!("error reading device {}: {}", path.display(), e);
                    registry.remove(&path);
                    registry.resync();
                }
            }
        }

        Ok(ready)
    }

    fn drain_wakeups(&mut self) {
        let mut buf = [0u8; 64];
        loop {
            match self.wake_rx.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("Failed to drain wake channel: {}", e);
                    break;
                }
            }
        }
    }
}
