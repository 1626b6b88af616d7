// Shared fixtures: in-memory input devices backed by real sockets so poll() works

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use hep_core::{
    CapabilityMap, DeviceError, DeviceIdentity, DeviceInfo, DeviceSource, InputDevice, RawEvent,
};

/// One simulated piece of hardware.
pub struct FakeHardware {
    pub identity: DeviceIdentity,
    pub capabilities: CapabilityMap,
    queue: Mutex<VecDeque<RawEvent>>,
    tx: UnixStream,
    rx: UnixStream,
    failing: AtomicBool,
    grabs: AtomicUsize,
}

impl FakeHardware {
    pub fn new(path: &str, vendor: u16, product: u16, capabilities: CapabilityMap) -> Arc<Self> {
        let (rx, tx) = UnixStream::pair().expect("socket pair");
        rx.set_nonblocking(true).expect("nonblocking");
        let identity = DeviceIdentity::new(
            path,
            format!("Fake {:04x}:{:04x}", vendor, product),
            DeviceInfo {
                bustype: 3,
                vendor,
                product,
                version: 1,
            },
        );
        Arc::new(Self {
            identity,
            capabilities,
            queue: Mutex::new(VecDeque::new()),
            tx,
            rx,
            failing: AtomicBool::new(false),
            grabs: AtomicUsize::new(0),
        })
    }

    /// Queue events and make the device readable.
    pub fn emit(&self, events: &[RawEvent]) {
        self.queue.lock().extend(events.iter().copied());
        (&self.tx).write_all(&[1]).expect("signal readiness");
    }

    /// Make the next read fail and wake any poller.
    pub fn fail_reads(&self) {
        self.failing.store(true, Ordering::SeqCst);
        (&self.tx).write_all(&[1]).expect("signal readiness");
    }

    pub fn grab_count(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }
}

/// An opened handle on [`FakeHardware`].
pub struct FakeDevice {
    hardware: Arc<FakeHardware>,
    rx: UnixStream,
}

impl AsRawFd for FakeDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.rx.as_raw_fd()
    }
}

impl InputDevice for FakeDevice {
    fn identity(&self) -> &DeviceIdentity {
        &self.hardware.identity
    }

    fn capabilities(&self) -> CapabilityMap {
        self.hardware.capabilities.clone()
    }

    fn grab(&mut self) -> Result<(), DeviceError> {
        self.hardware.grabs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn fetch_events(&mut self) -> Result<Vec<RawEvent>, DeviceError> {
        let mut buf = [0u8; 64];
        loop {
            match self.rx.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(DeviceError::io(&self.hardware.identity.path, e)),
            }
        }

        if self.hardware.failing.load(Ordering::SeqCst) {
            return Err(DeviceError::io(
                &self.hardware.identity.path,
                io::Error::new(io::ErrorKind::Other, "No such device"),
            ));
        }
        Ok(self.hardware.queue.lock().drain(..).collect())
    }
}

/// A plug board of fake hardware shared between the test and the registry.
#[derive(Clone, Default)]
pub struct FakeSource {
    present: Arc<Mutex<Vec<Arc<FakeHardware>>>>,
    enumerations: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plug(&self, hardware: &Arc<FakeHardware>) {
        self.present.lock().push(Arc::clone(hardware));
    }

    pub fn unplug(&self, path: &str) {
        self.present
            .lock()
            .retain(|hw| hw.identity.path != Path::new(path));
    }

    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    pub fn boxed(&self) -> Box<dyn DeviceSource> {
        Box::new(self.clone())
    }
}

impl DeviceSource for FakeSource {
    fn enumerate(&self) -> Vec<Box<dyn InputDevice>> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        self.present
            .lock()
            .iter()
            .map(|hw| {
                Box::new(FakeDevice {
                    hardware: Arc::clone(hw),
                    rx: hw.rx.try_clone().expect("clone socket"),
                }) as Box<dyn InputDevice>
            })
            .collect()
    }

    fn exists(&self, path: &Path) -> bool {
        self.present.lock().iter().any(|hw| hw.identity.path == path)
    }
}

pub fn keyboard_caps() -> CapabilityMap {
    CapabilityMap::new()
        .with_codes(0, [])
        .with_codes(1, [1, 2, 30, 31, 57])
        .with_codes(4, [4])
}

pub fn mouse_caps() -> CapabilityMap {
    CapabilityMap::new()
        .with_codes(0, [])
        .with_codes(1, [272, 273, 274])
        .with_codes(2, [0, 1, 8])
}

pub fn paths(list: &[&str]) -> Vec<PathBuf> {
    list.iter().map(PathBuf::from).collect()
}
