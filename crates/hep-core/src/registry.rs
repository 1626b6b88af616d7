// Hep Device Registry
// Tracks which devices are open and watched, and keeps them in sync with hardware

use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::config::RuleSet;
use crate::event::Waker;
use crate::input::{CapabilityMap, DeviceError, DeviceIdentity, DeviceSource, InputDevice, RawEvent};

/// Registry shared between the run loop and the resync timer
pub type SharedRegistry = Arc<Mutex<DeviceRegistry>>;

/// A watched device together with the capability snapshot taken when it was added.
struct WatchedDevice {
    device: Box<dyn InputDevice>,
    capabilities: CapabilityMap,
}

impl WatchedDevice {
    fn identity(&self) -> &DeviceIdentity {
        self.device.identity()
    }
}

/// Membership changes made by one resync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncReport {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl ResyncReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Read-only lookup of cached devices by capability.
pub trait DeviceLookup {
    /// First cached device, in insertion order, that supports event type
    /// `cap` and, when given, code `subcap` within it.
    fn find_by_capability(&self, cap: u16, subcap: Option<u16>) -> Option<&DeviceIdentity>;
}

/// Single source of truth for the devices currently being watched.
///
/// Devices are keyed by their node path; iteration order is insertion order,
/// which is also the order used for cross-device placeholder lookups.
pub struct DeviceRegistry {
    source: Box<dyn DeviceSource>,
    rules: Arc<RuleSet>,
    devices: IndexMap<PathBuf, WatchedDevice>,
    waker: Option<Waker>,
}

impl DeviceRegistry {
    pub fn new(source: Box<dyn DeviceSource>, rules: Arc<RuleSet>) -> Self {
        Self {
            source,
            rules,
            devices: IndexMap::new(),
            waker: None,
        }
    }

    /// Wrap in the mutex shared by the run loop and the resync timer.
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Wake a blocked readiness wait whenever membership changes.
    pub fn set_waker(&mut self, waker: Waker) {
        self.waker = Some(waker);
    }

    /// Reconcile watched devices against present hardware and the rule set.
    ///
    /// Calling this again without hardware changes leaves membership untouched.
    pub fn resync(&mut self) -> ResyncReport {
        log::debug!("Getting devices...");
        let mut report = ResyncReport::default();

        let vanished: Vec<PathBuf> = self
            .devices
            .keys()
            .filter(|path| !self.source.exists(path))
            .cloned()
            .collect();
        for path in vanished {
            if self.unregister(&path) {
                report.removed.push(path);
            }
        }

        for mut device in self.source.enumerate() {
            let identity = device.identity().clone();

            if !self.rules.matches_device(&identity) {
                continue;
            }
            if self.devices.contains_key(&identity.path) {
                log::debug!("Device {} already registered", identity.path.display());
                continue;
            }

            if self.rules.wants_grab(&identity) {
                if let Err(e) = device.grab() {
                    log::warn!("Could not grab {}: {}", identity.path.display(), e);
                }
            }

            log::info!(
                "Adding {} ({}): vendor=0x{:04x}, product=0x{:04x}, version=0x{:04x}",
                identity.path.display(),
                identity.name,
                identity.info.vendor,
                identity.info.product,
                identity.info.version
            );

            let capabilities = device.capabilities();
            self.devices.insert(
                identity.path.clone(),
                WatchedDevice {
                    device,
                    capabilities,
                },
            );
            report.added.push(identity.path);
        }

        if !report.is_empty() {
            self.wake();
        }
        report
    }

    /// Drop a device from the watched set; returns whether it was present.
    pub fn remove(&mut self, path: &Path) -> bool {
        let removed = self.unregister(path);
        if removed {
            self.wake();
        }
        removed
    }

    fn unregister(&mut self, path: &Path) -> bool {
        // shift_remove keeps the remaining devices in insertion order
        match self.devices.shift_remove(path) {
            Some(_) => {
                log::info!("Unregistering {}", path.display());
                true
            }
            None => false,
        }
    }

    fn wake(&self) {
        if let Some(waker) = &self.waker {
            waker.wake();
        }
    }

    /// Read every queued event from the device at `path`.
    ///
    /// Returns `None` when the device is no longer watched.
    pub fn fetch_events(&mut self, path: &Path) -> Option<Result<Vec<RawEvent>, DeviceError>> {
        self.devices
            .get_mut(path)
            .map(|watched| watched.device.fetch_events())
    }

    /// `(path, fd)` for every watched device, in insertion order.
    pub fn poll_targets(&self) -> Vec<(PathBuf, RawFd)> {
        self.devices
            .iter()
            .map(|(path, watched)| (path.clone(), watched.device.as_raw_fd()))
            .collect()
    }

    pub fn identity(&self, path: &Path) -> Option<&DeviceIdentity> {
        self.devices.get(path).map(WatchedDevice::identity)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.devices.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl DeviceLookup for DeviceRegistry {
    fn find_by_capability(&self, cap: u16, subcap: Option<u16>) -> Option<&DeviceIdentity> {
        self.devices
            .values()
            .find(|watched| match subcap {
                Some(code) => watched.capabilities.contains_code(cap, code),
                None => watched.capabilities.contains_type(cap),
            })
            .map(WatchedDevice::identity)
    }
}
