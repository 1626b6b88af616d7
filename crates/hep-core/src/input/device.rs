// Hep Input Layer - Devices
// Device identity, capability snapshots and the backend seams

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use super::event::RawEvent;

/// Errors raised by an input device backend
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Event device error: {0}")]
    Backend(String),
}

impl DeviceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Bus and id numbers reported by the kernel (`struct input_id`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DeviceInfo {
    pub bustype: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bus {:04x}, vendor {:04x}, product {:04x}, version {:04x}",
            self.bustype, self.vendor, self.product, self.version
        )
    }
}

/// Everything that identifies a device independent of its open handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Device node (e.g. "/dev/input/event3")
    pub path: PathBuf,
    /// Name reported by the driver
    pub name: String,
    /// Physical topology path, if any
    pub phys: Option<String>,
    /// Unique identifier, if any
    pub uniq: Option<String>,
    pub info: DeviceInfo,
}

impl DeviceIdentity {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, info: DeviceInfo) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            phys: None,
            uniq: None,
            info,
        }
    }

    pub fn with_phys(mut self, phys: impl Into<String>) -> Self {
        self.phys = Some(phys.into());
        self
    }

    pub fn with_uniq(mut self, uniq: impl Into<String>) -> Self {
        self.uniq = Some(uniq.into());
        self
    }

    pub fn path_str(&self) -> String {
        self.path.display().to_string()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "device {}, name \"{}\", phys \"{}\"",
            self.path.display(),
            self.name,
            self.phys.as_deref().unwrap_or("")
        )
    }
}

/// Snapshot of what a device can emit: event type -> set of codes.
///
/// Types without per-code bits (EV_SYN, EV_REP, ...) are present with an
/// empty code set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityMap {
    types: BTreeMap<u16, BTreeSet<u16>>,
}

impl CapabilityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the device supports `event_type`.
    pub fn insert_type(&mut self, event_type: u16) {
        self.types.entry(event_type).or_default();
    }

    /// Record a supported code under `event_type`.
    pub fn insert(&mut self, event_type: u16, code: u16) {
        self.types.entry(event_type).or_default().insert(code);
    }

    pub fn with_codes(mut self, event_type: u16, codes: impl IntoIterator<Item = u16>) -> Self {
        self.insert_type(event_type);
        for code in codes {
            self.insert(event_type, code);
        }
        self
    }

    pub fn contains_type(&self, event_type: u16) -> bool {
        self.types.contains_key(&event_type)
    }

    pub fn contains_code(&self, event_type: u16, code: u16) -> bool {
        self.types
            .get(&event_type)
            .is_some_and(|codes| codes.contains(&code))
    }

    pub fn codes(&self, event_type: u16) -> Option<&BTreeSet<u16>> {
        self.types.get(&event_type)
    }

    pub fn types(&self) -> impl Iterator<Item = u16> + '_ {
        self.types.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// An opened input device that can be polled for readiness.
///
/// The raw fd is what the multiplexer waits on; `fetch_events` must not block
/// once the fd has been reported readable.
pub trait InputDevice: AsRawFd + Send {
    fn identity(&self) -> &DeviceIdentity;

    fn capabilities(&self) -> CapabilityMap;

    /// Take exclusive access so no other reader sees the device's events.
    fn grab(&mut self) -> Result<(), DeviceError>;

    /// Drain every event currently queued, in delivery order.
    fn fetch_events(&mut self) -> Result<Vec<RawEvent>, DeviceError>;
}

/// Source of hardware devices: enumeration and presence checks.
pub trait DeviceSource: Send {
    /// Open every input device currently present.
    fn enumerate(&self) -> Vec<Box<dyn InputDevice>>;

    /// Whether the backing node for `path` still exists.
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
