// Hep Input Layer - evdev Backend
// Linux /dev/input/event* devices through the evdev crate

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use evdev::Device;

use super::device::{CapabilityMap, DeviceError, DeviceIdentity, DeviceInfo, DeviceSource, InputDevice};
use super::event::{RawEvent, EV_ABS, EV_KEY, EV_LED, EV_MSC, EV_REL, EV_SND, EV_SW};

/// Enumerates real input devices under /dev/input.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvdevSource;

impl EvdevSource {
    pub fn new() -> Self {
        Self
    }

    /// Identity and capabilities of every present device, for listing.
    pub fn list_devices(&self) -> Vec<(DeviceIdentity, CapabilityMap)> {
        evdev::enumerate()
            .map(|(path, device)| {
                let identity = identity_of(&path, &device);
                let caps = capabilities_of(&device);
                (identity, caps)
            })
            .collect()
    }
}

impl DeviceSource for EvdevSource {
    fn enumerate(&self) -> Vec<Box<dyn InputDevice>> {
        let mut devices: Vec<Box<dyn InputDevice>> = Vec::new();
        for (path, device) in evdev::enumerate() {
            match EvdevDevice::from_device(path, device) {
                Ok(device) => devices.push(Box::new(device)),
                Err(e) => log::warn!("Skipping device: {}", e),
            }
        }
        devices
    }
}

/// An opened evdev device in non-blocking mode.
pub struct EvdevDevice {
    device: Device,
    identity: DeviceIdentity,
}

impl EvdevDevice {
    /// Open the device node at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let device = Device::open(path).map_err(|e| DeviceError::io(path, e))?;
        Self::from_device(path.to_path_buf(), device)
    }

    fn from_device(path: PathBuf, device: Device) -> Result<Self, DeviceError> {
        set_nonblocking(&device).map_err(|e| DeviceError::io(&path, e))?;
        let identity = identity_of(&path, &device);
        Ok(Self { device, identity })
    }
}

impl AsRawFd for EvdevDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.device.as_raw_fd()
    }
}

impl InputDevice for EvdevDevice {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn capabilities(&self) -> CapabilityMap {
        capabilities_of(&self.device)
    }

    fn grab(&mut self) -> Result<(), DeviceError> {
        self.device
            .grab()
            .map_err(|e| DeviceError::io(&self.identity.path, e))
    }

    fn fetch_events(&mut self) -> Result<Vec<RawEvent>, DeviceError> {
        match self.device.fetch_events() {
            Ok(events) => Ok(events
                .map(|event| RawEvent::new(event.event_type().0, event.code(), event.value()))
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) => Err(DeviceError::io(&self.identity.path, e)),
        }
    }
}

fn identity_of(path: &Path, device: &Device) -> DeviceIdentity {
    let input_id = device.input_id();
    let info = DeviceInfo {
        bustype: input_id.bus_type().0,
        vendor: input_id.vendor(),
        product: input_id.product(),
        version: input_id.version(),
    };

    let mut identity = DeviceIdentity::new(path, device.name().unwrap_or("Unknown"), info);
    if let Some(phys) = device.physical_path() {
        identity = identity.with_phys(phys);
    }
    if let Some(uniq) = device.unique_name() {
        identity = identity.with_uniq(uniq);
    }
    identity
}

fn capabilities_of(device: &Device) -> CapabilityMap {
    let mut caps = CapabilityMap::new();

    for event_type in device.supported_events().iter() {
        caps.insert_type(event_type.0);
    }

    if let Some(keys) = device.supported_keys() {
        keys.iter().for_each(|key| caps.insert(EV_KEY, key.code()));
    }
    if let Some(axes) = device.supported_relative_axes() {
        axes.iter().for_each(|axis| caps.insert(EV_REL, axis.0));
    }
    if let Some(axes) = device.supported_absolute_axes() {
        axes.iter().for_each(|axis| caps.insert(EV_ABS, axis.0));
    }
    if let Some(switches) = device.supported_switches() {
        switches.iter().for_each(|sw| caps.insert(EV_SW, sw.0));
    }
    if let Some(leds) = device.supported_leds() {
        leds.iter().for_each(|led| caps.insert(EV_LED, led.0));
    }
    if let Some(misc) = device.misc_properties() {
        misc.iter().for_each(|msc| caps.insert(EV_MSC, msc.0));
    }
    if let Some(sounds) = device.supported_sounds() {
        sounds.iter().for_each(|snd| caps.insert(EV_SND, snd.0));
    }

    caps
}

fn set_nonblocking(device: &Device) -> io::Result<()> {
    let raw_fd = device.as_raw_fd();

    // Preserve existing flags; just OR in O_NONBLOCK.
    let current = unsafe { libc::fcntl(raw_fd, libc::F_GETFL) };
    if current < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { libc::fcntl(raw_fd, libc::F_SETFL, current | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
