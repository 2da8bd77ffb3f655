//! Device instance identifier parsing
//!
//! Operating systems tag every device node with a bus-specific instance
//! identifier. Two grammars carry USB identity:
//!
//! - the generic USB bus: `USB\VID_2341&PID_8036\AB12`
//! - the FTDI bridge bus: `FTDIBUS\VID_0403+PID_6001+A70362A3\0000`
//!
//! Anything else is not recognized. Recognition never fails loudly: an
//! identifier that does not parse simply yields `None`.

use std::sync::LazyLock;

use portwalk_core::UsbIdentity;
use regex::Regex;

const USB_PREFIX: &str = "USB";
const FTDI_PREFIX: &str = "FTDIBUS";

// The serial group is anchored at the end; composite functions such as
// `USB\VID_2341&PID_8036&MI_00\6&3A75&0&0000` carry no serial of their own.
static USB_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"VID_([0-9A-Fa-f]{4})&PID_([0-9A-Fa-f]{4})(?:\\(\w+)$)?")
        .expect("USB instance id pattern is valid")
});

// The serial must run up to the port suffix or the end, so `+AB-1234` is
// no serial rather than `AB`.
static FTDI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"VID_([0-9A-Fa-f]{4})\+PID_([0-9A-Fa-f]{4})(?:\+(\w+)(?:\\|$))?")
        .expect("FTDIBUS instance id pattern is valid")
});

/// Which grammar recognized the identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bus {
    /// Generic USB bus driver
    Usb,
    /// FTDI virtual COM port bus driver
    Ftdi,
}

/// USB identity recovered from an instance identifier
///
/// VID and PID are kept exactly as the identifier spells them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId {
    pub bus: Bus,
    pub vid: String,
    pub pid: String,
    pub serial_number: Option<String>,
}

impl DeviceId {
    /// Same VID and PID, ignoring case
    pub fn same_device(&self, other: &DeviceId) -> bool {
        self.vid.eq_ignore_ascii_case(&other.vid) && self.pid.eq_ignore_ascii_case(&other.pid)
    }

    pub fn into_identity(self) -> UsbIdentity {
        UsbIdentity::new(&self.vid, &self.pid, self.serial_number)
    }
}

/// Parse an instance identifier into a USB identity.
///
/// Returns `None` for identifiers that are not USB-derived or that do not
/// carry both a VID and a PID.
pub fn parse_device_id(device_id: &str) -> Option<DeviceId> {
    let (bus, pattern) = if device_id.starts_with(FTDI_PREFIX) {
        (Bus::Ftdi, &*FTDI_PATTERN)
    } else if device_id.starts_with(USB_PREFIX) {
        (Bus::Usb, &*USB_PATTERN)
    } else {
        return None;
    };

    let caps = pattern.captures(device_id)?;
    let (vid, pid) = match (caps.get(1), caps.get(2)) {
        (Some(vid), Some(pid)) => (vid.as_str(), pid.as_str()),
        _ => return None,
    };

    Some(DeviceId {
        bus,
        vid: vid.to_string(),
        pid: pid.to_string(),
        serial_number: caps
            .get(3)
            .map(|m| m.as_str().to_string())
            .filter(|s| !s.is_empty()),
    })
}
