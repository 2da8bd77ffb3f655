//! Discovered port records

use std::fmt;

/// USB identity of a port
///
/// VID and PID are always reported together, which is why they live in one
/// struct instead of as loose optional fields on [`PortDetails`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UsbIdentity {
    /// USB vendor ID, four uppercase hex digits
    pub vid: String,
    /// USB product ID, four uppercase hex digits
    pub pid: String,
    /// Serial number, when any node of the device reports one
    #[cfg_attr(feature = "serde", serde(default))]
    pub serial_number: Option<String>,
}

impl UsbIdentity {
    /// Build an identity, normalizing VID/PID to uppercase and dropping an
    /// empty serial number.
    pub fn new(vid: &str, pid: &str, serial_number: Option<String>) -> Self {
        Self {
            vid: vid.to_ascii_uppercase(),
            pid: pid.to_ascii_uppercase(),
            serial_number: serial_number.filter(|s| !s.is_empty()),
        }
    }

    /// Build an identity from numeric IDs
    pub fn from_ids(vid: u16, pid: u16, serial_number: Option<String>) -> Self {
        Self::new(&format!("{vid:04X}"), &format!("{pid:04X}"), serial_number)
    }

    /// Compare VID/PID against another pair, ignoring case
    pub fn matches(&self, vid: &str, pid: &str) -> bool {
        self.vid.eq_ignore_ascii_case(vid) && self.pid.eq_ignore_ascii_case(pid)
    }

    /// Numeric vendor ID
    pub fn vid_u16(&self) -> Option<u16> {
        u16::from_str_radix(&self.vid, 16).ok()
    }

    /// Numeric product ID
    pub fn pid_u16(&self) -> Option<u16> {
        u16::from_str_radix(&self.pid, 16).ok()
    }
}

impl fmt::Display for UsbIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.vid, self.pid)?;
        if let Some(serial) = &self.serial_number {
            write!(f, " sn={serial}")?;
        }
        Ok(())
    }
}

/// One discovered serial port
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortDetails {
    /// Platform-visible port name (e.g., COM3, /dev/ttyACM0)
    pub name: String,
    /// USB identity, present only for USB-backed ports
    #[cfg_attr(feature = "serde", serde(default))]
    pub usb: Option<UsbIdentity>,
    /// Human-readable description
    #[cfg_attr(feature = "serde", serde(default))]
    pub product: Option<String>,
    /// Manufacturer string
    #[cfg_attr(feature = "serde", serde(default))]
    pub manufacturer: Option<String>,
}

impl PortDetails {
    /// A port with nothing known beyond its name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usb: None,
            product: None,
            manufacturer: None,
        }
    }

    pub fn is_usb(&self) -> bool {
        self.usb.is_some()
    }

    pub fn vid(&self) -> Option<&str> {
        self.usb.as_ref().map(|u| u.vid.as_str())
    }

    pub fn pid(&self) -> Option<&str> {
        self.usb.as_ref().map(|u| u.pid.as_str())
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.usb.as_ref().and_then(|u| u.serial_number.as_deref())
    }

    /// Label for pickers: "COM3 (Arduino Leonardo)" or just the name
    pub fn display_label(&self) -> String {
        match &self.product {
            Some(product) => format!("{} ({})", self.name, product),
            None => self.name.clone(),
        }
    }
}
