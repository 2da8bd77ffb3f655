//! USB Vendor/Product ID table for common USB-to-serial bridges
//!
//! Used for display only: discovery never filters on these.

use portwalk_core::UsbIdentity;

/// USB Vendor ID / Product ID pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

impl UsbId {
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }
}

/// FTDI (Future Technology Devices International)
pub mod ftdi {
    use super::UsbId;

    pub const VID: u16 = 0x0403;

    pub const FT232R: UsbId = UsbId::new(VID, 0x6001);
    pub const FT2232: UsbId = UsbId::new(VID, 0x6010);
    pub const FT4232: UsbId = UsbId::new(VID, 0x6011);
    pub const FT232H: UsbId = UsbId::new(VID, 0x6014);
    pub const FT231X: UsbId = UsbId::new(VID, 0x6015);

    pub const ALL_PIDS: &[u16] = &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015];
}

/// Silicon Labs CP210x
pub mod cp210x {
    use super::UsbId;

    pub const VID: u16 = 0x10C4;

    pub const CP2102: UsbId = UsbId::new(VID, 0xEA60);
    pub const CP2105: UsbId = UsbId::new(VID, 0xEA70);
    pub const CP2108: UsbId = UsbId::new(VID, 0xEA71);

    pub const ALL_PIDS: &[u16] = &[0xEA60, 0xEA70, 0xEA71];
}

/// WCH CH340/CH341
pub mod ch340 {
    use super::UsbId;

    pub const VID: u16 = 0x1A86;

    pub const CH340: UsbId = UsbId::new(VID, 0x7523);
    pub const CH341: UsbId = UsbId::new(VID, 0x5523);
    pub const CH9102: UsbId = UsbId::new(VID, 0x55D4);

    pub const ALL_PIDS: &[u16] = &[0x7523, 0x5523, 0x55D4];
}

/// Prolific PL2303
pub mod prolific {
    use super::UsbId;

    pub const VID: u16 = 0x067B;

    pub const PL2303: UsbId = UsbId::new(VID, 0x2303);

    pub const ALL_PIDS: &[u16] = &[0x2303];
}

/// Arduino boards with native USB (composite CDC devices)
pub mod arduino {
    use super::UsbId;

    pub const VID: u16 = 0x2341;

    pub const UNO: UsbId = UsbId::new(VID, 0x0043);
    pub const MEGA_2560: UsbId = UsbId::new(VID, 0x0042);
    pub const LEONARDO: UsbId = UsbId::new(VID, 0x8036);
    pub const MICRO: UsbId = UsbId::new(VID, 0x8037);

    pub const ALL_PIDS: &[u16] = &[0x0043, 0x0042, 0x8036, 0x8037];
}

/// Check if a VID/PID is a known bridge
pub fn is_known_bridge(vid: u16, pid: u16) -> bool {
    match vid {
        ftdi::VID => ftdi::ALL_PIDS.contains(&pid),
        cp210x::VID => cp210x::ALL_PIDS.contains(&pid),
        ch340::VID => ch340::ALL_PIDS.contains(&pid),
        prolific::VID => prolific::ALL_PIDS.contains(&pid),
        arduino::VID => arduino::ALL_PIDS.contains(&pid),
        _ => false,
    }
}

/// Bridge vendor name from VID
pub fn bridge_name(vid: u16) -> Option<&'static str> {
    match vid {
        ftdi::VID => Some("FTDI"),
        cp210x::VID => Some("CP210x"),
        ch340::VID => Some("CH340"),
        prolific::VID => Some("PL2303"),
        arduino::VID => Some("Arduino"),
        _ => None,
    }
}

/// Bridge vendor name for a discovered identity
pub fn describe(identity: &UsbIdentity) -> Option<&'static str> {
    identity.vid_u16().and_then(bridge_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_bridges() {
        assert!(is_known_bridge(ftdi::FT232R.vid, ftdi::FT232R.pid));
        assert!(is_known_bridge(cp210x::CP2102.vid, cp210x::CP2102.pid));
        assert!(is_known_bridge(arduino::LEONARDO.vid, arduino::LEONARDO.pid));
        assert!(!is_known_bridge(ftdi::VID, 0x1234));
        assert!(!is_known_bridge(0xFFFF, 0x0001));
    }

    #[test]
    fn test_bridge_name() {
        assert_eq!(bridge_name(0x0403), Some("FTDI"));
        assert_eq!(bridge_name(0x1A86), Some("CH340"));
        assert_eq!(bridge_name(0x0000), None);
    }

    #[test]
    fn test_describe_identity() {
        let id = UsbIdentity::new("10c4", "ea60", None);
        assert_eq!(describe(&id), Some("CP210x"));

        let bogus = UsbIdentity::new("ZZZZ", "0001", None);
        assert_eq!(describe(&bogus), None);
    }
}
