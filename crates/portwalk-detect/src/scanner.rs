//! Serial port scanner
//!
//! Entry point for enumerating the ports of the running system. Linux walks
//! sysfs through the discovery engine; other platforms go through the
//! `serialport` crate's enumeration.

use portwalk_core::{PortDetails, PortError, UsbIdentity};
use serialport::SerialPortType;

use crate::discovery::DiscoveryConfig;

/// Enumerate serial ports with the platform's default configuration
pub fn list_ports() -> Result<Vec<PortDetails>, PortError> {
    list_ports_with(&DiscoveryConfig::platform())
}

/// Enumerate serial ports with a custom name filter
#[cfg(target_os = "linux")]
pub fn list_ports_with(config: &DiscoveryConfig) -> Result<Vec<PortDetails>, PortError> {
    use crate::discovery::Discovery;
    use crate::sysfs::SysfsTree;

    Discovery::with_config(SysfsTree::new(), config.clone()).list_ports()
}

/// Enumerate serial ports with a custom name filter
#[cfg(not(target_os = "linux"))]
pub fn list_ports_with(config: &DiscoveryConfig) -> Result<Vec<PortDetails>, PortError> {
    use tracing::info;

    info!("Enumerating serial ports...");
    let ports = serialport::available_ports()
        .map_err(|e| PortError::EnumerationFailed(e.to_string()))?;

    let result: Vec<_> = ports
        .into_iter()
        .map(|p| port_details_from_serialport(p.port_name, &p.port_type))
        .filter(|p| config.accepts_name(&p.name))
        .collect();

    if result.is_empty() {
        info!("No serial ports found");
    } else {
        info!("Found {} serial port(s)", result.len());
    }

    Ok(result)
}

/// Convert the `serialport` crate's port record
pub fn port_details_from_serialport(name: String, port_type: &SerialPortType) -> PortDetails {
    match port_type {
        SerialPortType::UsbPort(usb) => PortDetails {
            name,
            usb: Some(UsbIdentity::from_ids(
                usb.vid,
                usb.pid,
                usb.serial_number.clone(),
            )),
            product: usb.product.clone(),
            manufacturer: usb.manufacturer.clone(),
        },
        _ => PortDetails::new(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn test_port_details_from_usb() {
        let usb_info = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x0403,
            pid: 0x6001,
            serial_number: Some("12345".to_string()),
            manufacturer: Some("FTDI".to_string()),
            product: Some("FT232R".to_string()),
        });

        let port = port_details_from_serialport("/dev/ttyUSB0".to_string(), &usb_info);

        assert_eq!(port.vid(), Some("0403"));
        assert_eq!(port.pid(), Some("6001"));
        assert_eq!(port.serial_number(), Some("12345"));
        assert_eq!(port.product.as_deref(), Some("FT232R"));
    }

    #[test]
    fn test_port_details_from_builtin_port() {
        let port = port_details_from_serialport("COM1".to_string(), &SerialPortType::PciPort);
        assert!(!port.is_usb());
        assert_eq!(port.name, "COM1");
    }
}
