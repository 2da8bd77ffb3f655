//! Terminal formatting for listings and monitored bytes

use std::fmt::Write as _;

use portwalk_core::PortDetails;
use portwalk_detect::usb_ids;

/// Bytes per hex dump line
const HEX_WIDTH: usize = 16;

/// One listing line: name, USB identity, description, bridge vendor
pub fn format_port(port: &PortDetails) -> String {
    let mut line = format!("{:<14}", port.name);
    match &port.usb {
        Some(usb) => {
            let _ = write!(line, " {:<24}", usb.to_string());
        }
        None => {
            let _ = write!(line, " {:<24}", "-");
        }
    }
    if let Some(product) = &port.product {
        let _ = write!(line, " {product}");
    }
    if let Some(bridge) = port.usb.as_ref().and_then(usb_ids::describe) {
        let _ = write!(line, " [{bridge}]");
    }
    line.trim_end().to_string()
}

/// Hex dump, 16 bytes per line, with a printable-ASCII column
pub fn format_hex(data: &[u8]) -> String {
    let mut out = String::new();
    for chunk in data.chunks(HEX_WIDTH) {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02X}")).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect();
        let _ = writeln!(out, "{:<width$}  {ascii}", hex.join(" "), width = HEX_WIDTH * 3 - 1);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use portwalk_core::UsbIdentity;

    #[test]
    fn usb_port_line_shows_identity_and_bridge() {
        let port = PortDetails {
            usb: Some(UsbIdentity::new("0403", "6001", Some("A70362A3".into()))),
            product: Some("USB Serial Port (COM5)".into()),
            ..PortDetails::new("COM5")
        };
        let line = format_port(&port);
        assert!(line.starts_with("COM5 "));
        assert!(line.contains("0403:6001 sn=A70362A3"));
        assert!(line.contains("USB Serial Port (COM5)"));
        assert!(line.ends_with("[FTDI]"));
    }

    #[test]
    fn plain_port_line_has_placeholder() {
        let line = format_port(&PortDetails::new("/dev/ttyS0"));
        assert_eq!(line, "/dev/ttyS0      -");
    }

    #[test]
    fn hex_dump_wraps_and_escapes() {
        let dump = format_hex(b"OK\r\n0123456789abcdefXYZ");
        let lines: Vec<_> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("4F 4B 0D 0A 30 31"));
        assert!(lines[0].ends_with("OK..0123456789ab"));
        assert!(lines[1].starts_with("63 64 65 66 58 59 5A"));
        assert!(lines[1].ends_with("cdefXYZ"));
    }

    #[test]
    fn hex_dump_of_nothing_is_empty() {
        assert_eq!(format_hex(&[]), "");
    }
}
