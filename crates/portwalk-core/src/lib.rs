//! Portwalk Core
//!
//! Shared vocabulary for serial port discovery and port sessions:
//!
//! - [`PortDetails`] / [`UsbIdentity`]: one record per discovered port
//! - [`Mode`]: line parameters (baud rate, framing, flow control)
//! - [`PortError`]: the error taxonomy both subsystems report through
//!
//! # Example
//!
//! ```rust
//! use portwalk_core::{Mode, PortDetails, UsbIdentity};
//!
//! let mut port = PortDetails::new("COM3");
//! port.usb = Some(UsbIdentity::new("2341", "8036", Some("AB12".into())));
//! assert!(port.is_usb());
//!
//! let mode = Mode::with_baud_rate(115_200);
//! assert!(mode.validate().is_ok());
//! ```

pub mod details;
pub mod error;
pub mod mode;

pub use details::{PortDetails, UsbIdentity};
pub use error::{PortError, Result};
pub use mode::{DataBits, FlowControl, Mode, Parity, StopBits, DEFAULT_BAUD_RATE};
