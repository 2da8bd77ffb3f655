//! Transport seam between a session and the device
//!
//! A [`SerialLink`] is a byte stream with the control surface a UART has:
//! line parameters, modem control outputs and buffer purges. The session's
//! I/O task owns exactly one link and is the only caller of these methods.

use std::io;

use portwalk_core::{DataBits, FlowControl, Mode, Parity, PortError, StopBits};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::debug;

/// Which OS buffer to purge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Buffer {
    /// Received but not yet read
    Input,
    /// Written but not yet transmitted
    Output,
}

/// A serial device as seen by a session
pub trait SerialLink: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Reconfigure line parameters on the open device
    fn apply_mode(&mut self, mode: &Mode) -> Result<(), PortError>;

    /// Drive the DTR output
    fn set_dtr(&mut self, level: bool) -> Result<(), PortError>;

    /// Drive the RTS output
    fn set_rts(&mut self, level: bool) -> Result<(), PortError>;

    /// Discard the contents of an OS buffer
    fn clear(&mut self, buffer: Buffer) -> Result<(), PortError>;
}

fn data_bits(bits: DataBits) -> tokio_serial::DataBits {
    match bits {
        DataBits::Five => tokio_serial::DataBits::Five,
        DataBits::Six => tokio_serial::DataBits::Six,
        DataBits::Seven => tokio_serial::DataBits::Seven,
        DataBits::Eight => tokio_serial::DataBits::Eight,
    }
}

fn parity(parity: Parity) -> Result<tokio_serial::Parity, PortError> {
    match parity {
        Parity::None => Ok(tokio_serial::Parity::None),
        Parity::Odd => Ok(tokio_serial::Parity::Odd),
        Parity::Even => Ok(tokio_serial::Parity::Even),
        Parity::Mark | Parity::Space => Err(PortError::InvalidMode(format!(
            "{parity:?} parity is not supported by this transport"
        ))),
    }
}

fn stop_bits(bits: StopBits) -> Result<tokio_serial::StopBits, PortError> {
    match bits {
        StopBits::One => Ok(tokio_serial::StopBits::One),
        StopBits::Two => Ok(tokio_serial::StopBits::Two),
        StopBits::OnePointFive => Err(PortError::InvalidMode(
            "1.5 stop bits are not supported by this transport".to_string(),
        )),
    }
}

fn flow_control(flow: FlowControl) -> tokio_serial::FlowControl {
    match flow {
        FlowControl::None => tokio_serial::FlowControl::None,
        FlowControl::Software => tokio_serial::FlowControl::Software,
        FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
    }
}

/// Translate a serial driver error for the named port
pub fn map_serial_error(port: &str, err: tokio_serial::Error) -> PortError {
    match err.kind {
        tokio_serial::ErrorKind::NoDevice => PortError::PortNotFound(port.to_string()),
        tokio_serial::ErrorKind::InvalidInput => PortError::InvalidMode(err.description),
        tokio_serial::ErrorKind::Io(io::ErrorKind::NotFound) => {
            PortError::PortNotFound(port.to_string())
        }
        tokio_serial::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
            PortError::PermissionDenied(port.to_string())
        }
        tokio_serial::ErrorKind::Io(io::ErrorKind::ResourceBusy) => {
            PortError::PortBusy(port.to_string())
        }
        tokio_serial::ErrorKind::Io(kind) => PortError::Io(io::Error::new(kind, err.description)),
        tokio_serial::ErrorKind::Unknown => PortError::Io(io::Error::other(err.description)),
    }
}

/// Open a device with the given line parameters
pub fn open_link(port: &str, mode: &Mode) -> Result<SerialStream, PortError> {
    mode.validate()?;

    debug!(port = %port, mode = %mode, "Opening serial port");

    tokio_serial::new(port, mode.baud_rate)
        .data_bits(data_bits(mode.data_bits))
        .parity(parity(mode.parity)?)
        .stop_bits(stop_bits(mode.stop_bits)?)
        .flow_control(flow_control(mode.flow_control))
        .open_native_async()
        .map_err(|e| map_serial_error(port, e))
}

impl SerialLink for SerialStream {
    fn apply_mode(&mut self, mode: &Mode) -> Result<(), PortError> {
        let parity = parity(mode.parity)?;
        let stop_bits = stop_bits(mode.stop_bits)?;
        let port = self.name().unwrap_or_default();

        self.set_baud_rate(mode.baud_rate).map_err(|e| match e.kind {
            tokio_serial::ErrorKind::InvalidInput => PortError::InvalidSpeed(mode.baud_rate),
            _ => map_serial_error(&port, e),
        })?;
        self.set_data_bits(data_bits(mode.data_bits))
            .map_err(|e| map_serial_error(&port, e))?;
        self.set_parity(parity).map_err(|e| map_serial_error(&port, e))?;
        self.set_stop_bits(stop_bits).map_err(|e| map_serial_error(&port, e))?;
        self.set_flow_control(flow_control(mode.flow_control))
            .map_err(|e| map_serial_error(&port, e))
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), PortError> {
        self.write_data_terminal_ready(level)
            .map_err(|e| map_serial_error(&self.name().unwrap_or_default(), e))
    }

    fn set_rts(&mut self, level: bool) -> Result<(), PortError> {
        self.write_request_to_send(level)
            .map_err(|e| map_serial_error(&self.name().unwrap_or_default(), e))
    }

    fn clear(&mut self, buffer: Buffer) -> Result<(), PortError> {
        let which = match buffer {
            Buffer::Input => ClearBuffer::Input,
            Buffer::Output => ClearBuffer::Output,
        };
        <SerialStream as SerialPort>::clear(self, which)
            .map_err(|e| map_serial_error(&self.name().unwrap_or_default(), e))
    }
}
