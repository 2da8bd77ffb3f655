//! Error taxonomy shared by discovery and port sessions

use thiserror::Error;

/// Errors reported by port discovery and port sessions
#[derive(Debug, Error)]
pub enum PortError {
    /// The device class could not be enumerated at all
    #[error("failed to enumerate ports: {0}")]
    EnumerationFailed(String),

    /// No device with this name exists
    #[error("port {0} not found")]
    PortNotFound(String),

    /// The OS refused access to the device
    #[error("permission denied opening {0}")]
    PermissionDenied(String),

    /// The device is held open by someone else
    #[error("port {0} is busy or in use")]
    PortBusy(String),

    /// Framing parameters the device or transport cannot use
    #[error("invalid mode: {0}")]
    InvalidMode(String),

    /// Baud rate the device or transport cannot use
    #[error("invalid speed: {0} baud")]
    InvalidSpeed(u32),

    /// The session was torn down, concurrently or previously
    #[error("port closed")]
    PortClosed,

    /// Generic transport failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PortError {
    /// Whether a caller can reasonably retry the operation after a short delay.
    ///
    /// Nothing in this workspace retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PortError::PortBusy(_) | PortError::PermissionDenied(_))
    }

    /// Whether this error means the session is gone for good
    pub fn is_closed(&self) -> bool {
        matches!(self, PortError::PortClosed)
    }
}

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, PortError>;
