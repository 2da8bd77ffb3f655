//! Device tree abstraction
//!
//! The platform device database is reduced to the handful of capabilities
//! discovery needs: list the nodes of a device class, read a node's instance
//! identifier, step to its parent, and read named property values. Backends
//! implement [`DeviceTree`]; the discovery engine only ever talks to this
//! trait.
//!
//! Class sets are scoped: a backend holding a native enumeration handle
//! releases it in `Drop`, so every exit path of a discovery pass (including
//! early returns and unwinding) gives the handle back.

use std::fmt;

use thiserror::Error;

/// Errors raised by a device tree backend
#[derive(Debug, Error)]
pub enum TreeError {
    /// The node is a root of the device tree
    #[error("device node has no parent")]
    NoParent,

    /// The node does not carry the requested property
    #[error("property {0:?} not present")]
    MissingProperty(PropertyKey),

    /// The caller's buffer is too small for the property value
    #[error("buffer too small: {required} bytes required")]
    InsufficientBuffer { required: usize },

    /// The device class name or id is not known to the backend
    #[error("unknown device class: {0}")]
    UnknownClass(String),

    /// A single device entry could not be read
    #[error("device entry unreadable: {0}")]
    Unreadable(String),

    /// Backend I/O failure
    #[error("device tree I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identifier of a device class (a setup class GUID, a sysfs class name, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassId(String);

impl ClassId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Device registry property codes
///
/// The numeric values are the registry property ordinals; nothing depends on
/// them beyond equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RegistryProperty {
    DeviceDesc = 0x00,
    HardwareId = 0x01,
    CompatibleIds = 0x02,
    Service = 0x04,
    Class = 0x07,
    ClassGuid = 0x08,
    Driver = 0x09,
    Mfg = 0x0B,
    FriendlyName = 0x0C,
    LocationInformation = 0x0D,
    PhysicalDeviceObjectName = 0x0E,
    EnumeratorName = 0x16,
    LocationPaths = 0x23,
}

/// Key of a value readable from a device node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// The `PortName` value of the device's registry key
    PortName,
    /// Product string as reported by the bus
    BusReportedDeviceDesc,
    /// A device registry property
    Registry(RegistryProperty),
}

impl From<RegistryProperty> for PropertyKey {
    fn from(property: RegistryProperty) -> Self {
        PropertyKey::Registry(property)
    }
}

/// An open enumeration set for one device class
pub trait DeviceSet {
    type Node;

    /// Fetch the node at `index`.
    ///
    /// `Ok(None)` means there are no more entries. An `Err` concerns only
    /// this entry; later indices may still be readable.
    fn node(&self, index: u32) -> Result<Option<Self::Node>, TreeError>;
}

/// Capability surface of a platform device database
pub trait DeviceTree {
    /// Transient view of one device node, valid during one enumeration pass
    type Node: Clone + fmt::Debug;

    /// Scoped enumeration set; releases its native handle when dropped
    type Set<'a>: DeviceSet<Node = Self::Node>
    where
        Self: 'a;

    /// Resolve all class ids registered under a class name
    fn class_ids(&self, class_name: &str) -> Result<Vec<ClassId>, TreeError>;

    /// Open the enumeration set for one class
    fn open_class(&self, class: &ClassId) -> Result<Self::Set<'_>, TreeError>;

    /// The node's bus-specific instance identifier
    fn instance_id(&self, node: &Self::Node) -> Result<String, TreeError>;

    /// The node's parent, or [`TreeError::NoParent`] for a root
    fn parent(&self, node: &Self::Node) -> Result<Self::Node, TreeError>;

    /// Copy a property value into `buf`, returning the number of bytes written.
    ///
    /// Fails with [`TreeError::InsufficientBuffer`] carrying the required size
    /// when `buf` is too small; an empty `buf` therefore works as a size query.
    fn read_property(
        &self,
        node: &Self::Node,
        key: PropertyKey,
        buf: &mut [u8],
    ) -> Result<usize, TreeError>;
}

/// Read a string property using the size-then-fetch protocol.
///
/// The value may grow between the size query and the fetch; the fetch is then
/// retried once with the newly reported size. A missing property is
/// `Ok(None)`, as is an empty value.
pub fn string_property<T>(
    tree: &T,
    node: &T::Node,
    key: PropertyKey,
) -> Result<Option<String>, TreeError>
where
    T: DeviceTree + ?Sized,
{
    let required = match tree.read_property(node, key, &mut []) {
        Ok(_) => return Ok(None),
        Err(TreeError::InsufficientBuffer { required }) => required,
        Err(TreeError::MissingProperty(_)) => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut buf = vec![0u8; required];
    let len = match tree.read_property(node, key, &mut buf) {
        Ok(len) => len,
        Err(TreeError::InsufficientBuffer { required }) => {
            buf.resize(required, 0);
            match tree.read_property(node, key, &mut buf) {
                Ok(len) => len,
                Err(TreeError::MissingProperty(_)) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        Err(TreeError::MissingProperty(_)) => return Ok(None),
        Err(e) => return Err(e),
    };

    Ok(decode_string(&buf[..len]))
}

/// Decode a NUL-terminated UTF-8 value, trimming surrounding whitespace
fn decode_string(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let text = String::from_utf8_lossy(&bytes[..end]);
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
