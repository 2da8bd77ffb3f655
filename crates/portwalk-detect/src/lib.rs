//! Portwalk Detect
//!
//! Serial port discovery and USB identification.
//!
//! Discovery walks a platform device tree through the [`DeviceTree`]
//! capability trait, recognizes USB instance identifiers, and resolves the
//! serial number of composite USB devices from their parent node.
//!
//! # Example
//!
//! ```rust,no_run
//! use portwalk_detect::scanner;
//!
//! let ports = scanner::list_ports().unwrap();
//! for port in ports {
//!     println!("Found port: {}", port.display_label());
//! }
//! ```

pub mod device_id;
pub mod discovery;
pub mod finder;
pub mod memory;
pub mod scanner;
#[cfg(target_os = "linux")]
pub mod sysfs;
pub mod tree;
pub mod usb_ids;

pub use device_id::{parse_device_id, Bus, DeviceId};
pub use discovery::{Discovery, DiscoveryConfig};
pub use finder::{find_port, poll_for_port, wait_for_port_to_disappear};
pub use memory::{MemoryDeviceTree, MemoryNode, NodeId};
pub use scanner::list_ports;
#[cfg(target_os = "linux")]
pub use sysfs::{SysfsNode, SysfsTree};
pub use tree::{
    string_property, ClassId, DeviceSet, DeviceTree, PropertyKey, RegistryProperty, TreeError,
};
