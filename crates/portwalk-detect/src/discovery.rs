//! Port discovery engine
//!
//! Walks every class registered under the configured class name, turns each
//! port-bearing node into a [`PortDetails`], and resolves USB identity from
//! the node's instance id. Composite USB devices expose their serial number
//! only on the parent device node, so a USB node without one looks at its
//! parent and inherits the serial when the parent is the same VID/PID.
//!
//! A failing class set aborts the pass. Anything wrong with a single device
//! only skips that device.

use portwalk_core::{PortDetails, PortError};
use tracing::{debug, info, trace};

use crate::device_id::{parse_device_id, DeviceId};
use crate::tree::{string_property, DeviceSet, DeviceTree, PropertyKey, RegistryProperty};

/// Discovery configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Device class holding serial ports
    pub class_name: String,
    /// Accepted port name prefixes; empty accepts every name
    pub name_prefixes: Vec<String>,
    /// Skip ports whose name contains any of these
    pub skip_patterns: Vec<String>,
}

impl DiscoveryConfig {
    /// Windows setup class "Ports", COM ports only
    pub fn windows() -> Self {
        Self {
            class_name: "Ports".to_string(),
            name_prefixes: vec!["COM".to_string()],
            skip_patterns: Vec::new(),
        }
    }

    /// Linux tty class, hardware-backed serial devices only
    pub fn linux() -> Self {
        Self {
            class_name: "Ports".to_string(),
            name_prefixes: [
                "/dev/ttyUSB",
                "/dev/ttyACM",
                "/dev/ttyS",
                "/dev/ttyAMA",
                "/dev/ttyXRUSB",
                "/dev/rfcomm",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            skip_patterns: Vec::new(),
        }
    }

    /// Defaults for the platform this was built for
    pub fn platform() -> Self {
        if cfg!(windows) {
            Self::windows()
        } else if cfg!(target_os = "linux") {
            Self::linux()
        } else {
            Self {
                class_name: "Ports".to_string(),
                name_prefixes: Vec::new(),
                skip_patterns: vec!["Bluetooth".to_string(), "debug".to_string()],
            }
        }
    }

    /// Check a port name against the prefix filter and skip patterns
    pub fn accepts_name(&self, name: &str) -> bool {
        let prefixed = self.name_prefixes.is_empty()
            || self
                .name_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()));
        prefixed
            && !self
                .skip_patterns
                .iter()
                .any(|pattern| name.contains(pattern.as_str()))
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::platform()
    }
}

/// Discovery engine over one device tree backend
pub struct Discovery<T> {
    tree: T,
    config: DiscoveryConfig,
}

impl<T: DeviceTree> Discovery<T> {
    pub fn new(tree: T) -> Self {
        Self::with_config(tree, DiscoveryConfig::default())
    }

    pub fn with_config(tree: T, config: DiscoveryConfig) -> Self {
        Self { tree, config }
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Enumerate serial ports.
    ///
    /// Ports come back in class order, then enumeration order within a class.
    pub fn list_ports(&self) -> Result<Vec<PortDetails>, PortError> {
        info!(class = %self.config.class_name, "Enumerating serial ports...");

        let classes = self
            .tree
            .class_ids(&self.config.class_name)
            .map_err(|e| PortError::EnumerationFailed(e.to_string()))?;

        let mut ports = Vec::new();
        for class in &classes {
            let set = self.tree.open_class(class).map_err(|e| {
                PortError::EnumerationFailed(format!("class {class}: {e}"))
            })?;
            self.scan_set(&set, &mut ports);
        }

        if ports.is_empty() {
            info!("No serial ports found");
        } else {
            info!("Found {} serial port(s)", ports.len());
            for port in &ports {
                let desc = port.product.as_deref().unwrap_or("Unknown");
                debug!("  {} - {}", port.name, desc);
            }
        }

        Ok(ports)
    }

    fn scan_set(&self, set: &T::Set<'_>, ports: &mut Vec<PortDetails>) {
        let mut index = 0u32;
        loop {
            let node = match set.node(index) {
                Ok(Some(node)) => node,
                Ok(None) => break,
                Err(e) => {
                    debug!(index, error = %e, "Skipping unreadable device entry");
                    index += 1;
                    continue;
                }
            };
            index += 1;

            if let Some(port) = self.describe(&node) {
                ports.push(port);
            }
        }
    }

    fn describe(&self, node: &T::Node) -> Option<PortDetails> {
        let name = match string_property(&self.tree, node, PropertyKey::PortName) {
            Ok(Some(name)) => name,
            Ok(None) => {
                debug!(?node, "Skipping device without a port name");
                return None;
            }
            Err(e) => {
                debug!(?node, error = %e, "Skipping device, port name unreadable");
                return None;
            }
        };

        if !self.config.accepts_name(&name) {
            trace!(port = %name, "Ignoring port name");
            return None;
        }

        let instance_id = match self.tree.instance_id(node) {
            Ok(id) => id,
            Err(e) => {
                debug!(port = %name, error = %e, "Skipping device, instance id unreadable");
                return None;
            }
        };

        let usb = parse_device_id(&instance_id).map(|id| {
            let id = if id.serial_number.is_none() {
                self.inherit_parent_serial(node, id)
            } else {
                id
            };
            id.into_identity()
        });

        Some(PortDetails {
            name,
            usb,
            product: self.product(node),
            manufacturer: self.string(node, RegistryProperty::Mfg.into()),
        })
    }

    /// Composite functions carry no serial; the parent device node does.
    fn inherit_parent_serial(&self, node: &T::Node, mut id: DeviceId) -> DeviceId {
        trace!(vid = %id.vid, pid = %id.pid, "Looking up serial number on parent device");

        let parent = match self.tree.parent(node) {
            Ok(parent) => parent,
            Err(e) => {
                trace!(error = %e, "No parent to inherit a serial number from");
                return id;
            }
        };
        let parent_id = match self.tree.instance_id(&parent) {
            Ok(parent_id) => parent_id,
            Err(e) => {
                trace!(error = %e, "Parent instance id unreadable");
                return id;
            }
        };

        match parse_device_id(&parent_id) {
            Some(parent) if parent.same_device(&id) => {
                trace!(parent = %parent_id, "Inheriting serial number from parent");
                id.serial_number = parent.serial_number;
            }
            Some(_) => {
                trace!(parent = %parent_id, "Parent is a different device");
            }
            None => {
                trace!(parent = %parent_id, "Parent is not a USB device");
            }
        }
        id
    }

    fn product(&self, node: &T::Node) -> Option<String> {
        [
            PropertyKey::Registry(RegistryProperty::FriendlyName),
            PropertyKey::BusReportedDeviceDesc,
            PropertyKey::Registry(RegistryProperty::DeviceDesc),
        ]
        .into_iter()
        .find_map(|key| self.string(node, key))
    }

    fn string(&self, node: &T::Node, key: PropertyKey) -> Option<String> {
        string_property(&self.tree, node, key).unwrap_or_else(|e| {
            trace!(?key, error = %e, "Property unreadable");
            None
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_filter_accepts_com_ports_only() {
        let config = DiscoveryConfig::windows();
        assert!(config.accepts_name("COM3"));
        assert!(config.accepts_name("COM12"));
        assert!(!config.accepts_name("LPT1"));
        assert!(!config.accepts_name("CNCA0"));
    }

    #[test]
    fn linux_filter_accepts_hardware_ttys() {
        let config = DiscoveryConfig::linux();
        assert!(config.accepts_name("/dev/ttyUSB0"));
        assert!(config.accepts_name("/dev/ttyACM1"));
        assert!(config.accepts_name("/dev/ttyS4"));
        assert!(!config.accepts_name("/dev/tty0"));
        assert!(!config.accepts_name("/dev/ptmx"));
    }

    #[test]
    fn skip_patterns_apply_after_prefixes() {
        let config = DiscoveryConfig {
            skip_patterns: vec!["ttyS".to_string()],
            ..DiscoveryConfig::linux()
        };
        assert!(config.accepts_name("/dev/ttyUSB0"));
        assert!(!config.accepts_name("/dev/ttyS0"));
    }

    #[test]
    fn empty_prefix_list_accepts_everything_not_skipped() {
        let config = DiscoveryConfig {
            class_name: "Ports".into(),
            name_prefixes: Vec::new(),
            skip_patterns: vec!["Bluetooth".into()],
        };
        assert!(config.accepts_name("/dev/cu.usbmodem1101"));
        assert!(!config.accepts_name("/dev/cu.Bluetooth-Incoming-Port"));
    }
}
