//! Linux sysfs device tree
//!
//! Presents `/sys` through the [`DeviceTree`] capability surface. The "Ports"
//! class maps to `/sys/class/tty`; every entry with a `device` link is a node
//! positioned at its canonical device directory. Parents are the containing
//! directories within `/sys/devices`.
//!
//! sysfs has no instance ids of its own, so they are synthesized from the
//! USB attributes found on the way up:
//!
//! - a USB device directory: `USB\VID_2341&PID_8036\<serial>`
//! - a USB interface directory: `USB\VID_2341&PID_8036&MI_00`
//! - a port bound to `ftdi_sio`: `FTDIBUS\VID_0403+PID_6001+<serial>\0000`
//! - anything else: `<SUBSYSTEM>\<directory name>`
//!
//! A port directory below a non-FTDI interface (cp210x, ch341, pl2303) takes
//! the interface's id, and its parent is the USB device, where the serial
//! number lives. Serial numbers that are not plain word characters are left
//! out of synthesized ids.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::tree::{ClassId, DeviceSet, DeviceTree, PropertyKey, RegistryProperty, TreeError};

const PORTS_CLASS: &str = "Ports";
const TTY_CLASS: &str = "tty";
const FTDI_DRIVER: &str = "ftdi_sio";

/// Device tree rooted at a sysfs mount
#[derive(Debug, Clone)]
pub struct SysfsTree {
    root: PathBuf,
}

/// A sysfs device directory, and the tty name when it was reached from the
/// tty class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsNode {
    path: PathBuf,
    tty: Option<String>,
}

impl SysfsNode {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tty(&self) -> Option<&str> {
        self.tty.as_deref()
    }
}

/// Snapshot of one class directory
pub struct SysfsSet {
    entries: Vec<(String, PathBuf)>,
}

impl DeviceSet for SysfsSet {
    type Node = SysfsNode;

    fn node(&self, index: u32) -> Result<Option<SysfsNode>, TreeError> {
        let Some((tty, link)) = self.entries.get(index as usize) else {
            return Ok(None);
        };
        let path = fs::canonicalize(link)
            .map_err(|e| TreeError::Unreadable(format!("{}: {e}", link.display())))?;
        Ok(Some(SysfsNode {
            path,
            tty: Some(tty.clone()),
        }))
    }
}

impl SysfsTree {
    pub fn new() -> Self {
        Self::with_root("/sys")
    }

    /// A tree rooted somewhere other than `/sys`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn devices_root(&self) -> PathBuf {
        let devices = self.root.join("devices");
        fs::canonicalize(&devices).unwrap_or(devices)
    }

    /// Nearest directory at or above `path` satisfying `pred`, without
    /// leaving the devices hierarchy
    fn nearest(&self, path: &Path, pred: impl Fn(&Path) -> bool) -> Option<PathBuf> {
        let devices = self.devices_root();
        path.ancestors()
            .take_while(|dir| dir.starts_with(&devices) && *dir != devices.as_path())
            .find(|dir| pred(dir))
            .map(Path::to_path_buf)
    }

    fn usb_device(&self, path: &Path) -> Option<PathBuf> {
        self.nearest(path, is_usb_device)
    }

    fn usb_interface(&self, path: &Path) -> Option<PathBuf> {
        self.nearest(path, is_usb_interface)
    }

    fn property_value(&self, node: &SysfsNode, key: PropertyKey) -> Option<String> {
        match key {
            PropertyKey::PortName => node.tty.as_ref().map(|tty| format!("/dev/{tty}")),
            PropertyKey::BusReportedDeviceDesc => {
                read_attr(&self.usb_device(&node.path)?, "product")
            }
            PropertyKey::Registry(RegistryProperty::FriendlyName) => {
                let product = read_attr(&self.usb_device(&node.path)?, "product")?;
                match &node.tty {
                    Some(tty) => Some(format!("{product} ({tty})")),
                    None => Some(product),
                }
            }
            PropertyKey::Registry(RegistryProperty::DeviceDesc) => self
                .usb_interface(&node.path)
                .and_then(|dir| read_attr(&dir, "interface")),
            PropertyKey::Registry(RegistryProperty::Mfg) => {
                read_attr(&self.usb_device(&node.path)?, "manufacturer")
            }
            PropertyKey::Registry(RegistryProperty::HardwareId) => {
                let (vid, pid) = usb_ids(&self.usb_device(&node.path)?)?;
                Some(format!(r"USB\VID_{vid}&PID_{pid}"))
            }
            PropertyKey::Registry(RegistryProperty::Driver) => link_name(&node.path, "driver"),
            PropertyKey::Registry(RegistryProperty::Service) => link_name(&node.path, "driver"),
            _ => None,
        }
    }
}

impl Default for SysfsTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTree for SysfsTree {
    type Node = SysfsNode;
    type Set<'a> = SysfsSet;

    fn class_ids(&self, class_name: &str) -> Result<Vec<ClassId>, TreeError> {
        if class_name.eq_ignore_ascii_case(PORTS_CLASS) {
            Ok(vec![ClassId::new(TTY_CLASS)])
        } else {
            Ok(Vec::new())
        }
    }

    fn open_class(&self, class: &ClassId) -> Result<SysfsSet, TreeError> {
        let dir = self.root.join("class").join(class.as_str());
        if !dir.is_dir() {
            return Err(TreeError::UnknownClass(class.to_string()));
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    trace!(error = %e, "Skipping unreadable class entry");
                    continue;
                }
            };
            let device = entry.path().join("device");
            // Virtual terminals and ptys have no backing device
            if !device.exists() {
                continue;
            }
            entries.push((entry.file_name().to_string_lossy().into_owned(), device));
        }
        entries.sort();

        Ok(SysfsSet { entries })
    }

    fn instance_id(&self, node: &SysfsNode) -> Result<String, TreeError> {
        let path = &node.path;

        if is_usb_device(path) {
            return usb_device_id(path).ok_or_else(|| unreadable(path));
        }
        if is_usb_interface(path) {
            return interface_id(path).ok_or_else(|| unreadable(path));
        }
        if let Some(parent) = path.parent().filter(|p| is_usb_interface(p)) {
            let id = if link_name(parent, "driver").as_deref() == Some(FTDI_DRIVER) {
                ftdi_id(parent)
            } else {
                interface_id(parent)
            };
            return id.ok_or_else(|| unreadable(path));
        }

        let subsystem = link_name(path, "subsystem")
            .unwrap_or_else(|| "UNKNOWN".to_string())
            .to_ascii_uppercase();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| unreadable(path))?;
        Ok(format!(r"{subsystem}\{name}"))
    }

    fn parent(&self, node: &SysfsNode) -> Result<SysfsNode, TreeError> {
        let devices = self.devices_root();
        let path = &node.path;
        let mut parent = path.parent();
        // A port directory stands in for its interface
        if !is_usb_device(path) && !is_usb_interface(path) && parent.is_some_and(is_usb_interface)
        {
            parent = parent.and_then(Path::parent);
        }
        match parent {
            Some(parent) if parent.starts_with(&devices) && parent != devices.as_path() => {
                Ok(SysfsNode {
                    path: parent.to_path_buf(),
                    tty: None,
                })
            }
            _ => Err(TreeError::NoParent),
        }
    }

    fn read_property(
        &self,
        node: &SysfsNode,
        key: PropertyKey,
        buf: &mut [u8],
    ) -> Result<usize, TreeError> {
        let value = self
            .property_value(node, key)
            .ok_or(TreeError::MissingProperty(key))?;
        let bytes = value.as_bytes();
        if buf.len() < bytes.len() {
            return Err(TreeError::InsufficientBuffer {
                required: bytes.len(),
            });
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }
}

fn unreadable(path: &Path) -> TreeError {
    TreeError::Unreadable(format!("{}: USB attributes unreadable", path.display()))
}

fn is_usb_device(dir: &Path) -> bool {
    dir.join("idVendor").is_file()
}

fn is_usb_interface(dir: &Path) -> bool {
    dir.join("bInterfaceNumber").is_file()
}

fn read_attr(dir: &Path, name: &str) -> Option<String> {
    let value = fs::read_to_string(dir.join(name)).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn link_name(dir: &Path, name: &str) -> Option<String> {
    let target = fs::read_link(dir.join(name)).ok()?;
    Some(target.file_name()?.to_string_lossy().into_owned())
}

fn usb_ids(device: &Path) -> Option<(String, String)> {
    Some((
        read_attr(device, "idVendor")?.to_ascii_uppercase(),
        read_attr(device, "idProduct")?.to_ascii_uppercase(),
    ))
}

/// The device's serial number, if it fits the instance id grammar
fn id_serial(device: &Path) -> Option<String> {
    read_attr(device, "serial").filter(|serial| {
        let plain = serial.chars().all(|c| c.is_alphanumeric() || c == '_');
        if !plain {
            trace!(device = %device.display(), %serial, "Serial number left out of instance id");
        }
        plain
    })
}

fn usb_device_id(device: &Path) -> Option<String> {
    let (vid, pid) = usb_ids(device)?;
    Some(match id_serial(device) {
        Some(serial) => format!(r"USB\VID_{vid}&PID_{pid}\{serial}"),
        None => format!(r"USB\VID_{vid}&PID_{pid}"),
    })
}

fn interface_id(interface: &Path) -> Option<String> {
    let (vid, pid) = usb_ids(interface.parent()?)?;
    let number = read_attr(interface, "bInterfaceNumber")?;
    Some(format!(r"USB\VID_{vid}&PID_{pid}&MI_{number}"))
}

fn ftdi_id(interface: &Path) -> Option<String> {
    let device = interface.parent()?;
    let (vid, pid) = usb_ids(device)?;
    Some(match id_serial(device) {
        Some(serial) => format!(r"FTDIBUS\VID_{vid}+PID_{pid}+{serial}\0000"),
        None => format!(r"FTDIBUS\VID_{vid}+PID_{pid}\0000"),
    })
}
