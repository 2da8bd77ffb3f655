//! Integration tests for port discovery
//!
//! These tests drive the discovery engine over scripted device trees:
//! - Composite USB devices inheriting the parent's serial number
//! - Port name filtering and skip patterns
//! - Per-device failures skipping only that device
//! - Class set release on every exit path

use portwalk_core::PortError;
use portwalk_detect::{
    Discovery, DiscoveryConfig, MemoryDeviceTree, MemoryNode, PropertyKey, RegistryProperty,
};
use proptest::prelude::*;

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub const PORTS_GUID: &str = "{4d36e978-e325-11ce-bfc1-08002be10318}";

    /// Discovery with Windows-style naming over a prepared tree
    pub fn windows_discovery(tree: MemoryDeviceTree) -> Discovery<MemoryDeviceTree> {
        Discovery::with_config(tree, DiscoveryConfig::windows())
    }

    /// A tree with an Arduino Leonardo: the composite parent holds the serial
    pub fn leonardo_tree(function_id: &str) -> MemoryDeviceTree {
        let mut tree = MemoryDeviceTree::new();
        let ports = tree.add_class("Ports", PORTS_GUID);
        let parent = tree.add_node(MemoryNode::new(r"USB\VID_2341&PID_8036\HIDPC"));
        tree.add_member(
            &ports,
            MemoryNode::new(function_id)
                .parent(parent)
                .port_name("COM7")
                .friendly_name("Arduino Leonardo (COM7)")
                .manufacturer("Arduino LLC (www.arduino.cc)"),
        );
        tree
    }
}

use helpers::*;

// ============================================================================
// Identity Resolution
// ============================================================================

#[test]
fn test_usb_port_with_own_serial() {
    let mut tree = MemoryDeviceTree::new();
    let ports = tree.add_class("Ports", PORTS_GUID);
    tree.add_member(
        &ports,
        MemoryNode::new(r"FTDIBUS\VID_0403+PID_6001+A70362A3A\0000")
            .port_name("COM5")
            .friendly_name("USB Serial Port (COM5)"),
    );

    let ports = windows_discovery(tree).list_ports().unwrap();
    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].name, "COM5");
    assert_eq!(ports[0].vid(), Some("0403"));
    assert_eq!(ports[0].pid(), Some("6001"));
    assert_eq!(ports[0].serial_number(), Some("A70362A3A"));
    assert_eq!(ports[0].product.as_deref(), Some("USB Serial Port (COM5)"));
}

#[test]
fn test_composite_function_inherits_parent_serial() {
    let tree = leonardo_tree(r"USB\VID_2341&PID_8036&MI_00\6&3A757EEC&0&0000");
    let ports = windows_discovery(tree).list_ports().unwrap();

    assert_eq!(ports.len(), 1);
    let usb = ports[0].usb.as_ref().unwrap();
    assert_eq!(usb.vid, "2341");
    assert_eq!(usb.pid, "8036");
    assert_eq!(usb.serial_number.as_deref(), Some("HIDPC"));
    assert_eq!(
        ports[0].manufacturer.as_deref(),
        Some("Arduino LLC (www.arduino.cc)")
    );
}

#[test]
fn test_composite_parent_match_ignores_case() {
    let mut tree = MemoryDeviceTree::new();
    let class = tree.add_class("Ports", PORTS_GUID);
    let parent = tree.add_node(MemoryNode::new(r"USB\VID_10C4&PID_EA60\0001"));
    tree.add_member(
        &class,
        MemoryNode::new(r"USB\VID_10c4&PID_ea60&MI_00\7&1&0&0000")
            .parent(parent)
            .port_name("COM3"),
    );
    let ports = windows_discovery(tree).list_ports().unwrap();
    assert_eq!(ports[0].serial_number(), Some("0001"));
    assert_eq!(ports[0].vid(), Some("10C4"));
}

#[test]
fn test_parent_of_different_device_gives_no_serial() {
    let mut tree = MemoryDeviceTree::new();
    let class = tree.add_class("Ports", PORTS_GUID);
    let hub = tree.add_node(MemoryNode::new(r"USB\VID_05E3&PID_0610\5&2A1B&0&1"));
    tree.add_member(
        &class,
        MemoryNode::new(r"USB\VID_2341&PID_8036&MI_00\6&3A757EEC&0&0000")
            .parent(hub)
            .port_name("COM7"),
    );

    let ports = windows_discovery(tree).list_ports().unwrap();
    assert_eq!(ports[0].vid(), Some("2341"));
    assert_eq!(ports[0].serial_number(), None);
}

#[test]
fn test_missing_parent_gives_no_serial() {
    let mut tree = MemoryDeviceTree::new();
    let class = tree.add_class("Ports", PORTS_GUID);
    tree.add_member(
        &class,
        MemoryNode::new(r"USB\VID_2341&PID_8036&MI_00\6&3A757EEC&0&0000").port_name("COM7"),
    );
    let unreadable_parent = tree.add_node(MemoryNode::without_instance_id());
    tree.add_member(
        &class,
        MemoryNode::new(r"USB\VID_2341&PID_8037&MI_00\6&3A757EEC&0&0000")
            .parent(unreadable_parent)
            .port_name("COM8"),
    );

    let ports = windows_discovery(tree).list_ports().unwrap();
    assert_eq!(ports.len(), 2);
    assert!(ports.iter().all(|p| p.is_usb() && p.serial_number().is_none()));
}

#[test]
fn test_non_usb_port_has_no_identity() {
    let mut tree = MemoryDeviceTree::new();
    let class = tree.add_class("Ports", PORTS_GUID);
    tree.add_member(
        &class,
        MemoryNode::new(r"ACPI\PNP0501\1")
            .port_name("COM1")
            .property(RegistryProperty::DeviceDesc, "Communications Port"),
    );

    let ports = windows_discovery(tree).list_ports().unwrap();
    assert_eq!(ports[0].name, "COM1");
    assert!(!ports[0].is_usb());
    assert_eq!(ports[0].product.as_deref(), Some("Communications Port"));
}

#[test]
fn test_product_prefers_friendly_name_then_bus_description() {
    let mut tree = MemoryDeviceTree::new();
    let class = tree.add_class("Ports", PORTS_GUID);
    tree.add_member(
        &class,
        MemoryNode::new(r"USB\VID_1A86&PID_7523\5&1&0&2")
            .port_name("COM6")
            .property(PropertyKey::BusReportedDeviceDesc, "USB2.0-Serial")
            .property(RegistryProperty::DeviceDesc, "USB-SERIAL CH340"),
    );

    let ports = windows_discovery(tree).list_ports().unwrap();
    assert_eq!(ports[0].product.as_deref(), Some("USB2.0-Serial"));
}

// ============================================================================
// Filtering and Skipping
// ============================================================================

#[test]
fn test_non_com_names_are_filtered() {
    let mut tree = MemoryDeviceTree::new();
    let class = tree.add_class("Ports", PORTS_GUID);
    tree.add_member(&class, MemoryNode::new(r"ACPI\PNP0400\0").port_name("LPT1"));
    tree.add_member(&class, MemoryNode::new(r"ACPI\PNP0501\1").port_name("COM1"));
    tree.add_member(&class, MemoryNode::new(r"ROOT\PORTS\0000").port_name("CNCA0"));

    let ports = windows_discovery(tree).list_ports().unwrap();
    let names: Vec<_> = ports.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["COM1"]);
}

#[test]
fn test_skip_patterns_remove_ports() {
    let mut tree = MemoryDeviceTree::new();
    let class = tree.add_class("Ports", PORTS_GUID);
    tree.add_member(&class, MemoryNode::new(r"ACPI\PNP0501\1").port_name("COM1"));
    tree.add_member(&class, MemoryNode::new(r"ACPI\PNP0501\2").port_name("COM2"));

    let config = DiscoveryConfig {
        skip_patterns: vec!["COM2".to_string()],
        ..DiscoveryConfig::windows()
    };
    let ports = Discovery::with_config(tree, config).list_ports().unwrap();
    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].name, "COM1");
}

#[test]
fn test_device_failures_skip_only_that_device() {
    let mut tree = MemoryDeviceTree::new();
    let class = tree.add_class("Ports", PORTS_GUID);
    tree.add_member(&class, MemoryNode::new(r"ACPI\PNP0501\1").port_name("COM1"));
    tree.add_unreadable_member(&class);
    tree.add_member(&class, MemoryNode::new(r"ROOT\NOPORTNAME\0000"));
    tree.add_member(&class, MemoryNode::without_instance_id().port_name("COM2"));
    tree.add_member(&class, MemoryNode::new(r"ACPI\PNP0501\3").port_name("COM3"));

    let ports = windows_discovery(tree).list_ports().unwrap();
    let names: Vec<_> = ports.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["COM1", "COM3"]);
}

#[test]
fn test_all_classes_under_the_name_are_walked_in_order() {
    let mut tree = MemoryDeviceTree::new();
    let first = tree.add_class("Ports", "first");
    let second = tree.add_class("Ports", "second");
    tree.add_class("Modem", "modems");
    tree.add_member(&second, MemoryNode::new(r"ACPI\PNP0501\2").port_name("COM2"));
    tree.add_member(&first, MemoryNode::new(r"ACPI\PNP0501\9").port_name("COM9"));

    let discovery = windows_discovery(tree);
    let ports = discovery.list_ports().unwrap();
    let names: Vec<_> = ports.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["COM9", "COM2"]);
    assert_eq!(discovery.tree().sets_opened(), 2);
    assert_eq!(discovery.tree().sets_released(), 2);
}

#[test]
fn test_unknown_class_name_yields_empty_list() {
    let tree = MemoryDeviceTree::new();
    let ports = windows_discovery(tree).list_ports().unwrap();
    assert!(ports.is_empty());
}

// ============================================================================
// Class Set Release
// ============================================================================

#[test]
fn test_failing_class_aborts_and_releases_open_sets() {
    let mut tree = MemoryDeviceTree::new();
    let good = tree.add_class("Ports", "good");
    tree.add_failing_class("Ports", "broken");
    tree.add_member(&good, MemoryNode::new(r"ACPI\PNP0501\1").port_name("COM1"));

    let discovery = windows_discovery(tree);
    let err = discovery.list_ports().unwrap_err();
    assert!(matches!(err, PortError::EnumerationFailed(_)));
    assert_eq!(discovery.tree().sets_opened(), 1);
    assert_eq!(discovery.tree().sets_released(), 1);
}

#[test]
fn test_repeated_passes_release_every_set() {
    let discovery = windows_discovery(leonardo_tree(r"USB\VID_2341&PID_8036&MI_00\6&1&0&0000"));
    for _ in 0..3 {
        discovery.list_ports().unwrap();
    }
    assert_eq!(discovery.tree().sets_opened(), 3);
    assert_eq!(discovery.tree().sets_released(), 3);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn vid_and_pid_come_together(instance_id in "(USB|FTDIBUS|ACPI)\\\\[A-Za-z0-9_&+]{0,30}") {
        let mut tree = MemoryDeviceTree::new();
        let class = tree.add_class("Ports", PORTS_GUID);
        tree.add_member(&class, MemoryNode::new(instance_id).port_name("COM4"));

        let ports = windows_discovery(tree).list_ports().unwrap();
        prop_assert_eq!(ports.len(), 1);
        let port = &ports[0];
        prop_assert_eq!(port.vid().is_some(), port.pid().is_some());
        if let Some(usb) = &port.usb {
            prop_assert_eq!(usb.vid.len(), 4);
            prop_assert_eq!(usb.pid.len(), 4);
        }
    }

    #[test]
    fn filtered_names_never_appear(names in prop::collection::vec("(COM|LPT|CNCA)[0-9]{1,2}", 0..8)) {
        let mut tree = MemoryDeviceTree::new();
        let class = tree.add_class("Ports", PORTS_GUID);
        for (i, name) in names.iter().enumerate() {
            tree.add_member(&class, MemoryNode::new(format!(r"ACPI\PNP0501\{i}")).port_name(name.as_str()));
        }

        let ports = windows_discovery(tree).list_ports().unwrap();
        prop_assert!(ports.iter().all(|p| p.name.starts_with("COM")));
        let expected = names.iter().filter(|n| n.starts_with("COM")).count();
        prop_assert_eq!(ports.len(), expected);
    }
}
