//! In-memory device tree
//!
//! A scripted [`DeviceTree`] for exercising discovery without hardware:
//! nodes, parents and property values are declared up front, and the tree
//! counts how many class sets were opened and released.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::tree::{ClassId, DeviceSet, DeviceTree, PropertyKey, RegistryProperty, TreeError};

/// Handle to a node added to a [`MemoryDeviceTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Declaration of one device node
#[derive(Debug, Clone, Default)]
pub struct MemoryNode {
    instance_id: Option<String>,
    parent: Option<NodeId>,
    properties: HashMap<PropertyKey, Vec<u8>>,
}

impl MemoryNode {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: Some(instance_id.into()),
            ..Default::default()
        }
    }

    /// A node whose instance id cannot be read
    pub fn without_instance_id() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set a property value. Stored NUL-terminated, the way the registry
    /// returns strings.
    pub fn property(mut self, key: impl Into<PropertyKey>, value: impl Into<String>) -> Self {
        let mut bytes = value.into().into_bytes();
        bytes.push(0);
        self.properties.insert(key.into(), bytes);
        self
    }

    pub fn port_name(self, name: impl Into<String>) -> Self {
        self.property(PropertyKey::PortName, name)
    }

    pub fn friendly_name(self, name: impl Into<String>) -> Self {
        self.property(RegistryProperty::FriendlyName, name)
    }

    pub fn manufacturer(self, name: impl Into<String>) -> Self {
        self.property(RegistryProperty::Mfg, name)
    }
}

#[derive(Debug, Clone, Copy)]
enum Member {
    Node(NodeId),
    Unreadable,
}

/// Scripted device tree
#[derive(Debug, Default)]
pub struct MemoryDeviceTree {
    classes: Vec<(String, ClassId)>,
    members: HashMap<ClassId, Vec<Member>>,
    failing: HashSet<ClassId>,
    nodes: Vec<MemoryNode>,
    opened: AtomicUsize,
    released: AtomicUsize,
}

impl MemoryDeviceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class id under a class name. A name may map to several ids.
    pub fn add_class(&mut self, name: &str, id: &str) -> ClassId {
        let id = ClassId::new(id);
        self.classes.push((name.to_string(), id.clone()));
        self.members.entry(id.clone()).or_default();
        id
    }

    /// A class whose set cannot be opened
    pub fn add_failing_class(&mut self, name: &str, id: &str) -> ClassId {
        let id = self.add_class(name, id);
        self.failing.insert(id.clone());
        id
    }

    /// Add a node that belongs to no class (a parent, typically)
    pub fn add_node(&mut self, node: MemoryNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Add a node as the next member of `class`
    pub fn add_member(&mut self, class: &ClassId, node: MemoryNode) -> NodeId {
        let id = self.add_node(node);
        self.members
            .entry(class.clone())
            .or_default()
            .push(Member::Node(id));
        id
    }

    /// Add a class entry that fails to enumerate
    pub fn add_unreadable_member(&mut self, class: &ClassId) {
        self.members
            .entry(class.clone())
            .or_default()
            .push(Member::Unreadable);
    }

    /// Number of class sets opened so far
    pub fn sets_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of class sets released so far
    pub fn sets_released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn lookup(&self, id: NodeId) -> Result<&MemoryNode, TreeError> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| TreeError::Unreadable(format!("node {} does not exist", id.0)))
    }
}

/// Class set over a [`MemoryDeviceTree`]; counts its release on drop
pub struct MemorySet<'a> {
    tree: &'a MemoryDeviceTree,
    members: &'a [Member],
}

impl DeviceSet for MemorySet<'_> {
    type Node = NodeId;

    fn node(&self, index: u32) -> Result<Option<NodeId>, TreeError> {
        match self.members.get(index as usize) {
            None => Ok(None),
            Some(Member::Node(id)) => Ok(Some(*id)),
            Some(Member::Unreadable) => Err(TreeError::Unreadable(format!(
                "entry {index} could not be enumerated"
            ))),
        }
    }
}

impl Drop for MemorySet<'_> {
    fn drop(&mut self) {
        self.tree.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl DeviceTree for MemoryDeviceTree {
    type Node = NodeId;
    type Set<'a> = MemorySet<'a>;

    fn class_ids(&self, class_name: &str) -> Result<Vec<ClassId>, TreeError> {
        Ok(self
            .classes
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(class_name))
            .map(|(_, id)| id.clone())
            .collect())
    }

    fn open_class(&self, class: &ClassId) -> Result<MemorySet<'_>, TreeError> {
        if self.failing.contains(class) {
            return Err(TreeError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("class {class} cannot be opened"),
            )));
        }
        let members = self
            .members
            .get(class)
            .ok_or_else(|| TreeError::UnknownClass(class.to_string()))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySet {
            tree: self,
            members,
        })
    }

    fn instance_id(&self, node: &NodeId) -> Result<String, TreeError> {
        self.lookup(*node)?
            .instance_id
            .clone()
            .ok_or_else(|| TreeError::Unreadable("instance id unavailable".into()))
    }

    fn parent(&self, node: &NodeId) -> Result<NodeId, TreeError> {
        self.lookup(*node)?.parent.ok_or(TreeError::NoParent)
    }

    fn read_property(
        &self,
        node: &NodeId,
        key: PropertyKey,
        buf: &mut [u8],
    ) -> Result<usize, TreeError> {
        let value = self
            .lookup(*node)?
            .properties
            .get(&key)
            .ok_or(TreeError::MissingProperty(key))?;
        if buf.len() < value.len() {
            return Err(TreeError::InsufficientBuffer {
                required: value.len(),
            });
        }
        buf[..value.len()].copy_from_slice(value);
        Ok(value.len())
    }
}
