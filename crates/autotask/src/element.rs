//! Accessibility tree nodes as seen by the engine.
//!
//! A tree snapshot is a point-in-time copy of the active window. Nodes are shared
//! through `Arc`, children are owned by their parent and the parent link is a
//! non-owning `Weak`, so a located node can outlive its snapshot while the parent
//! link only resolves as long as the snapshot root is alive.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock, Weak};

use crate::errors::AutomationError;

/// A screen coordinate in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl FromStr for Point {
    type Err = AutomationError;

    /// Parses `"x,y"`, tolerating whitespace around each component.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 2 {
            return Err(AutomationError::InvalidArgument(format!(
                "Expected coordinates as 'x,y', got '{s}'"
            )));
        }
        let parse = |v: &str| {
            v.parse::<i32>().map_err(|_| {
                AutomationError::InvalidArgument(format!("Invalid coordinate '{v}' in '{s}'"))
            })
        };
        Ok(Point::new(parse(parts[0])?, parse(parts[1])?))
    }
}

/// Screen bounds of a node, edges in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.left + self.width() / 2,
            self.top + self.height() / 2,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x < self.right && point.y >= self.top && point.y < self.bottom
    }
}

/// Attributes read from a platform accessibility node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Full resource name, e.g. `com.example:id/login_button`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub bounds: Bounds,
    pub clickable: bool,
    pub long_clickable: bool,
    pub editable: bool,
    pub scrollable: bool,
    pub checkable: bool,
    pub checked: bool,
    pub enabled: bool,
    pub focusable: bool,
    pub selected: bool,
    pub visible: bool,
}

struct NodeInner {
    handle: u64,
    attributes: ElementAttributes,
    children: Vec<ElementNode>,
    parent: OnceLock<Weak<NodeInner>>,
}

/// A node of a tree snapshot. Cloning is cheap and shares the node.
#[derive(Clone)]
pub struct ElementNode(Arc<NodeInner>);

impl ElementNode {
    pub fn new(attributes: ElementAttributes, children: Vec<ElementNode>) -> Self {
        Self::with_handle(0, attributes, children)
    }

    /// Build a node carrying a platform handle. The handle is opaque to the engine
    /// core and only meaningful to the `AccessibilityEngine` that produced it.
    pub fn with_handle(handle: u64, attributes: ElementAttributes, children: Vec<ElementNode>) -> Self {
        let node = ElementNode(Arc::new(NodeInner {
            handle,
            attributes,
            children,
            parent: OnceLock::new(),
        }));
        for child in &node.0.children {
            // A node adopted twice keeps its first parent.
            let _ = child.0.parent.set(Arc::downgrade(&node.0));
        }
        node
    }

    pub fn handle(&self) -> u64 {
        self.0.handle
    }

    pub fn attributes(&self) -> &ElementAttributes {
        &self.0.attributes
    }

    pub fn children(&self) -> &[ElementNode] {
        &self.0.children
    }

    /// Parent node, if the snapshot that owns it is still alive.
    pub fn parent(&self) -> Option<ElementNode> {
        self.0.parent.get().and_then(Weak::upgrade).map(ElementNode)
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(node) = current {
            depth += 1;
            current = node.parent();
        }
        depth
    }

    pub fn package_name(&self) -> Option<&str> {
        self.0.attributes.package_name.as_deref()
    }

    pub fn class_name(&self) -> Option<&str> {
        self.0.attributes.class_name.as_deref()
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.0.attributes.resource_id.as_deref()
    }

    /// Resource id without its `package:id/` prefix.
    pub fn short_id(&self) -> Option<&str> {
        self.resource_id()
            .map(|id| id.rsplit_once('/').map_or(id, |(_, suffix)| suffix))
    }

    pub fn text(&self) -> Option<&str> {
        self.0.attributes.text.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.0.attributes.description.as_deref()
    }

    pub fn bounds(&self) -> Bounds {
        self.0.attributes.bounds
    }

    pub fn is_clickable(&self) -> bool {
        self.0.attributes.clickable
    }

    pub fn is_editable(&self) -> bool {
        self.0.attributes.editable
    }

    pub fn is_scrollable(&self) -> bool {
        self.0.attributes.scrollable
    }

    pub fn is_checked(&self) -> bool {
        self.0.attributes.checked
    }

    /// Whether both values refer to the same snapshot node.
    pub fn ptr_eq(&self, other: &ElementNode) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Depth-first, pre-order search for the first node satisfying `predicate`.
    pub fn find_first<F>(&self, predicate: &F) -> Option<ElementNode>
    where
        F: Fn(&ElementNode) -> bool,
    {
        self.pre_order().find(|node| predicate(*node)).cloned()
    }

    /// Depth-first, pre-order collection of every node satisfying `predicate`.
    pub fn find_all<F>(&self, predicate: &F) -> Vec<ElementNode>
    where
        F: Fn(&ElementNode) -> bool,
    {
        self.pre_order()
            .filter(|node| predicate(*node))
            .cloned()
            .collect()
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        self.pre_order().count()
    }

    /// Pre-order walk over this subtree on an explicit stack, so arbitrarily
    /// deep trees do not exhaust the call stack.
    pub fn pre_order(&self) -> PreOrder<'_> {
        PreOrder { stack: vec![self] }
    }

    pub fn to_serializable(&self) -> SerializableElement {
        let mut parents: Vec<(&ElementNode, Vec<SerializableElement>)> = Vec::new();
        let mut current = (self, Vec::with_capacity(self.0.children.len()));
        loop {
            let source = current.0;
            if let Some(child) = source.0.children.get(current.1.len()) {
                let next = (child, Vec::with_capacity(child.0.children.len()));
                parents.push(std::mem::replace(&mut current, next));
                continue;
            }
            let (source, children) = current;
            let element = SerializableElement {
                handle: source.0.handle,
                attributes: source.0.attributes.clone(),
                children,
            };
            match parents.pop() {
                Some(mut parent) => {
                    parent.1.push(element);
                    current = parent;
                }
                None => return element,
            }
        }
    }
}

impl Drop for NodeInner {
    // Unlinks uniquely owned descendants one by one instead of recursively.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(child) = pending.pop() {
            if let Ok(mut inner) = Arc::try_unwrap(child.0) {
                pending.append(&mut inner.children);
            }
        }
    }
}

/// Iterator returned by [`ElementNode::pre_order`].
pub struct PreOrder<'a> {
    stack: Vec<&'a ElementNode>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a ElementNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.0.children.iter().rev());
        Some(node)
    }
}

impl fmt::Debug for ElementNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementNode")
            .field("handle", &self.0.handle)
            .field("class_name", &self.class_name())
            .field("resource_id", &self.resource_id())
            .field("text", &self.text())
            .field("description", &self.description())
            .field("bounds", &self.bounds())
            .field("children", &self.0.children.len())
            .finish()
    }
}

/// Owned, serializable mirror of an element subtree, used for fixtures and dumps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializableElement {
    #[serde(default)]
    pub handle: u64,
    #[serde(flatten)]
    pub attributes: ElementAttributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SerializableElement>,
}

impl From<&SerializableElement> for ElementNode {
    fn from(element: &SerializableElement) -> Self {
        let mut parents: Vec<(&SerializableElement, Vec<ElementNode>)> = Vec::new();
        let mut current = (element, Vec::with_capacity(element.children.len()));
        loop {
            let source = current.0;
            if let Some(child) = source.children.get(current.1.len()) {
                let next = (child, Vec::with_capacity(child.children.len()));
                parents.push(std::mem::replace(&mut current, next));
                continue;
            }
            let (source, children) = current;
            let node = ElementNode::with_handle(source.handle, source.attributes.clone(), children);
            match parents.pop() {
                Some(mut parent) => {
                    parent.1.push(node);
                    current = parent;
                }
                None => return node,
            }
        }
    }
}

impl Drop for SerializableElement {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut child) = pending.pop() {
            pending.append(&mut child.children);
        }
    }
}

impl From<SerializableElement> for ElementNode {
    fn from(element: SerializableElement) -> Self {
        ElementNode::from(&element)
    }
}
