//! Components and the ownership tree they are attached to.

use crate::channel::Channel;
use crate::handler::Handler;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier of an attached component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub(crate) u64);

impl ComponentId {
    /// The manager itself. Owns internal handlers; never part of the tree.
    pub const ROOT: ComponentId = ComponentId(0);

    /// Raw numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A component definition: a channel identity, its handlers and its
/// children. Inert until attached to a [`crate::Manager`].
///
/// ```rust
/// use switchboard_core::{Component, Handler, Reply};
///
/// let app = Component::new("app")
///     .with_channel("app")
///     .with_handler(Handler::on("hello", |_, _| Ok(Reply::from("Hello World!"))))
///     .with_child(Component::new("worker"));
///
/// assert_eq!(app.handlers().len(), 1);
/// assert_eq!(app.children().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Component {
    name: String,
    channel: Channel,
    handlers: Vec<Handler>,
    children: Vec<Component>,
}

impl Component {
    /// Create a component on the wildcard channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel: Channel::Any,
            handlers: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Set the component's own channel.
    pub fn with_channel(mut self, channel: impl Into<Channel>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Add a handler.
    pub fn with_handler(mut self, handler: Handler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Add several handlers, in order.
    pub fn with_handlers(mut self, handlers: impl IntoIterator<Item = Handler>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    /// Add a child component.
    pub fn with_child(mut self, child: Component) -> Self {
        self.children.push(child);
        self
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Own channel
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Declared handlers
    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    /// Child definitions
    pub fn children(&self) -> &[Component] {
        &self.children
    }

    pub(crate) fn into_parts(self) -> (String, Channel, Vec<Handler>, Vec<Component>) {
        (self.name, self.channel, self.handlers, self.children)
    }
}

/// Read-only view of an attached component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Id
    pub id: ComponentId,
    /// Name
    pub name: String,
    /// Own channel
    pub channel: Channel,
    /// Parent, `None` for top-level components
    pub parent: Option<ComponentId>,
    /// Children in attachment order
    pub children: Vec<ComponentId>,
}

#[derive(Debug)]
struct Node {
    name: String,
    channel: Channel,
    parent: Option<ComponentId>,
    children: Vec<ComponentId>,
}

/// Parent/child graph of attached components.
#[derive(Debug)]
pub(crate) struct ComponentTree {
    nodes: HashMap<ComponentId, Node>,
    roots: Vec<ComponentId>,
    next_id: u64,
}

impl Default for ComponentTree {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
            next_id: 1,
        }
    }
}

impl ComponentTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert a node under `parent` (top level when `None`).
    ///
    /// The parent must already be in the tree.
    pub(crate) fn insert(
        &mut self,
        parent: Option<ComponentId>,
        name: String,
        channel: Channel,
    ) -> Option<ComponentId> {
        if let Some(parent) = parent {
            if !self.nodes.contains_key(&parent) {
                return None;
            }
        }

        let id = ComponentId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                name,
                channel,
                parent,
                children: Vec::new(),
            },
        );
        match parent.and_then(|p| self.nodes.get_mut(&p)) {
            Some(node) => node.children.push(id),
            None => self.roots.push(id),
        }
        Some(id)
    }

    /// Remove `id` and its whole subtree. Returns the removed ids,
    /// parents before children; empty when `id` is not attached.
    pub(crate) fn remove(&mut self, id: ComponentId) -> Vec<ComponentId> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        match node.parent.and_then(|p| self.nodes.get_mut(&p)) {
            Some(parent) => parent.children.retain(|c| *c != id),
            None => self.roots.retain(|r| *r != id),
        }

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                stack.extend(node.children.iter().rev());
                removed.push(next);
            }
        }
        removed
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: ComponentId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub(crate) fn info(&self, id: ComponentId) -> Option<ComponentInfo> {
        self.nodes.get(&id).map(|node| ComponentInfo {
            id,
            name: node.name.clone(),
            channel: node.channel.clone(),
            parent: node.parent,
            children: node.children.clone(),
        })
    }

    pub(crate) fn name_of(&self, id: ComponentId) -> Option<&str> {
        self.nodes.get(&id).map(|node| node.name.as_str())
    }

    pub(crate) fn channel_of(&self, id: ComponentId) -> Option<&Channel> {
        self.nodes.get(&id).map(|node| &node.channel)
    }

    pub(crate) fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    pub(crate) fn children(&self, id: ComponentId) -> Vec<ComponentId> {
        self.nodes
            .get(&id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    /// Top-level ancestor of `id`.
    pub(crate) fn root_of(&self, id: ComponentId) -> Option<ComponentId> {
        let mut current = id;
        let mut node = self.nodes.get(&current)?;
        while let Some(parent) = node.parent {
            current = parent;
            node = self.nodes.get(&current)?;
        }
        Some(current)
    }

    /// Top-level components in attachment order.
    pub(crate) fn roots(&self) -> &[ComponentId] {
        &self.roots
    }

    /// Distinct own channels of every attached component.
    pub(crate) fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.nodes.values().map(|n| n.channel.clone()).collect();
        channels.sort();
        channels.dedup();
        channels
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_children() -> (ComponentTree, ComponentId, ComponentId, ComponentId) {
        let mut tree = ComponentTree::new();
        let app = tree.insert(None, "app".into(), Channel::from("app")).unwrap();
        let child = tree.insert(Some(app), "child".into(), Channel::from("child")).unwrap();
        let grandchild = tree
            .insert(Some(child), "grandchild".into(), Channel::from("app"))
            .unwrap();
        (tree, app, child, grandchild)
    }

    #[test]
    fn test_insert_links_parent_and_children() {
        let (tree, app, child, grandchild) = tree_with_children();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.children(app), vec![child]);
        assert_eq!(tree.parent(grandchild), Some(child));
        assert_eq!(tree.root_of(grandchild), Some(app));
        assert_eq!(tree.roots(), &[app]);
        assert_ne!(app, ComponentId::ROOT);
    }

    #[test]
    fn test_insert_under_unknown_parent_fails() {
        let mut tree = ComponentTree::new();
        assert!(tree.insert(Some(ComponentId(42)), "x".into(), Channel::Any).is_none());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_remove_takes_subtree() {
        let (mut tree, app, child, grandchild) = tree_with_children();
        let removed = tree.remove(child);
        assert_eq!(removed, vec![child, grandchild]);
        assert!(tree.children(app).is_empty());
        assert!(!tree.contains(grandchild));
        assert!(tree.remove(child).is_empty());
    }

    #[test]
    fn test_channels_are_distinct() {
        let (tree, ..) = tree_with_children();
        assert_eq!(
            tree.channels(),
            vec![Channel::from("app"), Channel::from("child")]
        );
    }

    #[test]
    fn test_info_view() {
        let (tree, app, child, _) = tree_with_children();
        let info = tree.info(app).unwrap();
        assert_eq!(info.name, "app");
        assert_eq!(info.parent, None);
        assert_eq!(info.children, vec![child]);
        assert_eq!(tree.name_of(child), Some("child"));
        assert_eq!(tree.channel_of(child), Some(&Channel::from("child")));
    }
}
