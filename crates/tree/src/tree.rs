//! Arena of windowed tree nodes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use heapscope_core::{ChildrenProvider, Error, ItemsRange, Result, SortField};
use tracing::{debug, trace};

use crate::kind::{ChildIdentity, NodeKind};
use crate::window::RangeWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One node: its kind, its provider once expanded, and the window of
/// children retrieved from that provider.
pub struct WindowedTreeNode {
    kind: NodeKind,
    parent: Option<NodeId>,
    depth: usize,
    expanded: bool,
    cycle: bool,
    epoch: u64,
    pub(crate) provider: Option<Arc<dyn ChildrenProvider>>,
    pub(crate) children: RangeWindow<NodeId>,
}

impl WindowedTreeNode {
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub const fn depth(&self) -> usize {
        self.depth
    }

    pub const fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Whether this node stands for an object already on its ancestor chain.
    /// Cycle nodes are never expanded.
    pub const fn is_cycle(&self) -> bool {
        self.cycle
    }

    /// Generation of the node's population; bumped by collapse and re-sort.
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    pub const fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub const fn children(&self) -> &RangeWindow<NodeId> {
        &self.children
    }
}

impl fmt::Debug for WindowedTreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowedTreeNode")
            .field("kind", &self.kind.kind_name())
            .field("parent", &self.parent)
            .field("expanded", &self.expanded)
            .field("cycle", &self.cycle)
            .field("epoch", &self.epoch)
            .field("children", &self.children.retrieved_ranges())
            .finish_non_exhaustive()
    }
}

/// Nodes keyed by [`NodeId`], with parent pointers instead of shared
/// ownership.
#[derive(Debug)]
pub struct HeapTree {
    nodes: HashMap<NodeId, WindowedTreeNode>,
    next_id: u64,
    root: NodeId,
    sort: (SortField, bool),
}

impl HeapTree {
    /// A tree holding only `root`, which starts expanded.
    pub fn new(root: NodeKind) -> Self {
        let root_id = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root_id,
            WindowedTreeNode {
                kind: root,
                parent: None,
                depth: 0,
                expanded: true,
                cycle: false,
                epoch: 0,
                provider: None,
                children: RangeWindow::new(),
            },
        );
        Self {
            nodes,
            next_id: 1,
            root: root_id,
            sort: (SortField::RetainedSize, false),
        }
    }

    pub const fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&WindowedTreeNode> {
        self.nodes.get(&id)
    }

    pub fn node(&self, id: NodeId) -> Result<&WindowedTreeNode> {
        self.nodes.get(&id).ok_or(Error::NodeNotFound { node_id: id.0 })
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut WindowedTreeNode> {
        self.nodes
            .get_mut(&id)
            .ok_or(Error::NodeNotFound { node_id: id.0 })
    }

    /// Column and direction currently in effect.
    pub const fn sort(&self) -> (SortField, bool) {
        self.sort
    }

    pub(crate) fn set_sort(&mut self, column: SortField, ascending: bool) {
        self.sort = (column, ascending);
    }

    pub(crate) fn set_expanded(&mut self, id: NodeId, expanded: bool) -> Result<()> {
        self.node_mut(id)?.expanded = expanded;
        Ok(())
    }

    pub(crate) fn bump_epoch(&mut self, id: NodeId) -> Result<u64> {
        let node = self.node_mut(id)?;
        node.epoch += 1;
        Ok(node.epoch)
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.get(id).and_then(WindowedTreeNode::parent), |&current| {
            self.get(current).and_then(WindowedTreeNode::parent)
        })
    }

    /// Child retrieved at `position` under `id`.
    pub fn child_at(&self, id: NodeId, position: usize) -> Option<NodeId> {
        self.get(id)
            .and_then(|node| node.children.get(position))
            .copied()
    }

    /// Add a detached child node. It is only shown once its id is merged
    /// into the parent's window.
    pub(crate) fn add_child(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId> {
        let depth = self.node(parent)?.depth + 1;
        let cycle = kind.remote_object().is_some_and(|object| {
            std::iter::once(parent)
                .chain(self.ancestors(parent))
                .filter_map(|ancestor| self.get(ancestor))
                .any(|ancestor| ancestor.kind.remote_object() == Some(object))
        });
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            WindowedTreeNode {
                kind,
                parent: Some(parent),
                depth,
                expanded: false,
                cycle,
                epoch: 0,
                provider: None,
                children: RangeWindow::new(),
            },
        );
        Ok(id)
    }

    /// Merge a served range into `id`'s children if `epoch` is still
    /// current. Items whose identity is in `saved` reattach that subtree
    /// instead of creating a new node.
    ///
    /// Returns `None` for a stale range, which is dropped.
    pub(crate) fn merge_range(
        &mut self,
        id: NodeId,
        epoch: u64,
        range: ItemsRange,
        saved: &mut HashMap<ChildIdentity, NodeId>,
    ) -> Result<Option<usize>> {
        let node = self.node_mut(id)?;
        if node.epoch != epoch {
            trace!(node = %id, epoch, current = node.epoch, "Dropping stale range");
            return Ok(None);
        }
        let parent_kind = node.kind.clone();
        let mut window = std::mem::take(&mut node.children);

        let mut made = Vec::new();
        let merged = window.merge(
            range.start_position,
            range.end_position,
            range.total_length,
            range.items,
            |_, item| {
                let kind = parent_kind.create_child(item)?;
                let child = match kind.identity().and_then(|identity| saved.remove(&identity)) {
                    Some(existing) => existing,
                    None => self.add_child(id, kind)?,
                };
                made.push(child);
                Ok(child)
            },
        );

        self.node_mut(id)?.children = window;
        match merged {
            Ok(filled) => Ok(Some(filled)),
            Err(e) => {
                // Nothing made in this pass reached the window.
                let providers: Vec<_> = made
                    .into_iter()
                    .flat_map(|child| self.remove_subtree(child))
                    .collect();
                debug!(node = %id, released = providers.len(), error = %e, "Discarding partial merge");
                for provider in providers {
                    provider.dispose();
                }
                Err(e)
            }
        }
    }

    /// Empty `id`'s child window. Expanded children with an identity are
    /// kept in the arena and returned for reattachment; every other
    /// descendant is removed.
    pub(crate) fn detach_children(
        &mut self,
        id: NodeId,
    ) -> Result<(HashMap<ChildIdentity, NodeId>, Vec<Arc<dyn ChildrenProvider>>)> {
        let children = self.node_mut(id)?.children.clear();
        let mut saved = HashMap::new();
        let mut providers = Vec::new();
        for child in children {
            let keep = self
                .get(child)
                .filter(|node| node.expanded)
                .and_then(|node| node.kind.identity());
            match keep {
                Some(identity) => {
                    saved.insert(identity, child);
                }
                None => providers.extend(self.remove_subtree(child)),
            }
        }
        Ok((saved, providers))
    }

    /// Remove `id` and all of its descendants, returning their providers.
    pub(crate) fn remove_subtree(&mut self, id: NodeId) -> Vec<Arc<dyn ChildrenProvider>> {
        let mut providers = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(mut node) = self.nodes.remove(&current) {
                stack.extend(node.children.clear());
                providers.extend(node.provider.take());
            }
        }
        providers
    }

    /// Drop every node below the root and reset the root.
    pub(crate) fn clear(&mut self) -> Vec<Arc<dyn ChildrenProvider>> {
        let root = self.root;
        let mut providers = Vec::new();
        if let Ok(node) = self.node_mut(root) {
            node.epoch += 1;
            providers.extend(node.provider.take());
            let children = node.children.clear();
            for child in children {
                providers.extend(self.remove_subtree(child));
            }
        }
        providers
    }
}
