//! Data model shared by the foreground explorer and the background worker.
//!
//! Everything in here crosses the call channel, so every type is
//! `Serialize + Deserialize`.

use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, DiffAggregate};
use crate::error::Error;
use crate::result::Result;

/// Heap object id. Stable across snapshots taken from the same program,
/// which is what makes cross-snapshot diffs possible.
pub type SnapshotObjectId = u64;

/// A heap object as seen by the explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Snapshot object id.
    pub id: SnapshotObjectId,
    /// Class (constructor) name.
    pub name: String,
    /// Node type (`object`, `closure`, `string`, ...).
    pub node_type: String,
    /// Index of the node inside its snapshot. Only meaningful to the worker
    /// that owns the snapshot.
    pub node_index: usize,
    /// Shallow size in bytes.
    pub self_size: u64,
    /// Retained size in bytes.
    pub retained_size: u64,
    /// Distance from the GC root, `u32::MAX` when unreachable.
    pub distance: u32,
}

/// A reference between two heap objects.
///
/// For outgoing edges `node` is the referenced object; for retaining edges it
/// is the retainer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Property name or element index.
    pub name: String,
    /// Edge type (`property`, `element`, `internal`, ...).
    pub edge_type: String,
    /// Index of the edge inside its snapshot.
    pub edge_index: usize,
    /// Node on the other end of the edge.
    pub node: NodeRecord,
}

/// Which snapshot a diff item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiffSide {
    /// Present in the target snapshot only; owned by the target.
    Added,
    /// Present in the base snapshot only; owned by the base.
    Removed,
}

/// One element served by a children provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    /// A heap object (class instances, allocation sites).
    Node(NodeRecord),
    /// An outgoing or retaining edge.
    Edge(EdgeRecord),
    /// A heap object served by a diff provider, flagged with its side.
    DiffNode { side: DiffSide, node: NodeRecord },
    /// A per-class aggregate row.
    Class(Aggregate),
    /// A per-class diff row.
    DiffClass(DiffAggregate),
}

impl Item {
    /// The heap object carried by this item, if any.
    pub const fn node(&self) -> Option<&NodeRecord> {
        match self {
            Self::Node(node) | Self::DiffNode { node, .. } => Some(node),
            Self::Edge(edge) => Some(&edge.node),
            Self::Class(_) | Self::DiffClass(_) => None,
        }
    }

    /// Display name of the item.
    pub fn name(&self) -> &str {
        match self {
            Self::Node(node) | Self::DiffNode { node, .. } => &node.name,
            Self::Edge(edge) => &edge.name,
            Self::Class(aggregate) => &aggregate.name,
            Self::DiffClass(diff) => diff.name(),
        }
    }

    /// Snapshot object id of the carried heap object.
    pub fn object_id(&self) -> Option<SnapshotObjectId> {
        self.node().map(|node| node.id)
    }
}

/// A contiguous window `[start_position, end_position)` of a provider's
/// ordered collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemsRange {
    pub start_position: usize,
    pub end_position: usize,
    pub total_length: usize,
    pub items: Vec<Item>,
}

impl ItemsRange {
    /// Create a range, validating its invariants.
    pub fn new(
        start_position: usize,
        end_position: usize,
        total_length: usize,
        items: Vec<Item>,
    ) -> Result<Self> {
        let range = Self {
            start_position,
            end_position,
            total_length,
            items,
        };
        range.validate()?;
        Ok(range)
    }

    /// An empty range positioned at `position`.
    pub const fn empty(position: usize, total_length: usize) -> Self {
        Self {
            start_position: position,
            end_position: position,
            total_length,
            items: Vec::new(),
        }
    }

    /// Check `0 <= start <= end <= total` and `items.len() == end - start`.
    pub fn validate(&self) -> Result<()> {
        if self.start_position > self.end_position {
            return Err(self.invalid("start after end"));
        }
        if self.end_position > self.total_length {
            return Err(self.invalid("end beyond total length"));
        }
        if self.items.len() != self.end_position - self.start_position {
            return Err(self.invalid(format!(
                "carries {} items for a window of {}",
                self.items.len(),
                self.end_position - self.start_position
            )));
        }
        Ok(())
    }

    /// Number of items in the window.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::invalid_range(
            self.start_position,
            self.end_position,
            self.total_length,
            reason,
        )
    }
}
