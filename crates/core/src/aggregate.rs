//! Per-class summaries, diff tables and the small request types that go with
//! them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::SnapshotObjectId;

/// Per-class summary of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Class name.
    pub name: String,
    /// Number of instances.
    pub count: u64,
    /// Sum of shallow sizes.
    pub self_size: u64,
    /// Largest retained size of a single instance.
    pub max_retained_size: u64,
    /// Smallest distance of an instance from the root.
    pub distance: u32,
}

/// Compact per-class summary used as diff input.
///
/// The three vectors are parallel and sorted by object id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateForDiff {
    pub indexes: Vec<usize>,
    pub ids: Vec<SnapshotObjectId>,
    pub self_sizes: Vec<u64>,
}

/// Per-class diff as computed by the target snapshot's worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffForClass {
    pub name: String,
    pub added_count: u64,
    pub removed_count: u64,
    pub added_size: u64,
    pub removed_size: u64,
    /// Node indexes in the base snapshot of the removed objects.
    pub deleted_indexes: Vec<usize>,
    /// Node indexes in the target snapshot of the added objects.
    pub added_indexes: Vec<usize>,
}

/// Immutable per-class diff row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffAggregate {
    name: String,
    added_count: u64,
    removed_count: u64,
    added_size: u64,
    removed_size: u64,
    deleted_indexes: Vec<usize>,
}

impl DiffAggregate {
    /// Create a diff row.
    pub const fn new(
        name: String,
        added_count: u64,
        removed_count: u64,
        added_size: u64,
        removed_size: u64,
        deleted_indexes: Vec<usize>,
    ) -> Self {
        Self {
            name,
            added_count,
            removed_count,
            added_size,
            removed_size,
            deleted_indexes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn added_count(&self) -> u64 {
        self.added_count
    }

    pub const fn removed_count(&self) -> u64 {
        self.removed_count
    }

    pub const fn added_size(&self) -> u64 {
        self.added_size
    }

    pub const fn removed_size(&self) -> u64 {
        self.removed_size
    }

    /// Base-snapshot node indexes of the removed objects.
    pub fn deleted_indexes(&self) -> &[usize] {
        &self.deleted_indexes
    }

    /// `added_count - removed_count`.
    pub fn count_delta(&self) -> i64 {
        signed(self.added_count) - signed(self.removed_count)
    }

    /// `added_size - removed_size`.
    pub fn size_delta(&self) -> i64 {
        signed(self.added_size) - signed(self.removed_size)
    }

    /// Number of rows the combined added/removed listing has.
    pub const fn total_count(&self) -> u64 {
        self.added_count.saturating_add(self.removed_count)
    }

    /// Whether anything changed for this class.
    pub const fn has_changes(&self) -> bool {
        self.added_count > 0 || self.removed_count > 0
    }
}

fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Restricts which objects participate in an aggregate or listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeFilter {
    /// Only objects with id greater than this.
    pub min_node_id: Option<SnapshotObjectId>,
    /// Only objects with id at most this.
    pub max_node_id: Option<SnapshotObjectId>,
    /// Only objects allocated at this allocation trace node.
    pub allocation_node_id: Option<u32>,
}

impl NodeFilter {
    /// Filter that keeps everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter for objects allocated at one allocation site.
    pub fn allocation(trace_node_id: u32) -> Self {
        Self {
            allocation_node_id: Some(trace_node_id),
            ..Self::default()
        }
    }

    /// Filter for objects allocated between two snapshots' id watermarks.
    pub fn id_range(min: Option<SnapshotObjectId>, max: Option<SnapshotObjectId>) -> Self {
        Self {
            min_node_id: min,
            max_node_id: max,
            allocation_node_id: None,
        }
    }

    /// Whether an object id passes the id bounds.
    pub fn accepts_id(&self, id: SnapshotObjectId) -> bool {
        self.min_node_id.is_none_or(|min| id > min) && self.max_node_id.is_none_or(|max| id <= max)
    }

    /// Whether the filter restricts anything.
    pub const fn is_empty(&self) -> bool {
        self.min_node_id.is_none() && self.max_node_id.is_none() && self.allocation_node_id.is_none()
    }
}

/// Text search over object names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub query: String,
    pub case_sensitive: bool,
    pub is_regex: bool,
}

impl SearchConfig {
    /// Case-insensitive substring search.
    pub fn substring(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            case_sensitive: false,
            is_regex: false,
        }
    }
}

/// Size breakdown of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_size: u64,
    pub node_count: usize,
    pub edge_count: usize,
    /// Shallow size per node type.
    pub by_type: BTreeMap<String, u64>,
}

/// Allocation timeline samples recorded with the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Samples {
    pub timestamps: Vec<u64>,
    pub last_assigned_ids: Vec<SnapshotObjectId>,
    pub sizes: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_aggregate_deltas() {
        let diff = DiffAggregate::new("Array".to_string(), 3, 5, 300, 120, vec![1, 2, 3, 4, 5]);
        assert_eq!(diff.count_delta(), -2);
        assert_eq!(diff.size_delta(), 180);
        assert_eq!(diff.total_count(), 8);
        assert!(diff.has_changes());

        let unchanged = DiffAggregate::new("Object".to_string(), 0, 0, 0, 0, Vec::new());
        assert!(!unchanged.has_changes());
    }

    #[test]
    fn test_node_filter_id_bounds() {
        let filter = NodeFilter::id_range(Some(10), Some(20));
        assert!(!filter.accepts_id(10));
        assert!(filter.accepts_id(11));
        assert!(filter.accepts_id(20));
        assert!(!filter.accepts_id(21));

        assert!(NodeFilter::all().accepts_id(0));
        assert!(NodeFilter::all().is_empty());
        assert!(!NodeFilter::allocation(4).is_empty());
    }
}
