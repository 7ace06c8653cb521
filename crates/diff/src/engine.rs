//! Per-class comparison of two snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;

use heapscope_core::{
    Comparator, DiffAggregate, DiffForClass, Item, LocalProvider, Result, SnapshotSource,
    SortField,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::combined::CombinedDiffProvider;

/// Column totals over every changed class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffTotals {
    pub added_count: u64,
    pub removed_count: u64,
    pub added_size: u64,
    pub removed_size: u64,
}

impl DiffTotals {
    pub fn count_delta(&self) -> i64 {
        signed(self.added_count) - signed(self.removed_count)
    }

    pub fn size_delta(&self) -> i64 {
        signed(self.added_size) - signed(self.removed_size)
    }
}

fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

/// Diff of `target` against `base`, one row per changed class.
pub struct DiffEngine {
    base: Arc<dyn SnapshotSource>,
    target: Arc<dyn SnapshotSource>,
    base_uid: u64,
    rows: Vec<DiffAggregate>,
}

impl DiffEngine {
    /// Summarize the base, have the target's worker diff against that
    /// summary, and keep the changed classes sorted by name.
    #[instrument(skip_all)]
    pub async fn compute(
        base: Arc<dyn SnapshotSource>,
        target: Arc<dyn SnapshotSource>,
    ) -> Result<Self> {
        let base_uid = base.uid().await?;
        let summary = base.aggregates_for_diff().await?;
        let diffs = target.calculate_snapshot_diff(base_uid, &summary).await?;
        let rows = build_rows(diffs);
        debug!(base_uid, classes = rows.len(), "Diff computed");
        Ok(Self {
            base,
            target,
            base_uid,
            rows,
        })
    }

    pub const fn base_uid(&self) -> u64 {
        self.base_uid
    }

    /// Rows sorted by class name.
    pub fn rows(&self) -> &[DiffAggregate] {
        &self.rows
    }

    pub fn get(&self, class_name: &str) -> Option<&DiffAggregate> {
        self.rows
            .binary_search_by(|row| row.name().cmp(class_name))
            .ok()
            .and_then(|index| self.rows.get(index))
    }

    /// Rows ordered by `column`, ties broken by name.
    pub fn sorted_by(&self, column: SortField, ascending: bool) -> Vec<DiffAggregate> {
        let comparator = Comparator::new(column, ascending, SortField::Name, true);
        let mut items: Vec<Item> = self.rows.iter().cloned().map(Item::DiffClass).collect();
        items.sort_by(|a, b| comparator.compare(a, b));
        items
            .into_iter()
            .filter_map(|item| match item {
                Item::DiffClass(row) => Some(row),
                _ => None,
            })
            .collect()
    }

    pub fn totals(&self) -> DiffTotals {
        self.rows.iter().fold(DiffTotals::default(), |acc, row| DiffTotals {
            added_count: acc.added_count + row.added_count(),
            removed_count: acc.removed_count + row.removed_count(),
            added_size: acc.added_size + row.added_size(),
            removed_size: acc.removed_size + row.removed_size(),
        })
    }

    /// Local provider over the class rows, for the root of a diff tree.
    pub fn summary_provider(&self) -> LocalProvider {
        LocalProvider::new(self.rows.iter().cloned().map(Item::DiffClass).collect())
    }

    /// Added-then-removed objects of one class, or `None` when the class did
    /// not change.
    pub fn provider_for(&self, class_name: &str) -> Result<Option<CombinedDiffProvider>> {
        let Some(row) = self.get(class_name) else {
            return Ok(None);
        };
        let added = self
            .target
            .create_added_nodes_provider(self.base_uid, class_name)?;
        let deleted = self.base.create_deleted_nodes_provider(row.deleted_indexes())?;
        Ok(Some(CombinedDiffProvider::new(
            added,
            deleted,
            to_usize(row.added_count()),
            to_usize(row.removed_count()),
        )))
    }
}

fn build_rows(diffs: BTreeMap<String, DiffForClass>) -> Vec<DiffAggregate> {
    diffs
        .into_values()
        .map(|diff| {
            DiffAggregate::new(
                diff.name,
                diff.added_count,
                diff.removed_count,
                diff.added_size,
                diff.removed_size,
                diff.deleted_indexes,
            )
        })
        .filter(DiffAggregate::has_changes)
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn diff(name: &str, added: u64, removed: u64) -> (String, DiffForClass) {
        (
            name.to_string(),
            DiffForClass {
                name: name.to_string(),
                added_count: added,
                removed_count: removed,
                added_size: added * 8,
                removed_size: removed * 16,
                deleted_indexes: (0..removed).map(|i| i as usize).collect(),
                added_indexes: (0..added).map(|i| i as usize).collect(),
            },
        )
    }

    #[test]
    fn test_unchanged_classes_are_dropped() {
        let rows = build_rows(
            [diff("Zeta", 2, 0), diff("Same", 0, 0), diff("Alpha", 0, 3)]
                .into_iter()
                .collect(),
        );
        let names: Vec<&str> = rows.iter().map(DiffAggregate::name).collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
        assert_eq!(rows[0].count_delta(), -3);
        assert_eq!(rows[1].size_delta(), 16);
    }

    #[test]
    fn test_totals_deltas_are_signed() {
        let totals = DiffTotals {
            added_count: 1,
            removed_count: 4,
            added_size: 100,
            removed_size: 10,
        };
        assert_eq!(totals.count_delta(), -3);
        assert_eq!(totals.size_delta(), 90);
    }
}
