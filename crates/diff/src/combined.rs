//! Added-then-removed view over two providers from two snapshots.

use std::sync::Arc;

use async_trait::async_trait;
use heapscope_core::{
    ChildrenProvider, Comparator, DiffSide, Item, ItemsRange, Result, SnapshotObjectId,
};
use tracing::trace;

/// Serves positions `[0, added)` from the target's added objects and
/// `[added, added + removed)` from the base's deleted objects, flagging each
/// item with its side.
pub struct CombinedDiffProvider {
    added: Arc<dyn ChildrenProvider>,
    deleted: Arc<dyn ChildrenProvider>,
    added_count: usize,
    removed_count: usize,
}

impl CombinedDiffProvider {
    pub fn new(
        added: Arc<dyn ChildrenProvider>,
        deleted: Arc<dyn ChildrenProvider>,
        added_count: usize,
        removed_count: usize,
    ) -> Self {
        Self {
            added,
            deleted,
            added_count,
            removed_count,
        }
    }

    pub const fn total_length(&self) -> usize {
        self.added_count + self.removed_count
    }
}

fn flag(item: Item, side: DiffSide) -> Item {
    match item {
        Item::Node(node) | Item::DiffNode { node, .. } => Item::DiffNode { side, node },
        Item::Edge(edge) => Item::DiffNode {
            side,
            node: edge.node,
        },
        other => other,
    }
}

#[async_trait]
impl ChildrenProvider for CombinedDiffProvider {
    async fn sort_and_rewind(&self, comparator: &Comparator) -> Result<()> {
        futures::try_join!(
            self.added.sort_and_rewind(comparator),
            self.deleted.sort_and_rewind(comparator)
        )?;
        Ok(())
    }

    async fn serialize_items_range(&self, start: usize, end: usize) -> Result<ItemsRange> {
        let total_length = self.total_length();
        trace!(start, end, total_length, "Serializing diff range");

        let (mut combined, deleted) = if start < self.added_count {
            let added = self.added.serialize_items_range(start, end).await?;
            let mut combined = ItemsRange {
                start_position: added.start_position,
                end_position: added.end_position,
                total_length,
                items: added
                    .items
                    .into_iter()
                    .map(|item| flag(item, DiffSide::Added))
                    .collect(),
            };
            if combined.end_position >= end {
                combined.validate()?;
                return Ok(combined);
            }
            let deleted = self
                .deleted
                .serialize_items_range(0, end - combined.end_position)
                .await?;
            combined.end_position = self.added_count;
            (combined, deleted)
        } else {
            let deleted = self
                .deleted
                .serialize_items_range(start - self.added_count, end.saturating_sub(self.added_count))
                .await?;
            (ItemsRange::empty(0, total_length), deleted)
        };

        if combined.items.is_empty() {
            combined.start_position = self.added_count + deleted.start_position;
        }
        combined.end_position = self.added_count + deleted.end_position;
        combined.items.extend(
            deleted
                .items
                .into_iter()
                .map(|item| flag(item, DiffSide::Removed)),
        );
        combined.total_length = total_length;
        combined.validate()?;
        Ok(combined)
    }

    async fn is_empty(&self) -> Result<bool> {
        Ok(false)
    }

    async fn node_position(&self, _id: SnapshotObjectId) -> Result<Option<usize>> {
        Ok(None)
    }

    fn dispose(&self) {
        self.added.dispose();
        self.deleted.dispose();
    }
}
