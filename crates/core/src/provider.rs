//! The children-provider contract and an in-memory implementation of it.
//!
//! A provider is a cursor over an ordered, possibly huge collection that
//! lives somewhere else. Callers sort it, then ask for windows of it. The
//! worker serves remote providers out of [`SortedItems`]; the explorer uses
//! [`LocalProvider`] for small collections it already holds (class lists,
//! diff rows) so that every tree level goes through the same contract.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::comparator::Comparator;
use crate::error::Error;
use crate::model::{Item, ItemsRange, SnapshotObjectId};
use crate::result::Result;

/// Sorts and serves subranges of an ordered collection.
///
/// `sort_and_rewind` must complete before `serialize_items_range` is issued
/// for the new sort epoch; callers sequence the two.
#[async_trait]
pub trait ChildrenProvider: Send + Sync {
    /// Re-sort the collection and reset the cursor.
    async fn sort_and_rewind(&self, comparator: &Comparator) -> Result<()>;

    /// Items in `[start, end)` under the most recent sort order.
    ///
    /// Bounds beyond the collection are clamped; `total_length` is stable
    /// for one sort epoch.
    async fn serialize_items_range(&self, start: usize, end: usize) -> Result<ItemsRange>;

    /// Whether the collection has no items at all.
    async fn is_empty(&self) -> Result<bool>;

    /// Position of an object under the current sort order.
    async fn node_position(&self, id: SnapshotObjectId) -> Result<Option<usize>>;

    /// Release the provider. It must not be queried afterwards.
    fn dispose(&self);
}

/// Sortable item list backing a provider.
#[derive(Debug, Clone, Default)]
pub struct SortedItems {
    items: Vec<Item>,
    comparator: Option<Comparator>,
}

impl SortedItems {
    pub const fn new(items: Vec<Item>) -> Self {
        Self {
            items,
            comparator: None,
        }
    }

    /// Sort in place. Re-applying the comparator that is already in effect
    /// is a no-op.
    pub fn sort(&mut self, comparator: &Comparator) {
        if self.comparator.as_ref() == Some(comparator) {
            return;
        }
        self.items.sort_by(|a, b| comparator.compare(a, b));
        self.comparator = Some(*comparator);
    }

    /// Window `[start, end)`, clamped to the collection.
    pub fn range(&self, start: usize, end: usize) -> ItemsRange {
        let total = self.items.len();
        let end = end.min(total);
        let start = start.min(end);
        ItemsRange {
            start_position: start,
            end_position: end,
            total_length: total,
            items: self.items.get(start..end).map(<[Item]>::to_vec).unwrap_or_default(),
        }
    }

    /// Position of the item carrying object `id`.
    pub fn position_of(&self, id: SnapshotObjectId) -> Option<usize> {
        self.items.iter().position(|item| item.object_id() == Some(id))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Comparator currently in effect.
    pub const fn comparator(&self) -> Option<&Comparator> {
        self.comparator.as_ref()
    }
}

/// Provider over items already held in this process.
#[derive(Debug, Default)]
pub struct LocalProvider {
    items: RwLock<SortedItems>,
    disposed: AtomicBool,
}

impl LocalProvider {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items: RwLock::new(SortedItems::new(items)),
            disposed: AtomicBool::new(false),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(Error::ProviderDisposed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChildrenProvider for LocalProvider {
    async fn sort_and_rewind(&self, comparator: &Comparator) -> Result<()> {
        self.ensure_live()?;
        self.items.write().await.sort(comparator);
        Ok(())
    }

    async fn serialize_items_range(&self, start: usize, end: usize) -> Result<ItemsRange> {
        self.ensure_live()?;
        Ok(self.items.read().await.range(start, end))
    }

    async fn is_empty(&self) -> Result<bool> {
        self.ensure_live()?;
        Ok(self.items.read().await.is_empty())
    }

    async fn node_position(&self, id: SnapshotObjectId) -> Result<Option<usize>> {
        self.ensure_live()?;
        Ok(self.items.read().await.position_of(id))
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }
}
