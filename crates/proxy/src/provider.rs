//! Children provider living in the worker.

use async_trait::async_trait;
use heapscope_core::{ChildrenProvider, Comparator, ItemsRange, Result, SnapshotObjectId};
use heapscope_ipc::methods;
use tracing::debug;

use crate::handle::RemoteHandle;

/// [`ChildrenProvider`] whose items are sorted and sliced by the worker.
#[derive(Debug)]
pub struct ProviderProxy {
    handle: RemoteHandle,
}

impl ProviderProxy {
    pub const fn new(handle: RemoteHandle) -> Self {
        Self { handle }
    }

    pub const fn handle(&self) -> &RemoteHandle {
        &self.handle
    }
}

#[async_trait]
impl ChildrenProvider for ProviderProxy {
    async fn sort_and_rewind(&self, comparator: &Comparator) -> Result<()> {
        self.handle
            .call_method(methods::SORT_AND_REWIND, &(comparator,))
            .await
    }

    async fn serialize_items_range(&self, start: usize, end: usize) -> Result<ItemsRange> {
        let range: ItemsRange = self
            .handle
            .call_method(methods::SERIALIZE_ITEMS_RANGE, &(start, end))
            .await?;
        range.validate()?;
        Ok(range)
    }

    async fn is_empty(&self) -> Result<bool> {
        self.handle.call_method(methods::IS_EMPTY, &()).await
    }

    async fn node_position(&self, id: SnapshotObjectId) -> Result<Option<usize>> {
        self.handle.call_method(methods::NODE_POSITION, &(id,)).await
    }

    fn dispose(&self) {
        if let Err(e) = self.handle.dispose() {
            debug!(object_id = self.handle.object_id(), error = %e, "Provider dispose not delivered");
        }
    }
}
