//! Typed proxies for the snapshot loader and loaded snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use heapscope_core::{
    Aggregate, AggregateForDiff, ChildrenProvider, DiffForClass, NodeFilter, Result, Samples,
    SearchConfig, SnapshotObjectId, SnapshotSource, Statistics,
};
use heapscope_ipc::methods;
use tracing::{debug, info};

use crate::handle::RemoteHandle;
use crate::provider::ProviderProxy;
use crate::proxy::RemoteCallProxy;

/// Streams snapshot text into a worker-side loader.
#[derive(Debug)]
pub struct LoaderProxy {
    handle: RemoteHandle,
}

impl LoaderProxy {
    /// Create a loader in the worker.
    pub fn create(proxy: &RemoteCallProxy) -> Result<Self> {
        Ok(Self {
            handle: proxy.create_object(methods::SNAPSHOT_LOADER)?,
        })
    }

    /// Append a chunk of snapshot text. Does not wait for the worker.
    pub fn write(&self, chunk: &str) -> Result<()> {
        self.handle.call_method_detached(methods::WRITE, &(chunk,))
    }

    /// Mark the end of the text.
    pub async fn close(&self) -> Result<()> {
        self.handle.call_method(methods::CLOSE, &()).await
    }

    /// Close, parse the accumulated text into a snapshot, and release the
    /// loader.
    pub async fn build_snapshot(self) -> Result<SnapshotProxy> {
        self.close().await?;
        let snapshot = SnapshotProxy::new(self.handle.call_factory(methods::BUILD_SNAPSHOT, &())?);
        self.handle.dispose()?;
        // Parse failures surface here: the snapshot object never came to be.
        let uid = snapshot.uid().await?;
        info!(uid, object_id = snapshot.handle.object_id(), "Snapshot ready");
        Ok(snapshot)
    }
}

/// A snapshot retained by the worker.
#[derive(Debug)]
pub struct SnapshotProxy {
    handle: RemoteHandle,
}

impl SnapshotProxy {
    pub const fn new(handle: RemoteHandle) -> Self {
        Self { handle }
    }

    pub async fn node_count(&self) -> Result<usize> {
        self.handle.call_method(methods::NODE_COUNT, &()).await
    }

    /// Release the snapshot in the worker.
    pub fn dispose(&self) -> Result<()> {
        self.handle.dispose()
    }

    fn provider(&self, method: &str, handle: Result<RemoteHandle>) -> Result<Arc<dyn ChildrenProvider>> {
        let handle = handle?;
        debug!(method, provider = handle.object_id(), "Created remote provider");
        Ok(Arc::new(ProviderProxy::new(handle)))
    }
}

#[async_trait]
impl SnapshotSource for SnapshotProxy {
    async fn uid(&self) -> Result<u64> {
        self.handle.call_method(methods::UID, &()).await
    }

    async fn aggregates_with_filter(&self, filter: &NodeFilter) -> Result<BTreeMap<String, Aggregate>> {
        self.handle
            .call_method(methods::AGGREGATES_WITH_FILTER, &(filter,))
            .await
    }

    async fn aggregates_for_diff(&self) -> Result<BTreeMap<String, AggregateForDiff>> {
        self.handle.call_method(methods::AGGREGATES_FOR_DIFF, &()).await
    }

    async fn calculate_snapshot_diff(
        &self,
        base_uid: u64,
        base: &BTreeMap<String, AggregateForDiff>,
    ) -> Result<BTreeMap<String, DiffForClass>> {
        self.handle
            .call_method(methods::CALCULATE_SNAPSHOT_DIFF, &(base_uid, base))
            .await
    }

    fn create_edges_provider(&self, node_index: usize) -> Result<Arc<dyn ChildrenProvider>> {
        let method = methods::CREATE_EDGES_PROVIDER;
        self.provider(method, self.handle.call_factory(method, &(node_index,)))
    }

    fn create_retaining_edges_provider(&self, node_index: usize) -> Result<Arc<dyn ChildrenProvider>> {
        let method = methods::CREATE_RETAINING_EDGES_PROVIDER;
        self.provider(method, self.handle.call_factory(method, &(node_index,)))
    }

    fn create_nodes_provider_for_class(
        &self,
        class_name: &str,
        filter: &NodeFilter,
    ) -> Result<Arc<dyn ChildrenProvider>> {
        let method = methods::CREATE_NODES_PROVIDER_FOR_CLASS;
        self.provider(method, self.handle.call_factory(method, &(class_name, filter)))
    }

    fn create_nodes_provider(&self, filter: &NodeFilter) -> Result<Arc<dyn ChildrenProvider>> {
        let method = methods::CREATE_NODES_PROVIDER;
        self.provider(method, self.handle.call_factory(method, &(filter,)))
    }

    fn create_added_nodes_provider(
        &self,
        base_uid: u64,
        class_name: &str,
    ) -> Result<Arc<dyn ChildrenProvider>> {
        let method = methods::CREATE_ADDED_NODES_PROVIDER;
        self.provider(method, self.handle.call_factory(method, &(base_uid, class_name)))
    }

    fn create_deleted_nodes_provider(&self, node_indexes: &[usize]) -> Result<Arc<dyn ChildrenProvider>> {
        let method = methods::CREATE_DELETED_NODES_PROVIDER;
        self.provider(method, self.handle.call_factory(method, &(node_indexes,)))
    }

    async fn search(&self, config: &SearchConfig, filter: &NodeFilter) -> Result<Vec<SnapshotObjectId>> {
        self.handle
            .call_method(methods::SEARCH, &(config, filter))
            .await
    }

    async fn statistics(&self) -> Result<Statistics> {
        self.handle.call_method(methods::GET_STATISTICS, &()).await
    }

    async fn samples(&self) -> Result<Option<Samples>> {
        self.handle.call_method(methods::GET_SAMPLES, &()).await
    }
}
