//! Operations a snapshot exposes to the explorer.
//!
//! Implemented by the remote snapshot proxy; injected into the tree and the
//! diff engine so neither reaches for a global registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::aggregate::{Aggregate, AggregateForDiff, DiffForClass, NodeFilter, SearchConfig, Samples, Statistics};
use crate::model::SnapshotObjectId;
use crate::provider::ChildrenProvider;
use crate::result::Result;

/// A retained heap snapshot.
///
/// Provider factories return immediately: the provider is usable at once,
/// its calls are ordered behind the factory call on the channel.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Identifier of the snapshot inside its worker.
    async fn uid(&self) -> Result<u64>;

    /// Per-class aggregates over the objects passing `filter`.
    async fn aggregates_with_filter(&self, filter: &NodeFilter) -> Result<BTreeMap<String, Aggregate>>;

    /// Compact per-class summary to feed another snapshot's diff.
    async fn aggregates_for_diff(&self) -> Result<BTreeMap<String, AggregateForDiff>>;

    /// Diff this snapshot against a base summary. Classes without changes
    /// are absent from the result.
    async fn calculate_snapshot_diff(
        &self,
        base_uid: u64,
        base: &BTreeMap<String, AggregateForDiff>,
    ) -> Result<BTreeMap<String, DiffForClass>>;

    /// Outgoing edges of a node.
    fn create_edges_provider(&self, node_index: usize) -> Result<Arc<dyn ChildrenProvider>>;

    /// Retaining edges of a node.
    fn create_retaining_edges_provider(&self, node_index: usize) -> Result<Arc<dyn ChildrenProvider>>;

    /// Instances of one class.
    fn create_nodes_provider_for_class(
        &self,
        class_name: &str,
        filter: &NodeFilter,
    ) -> Result<Arc<dyn ChildrenProvider>>;

    /// All objects passing `filter`.
    fn create_nodes_provider(&self, filter: &NodeFilter) -> Result<Arc<dyn ChildrenProvider>>;

    /// Objects of a class present here but not in the base snapshot. Needs
    /// a prior `calculate_snapshot_diff` against that base.
    fn create_added_nodes_provider(
        &self,
        base_uid: u64,
        class_name: &str,
    ) -> Result<Arc<dyn ChildrenProvider>>;

    /// Objects at the given node indexes of this snapshot.
    fn create_deleted_nodes_provider(&self, node_indexes: &[usize]) -> Result<Arc<dyn ChildrenProvider>>;

    /// Ids of objects whose name matches.
    async fn search(&self, config: &SearchConfig, filter: &NodeFilter) -> Result<Vec<SnapshotObjectId>>;

    async fn statistics(&self) -> Result<Statistics>;

    /// Allocation timeline, when the snapshot recorded one.
    async fn samples(&self) -> Result<Option<Samples>>;
}
