//! The explorer's tree over one or two snapshots.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use heapscope_core::{
    ChildrenProvider, Error, ExplorerConfig, Result, SnapshotObjectId, SortField,
};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, instrument, warn};

use crate::kind::{ChildIdentity, GridSources, NodeKind};
use crate::tree::{HeapTree, NodeId};
use crate::window::PlaceholderAction;

/// A windowed heap tree plus the snapshots it is populated from.
///
/// Every population step releases the lock while the provider call is in
/// flight and re-checks the node's epoch when the range comes back, so a
/// collapse or re-sort in the meantime simply discards the late range.
#[derive(Debug)]
pub struct HeapGrid {
    tree: RwLock<HeapTree>,
    root: NodeId,
    sources: GridSources,
    config: ExplorerConfig,
}

impl HeapGrid {
    pub fn new(root: NodeKind, sources: GridSources, config: ExplorerConfig) -> Self {
        let tree = HeapTree::new(root);
        let root = tree.root();
        Self {
            tree: RwLock::new(tree),
            root,
            sources,
            config,
        }
    }

    /// Class list of the target snapshot.
    pub fn summary(sources: GridSources, config: ExplorerConfig) -> Self {
        Self::new(NodeKind::Summary, sources, config)
    }

    /// Changed classes between the attached base and target.
    pub fn comparison(sources: GridSources, config: ExplorerConfig) -> Self {
        Self::new(NodeKind::DiffSummary, sources, config)
    }

    pub const fn root(&self) -> NodeId {
        self.root
    }

    pub const fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, HeapTree> {
        self.tree.read().await
    }

    pub async fn sort_state(&self) -> (SortField, bool) {
        self.tree.read().await.sort()
    }

    /// Expand a node, fetching its first page on first expansion.
    #[instrument(skip(self), fields(node = %id))]
    pub async fn expand(&self, id: NodeId) -> Result<()> {
        let (epoch, provider) = {
            let mut tree = self.tree.write().await;
            let node = tree.node(id)?;
            if node.is_cycle() {
                debug!("Not expanding a cycle node");
                return Ok(());
            }
            let populated = node.children().is_populated();
            let state = (node.epoch(), node.provider.clone());
            tree.set_expanded(id, true)?;
            if populated {
                return Ok(());
            }
            state
        };

        let populated = async {
            let provider = match provider {
                Some(provider) => provider,
                None => match self.attach_provider(id, epoch).await? {
                    Some(provider) => provider,
                    None => return Ok(()),
                },
            };
            self.fetch(id, epoch, &provider, 0, self.config.page_size, &mut HashMap::new())
                .await
                .map(|_| ())
        }
        .await;

        if let Err(e) = &populated {
            warn!(error = %e, "Expansion failed; leaving node collapsed");
            let mut tree = self.tree.write().await;
            if tree.get(id).is_some_and(|node| node.epoch() == epoch) {
                tree.set_expanded(id, false)?;
            }
        }
        populated
    }

    /// Hide a node's children. Retrieved children are kept; populations in
    /// flight are discarded.
    pub async fn collapse(&self, id: NodeId) -> Result<()> {
        let mut tree = self.tree.write().await;
        tree.set_expanded(id, false)?;
        tree.bump_epoch(id)?;
        Ok(())
    }

    /// Make sure positions `[from, to)` of an expanded node's children are
    /// retrieved. Only the uncovered sub-ranges are requested. Returns the
    /// number of provider requests made.
    #[instrument(skip(self), fields(node = %id))]
    pub async fn populate_range(&self, id: NodeId, from: usize, to: usize) -> Result<usize> {
        let (epoch, provider, missing) = {
            let tree = self.tree.read().await;
            let node = tree.node(id)?;
            let provider = node
                .provider
                .clone()
                .ok_or_else(|| Error::invalid_request(format!("node {id} has not been expanded")))?;
            (node.epoch(), provider, node.children().missing(from, to))
        };

        let mut requests = 0;
        for (lo, hi) in missing {
            requests += 1;
            if !self
                .fetch(id, epoch, &provider, lo, hi, &mut HashMap::new())
                .await?
            {
                break;
            }
        }
        Ok(requests)
    }

    /// Activate the placeholder at child slot `slot`.
    pub async fn expand_placeholder(
        &self,
        id: NodeId,
        slot: usize,
        action: PlaceholderAction,
    ) -> Result<usize> {
        let (from, to) = {
            let tree = self.tree.read().await;
            tree.node(id)?
                .children()
                .placeholder_request(slot, action, self.config.page_size)
                .ok_or_else(|| Error::invalid_request(format!("slot {slot} of {id} is not a placeholder")))?
        };
        self.populate_range(id, from, to).await
    }

    /// Retrieve the child of `id` standing for heap object `object_id`.
    /// `None` when the provider does not hold it.
    #[instrument(skip(self), fields(node = %id))]
    pub async fn reveal(&self, id: NodeId, object_id: SnapshotObjectId) -> Result<Option<NodeId>> {
        self.expand(id).await?;
        let provider = {
            let tree = self.tree.read().await;
            tree.node(id)?.provider.clone()
        };
        let Some(provider) = provider else {
            return Ok(None);
        };
        let Some(position) = provider.node_position(object_id).await? else {
            debug!(object_id, "Object not under this node");
            return Ok(None);
        };
        self.populate_range(id, position, position + 1).await?;
        Ok(self.tree.read().await.child_at(id, position))
    }

    /// Release every provider and drop every node below the root.
    pub async fn dispose(&self) {
        let providers = self.tree.write().await.clear();
        debug!(providers = providers.len(), "Disposing grid");
        for provider in providers {
            provider.dispose();
        }
    }

    pub(crate) async fn set_sort(&self, column: SortField, ascending: bool) {
        self.tree.write().await.set_sort(column, ascending);
    }

    /// Re-sort one node in place: keep its expanded children aside, sort the
    /// provider, re-populate as many children as were retrieved before and
    /// reattach the kept children still present.
    ///
    /// Returns the reattached children, or `None` when the node has never
    /// been expanded.
    pub(crate) async fn resort_node(&self, id: NodeId) -> Result<Option<Vec<NodeId>>> {
        let (provider, epoch, count, comparator, mut saved, released) = {
            let mut tree = self.tree.write().await;
            let (column, ascending) = tree.sort();
            let node = tree.node(id)?;
            let Some(provider) = node.provider.clone() else {
                return Ok(None);
            };
            let count = node.children().retrieved_count();
            let comparator = node.kind().comparator(column, ascending);
            let epoch = tree.bump_epoch(id)?;
            let (saved, released) = tree.detach_children(id)?;
            (provider, epoch, count, comparator, saved, released)
        };
        release(released);

        let kept: HashSet<NodeId> = saved.values().copied().collect();
        let repopulated = async {
            provider.sort_and_rewind(&comparator).await?;
            if count > 0 {
                self.fetch(id, epoch, &provider, 0, count, &mut saved).await?;
            }
            Ok::<_, Error>(())
        }
        .await;

        // Kept children not claimed by the new order have no parent slot.
        let orphaned: Vec<NodeId> = saved.into_values().collect();
        if !orphaned.is_empty() {
            let mut tree = self.tree.write().await;
            let released = orphaned
                .iter()
                .flat_map(|&child| tree.remove_subtree(child))
                .collect();
            drop(tree);
            release(released);
        }
        if let Err(e) = repopulated {
            warn!(node = %id, error = %e, orphaned = orphaned.len(), "Re-sort failed");
            return Err(e);
        }

        let reattached = kept.into_iter().filter(|child| !orphaned.contains(child)).collect();
        Ok(Some(reattached))
    }

    /// Create the node's provider and sort it by the current column. `None`
    /// when the node went stale while the provider was being created.
    async fn attach_provider(
        &self,
        id: NodeId,
        epoch: u64,
    ) -> Result<Option<Arc<dyn ChildrenProvider>>> {
        let (kind, (column, ascending)) = {
            let tree = self.tree.read().await;
            (tree.node(id)?.kind().clone(), tree.sort())
        };
        let provider = kind.create_provider(&self.sources).await?;
        provider
            .sort_and_rewind(&kind.comparator(column, ascending))
            .await?;

        let mut tree = self.tree.write().await;
        let node = tree.node_mut(id)?;
        if node.epoch() != epoch {
            drop(tree);
            provider.dispose();
            return Ok(None);
        }
        if let Some(existing) = node.provider.clone() {
            drop(tree);
            provider.dispose();
            return Ok(Some(existing));
        }
        node.provider = Some(Arc::clone(&provider));
        Ok(Some(provider))
    }

    /// Serve `[from, to)` and merge it. `false` when the range came back
    /// stale and was dropped.
    async fn fetch(
        &self,
        id: NodeId,
        epoch: u64,
        provider: &Arc<dyn ChildrenProvider>,
        from: usize,
        to: usize,
        saved: &mut HashMap<ChildIdentity, NodeId>,
    ) -> Result<bool> {
        let range = provider.serialize_items_range(from, to).await?;
        range.validate()?;
        let served = (range.start_position, range.end_position, range.total_length);
        match self.tree.write().await.merge_range(id, epoch, range, saved) {
            Ok(Some(filled)) => {
                debug!(node = %id, ?served, filled, "Merged range");
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) if e.is_not_found() => {
                debug!(node = %id, "Node removed while its range was in flight");
                Ok(false)
            }
            Err(e) => {
                warn!(node = %id, error = %e, "Failed to merge range");
                Err(e)
            }
        }
    }
}

fn release(providers: Vec<Arc<dyn ChildrenProvider>>) {
    for provider in providers {
        provider.dispose();
    }
}
