//! Recursive re-sorting of a grid.

use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use heapscope_core::{Result, SortField};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::grid::HeapGrid;
use crate::tree::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortEvent {
    Started { column: SortField, ascending: bool },
    /// The whole recursive batch has settled.
    Completed,
}

/// Sorts a grid top-down and reports one completion per batch.
///
/// Every node being re-sorted holds one count on `depth`; `Completed` is
/// sent when the count returns to zero.
#[derive(Debug)]
pub struct SortCoordinator {
    depth: AtomicUsize,
    events: broadcast::Sender<SortEvent>,
}

impl Default for SortCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SortCoordinator {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            depth: AtomicUsize::new(0),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SortEvent> {
        self.events.subscribe()
    }

    /// Nodes still being re-sorted.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Sort the whole grid by `column`. Expanded children are re-sorted
    /// after their parent and keep their expansion.
    pub async fn sort(&self, grid: &HeapGrid, column: SortField, ascending: bool) -> Result<()> {
        info!(?column, ascending, "Sorting grid");
        grid.set_sort(column, ascending).await;
        if self.depth() == 0 {
            let _ = self.events.send(SortEvent::Started { column, ascending });
        }
        self.sort_node(grid, grid.root()).await
    }

    fn sort_node<'a>(&'a self, grid: &'a HeapGrid, id: NodeId) -> BoxFuture<'a, Result<()>> {
        async move {
            self.depth.fetch_add(1, Ordering::AcqRel);
            let result = self.resort(grid, id).await;
            if self.depth.fetch_sub(1, Ordering::AcqRel) == 1 {
                debug!("Sort batch settled");
                let _ = self.events.send(SortEvent::Completed);
            }
            result
        }
        .boxed()
    }

    async fn resort(&self, grid: &HeapGrid, id: NodeId) -> Result<()> {
        let Some(children) = grid.resort_node(id).await? else {
            return Ok(());
        };
        try_join_all(children.into_iter().map(|child| self.sort_node(grid, child))).await?;
        Ok(())
    }
}
