//! Lazily populated heap tree.
//!
//! Every node of the explorer's tree pulls its children through a
//! [`ChildrenProvider`](heapscope_core::ChildrenProvider) one window at a
//! time. A node's [`RangeWindow`] records which ranges have been retrieved
//! and shows each gap as a single placeholder. [`HeapGrid`] drives the
//! population, [`SortCoordinator`] re-sorts it without losing expanded
//! subtrees, and [`Viewport`] decides which windows a scroll position needs.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod grid;
mod kind;
mod sort;
mod tree;
mod viewport;
mod window;

pub use grid::HeapGrid;
pub use kind::{ChildIdentity, EdgeLabel, GridSources, NodeKind, Origin};
pub use sort::{SortCoordinator, SortEvent};
pub use tree::{HeapTree, NodeId, WindowedTreeNode};
pub use viewport::{RowKind, Viewport, ViewportFrame, ViewportRow};
pub use window::{PlaceholderAction, RangeWindow, RetrievedRange, Slot};
