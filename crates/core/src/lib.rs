//! Core types for heapscope.
//!
//! Shared by the foreground explorer and the background worker:
//!
//! - **Model**: heap objects, edges, item windows ([`ItemsRange`])
//! - **Comparator**: the two-key sort applied by providers
//! - **Aggregates**: per-class summaries and diff tables
//! - **Contracts**: [`ChildrenProvider`] and [`SnapshotSource`]
//! - **Config**: [`ExplorerConfig`]

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod aggregate;
pub mod comparator;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod result;
pub mod source;

pub use aggregate::{
    Aggregate, AggregateForDiff, DiffAggregate, DiffForClass, NodeFilter, Samples, SearchConfig,
    Statistics,
};
pub use comparator::{Comparator, SortField};
pub use config::ExplorerConfig;
pub use error::Error;
pub use model::{DiffSide, EdgeRecord, Item, ItemsRange, NodeRecord, SnapshotObjectId};
pub use provider::{ChildrenProvider, LocalProvider, SortedItems};
pub use result::{Result, ResultExt};
pub use source::SnapshotSource;
