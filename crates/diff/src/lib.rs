//! Comparison of two heap snapshots.
//!
//! [`DiffEngine`] asks the target snapshot's worker to diff itself against
//! the base's per-class summary. Each changed class can then be browsed
//! through a [`CombinedDiffProvider`], which lists the objects added in the
//! target followed by the objects removed from the base.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod combined;
mod engine;

pub use combined::CombinedDiffProvider;
pub use engine::{DiffEngine, DiffTotals};
