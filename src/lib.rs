//! # heapscope
//!
//! Command-line explorer for heap snapshots. Snapshots are parsed and held
//! by a worker; this crate streams files into it and renders the windows
//! the explorer pulls back.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cli;
pub mod commands;
pub mod report;
pub mod session;

pub use session::{Session, Utf8Chunker};
