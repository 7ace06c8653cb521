//! Background half of heapscope.
//!
//! Holds the snapshots and every object the explorer has a handle to, and
//! answers calls posted through `heapscope-ipc`. Run it in-process with
//! [`spawn_in_process`] or behind a byte stream with
//! [`WorkerDispatcher::run`] over `heapscope_ipc::stream_worker`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod dispatcher;
mod format;
mod loader;
mod provider;
mod snapshot;

pub use dispatcher::{CallContext, Dispatch, WorkerDispatcher, WorkerObject, arguments, value};
pub use format::{EdgeEntry, EdgeName, NodeEntry, SnapshotDocument};
pub use loader::SnapshotLoader;
pub use provider::WorkerProvider;
pub use snapshot::{InMemorySnapshot, UNREACHABLE};

use heapscope_ipc::{ClientEnd, InProcessChannel, channel_pair};
use tokio::task::JoinHandle;

/// Start a worker on the current tokio runtime and return the explorer's
/// end of the connection.
pub fn spawn_in_process() -> (ClientEnd<InProcessChannel>, JoinHandle<()>) {
    let (client, worker) = channel_pair();
    let task = tokio::spawn(WorkerDispatcher::new().run(worker));
    (client, task)
}
