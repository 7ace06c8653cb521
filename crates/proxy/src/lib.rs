//! Foreground half of the worker protocol.
//!
//! [`RemoteCallProxy`] hands out call ids and object ids and correlates
//! replies; [`RemoteHandle`] names one worker-side object. The typed proxies
//! put the snapshot contracts from `heapscope-core` on top.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod handle;
mod probe;
mod provider;
mod proxy;
mod snapshot;

pub use handle::RemoteHandle;
pub use probe::LongRunningProbe;
pub use provider::ProviderProxy;
pub use proxy::{RemoteCallProxy, WorkerEvent};
pub use snapshot::{LoaderProxy, SnapshotProxy};
