//! heapscope IPC - call protocol between the explorer and its snapshot worker
//!
//! The explorer never touches snapshot data directly. It posts
//! [`WorkerRequest`]s naming a remote object and a method, and the worker
//! answers with [`WorkerReply`]s correlated by call id.
//!
//! Two carriers are provided:
//! - [`channel_pair`]: in-process, over unbounded tokio channels
//! - [`stream_client`] / [`stream_worker`]: any `Read + Write` pair, using
//!   the framed [`IpcTransport`]
//!
//! # Frame format
//!
//! ```text
//! +--------+--------+--------+--------+--------------------------+
//! | Byte 0 | Byte 1 | Byte 2 | Byte 3 | Bytes 4..(4+N)           |
//! |--------+--------+--------+--------+--------------------------|
//! |          Length (big-endian u32)  |    Bincode Payload       |
//! |           N = payload size        |    (N bytes)             |
//! +--------+--------+--------+--------+--------------------------+
//! ```
//!
//! Empty frames are rejected; frames above [`MAX_PAYLOAD_SIZE`] are refused
//! on both ends.
//!
//! # Example
//!
//! ```rust
//! use heapscope_ipc::{IpcTransport, WorkerRequest};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut buffer = Vec::new();
//! let request = WorkerRequest::create(1, 7, "HeapSnapshotLoader");
//! IpcTransport::new(std::io::empty(), &mut buffer).send(&request)?;
//!
//! let received: WorkerRequest = IpcTransport::new(buffer.as_slice(), std::io::sink()).recv()?;
//! assert_eq!(received, request);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod channel;
mod error;
mod messages;
pub mod methods;
mod transport;

pub use channel::{
    CallChannel, ClientEnd, InProcessChannel, StreamChannel, WorkerEnd, channel_pair, stream_client,
    stream_worker,
};
pub use error::{Direction, TransportError, TransportResult};
pub use messages::{CallId, Disposition, ObjectId, Payload, WorkerReply, WorkerRequest};
pub use transport::{FrameReader, FrameWriter, IpcTransport};

/// Maximum allowed payload size in bytes (16MB). Snapshot text is streamed in
/// chunks well below this.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Length prefix size in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Buffer capacity used by both frame halves.
pub const BUFFER_CAPACITY: usize = 64 * 1024;
