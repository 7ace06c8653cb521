//! Carriers for the call protocol.
//!
//! Posting never blocks and never waits for the worker; replies come back
//! on an unbounded receiver that the caller pumps.

use std::io::{Read, Write};
use std::thread;

use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::transport::{FrameReader, FrameWriter};
use crate::{TransportError, TransportResult, WorkerReply, WorkerRequest};

/// Outgoing half of a connection to a worker.
pub trait CallChannel: Send + Sync + 'static {
    /// Queue a request for delivery, in order.
    fn post(&self, request: WorkerRequest) -> TransportResult<()>;
}

/// Explorer side of a connection.
pub struct ClientEnd<C> {
    pub channel: C,
    pub replies: UnboundedReceiver<WorkerReply>,
}

/// Worker side of a connection.
pub struct WorkerEnd {
    pub requests: UnboundedReceiver<WorkerRequest>,
    pub replies: UnboundedSender<WorkerReply>,
}

/// Channel to a worker running in this process.
#[derive(Debug, Clone)]
pub struct InProcessChannel {
    requests: UnboundedSender<WorkerRequest>,
}

impl CallChannel for InProcessChannel {
    fn post(&self, request: WorkerRequest) -> TransportResult<()> {
        self.requests
            .send(request)
            .map_err(|_| TransportError::Disconnected)
    }
}

/// Connected explorer and worker ends over tokio channels.
pub fn channel_pair() -> (ClientEnd<InProcessChannel>, WorkerEnd) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    (
        ClientEnd {
            channel: InProcessChannel {
                requests: request_tx,
            },
            replies: reply_rx,
        },
        WorkerEnd {
            requests: request_rx,
            replies: reply_tx,
        },
    )
}

/// Channel to a worker behind a byte stream.
///
/// Frames are written by a dedicated thread, so `post` stays non-blocking.
#[derive(Debug, Clone)]
pub struct StreamChannel {
    outgoing: UnboundedSender<WorkerRequest>,
}

impl CallChannel for StreamChannel {
    fn post(&self, request: WorkerRequest) -> TransportResult<()> {
        self.outgoing
            .send(request)
            .map_err(|_| TransportError::Disconnected)
    }
}

/// Explorer end over a stream pair, e.g. a child process's stdout/stdin.
pub fn stream_client<R, W>(reader: R, writer: W) -> ClientEnd<StreamChannel>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    ClientEnd {
        channel: StreamChannel {
            outgoing: spawn_frame_writer("heapscope-request-writer", writer),
        },
        replies: spawn_frame_reader("heapscope-reply-reader", reader),
    }
}

/// Worker end over a stream pair, e.g. stdin/stdout of the worker process.
pub fn stream_worker<R, W>(reader: R, writer: W) -> WorkerEnd
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    WorkerEnd {
        requests: spawn_frame_reader("heapscope-request-reader", reader),
        replies: spawn_frame_writer("heapscope-reply-writer", writer),
    }
}

fn spawn_frame_writer<T, W>(name: &'static str, writer: W) -> UnboundedSender<T>
where
    T: Serialize + Send + 'static,
    W: Write + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<T>();
    thread::spawn(move || {
        let mut frames = FrameWriter::new(writer);
        while let Some(msg) = rx.blocking_recv() {
            if let Err(e) = frames.send(&msg) {
                warn!(thread = name, error = %e, "Frame write failed, closing");
                break;
            }
        }
        debug!(thread = name, "Frame writer finished");
    });
    tx
}

fn spawn_frame_reader<T, R>(name: &'static str, reader: R) -> UnboundedReceiver<T>
where
    T: DeserializeOwned + Send + 'static,
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<T>();
    thread::spawn(move || {
        let mut frames = FrameReader::new(reader);
        loop {
            match frames.recv::<T>() {
                Ok(msg) => {
                    if tx.send(msg).is_err() {
                        break;
                    }
                }
                Err(e) if e.is_clean_close() => {
                    debug!(thread = name, "Peer closed the stream");
                    break;
                }
                Err(e) => {
                    warn!(thread = name, error = %e, "Frame read failed, closing");
                    break;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::Payload;

    #[tokio::test]
    async fn test_in_process_pair_preserves_order() {
        let (client, mut worker) = channel_pair();
        for call_id in 1..=3 {
            client
                .channel
                .post(WorkerRequest::method(call_id, 1, "ping", Payload::unit()))
                .unwrap();
        }
        for expected in 1..=3 {
            assert_eq!(worker.requests.recv().await.unwrap().call_id, expected);
        }
    }

    #[tokio::test]
    async fn test_post_after_worker_gone_reports_disconnect() {
        let (client, worker) = channel_pair();
        drop(worker);
        let result = client.channel.post(WorkerRequest::dispose(1, 1));
        assert_eq!(result, Err(TransportError::Disconnected));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_carriers_talk_over_a_socket() {
        use std::os::unix::net::UnixStream;

        let (client_socket, worker_socket) = UnixStream::pair().unwrap();
        let mut client = stream_client(client_socket.try_clone().unwrap(), client_socket);
        let mut worker = stream_worker(worker_socket.try_clone().unwrap(), worker_socket);

        client
            .channel
            .post(WorkerRequest::create(1, 1, "HeapSnapshotLoader"))
            .unwrap();
        let request = worker.requests.recv().await.unwrap();
        assert_eq!(request.method_name, "HeapSnapshotLoader");

        worker.replies.send(WorkerReply::result(1, None)).unwrap();
        let reply = client.replies.recv().await.unwrap();
        assert_eq!(reply, WorkerReply::result(1, None));
    }
}
