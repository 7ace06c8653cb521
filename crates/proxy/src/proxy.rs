//! Call/response correlation over a [`CallChannel`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use heapscope_core::{Error, Result};
use heapscope_ipc::{CallChannel, CallId, ObjectId, Payload, WorkerReply, WorkerRequest};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::handle::RemoteHandle;
use crate::probe::LongRunningProbe;

/// Capacity of the worker event broadcast.
const EVENT_CAPACITY: usize = 64;

/// Out-of-band notification pushed by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEvent {
    pub name: String,
    pub data: Payload,
}

struct PendingCall {
    method: String,
    /// `None` for fire-and-forget calls: the reply is accepted and discarded.
    reply: Option<oneshot::Sender<Option<Payload>>>,
}

struct ProxyInner {
    channel: Box<dyn CallChannel>,
    next_call_id: AtomicU64,
    next_object_id: AtomicU64,
    pending: Mutex<HashMap<CallId, PendingCall>>,
    probe: Mutex<LongRunningProbe>,
    events: broadcast::Sender<WorkerEvent>,
    busy: watch::Sender<bool>,
}

/// Issues calls to remote objects and routes replies back to their callers.
///
/// Cloning is cheap; clones share ids, pending calls and signals.
#[derive(Clone)]
pub struct RemoteCallProxy {
    inner: Arc<ProxyInner>,
}

impl RemoteCallProxy {
    /// Proxy over `channel`. Replies must be fed through
    /// [`handle_reply`](Self::handle_reply).
    pub fn new(channel: impl CallChannel) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (busy, _) = watch::channel(false);
        Self {
            inner: Arc::new(ProxyInner {
                channel: Box::new(channel),
                next_call_id: AtomicU64::new(1),
                next_object_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                probe: Mutex::new(LongRunningProbe::default()),
                events,
                busy,
            }),
        }
    }

    /// Proxy over `channel` with a reply pump draining `replies`.
    ///
    /// When the reply stream ends every pending call is dropped, so no
    /// caller waits forever on a dead worker.
    pub fn connect(channel: impl CallChannel, mut replies: UnboundedReceiver<WorkerReply>) -> Self {
        let proxy = Self::new(channel);
        let weak = Arc::downgrade(&proxy.inner);
        tokio::spawn(async move {
            while let Some(reply) = replies.recv().await {
                match upgrade(&weak) {
                    Some(proxy) => proxy.handle_reply(reply),
                    None => return,
                }
            }
            debug!("Worker reply stream ended");
            if let Some(proxy) = upgrade(&weak) {
                proxy.drop_all_pending();
            }
        });
        proxy
    }

    /// Construct a remote instance of `class_name`.
    ///
    /// The handle is usable at once; the worker processes calls in order.
    pub fn create_object(&self, class_name: &str) -> Result<RemoteHandle> {
        let object_id = self.allocate_object_id();
        let call_id = self.allocate_call_id();
        debug!(call_id, object_id, class = class_name, "Creating remote object");
        self.post(WorkerRequest::create(call_id, object_id, class_name))?;
        Ok(RemoteHandle::new(object_id, self.clone()))
    }

    /// Send a diagnostic snippet to the worker and await its answer.
    pub async fn evaluate(&self, source: &str) -> Result<String> {
        let call_id = self.allocate_call_id();
        let reply = self.register(call_id, "evaluate");
        self.post_registered(call_id, WorkerRequest::evaluate(call_id, source))?;
        let payload = await_reply(call_id, "evaluate", reply).await?;
        decode_result(payload)
    }

    /// Subscribe to worker events such as loading progress.
    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.inner.events.subscribe()
    }

    /// Advisory "still working" signal driven by the probe.
    pub fn busy(&self) -> watch::Receiver<bool> {
        self.inner.busy.subscribe()
    }

    /// Call ids awaiting a reply, ascending.
    pub fn pending_calls(&self) -> Vec<CallId> {
        let mut ids: Vec<CallId> = self.pending().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Route one reply to its pending call.
    ///
    /// Unknown call ids are ignored. Error replies are logged and their
    /// pending call is dropped without being resolved.
    pub fn handle_reply(&self, reply: WorkerReply) {
        match reply {
            WorkerReply::Result { call_id, result } => match self.take_pending(call_id) {
                Some(PendingCall {
                    method,
                    reply: Some(sender),
                }) => {
                    trace!(call_id, method = %method, "Resolving call");
                    if sender.send(result).is_err() {
                        debug!(call_id, method = %method, "Caller went away before the reply");
                    }
                }
                Some(PendingCall { reply: None, .. }) => {}
                None => debug!(call_id, "Ignoring reply for unknown call id"),
            },
            WorkerReply::Error {
                call_id,
                error,
                method_name,
                call_stack,
            } => {
                warn!(
                    call_id,
                    method = %method_name,
                    error = %error,
                    call_stack = call_stack.as_deref().unwrap_or(""),
                    "Worker call failed"
                );
                if self.take_pending(call_id).is_none() {
                    debug!(call_id, "Error reply for unknown call id");
                }
            }
            WorkerReply::Event { event_name, data } => {
                trace!(event = %event_name, "Worker event");
                // No subscribers is fine.
                let _ = self.inner.events.send(WorkerEvent {
                    name: event_name,
                    data,
                });
            }
        }
    }

    /// Run one long-running probe step and publish the busy signal.
    ///
    /// A call is long-running when it was already pending at the previous
    /// step.
    pub fn probe_tick(&self) -> bool {
        let current: HashSet<CallId> = self.pending().keys().copied().collect();
        let busy = self
            .inner
            .probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tick(&current);
        self.inner.busy.send_if_modified(|value| {
            let changed = *value != busy;
            *value = busy;
            changed
        });
        busy
    }

    /// Run the probe every `interval` until the proxy is dropped.
    pub fn spawn_probe(&self, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match upgrade(&weak) {
                    Some(proxy) => {
                        if proxy.probe_tick() {
                            debug!(pending = proxy.pending_calls().len(), "Worker is still busy");
                        }
                    }
                    None => return,
                }
            }
        })
    }

    pub(crate) async fn call<A, T>(&self, object_id: ObjectId, method: &str, args: &A) -> Result<T>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let arguments = Payload::encode(args)?;
        let call_id = self.allocate_call_id();
        let reply = self.register(call_id, method);
        trace!(call_id, object_id, method, "Calling worker");
        self.post_registered(call_id, WorkerRequest::method(call_id, object_id, method, arguments))?;
        let payload = await_reply(call_id, method, reply).await?;
        decode_result(payload)
    }

    pub(crate) fn call_detached<A>(&self, object_id: ObjectId, method: &str, args: &A) -> Result<()>
    where
        A: Serialize + ?Sized,
    {
        let arguments = Payload::encode(args)?;
        let call_id = self.allocate_call_id();
        self.register_detached(call_id, method);
        self.post_registered(call_id, WorkerRequest::method(call_id, object_id, method, arguments))
    }

    pub(crate) fn call_factory<A>(&self, object_id: ObjectId, method: &str, args: &A) -> Result<RemoteHandle>
    where
        A: Serialize + ?Sized,
    {
        let arguments = Payload::encode(args)?;
        let new_object_id = self.allocate_object_id();
        let call_id = self.allocate_call_id();
        self.register_detached(call_id, method);
        trace!(call_id, object_id, new_object_id, method, "Calling worker factory");
        self.post_registered(
            call_id,
            WorkerRequest::factory(call_id, object_id, method, arguments, new_object_id),
        )?;
        Ok(RemoteHandle::new(new_object_id, self.clone()))
    }

    pub(crate) fn send_dispose(&self, object_id: ObjectId) -> Result<()> {
        let call_id = self.allocate_call_id();
        debug!(call_id, object_id, "Disposing remote object");
        self.post(WorkerRequest::dispose(call_id, object_id))
    }

    fn allocate_call_id(&self) -> CallId {
        self.inner.next_call_id.fetch_add(1, Ordering::Relaxed)
    }

    fn allocate_object_id(&self) -> ObjectId {
        self.inner.next_object_id.fetch_add(1, Ordering::Relaxed)
    }

    fn post(&self, request: WorkerRequest) -> Result<()> {
        self.inner.channel.post(request).map_err(Error::from)
    }

    /// Post a request whose call is already registered; unregister it if the
    /// channel refuses it.
    fn post_registered(&self, call_id: CallId, request: WorkerRequest) -> Result<()> {
        self.post(request).inspect_err(|_| {
            self.take_pending(call_id);
        })
    }

    fn register(&self, call_id: CallId, method: &str) -> oneshot::Receiver<Option<Payload>> {
        let (sender, receiver) = oneshot::channel();
        self.pending().insert(
            call_id,
            PendingCall {
                method: method.to_string(),
                reply: Some(sender),
            },
        );
        receiver
    }

    fn register_detached(&self, call_id: CallId, method: &str) {
        self.pending().insert(
            call_id,
            PendingCall {
                method: method.to_string(),
                reply: None,
            },
        );
    }

    fn take_pending(&self, call_id: CallId) -> Option<PendingCall> {
        self.pending().remove(&call_id)
    }

    fn drop_all_pending(&self) {
        let dropped = std::mem::take(&mut *self.pending());
        if !dropped.is_empty() {
            warn!(count = dropped.len(), "Dropping calls pending on a closed worker");
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<CallId, PendingCall>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RemoteCallProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCallProxy")
            .field("pending", &self.pending_calls())
            .finish_non_exhaustive()
    }
}

fn upgrade(weak: &Weak<ProxyInner>) -> Option<RemoteCallProxy> {
    weak.upgrade().map(|inner| RemoteCallProxy { inner })
}

async fn await_reply(
    call_id: CallId,
    method: &str,
    reply: oneshot::Receiver<Option<Payload>>,
) -> Result<Option<Payload>> {
    reply.await.map_err(|_| Error::call_dropped(call_id, method))
}

/// A missing result decodes as `()`; anything else is a decode error.
fn decode_result<T: DeserializeOwned>(payload: Option<Payload>) -> Result<T> {
    let payload = payload.unwrap_or_else(Payload::unit);
    payload.decode().map_err(Error::from)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use heapscope_ipc::{Disposition, channel_pair};

    #[tokio::test]
    async fn test_call_ids_are_monotonic() {
        let (client, mut worker) = channel_pair();
        let proxy = RemoteCallProxy::new(client.channel);
        let first = proxy.create_object("A").unwrap();
        let second = proxy.create_object("B").unwrap();
        assert!(second.object_id() > first.object_id());

        let a = worker.requests.recv().await.unwrap();
        let b = worker.requests.recv().await.unwrap();
        assert!(b.call_id > a.call_id);
        assert_eq!(a.disposition, Disposition::Create);
        assert_eq!(a.object_id, first.object_id());
    }

    #[tokio::test]
    async fn test_error_reply_drops_the_call() {
        let (client, mut worker) = channel_pair();
        let proxy = RemoteCallProxy::new(client.channel);
        let handle = proxy.create_object("A").unwrap();
        let _create = worker.requests.recv().await.unwrap();

        let call = handle.call_method::<_, u64>("count", &());
        let answer = async {
            let request = worker.requests.recv().await.unwrap();
            proxy.handle_reply(WorkerReply::error(request.call_id, "boom", "count"));
        };
        let (result, ()) = tokio::join!(call, answer);

        assert!(matches!(result, Err(Error::CallDropped { ref method, .. }) if method == "count"));
        assert!(proxy.pending_calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_call_id_is_ignored() {
        let (client, _worker) = channel_pair();
        let proxy = RemoteCallProxy::new(client.channel);
        proxy.handle_reply(WorkerReply::result(999, None));
        proxy.handle_reply(WorkerReply::error(998, "late", "m"));
        assert!(proxy.pending_calls().is_empty());
    }

    #[tokio::test]
    async fn test_detached_reply_is_discarded() {
        let (client, mut worker) = channel_pair();
        let proxy = RemoteCallProxy::new(client.channel);
        let handle = proxy.create_object("Loader").unwrap();
        handle.call_method_detached("write", &("chunk",)).unwrap();
        let _create = worker.requests.recv().await.unwrap();
        let write = worker.requests.recv().await.unwrap();
        assert_eq!(proxy.pending_calls(), vec![write.call_id]);

        proxy.handle_reply(WorkerReply::result(write.call_id, None));
        assert!(proxy.pending_calls().is_empty());
    }

    #[tokio::test]
    async fn test_probe_flags_calls_surviving_two_ticks() {
        let (client, mut worker) = channel_pair();
        let proxy = RemoteCallProxy::new(client.channel);
        let handle = proxy.create_object("A").unwrap();
        handle.call_method_detached("slow", &()).unwrap();
        let mut busy = proxy.busy();

        assert!(!proxy.probe_tick());
        assert!(proxy.probe_tick());
        assert!(*busy.borrow_and_update());

        let _create = worker.requests.recv().await.unwrap();
        let slow = worker.requests.recv().await.unwrap();
        proxy.handle_reply(WorkerReply::result(slow.call_id, None));
        assert!(!proxy.probe_tick());
        assert!(!*busy.borrow_and_update());
    }

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let (client, _worker) = channel_pair();
        let proxy = RemoteCallProxy::new(client.channel);
        let mut events = proxy.subscribe_events();
        proxy.handle_reply(WorkerReply::event("progress", Payload::encode(&50u8).unwrap()));

        let event = events.recv().await.unwrap();
        assert_eq!(event.name, "progress");
        assert_eq!(event.data.decode::<u8>().unwrap(), 50);
    }

    #[tokio::test]
    async fn test_closed_reply_stream_drops_pending_calls() {
        let (client, mut worker) = channel_pair();
        let proxy = RemoteCallProxy::connect(client.channel, client.replies);
        let handle = proxy.create_object("A").unwrap();

        let call = handle.call_method::<_, u64>("count", &());
        let close = async {
            let _create = worker.requests.recv().await.unwrap();
            let _count = worker.requests.recv().await.unwrap();
            drop(worker);
        };
        let (result, ()) = tokio::join!(call, close);
        assert!(matches!(result, Err(Error::CallDropped { .. })));
    }

    #[tokio::test]
    async fn test_post_to_closed_channel_fails_without_pending_leak() {
        let (client, worker) = channel_pair();
        let proxy = RemoteCallProxy::new(client.channel);
        drop(worker);
        assert_eq!(proxy.create_object("A").unwrap_err(), Error::ChannelClosed);
        assert!(proxy.evaluate("ping").await.is_err());
        assert!(proxy.pending_calls().is_empty());
    }
}
