//! Object table and request dispatch.
//!
//! The dispatcher is a plain state machine: [`WorkerDispatcher::handle`]
//! takes one request and returns the replies it produces, events first.
//! [`WorkerDispatcher::run`] drives it from a channel.

use std::collections::{BTreeMap, HashMap};

use heapscope_core::{Error, Result};
use heapscope_ipc::{
    CallId, Disposition, ObjectId, Payload, WorkerEnd, WorkerReply, WorkerRequest, methods,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, trace, warn};

use crate::loader::SnapshotLoader;

/// Outcome of a method call on a worker object.
pub enum Dispatch {
    /// A value to send back.
    Value(Payload),
    /// A new object to bind under the factory's `new_object_id`.
    Object(Box<dyn WorkerObject>),
}

/// Something the explorer can hold a handle to.
pub trait WorkerObject: Send {
    /// Name used in error replies.
    fn class_name(&self) -> &'static str;

    fn call(&mut self, method: &str, args: &Payload, ctx: &mut CallContext) -> Result<Dispatch>;
}

/// Per-call scratch space: events raised while the call runs.
#[derive(Debug, Default)]
pub struct CallContext {
    events: Vec<WorkerReply>,
}

impl CallContext {
    /// Queue an event to be sent ahead of the call's reply.
    pub fn emit<T: Serialize + ?Sized>(&mut self, name: &str, data: &T) {
        match Payload::encode(data) {
            Ok(payload) => self.events.push(WorkerReply::event(name, payload)),
            Err(e) => warn!(event = name, error = %e, "Dropping unencodable event"),
        }
    }
}

/// Encode a method result.
pub fn value<T: Serialize + ?Sized>(result: &T) -> Result<Dispatch> {
    Ok(Dispatch::Value(Payload::encode(result)?))
}

/// Decode a method's argument tuple.
pub fn arguments<T: DeserializeOwned>(args: &Payload) -> Result<T> {
    Ok(args.decode()?)
}

type Constructor = fn() -> Box<dyn WorkerObject>;

/// Holds every live worker object and routes calls to them.
pub struct WorkerDispatcher {
    objects: HashMap<ObjectId, Box<dyn WorkerObject>>,
    constructors: HashMap<&'static str, Constructor>,
}

impl Default for WorkerDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerDispatcher {
    /// Dispatcher that can construct snapshot loaders.
    pub fn new() -> Self {
        let mut dispatcher = Self {
            objects: HashMap::new(),
            constructors: HashMap::new(),
        };
        dispatcher.register(methods::SNAPSHOT_LOADER, || Box::new(SnapshotLoader::default()));
        dispatcher
    }

    /// Make `class_name` constructible through `create`.
    pub fn register(&mut self, class_name: &'static str, constructor: Constructor) {
        self.constructors.insert(class_name, constructor);
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Process one request.
    pub fn handle(&mut self, request: WorkerRequest) -> Vec<WorkerReply> {
        let call_id = request.call_id;
        let method_name = request.method_name.clone();
        let mut ctx = CallContext::default();
        let outcome = self.dispatch(request, &mut ctx);

        let mut replies = ctx.events;
        replies.push(match outcome {
            Ok(result) => WorkerReply::result(call_id, result),
            Err(e) => error_reply(call_id, &method_name, &e),
        });
        replies
    }

    /// Serve requests until the explorer hangs up.
    ///
    /// Calls run to completion one at a time, so the worker sees requests in
    /// the order they were posted.
    pub async fn run(mut self, mut end: WorkerEnd) {
        info!("Snapshot worker started");
        while let Some(request) = end.requests.recv().await {
            for reply in self.handle(request) {
                if end.replies.send(reply).is_err() {
                    debug!("Explorer gone, stopping worker");
                    return;
                }
            }
        }
        info!(live_objects = self.objects.len(), "Snapshot worker stopped");
    }

    fn dispatch(&mut self, request: WorkerRequest, ctx: &mut CallContext) -> Result<Option<Payload>> {
        let WorkerRequest {
            call_id,
            disposition,
            object_id,
            new_object_id,
            method_name,
            arguments,
            source,
        } = request;
        trace!(call_id, ?disposition, object_id, method = %method_name, "Dispatching");

        match disposition {
            Disposition::Create => {
                let constructor = self
                    .constructors
                    .get(method_name.as_str())
                    .ok_or_else(|| Error::unknown_class(&method_name))?;
                self.objects.insert(object_id, constructor());
                Ok(None)
            }
            Disposition::Dispose => {
                if self.objects.remove(&object_id).is_none() {
                    debug!(object_id, "Dispose of unknown object ignored");
                }
                Ok(None)
            }
            Disposition::Method => {
                let dispatched = self.object(object_id)?.call(&method_name, &arguments, ctx)?;
                match dispatched {
                    Dispatch::Value(payload) => Ok(Some(payload)),
                    Dispatch::Object(_) => Err(Error::invalid_request(format!(
                        "'{method_name}' builds an object and must be called as a factory"
                    ))),
                }
            }
            Disposition::Factory => {
                let new_object_id = new_object_id
                    .ok_or_else(|| Error::invalid_request("factory call without a new object id"))?;
                let dispatched = self.object(object_id)?.call(&method_name, &arguments, ctx)?;
                match dispatched {
                    Dispatch::Object(object) => {
                        debug!(object_id, new_object_id, class = object.class_name(), "Bound factory result");
                        self.objects.insert(new_object_id, object);
                        Ok(None)
                    }
                    Dispatch::Value(_) => Err(Error::invalid_request(format!(
                        "'{method_name}' returns a value and cannot be called as a factory"
                    ))),
                }
            }
            Disposition::Evaluate => {
                let answer = self.evaluate(source.as_deref().unwrap_or_default())?;
                Ok(Some(Payload::encode(&answer)?))
            }
        }
    }

    fn object(&mut self, object_id: ObjectId) -> Result<&mut Box<dyn WorkerObject>> {
        self.objects
            .get_mut(&object_id)
            .ok_or(Error::ObjectNotFound { object_id })
    }

    /// Diagnostic snippets understood by the worker.
    fn evaluate(&self, source: &str) -> Result<String> {
        match source.trim() {
            "ping" => Ok("pong".to_string()),
            "objects" => {
                let mut by_class: BTreeMap<&str, usize> = BTreeMap::new();
                for object in self.objects.values() {
                    *by_class.entry(object.class_name()).or_default() += 1;
                }
                let listing: Vec<String> = by_class
                    .into_iter()
                    .map(|(class, count)| format!("{class}: {count}"))
                    .collect();
                Ok(listing.join(", "))
            }
            other => Err(Error::invalid_request(format!("cannot evaluate '{other}'"))),
        }
    }
}

fn error_reply(call_id: CallId, method_name: &str, error: &Error) -> WorkerReply {
    warn!(call_id, method = method_name, error = %error, "Call failed in worker");
    WorkerReply::Error {
        call_id,
        error: error.to_string(),
        method_name: method_name.to_string(),
        call_stack: Some(format!("{error:?}")),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;

    struct Counter {
        count: u64,
    }

    impl WorkerObject for Counter {
        fn class_name(&self) -> &'static str {
            "Counter"
        }

        fn call(&mut self, method: &str, args: &Payload, ctx: &mut CallContext) -> Result<Dispatch> {
            match method {
                "add" => {
                    let (n,): (u64,) = arguments(args)?;
                    self.count += n;
                    ctx.emit("added", &n);
                    value(&self.count)
                }
                "fork" => Ok(Dispatch::Object(Box::new(Counter { count: self.count }))),
                _ => Err(Error::unknown_method(self.class_name(), method)),
            }
        }
    }

    fn dispatcher() -> WorkerDispatcher {
        let mut dispatcher = WorkerDispatcher::new();
        dispatcher.register("Counter", || Box::new(Counter { count: 0 }));
        dispatcher
    }

    fn result_of(replies: &[WorkerReply]) -> Option<Payload> {
        match replies.last() {
            Some(WorkerReply::Result { result, .. }) => result.clone(),
            other => panic!("expected a result reply, got {other:?}"),
        }
    }

    #[test]
    fn test_create_call_and_events() {
        let mut dispatcher = dispatcher();
        dispatcher.handle(WorkerRequest::create(1, 10, "Counter"));

        let args = Payload::encode(&(5u64,)).unwrap();
        let replies = dispatcher.handle(WorkerRequest::method(2, 10, "add", args));
        assert_eq!(replies.len(), 2);
        assert!(matches!(&replies[0], WorkerReply::Event { event_name, .. } if event_name == "added"));
        assert_eq!(result_of(&replies).unwrap().decode::<u64>().unwrap(), 5);
    }

    #[test]
    fn test_factory_binds_new_object() {
        let mut dispatcher = dispatcher();
        dispatcher.handle(WorkerRequest::create(1, 10, "Counter"));
        dispatcher.handle(WorkerRequest::method(2, 10, "add", Payload::encode(&(3u64,)).unwrap()));
        let replies = dispatcher.handle(WorkerRequest::factory(3, 10, "fork", Payload::unit(), 11));
        assert_eq!(result_of(&replies), None);
        assert_eq!(dispatcher.object_count(), 2);

        let replies = dispatcher.handle(WorkerRequest::method(4, 11, "add", Payload::encode(&(1u64,)).unwrap()));
        assert_eq!(result_of(&replies).unwrap().decode::<u64>().unwrap(), 4);
    }

    #[test]
    fn test_unknown_targets_answer_with_errors() {
        let mut dispatcher = dispatcher();
        let cases = vec![
            WorkerRequest::create(1, 10, "Nope"),
            WorkerRequest::method(2, 99, "add", Payload::unit()),
            WorkerRequest::evaluate(3, "drop everything"),
        ];
        for request in cases {
            let call_id = request.call_id;
            let replies = dispatcher.handle(request);
            assert!(matches!(replies.as_slice(), [WorkerReply::Error { call_id: id, .. }] if *id == call_id));
        }

        dispatcher.handle(WorkerRequest::create(4, 10, "Counter"));
        let replies = dispatcher.handle(WorkerRequest::method(5, 10, "reset", Payload::unit()));
        assert!(matches!(&replies[0], WorkerReply::Error { error, .. } if error.contains("reset")));
    }

    #[test]
    fn test_method_and_factory_misuse_rejected() {
        let mut dispatcher = dispatcher();
        dispatcher.handle(WorkerRequest::create(1, 10, "Counter"));
        let as_method = dispatcher.handle(WorkerRequest::method(2, 10, "fork", Payload::unit()));
        assert!(matches!(&as_method[0], WorkerReply::Error { .. }));

        let args = Payload::encode(&(1u64,)).unwrap();
        let as_factory = dispatcher.handle(WorkerRequest::factory(3, 10, "add", args, 12));
        assert!(matches!(as_factory.last(), Some(WorkerReply::Error { .. })));
        assert_eq!(dispatcher.object_count(), 1);
    }

    #[test]
    fn test_double_dispose_tolerated() {
        let mut dispatcher = dispatcher();
        dispatcher.handle(WorkerRequest::create(1, 10, "Counter"));
        for call_id in 2..=3 {
            let replies = dispatcher.handle(WorkerRequest::dispose(call_id, 10));
            assert_eq!(replies, vec![WorkerReply::result(call_id, None)]);
        }
        assert_eq!(dispatcher.object_count(), 0);
    }

    #[test]
    fn test_evaluate_lists_objects() {
        let mut dispatcher = dispatcher();
        dispatcher.handle(WorkerRequest::create(1, 10, "Counter"));
        dispatcher.handle(WorkerRequest::create(2, 11, "Counter"));
        let replies = dispatcher.handle(WorkerRequest::evaluate(3, "objects"));
        assert_eq!(result_of(&replies).unwrap().decode::<String>().unwrap(), "Counter: 2");
    }
}
