//! Messages exchanged between the explorer and the snapshot worker.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{TransportError, TransportResult};

/// Correlates a reply with its request. Unique per connection.
pub type CallId = u64;

/// Names an object living in the worker. Allocated by the explorer.
pub type ObjectId = u64;

/// What a request asks the worker to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Disposition {
    /// Construct an instance of class `method_name` under `object_id`.
    Create,
    /// Forget `object_id`.
    Dispose,
    /// Call `method_name` on `object_id` and reply with its value.
    Method,
    /// Call `method_name` on `object_id` and bind the returned object under
    /// `new_object_id`.
    Factory,
    /// Evaluate a debugging snippet.
    Evaluate,
}

/// Opaque bincode-encoded value.
///
/// Method arguments travel as one payload holding a tuple, results as one
/// payload holding the returned value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> TransportResult<Self> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map(Self)
            .map_err(|e| TransportError::serialization_failed(e.to_string()))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> TransportResult<T> {
        bincode::serde::decode_from_slice(&self.0, bincode::config::standard())
            .map(|(value, _)| value)
            .map_err(|e| TransportError::deserialization_failed(e.to_string(), self.0.len()))
    }

    /// The encoding of `()`.
    pub const fn unit() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A call from the explorer into the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub call_id: CallId,
    pub disposition: Disposition,
    /// Target object; the new object's id for `Create`.
    pub object_id: ObjectId,
    /// Id to bind a factory's result under.
    pub new_object_id: Option<ObjectId>,
    /// Method name, or class name for `Create`.
    pub method_name: String,
    pub arguments: Payload,
    /// Snippet for `Evaluate`.
    pub source: Option<String>,
}

impl WorkerRequest {
    pub fn create(call_id: CallId, object_id: ObjectId, class_name: impl Into<String>) -> Self {
        Self {
            call_id,
            disposition: Disposition::Create,
            object_id,
            new_object_id: None,
            method_name: class_name.into(),
            arguments: Payload::unit(),
            source: None,
        }
    }

    pub fn dispose(call_id: CallId, object_id: ObjectId) -> Self {
        Self {
            call_id,
            disposition: Disposition::Dispose,
            object_id,
            new_object_id: None,
            method_name: String::new(),
            arguments: Payload::unit(),
            source: None,
        }
    }

    pub fn method(
        call_id: CallId,
        object_id: ObjectId,
        method_name: impl Into<String>,
        arguments: Payload,
    ) -> Self {
        Self {
            call_id,
            disposition: Disposition::Method,
            object_id,
            new_object_id: None,
            method_name: method_name.into(),
            arguments,
            source: None,
        }
    }

    pub fn factory(
        call_id: CallId,
        object_id: ObjectId,
        method_name: impl Into<String>,
        arguments: Payload,
        new_object_id: ObjectId,
    ) -> Self {
        Self {
            call_id,
            disposition: Disposition::Factory,
            object_id,
            new_object_id: Some(new_object_id),
            method_name: method_name.into(),
            arguments,
            source: None,
        }
    }

    pub fn evaluate(call_id: CallId, source: impl Into<String>) -> Self {
        Self {
            call_id,
            disposition: Disposition::Evaluate,
            object_id: 0,
            new_object_id: None,
            method_name: String::new(),
            arguments: Payload::unit(),
            source: Some(source.into()),
        }
    }
}

/// A message from the worker back to the explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerReply {
    /// Successful completion. `result` is absent for calls that return
    /// nothing.
    Result {
        call_id: CallId,
        result: Option<Payload>,
    },
    /// The call failed inside the worker.
    Error {
        call_id: CallId,
        error: String,
        method_name: String,
        call_stack: Option<String>,
    },
    /// Unsolicited notification, e.g. loading progress.
    Event { event_name: String, data: Payload },
}

impl WorkerReply {
    pub fn result(call_id: CallId, result: Option<Payload>) -> Self {
        Self::Result { call_id, result }
    }

    pub fn error(call_id: CallId, error: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self::Error {
            call_id,
            error: error.into(),
            method_name: method_name.into(),
            call_stack: None,
        }
    }

    pub fn event(event_name: impl Into<String>, data: Payload) -> Self {
        Self::Event {
            event_name: event_name.into(),
            data,
        }
    }

    /// Call id of a result or error reply.
    pub const fn call_id(&self) -> Option<CallId> {
        match self {
            Self::Result { call_id, .. } | Self::Error { call_id, .. } => Some(*call_id),
            Self::Event { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_payload_carries_argument_tuples() {
        let args = Payload::encode(&(3usize, 17usize)).unwrap();
        let (start, end): (usize, usize) = args.decode().unwrap();
        assert_eq!((start, end), (3, 17));
    }

    #[test]
    fn test_payload_decoded_as_wrong_type_fails() {
        let result = Payload::unit().decode::<(u64, u64)>();
        assert!(matches!(
            result,
            Err(TransportError::DeserializationFailed { .. })
        ));
    }

    #[test]
    fn test_unit_payload_decodes_as_unit() {
        Payload::unit().decode::<()>().unwrap();
        assert!(Payload::unit().is_empty());
    }

    #[test]
    fn test_request_constructors() {
        let factory = WorkerRequest::factory(4, 2, "createEdgesProvider", Payload::unit(), 9);
        assert_eq!(factory.disposition, Disposition::Factory);
        assert_eq!(factory.new_object_id, Some(9));

        let create = WorkerRequest::create(1, 5, "HeapSnapshotLoader");
        assert_eq!(create.object_id, 5);
        assert_eq!(create.method_name, "HeapSnapshotLoader");

        let evaluate = WorkerRequest::evaluate(2, "1 + 1");
        assert_eq!(evaluate.source.as_deref(), Some("1 + 1"));
    }

    #[test]
    fn test_reply_call_id() {
        assert_eq!(WorkerReply::result(3, None).call_id(), Some(3));
        assert_eq!(WorkerReply::error(4, "boom", "m").call_id(), Some(4));
        assert_eq!(WorkerReply::event("progress", Payload::unit()).call_id(), None);
    }
}
