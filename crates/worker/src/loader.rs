//! Accumulates snapshot text and builds the snapshot from it.

use heapscope_core::{Error, Result};
use heapscope_ipc::{Payload, methods};
use tracing::info;

use crate::dispatcher::{CallContext, Dispatch, WorkerObject, arguments, value};
use crate::format::SnapshotDocument;
use crate::snapshot::InMemorySnapshot;

#[derive(Debug, Default)]
pub struct SnapshotLoader {
    text: String,
    closed: bool,
}

impl SnapshotLoader {
    pub fn write(&mut self, chunk: &str) -> Result<()> {
        if self.closed {
            return Err(Error::invalid_request("write after close"));
        }
        self.text.push_str(chunk);
        Ok(())
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Parse everything written so far. The loader is empty afterwards.
    pub fn build_snapshot(&mut self, ctx: &mut CallContext) -> Result<InMemorySnapshot> {
        if !self.closed {
            return Err(Error::invalid_request("loader must be closed before building"));
        }
        let text = std::mem::take(&mut self.text);
        ctx.emit(methods::PROGRESS_EVENT, "Parsing snapshot");
        let document: SnapshotDocument =
            serde_json::from_str(&text).map_err(|e| Error::snapshot_parse(e.to_string()))?;

        ctx.emit(methods::PROGRESS_EVENT, "Building edge indexes");
        let snapshot = InMemorySnapshot::from_document(document)?;
        info!(
            uid = snapshot.uid(),
            nodes = snapshot.node_count(),
            edges = snapshot.edge_count(),
            "Snapshot built"
        );
        ctx.emit(methods::PROGRESS_EVENT, "Finished");
        Ok(snapshot)
    }
}

impl WorkerObject for SnapshotLoader {
    fn class_name(&self) -> &'static str {
        methods::SNAPSHOT_LOADER
    }

    fn call(&mut self, method: &str, args: &Payload, ctx: &mut CallContext) -> Result<Dispatch> {
        match method {
            methods::WRITE => {
                let (chunk,): (String,) = arguments(args)?;
                self.write(&chunk)?;
                value(&())
            }
            methods::CLOSE => {
                self.close();
                value(&())
            }
            methods::BUILD_SNAPSHOT => Ok(Dispatch::Object(Box::new(self.build_snapshot(ctx)?))),
            _ => Err(Error::unknown_method(self.class_name(), method)),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    const TINY: &str = r#"{"nodes": [
        {"id": 1, "name": "(root)", "type": "synthetic", "self_size": 0,
         "edges": [{"name": "a", "type": "property", "to": 2}]},
        {"id": 2, "name": "A", "type": "object", "self_size": 10}
    ]}"#;

    #[test]
    fn test_chunks_are_concatenated() {
        let mut loader = SnapshotLoader::default();
        let (head, tail) = TINY.split_at(40);
        loader.write(head).unwrap();
        loader.write(tail).unwrap();
        loader.close();

        let mut ctx = CallContext::default();
        let snapshot = loader.build_snapshot(&mut ctx).unwrap();
        assert_eq!(snapshot.node_count(), 2);
    }

    #[test]
    fn test_build_requires_close() {
        let mut loader = SnapshotLoader::default();
        loader.write(TINY).unwrap();
        let result = loader.build_snapshot(&mut CallContext::default());
        assert!(matches!(result, Err(Error::InvalidRequest { .. })));
    }

    #[test]
    fn test_malformed_text_is_a_parse_error() {
        let mut loader = SnapshotLoader::default();
        loader.write("{\"nodes\": [").unwrap();
        loader.close();
        assert!(loader.write("more").is_err());
        let result = loader.build_snapshot(&mut CallContext::default());
        assert!(matches!(result, Err(Error::SnapshotParse { .. })));
    }
}
