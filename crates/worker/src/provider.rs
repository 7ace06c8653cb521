//! Worker-side children provider.

use heapscope_core::{Comparator, Error, Item, Result, SnapshotObjectId, SortedItems};
use heapscope_ipc::{Payload, methods};

use crate::dispatcher::{CallContext, Dispatch, WorkerObject, arguments, value};

/// Serves sorted windows over a list built by a snapshot factory.
#[derive(Debug)]
pub struct WorkerProvider {
    items: SortedItems,
}

impl WorkerProvider {
    pub const fn new(items: Vec<Item>) -> Self {
        Self {
            items: SortedItems::new(items),
        }
    }
}

impl WorkerObject for WorkerProvider {
    fn class_name(&self) -> &'static str {
        "HeapSnapshotProvider"
    }

    fn call(&mut self, method: &str, args: &Payload, _ctx: &mut CallContext) -> Result<Dispatch> {
        match method {
            methods::SORT_AND_REWIND => {
                let (comparator,): (Comparator,) = arguments(args)?;
                self.items.sort(&comparator);
                value(&())
            }
            methods::SERIALIZE_ITEMS_RANGE => {
                let (start, end): (usize, usize) = arguments(args)?;
                value(&self.items.range(start, end))
            }
            methods::IS_EMPTY => value(&self.items.is_empty()),
            methods::NODE_POSITION => {
                let (id,): (SnapshotObjectId,) = arguments(args)?;
                value(&self.items.position_of(id))
            }
            _ => Err(Error::unknown_method(self.class_name(), method)),
        }
    }
}
