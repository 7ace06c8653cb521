//! Local references to worker-side objects.

use std::sync::atomic::{AtomicBool, Ordering};

use heapscope_core::{Error, Result};
use heapscope_ipc::ObjectId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::proxy::RemoteCallProxy;

/// A remote object owned by exactly one local component.
///
/// Not `Clone`: sharing goes through an `Arc` owned by that component.
/// Dropping a handle does not dispose the remote object.
#[derive(Debug)]
pub struct RemoteHandle {
    object_id: ObjectId,
    proxy: RemoteCallProxy,
    disposed: AtomicBool,
}

impl RemoteHandle {
    pub(crate) const fn new(object_id: ObjectId, proxy: RemoteCallProxy) -> Self {
        Self {
            object_id,
            proxy,
            disposed: AtomicBool::new(false),
        }
    }

    pub const fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Call `method` and await its typed result.
    ///
    /// Fails locally with `HandleDisposed`, sending nothing, once the handle
    /// has been disposed.
    pub async fn call_method<A, T>(&self, method: &str, args: &A) -> Result<T>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.ensure_live()?;
        self.proxy.call(self.object_id, method, args).await
    }

    /// Call `method` without waiting for its result.
    pub fn call_method_detached<A>(&self, method: &str, args: &A) -> Result<()>
    where
        A: Serialize + ?Sized,
    {
        self.ensure_live()?;
        self.proxy.call_detached(self.object_id, method, args)
    }

    /// Call a factory method; the returned handle names the object it
    /// builds and is valid immediately.
    pub fn call_factory<A>(&self, method: &str, args: &A) -> Result<RemoteHandle>
    where
        A: Serialize + ?Sized,
    {
        self.ensure_live()?;
        self.proxy.call_factory(self.object_id, method, args)
    }

    /// Dispose the remote object. The handle is unusable from here on.
    ///
    /// Disposing twice sends a second dispose message, which the worker
    /// tolerates.
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            debug!(object_id = self.object_id, "Handle disposed twice");
        }
        self.proxy.send_dispose(self.object_id)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(Error::HandleDisposed {
                object_id: self.object_id,
            })
        } else {
            Ok(())
        }
    }
}
