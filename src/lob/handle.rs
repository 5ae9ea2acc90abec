//! Object handles
//!
//! - [`LargeObject`]: plain identifiers plus sizes, owned by one caller
//! - [`ObjectRef`]: a counted reference to a complete object; the last drop
//!   releases it

use std::sync::Arc;

use tracing::error;

use crate::error::Result;

use super::{LargeObjectStore, ObjectStream};

/// Handle to one large object
///
/// Holds no storage resources; every call resolves `id` against the store.
/// Not `Clone`: the design assumes a single writer per open object.
#[derive(Debug, PartialEq, Eq)]
pub struct LargeObject {
    pub(crate) id: i64,
    pub(crate) declared_size: i64,
    pub(crate) current_size: i64,
    pub(crate) compressed: bool,
    pub(crate) complete: bool,
}

impl LargeObject {
    /// Descriptor slot index
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Capacity requested at creation
    pub fn declared_size(&self) -> i64 {
        self.declared_size
    }

    /// Bytes written so far; the total size once complete
    pub fn current_size(&self) -> i64 {
        self.current_size
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// Counted reference to a complete object
///
/// Creating one (via [`LargeObjectStore::acquire`]) establishes one persistent
/// reference. Clones share it; when the last clone drops the reference is
/// released, destroying the object if no other reference remains.
#[derive(Clone)]
pub struct ObjectRef {
    holder: Arc<Holder>,
}

struct Holder {
    store: Arc<LargeObjectStore>,
    id: i64,
    armed: bool,
}

impl ObjectRef {
    pub(crate) fn new(store: Arc<LargeObjectStore>, id: i64) -> Self {
        Self {
            holder: Arc::new(Holder {
                store,
                id,
                armed: true,
            }),
        }
    }

    /// Descriptor slot index of the referenced object
    pub fn id(&self) -> i64 {
        self.holder.id
    }

    /// Fresh handle to the referenced object
    pub fn object(&self) -> Result<LargeObject> {
        self.holder.store.get_object(self.holder.id)
    }

    /// Read stream over the referenced object
    pub fn stream(&self) -> Result<ObjectStream> {
        let object = self.object()?;
        Ok(ObjectStream::new(Arc::clone(&self.holder.store), object))
    }

    /// Release explicitly, surfacing errors that `Drop` can only log.
    ///
    /// Returns `true` if this release destroyed the object. If other clones
    /// are still alive, nothing is released and `false` is returned.
    pub fn release(self) -> Result<bool> {
        match Arc::try_unwrap(self.holder) {
            Ok(mut holder) => {
                holder.armed = false;
                holder.store.release_reference(holder.id)
            }
            Err(_shared) => Ok(false),
        }
    }
}

impl std::fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRef")
            .field("id", &self.holder.id)
            .field("clones", &Arc::strong_count(&self.holder))
            .finish()
    }
}

impl Drop for Holder {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.store.release_reference(self.id) {
            error!(id = self.id, error = %e, "failed to release object reference on drop");
        }
    }
}
