use crate::error::{Error, Outcome};
use crate::sync::UnsafeCell;
use derive_more::{Deref, Display};
use indexmap::{IndexMap as _IndexMap, IndexSet as _IndexSet};
use rustc_hash::FxBuildHasher;
use std::any::Any;
use std::borrow::Borrow;
use std::collections::HashMap as _HashMap;
use std::sync::Arc;

/// A minimal `UnsafeCell` wrapper that is `Sync` when `T: Send`.
///
/// Used internally where interior mutability crosses threads while
/// exclusive access is ensured by protocol (single-fire latches, slot
/// buffers written at distinct indices, status-word gating). Accessors
/// mirror the loom cell API so the same call sites compile under model
/// checking.
#[repr(transparent)]
pub(crate) struct SyncUnsafeCell<T>(UnsafeCell<T>);

unsafe impl<T: Send> Sync for SyncUnsafeCell<T> {}
unsafe impl<T: Send> Send for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    pub(crate) fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }
}

#[cfg(not(feature = "loom"))]
impl<T> SyncUnsafeCell<T> {
    pub(crate) fn with<R>(&self, f: impl FnOnce(*const T) -> R) -> R {
        f(self.0.get())
    }

    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
        f(self.0.get())
    }
}

#[cfg(feature = "loom")]
impl<T> SyncUnsafeCell<T> {
    pub(crate) fn with<R>(&self, f: impl FnOnce(*const T) -> R) -> R {
        self.0.with(f)
    }

    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
        self.0.with_mut(f)
    }
}

/// Unique identifier of a node in a graph.
///
/// Cheaply clonable; maps keyed by `NodeId` can be queried with plain
/// `&str` borrows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deref, Display)]
#[display("{_0}")]
pub struct NodeId(Arc<str>);

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(Arc::from(id))
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(Arc::from(id.as_str()))
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Dynamically typed node result.
///
/// Node functions produce and consume heterogeneous values; results are
/// shared by reference counting so a settled cell can broadcast them.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Wraps a concrete value into a [`Value`].
pub fn value<T: Any + Send + Sync>(val: T) -> Value {
    Arc::new(val)
}

/// Downcasts a [`Value`] to a concrete type.
#[must_use]
pub fn value_as<T: Any>(val: &Value) -> Option<&T> {
    val.downcast_ref::<T>()
}

/// Reads a dependency result out of a map, downcast to a concrete type.
///
/// Convenience for node functions; absence and type mismatches surface as
/// user errors.
pub fn dep<T: Any + Clone>(deps: &ResultMap, id: &str) -> Outcome<T> {
    let val = deps
        .get(id)
        .ok_or_else(|| Error::msg(format!("dependency {id} is absent")))?;
    val.downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| Error::msg(format!("dependency {id} has unexpected type")))
}

/// `IndexMap` type with fast hasher.
pub type IndexMap<K, V> = _IndexMap<K, V, FxBuildHasher>;
pub(crate) type IndexSet<T> = _IndexSet<T, FxBuildHasher>;
pub(crate) type HashMap<K, V> = _HashMap<K, V, FxBuildHasher>;

/// Node results keyed by identifier, in registration order.
pub type ResultMap = IndexMap<NodeId, Value>;
