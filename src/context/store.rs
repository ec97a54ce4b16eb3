//! Context store contract: type-erased core operations plus a typed
//! convenience layer for callers that know the shape of their values.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

/// A context value: `Arc`-shared so snapshots copy by reference
pub type ContextValue = Arc<dyn Any + Send + Sync>;

/// A registered lazy initializer, evaluated at most once per owning scope
pub type InitSupplier = Arc<dyn Fn() -> ContextValue + Send + Sync>;

/// Context retrieval errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("No context value stored under key '{key}'")]
    Missing { key: String },

    #[error("Context value under key '{key}' cannot be retrieved as {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

/// Store contract exposed to step-execution code
///
/// All operations are total and scoped to the calling owner; only the typed
/// retrieval on [`ContextStoreExt`] can fail, and only with a
/// [`ContextError`] local to that call.
pub trait ContextStore: Send + Sync {
    /// Unconditional overwrite of the value under `key`
    fn put_value(&self, key: &str, value: ContextValue);

    /// Current value under `key`, or `None` if absent
    fn get_value(&self, key: &str) -> Option<ContextValue>;

    /// Get-or-create: if absent, `supplier` is invoked exactly once within
    /// the owning scope, its result stored under `key` and returned
    fn get_or_insert_value(&self, key: &str, supplier: &dyn Fn() -> ContextValue) -> ContextValue;

    /// Remove and return the value under `key`
    fn remove(&self, key: &str) -> Option<ContextValue>;

    /// Discard the owning scope's store
    fn clear(&self);

    /// Number of entries visible to the calling owner
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a lazy initializer for `key` without evaluating it
    ///
    /// The supplier must be safe to call at most once per owning scope.
    fn put_init_value_supplier(&self, key: &str, supplier: InitSupplier);

    /// Force evaluation of every registered-but-unmaterialized initializer
    /// for the calling owner, then copy all current entries (by reference)
    /// into `destination`
    fn copy_all_to(&self, destination: &mut HashMap<String, ContextValue>);

    /// Bulk-import entries into the calling owner's scope, overwriting on
    /// key collision
    fn put_all(&self, source: &HashMap<String, ContextValue>);
}

/// Typed convenience layer over [`ContextStore`]
pub trait ContextStoreExt: ContextStore {
    /// Store `value` under `key`, overwriting any previous value
    fn put<T: Any + Send + Sync>(&self, key: &str, value: T) {
        self.put_value(key, Arc::new(value));
    }

    /// Current value under `key` as `T`; `None` if absent or of another type
    fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get_value(key).and_then(|value| value.downcast().ok())
    }

    /// Current value under `key` as `T`, failing with a type-mismatch error
    /// if the stored value is incompatible
    fn get_required<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, ContextError> {
        let value = self.get_value(key).ok_or_else(|| ContextError::Missing {
            key: key.to_owned(),
        })?;
        value.downcast().map_err(|_| ContextError::TypeMismatch {
            key: key.to_owned(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Get-or-create with a typed compute function
    ///
    /// Fails with a type-mismatch error when a value of another type is
    /// already stored under `key`.
    fn get_or_compute<T: Any + Send + Sync>(
        &self,
        key: &str,
        compute: impl Fn() -> T,
    ) -> Result<Arc<T>, ContextError> {
        let value = self.get_or_insert_value(key, &|| Arc::new(compute()) as ContextValue);
        value.downcast().map_err(|_| ContextError::TypeMismatch {
            key: key.to_owned(),
            expected: std::any::type_name::<T>(),
        })
    }
}

impl<S: ContextStore + ?Sized> ContextStoreExt for S {}
