//! Thread-confined implementation of the context store.
//!
//! Every calling thread is transparently routed to its own private backing
//! store, created on first use. A single registry of pending lazy
//! initializers is shared across all threads, so any thread can be the first
//! to materialize a given key, but materialized values are never shared:
//! each thread that triggers a shared initializer runs it independently into
//! its own store.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use tracing::trace;

use super::store::{ContextStore, ContextValue, InitSupplier};

/// Context store where each calling thread owns an independent instance
#[derive(Default)]
pub struct ThreadConfinedContext {
    /// Per-thread backing stores, keyed by calling thread identity
    stores: DashMap<ThreadId, HashMap<String, ContextValue>>,
    /// Pending lazy initializers, shared across all threads
    init_suppliers: DashMap<String, InitSupplier>,
}

impl ThreadConfinedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the calling thread's store, creating it on first use
    ///
    /// The store guard must not be held across initializer invocations;
    /// suppliers may call back into the context on the same thread.
    fn with_store<R>(&self, f: impl FnOnce(&mut HashMap<String, ContextValue>) -> R) -> R {
        let mut store = self.stores.entry(thread::current().id()).or_default();
        f(store.value_mut())
    }

    /// Run `f` against the calling thread's store if it exists
    fn with_existing_store<R>(&self, f: impl FnOnce(&HashMap<String, ContextValue>) -> R) -> Option<R> {
        self.stores
            .get(&thread::current().id())
            .map(|store| f(store.value()))
    }

    /// Materialize the registered initializer for `key` into the calling
    /// thread's store, unless a value is already present
    fn materialize(&self, key: &str) -> Option<ContextValue> {
        let supplier = self
            .init_suppliers
            .get(key)
            .map(|entry| InitSupplier::clone(entry.value()))?;
        // Evaluate outside any map guard.
        let value = supplier();
        trace!(key, "Materialized lazily-initialized context value");
        Some(self.with_store(|store| {
            store
                .entry(key.to_owned())
                .or_insert(value)
                .clone()
        }))
    }
}

impl ContextStore for ThreadConfinedContext {
    fn put_value(&self, key: &str, value: ContextValue) {
        self.with_store(|store| {
            store.insert(key.to_owned(), value);
        });
    }

    fn get_value(&self, key: &str) -> Option<ContextValue> {
        if let Some(found) = self.with_existing_store(|store| store.get(key).cloned()).flatten() {
            return Some(found);
        }
        self.materialize(key)
    }

    fn get_or_insert_value(&self, key: &str, supplier: &dyn Fn() -> ContextValue) -> ContextValue {
        if let Some(found) = self.get_value(key) {
            return found;
        }
        // Evaluate outside any map guard.
        let value = supplier();
        self.with_store(|store| store.entry(key.to_owned()).or_insert(value).clone())
    }

    fn remove(&self, key: &str) -> Option<ContextValue> {
        self.with_store(|store| store.remove(key))
    }

    /// Discards the calling thread's store entirely; a subsequent operation
    /// on this thread starts from a fresh store
    fn clear(&self) {
        self.stores.remove(&thread::current().id());
    }

    fn len(&self) -> usize {
        self.with_existing_store(HashMap::len).unwrap_or(0)
    }

    fn put_init_value_supplier(&self, key: &str, supplier: InitSupplier) {
        self.init_suppliers.insert(key.to_owned(), supplier);
    }

    fn copy_all_to(&self, destination: &mut HashMap<String, ContextValue>) {
        // Force initializers for the current thread only; other threads
        // materialize independently when they need to.
        let pending: Vec<String> = self
            .init_suppliers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in pending {
            let already_materialized = self
                .with_existing_store(|store| store.contains_key(&key))
                .unwrap_or(false);
            if !already_materialized {
                self.materialize(&key);
            }
        }
        let _ = self.with_existing_store(|store| {
            for (key, value) in store {
                destination.insert(key.clone(), value.clone());
            }
        });
    }

    fn put_all(&self, source: &HashMap<String, ContextValue>) {
        self.with_store(|store| {
            for (key, value) in source {
                store.insert(key.clone(), value.clone());
            }
        });
    }
}
