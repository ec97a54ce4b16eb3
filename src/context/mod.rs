//! # Test Context System
//!
//! Key/value state shared with step-execution code, scoped to whatever unit
//! of concurrency owns the store instance.
//!
//! ## Architecture
//!
//! - [`ContextStore`] - the object-safe store contract over type-erased
//!   values, plus the [`ContextStoreExt`] typed convenience layer
//! - [`ThreadConfinedContext`] - an implementation where every calling thread
//!   transparently owns an independent, non-shared backing store, so
//!   concurrent callers never observe each other's writes
//!
//! Values are `Arc`-shared ([`ContextValue`]), so snapshots copy by reference
//! rather than deep copy. Lazy initializers registered through
//! [`ContextStore::put_init_value_supplier`] are shared across threads and
//! evaluated at most once per owning scope, on first access or when forced
//! during a snapshot.

pub mod store;
pub mod thread_context;

pub use store::{ContextError, ContextStore, ContextStoreExt, ContextValue, InitSupplier};
pub use thread_context::ThreadConfinedContext;
