//! bakery-state — embedded relational state store for Bakery.
//!
//! Backed by SQLite via [sqlx](https://docs.rs/sqlx), owns all persisted
//! daemon state: pies, slices, slice resources, and the append-only audit
//! log.
//!
//! # Architecture
//!
//! Uniqueness invariants (pie slugs, slice hosts, allocated ports, route
//! hosts) and cascade behavior are enforced by the database schema, not by
//! application code. Every public operation is one transaction; composite
//! workflows (slice creation with resources, cascading pie deletion) run
//! their multi-row writes atomically so partial state is never observable.
//!
//! The `Store` is `Clone` + `Send` + `Sync` (backed by a `SqlitePool`) and
//! can be shared across async tasks.

pub mod error;
pub mod schema;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use store::Store;
pub use types::*;
