//! bakery-orchestrator — slice lifecycle coordination.
//!
//! Composes the state store and the port allocator: creating a slice
//! assigns the next ordinal, synthesizes the slice hostname, allocates one
//! port per requested resource, derives route hosts and URLs, and persists
//! everything atomically.
//!
//! The router proxy's port is not known until the daemon has bound it, so
//! route URLs are built against a [`RouterPort`] provider that is resolved
//! once at startup.

pub mod orchestrator;
pub mod router_port;
pub mod slug;

pub use orchestrator::{
    CreateSliceResource, Orchestrator, OrchestratorError, OrchestratedSlice, RoutedResource,
    SliceSummary,
};
pub use router_port::RouterPort;
pub use slug::slugify;
