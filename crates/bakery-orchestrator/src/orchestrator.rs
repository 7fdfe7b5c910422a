//! Slice orchestration — create, stop, remove.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use bakery_allocator::{AllocError, PortAllocator};
use bakery_state::{
    Expose, NewSlice, NewSliceResource, Pie, Protocol, Slice, SliceResource, SliceStatus,
    SliceWithResources, Store, StoreError,
};

use crate::router_port::{route_url, RouterPort};

/// Errors from orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// One requested resource binding for a new slice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateSliceResource {
    pub key: String,
    pub protocol: Protocol,
    pub expose: Expose,
}

/// A persisted resource enriched with its synthesized route URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutedResource {
    pub key: String,
    pub protocol: Protocol,
    pub expose: Expose,
    pub allocated_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_url: Option<String>,
}

impl RoutedResource {
    /// Build the wire view of a stored resource, deriving the route URL
    /// from the router port.
    pub fn from_stored(resource: &SliceResource, router_port: u16) -> Self {
        Self {
            key: resource.key.clone(),
            protocol: resource.protocol,
            expose: resource.expose,
            allocated_port: resource.allocated_port,
            route_host: resource.route_host.clone(),
            route_url: resource
                .route_host
                .as_deref()
                .map(|host| route_url(host, router_port)),
        }
    }
}

/// A freshly created or looked-up slice with its resources, pie slug, and
/// the router port its URLs were built against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratedSlice {
    #[serde(flatten)]
    pub slice: Slice,
    pub resources: Vec<RoutedResource>,
    pub pie_slug: String,
    pub router_port: u16,
}

impl OrchestratedSlice {
    pub fn from_stored(stored: SliceWithResources, pie_slug: String, router_port: u16) -> Self {
        let resources = stored
            .resources
            .iter()
            .map(|r| RoutedResource::from_stored(r, router_port))
            .collect();
        Self {
            slice: stored.slice,
            resources,
            pie_slug,
            router_port,
        }
    }

    /// The projection consumed by env-file bootstrap tooling: the primary
    /// HTTP URL (if any) and every allocated port in request order.
    pub fn summary(&self) -> SliceSummary {
        let url = self
            .resources
            .iter()
            .find(|r| r.protocol == Protocol::Http && r.expose == Expose::Primary)
            .and_then(|r| r.route_url.clone());
        SliceSummary {
            url,
            allocated_ports: self.resources.iter().map(|r| r.allocated_port).collect(),
        }
    }
}

/// Derived slice output: primary URL plus ports in request order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SliceSummary {
    pub url: Option<String>,
    pub allocated_ports: Vec<u16>,
}

/// Coordinates slice lifecycle against the store and the port allocator.
pub struct Orchestrator {
    store: Store,
    allocator: Arc<PortAllocator>,
    host_suffix: String,
    router_port: RouterPort,
    /// Serializes the create critical section (ordinal read, reserved-port
    /// read, allocation, persistence) so racing creates can never be
    /// assigned the same port, ordinal, or host.
    create_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        store: Store,
        allocator: Arc<PortAllocator>,
        host_suffix: impl Into<String>,
        router_port: RouterPort,
    ) -> Self {
        Self {
            store,
            allocator,
            host_suffix: host_suffix.into(),
            router_port,
            create_lock: Mutex::new(()),
        }
    }

    /// The provider route URLs are derived from.
    pub fn router_port(&self) -> &RouterPort {
        &self.router_port
    }

    /// Create a slice of `pie`: next ordinal, synthesized hostname, one
    /// allocated port per resource, route hosts/URLs for exposed HTTP
    /// resources. Persisted atomically in `running` state; any failure
    /// leaves no partial slice behind.
    ///
    /// Request-shape validation (non-empty resources, unique keys, at most
    /// one primary HTTP entry) is the caller's responsibility.
    pub async fn create_slice(
        &self,
        pie: &Pie,
        resources: Vec<CreateSliceResource>,
    ) -> Result<OrchestratedSlice, OrchestratorError> {
        debug_assert!(!resources.is_empty());

        let _guard = self.create_lock.lock().await;

        let ordinal = self.store.next_slice_ordinal(&pie.id).await?;
        let host = format!("{}-s{}.{}", pie.slug, ordinal, self.host_suffix);

        let reserved: HashSet<u16> = self.store.allocated_ports().await?.into_iter().collect();
        let ports = self.allocator.allocate_many(resources.len(), &reserved).await?;
        debug!(%host, ?ports, "slice resources planned");

        let new_resources = resources
            .into_iter()
            .zip(&ports)
            .map(|(resource, &port)| {
                let route_host = match (resource.protocol, resource.expose) {
                    (Protocol::Http, Expose::Primary) => Some(host.clone()),
                    (Protocol::Http, Expose::Subdomain) => {
                        Some(format!("{}.{}", resource.key, host))
                    }
                    _ => None,
                };
                NewSliceResource {
                    key: resource.key,
                    protocol: resource.protocol,
                    expose: resource.expose,
                    allocated_port: port,
                    route_host,
                }
            })
            .collect();

        let stored = self
            .store
            .create_slice_with_resources(
                NewSlice {
                    pie_id: pie.id.clone(),
                    ordinal,
                    host,
                    status: SliceStatus::Running,
                },
                new_resources,
            )
            .await?;

        info!(host = %stored.slice.host, "slice created");
        Ok(OrchestratedSlice::from_stored(
            stored,
            pie.slug.clone(),
            self.router_port.get(),
        ))
    }

    /// Idempotently stop a slice.
    pub async fn stop_slice(&self, slice_id: &str) -> Result<Slice, OrchestratorError> {
        let slice = self.store.stop_slice(slice_id).await?;
        info!(host = %slice.host, "slice stopped");
        Ok(slice)
    }

    /// Delete a slice's persisted state (resources cascade).
    pub async fn remove_slice(&self, slice_id: &str) -> Result<Slice, OrchestratorError> {
        let slice = self.store.delete_slice(slice_id).await?;
        info!(host = %slice.host, "slice removed");
        Ok(slice)
    }
}
