//! bakery-api — HTTP/JSON control plane for Bakery.
//!
//! Provides axum route handlers for managing pies and slices, plus the
//! daemon's health and status endpoints.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/v1/health` | Liveness probe |
//! | GET | `/v1/status` | Dashboard snapshot |
//! | GET | `/v1/pies` | List pies, newest first |
//! | POST | `/v1/pies` | Create a pie (slug derived from name) |
//! | DELETE | `/v1/pies/{idOrSlug}` | Delete a pie and all its slices |
//! | GET | `/v1/slices` | List slices (`?pieId=` or `?all=true`) |
//! | POST | `/v1/slices` | Create a slice with its resources |
//! | POST | `/v1/slices/{id}/stop` | Idempotently stop a slice |
//! | DELETE | `/v1/slices/{id}` | Delete a slice |
//!
//! Every failure body is `{"error": string}`; validation happens at this
//! boundary only.

pub mod error;
pub mod handlers;
pub mod wire;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;

use bakery_orchestrator::{Orchestrator, RouterPort};
use bakery_state::Store;

pub use error::ApiError;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
    pub orchestrator: Arc<Orchestrator>,
    /// Advertised daemon identity, reported by health/status.
    pub host: String,
    pub port: u16,
    pub router_port: RouterPort,
}

/// Build the complete control-plane router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/health", get(handlers::health))
        .route("/v1/status", get(handlers::status))
        .route("/v1/pies", get(handlers::list_pies).post(handlers::create_pie))
        .route("/v1/pies/{id_or_slug}", delete(handlers::delete_pie))
        .route("/v1/slices", get(handlers::list_slices).post(handlers::create_slice))
        .route("/v1/slices/{id}/stop", post(handlers::stop_slice))
        .route("/v1/slices/{id}", delete(handlers::delete_slice))
        .with_state(state)
}
