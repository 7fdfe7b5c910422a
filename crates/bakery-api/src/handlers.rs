//! Control-plane handlers.
//!
//! Each handler validates its input, reads/writes through the store or the
//! orchestrator, and returns typed JSON. Audit entries are appended inside
//! the store transactions that perform the mutations.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;

use bakery_orchestrator::{slugify, OrchestratedSlice};
use bakery_state::{Pie, Slice, SliceFilter};

use crate::error::ApiError;
use crate::wire::*;
use crate::ApiState;

/// GET /v1/health
pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        port: state.port,
        router_port: state.router_port.get(),
    })
}

/// GET /v1/status
pub async fn status(State(state): State<ApiState>) -> Result<Json<StatusResponse>, ApiError> {
    let snapshot = state.store.status_snapshot().await?;
    Ok(Json(StatusResponse {
        daemon: DaemonStatus {
            status: "ok".to_string(),
            host: state.host.clone(),
            port: state.port,
            router_port: state.router_port.get(),
        },
        pies: PiesStatus { total: snapshot.pies },
        slices: SlicesStatus {
            total: snapshot.by_status.total(),
            by_status: snapshot.by_status,
            by_pie: snapshot.by_pie,
        },
        generated_at: Utc::now(),
    }))
}

/// GET /v1/pies
pub async fn list_pies(State(state): State<ApiState>) -> Result<Json<PieList>, ApiError> {
    let pies = state.store.list_pies().await?;
    Ok(Json(PieList { pies }))
}

/// POST /v1/pies
///
/// The slug is derived server-side from the name; a name that slugs to
/// nothing is rejected, a taken slug conflicts.
pub async fn create_pie(
    State(state): State<ApiState>,
    body: Result<Json<CreatePieRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Pie>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::InvalidArgument(e.body_text()))?;
    if request.name.trim().is_empty() {
        return Err(ApiError::InvalidArgument("name must not be empty".to_string()));
    }

    let slug = slugify(&request.name);
    if slug.is_empty() {
        return Err(ApiError::InvalidArgument(format!(
            "name '{}' produces an empty slug",
            request.name
        )));
    }

    match state.store.create_pie(&request.name, &slug).await {
        Ok(pie) => Ok((StatusCode::CREATED, Json(pie))),
        Err(e) if e.is_conflict() => Err(ApiError::SlugConflict(format!(
            "Pie slug '{slug}' already exists"
        ))),
        Err(e) => Err(e.into()),
    }
}

/// DELETE /v1/pies/{idOrSlug}
pub async fn delete_pie(
    State(state): State<ApiState>,
    Path(id_or_slug): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    let pie = state
        .store
        .find_pie_by_id_or_slug(&id_or_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound("Pie not found".to_string()))?;
    state.store.delete_pie_cascade(&pie.id).await?;
    Ok(Json(Ack::ok()))
}

/// GET /v1/slices
///
/// `pieId` scopes to one pie (unknown pie → empty list); `all=true` includes
/// stopped slices; with neither, non-stopped slices are listed. The two
/// parameters are mutually exclusive.
pub async fn list_slices(
    State(state): State<ApiState>,
    query: Result<Query<ListSlicesQuery>, QueryRejection>,
) -> Result<Json<SliceList>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::InvalidArgument(e.body_text()))?;
    if query.pie_id.is_some() && query.all.is_some() {
        return Err(ApiError::InvalidArgument(
            "pieId and all are mutually exclusive".to_string(),
        ));
    }

    let filter = match (&query.pie_id, query.all) {
        (Some(identifier), _) => match state.store.find_pie_by_id_or_slug(identifier).await? {
            Some(pie) => SliceFilter::Pie(pie.id),
            None => return Ok(Json(SliceList { slices: Vec::new() })),
        },
        (None, Some(true)) => SliceFilter::All,
        _ => SliceFilter::NonStopped,
    };

    let stored = state.store.list_slices(filter).await?;
    let router_port = state.router_port.get();
    let slices = stored
        .into_iter()
        .map(|s| SliceView::from_stored(s, router_port))
        .collect();
    Ok(Json(SliceList { slices }))
}

/// POST /v1/slices
pub async fn create_slice(
    State(state): State<ApiState>,
    body: Result<Json<CreateSliceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrchestratedSlice>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::InvalidArgument(e.body_text()))?;
    let (pie_identifier, resources) = validate_create_slice(request)?;

    let pie = state
        .store
        .find_pie_by_id_or_slug(&pie_identifier)
        .await?
        .ok_or_else(|| ApiError::NotFound("Pie not found".to_string()))?;

    let slice = state.orchestrator.create_slice(&pie, resources).await?;
    Ok((StatusCode::CREATED, Json(slice)))
}

/// POST /v1/slices/{id}/stop
pub async fn stop_slice(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Slice>, ApiError> {
    if state.store.get_slice_by_id(&id).await?.is_none() {
        return Err(ApiError::NotFound("Slice not found".to_string()));
    }
    let slice = state.orchestrator.stop_slice(&id).await?;
    Ok(Json(slice))
}

/// DELETE /v1/slices/{id}
pub async fn delete_slice(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    if state.store.get_slice_by_id(&id).await?.is_none() {
        return Err(ApiError::NotFound("Slice not found".to_string()));
    }
    state.orchestrator.remove_slice(&id).await?;
    Ok(Json(Ack::ok()))
}
