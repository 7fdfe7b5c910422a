//! Wire DTOs and boundary validation.
//!
//! Request bodies are deserialized tolerantly, then validated into domain
//! values; all constraint checks live here so handlers and the orchestrator
//! work with well-formed input.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bakery_orchestrator::{CreateSliceResource, RoutedResource};
use bakery_state::{
    PieSliceCounts, Slice, SliceStatusCounts, SliceWithResources,
};

use crate::error::ApiError;

/// Maximum resource key length.
const MAX_KEY_LEN: usize = 64;

// ── Requests ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreatePieRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSliceRequest {
    pub pie_id: String,
    pub resources: Vec<CreateSliceResource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSlicesQuery {
    pub pie_id: Option<String>,
    pub all: Option<bool>,
}

/// Validate a create-slice body: identifier present, resources non-empty,
/// keys well-formed and unique within the request, at most one primary
/// HTTP entry.
pub fn validate_create_slice(
    request: CreateSliceRequest,
) -> Result<(String, Vec<CreateSliceResource>), ApiError> {
    let pie_id = request.pie_id.trim().to_string();
    if pie_id.is_empty() {
        return Err(ApiError::InvalidArgument("pieId must not be empty".to_string()));
    }
    if request.resources.is_empty() {
        return Err(ApiError::InvalidArgument(
            "resources must contain at least one entry".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut primary_http = 0;
    for resource in &request.resources {
        validate_key(&resource.key)?;
        if !seen.insert(resource.key.clone()) {
            return Err(ApiError::InvalidArgument(format!(
                "duplicate resource key '{}'",
                resource.key
            )));
        }
        if resource.protocol == bakery_state::Protocol::Http
            && resource.expose == bakery_state::Expose::Primary
        {
            primary_http += 1;
        }
    }
    if primary_http > 1 {
        return Err(ApiError::InvalidArgument(
            "at most one resource may be exposed as primary http".to_string(),
        ));
    }

    Ok((pie_id, request.resources))
}

/// Resource keys match `^[a-z0-9][a-z0-9-]*$` and are at most 64 chars.
fn validate_key(key: &str) -> Result<(), ApiError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit())
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ApiError::InvalidArgument(format!("invalid resource key '{key}'")))
    }
}

// ── Responses ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PieList {
    pub pies: Vec<bakery_state::Pie>,
}

/// A slice with its resources in list responses; route URLs are derived
/// against the current router port.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceView {
    #[serde(flatten)]
    pub slice: Slice,
    pub resources: Vec<RoutedResource>,
}

impl SliceView {
    pub fn from_stored(stored: SliceWithResources, router_port: u16) -> Self {
        let resources = stored
            .resources
            .iter()
            .map(|r| RoutedResource::from_stored(r, router_port))
            .collect();
        Self {
            slice: stored.slice,
            resources,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SliceList {
    pub slices: Vec<SliceView>,
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub port: u16,
    pub router_port: u16,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub daemon: DaemonStatus,
    pub pies: PiesStatus,
    pub slices: SlicesStatus,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatus {
    pub status: String,
    pub host: String,
    pub port: u16,
    pub router_port: u16,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PiesStatus {
    pub total: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlicesStatus {
    pub total: i64,
    pub by_status: SliceStatusCounts,
    pub by_pie: Vec<PieSliceCounts>,
}
