//! Domain types for the Bakery state store.
//!
//! These types mirror the persisted rows. Wire serialization uses camelCase
//! field names; enums serialize to their lowercase storage form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A project/workspace grouping. Slices of a pie share its slug.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pie {
    pub id: String,
    pub name: String,
    /// Lowercase `[a-z0-9-]+`, globally unique, at most 32 characters.
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a slice. Transitions are monotone: once `stopped`,
/// a slice stays stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceStatus {
    Creating,
    Running,
    Stopped,
    Error,
}

impl SliceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SliceStatus::Creating => "creating",
            SliceStatus::Running => "running",
            SliceStatus::Stopped => "stopped",
            SliceStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "creating" => Some(SliceStatus::Creating),
            "running" => Some(SliceStatus::Running),
            "stopped" => Some(SliceStatus::Stopped),
            "error" => Some(SliceStatus::Error),
            _ => None,
        }
    }
}

/// One running checkout of a pie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Slice {
    pub id: String,
    pub pie_id: String,
    /// Monotonically assigned per pie, starting at 1.
    pub ordinal: i64,
    /// Globally unique hostname, `<slug>-s<ordinal>.<host-suffix>`.
    pub host: String,
    pub status: SliceStatus,
    pub created_at: DateTime<Utc>,
    /// Set exactly when status becomes `stopped`.
    pub stopped_at: Option<DateTime<Utc>>,
}

/// Transport protocol of a slice resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Protocol::Http),
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            _ => None,
        }
    }
}

/// How a resource is exposed through the router proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expose {
    /// Routed at the slice host itself.
    Primary,
    /// Routed at `<key>.<slice host>`.
    Subdomain,
    /// Port only, no route.
    None,
}

impl Expose {
    pub fn as_str(self) -> &'static str {
        match self {
            Expose::Primary => "primary",
            Expose::Subdomain => "subdomain",
            Expose::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(Expose::Primary),
            "subdomain" => Some(Expose::Subdomain),
            "none" => Some(Expose::None),
            _ => None,
        }
    }
}

/// One port/route binding on a slice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SliceResource {
    pub id: String,
    pub slice_id: String,
    /// Lowercase `[a-z0-9][a-z0-9-]*`, unique within the slice.
    pub key: String,
    pub protocol: Protocol,
    pub expose: Expose,
    /// Globally unique across all currently persisted resources.
    pub allocated_port: u16,
    /// Present iff `protocol = http` and `expose` is `primary` or
    /// `subdomain`; globally unique when present.
    pub route_host: Option<String>,
    /// Derived: `protocol = http ∧ expose = primary`. At most one per slice.
    pub is_primary_http: bool,
    pub created_at: DateTime<Utc>,
}

/// A slice together with its resources, in resource creation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SliceWithResources {
    #[serde(flatten)]
    pub slice: Slice,
    pub resources: Vec<SliceResource>,
}

/// Input for inserting a slice row.
#[derive(Debug, Clone)]
pub struct NewSlice {
    pub pie_id: String,
    pub ordinal: i64,
    pub host: String,
    pub status: SliceStatus,
}

/// Input for inserting one resource row. `is_primary_http` is derived.
#[derive(Debug, Clone)]
pub struct NewSliceResource {
    pub key: String,
    pub protocol: Protocol,
    pub expose: Expose,
    pub allocated_port: u16,
    pub route_host: Option<String>,
}

impl NewSliceResource {
    pub fn is_primary_http(&self) -> bool {
        self.protocol == Protocol::Http && self.expose == Expose::Primary
    }
}

/// Append-only audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditKind {
    #[serde(rename = "pie.created")]
    PieCreated,
    #[serde(rename = "pie.deleted")]
    PieDeleted,
    #[serde(rename = "slice.created")]
    SliceCreated,
    #[serde(rename = "slice.stopped")]
    SliceStopped,
    #[serde(rename = "slice.deleted")]
    SliceDeleted,
}

impl AuditKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditKind::PieCreated => "pie.created",
            AuditKind::PieDeleted => "pie.deleted",
            AuditKind::SliceCreated => "slice.created",
            AuditKind::SliceStopped => "slice.stopped",
            AuditKind::SliceDeleted => "slice.deleted",
        }
    }
}

/// One audit log row. The FK columns are nulled when the referenced entity
/// is removed; `payload` carries the identifiers that must survive that.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub pie_id: Option<String>,
    pub slice_id: Option<String>,
    pub kind: String,
    /// Opaque JSON; the core never interprets it.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input for appending an audit row.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub kind: AuditKind,
    pub pie_id: Option<String>,
    pub slice_id: Option<String>,
    pub payload: serde_json::Value,
}

/// Derived view used by the router proxy: the mapping from a route host to
/// its upstream port and owning slice.
#[derive(Debug, Clone, PartialEq)]
pub struct HostRoute {
    pub route_host: String,
    pub allocated_port: u16,
    pub slice_id: String,
    pub pie_id: String,
    pub slice_status: SliceStatus,
}

/// Row filter for `Store::list_slices`.
#[derive(Debug, Clone, PartialEq)]
pub enum SliceFilter {
    /// Every slice whose status is not `stopped`.
    NonStopped,
    /// Every slice.
    All,
    /// Every slice of one pie (by pie id), regardless of status.
    Pie(String),
}

/// Per-status slice totals for the daemon status snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SliceStatusCounts {
    pub creating: i64,
    pub running: i64,
    pub stopped: i64,
    pub error: i64,
}

impl SliceStatusCounts {
    pub fn total(&self) -> i64 {
        self.creating + self.running + self.stopped + self.error
    }
}

/// Per-pie slice totals for the daemon status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PieSliceCounts {
    pub pie_id: String,
    pub pie_name: String,
    pub pie_slug: String,
    pub total: i64,
    pub running: i64,
}

/// Aggregate counts backing `GET /v1/status`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub pies: i64,
    pub by_status: SliceStatusCounts,
    pub by_pie: Vec<PieSliceCounts>,
}
