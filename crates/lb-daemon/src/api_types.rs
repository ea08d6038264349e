//! Request/response DTOs for the daemon's HTTP surface.

use chrono::{DateTime, Utc};
use lb_lifecycle::RouteStop;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub daemon_uptime_secs: u64,
    pub config_hash: String,
    pub shipments: usize,
    pub offers: usize,
    /// Postgres connectivity, when a pool is configured.
    pub db_ok: Option<bool>,
}

/// Uniform error body: human text plus the stable machine code.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateShipmentRequest {
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub stops: Vec<RouteStop>,
    pub container: Option<String>,
    pub weight_kg: Option<i64>,
    pub budget_minor: Option<i64>,
    #[serde(default)]
    pub budget_visible: bool,
    pub currency: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateOfferRequest {
    pub shipment_id: Uuid,
    pub price_minor: i64,
    pub estimated_days: i32,
    pub available_from: DateTime<Utc>,
    pub valid_hours: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdvanceRequest {
    /// "picked_up" | "in_transit" | "delivered" | "completed"
    pub target: String,
}
