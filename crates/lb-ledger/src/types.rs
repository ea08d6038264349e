use chrono::{DateTime, Utc};
use lb_lifecycle::RouteStop;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// NewShipment
// ---------------------------------------------------------------------------

/// Input for posting a shipment. Route/cargo fields are carried opaquely;
/// only budget sign and route presence are validated.
#[derive(Clone, Debug, PartialEq)]
pub struct NewShipment {
    pub origin: String,
    pub destination: String,
    pub stops: Vec<RouteStop>,
    pub container: Option<String>,
    pub weight_kg: Option<i64>,
    pub budget_minor: Option<i64>,
    /// Budget may exist yet be hidden from transporters.
    pub budget_visible: bool,
    pub currency: String,
}

// ---------------------------------------------------------------------------
// NewOffer
// ---------------------------------------------------------------------------

/// Input for submitting an offer against a shipment.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOffer {
    pub shipment_id: Uuid,
    pub price_minor: i64,
    pub estimated_days: i32,
    pub available_from: DateTime<Utc>,
    /// Offer validity window; `valid_until = now + valid_hours`.
    pub valid_hours: i64,
}

// ---------------------------------------------------------------------------
// AdvanceTarget
// ---------------------------------------------------------------------------

/// The statuses reachable through `advance_status`. Confirmation, cancel and
/// dispute have their own operations; making them unrepresentable here keeps
/// the advance surface closed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AdvanceTarget {
    PickedUp,
    InTransit,
    Delivered,
    Completed,
}

impl AdvanceTarget {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "picked_up" => AdvanceTarget::PickedUp,
            "in_transit" => AdvanceTarget::InTransit,
            "delivered" => AdvanceTarget::Delivered,
            "completed" => AdvanceTarget::Completed,
            _ => return None,
        })
    }
}
