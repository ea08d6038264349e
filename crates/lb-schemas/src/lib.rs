//! Wire-facing records shared by the daemon, the audit log, and tests.
//!
//! Domain structs live in `lb-lifecycle`; the types here are their outward
//! projections — statuses as strings, budget masked for non-owners.

use chrono::{DateTime, Utc};
use lb_lifecycle::{Offer, RouteStop, Shipment};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentWire {
    pub id: Uuid,
    pub client_id: Uuid,
    pub transporter_id: Option<Uuid>,
    pub status: String,
    /// Present only when visible to the viewer (owner always sees it).
    pub budget_minor: Option<i64>,
    pub budget_visible: bool,
    pub agreed_price_minor: Option<i64>,
    pub currency: String,
    pub fee_minor: Option<i64>,
    pub payout_minor: Option<i64>,
    pub origin: String,
    pub destination: String,
    pub stops: Vec<RouteStop>,
    pub container: Option<String>,
    pub weight_kg: Option<i64>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub escrow_release_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShipmentWire {
    /// Project a shipment for a viewer. A hidden budget is stripped unless
    /// the viewer owns the shipment; every other field passes through.
    pub fn for_viewer(s: &Shipment, viewer_is_owner: bool) -> Self {
        let budget_minor = if s.budget_visible || viewer_is_owner {
            s.budget_minor
        } else {
            None
        };
        Self {
            id: s.id,
            client_id: s.client_id,
            transporter_id: s.transporter_id,
            status: s.status.as_str().to_string(),
            budget_minor,
            budget_visible: s.budget_visible,
            agreed_price_minor: s.agreed_price_minor,
            currency: s.currency.clone(),
            fee_minor: s.fee_minor,
            payout_minor: s.payout_minor,
            origin: s.origin.clone(),
            destination: s.destination.clone(),
            stops: s.stops.clone(),
            container: s.container.clone(),
            weight_kg: s.weight_kg,
            delivered_at: s.delivered_at,
            escrow_release_at: s.escrow_release_at,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferWire {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub transporter_id: Uuid,
    pub price_minor: i64,
    pub currency: String,
    pub estimated_days: i32,
    pub available_from: DateTime<Utc>,
    pub status: String,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&Offer> for OfferWire {
    fn from(o: &Offer) -> Self {
        Self {
            id: o.id,
            shipment_id: o.shipment_id,
            transporter_id: o.transporter_id,
            price_minor: o.price_minor,
            currency: o.currency.clone(),
            estimated_days: o.estimated_days,
            available_from: o.available_from,
            status: o.status.as_str().to_string(),
            valid_until: o.valid_until,
            created_at: o.created_at,
        }
    }
}

/// Envelope for lifecycle events on the SSE bus and in audit payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub ts_utc: DateTime<Utc>,
    /// "shipment" | "offer"
    pub topic: String,
    /// e.g. "offer_accepted", "shipment_cancelled"
    pub event_type: String,
    pub entity_id: Uuid,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use lb_lifecycle::ShipmentStatus;

    fn shipment(budget_visible: bool) -> Shipment {
        use chrono::TimeZone;
        let t = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        Shipment {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            transporter_id: None,
            status: ShipmentStatus::Pending,
            budget_minor: Some(200_000),
            budget_visible,
            agreed_price_minor: None,
            currency: "EUR".to_string(),
            fee_minor: None,
            payout_minor: None,
            origin: "Rotterdam".to_string(),
            destination: "Munich".to_string(),
            stops: vec![],
            container: None,
            weight_kg: None,
            delivered_at: None,
            escrow_release_at: None,
            created_at: t,
            updated_at: t,
        }
    }

    #[test]
    fn hidden_budget_is_stripped_for_non_owners() {
        let s = shipment(false);
        assert_eq!(ShipmentWire::for_viewer(&s, false).budget_minor, None);
        assert_eq!(
            ShipmentWire::for_viewer(&s, true).budget_minor,
            Some(200_000)
        );
    }

    #[test]
    fn visible_budget_passes_through() {
        let s = shipment(true);
        assert_eq!(
            ShipmentWire::for_viewer(&s, false).budget_minor,
            Some(200_000)
        );
    }

    #[test]
    fn status_serializes_as_snake_case_string() {
        let s = shipment(true);
        let wire = ShipmentWire::for_viewer(&s, true);
        let v = serde_json::to_value(&wire).unwrap();
        assert_eq!(v["status"], "pending");
    }
}
