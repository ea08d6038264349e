use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Role / KYC
// ---------------------------------------------------------------------------

/// Marketplace participant role. Closed variant — permission checks dispatch
/// on this instead of per-call-site string comparisons.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Transporter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Transporter => "transporter",
        }
    }
}

/// KYC verification outcome as reported by the profile collaborator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    Pending,
    Approved,
    Rejected,
}

/// Projection of a user returned by the profile collaborator
/// (`getProfile(user_id)`). A free-trial period is already collapsed into
/// `subscription_active` by the collaborator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub role: Role,
    pub kyc_status: KycStatus,
    pub subscription_active: bool,
}

// ---------------------------------------------------------------------------
// ShipmentStatus
// ---------------------------------------------------------------------------

/// All valid states a shipment can occupy.
///
/// Forward path: `Pending → OfferReceived → Confirmed → PickedUp →
/// InTransit → Delivered → Completed`. `Disputed` is reachable from any
/// post-`Confirmed` active state; `Cancelled` from `Pending`/`OfferReceived`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    /// Posted, no offers yet. Biddable.
    Pending,
    /// At least one active offer exists. Biddable.
    OfferReceived,
    /// One offer accepted; transporter and price are committed.
    Confirmed,
    /// Transporter has collected the cargo.
    PickedUp,
    /// Cargo is moving.
    InTransit,
    /// Transporter reports delivery; awaiting client confirmation.
    Delivered,
    /// Client confirmed delivery. **Terminal.**
    Completed,
    /// Client cancelled before a match. **Terminal.**
    Cancelled,
    /// Parked pending external resolution. No further transitions here.
    Disputed,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "pending",
            ShipmentStatus::OfferReceived => "offer_received",
            ShipmentStatus::Confirmed => "confirmed",
            ShipmentStatus::PickedUp => "picked_up",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::Completed => "completed",
            ShipmentStatus::Cancelled => "cancelled",
            ShipmentStatus::Disputed => "disputed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => ShipmentStatus::Pending,
            "offer_received" => ShipmentStatus::OfferReceived,
            "confirmed" => ShipmentStatus::Confirmed,
            "picked_up" => ShipmentStatus::PickedUp,
            "in_transit" => ShipmentStatus::InTransit,
            "delivered" => ShipmentStatus::Delivered,
            "completed" => ShipmentStatus::Completed,
            "cancelled" => ShipmentStatus::Cancelled,
            "disputed" => ShipmentStatus::Disputed,
            _ => return None,
        })
    }

    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Shipment still accepts new offers.
    pub fn accepts_offers(&self) -> bool {
        matches!(self, Self::Pending | Self::OfferReceived)
    }

    /// A transporter is committed: `transporter_id` and `agreed_price_minor`
    /// are non-null exactly in these states (plus `Disputed`, which is only
    /// reachable after commitment).
    pub fn is_matched(&self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::PickedUp | Self::InTransit | Self::Delivered | Self::Completed
        )
    }

    /// Post-confirmation active states from which a dispute may be raised.
    pub fn is_disputable(&self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::PickedUp | Self::InTransit | Self::Delivered
        )
    }
}

// ---------------------------------------------------------------------------
// OfferStatus
// ---------------------------------------------------------------------------

/// Offer lifecycle. An offer is mutated only by accept/reject/withdraw/expire
/// and is never deleted once accepted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
    Expired,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Withdrawn => "withdrawn",
            OfferStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => OfferStatus::Pending,
            "accepted" => OfferStatus::Accepted,
            "rejected" => OfferStatus::Rejected,
            "withdrawn" => OfferStatus::Withdrawn,
            "expired" => OfferStatus::Expired,
            _ => return None,
        })
    }

    /// Active offers count toward the per-(shipment, transporter) uniqueness
    /// invariant. Terminal offers are history and may coexist freely.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Accepted)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

// ---------------------------------------------------------------------------
// RouteStop
// ---------------------------------------------------------------------------

/// What happens at a stop.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOperation {
    Load,
    Unload,
}

/// One structured stop on a shipment's route. Replaces the legacy free-text
/// stop encoding; order within `Shipment::stops` is the route order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStop {
    pub location: String,
    pub operation: StopOperation,
    pub date: Option<NaiveDate>,
    /// Free-form time window ("08:00-12:00"); opaque to the core.
    pub time: Option<String>,
}

// ---------------------------------------------------------------------------
// Shipment
// ---------------------------------------------------------------------------

/// A client's transport request. Route/cargo fields are carried but never
/// interpreted by the core.
///
/// Invariant: `agreed_price_minor.is_some() == transporter_id.is_some()`, and
/// both hold exactly when `status.is_matched()` (or `Disputed`, reached only
/// after a match).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: Uuid,
    /// Owner. Immutable after creation.
    pub client_id: Uuid,
    /// Set exactly once, by the accept transition.
    pub transporter_id: Option<Uuid>,
    pub status: ShipmentStatus,

    /// Client's budget in minor units. May exist yet be hidden from
    /// transporters (`budget_visible == false`).
    pub budget_minor: Option<i64>,
    pub budget_visible: bool,
    /// Set only by the accept transition, equal to the accepted offer's price.
    pub agreed_price_minor: Option<i64>,
    pub currency: String,
    /// Platform fee / transporter payout, computed once at acceptance.
    pub fee_minor: Option<i64>,
    pub payout_minor: Option<i64>,

    // Route / cargo — opaque to the lifecycle core.
    pub origin: String,
    pub destination: String,
    pub stops: Vec<RouteStop>,
    pub container: Option<String>,
    pub weight_kg: Option<i64>,

    pub delivered_at: Option<DateTime<Utc>>,
    /// Deferred escrow release timestamp, stamped at completion. The core
    /// computes it; it never moves money.
    pub escrow_release_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Offer
// ---------------------------------------------------------------------------

/// A transporter's priced bid against a shipment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub transporter_id: Uuid,
    pub price_minor: i64,
    pub currency: String,
    pub estimated_days: i32,
    pub available_from: DateTime<Utc>,
    pub status: OfferStatus,
    /// Absolute deadline after which a `Pending` offer is expirable. An offer
    /// past this instant is never acceptable, swept or not.
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for st in [
            ShipmentStatus::Pending,
            ShipmentStatus::OfferReceived,
            ShipmentStatus::Confirmed,
            ShipmentStatus::PickedUp,
            ShipmentStatus::InTransit,
            ShipmentStatus::Delivered,
            ShipmentStatus::Completed,
            ShipmentStatus::Cancelled,
            ShipmentStatus::Disputed,
        ] {
            assert_eq!(ShipmentStatus::parse(st.as_str()), Some(st));
        }
        assert_eq!(ShipmentStatus::parse("bogus"), None);
    }

    #[test]
    fn active_offer_states_are_exactly_pending_and_accepted() {
        assert!(OfferStatus::Pending.is_active());
        assert!(OfferStatus::Accepted.is_active());
        assert!(OfferStatus::Rejected.is_terminal());
        assert!(OfferStatus::Withdrawn.is_terminal());
        assert!(OfferStatus::Expired.is_terminal());
    }

    #[test]
    fn matched_states_imply_commitment() {
        assert!(!ShipmentStatus::Pending.is_matched());
        assert!(!ShipmentStatus::OfferReceived.is_matched());
        assert!(ShipmentStatus::Confirmed.is_matched());
        assert!(ShipmentStatus::Completed.is_matched());
        assert!(!ShipmentStatus::Cancelled.is_matched());
    }
}
