//! Lifecycle sweep planner.
//!
//! The periodic sweep does two things, both idempotent per row:
//!
//! - **Expire**: any `Pending` offer with `valid_until < now` → `Expired`.
//!   Only ever moves `pending → expired`; rows in other states are never
//!   touched, so the sweep is safe to interleave with user-triggered
//!   create/withdraw calls.
//! - **Revert**: a shipment parked in `OfferReceived` with zero remaining
//!   active offers (all expired/withdrawn/rejected) → `Pending`, so it
//!   becomes biddable again.
//!
//! Planning is pure and deterministic (sorted output, no clock access — the
//! caller supplies `now`); applying the plan is the store's job under its own
//! serialization (ledger lock in-memory, advisory lock + guarded UPDATEs in
//! Postgres). Running the same plan twice is a no-op by construction.

use chrono::{DateTime, Utc};
use lb_lifecycle::{Offer, OfferStatus, Shipment, ShipmentStatus};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SweepPlan
// ---------------------------------------------------------------------------

/// Deterministic description of what one sweep cycle will change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepPlan {
    /// `Pending` offers past their validity deadline, ascending by id.
    pub expire_offers: Vec<Uuid>,
    /// `OfferReceived` shipments left with no active offer, ascending by id.
    pub revert_shipments: Vec<Uuid>,
}

impl SweepPlan {
    pub fn is_noop(&self) -> bool {
        self.expire_offers.is_empty() && self.revert_shipments.is_empty()
    }
}

/// Compute the sweep plan for the given snapshot at `now`.
///
/// The revert decision already accounts for the expirations in the same plan:
/// an offer selected for expiry does not keep its shipment in
/// `OfferReceived`.
pub fn plan(shipments: &[Shipment], offers: &[Offer], now: DateTime<Utc>) -> SweepPlan {
    let mut expire_offers: Vec<Uuid> = offers
        .iter()
        .filter(|o| o.status == OfferStatus::Pending && o.valid_until < now)
        .map(|o| o.id)
        .collect();
    expire_offers.sort();

    let mut revert_shipments: Vec<Uuid> = shipments
        .iter()
        .filter(|s| s.status == ShipmentStatus::OfferReceived)
        .filter(|s| {
            !offers.iter().any(|o| {
                o.shipment_id == s.id
                    && o.status.is_active()
                    && !(o.status == OfferStatus::Pending && o.valid_until < now)
            })
        })
        .map(|s| s.id)
        .collect();
    revert_shipments.sort();

    SweepPlan {
        expire_offers,
        revert_shipments,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn shipment(status: ShipmentStatus) -> Shipment {
        Shipment {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            transporter_id: None,
            status,
            budget_minor: None,
            budget_visible: false,
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
            created_at: t0(),
            updated_at: t0(),
        }
    }

    fn offer(shipment_id: Uuid, status: OfferStatus, valid_until: DateTime<Utc>) -> Offer {
        Offer {
            id: Uuid::new_v4(),
            shipment_id,
            transporter_id: Uuid::new_v4(),
            price_minor: 180_000,
            currency: "EUR".to_string(),
            estimated_days: 3,
            available_from: t0(),
            status,
            valid_until,
            created_at: t0(),
        }
    }

    #[test]
    fn stale_pending_offers_expire() {
        let s = shipment(ShipmentStatus::OfferReceived);
        let stale = offer(s.id, OfferStatus::Pending, t0() - Duration::hours(1));
        let fresh = offer(s.id, OfferStatus::Pending, t0() + Duration::hours(1));
        let p = plan(&[s], &[stale.clone(), fresh], t0());
        assert_eq!(p.expire_offers, vec![stale.id]);
        assert!(p.revert_shipments.is_empty());
    }

    #[test]
    fn non_pending_offers_are_never_touched() {
        let s = shipment(ShipmentStatus::Confirmed);
        let past = t0() - Duration::hours(50);
        let offers = vec![
            offer(s.id, OfferStatus::Accepted, past),
            offer(s.id, OfferStatus::Rejected, past),
            offer(s.id, OfferStatus::Withdrawn, past),
            offer(s.id, OfferStatus::Expired, past),
        ];
        let p = plan(&[s], &offers, t0());
        assert!(p.is_noop());
    }

    #[test]
    fn shipment_with_only_dead_offers_reverts() {
        let s = shipment(ShipmentStatus::OfferReceived);
        let offers = vec![
            offer(s.id, OfferStatus::Withdrawn, t0() + Duration::hours(1)),
            offer(s.id, OfferStatus::Rejected, t0() + Duration::hours(1)),
        ];
        let p = plan(&[s.clone()], &offers, t0());
        assert_eq!(p.revert_shipments, vec![s.id]);
    }

    #[test]
    fn revert_accounts_for_same_cycle_expirations() {
        // The only pending offer is stale: it expires in this plan, so the
        // shipment reverts in the same cycle.
        let s = shipment(ShipmentStatus::OfferReceived);
        let stale = offer(s.id, OfferStatus::Pending, t0() - Duration::minutes(5));
        let p = plan(&[s.clone()], &[stale.clone()], t0());
        assert_eq!(p.expire_offers, vec![stale.id]);
        assert_eq!(p.revert_shipments, vec![s.id]);
    }

    #[test]
    fn live_pending_offer_keeps_shipment_in_offer_received() {
        let s = shipment(ShipmentStatus::OfferReceived);
        let fresh = offer(s.id, OfferStatus::Pending, t0() + Duration::hours(48));
        let p = plan(&[s], &[fresh], t0());
        assert!(p.is_noop());
    }

    #[test]
    fn pending_shipments_are_not_reverted() {
        let s = shipment(ShipmentStatus::Pending);
        let p = plan(&[s], &[], t0());
        assert!(p.is_noop());
    }

    #[test]
    fn plan_is_idempotent_on_swept_snapshot() {
        // After applying a plan, re-planning the resulting snapshot is a noop.
        let s = shipment(ShipmentStatus::OfferReceived);
        let stale = offer(s.id, OfferStatus::Pending, t0() - Duration::hours(2));
        let p = plan(&[s.clone()], &[stale.clone()], t0());
        assert!(!p.is_noop());

        let mut swept_s = s;
        swept_s.status = ShipmentStatus::Pending;
        let mut swept_o = stale;
        swept_o.status = OfferStatus::Expired;
        let p2 = plan(&[swept_s], &[swept_o], t0());
        assert!(p2.is_noop());
    }
}
