//! Shared fixtures and invariant checks for cross-crate scenario tests.
//!
//! The scenario tests under `tests/` drive whole lifecycle flows through the
//! in-memory ledger; this crate gives them one marketplace fixture and the
//! invariant assertions every scenario re-checks after mutating.

use chrono::{DateTime, Duration, TimeZone, Utc};
use lb_commission::CommissionConfig;
use lb_gatekeeper::{GateConfig, MemoryProfiles, ProfileSource};
use lb_ledger::{MarketLedger, NewOffer, NewShipment};
use lb_lifecycle::{KycStatus, OfferStatus, Role};
use uuid::Uuid;

/// Fixed scenario clock; tests advance from here explicitly.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

/// A seeded marketplace: one subscribed client, two KYC-approved
/// transporters.
pub struct Market {
    pub ledger: MarketLedger<MemoryProfiles>,
    pub client: Uuid,
    pub transporter_a: Uuid,
    pub transporter_b: Uuid,
}

impl Market {
    pub fn new() -> Self {
        let mut profiles = MemoryProfiles::new();
        let client = profiles.add(Role::Client, KycStatus::Approved, true);
        let transporter_a = profiles.add(Role::Transporter, KycStatus::Approved, true);
        let transporter_b = profiles.add(Role::Transporter, KycStatus::Approved, false);
        Self {
            ledger: MarketLedger::new(
                profiles,
                GateConfig::sane_defaults(),
                CommissionConfig::sane_defaults(),
            ),
            client,
            transporter_a,
            transporter_b,
        }
    }

    /// Register an additional profile and return its id.
    pub fn add_profile(&mut self, role: Role, kyc: KycStatus, subscribed: bool) -> Uuid {
        let user_id = Uuid::new_v4();
        self.ledger.profiles_mut().insert(lb_lifecycle::Profile {
            user_id,
            role,
            kyc_status: kyc,
            subscription_active: subscribed,
        });
        user_id
    }
}

impl Default for Market {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain shipment request used across scenarios.
pub fn shipment_request() -> NewShipment {
    NewShipment {
        origin: "Rotterdam".to_string(),
        destination: "Munich".to_string(),
        stops: vec![],
        container: Some("40HC".to_string()),
        weight_kg: Some(18_000),
        budget_minor: Some(200_000),
        budget_visible: false,
        currency: "EUR".to_string(),
    }
}

/// Offer request with the given price, valid 48 hours from `now`.
pub fn offer_request(shipment_id: Uuid, price_minor: i64, now: DateTime<Utc>) -> NewOffer {
    NewOffer {
        shipment_id,
        price_minor,
        estimated_days: 3,
        available_from: now + Duration::hours(6),
        valid_hours: 48,
    }
}

/// The two standing marketplace invariants, re-checked by every scenario:
///
/// 1. per shipment, the number of `accepted` offers is 0 or 1;
/// 2. per `(shipment, transporter)` pair, at most one active offer;
///    plus the commitment pairing on the shipment itself.
pub fn assert_market_invariants<P: ProfileSource>(ledger: &MarketLedger<P>) {
    for shipment in ledger.shipments() {
        let offers = ledger.offers_for_shipment(shipment.id);

        let accepted = offers
            .iter()
            .filter(|o| o.status == OfferStatus::Accepted)
            .count();
        assert!(
            accepted <= 1,
            "shipment {} holds {} accepted offers",
            shipment.id,
            accepted
        );

        let mut active_pairs: Vec<Uuid> = offers
            .iter()
            .filter(|o| o.status.is_active())
            .map(|o| o.transporter_id)
            .collect();
        active_pairs.sort();
        let before = active_pairs.len();
        active_pairs.dedup();
        assert_eq!(
            before,
            active_pairs.len(),
            "shipment {} has a transporter with two active offers",
            shipment.id
        );

        assert_eq!(
            shipment.transporter_id.is_some(),
            shipment.agreed_price_minor.is_some(),
            "shipment {} committed a transporter and a price separately",
            shipment.id
        );
        if shipment.status.is_matched() {
            assert!(
                shipment.transporter_id.is_some(),
                "matched shipment {} has no transporter",
                shipment.id
            );
        } else if shipment.status != lb_lifecycle::ShipmentStatus::Disputed {
            assert!(
                shipment.transporter_id.is_none(),
                "unmatched shipment {} carries a transporter",
                shipment.id
            );
        }
    }
}
