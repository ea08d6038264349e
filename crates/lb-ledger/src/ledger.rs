use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use lb_commission::{commission, escrow_release_at, CommissionConfig};
use lb_gatekeeper::{evaluate, GateAction, GateConfig, GateDecision, GateInput, ProfileSource};
use lb_lifecycle::{
    transition, AuthzReason, ConflictReason, EntityKind, MarketError, Offer, OfferStatus, Profile,
    Shipment, ShipmentEvent, ShipmentStatus, ValidationReason,
};
use lb_sweep::{plan, SweepPlan};
use uuid::Uuid;

use crate::types::{AdvanceTarget, NewOffer, NewShipment};

/// Upper bound on any price or budget in minor units. Keeps the basis-point
/// fee multiplication safely inside i64.
pub const MAX_PRICE_MINOR: i64 = 1_000_000_000_000;

// ---------------------------------------------------------------------------
// MarketLedger
// ---------------------------------------------------------------------------

/// In-memory shipment/offer store plus every lifecycle operation over it.
/// See the crate docs for the invariants each operation upholds.
pub struct MarketLedger<P: ProfileSource> {
    profiles: P,
    gate_cfg: GateConfig,
    commission_cfg: CommissionConfig,
    shipments: BTreeMap<Uuid, Shipment>,
    offers: BTreeMap<Uuid, Offer>,
}

impl<P: ProfileSource> MarketLedger<P> {
    pub fn new(profiles: P, gate_cfg: GateConfig, commission_cfg: CommissionConfig) -> Self {
        Self {
            profiles,
            gate_cfg,
            commission_cfg,
            shipments: BTreeMap::new(),
            offers: BTreeMap::new(),
        }
    }

    // -- reads ---------------------------------------------------------------

    pub fn shipment(&self, id: Uuid) -> Option<&Shipment> {
        self.shipments.get(&id)
    }

    pub fn offer(&self, id: Uuid) -> Option<&Offer> {
        self.offers.get(&id)
    }

    /// Offers on one shipment, ascending by offer id.
    pub fn offers_for_shipment(&self, shipment_id: Uuid) -> Vec<&Offer> {
        self.offers
            .values()
            .filter(|o| o.shipment_id == shipment_id)
            .collect()
    }

    pub fn shipments(&self) -> impl Iterator<Item = &Shipment> {
        self.shipments.values()
    }

    pub fn offers(&self) -> impl Iterator<Item = &Offer> {
        self.offers.values()
    }

    /// Mutable access to the profile collaborator (directory refresh, test
    /// seeding). The gate itself stays internal.
    pub fn profiles_mut(&mut self) -> &mut P {
        &mut self.profiles
    }

    // -- helpers -------------------------------------------------------------

    /// Resolve the acting profile. An id the collaborator does not know has
    /// no established identity.
    fn acting_profile(&self, caller: Uuid) -> Result<Profile, MarketError> {
        self.profiles
            .profile(caller)
            .ok_or(MarketError::Authentication)
    }

    fn gate(&self, action: GateAction, profile: Profile) -> Result<(), MarketError> {
        match evaluate(&self.gate_cfg, &GateInput { action, profile }) {
            GateDecision::Allow => Ok(()),
            GateDecision::Refuse(r) => Err(MarketError::Authorization(r.to_authz())),
        }
    }

    fn active_offer_exists(&self, shipment_id: Uuid, transporter_id: Uuid) -> bool {
        self.offers.values().any(|o| {
            o.shipment_id == shipment_id
                && o.transporter_id == transporter_id
                && o.status.is_active()
        })
    }

    // -- createShipment ------------------------------------------------------

    /// Post a new shipment. Caller must be a client passing the gate.
    pub fn create_shipment(
        &mut self,
        caller: Uuid,
        new: NewShipment,
        now: DateTime<Utc>,
    ) -> Result<Shipment, MarketError> {
        let profile = self.acting_profile(caller)?;
        self.gate(GateAction::PostShipment, profile)?;

        if new.origin.trim().is_empty() || new.destination.trim().is_empty() {
            return Err(MarketError::Validation(ValidationReason::MissingRoute));
        }
        if let Some(budget) = new.budget_minor {
            if budget <= 0 {
                return Err(MarketError::Validation(ValidationReason::NonPositivePrice));
            }
            if budget > MAX_PRICE_MINOR {
                return Err(MarketError::Validation(ValidationReason::PriceOutOfRange));
            }
        }

        let shipment = Shipment {
            id: Uuid::new_v4(),
            client_id: caller,
            transporter_id: None,
            status: ShipmentStatus::Pending,
            budget_minor: new.budget_minor,
            budget_visible: new.budget_visible,
            agreed_price_minor: None,
            currency: new.currency,
            fee_minor: None,
            payout_minor: None,
            origin: new.origin,
            destination: new.destination,
            stops: new.stops,
            container: new.container,
            weight_kg: new.weight_kg,
            delivered_at: None,
            escrow_release_at: None,
            created_at: now,
            updated_at: now,
        };
        self.shipments.insert(shipment.id, shipment.clone());
        Ok(shipment)
    }

    // -- createOffer ---------------------------------------------------------

    /// Submit an offer. Precondition order (first failure wins): input
    /// validation, role, KYC, shipment open, no duplicate active offer.
    pub fn create_offer(
        &mut self,
        caller: Uuid,
        new: NewOffer,
        now: DateTime<Utc>,
    ) -> Result<Offer, MarketError> {
        if new.price_minor <= 0 {
            return Err(MarketError::Validation(ValidationReason::NonPositivePrice));
        }
        if new.price_minor > MAX_PRICE_MINOR {
            return Err(MarketError::Validation(ValidationReason::PriceOutOfRange));
        }
        if new.estimated_days <= 0 {
            return Err(MarketError::Validation(
                ValidationReason::NonPositiveEstimatedDays,
            ));
        }
        if new.valid_hours <= 0 {
            return Err(MarketError::Validation(ValidationReason::NonPositiveValidity));
        }
        if new.available_from < now {
            return Err(MarketError::Validation(ValidationReason::AvailableFromInPast));
        }

        let profile = self.acting_profile(caller)?;
        self.gate(GateAction::SubmitOffer, profile)?;

        let shipment = self
            .shipments
            .get(&new.shipment_id)
            .ok_or(MarketError::NotFound(EntityKind::Shipment))?;
        if !shipment.status.accepts_offers() {
            return Err(MarketError::Conflict(ConflictReason::ShipmentClosed));
        }
        if self.active_offer_exists(new.shipment_id, caller) {
            return Err(MarketError::Conflict(ConflictReason::DuplicateOffer));
        }

        let currency = shipment.currency.clone();
        let offer = Offer {
            id: Uuid::new_v4(),
            shipment_id: new.shipment_id,
            transporter_id: caller,
            price_minor: new.price_minor,
            currency,
            estimated_days: new.estimated_days,
            available_from: new.available_from,
            status: OfferStatus::Pending,
            valid_until: now + Duration::hours(new.valid_hours),
            created_at: now,
        };

        // First offer advances Pending → OfferReceived; later offers hit the
        // idempotent arm and leave the status alone.
        let shipment = self
            .shipments
            .get_mut(&new.shipment_id)
            .ok_or(MarketError::NotFound(EntityKind::Shipment))?;
        let next = transition(shipment.status, ShipmentEvent::FirstOfferCreated)?;
        if next != shipment.status {
            shipment.status = next;
            shipment.updated_at = now;
        }

        self.offers.insert(offer.id, offer.clone());
        Ok(offer)
    }

    // -- acceptOffer ---------------------------------------------------------

    /// Accept one offer: the target goes `accepted`, every sibling `pending`
    /// offer goes `rejected`, and the shipment is confirmed with the agreed
    /// price and the commission computed — one atomic unit under `&mut self`.
    ///
    /// A racing accept or a concurrent cancel surfaces as
    /// `CONFLICT: already_matched`; an expired-but-unswept offer as
    /// `CONFLICT: offer_not_pending`. Either way nothing is written.
    pub fn accept_offer(
        &mut self,
        caller: Uuid,
        offer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Shipment, MarketError> {
        let offer = self
            .offers
            .get(&offer_id)
            .ok_or(MarketError::NotFound(EntityKind::Offer))?;
        let shipment = self
            .shipments
            .get(&offer.shipment_id)
            .ok_or(MarketError::NotFound(EntityKind::Shipment))?;

        if caller != shipment.client_id {
            return Err(MarketError::Authorization(AuthzReason::NotAParty));
        }
        if offer.status != OfferStatus::Pending || offer.valid_until < now {
            return Err(MarketError::Conflict(ConflictReason::OfferNotPending));
        }
        // The offer was pending, so the shipment should still be open; if it
        // is not, a concurrent accept or cancel got there first.
        if !shipment.status.accepts_offers() {
            return Err(MarketError::Conflict(ConflictReason::AlreadyMatched));
        }

        let next_status = transition(shipment.status, ShipmentEvent::OfferAccepted)?;

        // Compute the fee before touching anything: a commission failure must
        // leave the ledger untouched. Price bounds are validated at offer
        // creation, so this only fires on a malformed fee policy.
        let fee = commission(&self.commission_cfg, offer.price_minor)
            .map_err(|_| MarketError::Validation(ValidationReason::PriceOutOfRange))?;

        let shipment_id = offer.shipment_id;
        let transporter_id = offer.transporter_id;
        let price_minor = offer.price_minor;

        // ---- atomic unit: no fallible call below this line ----
        for sibling in self.offers.values_mut() {
            if sibling.shipment_id == shipment_id && sibling.status == OfferStatus::Pending {
                sibling.status = if sibling.id == offer_id {
                    OfferStatus::Accepted
                } else {
                    OfferStatus::Rejected
                };
            }
        }

        let shipment = self
            .shipments
            .get_mut(&shipment_id)
            .ok_or(MarketError::NotFound(EntityKind::Shipment))?;
        shipment.status = next_status;
        shipment.transporter_id = Some(transporter_id);
        shipment.agreed_price_minor = Some(price_minor);
        shipment.fee_minor = Some(fee.fee_minor);
        shipment.payout_minor = Some(fee.payout_minor);
        shipment.updated_at = now;

        Ok(shipment.clone())
    }

    // -- rejectOffer ---------------------------------------------------------

    /// Explicit single-offer rejection by the owning client.
    pub fn reject_offer(&mut self, caller: Uuid, offer_id: Uuid) -> Result<(), MarketError> {
        let offer = self
            .offers
            .get(&offer_id)
            .ok_or(MarketError::NotFound(EntityKind::Offer))?;
        let shipment = self
            .shipments
            .get(&offer.shipment_id)
            .ok_or(MarketError::NotFound(EntityKind::Shipment))?;
        if caller != shipment.client_id {
            return Err(MarketError::Authorization(AuthzReason::NotAParty));
        }
        if offer.status != OfferStatus::Pending {
            return Err(MarketError::Conflict(ConflictReason::OfferNotPending));
        }

        // Rejection has no shipment-side effect; the sweep reverts a shipment
        // whose last active offer is gone.
        let offer = self
            .offers
            .get_mut(&offer_id)
            .ok_or(MarketError::NotFound(EntityKind::Offer))?;
        offer.status = OfferStatus::Rejected;
        Ok(())
    }

    // -- withdrawOffer -------------------------------------------------------

    /// Withdrawal by the offer's own transporter, only while pending.
    pub fn withdraw_offer(&mut self, caller: Uuid, offer_id: Uuid) -> Result<(), MarketError> {
        let offer = self
            .offers
            .get(&offer_id)
            .ok_or(MarketError::NotFound(EntityKind::Offer))?;
        if caller != offer.transporter_id {
            return Err(MarketError::Authorization(AuthzReason::NotAParty));
        }
        if offer.status != OfferStatus::Pending {
            return Err(MarketError::Conflict(ConflictReason::OfferNotPending));
        }

        let offer = self
            .offers
            .get_mut(&offer_id)
            .ok_or(MarketError::NotFound(EntityKind::Offer))?;
        offer.status = OfferStatus::Withdrawn;
        Ok(())
    }

    // -- advanceShipmentStatus -----------------------------------------------

    /// Explicit status advance. Pickup/transit/delivery belong to the
    /// assigned transporter; completion to the owning client. Anything the
    /// lifecycle table forbids fails with a `STATE` error and writes nothing.
    pub fn advance_status(
        &mut self,
        caller: Uuid,
        shipment_id: Uuid,
        target: AdvanceTarget,
        now: DateTime<Utc>,
    ) -> Result<Shipment, MarketError> {
        let shipment = self
            .shipments
            .get(&shipment_id)
            .ok_or(MarketError::NotFound(EntityKind::Shipment))?;

        let event = match target {
            AdvanceTarget::PickedUp => ShipmentEvent::MarkPickedUp,
            AdvanceTarget::InTransit => ShipmentEvent::MarkInTransit,
            AdvanceTarget::Delivered => ShipmentEvent::MarkDelivered,
            AdvanceTarget::Completed => ShipmentEvent::ConfirmCompleted,
        };

        match event {
            ShipmentEvent::ConfirmCompleted => {
                if caller != shipment.client_id {
                    return Err(MarketError::Authorization(AuthzReason::NotAParty));
                }
            }
            _ => {
                if shipment.transporter_id != Some(caller) {
                    return Err(MarketError::Authorization(AuthzReason::NotAParty));
                }
            }
        }

        let next = transition(shipment.status, event)?;

        let escrow_days = self.commission_cfg.escrow_days;
        let shipment = self
            .shipments
            .get_mut(&shipment_id)
            .ok_or(MarketError::NotFound(EntityKind::Shipment))?;
        shipment.status = next;
        shipment.updated_at = now;
        match next {
            ShipmentStatus::Delivered => shipment.delivered_at = Some(now),
            // Escrow release counts from the client's delivery confirmation.
            ShipmentStatus::Completed => {
                shipment.escrow_release_at = Some(escrow_release_at(now, escrow_days))
            }
            _ => {}
        }
        Ok(shipment.clone())
    }

    // -- cancelShipment ------------------------------------------------------

    /// Client cancels an unmatched shipment.
    pub fn cancel_shipment(
        &mut self,
        caller: Uuid,
        shipment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Shipment, MarketError> {
        let shipment = self
            .shipments
            .get(&shipment_id)
            .ok_or(MarketError::NotFound(EntityKind::Shipment))?;
        if caller != shipment.client_id {
            return Err(MarketError::Authorization(AuthzReason::NotAParty));
        }
        let next = transition(shipment.status, ShipmentEvent::Cancel)?;

        let shipment = self
            .shipments
            .get_mut(&shipment_id)
            .ok_or(MarketError::NotFound(EntityKind::Shipment))?;
        shipment.status = next;
        shipment.updated_at = now;
        Ok(shipment.clone())
    }

    // -- raiseDispute --------------------------------------------------------

    /// Either party of a matched shipment parks it in `disputed`; resolution
    /// is external to this core.
    pub fn raise_dispute(
        &mut self,
        caller: Uuid,
        shipment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Shipment, MarketError> {
        let shipment = self
            .shipments
            .get(&shipment_id)
            .ok_or(MarketError::NotFound(EntityKind::Shipment))?;
        let is_party =
            caller == shipment.client_id || shipment.transporter_id == Some(caller);
        if !is_party {
            return Err(MarketError::Authorization(AuthzReason::NotAParty));
        }
        let next = transition(shipment.status, ShipmentEvent::RaiseDispute)?;

        let shipment = self
            .shipments
            .get_mut(&shipment_id)
            .ok_or(MarketError::NotFound(EntityKind::Shipment))?;
        shipment.status = next;
        shipment.updated_at = now;
        Ok(shipment.clone())
    }

    // -- sweep ---------------------------------------------------------------

    /// Run one sweep cycle: expire stale pending offers, revert shipments
    /// with no remaining active offer. Idempotent; returns the applied plan.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> SweepPlan {
        let shipments: Vec<Shipment> = self.shipments.values().cloned().collect();
        let offers: Vec<Offer> = self.offers.values().cloned().collect();
        let p = plan(&shipments, &offers, now);

        for offer_id in &p.expire_offers {
            if let Some(o) = self.offers.get_mut(offer_id) {
                // Only ever pending → expired.
                if o.status == OfferStatus::Pending {
                    o.status = OfferStatus::Expired;
                }
            }
        }
        for shipment_id in &p.revert_shipments {
            if let Some(s) = self.shipments.get_mut(shipment_id) {
                if s.status == ShipmentStatus::OfferReceived {
                    s.status = ShipmentStatus::Pending;
                    s.updated_at = now;
                }
            }
        }
        p
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use lb_gatekeeper::MemoryProfiles;
    use lb_lifecycle::{KycStatus, Role};

    fn t0() -> DateTime<Utc> {
        use chrono::TimeZone;
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        ledger: MarketLedger<MemoryProfiles>,
        client: Uuid,
        transporter_a: Uuid,
        transporter_b: Uuid,
    }

    fn fixture() -> Fixture {
        let mut profiles = MemoryProfiles::new();
        let client = profiles.add(Role::Client, KycStatus::Approved, true);
        let transporter_a = profiles.add(Role::Transporter, KycStatus::Approved, true);
        let transporter_b = profiles.add(Role::Transporter, KycStatus::Approved, false);
        Fixture {
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

    fn new_shipment() -> NewShipment {
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

    fn new_offer(shipment_id: Uuid, price_minor: i64) -> NewOffer {
        NewOffer {
            shipment_id,
            price_minor,
            estimated_days: 3,
            available_from: t0() + Duration::hours(6),
            valid_hours: 48,
        }
    }

    #[test]
    fn create_offer_advances_pending_shipment_once() {
        let mut fx = fixture();
        let s = fx.ledger.create_shipment(fx.client, new_shipment(), t0()).unwrap();
        assert_eq!(s.status, ShipmentStatus::Pending);

        let o1 = fx
            .ledger
            .create_offer(fx.transporter_a, new_offer(s.id, 180_000), t0())
            .unwrap();
        assert_eq!(o1.status, OfferStatus::Pending);
        assert_eq!(o1.valid_until, t0() + Duration::hours(48));
        assert_eq!(
            fx.ledger.shipment(s.id).unwrap().status,
            ShipmentStatus::OfferReceived
        );

        // Second offer: stays offer_received, not re-triggered.
        fx.ledger
            .create_offer(fx.transporter_b, new_offer(s.id, 170_000), t0())
            .unwrap();
        assert_eq!(
            fx.ledger.shipment(s.id).unwrap().status,
            ShipmentStatus::OfferReceived
        );
    }

    #[test]
    fn duplicate_active_offer_is_refused_and_rebid_after_terminal_allowed() {
        let mut fx = fixture();
        let s = fx.ledger.create_shipment(fx.client, new_shipment(), t0()).unwrap();
        let o1 = fx
            .ledger
            .create_offer(fx.transporter_a, new_offer(s.id, 180_000), t0())
            .unwrap();

        let err = fx
            .ledger
            .create_offer(fx.transporter_a, new_offer(s.id, 175_000), t0())
            .unwrap_err();
        assert_eq!(err, MarketError::Conflict(ConflictReason::DuplicateOffer));

        // Withdraw, then re-bid: history is kept, a fresh row is created.
        fx.ledger.withdraw_offer(fx.transporter_a, o1.id).unwrap();
        let o2 = fx
            .ledger
            .create_offer(fx.transporter_a, new_offer(s.id, 175_000), t0())
            .unwrap();
        assert_ne!(o1.id, o2.id);
        assert_eq!(
            fx.ledger.offer(o1.id).unwrap().status,
            OfferStatus::Withdrawn
        );
    }

    #[test]
    fn gate_refusals_create_no_rows() {
        let mut fx = fixture();
        let s = fx.ledger.create_shipment(fx.client, new_shipment(), t0()).unwrap();

        let unapproved = fx
            .ledger
            .profiles
            .add(Role::Transporter, KycStatus::Pending, true);

        let err = fx
            .ledger
            .create_offer(unapproved, new_offer(s.id, 100_000), t0())
            .unwrap_err();
        assert_eq!(err, MarketError::Authorization(AuthzReason::KycRequired));
        assert_eq!(fx.ledger.offers_for_shipment(s.id).len(), 0);
    }

    #[test]
    fn accept_confirms_rejects_siblings_and_prices_commission() {
        let mut fx = fixture();
        let s = fx.ledger.create_shipment(fx.client, new_shipment(), t0()).unwrap();
        let o1 = fx
            .ledger
            .create_offer(fx.transporter_a, new_offer(s.id, 180_000), t0())
            .unwrap();
        let o2 = fx
            .ledger
            .create_offer(fx.transporter_b, new_offer(s.id, 170_000), t0())
            .unwrap();

        let confirmed = fx.ledger.accept_offer(fx.client, o1.id, t0()).unwrap();
        assert_eq!(confirmed.status, ShipmentStatus::Confirmed);
        assert_eq!(confirmed.transporter_id, Some(fx.transporter_a));
        assert_eq!(confirmed.agreed_price_minor, Some(180_000));
        // 3% of 1800.00 = 54.00, inside [10.00, 500.00].
        assert_eq!(confirmed.fee_minor, Some(5_400));
        assert_eq!(confirmed.payout_minor, Some(174_600));

        assert_eq!(fx.ledger.offer(o1.id).unwrap().status, OfferStatus::Accepted);
        assert_eq!(fx.ledger.offer(o2.id).unwrap().status, OfferStatus::Rejected);
    }

    #[test]
    fn second_accept_on_same_shipment_conflicts() {
        let mut fx = fixture();
        let s = fx.ledger.create_shipment(fx.client, new_shipment(), t0()).unwrap();
        let o1 = fx
            .ledger
            .create_offer(fx.transporter_a, new_offer(s.id, 180_000), t0())
            .unwrap();
        let o2 = fx
            .ledger
            .create_offer(fx.transporter_b, new_offer(s.id, 170_000), t0())
            .unwrap();

        fx.ledger.accept_offer(fx.client, o1.id, t0()).unwrap();
        // o2 was force-rejected by the first accept; the racing call loses.
        let err = fx.ledger.accept_offer(fx.client, o2.id, t0()).unwrap_err();
        assert_eq!(err, MarketError::Conflict(ConflictReason::OfferNotPending));
    }

    #[test]
    fn expired_offer_is_never_acceptable_before_sweep() {
        let mut fx = fixture();
        let s = fx.ledger.create_shipment(fx.client, new_shipment(), t0()).unwrap();
        let o = fx
            .ledger
            .create_offer(fx.transporter_a, new_offer(s.id, 180_000), t0())
            .unwrap();

        // 50 hours later the 48h offer is stale but unswept.
        let later = t0() + Duration::hours(50);
        let err = fx.ledger.accept_offer(fx.client, o.id, later).unwrap_err();
        assert_eq!(err, MarketError::Conflict(ConflictReason::OfferNotPending));
        assert_eq!(fx.ledger.offer(o.id).unwrap().status, OfferStatus::Pending);
    }

    #[test]
    fn withdraw_after_accept_fails() {
        let mut fx = fixture();
        let s = fx.ledger.create_shipment(fx.client, new_shipment(), t0()).unwrap();
        let o = fx
            .ledger
            .create_offer(fx.transporter_a, new_offer(s.id, 180_000), t0())
            .unwrap();
        fx.ledger.accept_offer(fx.client, o.id, t0()).unwrap();

        let err = fx
            .ledger
            .withdraw_offer(fx.transporter_a, o.id)
            .unwrap_err();
        assert_eq!(err, MarketError::Conflict(ConflictReason::OfferNotPending));
    }

    #[test]
    fn only_the_owning_client_accepts() {
        let mut fx = fixture();
        let s = fx.ledger.create_shipment(fx.client, new_shipment(), t0()).unwrap();
        let o = fx
            .ledger
            .create_offer(fx.transporter_a, new_offer(s.id, 180_000), t0())
            .unwrap();

        let err = fx
            .ledger
            .accept_offer(fx.transporter_b, o.id, t0())
            .unwrap_err();
        assert_eq!(err, MarketError::Authorization(AuthzReason::NotAParty));
        assert_eq!(fx.ledger.offer(o.id).unwrap().status, OfferStatus::Pending);
    }

    #[test]
    fn delivery_flow_stamps_delivery_and_escrow() {
        let mut fx = fixture();
        let s = fx.ledger.create_shipment(fx.client, new_shipment(), t0()).unwrap();
        let o = fx
            .ledger
            .create_offer(fx.transporter_a, new_offer(s.id, 180_000), t0())
            .unwrap();
        fx.ledger.accept_offer(fx.client, o.id, t0()).unwrap();

        let t1 = t0() + Duration::days(1);
        fx.ledger
            .advance_status(fx.transporter_a, s.id, AdvanceTarget::PickedUp, t1)
            .unwrap();
        fx.ledger
            .advance_status(fx.transporter_a, s.id, AdvanceTarget::InTransit, t1)
            .unwrap();
        let delivered = fx
            .ledger
            .advance_status(fx.transporter_a, s.id, AdvanceTarget::Delivered, t1)
            .unwrap();
        assert_eq!(delivered.delivered_at, Some(t1));

        // Client confirms two days later; escrow releases 7 days after that.
        let t2 = t1 + Duration::days(2);
        let completed = fx
            .ledger
            .advance_status(fx.client, s.id, AdvanceTarget::Completed, t2)
            .unwrap();
        assert_eq!(completed.status, ShipmentStatus::Completed);
        assert_eq!(completed.escrow_release_at, Some(t2 + Duration::days(7)));
    }

    #[test]
    fn transporter_cannot_complete_client_cannot_pick_up() {
        let mut fx = fixture();
        let s = fx.ledger.create_shipment(fx.client, new_shipment(), t0()).unwrap();
        let o = fx
            .ledger
            .create_offer(fx.transporter_a, new_offer(s.id, 180_000), t0())
            .unwrap();
        fx.ledger.accept_offer(fx.client, o.id, t0()).unwrap();

        let err = fx
            .ledger
            .advance_status(fx.client, s.id, AdvanceTarget::PickedUp, t0())
            .unwrap_err();
        assert_eq!(err, MarketError::Authorization(AuthzReason::NotAParty));

        fx.ledger
            .advance_status(fx.transporter_a, s.id, AdvanceTarget::PickedUp, t0())
            .unwrap();
        fx.ledger
            .advance_status(fx.transporter_a, s.id, AdvanceTarget::Delivered, t0())
            .unwrap();
        let err = fx
            .ledger
            .advance_status(fx.transporter_a, s.id, AdvanceTarget::Completed, t0())
            .unwrap_err();
        assert_eq!(err, MarketError::Authorization(AuthzReason::NotAParty));
    }

    #[test]
    fn cancel_after_match_is_a_state_error() {
        let mut fx = fixture();
        let s = fx.ledger.create_shipment(fx.client, new_shipment(), t0()).unwrap();
        let o = fx
            .ledger
            .create_offer(fx.transporter_a, new_offer(s.id, 180_000), t0())
            .unwrap();
        fx.ledger.accept_offer(fx.client, o.id, t0()).unwrap();

        let err = fx.ledger.cancel_shipment(fx.client, s.id, t0()).unwrap_err();
        assert!(matches!(err, MarketError::State(_)));
        assert_eq!(
            fx.ledger.shipment(s.id).unwrap().status,
            ShipmentStatus::Confirmed
        );
    }

    #[test]
    fn dispute_permitted_to_both_parties_only() {
        let mut fx = fixture();
        let s = fx.ledger.create_shipment(fx.client, new_shipment(), t0()).unwrap();
        let o = fx
            .ledger
            .create_offer(fx.transporter_a, new_offer(s.id, 180_000), t0())
            .unwrap();
        fx.ledger.accept_offer(fx.client, o.id, t0()).unwrap();

        let err = fx
            .ledger
            .raise_dispute(fx.transporter_b, s.id, t0())
            .unwrap_err();
        assert_eq!(err, MarketError::Authorization(AuthzReason::NotAParty));

        let disputed = fx.ledger.raise_dispute(fx.transporter_a, s.id, t0()).unwrap();
        assert_eq!(disputed.status, ShipmentStatus::Disputed);
    }

    #[test]
    fn sweep_expires_and_reverts() {
        let mut fx = fixture();
        let s = fx.ledger.create_shipment(fx.client, new_shipment(), t0()).unwrap();
        let o = fx
            .ledger
            .create_offer(fx.transporter_a, new_offer(s.id, 180_000), t0())
            .unwrap();

        let later = t0() + Duration::hours(50);
        let p = fx.ledger.sweep(later);
        assert_eq!(p.expire_offers, vec![o.id]);
        assert_eq!(p.revert_shipments, vec![s.id]);
        assert_eq!(fx.ledger.offer(o.id).unwrap().status, OfferStatus::Expired);
        assert_eq!(
            fx.ledger.shipment(s.id).unwrap().status,
            ShipmentStatus::Pending
        );

        // Idempotent: a second sweep is a no-op.
        assert!(fx.ledger.sweep(later).is_noop());
    }

    #[test]
    fn validation_rejects_malformed_offers_before_any_lookup() {
        let mut fx = fixture();
        let s = fx.ledger.create_shipment(fx.client, new_shipment(), t0()).unwrap();

        let mut bad = new_offer(s.id, 0);
        let err = fx.ledger.create_offer(fx.transporter_a, bad, t0()).unwrap_err();
        assert_eq!(err, MarketError::Validation(ValidationReason::NonPositivePrice));

        bad = new_offer(s.id, 180_000);
        bad.available_from = t0() - Duration::hours(1);
        let err = fx.ledger.create_offer(fx.transporter_a, bad, t0()).unwrap_err();
        assert_eq!(
            err,
            MarketError::Validation(ValidationReason::AvailableFromInPast)
        );

        bad = new_offer(s.id, 180_000);
        bad.valid_hours = 0;
        let err = fx.ledger.create_offer(fx.transporter_a, bad, t0()).unwrap_err();
        assert_eq!(err, MarketError::Validation(ValidationReason::NonPositiveValidity));

        assert_eq!(fx.ledger.offers_for_shipment(s.id).len(), 0);
    }

    #[test]
    fn unknown_caller_is_an_authentication_error() {
        let mut fx = fixture();
        let err = fx
            .ledger
            .create_shipment(Uuid::new_v4(), new_shipment(), t0())
            .unwrap_err();
        assert_eq!(err, MarketError::Authentication);
    }
}
