//! Scenario: two competing bids, one acceptance, late sweep
//!
//! The canonical marketplace flow, end to end:
//! 1. client posts shipment S (pending)
//! 2. transporter A offers €1800 / 3 days, valid 48h → S becomes offer_received
//! 3. transporter B offers €1700 / 4 days → S stays offer_received
//! 4. client accepts A's offer → A accepted, B rejected, S confirmed at €1800
//! 5. A's withdrawal attempt now fails (offer no longer pending)
//! 6. 50 hours later the sweep runs: B's rejected offer is untouched by
//!    expiry (which only moves pending rows)
//! 7. commission at 3% min €10 max €500 → fee €54, payout €1746

use chrono::Duration;
use lb_lifecycle::{ConflictReason, MarketError, OfferStatus, ShipmentStatus};
use lb_testkit::{assert_market_invariants, offer_request, shipment_request, t0, Market};

#[test]
fn literal_marketplace_flow() {
    let mut m = Market::new();
    let now = t0();

    // 1. post
    let s = m
        .ledger
        .create_shipment(m.client, shipment_request(), now)
        .unwrap();
    assert_eq!(s.status, ShipmentStatus::Pending);

    // 2. first bid advances the shipment
    let o1 = m
        .ledger
        .create_offer(m.transporter_a, offer_request(s.id, 180_000, now), now)
        .unwrap();
    assert_eq!(o1.status, OfferStatus::Pending);
    assert_eq!(
        m.ledger.shipment(s.id).unwrap().status,
        ShipmentStatus::OfferReceived
    );

    // 3. second bid leaves it there
    let mut second = offer_request(s.id, 170_000, now);
    second.estimated_days = 4;
    let o2 = m
        .ledger
        .create_offer(m.transporter_b, second, now)
        .unwrap();
    assert_eq!(
        m.ledger.shipment(s.id).unwrap().status,
        ShipmentStatus::OfferReceived
    );
    assert_market_invariants(&m.ledger);

    // 4. acceptance: winner accepted, sibling rejected, shipment confirmed
    let confirmed = m.ledger.accept_offer(m.client, o1.id, now).unwrap();
    assert_eq!(confirmed.status, ShipmentStatus::Confirmed);
    assert_eq!(confirmed.transporter_id, Some(m.transporter_a));
    assert_eq!(confirmed.agreed_price_minor, Some(180_000));
    assert_eq!(m.ledger.offer(o1.id).unwrap().status, OfferStatus::Accepted);
    assert_eq!(m.ledger.offer(o2.id).unwrap().status, OfferStatus::Rejected);
    assert_market_invariants(&m.ledger);

    // 5. withdrawal after acceptance fails, state unchanged
    let err = m
        .ledger
        .withdraw_offer(m.transporter_a, o1.id)
        .unwrap_err();
    assert_eq!(err, MarketError::Conflict(ConflictReason::OfferNotPending));
    assert_eq!(m.ledger.offer(o1.id).unwrap().status, OfferStatus::Accepted);

    // 6. sweep at +50h: expiry only touches pending rows
    let later = now + Duration::hours(50);
    let plan = m.ledger.sweep(later);
    assert!(plan.is_noop(), "nothing here is pending: {plan:?}");
    assert_eq!(m.ledger.offer(o2.id).unwrap().status, OfferStatus::Rejected);
    assert_eq!(
        m.ledger.shipment(s.id).unwrap().status,
        ShipmentStatus::Confirmed
    );

    // 7. commission arithmetic on the confirmed shipment
    assert_eq!(confirmed.fee_minor, Some(5_400));
    assert_eq!(confirmed.payout_minor, Some(174_600));
    assert_market_invariants(&m.ledger);
}

#[test]
fn rejected_bidder_can_rebid_and_win_after_revert() {
    let mut m = Market::new();
    let now = t0();

    let s = m
        .ledger
        .create_shipment(m.client, shipment_request(), now)
        .unwrap();
    let o1 = m
        .ledger
        .create_offer(m.transporter_a, offer_request(s.id, 180_000, now), now)
        .unwrap();

    // Client rejects the only offer; shipment stays offer_received until the
    // sweep notices there is no active offer left.
    m.ledger.reject_offer(m.client, o1.id).unwrap();
    assert_eq!(
        m.ledger.shipment(s.id).unwrap().status,
        ShipmentStatus::OfferReceived
    );

    let plan = m.ledger.sweep(now + Duration::minutes(1));
    assert_eq!(plan.revert_shipments, vec![s.id]);
    assert_eq!(
        m.ledger.shipment(s.id).unwrap().status,
        ShipmentStatus::Pending
    );

    // Same transporter returns with a sharper price on a fresh row.
    let later = now + Duration::hours(1);
    let o2 = m
        .ledger
        .create_offer(m.transporter_a, offer_request(s.id, 165_000, later), later)
        .unwrap();
    assert_ne!(o1.id, o2.id);
    let confirmed = m.ledger.accept_offer(m.client, o2.id, later).unwrap();
    assert_eq!(confirmed.agreed_price_minor, Some(165_000));

    // History intact: the old rejected row coexists with the accepted one.
    assert_eq!(m.ledger.offer(o1.id).unwrap().status, OfferStatus::Rejected);
    assert_market_invariants(&m.ledger);
}
