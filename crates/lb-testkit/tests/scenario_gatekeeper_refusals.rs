//! Scenario: gate refusals never touch the stores
//!
//! # Invariant under test
//! A refused caller (wrong role, unapproved KYC, lapsed subscription) gets a
//! typed authorization error and the ledger is left byte-identical — no
//! shipment or offer row may exist for a refused mutation.

use lb_lifecycle::{AuthzReason, KycStatus, MarketError, Role};
use lb_testkit::{assert_market_invariants, offer_request, shipment_request, t0, Market};

#[test]
fn unsubscribed_client_cannot_post() {
    let mut m = Market::new();
    let lapsed_client = m.add_profile(Role::Client, KycStatus::Approved, false);

    let err = m
        .ledger
        .create_shipment(lapsed_client, shipment_request(), t0())
        .unwrap_err();
    assert_eq!(
        err,
        MarketError::Authorization(AuthzReason::SubscriptionRequired)
    );
    assert_eq!(m.ledger.shipments().count(), 0);
}

#[test]
fn unapproved_transporter_cannot_bid_and_no_row_exists() {
    let mut m = Market::new();
    let s = m
        .ledger
        .create_shipment(m.client, shipment_request(), t0())
        .unwrap();

    for kyc in [KycStatus::Pending, KycStatus::Rejected] {
        let transporter = m.add_profile(Role::Transporter, kyc, true);
        let err = m
            .ledger
            .create_offer(transporter, offer_request(s.id, 180_000, t0()), t0())
            .unwrap_err();
        assert_eq!(err, MarketError::Authorization(AuthzReason::KycRequired));
    }

    assert_eq!(m.ledger.offers().count(), 0, "refusals must not create rows");
    assert_market_invariants(&m.ledger);
}

#[test]
fn roles_cannot_cross_sides() {
    let mut m = Market::new();
    let s = m
        .ledger
        .create_shipment(m.client, shipment_request(), t0())
        .unwrap();

    // A transporter cannot post shipments, even fully verified + subscribed.
    let err = m
        .ledger
        .create_shipment(m.transporter_a, shipment_request(), t0())
        .unwrap_err();
    assert_eq!(err, MarketError::Authorization(AuthzReason::RoleMismatch));

    // A client cannot bid on shipments, not even their own.
    let err = m
        .ledger
        .create_offer(m.client, offer_request(s.id, 180_000, t0()), t0())
        .unwrap_err();
    assert_eq!(err, MarketError::Authorization(AuthzReason::RoleMismatch));

    assert_eq!(m.ledger.offers().count(), 0);
    assert_eq!(m.ledger.shipments().count(), 1);
}

#[test]
fn unknown_caller_has_no_identity() {
    let mut m = Market::new();
    let err = m
        .ledger
        .create_shipment(uuid::Uuid::new_v4(), shipment_request(), t0())
        .unwrap_err();
    assert_eq!(err, MarketError::Authentication);
}
