//! Shipment status state machine.
//!
//! # Design
//!
//! The transition function is **total**: every `(status, event)` pair either
//! maps to a successor status or returns [`TransitionError`]. Callers apply
//! the result to the store only on `Ok` — an error performs no mutation.
//!
//! Two arms are deliberately idempotent rather than errors:
//!
//! - `OfferReceived + FirstOfferCreated` — a second offer arriving after
//!   another already advanced the shipment is a no-op, not a failure.
//!
//! Role/ownership checks (who may fire which event) are NOT done here; the
//! ledger performs them before calling [`transition`]. This function answers
//! only "is this move legal from this state".
//!
//! ```text
//!   Pending ──FirstOfferCreated──► OfferReceived
//!      │                               │
//!      ├───────────OfferAccepted───────┤
//!      │                               ▼
//!      │Cancel                     Confirmed ──MarkPickedUp──► PickedUp
//!      ▼                               │                          │
//!  Cancelled (term.)                   │RaiseDispute   MarkInTransit│MarkDelivered
//!                                      ▼                          ▼
//!                                  Disputed ◄────────── InTransit ─► Delivered
//!                                  (parked)                            │
//!                                                        ConfirmCompleted
//!                                                                      ▼
//!                                                              Completed (term.)
//! ```

use crate::types::ShipmentStatus;

// ---------------------------------------------------------------------------
// ShipmentEvent
// ---------------------------------------------------------------------------

/// Events that drive shipment status transitions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShipmentEvent {
    /// An offer was created against the shipment (OfferLedger.create).
    FirstOfferCreated,
    /// An offer was accepted (MatchingEngine.accept). The caller also writes
    /// `transporter_id` and `agreed_price_minor` — this is the only event
    /// that mutates more than `status`.
    OfferAccepted,
    /// Assigned transporter collected the cargo.
    MarkPickedUp,
    /// Assigned transporter reports the cargo moving.
    MarkInTransit,
    /// Assigned transporter reports delivery.
    MarkDelivered,
    /// Owning client confirms delivery.
    ConfirmCompleted,
    /// Either party raises a dispute on a matched shipment.
    RaiseDispute,
    /// Owning client cancels before a match.
    Cancel,
}

impl ShipmentEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentEvent::FirstOfferCreated => "first_offer_created",
            ShipmentEvent::OfferAccepted => "offer_accepted",
            ShipmentEvent::MarkPickedUp => "mark_picked_up",
            ShipmentEvent::MarkInTransit => "mark_in_transit",
            ShipmentEvent::MarkDelivered => "mark_delivered",
            ShipmentEvent::ConfirmCompleted => "confirm_completed",
            ShipmentEvent::RaiseDispute => "raise_dispute",
            ShipmentEvent::Cancel => "cancel",
        }
    }
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// Returned when an event cannot legally be applied in the current status.
/// The caller must leave the shipment untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionError {
    pub from: ShipmentStatus,
    pub event: ShipmentEvent,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "illegal shipment transition: {} + {}",
            self.from.as_str(),
            self.event.as_str()
        )
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// transition
// ---------------------------------------------------------------------------

/// Compute the successor status for `(from, event)`.
///
/// # Errors
/// [`TransitionError`] for every pair outside the lifecycle table.
pub fn transition(
    from: ShipmentStatus,
    event: ShipmentEvent,
) -> Result<ShipmentStatus, TransitionError> {
    use ShipmentEvent::*;
    use ShipmentStatus::*;

    let to = match (from, event) {
        // First offer advances Pending; further offers are a no-op.
        (Pending, FirstOfferCreated) => OfferReceived,
        (OfferReceived, FirstOfferCreated) => OfferReceived,

        (Pending | OfferReceived, OfferAccepted) => Confirmed,

        (Confirmed, MarkPickedUp) => PickedUp,
        (PickedUp, MarkInTransit) => InTransit,
        // Delivery may be reported straight from PickedUp (short hauls never
        // report the in-transit leg).
        (PickedUp | InTransit, MarkDelivered) => Delivered,

        (Delivered, ConfirmCompleted) => Completed,

        (Confirmed | PickedUp | InTransit | Delivered, RaiseDispute) => Disputed,

        (Pending | OfferReceived, Cancel) => Cancelled,

        (from, event) => return Err(TransitionError { from, event }),
    };

    Ok(to)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
