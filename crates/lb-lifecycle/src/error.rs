//! Error taxonomy for every core mutation.
//!
//! Every operation returns a discriminated result — success value or one
//! [`MarketError`] — and no exception-like path crosses the core boundary.
//! Each variant carries a stable machine code (`MarketError::code`) so the
//! transport layer can classify without string-matching display text.
//! A failure NEVER leaves a partial write behind; that contract is enforced
//! by the stores, this module only names the outcomes.

use crate::machine::TransitionError;

// ---------------------------------------------------------------------------
// Reason codes
// ---------------------------------------------------------------------------

/// Identity known, action forbidden.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AuthzReason {
    /// Transporter KYC is not `Approved`.
    KycRequired,
    /// Caller's role cannot perform this operation.
    RoleMismatch,
    /// Caller's subscription is not active.
    SubscriptionRequired,
    /// Caller is neither the owning client nor the assigned transporter.
    NotAParty,
}

impl AuthzReason {
    pub fn code(&self) -> &'static str {
        match self {
            AuthzReason::KycRequired => "kyc_required",
            AuthzReason::RoleMismatch => "role_mismatch",
            AuthzReason::SubscriptionRequired => "subscription_required",
            AuthzReason::NotAParty => "not_a_party",
        }
    }
}

/// Referenced entity absent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Shipment,
    Offer,
    Profile,
}

impl EntityKind {
    pub fn code(&self) -> &'static str {
        match self {
            EntityKind::Shipment => "shipment_not_found",
            EntityKind::Offer => "offer_not_found",
            EntityKind::Profile => "profile_not_found",
        }
    }
}

/// Invariant violation detected at mutation time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConflictReason {
    /// An active offer for this `(shipment, transporter)` pair already exists.
    DuplicateOffer,
    /// Shipment no longer accepts offers.
    ShipmentClosed,
    /// Offer is not `Pending` (already decided, withdrawn, or past its
    /// validity deadline).
    OfferNotPending,
    /// The shipment was matched (or closed) by a concurrent call; the whole
    /// accept unit rolled back.
    AlreadyMatched,
}

impl ConflictReason {
    pub fn code(&self) -> &'static str {
        match self {
            ConflictReason::DuplicateOffer => "duplicate_offer",
            ConflictReason::ShipmentClosed => "shipment_closed",
            ConflictReason::OfferNotPending => "offer_not_pending",
            ConflictReason::AlreadyMatched => "already_matched",
        }
    }
}

/// Malformed input, rejected before any store access.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValidationReason {
    NonPositivePrice,
    /// Price exceeds the representable bound (fee arithmetic must not
    /// overflow downstream).
    PriceOutOfRange,
    NonPositiveEstimatedDays,
    NonPositiveValidity,
    AvailableFromInPast,
    MissingRoute,
    UnknownStatus,
}

impl ValidationReason {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationReason::NonPositivePrice => "non_positive_price",
            ValidationReason::PriceOutOfRange => "price_out_of_range",
            ValidationReason::NonPositiveEstimatedDays => "non_positive_estimated_days",
            ValidationReason::NonPositiveValidity => "non_positive_validity",
            ValidationReason::AvailableFromInPast => "available_from_in_past",
            ValidationReason::MissingRoute => "missing_route",
            ValidationReason::UnknownStatus => "unknown_status",
        }
    }
}

// ---------------------------------------------------------------------------
// MarketError
// ---------------------------------------------------------------------------

/// The one error type every core mutation returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarketError {
    /// No caller identity could be established.
    Authentication,
    Authorization(AuthzReason),
    NotFound(EntityKind),
    Conflict(ConflictReason),
    Validation(ValidationReason),
    /// Illegal lifecycle transition.
    State(TransitionError),
}

impl MarketError {
    /// Stable machine code for transport layers and logs.
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::Authentication => "authentication_required",
            MarketError::Authorization(r) => r.code(),
            MarketError::NotFound(k) => k.code(),
            MarketError::Conflict(r) => r.code(),
            MarketError::Validation(r) => r.code(),
            MarketError::State(_) => "illegal_transition",
        }
    }
}

impl std::fmt::Display for MarketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketError::Authentication => write!(f, "AUTH_REQUIRED: no caller identity"),
            MarketError::Authorization(r) => write!(f, "FORBIDDEN: {}", r.code()),
            MarketError::NotFound(k) => write!(f, "NOT_FOUND: {}", k.code()),
            MarketError::Conflict(r) => write!(f, "CONFLICT: {}", r.code()),
            MarketError::Validation(r) => write!(f, "INVALID: {}", r.code()),
            MarketError::State(e) => write!(f, "STATE: {e}"),
        }
    }
}

impl std::error::Error for MarketError {}

impl From<TransitionError> for MarketError {
    fn from(e: TransitionError) -> Self {
        MarketError::State(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{ShipmentEvent, TransitionError};
    use crate::types::ShipmentStatus;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            MarketError::Authorization(AuthzReason::KycRequired).code(),
            "kyc_required"
        );
        assert_eq!(
            MarketError::Conflict(ConflictReason::DuplicateOffer).code(),
            "duplicate_offer"
        );
        assert_eq!(
            MarketError::Conflict(ConflictReason::AlreadyMatched).code(),
            "already_matched"
        );
        assert_eq!(
            MarketError::Conflict(ConflictReason::ShipmentClosed).code(),
            "shipment_closed"
        );
        assert_eq!(
            MarketError::Conflict(ConflictReason::OfferNotPending).code(),
            "offer_not_pending"
        );
    }

    #[test]
    fn transition_error_converts() {
        let te = TransitionError {
            from: ShipmentStatus::Completed,
            event: ShipmentEvent::Cancel,
        };
        let err: MarketError = te.clone().into();
        assert_eq!(err, MarketError::State(te));
        assert_eq!(err.code(), "illegal_transition");
    }
}
