use lb_lifecycle::{AuthzReason, Profile};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// GateConfig
// ---------------------------------------------------------------------------

/// Gate policy knobs. Product decisions live here, not in call sites.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateConfig {
    /// Posting a shipment requires an active client subscription
    /// (a free trial counts as active — the collaborator collapses that).
    pub shipment_requires_subscription: bool,
    /// Whether transporters additionally need an active subscription to bid.
    /// KYC approval is always required; this knob is the product decision
    /// left to configuration.
    pub offer_requires_subscription: bool,
}

impl GateConfig {
    pub fn sane_defaults() -> Self {
        Self {
            shipment_requires_subscription: true,
            offer_requires_subscription: false,
        }
    }
}

// ---------------------------------------------------------------------------
// GateAction / GateInput
// ---------------------------------------------------------------------------

/// What the caller is asking permission to do.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GateAction {
    PostShipment,
    SubmitOffer,
}

/// Inputs for one gate evaluation. The profile fields come straight from the
/// collaborator's `getProfile` projection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateInput {
    pub action: GateAction,
    pub profile: Profile,
}

// ---------------------------------------------------------------------------
// GateDecision
// ---------------------------------------------------------------------------

/// Refusal reasons, mapped 1:1 onto the authorization error taxonomy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GateRefusal {
    RoleMismatch,
    KycRequired,
    SubscriptionRequired,
}

impl GateRefusal {
    pub fn to_authz(self) -> AuthzReason {
        match self {
            GateRefusal::RoleMismatch => AuthzReason::RoleMismatch,
            GateRefusal::KycRequired => AuthzReason::KycRequired,
            GateRefusal::SubscriptionRequired => AuthzReason::SubscriptionRequired,
        }
    }
}

/// Gate output. `Allow` or the first refusal encountered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Refuse(GateRefusal),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }
}

// ---------------------------------------------------------------------------
// ProfileSource
// ---------------------------------------------------------------------------

/// Collaborator interface: `getProfile(user_id) → {role, kyc_status,
/// subscription_active}`. Authentication/session management lives behind it.
///
/// Production wires the user service here; tests use an in-memory map.
pub trait ProfileSource {
    fn profile(&self, user_id: Uuid) -> Option<Profile>;
}
