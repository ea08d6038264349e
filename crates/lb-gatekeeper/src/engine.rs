use crate::{GateAction, GateConfig, GateDecision, GateInput, GateRefusal};
use lb_lifecycle::{KycStatus, Role};

/// Evaluate the gate for one action. Checks run in a fixed order and the
/// first refusal wins:
///
/// 1. role matches the action (client posts, transporter bids)
/// 2. KYC approved where required (always, for `SubmitOffer`)
/// 3. subscription active where configured
pub fn evaluate(cfg: &GateConfig, inp: &GateInput) -> GateDecision {
    let p = &inp.profile;

    match inp.action {
        GateAction::PostShipment => {
            if p.role != Role::Client {
                return GateDecision::Refuse(GateRefusal::RoleMismatch);
            }
            if cfg.shipment_requires_subscription && !p.subscription_active {
                return GateDecision::Refuse(GateRefusal::SubscriptionRequired);
            }
        }
        GateAction::SubmitOffer => {
            if p.role != Role::Transporter {
                return GateDecision::Refuse(GateRefusal::RoleMismatch);
            }
            if p.kyc_status != KycStatus::Approved {
                return GateDecision::Refuse(GateRefusal::KycRequired);
            }
            if cfg.offer_requires_subscription && !p.subscription_active {
                return GateDecision::Refuse(GateRefusal::SubscriptionRequired);
            }
        }
    }

    GateDecision::Allow
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
