//! Gatekeeper — the single decision point evaluated before any marketplace
//! mutation.
//!
//! Every gated action flows through [`evaluate`]; rule changes (e.g. whether
//! transporters need a subscription to bid) live in [`GateConfig`] and do not
//! ripple through call sites. The evaluator is pure and deterministic: checks
//! run in a fixed order and the first refusal wins.

mod engine;
mod memory;
mod types;

pub use engine::evaluate;
pub use memory::MemoryProfiles;
pub use types::{GateAction, GateConfig, GateDecision, GateInput, GateRefusal, ProfileSource};
