//! Commission and escrow arithmetic.
//!
//! All amounts are integer minor units (cents); the rate is integer basis
//! points. No floating point appears on this surface. Arithmetic is checked:
//! an overflow fails the whole computation rather than silently wrapping —
//! a wrong fee must never be written to a confirmed shipment.
//!
//! The core computes amounts and timestamps only; it never moves money.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Basis-point scale: 10_000 bps = 100%.
pub const BPS_SCALE: i64 = 10_000;

// ---------------------------------------------------------------------------
// CommissionConfig
// ---------------------------------------------------------------------------

/// Platform fee policy. `rate_bps` is basis points (300 = 3%); the fee is
/// clamped into `[min_fee_minor, max_fee_minor]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionConfig {
    pub rate_bps: i64,
    pub min_fee_minor: i64,
    pub max_fee_minor: i64,
    /// Days after delivery confirmation until escrowed funds become payable.
    pub escrow_days: i64,
}

impl CommissionConfig {
    pub fn sane_defaults() -> Self {
        Self {
            rate_bps: 300,
            min_fee_minor: 1_000,
            max_fee_minor: 50_000,
            escrow_days: 7,
        }
    }
}

// ---------------------------------------------------------------------------
// CommissionError
// ---------------------------------------------------------------------------

/// A fee could not be computed. Callers must abort the acceptance — never
/// confirm a shipment with an unpriced fee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommissionError {
    /// `agreed_price_minor` ≤ 0 has no meaningful fee.
    NonPositivePrice,
    /// Policy is malformed (negative rate, min > max, negative bounds).
    BadPolicy,
    /// i64 overflow in the rate multiplication.
    Overflow,
}

impl std::fmt::Display for CommissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommissionError::NonPositivePrice => write!(f, "COMMISSION: non-positive price"),
            CommissionError::BadPolicy => write!(f, "COMMISSION: malformed fee policy"),
            CommissionError::Overflow => write!(f, "COMMISSION: arithmetic overflow"),
        }
    }
}

impl std::error::Error for CommissionError {}

// ---------------------------------------------------------------------------
// Fee
// ---------------------------------------------------------------------------

/// Result of one commission computation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Fee {
    pub fee_minor: i64,
    pub payout_minor: i64,
}

/// Compute the platform fee for an agreed price:
/// `clamp(price * rate_bps / 10_000, min_fee, max_fee)`, payout = price − fee.
///
/// # Errors
/// - [`CommissionError::NonPositivePrice`] for `agreed_price_minor ≤ 0`.
/// - [`CommissionError::BadPolicy`] for a malformed config.
/// - [`CommissionError::Overflow`] if `price * rate_bps` exceeds i64.
pub fn commission(cfg: &CommissionConfig, agreed_price_minor: i64) -> Result<Fee, CommissionError> {
    if agreed_price_minor <= 0 {
        return Err(CommissionError::NonPositivePrice);
    }
    if cfg.rate_bps < 0
        || cfg.min_fee_minor < 0
        || cfg.max_fee_minor < 0
        || cfg.min_fee_minor > cfg.max_fee_minor
    {
        return Err(CommissionError::BadPolicy);
    }

    let raw = agreed_price_minor
        .checked_mul(cfg.rate_bps)
        .ok_or(CommissionError::Overflow)?
        / BPS_SCALE;

    let fee_minor = raw.clamp(cfg.min_fee_minor, cfg.max_fee_minor);

    // min_fee may exceed the price on very small jobs; the payout still must
    // not go negative. Cap the fee at the price itself.
    let fee_minor = fee_minor.min(agreed_price_minor);
    let payout_minor = agreed_price_minor - fee_minor;

    Ok(Fee {
        fee_minor,
        payout_minor,
    })
}

/// Deferred escrow release: `delivery_confirmed_at + escrow_days`.
pub fn escrow_release_at(
    delivery_confirmed_at: DateTime<Utc>,
    escrow_days: i64,
) -> DateTime<Utc> {
    delivery_confirmed_at + Duration::days(escrow_days.max(0))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
