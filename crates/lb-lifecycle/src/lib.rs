//! Domain core for the loadboard marketplace: shipment/offer records, status
//! enums, the shipment transition function, and the error taxonomy shared by
//! every mutation surface.
//!
//! This crate is pure — no I/O, no async, no store access. The ledger and the
//! Postgres store both enforce exactly the semantics defined here.

mod error;
mod machine;
mod types;

pub use error::{
    AuthzReason, ConflictReason, EntityKind, MarketError, ValidationReason,
};
pub use machine::{transition, ShipmentEvent, TransitionError};
pub use types::{
    KycStatus, Offer, OfferStatus, Profile, Role, RouteStop, Shipment, ShipmentStatus,
    StopOperation,
};
