//! HTTP surface for the loadboard lifecycle core.
//!
//! The daemon binds the core operations (§ external interface) to a thin
//! axum router. Authentication itself is a collaborator's concern — handlers
//! take the caller id from the `x-caller-id` header and resolve it against
//! the profile directory; everything after that point is the ledger's job.

pub mod api_types;
pub mod routes;
pub mod state;
