//! Data models representing database entities and API bodies.

/// Wallet account model
pub mod account;
/// Identity provider session claims
pub mod session;
/// Ledger entry model and funds API bodies
pub mod transaction;
/// Identity record
pub mod user;
/// Payment gateway event envelopes
pub mod webhook;
