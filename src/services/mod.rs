//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They validate input, call the stores and the gateway, and log outcomes.

pub mod payment_gateway;
pub mod reauth_service;
pub mod wallet_service;
pub mod webhook_service;
