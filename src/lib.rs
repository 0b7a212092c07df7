//! Creator-donation wallet server.
//!
//! Users top up a wallet through a hosted payment gateway checkout, donate or
//! transfer balance to creators, and withdraw through a simulated payout.
//! Credits from the gateway arrive by signed webhook and are applied exactly
//! once per checkout session.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod money;
pub mod services;
pub mod store;
