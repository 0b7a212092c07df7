//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, session claims)
//! 2. Converts amounts and calls a service
//! 3. Returns HTTP response (JSON, status code)

use axum::extract::FromRequest;

use crate::error::AppError;

/// Session-authenticated re-auth and password endpoints
pub mod auth;
/// Wallet balance, top-up, donation, transfer, withdrawal and earnings endpoints
pub mod funds;
pub mod health;
/// Gateway webhook endpoint
pub mod payments;

/// `Json` extractor whose rejections use the standard error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);
