//! Session authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the session token from the Authorization header
//! 2. Verify its HS256 signature and expiry
//! 3. Inject the decoded [`SessionClaims`] into the request
//! 4. Reject everything else with HTTP 401

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error};

use crate::app::AppState;
use crate::error::AppError;
use crate::models::session::SessionClaims;

/// Signing and verification keys for session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionKeys {
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        }
    }

    /// Sign `claims` into a bearer token.
    pub fn issue(&self, claims: &SessionClaims) -> Result<String, AppError> {
        let mut header = Header::new(Algorithm::HS256);
        header.typ = Some("JWT".to_string());

        encode(&header, claims, &self.encoding).map_err(|e| {
            error!("session token encoding error: {}", e);
            AppError::Internal("Token creation failed".to_string())
        })
    }

    /// Decode a bearer token, rejecting bad signatures and expired sessions.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(reason = %e, "session token rejected");
                AppError::Unauthorized
            })
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AppError::Unauthorized)?;

    if token.is_empty() {
        return Err(AppError::Unauthorized);
    }
    Ok(token)
}

/// Session authentication middleware function.
///
/// Handlers behind this layer extract `Extension<SessionClaims>`.
///
/// # Headers
///
/// ```text
/// Authorization: Bearer <session token>
/// ```
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;
    let claims = state.sessions.verify(token)?;

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}
