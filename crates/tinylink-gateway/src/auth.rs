//! Cookie-based user identity.
//!
//! The identity is a user id carried in an HS256 JWT stored in the
//! `Authorization` cookie. Public routes hand out a fresh identity when the
//! cookie is missing or invalid; user routes reject such requests.

use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use jiff::{SignedDuration, Timestamp};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub const AUTH_COOKIE: &str = "Authorization";
pub const TOKEN_TTL: SignedDuration = SignedDuration::from_hours(3);

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    user_id: String,
    exp: i64,
}

/// Identity of the caller, available to handlers as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Signs a token for `user_id` that expires after [`TOKEN_TTL`].
    pub fn issue(&self, user_id: &str) -> Result<String, AppError> {
        let claims = Claims {
            user_id: user_id.to_string(),
            exp: Timestamp::now().as_second() + TOKEN_TTL.as_secs(),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    /// Returns the user id of a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Option<String> {
        match jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) if !data.claims.user_id.is_empty() => Some(data.claims.user_id),
            Ok(_) => None,
            Err(err) => {
                debug!(error = %err, "rejected identity token");
                None
            }
        }
    }
}

fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_COOKIE)
        .map(|(_, value)| value)
}

fn identity(state: &AppState, headers: &HeaderMap) -> Option<UserId> {
    cookie_token(headers)
        .and_then(|token| state.keys().verify(token))
        .map(UserId)
}

/// Attaches the caller identity, issuing a new one when needed.
pub async fn public_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(user) = identity(&state, request.headers()) {
        request.extensions_mut().insert(user);
        return Ok(next.run(request).await);
    }

    let user_id = Uuid::new_v4().to_string();
    let token = state.keys().issue(&user_id)?;
    let cookie = HeaderValue::from_str(&format!("{AUTH_COOKIE}={token}; Path=/; HttpOnly"))?;
    debug!(user_id = %user_id, "issued new identity");

    request.extensions_mut().insert(UserId(user_id));
    let mut response = next.run(request).await;
    response.headers_mut().append(SET_COOKIE, cookie);
    Ok(response)
}

/// Rejects callers without a valid identity with 401.
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = identity(&state, request.headers()).ok_or(AppError::Unauthorized)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
