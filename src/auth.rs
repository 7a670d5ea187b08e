use actix_web::{dev::Payload, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use std::future::{ready, Ready};

use crate::error::ApiError;
use crate::models::Id;

/// Name of the HTTP-only cookie carrying the session token.
pub const AUTH_COOKIE: &str = "jwt";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer: the user id as a decimal string.
    pub iss: String,
    pub exp: usize,
}

fn jwt_secret() -> Result<String, ApiError> {
    env::var("JWT_SECRET").map_err(|_| {
        tracing::error!("JWT_SECRET not set");
        ApiError::Internal
    })
}

/// Validate a JWT and return its claims.
fn decode_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.required_spec_claims.clear();
    validation.required_spec_claims.insert("exp".into());
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Authenticated caller. Resolved once per request from the bearer header,
/// falling back to the session cookie.
#[derive(Debug, Clone)]
pub struct Auth {
    pub user_id: Id,
    pub claims: Claims,
}

impl Auth {
    fn from_token(token: &str) -> Result<Self, ApiError> {
        let secret = jwt_secret()?;
        let claims = decode_jwt(token, &secret)
            .map_err(|_| ApiError::Unauthorized("Unauthenticated".into()))?;
        let user_id = claims
            .iss
            .parse::<Id>()
            .map_err(|_| ApiError::Unauthorized("Invalid token".into()))?;
        Ok(Auth { user_id, claims })
    }
}

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            return ready(Auth::from_token(bearer.token()));
        }
        if let Some(cookie) = req.cookie(AUTH_COOKIE) {
            if !cookie.value().is_empty() {
                return ready(Auth::from_token(cookie.value()));
            }
        }
        ready(Err(ApiError::Unauthorized("Unauthenticated".into())))
    }
}

/// Create a session token for a user.
pub fn create_jwt(user_id: Id, ttl: chrono::Duration) -> Result<String, ApiError> {
    let secret = jwt_secret()?;
    let expiration = chrono::Utc::now()
        .checked_add_signed(ttl)
        .ok_or(ApiError::Internal)?
        .timestamp() as usize;

    let claims = Claims {
        iss: user_id.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(error = %e, "failed to sign token");
        ApiError::Internal
    })
}
