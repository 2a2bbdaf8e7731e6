//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs carrying `{user_id, username, exp}` with a 30-day
//! expiry. The extractor accepts the token from the `Authorization: Bearer`
//! header or, for media elements that cannot set headers, from a `token`
//! query parameter.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use grabbit_core::User;

use crate::error::HttpError;
use crate::state::AppState;

/// Token lifetime.
pub const TOKEN_EXPIRY_DAYS: i64 = 30;

/// JWT claims.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub exp: i64,
}

/// Signing/verification keys derived from the persisted secret.
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthKeys {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for a verified user.
    pub fn issue(&self, user: &User) -> Result<String, HttpError> {
        let claims = Claims {
            user_id: user.id,
            username: user.username.clone(),
            exp: (Utc::now() + Duration::days(TOKEN_EXPIRY_DAYS)).timestamp(),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| HttpError::Internal(format!("token issue: {e}")))
    }

    /// Verify a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, HttpError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    HttpError::Unauthorized("Token has expired".to_string())
                }
                _ => HttpError::Unauthorized("Invalid token".to_string()),
            })
    }
}

/// Extractor for authenticated routes.
pub struct AuthUser(pub Claims);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| query_token(parts))
            .ok_or_else(|| HttpError::Unauthorized("Token is missing".to_string()))?;
        let claims = state.auth.verify(&token)?;
        Ok(Self(claims))
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn query_token(parts: &Parts) -> Option<String> {
    let query = parts.uri.query()?;
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("token=") {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 1,
            username: "admin".into(),
            password_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn issued_tokens_verify_and_carry_claims() {
        let keys = AuthKeys::new("test-secret");
        let token = keys.issue(&user()).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.user_id, 1);
        assert_eq!(claims.username, "admin");
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let keys = AuthKeys::new("secret-a");
        let token = keys.issue(&user()).unwrap();
        let other = AuthKeys::new("secret-b");
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        let keys = AuthKeys::new("secret");
        assert!(keys.verify("not-a-token").is_err());
    }
}
