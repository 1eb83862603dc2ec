use std::{env, sync::Arc};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::TypedHeader;
use chrono::{TimeDelta, Utc};
use headers::{authorization::Bearer, Authorization};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use model::{user::User, WithId};
use serde::{Deserialize, Serialize};

use crate::{common::ApiError, WebState};

const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60;

/// Signing material and lifetime for bearer tokens.
#[derive(Clone)]
pub struct AuthConfig {
    keys: Arc<Keys>,
    token_ttl: TimeDelta,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

impl AuthConfig {
    pub fn new(secret: &str, token_ttl: TimeDelta) -> Self {
        Self {
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(secret.as_bytes()),
                decoding: DecodingKey::from_secret(secret.as_bytes()),
            }),
            token_ttl,
        }
    }

    /// Reads `AUTH_SECRET` (required) and `AUTH_TOKEN_TTL_MINUTES`.
    pub fn from_env() -> Option<Self> {
        let secret = env::var("AUTH_SECRET").ok()?;
        let ttl_minutes = env::var("AUTH_TOKEN_TTL_MINUTES")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_TOKEN_TTL_MINUTES);
        Some(Self::new(&secret, TimeDelta::minutes(ttl_minutes)))
    }

    /// Issues a signed token whose subject is the username.
    pub fn create_access_token(&self, username: &str) -> Result<String, ApiError> {
        let claims = Claims {
            sub: username.to_owned(),
            exp: (Utc::now() + self.token_ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.keys.encoding)
            .map_err(|why| {
                log::error!("failed to sign access token: {why}");
                ApiError::internal()
            })
    }

    /// The subject of a valid, unexpired token.
    pub fn verify_access_token(&self, token: &str) -> Option<String> {
        jsonwebtoken::decode::<Claims>(
            token,
            &self.keys.decoding,
            &Validation::default(),
        )
        .map(|data| data.claims.sub)
        .ok()
    }
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|why| {
            log::error!("failed to hash password: {why}");
            ApiError::internal()
        })
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// The authenticated rider, resolved from the bearer token of the request.
pub struct CurrentUser(pub WithId<User>);

#[async_trait]
impl FromRequestParts<WebState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &WebState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| ApiError::unauthorized())?;

        let username = state
            .auth
            .verify_access_token(bearer.token())
            .ok_or_else(ApiError::unauthorized)?;

        state
            .transit_client
            .user_by_username(&username)
            .await
            .map_err(ApiError::from)?
            .map(CurrentUser)
            .ok_or_else(ApiError::unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn token_subject_survives_round_trip() {
        let config = AuthConfig::new("secret", TimeDelta::minutes(5));
        let token = config.create_access_token("maria").unwrap();
        assert_eq!(config.verify_access_token(&token).as_deref(), Some("maria"));
        assert!(config.verify_access_token("not-a-token").is_none());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let config = AuthConfig::new("secret", TimeDelta::minutes(5));
        let other = AuthConfig::new("other-secret", TimeDelta::minutes(5));
        let token = config.create_access_token("maria").unwrap();
        assert!(other.verify_access_token(&token).is_none());
    }
}
