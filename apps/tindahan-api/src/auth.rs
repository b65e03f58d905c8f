//! JWT authentication.
//!
//! Device access tokens are HS256 JWTs carrying everything the engine needs
//! to build an [`Actor`]: user, store, device, role and per-user capability
//! overrides.

use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tindahan_core::{Actor, Capability, Role};

use crate::error::ApiError;

const ACCESS: &str = "access";

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,

    pub store_id: String,

    /// Device the token was issued to
    pub device_id: String,

    pub role: Role,

    #[serde(default)]
    pub grants: Vec<Capability>,

    #[serde(default)]
    pub revokes: Vec<Capability>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// JWT ID
    pub jti: String,

    pub token_type: String,
}

impl Claims {
    pub fn into_actor(self) -> Actor {
        Actor {
            user_id: self.sub,
            store_id: self.store_id,
            device_id: self.device_id,
            role: self.role,
            grants: self.grants,
            revokes: self.revokes,
        }
    }
}

/// JWT token manager.
#[derive(Clone)]
pub struct JwtManager {
    secret: String,
    access_lifetime_secs: i64,
}

impl JwtManager {
    pub fn new(secret: String, access_lifetime_secs: i64) -> Self {
        JwtManager {
            secret,
            access_lifetime_secs,
        }
    }

    /// Issues an access token for `actor`.
    pub fn generate_access_token(&self, actor: &Actor) -> Result<String, ApiError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.access_lifetime_secs);

        let claims = Claims {
            sub: actor.user_id.clone(),
            store_id: actor.store_id.clone(),
            device_id: actor.device_id.clone(),
            role: actor.role,
            grants: actor.grants.clone(),
            revokes: actor.revokes.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: ACCESS.to_string(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ApiError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Validates signature, expiry and token type.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, ApiError> {
        let validation = Validation::new(Algorithm::HS256);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| ApiError::unauthorized(format!("Invalid token: {}", e)))?
        .claims;

        if claims.token_type != ACCESS {
            return Err(ApiError::unauthorized("Expected access token"));
        }
        if claims.sub.trim().is_empty() || claims.store_id.trim().is_empty() {
            return Err(ApiError::unauthorized("Token is missing its subject or store"));
        }

        Ok(claims)
    }
}

/// Extracts the bearer token from the `Authorization` header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| ApiError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| ApiError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ApiError::unauthorized("Authorization scheme must be `Bearer`"));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::unauthorized("Bearer token is empty"));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn cashier() -> Actor {
        Actor {
            user_id: "u-1".to_string(),
            store_id: "s1".to_string(),
            device_id: "d-1".to_string(),
            role: Role::Cashier,
            grants: vec![Capability::SaleVoid],
            revokes: Vec::new(),
        }
    }

    #[test]
    fn test_token_roundtrip_builds_actor() {
        let manager = JwtManager::new("test-secret".to_string(), 3600);
        let token = manager.generate_access_token(&cashier()).unwrap();

        let claims = manager.validate_access_token(&token).unwrap();
        assert_eq!(claims.token_type, "access");
        assert_eq!(claims.into_actor(), cashier());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = JwtManager::new("one".to_string(), 3600);
        let verifier = JwtManager::new("two".to_string(), 3600);
        let token = issuer.generate_access_token(&cashier()).unwrap();

        let err = verifier.validate_access_token(&token).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn test_expired_token_rejected() {
        // Past the default 60s leeway.
        let manager = JwtManager::new("test-secret".to_string(), -120);
        let token = manager.generate_access_token(&cashier()).unwrap();
        assert!(manager.validate_access_token(&token).is_err());
    }

    #[test]
    fn test_bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def");
    }
}
