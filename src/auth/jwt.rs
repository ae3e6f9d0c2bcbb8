//! Session credentials.
//!
//! The session layer issues bearer tokens and resolves them back to the
//! `(user_id, username)` identity everything downstream is keyed by: seat
//! ownership, wallet rows, and the per-user private card room. Sockets
//! carry the token in the connect query string, REST calls in the
//! `Authorization` header; both funnel through [`JwtManager::identify`].

use crate::error::{AppError, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Tokens outlive any single connection: a reconnecting socket presents the
/// same credential and lands back in the same rooms.
const TOKEN_LIFETIME_HOURS: i64 = 24 * 7;

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Claims {
    sub: String,
    username: String,
    iat: usize,
    exp: usize,
}

/// Who a verified credential belongs to. `user_id` is the authoritative
/// key; `username` is only what the table renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketIdentity {
    pub user_id: String,
    pub username: String,
}

#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(secret: String) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Mints the bearer credential handed out at register/login.
    pub fn issue(&self, user_id: String, username: String) -> Result<String> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: user_id,
            username,
            iat: now.timestamp() as usize,
            exp: (now + chrono::Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Auth(format!("Failed to create token: {}", e)))
    }

    /// Resolves a presented token to the identity the engine acts as.
    pub fn identify(&self, token: &str) -> Result<SocketIdentity> {
        let claims = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

        Ok(SocketIdentity {
            user_id: claims.sub,
            username: claims.username,
        })
    }

    /// Same resolution for REST callers: strips the `Bearer ` prefix off an
    /// Authorization header first.
    pub fn identify_bearer(&self, auth_header: &str) -> Result<SocketIdentity> {
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AppError::Unauthorized)?;
        self.identify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_identify_round_trip() {
        let mgr = JwtManager::new("test_secret".to_string());
        let token = mgr.issue("u1".to_string(), "alice".to_string()).unwrap();
        let identity = mgr.identify(&token).unwrap();
        assert_eq!(
            identity,
            SocketIdentity {
                user_id: "u1".to_string(),
                username: "alice".to_string(),
            }
        );
    }

    #[test]
    fn test_bearer_header_parsing() {
        let mgr = JwtManager::new("test_secret".to_string());
        let token = mgr.issue("u1".to_string(), "alice".to_string()).unwrap();

        let identity = mgr.identify_bearer(&format!("Bearer {}", token)).unwrap();
        assert_eq!(identity.user_id, "u1");

        // A raw token without the scheme is not a valid header.
        assert!(mgr.identify_bearer(&token).is_err());
    }

    #[test]
    fn test_foreign_and_garbage_tokens_rejected() {
        let mgr = JwtManager::new("test_secret".to_string());
        assert!(mgr.identify("not-a-token").is_err());

        let other = JwtManager::new("other_secret".to_string());
        let token = other.issue("u1".to_string(), "alice".to_string()).unwrap();
        assert!(mgr.identify(&token).is_err());
    }
}
