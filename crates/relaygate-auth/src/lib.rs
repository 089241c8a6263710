//! Bearer token authentication for relaygate.
//!
//! The gateway's first admission stage turns a bearer token into an owner
//! identity and the tier that owner's quota is charged against.
//!
//! - [`JwtValidator`] is the seam the gateway depends on
//! - [`JwksValidator`] verifies `EdDSA` and `RS256` tokens against a cached JWKS
//! - `MockJwtValidator` (feature `test-utils`) accepts structured test tokens
//!
//! Tokens carry the owner in `sub` and an optional `tier` claim. A token
//! without a `tier` claim is treated as `free`.
//!
//! # Example
//!
//! ```no_run
//! use relaygate_auth::{AuthConfig, JwksValidator, JwtValidator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let validator = JwksValidator::new(AuthConfig::default())?;
//!
//! let claims = validator.validate("eyJhbGciOiJFZERTQSJ9...").await?;
//! println!("owner {} on tier {}", claims.owner_id, claims.tier);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod jwks;
pub mod jwt;

pub use error::{AuthError, Result};
pub use jwt::{JwksValidator, JwtValidator, ValidatedClaims};

#[cfg(any(test, feature = "test-utils"))]
pub use jwt::MockJwtValidator;

use serde::Deserialize;

/// Configuration for bearer token validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Expected `iss` claim.
    pub issuer: String,
    /// URL of the issuer's JSON Web Key Set.
    pub jwks_url: String,
    /// Expected `aud` claim.
    pub audience: String,
    /// How long fetched keys are trusted before a refetch, in seconds.
    pub jwks_refresh_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "https://auth.relaygate.dev".to_string(),
            jwks_url: "https://auth.relaygate.dev/.well-known/jwks.json".to_string(),
            audience: "relaygate".to_string(),
            jwks_refresh_seconds: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.audience, "relaygate");
        assert_eq!(config.jwks_refresh_seconds, 300);
        assert!(config.jwks_url.ends_with("/.well-known/jwks.json"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: AuthConfig =
            serde_json::from_str(r#"{"audience":"posts-api"}"#).unwrap();
        assert_eq!(config.audience, "posts-api");
        assert_eq!(config.issuer, "https://auth.relaygate.dev");
    }

    #[test]
    fn auth_error_status_codes() {
        assert_eq!(AuthError::TokenExpired.http_status_code(), 401);
        assert_eq!(AuthError::InvalidSignature.http_status_code(), 401);
        assert_eq!(AuthError::InvalidTier("gold".into()).http_status_code(), 401);
        assert_eq!(
            AuthError::JwksFetchFailed("test".into()).http_status_code(),
            500
        );
    }

    #[test]
    fn auth_error_retriable() {
        assert!(AuthError::TokenExpired.is_retriable());
        assert!(AuthError::JwksFetchFailed("test".into()).is_retriable());
        assert!(!AuthError::InvalidSignature.is_retriable());
        assert!(!AuthError::InvalidOwnerId.is_retriable());
    }
}
