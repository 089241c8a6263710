//! Token validation and claims extraction.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;

use relaygate_core::{OwnerId, Tier};

use crate::error::{AuthError, Result};
use crate::jwks::JwksProvider;
use crate::AuthConfig;

/// Identity established by a valid bearer token.
#[derive(Debug, Clone)]
pub struct ValidatedClaims {
    /// Owner taken from the `sub` claim.
    pub owner_id: OwnerId,
    /// Tier taken from the `tier` claim, `free` when absent.
    pub tier: Tier,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
}

/// Trait for validating bearer tokens.
#[async_trait]
pub trait JwtValidator: Send + Sync {
    /// Validate a token and extract the caller's identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid, expired, or cannot be validated.
    async fn validate(&self, token: &str) -> Result<ValidatedClaims>;
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: String,
    #[serde(default)]
    tier: Option<String>,
    exp: i64,
}

impl RawClaims {
    fn into_claims(self) -> Result<ValidatedClaims> {
        let owner_id = OwnerId::from_str(&self.sub).map_err(|_| AuthError::InvalidOwnerId)?;
        let tier = match self.tier {
            Some(name) => Tier::from_str(&name).map_err(|_| AuthError::InvalidTier(name))?,
            None => Tier::default(),
        };
        let expires_at = DateTime::from_timestamp(self.exp, 0)
            .ok_or_else(|| AuthError::InvalidToken("invalid exp timestamp".to_string()))?;

        Ok(ValidatedClaims {
            owner_id,
            tier,
            expires_at,
        })
    }
}

/// JWKS-backed validator accepting `EdDSA` and `RS256` tokens.
pub struct JwksValidator {
    config: AuthConfig,
    jwks: JwksProvider,
}

impl JwksValidator {
    /// Create a validator for the configured issuer.
    ///
    /// # Errors
    ///
    /// Returns an error if the JWKS HTTP client cannot be built.
    pub fn new(config: AuthConfig) -> Result<Self> {
        let jwks = JwksProvider::new(config.clone())?;
        Ok(Self { config, jwks })
    }

    /// The underlying key cache.
    #[must_use]
    pub const fn jwks(&self) -> &JwksProvider {
        &self.jwks
    }
}

#[async_trait]
impl JwtValidator for JwksValidator {
    async fn validate(&self, token: &str) -> Result<ValidatedClaims> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if !matches!(header.alg, Algorithm::EdDSA | Algorithm::RS256) {
            return Err(AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let kid = header
            .kid
            .ok_or_else(|| AuthError::MissingClaim("kid".to_string()))?;

        let verifying = self.jwks.get_key(&kid).await?;
        if verifying.algorithm != header.alg {
            return Err(AuthError::InvalidSignature);
        }

        let mut validation = Validation::new(verifying.algorithm);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        let data = decode::<RawClaims>(token, &verifying.key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
                ErrorKind::InvalidAudience => AuthError::InvalidAudience,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::MissingRequiredClaim(claim) => AuthError::MissingClaim(claim.clone()),
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        data.claims.into_claims()
    }
}

/// Validator for tests and local development.
///
/// Accepts `test-token:<owner_uuid>` or `test-token:<owner_uuid>:<tier>`.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MockJwtValidator {
    /// Tier assigned when the token does not name one.
    pub default_tier: Tier,
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl JwtValidator for MockJwtValidator {
    async fn validate(&self, token: &str) -> Result<ValidatedClaims> {
        let rest = token.strip_prefix("test-token:").ok_or_else(|| {
            AuthError::InvalidToken("expected test-token:<owner>[:<tier>]".to_string())
        })?;

        let (owner, tier) = match rest.split_once(':') {
            Some((owner, tier)) => (owner, Some(tier)),
            None => (rest, None),
        };

        RawClaims {
            sub: owner.to_string(),
            tier: tier.map(str::to_string),
            exp: (Utc::now() + chrono::Duration::hours(1)).timestamp(),
        }
        .into_claims()
        .map(|mut claims| {
            if tier.is_none() {
                claims.tier = self.default_tier;
            }
            claims
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::prelude::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OWNER: &str = "550e8400-e29b-41d4-a716-446655440000";

    fn unsigned_token(header: &serde_json::Value) -> String {
        let head = BASE64_URL_SAFE_NO_PAD.encode(header.to_string());
        let body = BASE64_URL_SAFE_NO_PAD.encode(
            serde_json::json!({ "sub": OWNER, "exp": 4_102_444_800_i64 }).to_string(),
        );
        format!("{head}.{body}.c2ln")
    }

    fn validator_for(server: &MockServer) -> JwksValidator {
        JwksValidator::new(AuthConfig {
            jwks_url: format!("{}/.well-known/jwks.json", server.uri()),
            ..AuthConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn mock_validator_reads_owner_and_tier() {
        let validator = MockJwtValidator::default();

        let claims = validator
            .validate(&format!("test-token:{OWNER}:premium"))
            .await
            .unwrap();
        assert_eq!(claims.owner_id.to_string(), OWNER);
        assert_eq!(claims.tier, Tier::Premium);
    }

    #[tokio::test]
    async fn mock_validator_uses_default_tier() {
        let validator = MockJwtValidator {
            default_tier: Tier::Basic,
        };

        let claims = validator
            .validate(&format!("test-token:{OWNER}"))
            .await
            .unwrap();
        assert_eq!(claims.tier, Tier::Basic);
    }

    #[tokio::test]
    async fn mock_validator_rejects_garbage() {
        let validator = MockJwtValidator::default();

        assert!(matches!(
            validator.validate("invalid-token").await,
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(
            validator.validate("test-token:not-a-uuid").await,
            Err(AuthError::InvalidOwnerId)
        ));
        assert!(matches!(
            validator.validate(&format!("test-token:{OWNER}:gold")).await,
            Err(AuthError::InvalidTier(_))
        ));
    }

    #[tokio::test]
    async fn rejects_symmetric_algorithms() {
        let server = MockServer::start().await;
        let validator = validator_for(&server);

        let token = unsigned_token(&serde_json::json!({ "alg": "HS256", "kid": "k1" }));
        assert!(matches!(
            validator.validate(&token).await,
            Err(AuthError::UnsupportedAlgorithm(_))
        ));
    }

    #[tokio::test]
    async fn requires_key_id() {
        let server = MockServer::start().await;
        let validator = validator_for(&server);

        let token = unsigned_token(&serde_json::json!({ "alg": "EdDSA" }));
        assert!(matches!(
            validator.validate(&token).await,
            Err(AuthError::MissingClaim(_))
        ));
    }

    #[tokio::test]
    async fn unknown_key_id_after_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keys": [{
                    "kty": "OKP",
                    "crv": "Ed25519",
                    "kid": "published",
                    "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        let validator = validator_for(&server);

        let token = unsigned_token(&serde_json::json!({ "alg": "EdDSA", "kid": "rotated" }));
        assert!(matches!(
            validator.validate(&token).await,
            Err(AuthError::KeyNotFound(kid)) if kid == "rotated"
        ));
    }

    #[tokio::test]
    async fn jwks_outage_is_retriable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let validator = validator_for(&server);

        let token = unsigned_token(&serde_json::json!({ "alg": "EdDSA", "kid": "k1" }));
        let err = validator.validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::JwksFetchFailed(_)));
        assert!(err.is_retriable());
    }
}
