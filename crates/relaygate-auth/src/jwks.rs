//! JWKS fetching and caching.
//!
//! Keys are fetched lazily on the first lookup, trusted for
//! `jwks_refresh_seconds`, and refetched when a token names an unknown `kid`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::prelude::*;
use jsonwebtoken::{Algorithm, DecodingKey};
use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::{AuthError, Result};
use crate::AuthConfig;

/// JWKS document served by the issuer.
#[derive(Debug, Deserialize)]
pub struct JwksResponse {
    /// The published keys.
    pub keys: Vec<JwkKey>,
}

/// A single JSON Web Key.
#[derive(Debug, Deserialize)]
pub struct JwkKey {
    /// Key type: `OKP` or `RSA`.
    pub kty: String,
    /// Key ID.
    pub kid: Option<String>,
    /// OKP curve name.
    pub crv: Option<String>,
    /// OKP public key, base64url.
    pub x: Option<String>,
    /// RSA modulus, base64url.
    pub n: Option<String>,
    /// RSA exponent, base64url.
    pub e: Option<String>,
}

/// A decoding key together with the algorithm it verifies.
#[derive(Clone)]
pub struct VerifyingKey {
    /// Signature algorithm bound to the key.
    pub algorithm: Algorithm,
    /// Key material.
    pub key: DecodingKey,
}

struct CachedKeys {
    keys: HashMap<String, VerifyingKey>,
    fetched_at: Option<Instant>,
}

/// Fetches and caches verifying keys from a JWKS endpoint.
pub struct JwksProvider {
    config: AuthConfig,
    client: reqwest::Client,
    cache: RwLock<CachedKeys>,
}

impl JwksProvider {
    /// Create a provider for the configured JWKS URL.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the HTTP client cannot be built.
    pub fn new(config: AuthConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            cache: RwLock::new(CachedKeys {
                keys: HashMap::new(),
                fetched_at: None,
            }),
        })
    }

    /// Look up a key by ID, refetching the key set when it is stale or the ID
    /// is unknown.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the refreshed set still lacks the key, or
    /// `JwksFetchFailed` if the endpoint cannot be read.
    pub async fn get_key(&self, kid: &str) -> Result<VerifyingKey> {
        {
            let cache = self.cache.read();
            let ttl = Duration::from_secs(self.config.jwks_refresh_seconds);
            let fresh = cache.fetched_at.is_some_and(|at| at.elapsed() < ttl);
            if let (true, Some(key)) = (fresh, cache.keys.get(kid)) {
                return Ok(key.clone());
            }
        }

        self.refresh().await?;

        self.cache
            .read()
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))
    }

    /// Refetch the key set unconditionally.
    ///
    /// # Errors
    ///
    /// Returns `JwksFetchFailed` if the endpoint cannot be read.
    pub async fn refresh(&self) -> Result<()> {
        tracing::debug!(url = %self.config.jwks_url, "Fetching JWKS");

        let response: JwksResponse = self
            .client
            .get(&self.config.jwks_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AuthError::JwksFetchFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchFailed(e.to_string()))?;

        let keys: HashMap<String, VerifyingKey> = response
            .keys
            .iter()
            .filter_map(|jwk| {
                let kid = jwk.kid.clone()?;
                match Self::parse_key(jwk) {
                    Ok(Some(key)) => Some((kid, key)),
                    Ok(None) => None,
                    Err(e) => {
                        tracing::warn!(kid = %kid, error = %e, "Skipping malformed JWK");
                        None
                    }
                }
            })
            .collect();

        tracing::debug!(count = keys.len(), "Cached JWKS keys");

        let mut cache = self.cache.write();
        cache.keys = keys;
        cache.fetched_at = Some(Instant::now());
        Ok(())
    }

    fn parse_key(jwk: &JwkKey) -> Result<Option<VerifyingKey>> {
        match jwk.kty.as_str() {
            "OKP" => {
                if jwk.crv.as_deref() != Some("Ed25519") {
                    tracing::debug!(crv = ?jwk.crv, "Ignoring non-Ed25519 OKP key");
                    return Ok(None);
                }
                let x = jwk
                    .x
                    .as_deref()
                    .ok_or_else(|| AuthError::InvalidToken("OKP key missing x".to_string()))?;
                let raw = BASE64_URL_SAFE_NO_PAD
                    .decode(x)
                    .map_err(|e| AuthError::InvalidToken(format!("invalid base64: {e}")))?;
                Ok(Some(VerifyingKey {
                    algorithm: Algorithm::EdDSA,
                    key: DecodingKey::from_ed_der(&raw),
                }))
            }
            "RSA" => {
                let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                    return Err(AuthError::InvalidToken("RSA key missing n or e".to_string()));
                };
                let key = DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
                Ok(Some(VerifyingKey {
                    algorithm: Algorithm::RS256,
                    key,
                }))
            }
            other => {
                tracing::debug!(kty = other, "Ignoring unsupported key type");
                Ok(None)
            }
        }
    }
}
