//! Authentication error types.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while authenticating a bearer token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token has expired.
    #[error("token expired")]
    TokenExpired,

    /// The token signature does not verify.
    #[error("invalid signature")]
    InvalidSignature,

    /// The `iss` claim does not match the configured issuer.
    #[error("invalid issuer")]
    InvalidIssuer,

    /// The `aud` claim does not contain the configured audience.
    #[error("invalid audience")]
    InvalidAudience,

    /// The `sub` claim is not an owner UUID.
    #[error("invalid owner ID format")]
    InvalidOwnerId,

    /// The `tier` claim names no known tier.
    #[error("unknown tier: {0}")]
    InvalidTier(String),

    /// The token is signed with an algorithm the gateway does not accept.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A required claim or header field is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(String),

    /// The JWKS endpoint could not be fetched or parsed.
    #[error("JWKS fetch failed: {0}")]
    JwksFetchFailed(String),

    /// No key with the token's `kid` is published.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The token is not a well-formed JWT.
    #[error("invalid token format: {0}")]
    InvalidToken(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Returns `true` if the caller may succeed by retrying with a fresh token.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::TokenExpired | Self::JwksFetchFailed(_))
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::TokenExpired
            | Self::InvalidSignature
            | Self::InvalidIssuer
            | Self::InvalidAudience
            | Self::InvalidOwnerId
            | Self::InvalidTier(_)
            | Self::UnsupportedAlgorithm(_)
            | Self::MissingClaim(_)
            | Self::KeyNotFound(_)
            | Self::InvalidToken(_) => 401,
            Self::JwksFetchFailed(_) | Self::Internal(_) => 500,
        }
    }
}
