//! Bearer token extraction and the authenticated principal.
//!
//! Handlers pull the raw token with [`BearerToken`] and hand it to the
//! middleware, which validates it as the first admission stage.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use relaygate_auth::ValidatedClaims;
use relaygate_core::{OwnerId, Tier};

use crate::error::ApiError;

/// The caller behind a validated token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPrincipal {
    /// Owner charged for the request.
    pub owner_id: OwnerId,
    /// Tier whose quotas apply.
    pub tier: Tier,
}

impl AuthPrincipal {
    /// Create a principal from validated claims.
    #[must_use]
    pub const fn from_claims(claims: &ValidatedClaims) -> Self {
        Self {
            owner_id: claims.owner_id,
            tier: claims.tier,
        }
    }
}

/// The token from an `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        _state: &'life1 S,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let header = parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

            let token = header
                .strip_prefix("Bearer ")
                .filter(|token| !token.is_empty())
                .ok_or_else(|| ApiError::Unauthorized("malformed authorization header".to_string()))?;

            Ok(Self(token.to_string()))
        })
    }
}
