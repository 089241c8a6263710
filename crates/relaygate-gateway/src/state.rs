//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use relaygate_auth::JwtValidator;
use relaygate_store::{TaskStore, UsageSink};

use crate::config::GatewayConfig;
use crate::middleware::GatewayMiddleware;

/// Shared application state for the gateway.
pub struct GatewayState<S, V>
where
    S: TaskStore + UsageSink,
    V: JwtValidator,
{
    /// The admission facade.
    pub middleware: Arc<GatewayMiddleware<S, V>>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<S, V> GatewayState<S, V>
where
    S: TaskStore + UsageSink,
    V: JwtValidator,
{
    /// Create a new gateway state.
    #[must_use]
    pub const fn new(middleware: Arc<GatewayMiddleware<S, V>>, config: GatewayConfig) -> Self {
        Self { middleware, config }
    }
}

impl<S, V> Clone for GatewayState<S, V>
where
    S: TaskStore + UsageSink,
    V: JwtValidator,
{
    fn clone(&self) -> Self {
        Self {
            middleware: Arc::clone(&self.middleware),
            config: self.config.clone(),
        }
    }
}
