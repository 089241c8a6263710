//! HTTP gateway for the relaygate AI request service.
//!
//! This crate provides the public-facing API for submitting AI tasks and
//! polling their results. It handles:
//!
//! - Bearer token authentication
//! - Payload validation, quota, circuit, and rate-limit admission
//! - Task submission and polling
//! - Usage reporting and request metrics
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients (HTTP)                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    relaygate-gateway                        │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │   Bearer    │ │   Router    │ │  GatewayMiddleware  │    │
//! │  │  Extractor  │ │  + Handlers │ │  (admission chain)  │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │ Control  │   │  Auth    │   │ Provider │
//!        │          │   │ (JWT)    │   │  (HTTP)  │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use relaygate_auth::JwksValidator;
//! use relaygate_control::{CircuitBreaker, HttpProviderAdapter};
//! use relaygate_gateway::{create_router, GatewayConfig, GatewayMiddleware, GatewayState};
//! use relaygate_store::{MemoryCounterStore, RocksStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::load()?;
//! let store = Arc::new(RocksStore::open(&config.data_dir)?);
//! let provider = Arc::new(HttpProviderAdapter::new(config.provider.clone())?);
//! let validator = Arc::new(JwksValidator::new(config.auth.clone())?);
//!
//! let middleware = Arc::new(GatewayMiddleware::new(
//!     store,
//!     Arc::new(MemoryCounterStore::new()),
//!     provider,
//!     Arc::new(CircuitBreaker::new(config.control.circuit)),
//!     validator,
//!     &config.control,
//!     config.slow_request_threshold(),
//! ));
//! let app = create_router(GatewayState::new(middleware, config.clone()));
//!
//! let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::{ConfigError, GatewayConfig};
pub use error::ApiError;
pub use metrics::{EndpointSnapshot, GatewayMetrics};
pub use middleware::{Admitted, GatewayMiddleware, GenerationRequest, UsageReport};
pub use routes::create_router;
pub use state::GatewayState;

// Re-export key types for convenience
pub use auth::{AuthPrincipal, BearerToken};
