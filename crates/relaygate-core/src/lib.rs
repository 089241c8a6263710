//! Core types and utilities for relaygate.
//!
//! This crate provides the foundational types shared by every relaygate crate:
//!
//! - **Identifiers**: Strongly-typed IDs for owners, tasks, and usage records
//! - **Classes**: Account tiers and request priorities
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use relaygate_core::{OwnerId, Priority, TaskId, Tier};
//!
//! let owner: OwnerId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
//! let task_id = TaskId::generate(&owner);
//!
//! assert_eq!(Tier::default(), Tier::Free);
//! assert_eq!(Priority::default(), Priority::Normal);
//! assert_eq!(task_id.to_hex().len(), 64);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod class;
pub mod error;
pub mod ids;

pub use class::{Priority, Tier};
pub use error::{CoreError, Result};
pub use ids::{IdError, OwnerId, TaskId, UsageId};
