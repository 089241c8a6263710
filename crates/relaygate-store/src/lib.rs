//! Storage layer for relaygate.
//!
//! This crate defines the three storage collaborators the gateway depends on
//! and ships implementations for each:
//!
//! - [`TaskStore`]: task records owned by the orchestrator
//! - [`UsageSink`]: the append-only usage ledger
//! - [`CounterStore`]: TTL counters backing quota windows
//!
//! `RocksStore` persists tasks and usage using column families for indexing.
//! `MemoryStore` and `MemoryCounterStore` keep everything in process.
//!
//! # Example
//!
//! ```no_run
//! use relaygate_store::{RocksStore, TaskStore};
//! use relaygate_core::OwnerId;
//!
//! let store = RocksStore::open("/tmp/relaygate-db").unwrap();
//!
//! let owner = OwnerId::generate();
//! let tasks = store.list_tasks_by_owner(&owner).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod counter;
pub mod error;
pub mod keys;
pub mod memory;
pub mod rocks;
pub mod schema;
pub mod types;

pub use counter::{CounterStore, MemoryCounterStore, QuotaCounter};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use rocks::RocksStore;
pub use types::{ErrorCode, Task, TaskError, TaskKind, TaskStatus, UsageRecord};

use relaygate_core::{OwnerId, TaskId};

/// Persistence for task records.
pub trait TaskStore: Send + Sync {
    /// Insert or update a task record.
    ///
    /// This also maintains the owner and status indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_task(&self, task: &Task) -> Result<()>;

    /// Get a task by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>>;

    /// List all tasks submitted by an owner, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_tasks_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Task>>;

    /// List all tasks currently in the given status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>>;
}

/// Durable, append-only destination for usage records.
pub trait UsageSink: Send + Sync {
    /// Append a record. Records are never updated or deleted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if a record with the same key was
    /// already appended, or a database error.
    fn append(&self, record: &UsageRecord) -> Result<()>;

    /// List an owner's usage records in chronological order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_usage_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<UsageRecord>>;
}
