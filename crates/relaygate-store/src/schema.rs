//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary task records, keyed by `task_id`.
    pub const TASKS: &str = "tasks";

    /// Index: tasks by owner, keyed by `owner_id || task_id`.
    pub const TASKS_BY_OWNER: &str = "tasks_by_owner";

    /// Index: tasks by status, keyed by `status || task_id`.
    pub const TASKS_BY_STATUS: &str = "tasks_by_status";

    /// Usage ledger entries, keyed by `owner_id || created_at_ms || usage_id`.
    pub const USAGE: &str = "usage";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::TASKS, cf::TASKS_BY_OWNER, cf::TASKS_BY_STATUS, cf::USAGE]
}
