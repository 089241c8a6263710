//! Key encoding utilities for `RocksDB`.
//!
//! All composite keys put the scan dimension first so listing is a prefix scan.

use chrono::{DateTime, Utc};
use relaygate_core::{OwnerId, TaskId, UsageId};

/// Length of an encoded owner prefix.
pub const OWNER_LEN: usize = 16;

/// Length of an encoded task ID.
pub const TASK_LEN: usize = 32;

/// Encode a task key (just the task ID bytes).
#[must_use]
pub fn task_key(task_id: &TaskId) -> Vec<u8> {
    task_id.as_bytes().to_vec()
}

/// Encode an owner prefix for scanning tasks or usage by owner.
#[must_use]
pub fn owner_prefix(owner_id: &OwnerId) -> Vec<u8> {
    owner_id.as_bytes().to_vec()
}

/// Encode an owner-task index key: `owner_id || task_id`.
#[must_use]
pub fn owner_task_key(owner_id: &OwnerId, task_id: &TaskId) -> Vec<u8> {
    let mut key = Vec::with_capacity(OWNER_LEN + TASK_LEN);
    key.extend_from_slice(owner_id.as_bytes());
    key.extend_from_slice(task_id.as_bytes());
    key
}

/// Extract the task ID from an owner-task key.
///
/// Returns `None` when the key is too short.
#[must_use]
pub fn task_id_from_owner_task_key(key: &[u8]) -> Option<TaskId> {
    let bytes: [u8; TASK_LEN] = key.get(OWNER_LEN..OWNER_LEN + TASK_LEN)?.try_into().ok()?;
    Some(TaskId::from_bytes(bytes))
}

/// Encode a status-task index key: `status || task_id`.
#[must_use]
pub fn status_task_key(status: u8, task_id: &TaskId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + TASK_LEN);
    key.push(status);
    key.extend_from_slice(task_id.as_bytes());
    key
}

/// Extract the task ID from a status-task key.
#[must_use]
pub fn task_id_from_status_task_key(key: &[u8]) -> Option<TaskId> {
    let bytes: [u8; TASK_LEN] = key.get(1..=TASK_LEN)?.try_into().ok()?;
    Some(TaskId::from_bytes(bytes))
}

/// Encode a usage key: `owner_id || created_at_ms (big endian) || usage_id`.
///
/// Big-endian millis keep an owner's ledger in chronological order.
#[must_use]
pub fn usage_key(owner_id: &OwnerId, created_at: DateTime<Utc>, usage_id: &UsageId) -> Vec<u8> {
    let millis = u64::try_from(created_at.timestamp_millis()).unwrap_or_default();
    let mut key = Vec::with_capacity(OWNER_LEN + 8 + 16);
    key.extend_from_slice(owner_id.as_bytes());
    key.extend_from_slice(&millis.to_be_bytes());
    key.extend_from_slice(usage_id.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_task_key_extracts_task() {
        let owner = OwnerId::generate();
        let task_id = TaskId::generate(&owner);

        let key = owner_task_key(&owner, &task_id);
        assert_eq!(key.len(), 48);
        assert!(key.starts_with(&owner_prefix(&owner)));
        assert_eq!(task_id_from_owner_task_key(&key), Some(task_id));
        assert_eq!(task_id_from_owner_task_key(&key[..20]), None);
    }

    #[test]
    fn status_key_extracts_task() {
        let owner = OwnerId::generate();
        let task_id = TaskId::generate(&owner);
        let key = status_task_key(2, &task_id);
        assert_eq!(key[0], 2);
        assert_eq!(task_id_from_status_task_key(&key), Some(task_id));
    }

    #[test]
    fn usage_keys_sort_chronologically() {
        let owner = OwnerId::generate();
        let earlier = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let later = DateTime::from_timestamp(1_700_000_100, 0).unwrap();

        let a = usage_key(&owner, earlier, &UsageId::generate());
        let b = usage_key(&owner, later, &UsageId::generate());
        assert!(a < b);
    }
}
