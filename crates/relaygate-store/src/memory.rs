//! In-memory storage implementation.
//!
//! Used by tests and by deployments that do not need tasks to survive a
//! restart.

use std::collections::HashMap;

use parking_lot::RwLock;
use relaygate_core::{OwnerId, TaskId, UsageId};

use crate::error::{Result, StoreError};
use crate::types::{Task, TaskStatus, UsageRecord};
use crate::{TaskStore, UsageSink};

/// In-memory implementation of [`TaskStore`] and [`UsageSink`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
    usage: RwLock<Vec<UsageRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of usage records appended.
    #[must_use]
    pub fn usage_len(&self) -> usize {
        self.usage.read().len()
    }
}

impl TaskStore for MemoryStore {
    fn put_task(&self, task: &Task) -> Result<()> {
        self.tasks.write().insert(task.task_id, task.clone());
        Ok(())
    }

    fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.read().get(task_id).cloned())
    }

    fn list_tasks_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .values()
            .filter(|task| task.owner_id == *owner_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|task| task.created_at);
        Ok(tasks)
    }

    fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .values()
            .filter(|task| task.status == status)
            .cloned()
            .collect())
    }
}

impl UsageSink for MemoryStore {
    fn append(&self, record: &UsageRecord) -> Result<()> {
        let mut usage = self.usage.write();
        let duplicate: Option<&UsageId> = usage
            .iter()
            .map(|existing| &existing.usage_id)
            .find(|id| **id == record.usage_id);
        if duplicate.is_some() {
            return Err(StoreError::AlreadyExists);
        }
        usage.push(record.clone());
        Ok(())
    }

    fn list_usage_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<UsageRecord>> {
        Ok(self
            .usage
            .read()
            .iter()
            .filter(|record| record.owner_id == *owner_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskKind;
    use chrono::Utc;
    use relaygate_core::Priority;
    use rust_decimal::Decimal;

    fn task(owner_id: &OwnerId, seed: u64, minutes_ago: i64) -> Task {
        let at = Utc::now() - chrono::Duration::minutes(minutes_ago);
        Task {
            task_id: TaskId::generate_deterministic(owner_id, seed),
            owner_id: *owner_id,
            kind: TaskKind::Optimization,
            priority: Priority::Low,
            input: serde_json::json!({ "content": "draft" }),
            output: None,
            error: None,
            status: TaskStatus::Processing,
            attempts: 0,
            created_at: at,
            updated_at: at,
            deadline_at: at + chrono::Duration::seconds(600),
        }
    }

    #[test]
    fn owner_listing_is_oldest_first() {
        let store = MemoryStore::new();
        let owner = OwnerId::generate();
        let newer = task(&owner, 1, 1);
        let older = task(&owner, 2, 10);
        store.put_task(&newer).unwrap();
        store.put_task(&older).unwrap();

        let listed = store.list_tasks_by_owner(&owner).unwrap();
        assert_eq!(listed[0].task_id, older.task_id);
        assert_eq!(listed[1].task_id, newer.task_id);
    }

    #[test]
    fn put_replaces_existing_task() {
        let store = MemoryStore::new();
        let owner = OwnerId::generate();
        let mut t = task(&owner, 1, 0);
        store.put_task(&t).unwrap();
        t.status = TaskStatus::Completed;
        store.put_task(&t).unwrap();

        assert!(store
            .list_tasks_by_status(TaskStatus::Processing)
            .unwrap()
            .is_empty());
        assert_eq!(
            store.get_task(&t.task_id).unwrap().unwrap().status,
            TaskStatus::Completed
        );
    }

    #[test]
    fn duplicate_usage_is_rejected() {
        let store = MemoryStore::new();
        let owner = OwnerId::generate();
        let record = UsageRecord {
            usage_id: UsageId::generate(),
            owner_id: owner,
            kind: TaskKind::ContentGeneration,
            task_id: None,
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            cost: Decimal::new(4, 5),
            response_time_ms: 12,
            created_at: Utc::now(),
        };

        store.append(&record).unwrap();
        assert!(matches!(
            store.append(&record),
            Err(StoreError::AlreadyExists)
        ));
        assert_eq!(store.usage_len(), 1);
        assert_eq!(store.list_usage_by_owner(&owner).unwrap().len(), 1);
    }
}
