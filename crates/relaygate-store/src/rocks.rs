//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of [`TaskStore`] and
//! [`UsageSink`]. Values are CBOR-encoded.

use std::path::Path;
use std::sync::Arc;

use relaygate_core::{OwnerId, TaskId};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{Task, TaskStatus, UsageRecord};
use crate::{TaskStore, UsageSink};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Collect every key in `cf_name` that starts with `prefix`.
    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Box<[u8]>>> {
        let handle = self.cf(cf_name)?;
        let mut found = Vec::new();
        let iter = self
            .db
            .iterator_cf(&handle, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            found.push(key);
        }

        Ok(found)
    }
}

impl TaskStore for RocksStore {
    fn put_task(&self, task: &Task) -> Result<()> {
        let cf_tasks = self.cf(cf::TASKS)?;
        let cf_by_owner = self.cf(cf::TASKS_BY_OWNER)?;
        let cf_by_status = self.cf(cf::TASKS_BY_STATUS)?;

        let task_key = keys::task_key(&task.task_id);
        let value = Self::serialize(task)?;

        let old_status = self
            .db
            .get_cf(&cf_tasks, &task_key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize::<Task>(&data))
            .transpose()?
            .map(|t| t.status);

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_tasks, &task_key, &value);
        batch.put_cf(
            &cf_by_owner,
            keys::owner_task_key(&task.owner_id, &task.task_id),
            [],
        );

        if let Some(old) = old_status.filter(|old| *old != task.status) {
            batch.delete_cf(
                &cf_by_status,
                keys::status_task_key(old.as_u8(), &task.task_id),
            );
        }
        batch.put_cf(
            &cf_by_status,
            keys::status_task_key(task.status.as_u8(), &task.task_id),
            [],
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>> {
        let cf = self.cf(cf::TASKS)?;

        self.db
            .get_cf(&cf, keys::task_key(task_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_tasks_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Task>> {
        let prefix = keys::owner_prefix(owner_id);
        let mut tasks = Vec::new();

        for key in self.scan_prefix(cf::TASKS_BY_OWNER, &prefix)? {
            let Some(task_id) = keys::task_id_from_owner_task_key(&key) else {
                tracing::warn!(len = key.len(), "Skipping malformed owner index key");
                continue;
            };
            if let Some(task) = self.get_task(&task_id)? {
                tasks.push(task);
            }
        }

        tasks.sort_by_key(|task| task.created_at);
        Ok(tasks)
    }

    fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();

        for key in self.scan_prefix(cf::TASKS_BY_STATUS, &[status.as_u8()])? {
            let Some(task_id) = keys::task_id_from_status_task_key(&key) else {
                tracing::warn!(len = key.len(), "Skipping malformed status index key");
                continue;
            };
            if let Some(task) = self.get_task(&task_id)? {
                tasks.push(task);
            }
        }

        Ok(tasks)
    }
}

impl UsageSink for RocksStore {
    fn append(&self, record: &UsageRecord) -> Result<()> {
        let cf = self.cf(cf::USAGE)?;
        let key = keys::usage_key(&record.owner_id, record.created_at, &record.usage_id);

        let exists = self
            .db
            .get_pinned_cf(&cf, &key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        if exists {
            return Err(StoreError::AlreadyExists);
        }

        let value = Self::serialize(record)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn list_usage_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<UsageRecord>> {
        let cf = self.cf(cf::USAGE)?;
        let prefix = keys::owner_prefix(owner_id);
        let mut records = Vec::new();

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            records.push(Self::deserialize(&value)?);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskKind;
    use chrono::Utc;
    use relaygate_core::{Priority, UsageId};
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn create_test_task(owner_id: &OwnerId, seed: u64) -> Task {
        let now = Utc::now();
        Task {
            task_id: TaskId::generate_deterministic(owner_id, seed),
            owner_id: *owner_id,
            kind: TaskKind::ContentGeneration,
            priority: Priority::Normal,
            input: serde_json::json!({ "prompt": "write a launch post" }),
            output: None,
            error: None,
            status: TaskStatus::Pending,
            attempts: 0,
            created_at: now,
            updated_at: now,
            deadline_at: now + chrono::Duration::seconds(300),
        }
    }

    fn usage(owner_id: &OwnerId, cost: &str) -> UsageRecord {
        UsageRecord {
            usage_id: UsageId::generate(),
            owner_id: *owner_id,
            kind: TaskKind::SentimentAnalysis,
            task_id: None,
            prompt_tokens: 1000,
            completion_tokens: 500,
            total_tokens: 1500,
            cost: cost.parse::<Decimal>().unwrap(),
            response_time_ms: 420,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn task_put_and_get() {
        let (store, _dir) = create_test_store();
        let owner = OwnerId::generate();
        let task = create_test_task(&owner, 1);

        store.put_task(&task).unwrap();

        let retrieved = store.get_task(&task.task_id).unwrap().unwrap();
        assert_eq!(retrieved.task_id, task.task_id);
        assert_eq!(retrieved.input, task.input);
        assert_eq!(retrieved.status, TaskStatus::Pending);
    }

    #[test]
    fn missing_task_is_none() {
        let (store, _dir) = create_test_store();
        let owner = OwnerId::generate();
        let id = TaskId::generate(&owner);
        assert!(store.get_task(&id).unwrap().is_none());
    }

    #[test]
    fn status_index_follows_updates() {
        let (store, _dir) = create_test_store();
        let owner = OwnerId::generate();
        let mut task = create_test_task(&owner, 1);
        store.put_task(&task).unwrap();

        task.status = TaskStatus::Processing;
        store.put_task(&task).unwrap();

        assert!(store
            .list_tasks_by_status(TaskStatus::Pending)
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .list_tasks_by_status(TaskStatus::Processing)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn list_tasks_by_owner_isolates_owners() {
        let (store, _dir) = create_test_store();
        let alice = OwnerId::generate();
        let bob = OwnerId::generate();

        store.put_task(&create_test_task(&alice, 1)).unwrap();
        store.put_task(&create_test_task(&alice, 2)).unwrap();
        store.put_task(&create_test_task(&bob, 3)).unwrap();

        assert_eq!(store.list_tasks_by_owner(&alice).unwrap().len(), 2);
        assert_eq!(store.list_tasks_by_owner(&bob).unwrap().len(), 1);
    }

    #[test]
    fn usage_is_append_only() {
        let (store, _dir) = create_test_store();
        let owner = OwnerId::generate();
        let record = usage(&owner, "0.004");

        store.append(&record).unwrap();
        assert!(matches!(
            store.append(&record),
            Err(StoreError::AlreadyExists)
        ));

        let listed = store.list_usage_by_owner(&owner).unwrap();
        assert_eq!(listed, vec![record]);
    }

    #[test]
    fn usage_cost_survives_encoding_exactly() {
        let (store, _dir) = create_test_store();
        let owner = OwnerId::generate();
        let record = usage(&owner, "0.0000012345");

        store.append(&record).unwrap();
        let listed = store.list_usage_by_owner(&owner).unwrap();
        assert_eq!(listed[0].cost.to_string(), "0.0000012345");
    }
}
