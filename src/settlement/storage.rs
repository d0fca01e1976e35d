//! Persistence contracts for tracked transactions and user tasks.
//!
//! The tracker only talks to these traits. [`MemoryStore`] backs tests and
//! single-process use; `SqliteStore` is the durable implementation.

use crate::settlement::types::{TaskStatus, TransactionFilter, TransactionRecord, TransactionStatus, UserTask};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Repository for transaction records, keyed by signature.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn find_one(&self, filter: &TransactionFilter) -> Result<Option<TransactionRecord>>;

    /// Inserts or replaces the record with the same signature and returns the
    /// stored form (with `id` assigned).
    ///
    /// A stored record in a terminal status is never replaced. The write is
    /// dropped and the stored record is returned instead.
    async fn save(&self, record: TransactionRecord) -> Result<TransactionRecord>;

    /// Matching records ordered by insertion.
    async fn find_many(&self, filter: &TransactionFilter) -> Result<Vec<TransactionRecord>>;

    /// Moves `signature` from `expected` to `next` only if it is still in
    /// `expected`. Returns whether this call performed the transition.
    async fn transition_status(
        &self,
        signature: &str,
        expected: TransactionStatus,
        next: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Repository for user task progress, keyed by task reference.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn find_task(&self, task_ref: &str) -> Result<Option<UserTask>>;

    async fn save_task(&self, task: UserTask) -> Result<UserTask>;

    async fn find_tasks_by_user(&self, user_id: &str) -> Result<Vec<UserTask>>;

    async fn completed_tasks(&self, user_id: &str) -> Result<Vec<UserTask>> {
        Ok(self
            .find_tasks_by_user(user_id)
            .await?
            .into_iter()
            .filter(|task| task.status == TaskStatus::Completed)
            .collect())
    }
}

#[derive(Default)]
struct MemoryState {
    transactions: Vec<TransactionRecord>,
    next_id: i64,
    tasks: HashMap<String, UserTask>,
}

/// In-process store guarded by a single async mutex.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn find_one(&self, filter: &TransactionFilter) -> Result<Option<TransactionRecord>> {
        let state = self.state.lock().await;
        Ok(state.transactions.iter().find(|r| filter.matches(r)).cloned())
    }

    async fn save(&self, mut record: TransactionRecord) -> Result<TransactionRecord> {
        let mut state = self.state.lock().await;
        match state.transactions.iter().position(|r| r.signature == record.signature) {
            Some(index) if state.transactions[index].status.is_terminal() => {
                return Ok(state.transactions[index].clone());
            }
            Some(index) => {
                record.id = state.transactions[index].id;
                state.transactions[index] = record.clone();
            }
            None => {
                state.next_id += 1;
                record.id = Some(state.next_id);
                state.transactions.push(record.clone());
            }
        }
        Ok(record)
    }

    async fn find_many(&self, filter: &TransactionFilter) -> Result<Vec<TransactionRecord>> {
        let state = self.state.lock().await;
        Ok(state.transactions.iter().filter(|r| filter.matches(r)).cloned().collect())
    }

    async fn transition_status(
        &self,
        signature: &str,
        expected: TransactionStatus,
        next: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state
            .transactions
            .iter_mut()
            .find(|r| r.signature == signature && r.status == expected)
        {
            Some(record) => {
                record.status = next;
                record.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn find_task(&self, task_ref: &str) -> Result<Option<UserTask>> {
        Ok(self.state.lock().await.tasks.get(task_ref).cloned())
    }

    async fn save_task(&self, task: UserTask) -> Result<UserTask> {
        self.state
            .lock()
            .await
            .tasks
            .insert(task.task_ref.clone(), task.clone());
        Ok(task)
    }

    async fn find_tasks_by_user(&self, user_id: &str) -> Result<Vec<UserTask>> {
        let state = self.state.lock().await;
        let mut tasks: Vec<UserTask> = state
            .tasks
            .values()
            .filter(|task| task.user_id == user_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.task_ref.cmp(&b.task_ref));
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::types::TransactionKind;

    fn record(signature: &str) -> TransactionRecord {
        TransactionRecord::new("task-1", signature, TransactionKind::Transfer, serde_json::json!({}), 1, Utc::now())
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_upserts() {
        let store = MemoryStore::new();

        let first = store.save(record("SIG1")).await.unwrap();
        assert_eq!(first.id, Some(1));

        let mut updated = first.clone();
        updated.confirmations = 4;
        let saved = store.save(updated).await.unwrap();
        assert_eq!(saved.id, Some(1));

        let all = store.find_many(&TransactionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].confirmations, 4);
    }

    #[tokio::test]
    async fn test_save_never_replaces_terminal_record() {
        let store = MemoryStore::new();
        let mut confirmed = record("SIG1");
        confirmed.status = TransactionStatus::Confirmed;
        confirmed.confirmations = 3;
        store.save(confirmed.clone()).await.unwrap();

        let mut stale = record("SIG1");
        stale.status = TransactionStatus::Confirming;
        stale.confirmations = 1;
        let returned = store.save(stale).await.unwrap();
        assert_eq!(returned.status, TransactionStatus::Confirmed);
        assert_eq!(returned.confirmations, 3);

        let stored = store.find_one(&TransactionFilter::by_signature("SIG1")).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Confirmed);
        assert_eq!(stored.id, Some(1));
    }

    #[tokio::test]
    async fn test_transition_status_is_compare_and_set() {
        let store = MemoryStore::new();
        store.save(record("SIG1")).await.unwrap();

        let now = Utc::now();
        assert!(store
            .transition_status("SIG1", TransactionStatus::Pending, TransactionStatus::Confirming, now)
            .await
            .unwrap());
        assert!(!store
            .transition_status("SIG1", TransactionStatus::Pending, TransactionStatus::Confirming, now)
            .await
            .unwrap());
        assert!(!store
            .transition_status("SIG2", TransactionStatus::Pending, TransactionStatus::Confirming, now)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_completed_tasks_filters_by_status() {
        let store = MemoryStore::new();
        store.save_task(UserTask::in_progress("t1", "alice", false)).await.unwrap();
        let mut done = UserTask::in_progress("t2", "alice", false);
        done.status = TaskStatus::Completed;
        store.save_task(done).await.unwrap();
        store.save_task(UserTask::in_progress("t3", "bob", false)).await.unwrap();

        let completed = store.completed_tasks("alice").await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].task_ref, "t2");
        assert_eq!(store.find_tasks_by_user("alice").await.unwrap().len(), 2);
    }
}
