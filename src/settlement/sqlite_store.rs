//! SQLite implementation of the transaction and task stores.

use crate::settlement::balances::TransactionMetadata;
use crate::settlement::storage::{TaskStore, TransactionStore};
use crate::settlement::types::{TransactionFilter, TransactionRecord, TransactionStatus, UserTask};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, Pool, QueryBuilder, Sqlite};
use std::sync::Arc;
use tracing::{debug, info};

/// Helper type for deserializing transaction rows
#[derive(FromRow)]
struct TransactionRow {
    id: i64,
    signature: String,
    task_ref: String,
    kind: String,
    status: String,
    required_confirmations: i64,
    confirmations: i64,
    slot: Option<i64>,
    block_time: Option<i64>,
    fee: Option<i64>,
    config: String,   // JSON
    metadata: String, // JSON
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = anyhow::Error;

    fn try_from(row: TransactionRow) -> Result<Self> {
        let metadata: TransactionMetadata = serde_json::from_str(&row.metadata)
            .with_context(|| format!("Corrupt metadata for {}", row.signature))?;
        Ok(TransactionRecord {
            id: Some(row.id),
            kind: row.kind.parse()?,
            status: row.status.parse()?,
            required_confirmations: row.required_confirmations as u64,
            confirmations: row.confirmations as u64,
            slot: row.slot.map(|s| s as u64),
            block_time: row.block_time,
            fee: row.fee.map(|f| f as u64),
            config: serde_json::from_str(&row.config)?,
            metadata,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
            signature: row.signature,
            task_ref: row.task_ref,
        })
    }
}

#[derive(FromRow)]
struct TaskRow {
    task_ref: String,
    user_id: String,
    status: String,
    requires_submission: bool,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for UserTask {
    type Error = anyhow::Error;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(UserTask {
            task_ref: row.task_ref,
            user_id: row.user_id,
            status: row.status.parse()?,
            requires_submission: row.requires_submission,
            completed_at: row.completed_at,
        })
    }
}

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Connects to `database_url` and creates the schema if missing.
    ///
    /// In-memory databases get a single long-lived connection so every query
    /// sees the same database.
    pub async fn connect(database_url: &str) -> Result<Arc<Self>> {
        let mut options = SqlitePoolOptions::new().max_connections(5);
        if database_url.contains(":memory:") {
            options = options.max_connections(1).idle_timeout(None).max_lifetime(None);
        }
        let pool = options
            .connect(database_url)
            .await
            .context("Failed to connect to SQLite database")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                signature TEXT NOT NULL UNIQUE,
                task_ref TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                required_confirmations INTEGER NOT NULL,
                confirmations INTEGER NOT NULL,
                slot INTEGER,
                block_time INTEGER,
                fee INTEGER,
                config TEXT NOT NULL,
                metadata TEXT NOT NULL,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await
        .context("Failed to create transactions table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status);")
            .execute(&pool)
            .await
            .context("Failed to create status index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_tasks (
                task_ref TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                requires_submission BOOLEAN NOT NULL,
                completed_at TEXT
            );
            "#,
        )
        .execute(&pool)
        .await
        .context("Failed to create user_tasks table")?;

        info!("SqliteStore initialized and connected to {}", database_url);
        Ok(Arc::new(Self { pool }))
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    fn filtered_select(filter: &TransactionFilter) -> QueryBuilder<'_, Sqlite> {
        let mut query = QueryBuilder::new("SELECT * FROM transactions WHERE 1 = 1");
        if let Some(signature) = &filter.signature {
            query.push(" AND signature = ").push_bind(signature.as_str());
        }
        if let Some(task_ref) = &filter.task_ref {
            query.push(" AND task_ref = ").push_bind(task_ref.as_str());
        }
        if let Some(kind) = filter.kind {
            query.push(" AND kind = ").push_bind(kind.as_str());
        }
        if !filter.statuses.is_empty() {
            query.push(" AND status IN (");
            let mut separated = query.separated(", ");
            for status in &filter.statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }
        query.push(" ORDER BY id ASC");
        query
    }
}

#[async_trait]
impl TransactionStore for SqliteStore {
    async fn find_one(&self, filter: &TransactionFilter) -> Result<Option<TransactionRecord>> {
        let mut query = Self::filtered_select(filter);
        query.push(" LIMIT 1");
        let row: Option<TransactionRow> = query
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch transaction")?;
        row.map(TransactionRecord::try_from).transpose()
    }

    async fn save(&self, mut record: TransactionRecord) -> Result<TransactionRecord> {
        debug!("Saving transaction {} as {}", record.signature, record.status);

        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO transactions (
                signature, task_ref, kind, status, required_confirmations, confirmations,
                slot, block_time, fee, config, metadata, error_message, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(signature) DO UPDATE SET
                task_ref = excluded.task_ref,
                kind = excluded.kind,
                status = excluded.status,
                required_confirmations = excluded.required_confirmations,
                confirmations = excluded.confirmations,
                slot = excluded.slot,
                block_time = excluded.block_time,
                fee = excluded.fee,
                config = excluded.config,
                metadata = excluded.metadata,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            WHERE transactions.status NOT IN ('Confirmed', 'Failed')
            RETURNING id;
            "#,
        )
        .bind(&record.signature)
        .bind(&record.task_ref)
        .bind(record.kind.as_str())
        .bind(record.status.as_str())
        .bind(record.required_confirmations as i64)
        .bind(record.confirmations as i64)
        .bind(record.slot.map(|s| s as i64))
        .bind(record.block_time)
        .bind(record.fee.map(|f| f as i64))
        .bind(serde_json::to_string(&record.config)?)
        .bind(serde_json::to_string(&record.metadata)?)
        .bind(&record.error_message)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_optional(&self.pool)
        .await
        .context(format!("Failed to save transaction {}", record.signature))?;

        match id {
            Some(id) => {
                record.id = Some(id);
                Ok(record)
            }
            None => {
                // The stored row is terminal and was left untouched
                debug!("Kept terminal transaction {}", record.signature);
                self.find_one(&TransactionFilter::by_signature(&record.signature))
                    .await?
                    .with_context(|| format!("Transaction {} vanished during save", record.signature))
            }
        }
    }

    async fn find_many(&self, filter: &TransactionFilter) -> Result<Vec<TransactionRecord>> {
        let rows: Vec<TransactionRow> = Self::filtered_select(filter)
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch transactions")?;
        rows.into_iter().map(TransactionRecord::try_from).collect()
    }

    async fn transition_status(
        &self,
        signature: &str,
        expected: TransactionStatus,
        next: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE transactions SET status = ?, updated_at = ? WHERE signature = ? AND status = ?;")
            .bind(next.as_str())
            .bind(at)
            .bind(signature)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await
            .context(format!("Failed to transition status for {}", signature))?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn find_task(&self, task_ref: &str) -> Result<Option<UserTask>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM user_tasks WHERE task_ref = ?")
            .bind(task_ref)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch task")?;
        row.map(UserTask::try_from).transpose()
    }

    async fn save_task(&self, task: UserTask) -> Result<UserTask> {
        sqlx::query(
            r#"
            INSERT INTO user_tasks (task_ref, user_id, status, requires_submission, completed_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(task_ref) DO UPDATE SET
                user_id = excluded.user_id,
                status = excluded.status,
                requires_submission = excluded.requires_submission,
                completed_at = excluded.completed_at;
            "#,
        )
        .bind(&task.task_ref)
        .bind(&task.user_id)
        .bind(task.status.as_str())
        .bind(task.requires_submission)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await
        .context(format!("Failed to save task {}", task.task_ref))?;

        Ok(task)
    }

    async fn find_tasks_by_user(&self, user_id: &str) -> Result<Vec<UserTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM user_tasks WHERE user_id = ? ORDER BY task_ref ASC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch tasks for user")?;
        rows.into_iter().map(UserTask::try_from).collect()
    }
}
