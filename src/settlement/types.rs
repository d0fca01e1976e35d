//! Records owned by the settlement tracker and the task state it drives.

use crate::settlement::balances::TransactionMetadata;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Transfer,
    Mint,
    Swap,
    Stake,
    Unstake,
    AddLiquidity,
    RemoveLiquidity,
    Custom,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Transfer => "transfer",
            TransactionKind::Mint => "mint",
            TransactionKind::Swap => "swap",
            TransactionKind::Stake => "stake",
            TransactionKind::Unstake => "unstake",
            TransactionKind::AddLiquidity => "add_liquidity",
            TransactionKind::RemoveLiquidity => "remove_liquidity",
            TransactionKind::Custom => "custom",
        }
    }

    pub fn all() -> [TransactionKind; 8] {
        [
            TransactionKind::Transfer,
            TransactionKind::Mint,
            TransactionKind::Swap,
            TransactionKind::Stake,
            TransactionKind::Unstake,
            TransactionKind::AddLiquidity,
            TransactionKind::RemoveLiquidity,
            TransactionKind::Custom,
        ]
    }
}

impl FromStr for TransactionKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        TransactionKind::all()
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| anyhow!("Unknown transaction kind: {}", value))
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a tracked transaction. `Confirmed` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Confirming,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "Pending",
            TransactionStatus::Confirming => "Confirming",
            TransactionStatus::Confirmed => "Confirmed",
            TransactionStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Confirmed | TransactionStatus::Failed)
    }
}

impl FromStr for TransactionStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "Pending" => Ok(TransactionStatus::Pending),
            "Confirming" => Ok(TransactionStatus::Confirming),
            "Confirmed" => Ok(TransactionStatus::Confirmed),
            "Failed" => Ok(TransactionStatus::Failed),
            other => Err(anyhow!("Unknown transaction status: {}", other)),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted transaction and everything learned about it so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Database record ID (set by the store)
    pub id: Option<i64>,
    pub signature: String,
    /// Task this transaction settles
    pub task_ref: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub required_confirmations: u64,
    /// Slots elapsed since inclusion at the last lookup
    pub confirmations: u64,
    pub slot: Option<u64>,
    pub block_time: Option<i64>,
    pub fee: Option<u64>,
    /// Free-form configuration supplied at submission
    pub config: serde_json::Value,
    /// Balance deltas extracted from the ledger
    pub metadata: TransactionMetadata,
    /// Set only when `status` is `Failed`
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(
        task_ref: impl Into<String>,
        signature: impl Into<String>,
        kind: TransactionKind,
        config: serde_json::Value,
        required_confirmations: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            signature: signature.into(),
            task_ref: task_ref.into(),
            kind,
            status: TransactionStatus::Pending,
            required_confirmations,
            confirmations: 0,
            slot: None,
            block_time: None,
            fee: None,
            config,
            metadata: TransactionMetadata::default(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filter for store lookups. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub signature: Option<String>,
    pub task_ref: Option<String>,
    pub kind: Option<TransactionKind>,
    /// Empty matches any status
    pub statuses: Vec<TransactionStatus>,
}

impl TransactionFilter {
    pub fn by_signature(signature: impl Into<String>) -> Self {
        Self {
            signature: Some(signature.into()),
            ..Self::default()
        }
    }

    pub fn in_flight() -> Self {
        Self {
            statuses: vec![TransactionStatus::Pending, TransactionStatus::Confirming],
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_task_ref(mut self, task_ref: impl Into<String>) -> Self {
        self.task_ref = Some(task_ref.into());
        self
    }

    pub fn with_statuses(mut self, statuses: Vec<TransactionStatus>) -> Self {
        self.statuses = statuses;
        self
    }

    pub fn matches(&self, record: &TransactionRecord) -> bool {
        self.signature.as_ref().map_or(true, |s| s == &record.signature)
            && self.task_ref.as_ref().map_or(true, |t| t == &record.task_ref)
            && self.kind.map_or(true, |k| k == record.kind)
            && (self.statuses.is_empty() || self.statuses.contains(&record.status))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    /// Waiting for a manual text or proof submission
    AwaitingInput,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "NotStarted",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::AwaitingInput => "AwaitingInput",
            TaskStatus::Completed => "Completed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "NotStarted" => Ok(TaskStatus::NotStarted),
            "InProgress" => Ok(TaskStatus::InProgress),
            "AwaitingInput" => Ok(TaskStatus::AwaitingInput),
            "Completed" => Ok(TaskStatus::Completed),
            other => Err(anyhow!("Unknown task status: {}", other)),
        }
    }
}

/// A user's progress on one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTask {
    pub task_ref: String,
    pub user_id: String,
    pub status: TaskStatus,
    /// Whether completion also needs a manual submission
    pub requires_submission: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UserTask {
    pub fn in_progress(task_ref: impl Into<String>, user_id: impl Into<String>, requires_submission: bool) -> Self {
        Self {
            task_ref: task_ref.into(),
            user_id: user_id.into(),
            status: TaskStatus::InProgress,
            requires_submission,
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Confirming,
            TransactionStatus::Confirmed,
            TransactionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TransactionStatus>().unwrap(), status);
        }
        assert!("Done".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("add_liquidity".parse::<TransactionKind>().unwrap(), TransactionKind::AddLiquidity);
        assert!("airdrop".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_filter_matching() {
        let record = TransactionRecord::new("task-1", "SIG1", TransactionKind::Swap, serde_json::json!({}), 1, Utc::now());

        assert!(TransactionFilter::default().matches(&record));
        assert!(TransactionFilter::in_flight().matches(&record));
        assert!(TransactionFilter::by_signature("SIG1").with_kind(TransactionKind::Swap).matches(&record));
        assert!(!TransactionFilter::by_signature("SIG2").matches(&record));
        assert!(!TransactionFilter::default().with_task_ref("task-2").matches(&record));
        assert!(!TransactionFilter::default()
            .with_statuses(vec![TransactionStatus::Confirmed])
            .matches(&record));
    }
}
