//! Transaction confirmation tracking.
//!
//! Records move `Pending -> Confirming -> Confirmed | Failed`. Terminal
//! states are never left. Reaching `Confirmed` advances the owning task; a
//! task update that fails is retried by every later sweep until it lands.

use crate::clock::Clock;
use crate::ledger::Ledger;
use crate::settlement::balances::TransactionMetadata;
use crate::settlement::storage::{TaskStore, TransactionStore};
use crate::settlement::types::{
    TaskStatus, TransactionFilter, TransactionKind, TransactionRecord, TransactionStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("transaction {0} is already registered")]
    AlreadyRegistered(String),
    #[error("transaction {0} is not tracked")]
    NotFound(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Outcome counts for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub checked: usize,
    pub confirmed: usize,
    pub failed: usize,
    /// Still `Pending` or `Confirming` after the pass
    pub in_flight: usize,
    /// Tasks of already confirmed records advanced by this sweep
    pub tasks_reconciled: usize,
}

impl SweepReport {
    fn tally(&mut self, status: TransactionStatus) {
        match status {
            TransactionStatus::Confirmed => self.confirmed += 1,
            TransactionStatus::Failed => self.failed += 1,
            TransactionStatus::Pending | TransactionStatus::Confirming => self.in_flight += 1,
        }
    }
}

pub struct TransactionTracker {
    ledger: Arc<dyn Ledger>,
    transactions: Arc<dyn TransactionStore>,
    tasks: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    default_required_confirmations: u64,
}

impl TransactionTracker {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        transactions: Arc<dyn TransactionStore>,
        tasks: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            transactions,
            tasks,
            clock,
            default_required_confirmations: 1,
        }
    }

    pub fn with_default_required_confirmations(mut self, confirmations: u64) -> Self {
        self.default_required_confirmations = confirmations;
        self
    }

    /// Registers a submitted transaction. A signature can only be registered once.
    #[instrument(skip_all, fields(signature = %signature, kind = %kind))]
    pub async fn create(
        &self,
        task_ref: &str,
        signature: &str,
        kind: TransactionKind,
        config: serde_json::Value,
        required_confirmations: Option<u64>,
    ) -> Result<TransactionRecord, TrackerError> {
        if self
            .transactions
            .find_one(&TransactionFilter::by_signature(signature))
            .await?
            .is_some()
        {
            warn!("Rejected duplicate registration");
            return Err(TrackerError::AlreadyRegistered(signature.to_string()));
        }

        let record = TransactionRecord::new(
            task_ref,
            signature,
            kind,
            config,
            required_confirmations.unwrap_or(self.default_required_confirmations),
            self.clock.now(),
        );
        let record = self.transactions.save(record).await?;
        info!(task_ref = %task_ref, "Transaction registered");
        Ok(record)
    }

    pub async fn find(&self, signature: &str) -> Result<Option<TransactionRecord>, TrackerError> {
        Ok(self
            .transactions
            .find_one(&TransactionFilter::by_signature(signature))
            .await?)
    }

    /// One monitor pass over the record registered under `signature`.
    pub async fn monitor(&self, signature: &str) -> Result<TransactionRecord, TrackerError> {
        let record = self
            .find(signature)
            .await?
            .ok_or_else(|| TrackerError::NotFound(signature.to_string()))?;
        self.monitor_record(record).await
    }

    /// One monitor pass: claim, look up, persist what the ledger reports.
    ///
    /// Returns the record as stored after the pass. Ledger and transaction
    /// store failures are returned to the caller without touching the status.
    /// Task store failures are logged and retried by [`Self::sweep`].
    #[instrument(skip(self, record), fields(signature = %record.signature))]
    pub async fn monitor_record(&self, mut record: TransactionRecord) -> Result<TransactionRecord, TrackerError> {
        if record.status.is_terminal() {
            self.complete_task(&record).await;
            return Ok(record);
        }

        if record.status == TransactionStatus::Pending {
            let claimed = self
                .transactions
                .transition_status(
                    &record.signature,
                    TransactionStatus::Pending,
                    TransactionStatus::Confirming,
                    self.clock.now(),
                )
                .await?;
            if claimed {
                record.status = TransactionStatus::Confirming;
            } else {
                // Another pass moved it first
                record = self
                    .find(&record.signature)
                    .await?
                    .ok_or_else(|| TrackerError::NotFound(record.signature.clone()))?;
                if record.status.is_terminal() {
                    self.complete_task(&record).await;
                    return Ok(record);
                }
            }
        }

        let detail = match self.ledger.get_transaction(&record.signature).await? {
            Some(detail) => detail,
            None => {
                debug!("Transaction not yet visible on the ledger");
                return Ok(record);
            }
        };

        record.slot = Some(detail.slot);
        record.block_time = detail.block_time;
        record.fee = Some(detail.fee);
        record.metadata = TransactionMetadata::from_detail(&detail);
        record.updated_at = self.clock.now();

        if let Some(err) = &detail.err {
            record.status = TransactionStatus::Failed;
            record.error_message = Some(err.to_string());
            let record = self.transactions.save(record).await?;
            info!(error = ?record.error_message, "Transaction failed on the ledger");
            return Ok(record);
        }

        let current_slot = self.ledger.get_current_slot().await?;
        record.confirmations = current_slot.saturating_sub(detail.slot);

        if record.confirmations < record.required_confirmations {
            debug!(
                confirmations = record.confirmations,
                required = record.required_confirmations,
                "Awaiting confirmation depth"
            );
            return Ok(self.transactions.save(record).await?);
        }

        record.status = TransactionStatus::Confirmed;
        let record = self.transactions.save(record).await?;
        info!(confirmations = record.confirmations, "Transaction confirmed");

        self.complete_task(&record).await;
        Ok(record)
    }

    /// Advances the task of a confirmed record. A store failure is logged and
    /// left for the next sweep, since the record itself is already final.
    async fn complete_task(&self, record: &TransactionRecord) {
        if record.status != TransactionStatus::Confirmed {
            return;
        }
        if let Err(e) = self.advance_task(record).await {
            warn!(task_ref = %record.task_ref, "Task update deferred: {:#}", e);
        }
    }

    /// Moves the owning task forward once its transaction is confirmed.
    ///
    /// Only an `InProgress` task moves, so repeating this is harmless.
    /// Returns whether the task was changed.
    async fn advance_task(&self, record: &TransactionRecord) -> anyhow::Result<bool> {
        let Some(mut task) = self.tasks.find_task(&record.task_ref).await? else {
            debug!(task_ref = %record.task_ref, "Confirmed transaction has no task");
            return Ok(false);
        };
        if task.status != TaskStatus::InProgress {
            debug!(task_ref = %task.task_ref, status = task.status.as_str(), "Task not in progress");
            return Ok(false);
        }

        if task.requires_submission {
            task.status = TaskStatus::AwaitingInput;
        } else {
            task.status = TaskStatus::Completed;
            task.completed_at = Some(self.clock.now());
        }
        let task = self.tasks.save_task(task).await?;
        info!(task_ref = %task.task_ref, status = task.status.as_str(), "Task advanced");
        Ok(true)
    }

    /// Advances tasks still `InProgress` behind a `Confirmed` record.
    async fn reconcile_tasks(&self) -> Result<usize, TrackerError> {
        let confirmed = self
            .transactions
            .find_many(&TransactionFilter::default().with_statuses(vec![TransactionStatus::Confirmed]))
            .await?;

        let mut advanced = 0;
        for record in &confirmed {
            match self.advance_task(record).await {
                Ok(true) => advanced += 1,
                Ok(false) => {}
                Err(e) => warn!(task_ref = %record.task_ref, "Task update deferred: {:#}", e),
            }
        }
        Ok(advanced)
    }

    /// Marks the record failed unless it already reached a terminal state.
    async fn mark_failed(&self, signature: &str, message: String) -> Result<TransactionRecord, TrackerError> {
        let mut record = self
            .find(signature)
            .await?
            .ok_or_else(|| TrackerError::NotFound(signature.to_string()))?;
        if record.status.is_terminal() {
            return Ok(record);
        }
        record.status = TransactionStatus::Failed;
        record.error_message = Some(message);
        record.updated_at = self.clock.now();
        Ok(self.transactions.save(record).await?)
    }

    /// Monitors a record and converts a monitoring error into a `Failed` status.
    async fn settle(&self, record: TransactionRecord) -> Result<TransactionRecord, TrackerError> {
        let signature = record.signature.clone();
        match self.monitor_record(record).await {
            Ok(record) => Ok(record),
            Err(e) => {
                error!("Monitoring {} failed: {}", signature, e);
                self.mark_failed(&signature, e.to_string()).await
            }
        }
    }

    /// Monitors every `Pending` or `Confirming` record once, then retries
    /// task updates that did not land when their record was confirmed.
    ///
    /// A failure on one record marks it `Failed` and the sweep moves on.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport, TrackerError> {
        let records = self.transactions.find_many(&TransactionFilter::in_flight()).await?;
        let mut report = SweepReport {
            checked: records.len(),
            ..SweepReport::default()
        };

        for record in records {
            let signature = record.signature.clone();
            match self.settle(record).await {
                Ok(record) => report.tally(record.status),
                Err(e) => {
                    error!("Could not record outcome for {}: {}", signature, e);
                    report.in_flight += 1;
                }
            }
        }
        report.tasks_reconciled = self.reconcile_tasks().await?;

        if report.checked > 0 || report.tasks_reconciled > 0 {
            info!(
                checked = report.checked,
                confirmed = report.confirmed,
                failed = report.failed,
                in_flight = report.in_flight,
                tasks_reconciled = report.tasks_reconciled,
                "Sweep complete"
            );
        }
        Ok(report)
    }

    /// Ad-hoc check of one signature, identical to a single sweep iteration.
    pub async fn verify(&self, signature: &str) -> Result<TransactionRecord, TrackerError> {
        let record = self
            .find(signature)
            .await?
            .ok_or_else(|| TrackerError::NotFound(signature.to_string()))?;
        self.settle(record).await?;
        self.find(signature)
            .await?
            .ok_or_else(|| TrackerError::NotFound(signature.to_string()))
    }
}
