//! Condition evaluation for task unlocks.
//!
//! A condition list is combined with a single `AND`/`OR`. Every predicate
//! yields a pass flag plus an explanation. Nothing here returns an error:
//! unknown types, malformed values and backend failures all evaluate to
//! `false` with a message.

pub mod predicate;

pub use predicate::{Condition, ConditionSet, Operator, RawCondition};

use crate::clock::Clock;
use crate::ledger::Ledger;
use crate::settlement::storage::{TaskStore, TransactionStore};
use crate::settlement::types::{TransactionFilter, TransactionKind, TransactionStatus};
use crate::types::Pubkey;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Point balances are owned by the rewards side; the evaluator only reads them.
#[async_trait]
pub trait PointsSource: Send + Sync {
    async fn points(&self, user_id: &str) -> Result<u64>;
}

/// Who the conditions are checked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationSubject {
    pub user_id: String,
    pub wallet: Option<Pubkey>,
}

impl EvaluationSubject {
    pub fn new(user_id: impl Into<String>, wallet: Option<Pubkey>) -> Self {
        Self { user_id: user_id.into(), wallet }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionResult {
    pub kind: String,
    pub passed: bool,
    pub message: String,
}

impl ConditionResult {
    fn new(kind: &str, passed: bool, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            passed,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub passed: bool,
    pub message: String,
    pub results: Vec<ConditionResult>,
}

pub struct ConditionEvaluator {
    tasks: Arc<dyn TaskStore>,
    transactions: Arc<dyn TransactionStore>,
    ledger: Arc<dyn Ledger>,
    points: Arc<dyn PointsSource>,
    clock: Arc<dyn Clock>,
}

impl ConditionEvaluator {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        transactions: Arc<dyn TransactionStore>,
        ledger: Arc<dyn Ledger>,
        points: Arc<dyn PointsSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks,
            transactions,
            ledger,
            points,
            clock,
        }
    }

    /// Evaluates a condition list given as JSON.
    pub async fn evaluate_json(&self, conditions: &serde_json::Value, subject: &EvaluationSubject) -> Evaluation {
        match serde_json::from_value::<ConditionSet>(conditions.clone()) {
            Ok(set) => self.evaluate(&set, subject).await,
            Err(e) => {
                warn!("Rejected malformed condition list: {}", e);
                Evaluation {
                    passed: false,
                    message: format!("Invalid condition list: {}", e),
                    results: Vec::new(),
                }
            }
        }
    }

    /// An empty list passes.
    #[instrument(skip(self, set), fields(user_id = %subject.user_id, operator = ?set.operator))]
    pub async fn evaluate(&self, set: &ConditionSet, subject: &EvaluationSubject) -> Evaluation {
        if set.conditions.is_empty() {
            return Evaluation {
                passed: true,
                message: "No conditions".to_string(),
                results: Vec::new(),
            };
        }

        let mut results = Vec::with_capacity(set.conditions.len());
        for raw in &set.conditions {
            let result = self.check(raw, subject).await;
            debug!(kind = %result.kind, passed = result.passed, "{}", result.message);
            results.push(result);
        }

        let (passed, message) = match set.operator {
            Operator::And => {
                let failures: Vec<&str> = results
                    .iter()
                    .filter(|r| !r.passed)
                    .map(|r| r.message.as_str())
                    .collect();
                if failures.is_empty() {
                    (true, "All conditions met".to_string())
                } else {
                    (false, failures.join("; "))
                }
            }
            Operator::Or => match results.iter().find(|r| r.passed) {
                Some(met) => (true, met.message.clone()),
                None => {
                    let reasons: Vec<&str> = results.iter().map(|r| r.message.as_str()).collect();
                    (false, format!("None of the conditions were met: {}", reasons.join("; ")))
                }
            },
        };

        Evaluation { passed, message, results }
    }

    async fn check(&self, raw: &RawCondition, subject: &EvaluationSubject) -> ConditionResult {
        let condition = match Condition::try_from(raw) {
            Ok(condition) => condition,
            Err(message) => return ConditionResult::new(&raw.kind, false, message),
        };

        match self.check_condition(&condition, subject).await {
            Ok((passed, message)) => ConditionResult::new(&raw.kind, passed, message),
            Err(e) => {
                warn!("Condition {} could not be checked: {}", raw.kind, e);
                ConditionResult::new(&raw.kind, false, format!("Could not check {}: {}", raw.kind, e))
            }
        }
    }

    async fn check_condition(&self, condition: &Condition, subject: &EvaluationSubject) -> Result<(bool, String)> {
        match condition {
            Condition::TasksCompleted { task_refs } => {
                let completed = self.completed_refs(&subject.user_id).await?;
                let missing: Vec<&str> = task_refs
                    .iter()
                    .filter(|task_ref| !completed.contains(*task_ref))
                    .map(String::as_str)
                    .collect();
                if missing.is_empty() {
                    Ok((true, format!("Completed all {} required tasks", task_refs.len())))
                } else {
                    Ok((false, format!("Required tasks not completed: {}", missing.join(", "))))
                }
            }
            Condition::MinPoints { points } => {
                let balance = self.points.points(&subject.user_id).await?;
                Ok(threshold(balance >= *points, "points", balance, *points))
            }
            Condition::MinCompletedTasks { count } => {
                let completed = self.completed_refs(&subject.user_id).await?.len();
                Ok(threshold(completed >= *count, "completed tasks", completed, *count))
            }
            Condition::DateAfter { date } => {
                let now = self.clock.now();
                if now > *date {
                    Ok((true, format!("Available since {}", date.to_rfc3339())))
                } else {
                    Ok((false, format!("Not available before {}", date.to_rfc3339())))
                }
            }
            Condition::DateBefore { date } => {
                let now = self.clock.now();
                if now < *date {
                    Ok((true, format!("Available until {}", date.to_rfc3339())))
                } else {
                    Ok((false, format!("Expired at {}", date.to_rfc3339())))
                }
            }
            Condition::MinWalletBalance { lamports } => {
                let Some(wallet) = subject.wallet else {
                    return Ok((false, "No wallet linked".to_string()));
                };
                let balance = self
                    .ledger
                    .get_account(&wallet)
                    .await?
                    .map_or(0, |account| account.lamports);
                Ok(threshold(balance >= *lamports, "lamports", balance, *lamports))
            }
            Condition::Transaction { kind, min_amount } => {
                let Some(wallet) = subject.wallet else {
                    return Ok((false, "No wallet linked".to_string()));
                };
                self.check_transaction(&subject.user_id, &wallet, *kind, *min_amount).await
            }
        }
    }

    /// Looks for a confirmed transaction of `kind` on one of the user's tasks
    /// that moved at least `min_amount` for the wallet.
    async fn check_transaction(
        &self,
        user_id: &str,
        wallet: &Pubkey,
        kind: TransactionKind,
        min_amount: u64,
    ) -> Result<(bool, String)> {
        let task_refs: HashSet<String> = self
            .tasks
            .find_tasks_by_user(user_id)
            .await?
            .into_iter()
            .map(|task| task.task_ref)
            .collect();

        let filter = TransactionFilter::default()
            .with_kind(kind)
            .with_statuses(vec![TransactionStatus::Confirmed]);
        let wallet = wallet.to_string();

        let best = self
            .transactions
            .find_many(&filter)
            .await?
            .into_iter()
            .filter(|record| task_refs.contains(&record.task_ref))
            .filter_map(|record| record.metadata.amount_for_wallet(&wallet))
            .max();

        match best {
            Some(amount) if amount >= u128::from(min_amount) => {
                Ok((true, format!("Found {} transaction of {}", kind, amount)))
            }
            Some(amount) => Ok((
                false,
                format!("Largest {} transaction is {}, need {}", kind, amount, min_amount),
            )),
            None => Ok((false, format!("No confirmed {} transaction found", kind))),
        }
    }

    async fn completed_refs(&self, user_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .tasks
            .completed_tasks(user_id)
            .await?
            .into_iter()
            .map(|task| task.task_ref)
            .collect())
    }
}

fn threshold<T: std::fmt::Display>(passed: bool, what: &str, actual: T, required: T) -> (bool, String) {
    if passed {
        (true, format!("Has {} {} (need {})", actual, what, required))
    } else {
        (false, format!("Has {} {}, need {}", actual, what, required))
    }
}
