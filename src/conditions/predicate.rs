//! Condition lists as submitted by task authors, and their typed form.

use crate::settlement::types::TransactionKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// One entry of a condition list, kept as submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCondition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl RawCondition {
    pub fn new(kind: impl Into<String>, value: serde_json::Value) -> Self {
        Self { kind: kind.into(), value }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionSet {
    #[serde(default)]
    pub operator: Operator,
    #[serde(default)]
    pub conditions: Vec<RawCondition>,
}

impl ConditionSet {
    pub fn all(conditions: Vec<RawCondition>) -> Self {
        Self { operator: Operator::And, conditions }
    }

    pub fn any(conditions: Vec<RawCondition>) -> Self {
        Self { operator: Operator::Or, conditions }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Condition {
    TasksCompleted { task_refs: Vec<String> },
    MinPoints { points: u64 },
    MinCompletedTasks { count: usize },
    DateAfter { date: DateTime<Utc> },
    DateBefore { date: DateTime<Utc> },
    MinWalletBalance { lamports: u64 },
    Transaction { kind: TransactionKind, min_amount: u64 },
}

pub const KNOWN_TYPES: [&str; 7] = [
    "tasks_completed",
    "min_points",
    "min_completed_tasks",
    "date_after",
    "date_before",
    "min_wallet_balance",
    "transaction",
];

impl TryFrom<&RawCondition> for Condition {
    type Error = String;

    fn try_from(raw: &RawCondition) -> Result<Self, String> {
        if !KNOWN_TYPES.contains(&raw.kind.as_str()) {
            return Err(format!("Unknown condition type: {}", raw.kind));
        }
        let tagged = serde_json::json!({ "type": raw.kind, "value": raw.value });
        serde_json::from_value(tagged).map_err(|e| format!("Invalid value for {}: {}", raw.kind, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_parses_from_json() {
        let set: ConditionSet = serde_json::from_value(json!({
            "operator": "OR",
            "conditions": [
                { "type": "min_points", "value": { "points": 100 } },
                { "type": "transaction", "value": { "kind": "swap", "min_amount": 5000 } }
            ]
        }))
        .unwrap();

        assert_eq!(set.operator, Operator::Or);
        assert_eq!(
            Condition::try_from(&set.conditions[1]).unwrap(),
            Condition::Transaction { kind: TransactionKind::Swap, min_amount: 5000 }
        );
    }

    #[test]
    fn test_operator_defaults_to_and() {
        let set: ConditionSet = serde_json::from_value(json!({ "conditions": [] })).unwrap();
        assert_eq!(set.operator, Operator::And);
    }

    #[test]
    fn test_dates_parse_rfc3339() {
        let raw = RawCondition::new("date_after", json!({ "date": "2024-01-01T00:00:00Z" }));
        match Condition::try_from(&raw).unwrap() {
            Condition::DateAfter { date } => assert_eq!(date.timestamp(), 1_704_067_200),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_and_malformed() {
        let unknown = Condition::try_from(&RawCondition::new("twitter_follow", json!({}))).unwrap_err();
        assert!(unknown.contains("Unknown condition type"));

        let malformed = Condition::try_from(&RawCondition::new("min_points", json!({ "points": "many" }))).unwrap_err();
        assert!(malformed.contains("Invalid value for min_points"));
    }
}
