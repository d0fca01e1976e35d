//! Balance deltas derived from a confirmed transaction's pre/post lists.

use crate::types::{LedgerTxDetail, TokenBalance};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub account: String,
    pub pre: u64,
    pub post: u64,
    pub delta: i128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalanceChange {
    pub account_index: u8,
    /// Token account address, when the index resolves against the account keys
    pub account: Option<String>,
    pub mint: String,
    pub owner: Option<String>,
    pub decimals: u8,
    pub pre: u128,
    pub post: u128,
    pub delta: i128,
}

/// Derived metadata persisted on every successful ledger lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub balance_changes: Vec<BalanceChange>,
    pub token_balance_changes: Vec<TokenBalanceChange>,
}

impl TransactionMetadata {
    pub fn from_detail(detail: &LedgerTxDetail) -> Self {
        Self {
            balance_changes: lamport_changes(detail),
            token_balance_changes: token_changes(detail),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.balance_changes.is_empty() && self.token_balance_changes.is_empty()
    }

    /// Absolute amount moved for `wallet`.
    ///
    /// Token positions owned by the wallet win over its lamport balance. With
    /// several positions the largest movement is reported.
    pub fn amount_for_wallet(&self, wallet: &str) -> Option<u128> {
        let token_amount = self
            .token_balance_changes
            .iter()
            .filter(|change| change.owner.as_deref() == Some(wallet))
            .map(|change| change.delta.unsigned_abs())
            .max();

        token_amount.or_else(|| {
            self.balance_changes
                .iter()
                .find(|change| change.account == wallet)
                .map(|change| change.delta.unsigned_abs())
        })
    }
}

/// Per-account lamport deltas. Unchanged accounts are omitted.
fn lamport_changes(detail: &LedgerTxDetail) -> Vec<BalanceChange> {
    detail
        .account_keys
        .iter()
        .zip(detail.pre_balances.iter().zip(detail.post_balances.iter()))
        .filter(|(_, (pre, post))| pre != post)
        .map(|(account, (&pre, &post))| BalanceChange {
            account: account.clone(),
            pre,
            post,
            delta: i128::from(post) - i128::from(pre),
        })
        .collect()
}

/// Token deltas matched by account index. A side missing from either list
/// counts as a zero balance.
fn token_changes(detail: &LedgerTxDetail) -> Vec<TokenBalanceChange> {
    let mut paired: BTreeMap<u8, (Option<&TokenBalance>, Option<&TokenBalance>)> = BTreeMap::new();
    for balance in &detail.pre_token_balances {
        paired.entry(balance.account_index).or_default().0 = Some(balance);
    }
    for balance in &detail.post_token_balances {
        paired.entry(balance.account_index).or_default().1 = Some(balance);
    }

    paired
        .into_iter()
        .filter_map(|(account_index, (pre, post))| {
            let reference = post.or(pre)?;
            let pre_amount = pre.map_or(0, |b| b.amount);
            let post_amount = post.map_or(0, |b| b.amount);
            if pre_amount == post_amount {
                return None;
            }
            Some(TokenBalanceChange {
                account_index,
                account: detail.account_keys.get(account_index as usize).cloned(),
                mint: reference.mint.clone(),
                owner: reference.owner.clone(),
                decimals: reference.decimals,
                pre: pre_amount,
                post: post_amount,
                delta: signed_delta(pre_amount, post_amount),
            })
        })
        .collect()
}

fn signed_delta(pre: u128, post: u128) -> i128 {
    if post >= pre {
        i128::try_from(post - pre).unwrap_or(i128::MAX)
    } else {
        i128::try_from(pre - post).map_or(i128::MIN, |d| -d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(index: u8, owner: &str, amount: u128) -> TokenBalance {
        TokenBalance {
            account_index: index,
            mint: "MintA".to_string(),
            owner: Some(owner.to_string()),
            amount,
            decimals: 6,
        }
    }

    fn detail() -> LedgerTxDetail {
        LedgerTxDetail {
            slot: 100,
            block_time: Some(1_700_000_000),
            fee: 5000,
            err: None,
            account_keys: vec!["payer".into(), "dest".into(), "ata-payer".into(), "ata-dest".into()],
            pre_balances: vec![10_000_000, 0, 2_039_280, 2_039_280],
            post_balances: vec![8_995_000, 1_000_000, 2_039_280, 2_039_280],
            pre_token_balances: vec![token(2, "payer", 500)],
            post_token_balances: vec![token(2, "payer", 200), token(3, "dest", 300)],
        }
    }

    #[test]
    fn test_lamport_changes_skip_untouched_accounts() {
        let metadata = TransactionMetadata::from_detail(&detail());

        assert_eq!(metadata.balance_changes.len(), 2);
        assert_eq!(metadata.balance_changes[0].account, "payer");
        assert_eq!(metadata.balance_changes[0].delta, -1_005_000);
        assert_eq!(metadata.balance_changes[1].delta, 1_000_000);
    }

    #[test]
    fn test_token_changes_pair_by_index() {
        let metadata = TransactionMetadata::from_detail(&detail());

        let changes = &metadata.token_balance_changes;
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].account_index, 2);
        assert_eq!(changes[0].delta, -300);
        assert_eq!(changes[0].account.as_deref(), Some("ata-payer"));
        // No pre entry: opened during the transaction
        assert_eq!(changes[1].pre, 0);
        assert_eq!(changes[1].delta, 300);
    }

    #[test]
    fn test_amount_for_wallet_prefers_tokens() {
        let metadata = TransactionMetadata::from_detail(&detail());

        assert_eq!(metadata.amount_for_wallet("payer"), Some(300));
        assert_eq!(metadata.amount_for_wallet("dest"), Some(300));
        assert_eq!(metadata.amount_for_wallet("nobody"), None);

        let lamports_only = TransactionMetadata {
            token_balance_changes: Vec::new(),
            ..metadata
        };
        assert_eq!(lamports_only.amount_for_wallet("payer"), Some(1_005_000));
    }

    #[test]
    fn test_empty_detail() {
        let metadata = TransactionMetadata::from_detail(&LedgerTxDetail::default());
        assert!(metadata.is_empty());
    }
}
