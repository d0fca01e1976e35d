//! Ledger collaborator: the four reads the core needs from the chain.
//!
//! [`RpcLedger`] is the Solana JSON-RPC implementation. Retries, endpoint
//! rotation and request pacing live here so the decoder and the tracker can
//! treat the ledger as a black box.

use crate::config::RpcConfig;
use crate::types::{LedgerTxDetail, Pubkey, RawAccount, TokenBalance};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonempty::NonEmpty;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::signature::Signature;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, EncodedTransaction, UiLoadedAddresses, UiMessage,
    UiTransactionEncoding, UiTransactionTokenBalance,
};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{debug, instrument, warn};

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<RawAccount>>;

    async fn get_program_accounts(&self, program_id: &Pubkey) -> Result<Vec<RawAccount>>;

    /// `Ok(None)` means the signature is not indexed yet.
    async fn get_transaction(&self, signature: &str) -> Result<Option<LedgerTxDetail>>;

    async fn get_current_slot(&self) -> Result<u64>;
}

/// Solana JSON-RPC ledger with retry, endpoint rotation and a request quota.
pub struct RpcLedger {
    clients: NonEmpty<Arc<RpcClient>>,
    next_client: AtomicUsize,
    limiter: DefaultDirectRateLimiter,
    retry_attempts: usize,
    commitment: CommitmentConfig,
}

impl RpcLedger {
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let endpoints = NonEmpty::from_vec(config.endpoints.clone())
            .ok_or_else(|| anyhow!("At least one RPC endpoint is required"))?;
        let commitment = CommitmentConfig::from_str(&config.commitment)
            .map_err(|e| anyhow!("Invalid commitment '{}': {}", config.commitment, e))?;

        let clients = endpoints.map(|endpoint| {
            Arc::new(RpcClient::new_with_timeout_and_commitment(
                endpoint,
                Duration::from_secs(config.timeout_seconds),
                commitment,
            ))
        });

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            clients,
            next_client: AtomicUsize::new(0),
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
            retry_attempts: config.retry_attempts,
            commitment,
        })
    }

    /// Picks the next endpoint round-robin so retries land on a different node.
    fn client(&self) -> Arc<RpcClient> {
        let index = self.next_client.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        self.clients
            .get(index)
            .cloned()
            .unwrap_or_else(|| self.clients.head.clone())
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .max_delay(Duration::from_secs(5))
            .take(self.retry_attempts)
    }

    async fn fetch_transaction(&self, signature: &Signature) -> Result<Option<EncodedConfirmedTransactionWithStatusMeta>> {
        self.limiter.until_ready().await;
        let client = self.client();

        let statuses = client
            .get_signature_statuses(&[*signature])
            .await
            .context("Failed to fetch signature status")?;
        if statuses.value.first().map_or(true, Option::is_none) {
            return Ok(None);
        }

        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };
        self.limiter.until_ready().await;
        let transaction = client
            .get_transaction_with_config(signature, config)
            .await
            .context("Failed to fetch transaction")?;
        Ok(Some(transaction))
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    #[instrument(skip(self), fields(address = %address))]
    async fn get_account(&self, address: &Pubkey) -> Result<Option<RawAccount>> {
        Retry::spawn(self.retry_strategy(), || async {
            self.limiter.until_ready().await;
            let response = self
                .client()
                .get_account_with_commitment(address, self.commitment)
                .await
                .context("Failed to fetch account")?;
            Ok::<_, anyhow::Error>(response
                .value
                .map(|account| RawAccount::new(*address, account.owner, account.lamports, account.data)))
        })
        .await
    }

    #[instrument(skip(self), fields(program_id = %program_id))]
    async fn get_program_accounts(&self, program_id: &Pubkey) -> Result<Vec<RawAccount>> {
        let accounts = Retry::spawn(self.retry_strategy(), || async {
            self.limiter.until_ready().await;
            self.client()
                .get_program_accounts(program_id)
                .await
                .context("Failed to fetch program accounts")
        })
        .await?;

        debug!("Fetched {} accounts owned by {}", accounts.len(), program_id);
        Ok(accounts
            .into_iter()
            .map(|(address, account)| RawAccount::new(address, account.owner, account.lamports, account.data))
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_transaction(&self, signature: &str) -> Result<Option<LedgerTxDetail>> {
        let signature = Signature::from_str(signature)
            .map_err(|e| anyhow!("Invalid transaction signature '{}': {}", signature, e))?;

        let transaction = Retry::spawn(self.retry_strategy(), || self.fetch_transaction(&signature)).await?;
        match transaction {
            Some(transaction) => to_ledger_detail(transaction).map(Some),
            None => {
                debug!("Signature {} not indexed yet", signature);
                Ok(None)
            }
        }
    }

    async fn get_current_slot(&self) -> Result<u64> {
        Retry::spawn(self.retry_strategy(), || async {
            self.limiter.until_ready().await;
            self.client().get_slot().await.context("Failed to fetch current slot")
        })
        .await
    }
}

fn to_ledger_detail(transaction: EncodedConfirmedTransactionWithStatusMeta) -> Result<LedgerTxDetail> {
    let mut account_keys = match &transaction.transaction.transaction {
        EncodedTransaction::Json(ui) => match &ui.message {
            UiMessage::Raw(raw) => raw.account_keys.clone(),
            UiMessage::Parsed(parsed) => parsed.account_keys.iter().map(|key| key.pubkey.clone()).collect(),
        },
        _ => Vec::new(),
    };

    let Some(meta) = transaction.transaction.meta else {
        warn!("Transaction at slot {} has no status meta", transaction.slot);
        return Ok(LedgerTxDetail {
            slot: transaction.slot,
            block_time: transaction.block_time,
            fee: 0,
            err: None,
            account_keys,
            pre_balances: Vec::new(),
            post_balances: Vec::new(),
            pre_token_balances: Vec::new(),
            post_token_balances: Vec::new(),
        });
    };

    let loaded: Option<UiLoadedAddresses> = meta.loaded_addresses.into();
    if let Some(loaded) = loaded {
        account_keys.extend(loaded.writable);
        account_keys.extend(loaded.readonly);
    }

    let err = meta
        .err
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .context("Failed to serialize transaction error")?;

    let token_balances = |balances: Option<Vec<UiTransactionTokenBalance>>| {
        balances
            .unwrap_or_default()
            .into_iter()
            .map(|balance| -> Result<TokenBalance> {
                let amount = balance.ui_token_amount.amount.parse().with_context(|| {
                    format!(
                        "Invalid token amount {:?} at account index {}",
                        balance.ui_token_amount.amount, balance.account_index
                    )
                })?;
                Ok(TokenBalance {
                    account_index: balance.account_index,
                    amount,
                    decimals: balance.ui_token_amount.decimals,
                    owner: balance.owner.into(),
                    mint: balance.mint,
                })
            })
            .collect::<Result<Vec<_>>>()
    };

    Ok(LedgerTxDetail {
        slot: transaction.slot,
        block_time: transaction.block_time,
        fee: meta.fee,
        err,
        account_keys,
        pre_balances: meta.pre_balances,
        post_balances: meta.post_balances,
        pre_token_balances: token_balances(meta.pre_token_balances.into())?,
        post_token_balances: token_balances(meta.post_token_balances.into())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn encoded(meta: Value) -> EncodedConfirmedTransactionWithStatusMeta {
        serde_json::from_value(json!({
            "slot": 250,
            "blockTime": 1_700_000_000,
            "transaction": {
                "signatures": ["5VERYFAKESIG"],
                "message": {
                    "header": {
                        "numRequiredSignatures": 1,
                        "numReadonlySignedAccounts": 0,
                        "numReadonlyUnsignedAccounts": 1
                    },
                    "accountKeys": ["payer", "recipient", "program"],
                    "recentBlockhash": "11111111111111111111111111111111",
                    "instructions": []
                }
            },
            "meta": meta
        }))
        .unwrap()
    }

    fn token_balance(index: u8, amount: &str) -> Value {
        json!({
            "accountIndex": index,
            "mint": "mint-1",
            "owner": "alice",
            "uiTokenAmount": {
                "uiAmount": null,
                "decimals": 6,
                "amount": amount,
                "uiAmountString": amount
            }
        })
    }

    fn meta(err: Value, post_token_amount: &str) -> Value {
        let status = if err.is_null() { json!({ "Ok": null }) } else { json!({ "Err": err.clone() }) };
        json!({
            "err": err,
            "status": status,
            "fee": 5000,
            "preBalances": [10_000, 0, 1, 7, 9],
            "postBalances": [4_000, 1_000, 1, 7, 9],
            "innerInstructions": [],
            "logMessages": [],
            "preTokenBalances": [token_balance(3, "100")],
            "postTokenBalances": [token_balance(3, post_token_amount)],
            "rewards": [],
            "loadedAddresses": { "writable": ["lookup-w"], "readonly": ["lookup-r"] }
        })
    }

    #[test]
    fn test_detail_appends_loaded_addresses() {
        let detail = to_ledger_detail(encoded(meta(Value::Null, "250"))).unwrap();

        assert_eq!(detail.slot, 250);
        assert_eq!(detail.block_time, Some(1_700_000_000));
        assert_eq!(detail.fee, 5000);
        assert!(detail.err.is_none());
        assert_eq!(
            detail.account_keys,
            vec!["payer", "recipient", "program", "lookup-w", "lookup-r"]
        );
        assert_eq!(detail.post_balances[1], 1_000);
        assert_eq!(detail.pre_token_balances[0].amount, 100);
        assert_eq!(detail.post_token_balances[0].amount, 250);
        assert_eq!(detail.post_token_balances[0].owner.as_deref(), Some("alice"));
        assert_eq!(detail.post_token_balances[0].account_index, 3);
    }

    #[test]
    fn test_detail_keeps_execution_error() {
        let err = json!({ "InstructionError": [0, { "Custom": 6001 }] });
        let detail = to_ledger_detail(encoded(meta(err.clone(), "100"))).unwrap();
        assert_eq!(detail.err, Some(err));
    }

    #[test]
    fn test_detail_without_meta() {
        let detail = to_ledger_detail(encoded(Value::Null)).unwrap();
        assert_eq!(detail.fee, 0);
        assert!(detail.err.is_none());
        assert_eq!(detail.account_keys, vec!["payer", "recipient", "program"]);
        assert!(detail.pre_balances.is_empty());
        assert!(detail.post_token_balances.is_empty());
    }

    #[test]
    fn test_unparseable_token_amount_is_an_error() {
        let err = to_ledger_detail(encoded(meta(Value::Null, "12.5"))).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid token amount"));
    }
}
