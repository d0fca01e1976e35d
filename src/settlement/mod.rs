//! Settlement: tracking submitted transactions to a final status and
//! advancing the tasks they settle.

pub mod types;
pub mod balances;
pub mod storage;
pub mod sqlite_store;
pub mod tracker;

pub use balances::{BalanceChange, TokenBalanceChange, TransactionMetadata};
pub use sqlite_store::SqliteStore;
pub use storage::{MemoryStore, TaskStore, TransactionStore};
pub use tracker::{SweepReport, TrackerError, TransactionTracker};
pub use types::{TaskStatus, TransactionFilter, TransactionKind, TransactionRecord, TransactionStatus, UserTask};
