use thiserror::Error;

use crate::common::types::TxnId;
use crate::index::btree::BTreeError;
use crate::storage::table::TableError;

/// Why a transaction was aborted by the concurrency layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Chosen as a deadlock victim, or tried to lock after being aborted.
    Deadlock,
    /// Shared locks are meaningless under READ UNCOMMITTED.
    LockSharedOnReadUncommitted,
    /// Another transaction is already upgrading on the same record.
    UpgradeConflict,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            AbortReason::Deadlock => "deadlock",
            AbortReason::LockSharedOnReadUncommitted => "shared lock on READ UNCOMMITTED",
            AbortReason::UpgradeConflict => "upgrade conflict",
        };
        write!(f, "{}", reason)
    }
}

#[derive(Error, Debug)]
pub enum TransactionError {
    /// The transaction must roll back. Executors propagate this unchanged so
    /// the transaction manager can undo the write sets.
    #[error("transaction {txn_id} aborted: {reason}")]
    Abort { txn_id: TxnId, reason: AbortReason },

    #[error("transaction {0} is not active")]
    NotActive(TxnId),

    #[error("rollback failed on table heap: {0}")]
    TableRollback(#[from] TableError),

    #[error("rollback failed on index: {0}")]
    IndexRollback(#[from] BTreeError),
}

impl TransactionError {
    pub fn abort(txn_id: TxnId, reason: AbortReason) -> Self {
        Self::Abort { txn_id, reason }
    }
}
