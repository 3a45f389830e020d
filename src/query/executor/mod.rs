pub mod aggregation;
pub mod delete;
pub mod index_scan;
pub mod insert;
pub mod limit;
pub mod nested_index_join;
pub mod nested_loop_join;
pub mod seq_scan;
pub mod update;

use std::sync::Arc;

use thiserror::Error;

use crate::catalog::{Catalog, CatalogError};
use crate::common::types::Rid;
use crate::index::btree::BTreeError;
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::table::TableError;
use crate::storage::tuple::Tuple;
use crate::transaction::{
    IsolationLevel, LockManager, Transaction, TransactionError, TransactionManager,
};

pub use aggregation::{Aggregate, AggregationExecutor};
pub use delete::DeleteExecutor;
pub use index_scan::IndexScanExecutor;
pub use insert::InsertExecutor;
pub use limit::LimitExecutor;
pub use nested_index_join::NestedIndexJoinExecutor;
pub use nested_loop_join::NestedLoopJoinExecutor;
pub use seq_scan::SeqScanExecutor;
pub use update::UpdateExecutor;

#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Must reach the caller unchanged so the transaction manager can roll
    /// the transaction back.
    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("table error: {0}")]
    Table(#[from] TableError),

    #[error("index error: {0}")]
    Index(#[from] BTreeError),

    #[error("buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),

    #[error("table {0} not found")]
    TableNotFound(String),

    #[error("executor was not initialized")]
    NotInitialized,
}

/// Row filter over one input.
pub type Predicate = Box<dyn Fn(&Tuple) -> bool + Send + Sync>;

/// Row filter over a pair of join inputs.
pub type JoinPredicate = Box<dyn Fn(&Tuple, &Tuple) -> bool + Send + Sync>;

/// Produces the updated image of a row.
pub type UpdateFn = Box<dyn Fn(&Tuple) -> Tuple + Send + Sync>;

/// Volcano iterator contract: `init` once, then `next` until `None`.
pub trait Executor {
    fn init(&mut self) -> Result<(), ExecutionError>;
    fn next(&mut self) -> Result<Option<(Tuple, Rid)>, ExecutionError>;
}

/// Shared services handed to every executor in a pipeline, bound to one
/// transaction. The transaction manager rides along so a caller that owns
/// only the context can still commit or roll the transaction back.
pub struct ExecutorContext {
    pub catalog: Arc<Catalog>,
    pub buffer_pool: Arc<BufferPoolManager>,
    pub lock_manager: Arc<LockManager>,
    pub txn_manager: Arc<TransactionManager>,
    pub txn: Arc<Transaction>,
}

impl ExecutorContext {
    pub fn new(
        catalog: Arc<Catalog>,
        buffer_pool: Arc<BufferPoolManager>,
        lock_manager: Arc<LockManager>,
        txn_manager: Arc<TransactionManager>,
        txn: Arc<Transaction>,
    ) -> Self {
        Self {
            catalog,
            buffer_pool,
            lock_manager,
            txn_manager,
            txn,
        }
    }

    /// Shared-lock `rid` for a read if the isolation level calls for it.
    /// Returns whether this call acquired a fresh lock (and thus whether
    /// `read_unlock` may release it early under READ COMMITTED).
    pub(crate) fn read_lock(&self, rid: Rid) -> Result<bool, TransactionError> {
        if self.txn.isolation_level() == IsolationLevel::ReadUncommitted {
            return Ok(false);
        }
        if self.txn.is_shared_locked(rid) || self.txn.is_exclusive_locked(rid) {
            return Ok(false);
        }
        self.lock_manager.lock_shared(&self.txn, rid)?;
        Ok(true)
    }

    /// Under READ COMMITTED, give back a lock `read_lock` acquired; under
    /// REPEATABLE READ shared locks are held to commit.
    pub(crate) fn read_unlock(&self, rid: Rid, acquired: bool) {
        if acquired && self.txn.isolation_level() == IsolationLevel::ReadCommitted {
            self.lock_manager.unlock(&self.txn, rid);
        }
    }

    /// Exclusive-lock `rid` for a write, upgrading when a shared lock is
    /// already held.
    pub(crate) fn write_lock(&self, rid: Rid) -> Result<(), TransactionError> {
        if self.txn.is_shared_locked(rid) {
            self.lock_manager.lock_upgrade(&self.txn, rid)
        } else if !self.txn.is_exclusive_locked(rid) {
            self.lock_manager.lock_exclusive(&self.txn, rid)
        } else {
            Ok(())
        }
    }
}
