use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::common::types::TxnId;
use crate::transaction::error::TransactionError;
use crate::transaction::lock_manager::LockManager;
use crate::transaction::transaction::{
    IndexWriteOp, IsolationLevel, TableWriteOp, Transaction, TransactionState,
};

/// Creates and finishes transactions.
///
/// Commit makes tombstoned deletes permanent and releases locks. Abort
/// replays both write sets in reverse, then releases locks. Either way the
/// transaction leaves the active table.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    lock_manager: Arc<LockManager>,
    active: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self {
            next_txn_id: AtomicU32::new(1),
            lock_manager,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.active.lock().insert(txn_id, txn.clone());
        debug!("begin txn {} at {:?}", txn_id, isolation_level);
        txn
    }

    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.active.lock().get(&txn_id).cloned()
    }

    /// Commit: apply pending deletes, drop the write sets, then release
    /// every held lock.
    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        if matches!(
            txn.state(),
            TransactionState::Committed | TransactionState::Aborted
        ) {
            return Err(TransactionError::NotActive(txn.id()));
        }

        let table_writes = txn.take_table_write_set();
        for record in &table_writes {
            if let TableWriteOp::Delete { .. } = record.op {
                record.heap.apply_delete(record.rid)?;
            }
        }
        txn.take_index_write_set();

        txn.set_state(TransactionState::Committed);
        self.release_locks(txn);
        self.active.lock().remove(&txn.id());
        debug!("committed txn {}", txn.id());
        Ok(())
    }

    /// Abort: undo table writes newest-first, then index writes, then
    /// release every held lock.
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        if txn.state() == TransactionState::Committed {
            return Err(TransactionError::NotActive(txn.id()));
        }

        let table_writes = txn.take_table_write_set();
        for record in table_writes.iter().rev() {
            match &record.op {
                TableWriteOp::Insert => {
                    record.heap.apply_delete(record.rid)?;
                }
                TableWriteOp::Update { old } => {
                    record.heap.restore_tuple(record.rid, old)?;
                }
                TableWriteOp::Delete { .. } => {
                    record.heap.rollback_delete(record.rid)?;
                }
            }
        }

        let index_writes = txn.take_index_write_set();
        for record in index_writes.iter().rev() {
            match &record.op {
                IndexWriteOp::Insert { key } => {
                    record.index.delete_entry(key)?;
                }
                IndexWriteOp::Delete { key } => {
                    record.index.insert_entry(key.clone(), record.rid)?;
                }
                IndexWriteOp::Update { old_key, new_key } => {
                    record.index.delete_entry(new_key)?;
                    record.index.insert_entry(old_key.clone(), record.rid)?;
                }
            }
        }

        txn.set_state(TransactionState::Aborted);
        self.release_locks(txn);
        self.active.lock().remove(&txn.id());
        debug!("aborted txn {}", txn.id());
        Ok(())
    }

    fn release_locks(&self, txn: &Arc<Transaction>) {
        for rid in txn.held_locks() {
            self.lock_manager.unlock(txn, rid);
        }
    }
}
