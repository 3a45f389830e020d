use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::catalog::IndexInfo;
use crate::common::types::{Rid, TxnId};
use crate::storage::table::TableHeap;
use crate::storage::tuple::{Tuple, Value};

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Two-phase locking states. GROWING transactions may acquire locks; the
/// first release (policy depends on isolation) moves them to SHRINKING.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionState {
    Growing = 0,
    Shrinking = 1,
    Committed = 2,
    Aborted = 3,
}

impl TransactionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TransactionState::Growing,
            1 => TransactionState::Shrinking,
            2 => TransactionState::Committed,
            _ => TransactionState::Aborted,
        }
    }
}

/// One table-heap mutation, with the prior image needed to reverse it.
pub struct TableWriteRecord {
    pub rid: Rid,
    pub op: TableWriteOp,
    pub heap: Arc<TableHeap>,
}

pub enum TableWriteOp {
    Insert,
    Update { old: Tuple },
    Delete { old: Tuple },
}

/// One index mutation mirroring a table write.
pub struct IndexWriteRecord {
    pub rid: Rid,
    pub op: IndexWriteOp,
    pub index: Arc<IndexInfo>,
}

pub enum IndexWriteOp {
    Insert { key: Value },
    Delete { key: Value },
    Update { old_key: Value, new_key: Value },
}

/// An active database transaction.
///
/// The state is atomic because the deadlock detector flips it to ABORTED
/// from its own thread; the lock sets are mutated by the lock manager under
/// its table mutex; the write sets are appended by the heap/executors and
/// drained by the transaction manager at commit/abort.
pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: AtomicU8,
    shared_lock_set: Mutex<HashSet<Rid>>,
    exclusive_lock_set: Mutex<HashSet<Rid>>,
    table_write_set: Mutex<Vec<TableWriteRecord>>,
    index_write_set: Mutex<Vec<IndexWriteRecord>>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: AtomicU8::new(TransactionState::Growing as u8),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
            table_write_set: Mutex::new(Vec::new()),
            index_write_set: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        TransactionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: TransactionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn is_shared_locked(&self, rid: Rid) -> bool {
        self.shared_lock_set.lock().contains(&rid)
    }

    pub fn is_exclusive_locked(&self, rid: Rid) -> bool {
        self.exclusive_lock_set.lock().contains(&rid)
    }

    pub(crate) fn add_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().insert(rid);
    }

    pub(crate) fn add_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().insert(rid);
    }

    pub(crate) fn remove_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().remove(&rid);
    }

    pub(crate) fn remove_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().remove(&rid);
    }

    /// Every rid this transaction currently holds a lock on.
    pub fn held_locks(&self) -> Vec<Rid> {
        let mut rids: Vec<Rid> = self.shared_lock_set.lock().iter().copied().collect();
        rids.extend(self.exclusive_lock_set.lock().iter().copied());
        rids
    }

    pub fn shared_lock_count(&self) -> usize {
        self.shared_lock_set.lock().len()
    }

    pub fn exclusive_lock_count(&self) -> usize {
        self.exclusive_lock_set.lock().len()
    }

    pub fn append_table_write(&self, record: TableWriteRecord) {
        self.table_write_set.lock().push(record);
    }

    pub fn append_index_write(&self, record: IndexWriteRecord) {
        self.index_write_set.lock().push(record);
    }

    pub(crate) fn take_table_write_set(&self) -> Vec<TableWriteRecord> {
        std::mem::take(&mut *self.table_write_set.lock())
    }

    pub(crate) fn take_index_write_set(&self) -> Vec<IndexWriteRecord> {
        std::mem::take(&mut *self.index_write_set.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction_is_growing() {
        let txn = Transaction::new(1, IsolationLevel::RepeatableRead);
        assert_eq!(txn.id(), 1);
        assert_eq!(txn.state(), TransactionState::Growing);
        assert_eq!(txn.isolation_level(), IsolationLevel::RepeatableRead);
    }

    #[test]
    fn test_state_transitions() {
        let txn = Transaction::new(2, IsolationLevel::ReadCommitted);
        txn.set_state(TransactionState::Shrinking);
        assert_eq!(txn.state(), TransactionState::Shrinking);
        txn.set_state(TransactionState::Aborted);
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn test_lock_sets() {
        let txn = Transaction::new(3, IsolationLevel::RepeatableRead);
        let rid = Rid::new(1, 4);
        txn.add_shared_lock(rid);
        assert!(txn.is_shared_locked(rid));
        assert!(!txn.is_exclusive_locked(rid));

        txn.remove_shared_lock(rid);
        txn.add_exclusive_lock(rid);
        assert!(!txn.is_shared_locked(rid));
        assert!(txn.is_exclusive_locked(rid));
        assert_eq!(txn.held_locks(), vec![rid]);
    }
}
