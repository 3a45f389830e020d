use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use crate::common::types::{Rid, TxnId};
use crate::transaction::deadlock::WaitsForGraph;
use crate::transaction::error::{AbortReason, TransactionError};
use crate::transaction::transaction::{IsolationLevel, Transaction, TransactionState};

/// Requested/held lock strength on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

struct LockRequest {
    txn: Arc<Transaction>,
    mode: LockMode,
    granted: bool,
}

impl LockRequest {
    fn new(txn: Arc<Transaction>, mode: LockMode) -> Self {
        Self {
            txn,
            mode,
            granted: false,
        }
    }
}

#[derive(Default)]
struct LockQueue {
    requests: VecDeque<LockRequest>,
    cv: Arc<Condvar>,
    upgrading: bool,
}

/// Record-level two-phase lock manager.
///
/// One mutex serializes the whole lock table; each record queue carries its
/// own condition variable (all waiting on that one mutex). A background
/// thread rebuilds the waits-for graph on a fixed interval and aborts the
/// youngest transaction of any cycle it finds.
pub struct LockManager {
    table: Mutex<HashMap<Rid, LockQueue>>,
    stop: Arc<AtomicBool>,
    detector: Mutex<Option<JoinHandle<()>>>,
}

impl LockManager {
    pub const DEFAULT_DETECTION_INTERVAL: Duration = Duration::from_millis(50);

    pub fn new(detection_interval: Duration) -> Arc<Self> {
        let manager = Arc::new(Self {
            table: Mutex::new(HashMap::new()),
            stop: Arc::new(AtomicBool::new(false)),
            detector: Mutex::new(None),
        });

        let weak = Arc::downgrade(&manager);
        let stop = manager.stop.clone();
        let handle = std::thread::Builder::new()
            .name("deadlock-detector".to_string())
            .spawn(move || Self::run_cycle_detection(weak, stop, detection_interval))
            .expect("failed to spawn deadlock detector thread");
        *manager.detector.lock() = Some(handle);

        manager
    }

    /// Take a shared lock on `rid` for `txn`, blocking while an exclusive
    /// holder is present. Raises under READ UNCOMMITTED, where shared locks
    /// are forbidden outright.
    pub fn lock_shared(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<(), TransactionError> {
        let mut table = self.table.lock();

        self.check_growing(txn)?;
        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionError::abort(
                txn.id(),
                AbortReason::LockSharedOnReadUncommitted,
            ));
        }
        if txn.is_shared_locked(rid) {
            return Ok(());
        }

        table
            .entry(rid)
            .or_default()
            .requests
            .push_back(LockRequest::new(txn.clone(), LockMode::Shared));

        loop {
            {
                let queue = table.entry(rid).or_default();
                let blocked = queue
                    .requests
                    .iter()
                    .any(|r| r.granted && r.mode == LockMode::Exclusive);
                if !blocked {
                    if let Some(request) = queue
                        .requests
                        .iter_mut()
                        .find(|r| r.txn.id() == txn.id() && !r.granted)
                    {
                        request.granted = true;
                    }
                    txn.add_shared_lock(rid);
                    return Ok(());
                }
            }

            let cv = table.entry(rid).or_default().cv.clone();
            cv.wait(&mut table);

            // The deadlock detector may have aborted us while we slept; it
            // has already removed our pending request.
            self.check_growing(txn)?;
        }
    }

    /// Take an exclusive lock on `rid` for `txn`, blocking while any granted
    /// holder is present. READ UNCOMMITTED writes proceed without queueing.
    pub fn lock_exclusive(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<(), TransactionError> {
        let mut table = self.table.lock();

        self.check_growing(txn)?;
        if txn.is_exclusive_locked(rid)
            || txn.isolation_level() == IsolationLevel::ReadUncommitted
        {
            return Ok(());
        }

        table
            .entry(rid)
            .or_default()
            .requests
            .push_back(LockRequest::new(txn.clone(), LockMode::Exclusive));

        loop {
            {
                let queue = table.entry(rid).or_default();
                let blocked = queue.requests.iter().any(|r| r.granted);
                if !blocked {
                    if let Some(request) = queue
                        .requests
                        .iter_mut()
                        .find(|r| r.txn.id() == txn.id() && !r.granted)
                    {
                        request.granted = true;
                    }
                    txn.add_exclusive_lock(rid);
                    return Ok(());
                }
            }

            let cv = table.entry(rid).or_default().cv.clone();
            cv.wait(&mut table);
            self.check_growing(txn)?;
        }
    }

    /// Upgrade an already-held shared lock to exclusive, blocking until this
    /// transaction is the sole grantee. At most one upgrade may be pending
    /// per record; a second upgrader aborts with `UpgradeConflict`.
    pub fn lock_upgrade(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<(), TransactionError> {
        let mut table = self.table.lock();

        self.check_growing(txn)?;
        if txn.is_exclusive_locked(rid)
            || txn.isolation_level() == IsolationLevel::ReadUncommitted
        {
            return Ok(());
        }

        let mut applied = false;
        loop {
            {
                let queue = table.entry(rid).or_default();
                if queue.upgrading && !applied {
                    txn.set_state(TransactionState::Aborted);
                    return Err(TransactionError::abort(
                        txn.id(),
                        AbortReason::UpgradeConflict,
                    ));
                }
                if !applied {
                    queue.upgrading = true;
                    applied = true;
                }

                let sole_grantee = queue
                    .requests
                    .iter()
                    .all(|r| !r.granted || r.txn.id() == txn.id());
                if sole_grantee {
                    for request in queue.requests.iter_mut() {
                        if request.txn.id() == txn.id() {
                            request.mode = LockMode::Exclusive;
                            break;
                        }
                    }
                    txn.remove_shared_lock(rid);
                    txn.add_exclusive_lock(rid);
                    queue.upgrading = false;
                    return Ok(());
                }
            }

            let cv = table.entry(rid).or_default().cv.clone();
            cv.wait(&mut table);

            if txn.state() != TransactionState::Growing {
                txn.set_state(TransactionState::Aborted);
                let queue = table.entry(rid).or_default();
                queue.upgrading = false;
                return Err(TransactionError::abort(txn.id(), AbortReason::Deadlock));
            }
        }
    }

    /// Release `txn`'s lock on `rid` and wake waiters that may now proceed.
    /// Drives the 2PL state transition for the isolation level.
    pub fn unlock(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let mut table = self.table.lock();
        let Some(queue) = table.get_mut(&rid) else {
            return false;
        };

        let Some(pos) = queue.requests.iter().position(|r| r.txn.id() == txn.id()) else {
            return false;
        };
        let request = queue
            .requests
            .remove(pos)
            .expect("position came from the same queue");

        txn.remove_shared_lock(rid);
        txn.remove_exclusive_lock(rid);

        match txn.isolation_level() {
            IsolationLevel::ReadCommitted => {
                // Early shared release is the point of READ COMMITTED; only
                // an exclusive release starts the shrinking phase.
                if request.mode == LockMode::Exclusive
                    && txn.state() == TransactionState::Growing
                {
                    txn.set_state(TransactionState::Shrinking);
                }
            }
            IsolationLevel::RepeatableRead => {
                if txn.state() == TransactionState::Growing {
                    txn.set_state(TransactionState::Shrinking);
                }
            }
            IsolationLevel::ReadUncommitted => {}
        }

        if request.mode == LockMode::Exclusive {
            queue.cv.notify_all();
        } else {
            // After a shared release, waiters can only make progress when at
            // most one grantee remains (an upgrader, or nobody).
            let granted = queue.requests.iter().filter(|r| r.granted).count();
            if granted <= 1 {
                queue.cv.notify_all();
            }
        }

        true
    }

    /// Waits-for edges currently implied by the lock table, for inspection
    /// in tests.
    pub fn edge_list(&self) -> Vec<(TxnId, TxnId)> {
        let table = self.table.lock();
        let (graph, _) = Self::build_waits_for(&table);
        graph.edge_list()
    }

    fn check_growing(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        if txn.state() != TransactionState::Growing {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionError::abort(txn.id(), AbortReason::Deadlock));
        }
        Ok(())
    }

    fn build_waits_for(
        table: &HashMap<Rid, LockQueue>,
    ) -> (WaitsForGraph, HashMap<TxnId, (Rid, Arc<Transaction>)>) {
        let mut graph = WaitsForGraph::new();
        let mut pending: HashMap<TxnId, (Rid, Arc<Transaction>)> = HashMap::new();

        for (rid, queue) in table.iter() {
            for waiter in queue
                .requests
                .iter()
                .filter(|r| !r.granted && r.txn.state() != TransactionState::Aborted)
            {
                pending.insert(waiter.txn.id(), (*rid, waiter.txn.clone()));
                for holder in queue
                    .requests
                    .iter()
                    .filter(|r| r.granted && r.txn.state() != TransactionState::Aborted)
                {
                    graph.add_edge(waiter.txn.id(), holder.txn.id());
                }
            }
        }

        (graph, pending)
    }

    /// One detector pass: rebuild the graph, abort the victim of the first
    /// cycle found, and wake the queue it was blocked on.
    fn detect_once(&self) {
        let mut table = self.table.lock();
        let (graph, pending) = Self::build_waits_for(&table);
        if graph.is_empty() {
            return;
        }

        let Some(victim_id) = graph.find_cycle_victim() else {
            return;
        };
        let Some((rid, victim)) = pending.get(&victim_id) else {
            return;
        };

        warn!("deadlock detected, aborting youngest transaction {}", victim_id);
        victim.set_state(TransactionState::Aborted);

        if let Some(queue) = table.get_mut(rid) {
            queue.requests.retain(|r| r.txn.id() != victim_id);
            queue.cv.notify_all();
        }
    }

    fn run_cycle_detection(
        manager: Weak<LockManager>,
        stop: Arc<AtomicBool>,
        interval: Duration,
    ) {
        debug!("deadlock detector running every {:?}", interval);
        while !stop.load(Ordering::Relaxed) {
            std::thread::sleep(interval);
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let Some(manager) = manager.upgrade() else {
                break;
            };
            manager.detect_once();
        }
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.detector.lock().take() {
            // The detector may briefly hold the last strong reference, in
            // which case this drop runs on its own thread and must not join
            // itself.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
