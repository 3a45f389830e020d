use std::sync::Arc;

use crate::common::types::Rid;
use crate::query::executor::{ExecutionError, Executor, ExecutorContext, JoinPredicate};
use crate::storage::tuple::Tuple;
use crate::transaction::IsolationLevel;

/// Classic nested loop join: the right side is materialized once at init,
/// then each left row is compared against it. Both sides' rids are read
/// under shared locks; READ COMMITTED releases the left row's lock as soon
/// as the inner loop for it finishes.
pub struct NestedLoopJoinExecutor {
    ctx: Arc<ExecutorContext>,
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    predicate: JoinPredicate,
    right_tuples: Vec<Tuple>,
    right_pos: usize,
    left_current: Option<(Tuple, Rid, bool)>,
}

impl NestedLoopJoinExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        predicate: JoinPredicate,
    ) -> Self {
        Self {
            ctx,
            left,
            right,
            predicate,
            right_tuples: Vec::new(),
            right_pos: 0,
            left_current: None,
        }
    }

    fn advance_left(&mut self) -> Result<bool, ExecutionError> {
        if let Some((_, rid, acquired)) = self.left_current.take() {
            self.ctx.read_unlock(rid, acquired);
        }

        match self.left.next()? {
            Some((tuple, rid)) => {
                let acquired = self.ctx.read_lock(rid)?;
                self.left_current = Some((tuple, rid, acquired));
                self.right_pos = 0;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Executor for NestedLoopJoinExecutor {
    fn init(&mut self) -> Result<(), ExecutionError> {
        self.left.init()?;
        self.right.init()?;

        // Materialize the right side. The copies are private to this join,
        // so READ COMMITTED can give the locks back immediately.
        self.right_tuples.clear();
        while let Some((tuple, rid)) = self.right.next()? {
            let acquired = self.ctx.read_lock(rid)?;
            self.ctx.read_unlock(rid, acquired);
            self.right_tuples.push(tuple);
        }

        self.right_pos = 0;
        self.left_current = None;
        self.advance_left()?;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>, ExecutionError> {
        loop {
            let Some((left_tuple, left_rid, _)) = &self.left_current else {
                return Ok(None);
            };
            let left_tuple = left_tuple.clone();
            let left_rid = *left_rid;

            while self.right_pos < self.right_tuples.len() {
                let right_tuple = &self.right_tuples[self.right_pos];
                self.right_pos += 1;

                if (self.predicate)(&left_tuple, right_tuple) {
                    let mut values = left_tuple.values.clone();
                    values.extend(right_tuple.values.iter().cloned());
                    return Ok(Some((Tuple::new(values), left_rid)));
                }
            }

            if !self.advance_left()? {
                return Ok(None);
            }
        }
    }
}

impl Drop for NestedLoopJoinExecutor {
    fn drop(&mut self) {
        // A left-side lock may still be held if the consumer stopped early.
        if let Some((_, rid, acquired)) = self.left_current.take() {
            if acquired && self.ctx.txn.isolation_level() == IsolationLevel::ReadCommitted {
                self.ctx.lock_manager.unlock(&self.ctx.txn, rid);
            }
        }
    }
}
