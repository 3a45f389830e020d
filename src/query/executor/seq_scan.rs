use std::sync::Arc;

use crate::catalog::TableInfo;
use crate::common::types::Rid;
use crate::query::executor::{ExecutionError, Executor, ExecutorContext, Predicate};
use crate::storage::table::TableIterator;
use crate::storage::tuple::Tuple;

/// Full scan over a table heap. Each emitted rid is read under a shared
/// lock at READ COMMITTED and above; READ COMMITTED gives the lock back as
/// soon as the row has been copied out.
pub struct SeqScanExecutor {
    ctx: Arc<ExecutorContext>,
    table_name: String,
    predicate: Option<Predicate>,
    table: Option<Arc<TableInfo>>,
    iter: Option<TableIterator>,
}

impl SeqScanExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, table_name: impl Into<String>, predicate: Option<Predicate>) -> Self {
        Self {
            ctx,
            table_name: table_name.into(),
            predicate,
            table: None,
            iter: None,
        }
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> Result<(), ExecutionError> {
        let table = self
            .ctx
            .catalog
            .get_table_by_name(&self.table_name)
            .ok_or_else(|| ExecutionError::TableNotFound(self.table_name.clone()))?;
        self.iter = Some(table.heap.iter());
        self.table = Some(table);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>, ExecutionError> {
        let iter = self.iter.as_mut().ok_or(ExecutionError::NotInitialized)?;
        let table = self.table.as_ref().ok_or(ExecutionError::NotInitialized)?;

        loop {
            let Some(item) = iter.next() else {
                return Ok(None);
            };
            let (rid, _) = item?;

            // Lock first, then re-read the row under the lock so the copy we
            // hand upward is the locked version.
            let acquired = self.ctx.read_lock(rid)?;
            let Some(tuple) = table.heap.get_tuple(rid)? else {
                // Vanished between the scan step and the lock.
                self.ctx.read_unlock(rid, acquired);
                continue;
            };

            let keep = self.predicate.as_ref().map_or(true, |p| p(&tuple));
            self.ctx.read_unlock(rid, acquired);
            if keep {
                return Ok(Some((tuple, rid)));
            }
        }
    }
}
