use std::sync::Arc;

use crate::catalog::{IndexInfo, TableInfo};
use crate::common::types::Rid;
use crate::index::btree::BTreeIterator;
use crate::query::executor::{ExecutionError, Executor, ExecutorContext, Predicate};
use crate::storage::tuple::{Tuple, Value};

/// Key-ordered scan through a B+ tree index, fetching rows from the heap.
/// `start_key`/`end_key` bound the scan inclusively.
pub struct IndexScanExecutor {
    ctx: Arc<ExecutorContext>,
    index: Arc<IndexInfo>,
    start_key: Option<Value>,
    end_key: Option<Value>,
    predicate: Option<Predicate>,
    table: Option<Arc<TableInfo>>,
    iter: Option<BTreeIterator<Value>>,
}

impl IndexScanExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        index: Arc<IndexInfo>,
        start_key: Option<Value>,
        end_key: Option<Value>,
        predicate: Option<Predicate>,
    ) -> Self {
        Self {
            ctx,
            index,
            start_key,
            end_key,
            predicate,
            table: None,
            iter: None,
        }
    }
}

impl Executor for IndexScanExecutor {
    fn init(&mut self) -> Result<(), ExecutionError> {
        let table = self
            .ctx
            .catalog
            .get_table_by_name(&self.index.table_name)
            .ok_or_else(|| ExecutionError::TableNotFound(self.index.table_name.clone()))?;
        self.table = Some(table);

        self.iter = Some(match &self.start_key {
            Some(key) => self.index.iter_from(key)?,
            None => self.index.iter()?,
        });
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>, ExecutionError> {
        let table = self.table.as_ref().ok_or(ExecutionError::NotInitialized)?;

        loop {
            let Some(iter) = self.iter.as_mut() else {
                return Ok(None);
            };
            let Some(item) = iter.next() else {
                self.iter = None;
                return Ok(None);
            };
            let (key, rid) = item?;

            if let Some(end) = &self.end_key {
                if &key > end {
                    // Past the bound; drop the iterator to release its leaf.
                    self.iter = None;
                    return Ok(None);
                }
            }

            let acquired = self.ctx.read_lock(rid)?;
            let Some(tuple) = table.heap.get_tuple(rid)? else {
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
