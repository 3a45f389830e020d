use std::sync::Arc;

use crate::catalog::{IndexInfo, TableInfo};
use crate::common::types::Rid;
use crate::query::executor::{ExecutionError, Executor, ExecutorContext};
use crate::storage::tuple::Tuple;

/// Index nested loop join: for each outer row, probe the inner table's
/// index with the outer join column and fetch the matching row, if any,
/// under a shared lock.
pub struct NestedIndexJoinExecutor {
    ctx: Arc<ExecutorContext>,
    outer: Box<dyn Executor>,
    outer_key_column: usize,
    index: Arc<IndexInfo>,
    inner_table: Option<Arc<TableInfo>>,
}

impl NestedIndexJoinExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        outer: Box<dyn Executor>,
        outer_key_column: usize,
        index: Arc<IndexInfo>,
    ) -> Self {
        Self {
            ctx,
            outer,
            outer_key_column,
            index,
            inner_table: None,
        }
    }
}

impl Executor for NestedIndexJoinExecutor {
    fn init(&mut self) -> Result<(), ExecutionError> {
        let table = self
            .ctx
            .catalog
            .get_table_by_name(&self.index.table_name)
            .ok_or_else(|| ExecutionError::TableNotFound(self.index.table_name.clone()))?;
        self.inner_table = Some(table);
        self.outer.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>, ExecutionError> {
        let inner_table = self
            .inner_table
            .clone()
            .ok_or(ExecutionError::NotInitialized)?;

        loop {
            let Some((outer_tuple, outer_rid)) = self.outer.next()? else {
                return Ok(None);
            };

            let outer_acquired = self.ctx.read_lock(outer_rid)?;
            let key = outer_tuple.value(self.outer_key_column).clone();

            let joined = match self.index.scan_key(&key)? {
                Some(inner_rid) => {
                    let inner_acquired = self.ctx.read_lock(inner_rid)?;
                    let inner_tuple = inner_table.heap.get_tuple(inner_rid)?;
                    self.ctx.read_unlock(inner_rid, inner_acquired);
                    inner_tuple.map(|inner| {
                        let mut values = outer_tuple.values.clone();
                        values.extend(inner.values);
                        Tuple::new(values)
                    })
                }
                None => None,
            };
            self.ctx.read_unlock(outer_rid, outer_acquired);

            if let Some(tuple) = joined {
                return Ok(Some((tuple, outer_rid)));
            }
        }
    }
}
