use std::sync::Arc;

use crate::catalog::{IndexInfo, TableInfo};
use crate::common::types::Rid;
use crate::query::executor::{ExecutionError, Executor, ExecutorContext, UpdateFn};
use crate::storage::tuple::Tuple;
use crate::transaction::transaction::{IndexWriteOp, IndexWriteRecord};

/// Rewrites every row the child emits. Holding a shared lock upgrades;
/// otherwise an exclusive lock is taken. Indexes see a delete of the old
/// key and an insert of the new one.
pub struct UpdateExecutor {
    ctx: Arc<ExecutorContext>,
    table_name: String,
    child: Box<dyn Executor>,
    update_fn: UpdateFn,
    table: Option<Arc<TableInfo>>,
    indexes: Vec<Arc<IndexInfo>>,
    done: bool,
}

impl UpdateExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        table_name: impl Into<String>,
        child: Box<dyn Executor>,
        update_fn: UpdateFn,
    ) -> Self {
        Self {
            ctx,
            table_name: table_name.into(),
            child,
            update_fn,
            table: None,
            indexes: Vec::new(),
            done: false,
        }
    }
}

impl Executor for UpdateExecutor {
    fn init(&mut self) -> Result<(), ExecutionError> {
        let table = self
            .ctx
            .catalog
            .get_table_by_name(&self.table_name)
            .ok_or_else(|| ExecutionError::TableNotFound(self.table_name.clone()))?;
        self.indexes = self.ctx.catalog.get_table_indexes(&table.name);
        self.table = Some(table);
        self.done = false;
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>, ExecutionError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let table = self
            .table
            .clone()
            .ok_or(ExecutionError::NotInitialized)?;

        while let Some((_, rid)) = self.child.next()? {
            self.ctx.write_lock(rid)?;

            // Re-read under the exclusive lock; the row may have moved on
            // since the child scanned it.
            let Some(old_tuple) = table.heap.get_tuple(rid)? else {
                continue;
            };
            let new_tuple = (self.update_fn)(&old_tuple);
            table.heap.update_tuple(rid, &new_tuple, &self.ctx.txn)?;

            for index in &self.indexes {
                let old_key = index.key_from_tuple(&old_tuple);
                let new_key = index.key_from_tuple(&new_tuple);
                index.delete_entry(&old_key)?;
                index.insert_entry(new_key.clone(), rid)?;
                self.ctx.txn.append_index_write(IndexWriteRecord {
                    rid,
                    op: IndexWriteOp::Update { old_key, new_key },
                    index: index.clone(),
                });
            }
        }

        Ok(None)
    }
}
