use std::sync::Arc;

use crate::catalog::{IndexInfo, TableInfo};
use crate::common::types::Rid;
use crate::query::executor::{ExecutionError, Executor, ExecutorContext};
use crate::storage::tuple::Tuple;
use crate::transaction::transaction::{IndexWriteOp, IndexWriteRecord};

/// Tombstones every row the child emits, upgrading or taking exclusive
/// locks as for update. Index entries are removed immediately and recorded
/// so an abort can put them back.
pub struct DeleteExecutor {
    ctx: Arc<ExecutorContext>,
    table_name: String,
    child: Box<dyn Executor>,
    table: Option<Arc<TableInfo>>,
    indexes: Vec<Arc<IndexInfo>>,
    done: bool,
}

impl DeleteExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        table_name: impl Into<String>,
        child: Box<dyn Executor>,
    ) -> Self {
        Self {
            ctx,
            table_name: table_name.into(),
            child,
            table: None,
            indexes: Vec::new(),
            done: false,
        }
    }
}

impl Executor for DeleteExecutor {
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

            let Some(old_tuple) = table.heap.get_tuple(rid)? else {
                continue;
            };
            table.heap.mark_delete(rid, &self.ctx.txn)?;

            for index in &self.indexes {
                let key = index.key_from_tuple(&old_tuple);
                index.delete_entry(&key)?;
                self.ctx.txn.append_index_write(IndexWriteRecord {
                    rid,
                    op: IndexWriteOp::Delete { key },
                    index: index.clone(),
                });
            }
        }

        Ok(None)
    }
}
