use std::sync::Arc;

use crate::catalog::{IndexInfo, TableInfo};
use crate::common::types::Rid;
use crate::query::executor::{ExecutionError, Executor, ExecutorContext};
use crate::storage::tuple::Tuple;
use crate::transaction::transaction::{IndexWriteOp, IndexWriteRecord};

/// Inserts rows from a literal list or a child executor. Every new rid is
/// exclusive-locked, and every index over the table gets a mirrored entry
/// recorded in the transaction's index write set.
///
/// Emits no tuples; the single `next` call does all the work.
pub struct InsertExecutor {
    ctx: Arc<ExecutorContext>,
    table_name: String,
    rows: Vec<Tuple>,
    child: Option<Box<dyn Executor>>,
    table: Option<Arc<TableInfo>>,
    indexes: Vec<Arc<IndexInfo>>,
    done: bool,
}

impl InsertExecutor {
    /// Insert literal rows.
    pub fn from_values(
        ctx: Arc<ExecutorContext>,
        table_name: impl Into<String>,
        rows: Vec<Tuple>,
    ) -> Self {
        Self {
            ctx,
            table_name: table_name.into(),
            rows,
            child: None,
            table: None,
            indexes: Vec::new(),
            done: false,
        }
    }

    /// Insert every row a child executor produces.
    pub fn from_child(
        ctx: Arc<ExecutorContext>,
        table_name: impl Into<String>,
        child: Box<dyn Executor>,
    ) -> Self {
        Self {
            ctx,
            table_name: table_name.into(),
            rows: Vec::new(),
            child: Some(child),
            table: None,
            indexes: Vec::new(),
            done: false,
        }
    }

    fn insert_row(&self, table: &Arc<TableInfo>, tuple: &Tuple) -> Result<(), ExecutionError> {
        let rid = table.heap.insert_tuple(tuple, &self.ctx.txn)?;
        self.ctx.lock_manager.lock_exclusive(&self.ctx.txn, rid)?;

        for index in &self.indexes {
            let key = index.key_from_tuple(tuple);
            if index.insert_entry(key.clone(), rid)? {
                self.ctx.txn.append_index_write(IndexWriteRecord {
                    rid,
                    op: IndexWriteOp::Insert { key },
                    index: index.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> Result<(), ExecutionError> {
        let table = self
            .ctx
            .catalog
            .get_table_by_name(&self.table_name)
            .ok_or_else(|| ExecutionError::TableNotFound(self.table_name.clone()))?;
        self.indexes = self.ctx.catalog.get_table_indexes(&table.name);
        self.table = Some(table);
        self.done = false;
        Ok(())
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

        if let Some(mut child) = self.child.take() {
            child.init()?;
            let mut rows = Vec::new();
            while let Some((tuple, _)) = child.next()? {
                rows.push(tuple);
            }
            for tuple in &rows {
                self.insert_row(&table, tuple)?;
            }
        } else {
            let rows = std::mem::take(&mut self.rows);
            for tuple in &rows {
                self.insert_row(&table, tuple)?;
            }
        }

        Ok(None)
    }
}
