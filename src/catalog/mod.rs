use std::collections::HashMap;
use std::sync::Arc;

use log::warn;
use parking_lot::RwLock;
use thiserror::Error;

use crate::common::types::{Oid, Rid, HEADER_PAGE_ID};
use crate::index::btree::{BTreeError, BTreeIndex, BTreeIterator};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::header;
use crate::storage::table::{TableError, TableHeap};
use crate::storage::tuple::{Schema, Tuple, Value};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("table {0} already exists")]
    TableExists(String),

    #[error("table {0} not found")]
    TableNotFound(String),

    #[error("index {0} already exists")]
    IndexExists(String),

    #[error("duplicate key while backfilling unique index {index} on table {table}")]
    DuplicateIndexKey { index: String, table: String },

    #[error("table heap error: {0}")]
    Table(#[from] TableError),

    #[error("index error: {0}")]
    Index(#[from] BTreeError),
}

/// Everything the executors need to know about a table.
pub struct TableInfo {
    pub oid: Oid,
    pub name: String,
    pub schema: Schema,
    pub heap: Arc<TableHeap>,
}

/// A single-column unique B+ tree index over a table.
pub struct IndexInfo {
    pub oid: Oid,
    pub name: String,
    pub table_name: String,
    pub key_column: usize,
    index: BTreeIndex<Value>,
}

impl IndexInfo {
    /// Project the indexed column out of a table tuple.
    pub fn key_from_tuple(&self, tuple: &Tuple) -> Value {
        tuple.value(self.key_column).clone()
    }

    pub fn insert_entry(&self, key: Value, rid: Rid) -> Result<bool, BTreeError> {
        self.index.insert(key, rid)
    }

    pub fn delete_entry(&self, key: &Value) -> Result<(), BTreeError> {
        self.index.remove(key)
    }

    /// Point lookup of the heap rid for `key`.
    pub fn scan_key(&self, key: &Value) -> Result<Option<Rid>, BTreeError> {
        self.index.get_value(key)
    }

    pub fn iter(&self) -> Result<BTreeIterator<Value>, BTreeError> {
        self.index.iter()
    }

    pub fn iter_from(&self, key: &Value) -> Result<BTreeIterator<Value>, BTreeError> {
        self.index.iter_from(key)
    }
}

#[derive(Default)]
struct CatalogInner {
    tables: HashMap<Oid, Arc<TableInfo>>,
    table_names: HashMap<String, Oid>,
    indexes: HashMap<Oid, Arc<IndexInfo>>,
    index_names: HashMap<String, Oid>,
    table_indexes: HashMap<String, Vec<Oid>>,
    next_oid: Oid,
}

/// Registry of tables and indexes, resolving names and oids for the
/// executor layer.
pub struct Catalog {
    buffer_pool: Arc<BufferPoolManager>,
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            buffer_pool,
            inner: RwLock::new(CatalogInner::default()),
        }
    }

    pub fn create_table(
        &self,
        name: impl Into<String>,
        schema: Schema,
    ) -> Result<Arc<TableInfo>, CatalogError> {
        let name = name.into();
        let mut inner = self.inner.write();
        if inner.table_names.contains_key(&name) {
            return Err(CatalogError::TableExists(name));
        }

        let heap = Arc::new(TableHeap::create(self.buffer_pool.clone())?);
        let oid = inner.next_oid;
        inner.next_oid += 1;

        let info = Arc::new(TableInfo {
            oid,
            name: name.clone(),
            schema,
            heap,
        });
        inner.tables.insert(oid, info.clone());
        inner.table_names.insert(name, oid);
        Ok(info)
    }

    pub fn get_table(&self, oid: Oid) -> Option<Arc<TableInfo>> {
        self.inner.read().tables.get(&oid).cloned()
    }

    pub fn get_table_by_name(&self, name: &str) -> Option<Arc<TableInfo>> {
        let inner = self.inner.read();
        let oid = inner.table_names.get(name)?;
        inner.tables.get(oid).cloned()
    }

    /// Create a unique index on one column of an existing table and backfill
    /// it from the table's current contents.
    pub fn create_index(
        &self,
        name: impl Into<String>,
        table_name: &str,
        key_column: usize,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Arc<IndexInfo>, CatalogError> {
        let name = name.into();
        let table = self
            .get_table_by_name(table_name)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))?;

        let mut inner = self.inner.write();
        if inner.index_names.contains_key(&name) {
            return Err(CatalogError::IndexExists(name));
        }

        let index = BTreeIndex::new(
            name.clone(),
            self.buffer_pool.clone(),
            leaf_max_size,
            internal_max_size,
        )?;

        let oid = inner.next_oid;
        inner.next_oid += 1;
        let info = Arc::new(IndexInfo {
            oid,
            name: name.clone(),
            table_name: table_name.to_string(),
            key_column,
            index,
        });

        // Backfill from the heap. The index is unique, so a pre-existing
        // duplicate in the key column is an error, not a silent skip. On any
        // failure the header record registered by `BTreeIndex::new` must be
        // withdrawn, or a retry would resume into the half-built tree.
        if let Err(e) = self.backfill_index(&table, &info) {
            self.remove_index_root_record(&info.name);
            return Err(e);
        }

        inner.indexes.insert(oid, info.clone());
        inner.index_names.insert(name, oid);
        inner
            .table_indexes
            .entry(table_name.to_string())
            .or_default()
            .push(oid);
        Ok(info)
    }

    fn backfill_index(
        &self,
        table: &Arc<TableInfo>,
        info: &Arc<IndexInfo>,
    ) -> Result<(), CatalogError> {
        for item in table.heap.iter() {
            let (rid, tuple) = item?;
            if !info.insert_entry(info.key_from_tuple(&tuple), rid)? {
                return Err(CatalogError::DuplicateIndexKey {
                    index: info.name.clone(),
                    table: table.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Withdraw a failed index's root record from the header page so the
    /// name can be reused from scratch. The partially built tree pages are
    /// left unreachable. Failures here are logged, not propagated; the
    /// caller is already returning the backfill error.
    fn remove_index_root_record(&self, name: &str) {
        let result = match self.buffer_pool.fetch_page(HEADER_PAGE_ID) {
            Ok(page) => {
                let removed = {
                    let mut guard = page.write();
                    header::remove_record(&mut guard, name)
                };
                self.buffer_pool.unpin_page(HEADER_PAGE_ID, true);
                removed.map(|_| ()).map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = result {
            warn!("failed to unregister index {} from the header page: {}", name, e);
        }
    }

    pub fn get_index_by_name(&self, name: &str) -> Option<Arc<IndexInfo>> {
        let inner = self.inner.read();
        let oid = inner.index_names.get(name)?;
        inner.indexes.get(oid).cloned()
    }

    /// All indexes defined over `table_name`.
    pub fn get_table_indexes(&self, table_name: &str) -> Vec<Arc<IndexInfo>> {
        let inner = self.inner.read();
        inner
            .table_indexes
            .get(table_name)
            .map(|oids| {
                oids.iter()
                    .filter_map(|oid| inner.indexes.get(oid).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}
