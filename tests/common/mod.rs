use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::NamedTempFile;

use rilldb::catalog::Catalog;
use rilldb::query::executor::ExecutorContext;
use rilldb::storage::buffer::BufferPoolManager;
use rilldb::transaction::{IsolationLevel, LockManager, Transaction, TransactionManager};

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<(NamedTempFile, String)> {
    let file = NamedTempFile::new()?;
    let path = file.path().to_str().unwrap().to_string();
    Ok((file, path))
}

// Create a buffer pool manager with a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(pool_size: usize) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, path)?);
    Ok((buffer_pool, file))
}

// Everything a query pipeline needs, over a temporary database
#[allow(dead_code)]
pub struct TestEngine {
    pub buffer_pool: Arc<BufferPoolManager>,
    pub catalog: Arc<Catalog>,
    pub lock_manager: Arc<LockManager>,
    pub txn_manager: Arc<TransactionManager>,
    _file: NamedTempFile,
}

#[allow(dead_code)]
pub fn create_test_engine(pool_size: usize) -> Result<TestEngine> {
    let _ = env_logger::builder().is_test(true).try_init();
    let (buffer_pool, file) = create_test_buffer_pool(pool_size)?;
    let catalog = Arc::new(Catalog::new(buffer_pool.clone()));
    let lock_manager = LockManager::new(Duration::from_millis(50));
    let txn_manager = Arc::new(TransactionManager::new(lock_manager.clone()));
    Ok(TestEngine {
        buffer_pool,
        catalog,
        lock_manager,
        txn_manager,
        _file: file,
    })
}

impl TestEngine {
    #[allow(dead_code)]
    pub fn context(&self, txn: &Arc<Transaction>) -> Arc<ExecutorContext> {
        Arc::new(ExecutorContext::new(
            self.catalog.clone(),
            self.buffer_pool.clone(),
            self.lock_manager.clone(),
            self.txn_manager.clone(),
            txn.clone(),
        ))
    }

    #[allow(dead_code)]
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        self.txn_manager.begin(isolation_level)
    }
}
