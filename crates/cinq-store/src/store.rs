//! Async store handle over a dedicated SQLite executor thread.
//!
//! All operations are sent to a single background thread via channel and run
//! in FIFO order. That single thread is what makes the store's single-writer
//! discipline hold: there is never more than one logical writer active at a
//! time, and no interleaved partial writes to the same record are possible.
//!
//! Only SQL and lightweight row mapping belong inside [`Store::call`];
//! network calls and heavy computation happen outside, on the async side.

use crate::{migrations, StoreError, StoreResult};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

/// Convert a tokio_rusqlite::Error to StoreError.
fn from_executor(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => StoreError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => {
            StoreError::StorageUnavailable("connection closed".to_string())
        }
        other => StoreError::StorageUnavailable(other.to_string()),
    }
}

/// Handle to the durable store. Cheap to clone; clones share the same
/// executor thread.
#[derive(Clone, Debug)]
pub struct Store {
    conn: Connection,
    path: String,
}

impl Store {
    /// Open (creating and upgrading as needed) the store at `path`.
    ///
    /// Failure to open or migrate surfaces as
    /// [`StoreError::StorageUnavailable`] / [`StoreError::Migration`]; there
    /// is no built-in retry.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening store");

        let conn = Connection::open(&path_str)
            .await
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA temp_store = MEMORY;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            Ok(())
        })
        .await
        .map_err(from_executor)?;

        let store = Self {
            conn,
            path: path_str,
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Open an in-memory store for testing.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

        // WAL does not apply in memory
        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA temp_store = MEMORY;")?;
            Ok(())
        })
        .await
        .map_err(from_executor)?;

        let store = Self {
            conn,
            path: ":memory:".to_string(),
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        self.call(|conn| migrations::run_migrations(conn)).await
    }

    /// Run a closure against the store connection on the executor thread.
    ///
    /// The caller's task is parked, not blocked, until the result comes back.
    pub async fn call<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        // The executor channel only carries tokio_rusqlite errors, so the
        // StoreResult travels inside the Ok variant and is unwrapped here.
        match self.conn.call(move |conn| Ok(f(conn))).await {
            Ok(inner) => inner,
            Err(e) => Err(from_executor(e)),
        }
    }

    /// The store file path (`:memory:` for in-memory stores).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Verify the executor responds.
    pub async fn health_check(&self) -> StoreResult<()> {
        self.call(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(())
        })
        .await?;
        debug!("Store health check passed");
        Ok(())
    }

    /// Close the store, draining pending operations first.
    pub async fn close(self) -> StoreResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| StoreError::StorageUnavailable(format!("close failed: {e:?}")))?;
        info!(path = %self.path, "Store closed");
        Ok(())
    }
}
