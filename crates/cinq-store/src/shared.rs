//! Single-flight store initialization.

use crate::{Store, StoreResult};
use std::path::PathBuf;
use tokio::sync::OnceCell;

/// Lazily opened store with single-flight initialization.
///
/// The first caller of [`get`](Self::get) opens the store; concurrent
/// callers await that same open and receive the same ready handle. A failed
/// open leaves the cell empty, so the next call attempts a fresh open.
pub struct SharedStore {
    path: PathBuf,
    cell: OnceCell<Store>,
}

impl SharedStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cell: OnceCell::new(),
        }
    }

    /// The ready store handle, opening it on first use.
    pub async fn get(&self) -> StoreResult<&Store> {
        self.cell
            .get_or_try_init(|| Store::open(&self.path))
            .await
    }

    /// The handle if initialization already completed.
    pub fn get_ready(&self) -> Option<&Store> {
        self.cell.get()
    }
}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore")
            .field("path", &self.path)
            .field("initialized", &self.cell.initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn concurrent_callers_share_one_open() {
        let dir = tempdir().unwrap();
        let shared = Arc::new(SharedStore::new(dir.path().join("queue.db")));
        assert!(shared.get_ready().is_none());

        let mut handles = vec![];
        for _ in 0..8 {
            let shared = shared.clone();
            handles.push(tokio::spawn(async move {
                shared.get().await.map(|store| store.path().to_string())
            }));
        }

        let mut paths = vec![];
        for handle in handles {
            paths.push(handle.await.unwrap().unwrap());
        }

        // Everyone got the same ready handle
        assert!(paths.windows(2).all(|w| w[0] == w[1]));
        assert!(shared.get_ready().is_some());
    }

    #[tokio::test]
    async fn failed_open_surfaces_storage_unavailable() {
        let dir = tempdir().unwrap();
        // A path whose parent is a file, not a directory
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let shared = SharedStore::new(blocker.join("queue.db"));
        let err = shared.get().await.expect_err("open should fail");
        let message = err.to_string();
        assert!(
            message.contains("unavailable") || message.contains("IO"),
            "unexpected error: {message}"
        );
        assert!(shared.get_ready().is_none());
    }
}
