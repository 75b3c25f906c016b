//! Runtime file locations.

use crate::{ServiceError, ServiceResult};
use std::path::{Path, PathBuf};

/// Filesystem layout for runtime files. Everything lives under one base
/// directory, `~/.cinq` by default.
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Paths anchored at `~/.cinq`.
    pub fn new() -> ServiceResult<Self> {
        let home = dirs::home_dir().ok_or(ServiceError::HomeDirUnavailable)?;
        Ok(Self {
            base_dir: home.join(".cinq"),
        })
    }

    /// Paths anchored at an explicit base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    pub fn store_file(&self) -> PathBuf {
        self.base_dir.join("queue.db")
    }

    pub fn ensure_dirs(&self) -> ServiceResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}
