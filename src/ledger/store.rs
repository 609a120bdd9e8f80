use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use thiserror::Error;
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file {0:?} doesn't exist")]
    NotFound(PathBuf),
    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == ErrorKind::NotFound {
            StoreError::NotFound(path.to_owned())
        } else {
            StoreError::Io {
                path: path.to_owned(),
                source,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Host file store the ledger is kept in. Everything the planner knows about the world goes
/// through this interface.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;

    async fn read(&self, path: &Path) -> Result<String, StoreError>;

    async fn write(&self, path: &Path, text: &str) -> Result<(), StoreError>;

    async fn append(&self, path: &Path, text: &str) -> Result<(), StoreError>;

    async fn ensure_folder(&self, path: &Path) -> Result<(), StoreError>;

    async fn list_children(&self, folder: &Path) -> Result<Vec<PathBuf>, StoreError>;
}

/// Reads a file substituting an empty table for a missing one. Other failures still surface.
pub async fn read_or_empty(store: &dyn FileStore, path: &Path) -> Result<String, StoreError> {
    match store.read(path).await {
        Ok(text) => Ok(text),
        Err(StoreError::NotFound(_)) => {
            debug!("{path:?} is missing, using an empty table");
            Ok(String::new())
        }
        Err(e) => Err(e),
    }
}

/// Creates `path` with `template` unless it is already there.
pub async fn ensure_file(
    store: &dyn FileStore,
    path: &Path,
    template: &str,
) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        store.ensure_folder(parent).await?;
    }
    if !store.exists(path).await {
        store.write(path, template).await?;
    }
    Ok(())
}

/// [FileStore] over the local file system.
pub struct LocalFileStore;

#[async_trait]
impl FileStore for LocalFileStore {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read(&self, path: &Path) -> Result<String, StoreError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    async fn write(&self, path: &Path, text: &str) -> Result<(), StoreError> {
        tokio::fs::write(path, text)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    async fn append(&self, path: &Path, text: &str) -> Result<(), StoreError> {
        async fn append_locked(path: &Path, text: &str) -> Result<(), std::io::Error> {
            let mut file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            // Semi-safe acquire-release for a file
            file.lock_exclusive()?;
            let result = async {
                file.write_all(text.as_bytes()).await?;
                file.flush().await
            }
            .await;
            file.unlock_async().await?;
            result
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.ensure_folder(parent).await?;
        }
        append_locked(path, text)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    async fn ensure_folder(&self, path: &Path) -> Result<(), StoreError> {
        match tokio::fs::create_dir_all(path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn list_children(&self, folder: &Path) -> Result<Vec<PathBuf>, StoreError> {
        let mut entries = tokio::fs::read_dir(folder)
            .await
            .map_err(|e| StoreError::io(folder, e))?;
        let mut children = vec![];
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(folder, e))?
        {
            children.push(entry.path());
        }
        Ok(children)
    }
}
