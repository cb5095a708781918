//! Filesystem content store
//!
//! Documents live under `<root>/<first two hex chars>/<pointer>`. Writes go to
//! a temporary file first and are renamed into place, so a reader never sees a
//! partially written document.

use crate::error::StoreError;
use crate::{parse_pointer, pointer_for, ContentStore};
use async_trait::async_trait;
use attest_core::ContentPointer;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Content store backed by a local directory
#[derive(Debug, Clone)]
pub struct FilesystemContentStore {
    root: PathBuf,
}

impl FilesystemContentStore {
    /// Create a store rooted at `root`; the directory is created lazily
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, pointer: &ContentPointer) -> Result<PathBuf, StoreError> {
        let digest = parse_pointer(pointer)
            .ok_or_else(|| StoreError::NotFound(format!("malformed pointer {pointer}")))?;
        Ok(self.root.join(&digest[..2]).join(pointer.as_str()))
    }
}

fn unavailable(action: &str, err: std::io::Error) -> StoreError {
    StoreError::Unavailable(format!("failed to {action}: {err}"))
}

#[async_trait]
impl ContentStore for FilesystemContentStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentPointer, StoreError> {
        let pointer = pointer_for(&bytes);
        let path = self.path_for(&pointer)?;

        if fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!(%pointer, "document already stored");
            return Ok(pointer);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| unavailable("create directory", e))?;
        }

        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let staging = path.with_extension(format!("partial-{}-{seq}", std::process::id()));
        fs::write(&staging, &bytes)
            .await
            .map_err(|e| unavailable("write document", e))?;
        if let Err(e) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(unavailable("publish document", e));
        }

        tracing::debug!(%pointer, size = bytes.len(), "document stored");
        Ok(pointer)
    }

    async fn get(&self, pointer: &ContentPointer) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(pointer)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(pointer.to_string()))
            }
            Err(e) => Err(unavailable("read document", e)),
        }
    }
}
