// ==============================================================================
// storage.rs - Object Store Access
// ==============================================================================
// Description: Fetches consensus sequences and batch files from object storage
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::location::ObjectKey;

/// Source of stored objects. Transport details live behind this trait.
#[allow(async_fn_in_trait)]
pub trait ObjectStore {
    /// Copy `object` to the local file `dest`.
    ///
    /// Returns [`PipelineError::ObjectNotFound`] when the bucket has no such
    /// key.
    async fn fetch(&self, object: &ObjectKey, dest: &Path) -> Result<()>;
}

/// Object store backed by a local directory laid out as `<root>/<bucket>/<key>`
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn object_path(&self, object: &ObjectKey) -> PathBuf {
        self.root.join(&object.bucket).join(&object.key)
    }
}

impl ObjectStore for LocalObjectStore {
    async fn fetch(&self, object: &ObjectKey, dest: &Path) -> Result<()> {
        let source = self.object_path(object);
        if !source.is_file() {
            return Err(PipelineError::ObjectNotFound {
                bucket: object.bucket.clone(),
                key: object.key.clone(),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!("Fetching {} -> {:?}", object, dest);
        tokio::fs::copy(&source, dest).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_local_fetch() {
        let root = tempfile::tempdir().unwrap();
        let object = ObjectKey {
            bucket: "s3-csu-003".to_string(),
            key: "v3/run1/consensus/A_consensus.fas".to_string(),
        };
        let store = LocalObjectStore::new(root.path());
        let source = store.object_path(&object);
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, ">A\nACGT\n").unwrap();

        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("cache").join("A.fas");
        store.fetch(&object, &dest).await.unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), ">A\nACGT\n");
    }

    #[tokio::test]
    async fn test_missing_object() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(root.path());
        let object = ObjectKey {
            bucket: "s3-csu-003".to_string(),
            key: "nope.fas".to_string(),
        };
        let err = store.fetch(&object, &root.path().join("x.fas")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ObjectNotFound);
    }
}
