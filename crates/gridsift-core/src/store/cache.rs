//! Local download cache in front of an object store
//!
//! Objects are stored at `{cache_dir}/{bucket}/{object}`. Artifacts of a
//! finished build never change, so entries are never invalidated. There is no
//! eviction either: the directory grows with every indexed build and has to be
//! pruned externally.

use super::{ObjectStore, StoreError, StoreResult};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub struct ObjectCache {
    dir: PathBuf,
    store: Arc<dyn ObjectStore>,
    /// Distinguishes concurrent downloads of the same object
    seq: AtomicU64,
}

impl ObjectCache {
    pub fn new(dir: impl Into<PathBuf>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            dir: dir.into(),
            store,
            seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Return the content of an object, downloading it on first use
    ///
    /// Downloads land in a unique `.part` sibling and are renamed into place,
    /// so a cache hit always sees a complete file.
    pub async fn fetch(&self, bucket: &str, object: &str) -> StoreResult<Vec<u8>> {
        let path = self.entry_path(bucket, object)?;

        match tokio::fs::read(&path).await {
            Ok(data) => {
                debug!("Found gs://{}/{} in cache", bucket, object);
                return Ok(data);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        debug!("Downloading gs://{}/{}...", bucket, object);
        let data = self.store.read(bucket, object).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let part = self.part_path(&path);
        if let Err(e) = self.write_part(&part, &data, &path).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }

        Ok(tokio::fs::read(&path).await?)
    }

    async fn write_part(&self, part: &Path, data: &[u8], path: &Path) -> StoreResult<()> {
        tokio::fs::write(part, data).await?;
        tokio::fs::rename(part, path).await?;
        Ok(())
    }

    fn part_path(&self, path: &Path) -> PathBuf {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".{}.{}.part", std::process::id(), seq));
        PathBuf::from(name)
    }

    /// Map `(bucket, object)` to a path inside the cache directory
    fn entry_path(&self, bucket: &str, object: &str) -> StoreResult<PathBuf> {
        let mut path = self.dir.clone();
        for part in [bucket, object] {
            let relative = Path::new(part);
            let normal = !part.is_empty()
                && relative
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)));
            if !normal {
                return Err(StoreError::InvalidName(format!("gs://{}/{}", bucket, object)));
            }
            path.push(relative);
        }
        Ok(path)
    }
}

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("dir", &self.dir)
            .field("store", &self.store)
            .finish()
    }
}
