//! In-memory object store
//!
//! Mirrors the listing semantics of GCS (lexicographic order, delimiter
//! roll-up). Used by tests and for local experiments.

use super::{Listing, ObjectStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<BTreeMap<(String, String), Vec<u8>>>>,
    reads: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object
    pub fn insert(&self, bucket: &str, object: &str, data: impl Into<Vec<u8>>) {
        self.objects
            .write()
            .expect("RwLock poisoned")
            .insert((bucket.to_string(), object.to_string()), data.into());
    }

    pub fn remove(&self, bucket: &str, object: &str) {
        self.objects
            .write()
            .expect("RwLock poisoned")
            .remove(&(bucket.to_string(), object.to_string()));
    }

    /// Number of successful `read` calls served so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> StoreResult<Listing> {
        let objects = self.objects.read().expect("RwLock poisoned");
        let mut prefixes = BTreeSet::new();
        let mut listing = Listing::default();

        for (b, name) in objects.keys() {
            if b != bucket || !name.starts_with(prefix) {
                continue;
            }
            let rest = &name[prefix.len()..];
            match delimiter.and_then(|d| rest.find(d).map(|pos| pos + d.len())) {
                Some(end) => {
                    prefixes.insert(format!("{}{}", prefix, &rest[..end]));
                }
                None => listing.objects.push(name.clone()),
            }
        }

        listing.prefixes = prefixes.into_iter().collect();
        Ok(listing)
    }

    async fn read(&self, bucket: &str, object: &str) -> StoreResult<Vec<u8>> {
        let data = self
            .objects
            .read()
            .expect("RwLock poisoned")
            .get(&(bucket.to_string(), object.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(bucket, object))?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delimiter_listing() {
        let store = MemoryStore::new();
        store.insert("b", "logs/job/1/started.json", "{}");
        store.insert("b", "logs/job/1/artifacts/junit.xml", "");
        store.insert("b", "logs/job/2/started.json", "{}");
        store.insert("b", "logs/job/latest-build.txt", "2");
        store.insert("other", "logs/job/3/started.json", "{}");

        let listing = store.list("b", "logs/job/", Some("/")).await.unwrap();
        assert_eq!(listing.prefixes, vec!["logs/job/1/", "logs/job/2/"]);
        assert_eq!(listing.objects, vec!["logs/job/latest-build.txt"]);

        let flat = store.list("b", "logs/job/1/", None).await.unwrap();
        assert!(flat.prefixes.is_empty());
        assert_eq!(
            flat.objects,
            vec!["logs/job/1/artifacts/junit.xml", "logs/job/1/started.json"]
        );
    }

    #[tokio::test]
    async fn test_read_missing() {
        let store = MemoryStore::new();
        let err = store.read("b", "nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.reads(), 0);
    }
}
