//! Process-local object store
//!
//! Keeps objects in a map behind a lock. Used when `S3_PROVIDER=memory` and as
//! the storage fake in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::StorageError;

use super::types::{ObjectLocation, ObjectMetadata, StorageObject};
use super::ObjectStore;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
    stored_at: DateTime<Utc>,
}

/// In-memory object store
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    objects: RwLock<HashMap<ObjectLocation, StoredObject>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly
    pub async fn insert(&self, location: ObjectLocation, data: Vec<u8>, content_type: &str) {
        let mut objects = self.inner.objects.write().await;
        objects.insert(
            location,
            StoredObject {
                data,
                content_type: content_type.to_string(),
                stored_at: Utc::now(),
            },
        );
    }

    /// Make every subsequent write fail with `ConnectionFailed`
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of objects held in a bucket
    pub async fn object_count(&self, bucket: &str) -> usize {
        let objects = self.inner.objects.read().await;
        objects.keys().filter(|l| l.bucket == bucket).count()
    }

    /// Locations held in a bucket, sorted by key
    pub async fn list(&self, bucket: &str) -> Vec<ObjectLocation> {
        let objects = self.inner.objects.read().await;
        let mut locations: Vec<_> = objects.keys().filter(|l| l.bucket == bucket).cloned().collect();
        locations.sort_by(|a, b| a.key.cmp(&b.key));
        locations
    }

    pub fn object_url(location: &ObjectLocation) -> String {
        format!("memory://{}/{}", location.bucket, location.encoded_key())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(&self, location: &ObjectLocation) -> Result<StorageObject, StorageError> {
        let objects = self.inner.objects.read().await;
        let stored = objects
            .get(location)
            .ok_or_else(|| StorageError::ObjectNotFound(location.to_string()))?;

        Ok(StorageObject {
            metadata: ObjectMetadata {
                key: location.key.clone(),
                size: stored.data.len() as i64,
                last_modified: Some(stored.stored_at),
                content_type: Some(stored.content_type.clone()),
                etag: None,
            },
            data: stored.data.clone(),
        })
    }

    async fn put_object(
        &self,
        location: &ObjectLocation,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionFailed(format!(
                "write to {} rejected",
                location
            )));
        }
        self.insert(location.clone(), data, content_type).await;
        Ok(Self::object_url(location))
    }

    async fn delete_object(&self, location: &ObjectLocation) -> Result<(), StorageError> {
        let mut objects = self.inner.objects.write().await;
        objects.remove(location);
        Ok(())
    }
}
