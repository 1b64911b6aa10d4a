//! Storage module for S3-compatible backends
//!
//! Supports MinIO, Cloudflare R2, Backblaze B2 and AWS S3, plus a process-local
//! store used in development and tests.

mod memory;
mod s3_client;
mod types;

use async_trait::async_trait;

pub use crate::error::StorageError;
pub use memory::MemoryStore;
pub use s3_client::S3Client;
pub use types::*;

/// Object storage port used by the image resolver and the publisher.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object with its metadata
    async fn get_object(&self, location: &ObjectLocation) -> Result<StorageObject, StorageError>;

    /// Write an object, returning a locator clients can dereference later
    async fn put_object(
        &self,
        location: &ObjectLocation,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete_object(&self, location: &ObjectLocation) -> Result<(), StorageError>;
}
