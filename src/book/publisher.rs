//! Artifact publishing
//!
//! Serializes a composed book through a temporary file and uploads it to the
//! finished-artifacts area of object storage.

use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::storage::{ObjectLocation, ObjectStore, StorageError};

use super::composer::ColoringBook;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize document: {0}")]
    Serialize(String),

    #[error("temporary file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to store document: {0}")]
    Storage(#[from] StorageError),
}

/// A stored book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArtifact {
    /// What clients use to fetch the document
    pub locator: String,
    pub location: ObjectLocation,
}

pub struct ArtifactPublisher {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    temp_dir: Option<PathBuf>,
}

impl ArtifactPublisher {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into().trim_matches('/').to_string(),
            temp_dir: None,
        }
    }

    /// Directory for temporary documents instead of the system default
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Serialize `book` and write it under a fresh key.
    ///
    /// The temporary file is removed on every path out of this function.
    pub async fn publish(&self, book: ColoringBook) -> Result<PublishedArtifact, PublishError> {
        let location = self.next_location();
        let temp_dir = self.temp_dir.clone();
        let pages = book.page_count();
        let title = book.title().to_string();

        let data = tokio::task::spawn_blocking(move || serialize(book, temp_dir))
            .await
            .map_err(|e| PublishError::Serialize(format!("serializer task failed: {}", e)))??;

        let size = data.len();
        let locator = self
            .store
            .put_object(&location, data, PDF_CONTENT_TYPE)
            .await?;

        tracing::info!(
            bucket = %location.bucket,
            key = %location.key,
            title = %title,
            pages,
            size,
            "Published coloring book"
        );

        Ok(PublishedArtifact { locator, location })
    }

    /// Best-effort removal of an artifact nobody will ask for
    pub async fn discard(&self, artifact: &PublishedArtifact) {
        if let Err(e) = self.store.delete_object(&artifact.location).await {
            tracing::warn!(
                bucket = %artifact.location.bucket,
                key = %artifact.location.key,
                error = %e,
                "Failed to discard artifact"
            );
        }
    }

    /// Read back a stored artifact
    pub async fn fetch(&self, location: &ObjectLocation) -> Result<Vec<u8>, StorageError> {
        Ok(self.store.get_object(location).await?.data)
    }

    fn next_location(&self) -> ObjectLocation {
        let file = format!("{}.pdf", Uuid::new_v4());
        let key = if self.prefix.is_empty() {
            file
        } else {
            format!("{}/{}", self.prefix, file)
        };
        ObjectLocation::new(self.bucket.clone(), key)
    }
}

fn serialize(mut book: ColoringBook, temp_dir: Option<PathBuf>) -> Result<Vec<u8>, PublishError> {
    let mut file = match temp_dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
        None => tempfile::NamedTempFile::new()?,
    };

    book.write_to(file.as_file_mut())
        .map_err(|e| PublishError::Serialize(e.to_string()))?;

    let handle = file.as_file_mut();
    handle.seek(SeekFrom::Start(0))?;
    let mut data = Vec::new();
    handle.read_to_end(&mut data)?;

    Ok(data)
}
