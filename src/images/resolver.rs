//! Image resolution
//!
//! Turns an [`ImageRef`] into bytes. Storage references are read through the
//! object store first and retried over plain HTTP when that fails, since a
//! storage URL is not always reachable with the server's own credentials
//! (presigned or public-read URLs, buckets in another account).

use std::sync::Arc;

use crate::storage::ObjectStore;

use super::fetch::RemoteFetcher;
use super::types::{guess_content_type, ImageRef, ResolutionError, ResolvedImage};

/// Resolves image references to bytes
pub struct ImageResolver {
    store: Arc<dyn ObjectStore>,
    fetcher: Arc<dyn RemoteFetcher>,
    http_fallback: bool,
}

impl ImageResolver {
    pub fn new(store: Arc<dyn ObjectStore>, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            store,
            fetcher,
            http_fallback: true,
        }
    }

    /// Enable or disable the storage → HTTP fallback
    pub fn with_http_fallback(mut self, enabled: bool) -> Self {
        self.http_fallback = enabled;
        self
    }

    pub async fn resolve(&self, image: &ImageRef) -> Result<ResolvedImage, ResolutionError> {
        match image {
            ImageRef::Inline { content_type, data } => {
                Ok(ResolvedImage::new(data.clone(), content_type.clone()))
            }
            ImageRef::Storage { location, url } => {
                let storage_err = match self.store.get_object(location).await {
                    Ok(object) => {
                        let content_type = object
                            .metadata
                            .content_type
                            .filter(|ct| !ct.is_empty() && ct != "binary/octet-stream")
                            .unwrap_or_else(|| guess_content_type(&location.key));
                        return Ok(ResolvedImage::new(object.data, content_type));
                    }
                    Err(e) => e,
                };

                if !self.http_fallback {
                    return Err(ResolutionError::Storage(storage_err));
                }

                tracing::debug!(
                    bucket = %location.bucket,
                    key = %location.key,
                    error = %storage_err,
                    "Storage read failed, falling back to HTTP"
                );

                self.fetcher
                    .fetch(url)
                    .await
                    .map_err(|fallback| ResolutionError::Unreachable {
                        storage: storage_err,
                        fallback,
                    })
            }
            ImageRef::Remote { url } => Ok(self.fetcher.fetch(url).await?),
        }
    }
}
