//! Application state management

use std::sync::Arc;
use std::time::Duration;

use crate::book::ArtifactPublisher;
use crate::config::Config;
use crate::images::{FetchError, HttpFetcher, ImageResolver, ReferenceParser, RemoteFetcher};
use crate::jobs::{InMemoryJobStore, JobStore, JobTracker};
use crate::storage::ObjectStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    tracker: JobTracker,
}

impl AppState {
    /// Wire the generation pipeline on top of the given storage and fetcher.
    ///
    /// Starts the job dispatcher, so this must run inside a tokio runtime.
    pub fn new(config: Config, store: Arc<dyn ObjectStore>, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        let resolver = ImageResolver::new(store.clone(), fetcher)
            .with_http_fallback(config.resolver.http_fallback);
        let publisher = ArtifactPublisher::new(
            store,
            config.storage.bucket.clone(),
            config.storage.artifact_prefix.clone(),
        );
        let jobs: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());

        let tracker = JobTracker::start(
            jobs,
            Arc::new(resolver),
            Arc::new(publisher),
            ReferenceParser::from_config(&config.storage),
            &config.jobs,
        );

        Self {
            inner: Arc::new(AppStateInner { config, tracker }),
        }
    }

    /// Same as [`AppState::new`] with the reqwest fetcher from configuration
    pub fn with_http_fetcher(config: Config, store: Arc<dyn ObjectStore>) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new(Duration::from_secs(config.resolver.fetch_timeout_secs))?;
        Ok(Self::new(config, store, Arc::new(fetcher)))
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the job tracker
    pub fn tracker(&self) -> &JobTracker {
        &self.inner.tracker
    }

    /// Stop accepting jobs and let running ones finish
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        self.inner.tracker.shutdown().await;
    }
}
