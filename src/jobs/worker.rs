//! Background job execution
//!
//! Submissions are queued on a bounded channel. The dispatcher runs each job
//! in its own task, optionally limited by a semaphore, and supervises it so a
//! panic still ends with a `failed` record.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::book::{ArtifactPublisher, BookComposer, ComposeError, PublishedArtifact};
use crate::images::ImageRef;

use super::cancel::{CancelRegistry, CancelToken};
use super::store::{JobStore, StoreError};
use super::types::JobId;

pub(crate) const PANIC_MESSAGE: &str = "job processing panicked";

/// Work item handed from the tracker to the dispatcher
pub(crate) struct JobMessage {
    pub job_id: JobId,
    pub image_refs: Arc<[ImageRef]>,
    pub title: String,
    pub cancel: CancelToken,
}

enum Outcome {
    Published(PublishedArtifact),
    Failed(String),
    Cancelled,
}

/// Runs one job: compose, publish, record the result
pub(crate) struct JobRunner {
    store: Arc<dyn JobStore>,
    composer: BookComposer,
    publisher: Arc<ArtifactPublisher>,
    cancels: CancelRegistry,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        composer: BookComposer,
        publisher: Arc<ArtifactPublisher>,
        cancels: CancelRegistry,
    ) -> Self {
        Self {
            store,
            composer,
            publisher,
            cancels,
        }
    }

    async fn run(&self, msg: JobMessage) {
        let outcome = self.produce(&msg).await;
        self.record(msg.job_id, &msg.cancel, outcome).await;
        self.cancels.take(msg.job_id);
    }

    async fn produce(&self, msg: &JobMessage) -> Outcome {
        let book = match self
            .composer
            .compose(&msg.image_refs, &msg.title, &msg.cancel)
            .await
        {
            Ok(book) => book,
            Err(ComposeError::Cancelled) => return Outcome::Cancelled,
        };

        tracing::debug!(
            pages = book.page_count(),
            placeholders = book.placeholder_count(),
            "Book composed"
        );

        if msg.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        match self.publisher.publish(book).await {
            Ok(artifact) if msg.cancel.is_cancelled() => {
                self.publisher.discard(&artifact).await;
                Outcome::Cancelled
            }
            Ok(artifact) => Outcome::Published(artifact),
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    async fn record(&self, job_id: JobId, cancel: &CancelToken, outcome: Outcome) {
        if let Outcome::Cancelled = outcome {
            tracing::info!("Job cancelled, nothing recorded");
            return;
        }

        let mut job = match self.store.get(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::info!("Job removed while processing");
                if let Outcome::Published(artifact) = &outcome {
                    self.publisher.discard(artifact).await;
                }
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load job for final update");
                return;
            }
        };

        let published = match outcome {
            Outcome::Published(artifact) => {
                job.complete(artifact.locator.clone(), artifact.location.clone());
                Some(artifact)
            }
            Outcome::Failed(message) => {
                tracing::error!(error = %message, "Job failed");
                job.fail(message);
                None
            }
            Outcome::Cancelled => None,
        };

        match self.store.update(job).await {
            Ok(()) if cancel.is_cancelled() => {
                // Cancel landed between the publish check and the update
                tracing::info!("Job cancelled during final update");
            }
            Ok(()) => {
                if let Some(artifact) = &published {
                    tracing::info!(locator = %artifact.locator, "Job completed");
                }
            }
            Err(StoreError::Missing(_)) => {
                tracing::info!("Job removed before final update");
                if let Some(artifact) = &published {
                    self.publisher.discard(artifact).await;
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to record job outcome"),
        }
    }

    /// Mark a job failed from outside its own task
    async fn record_failure(&self, job_id: JobId, message: &str) {
        self.cancels.take(job_id);
        match self.store.get(job_id).await {
            Ok(Some(mut job)) => {
                if job.fail(message) {
                    if let Err(e) = self.store.update(job).await {
                        tracing::error!(error = %e, "Failed to record job failure");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Failed to load job"),
        }
    }
}

/// Receives queued jobs until the channel closes, then drains in-flight work
pub(crate) async fn dispatch(
    mut receiver: mpsc::Receiver<JobMessage>,
    runner: Arc<JobRunner>,
    limit: Option<Arc<Semaphore>>,
) {
    tracing::info!(
        max_concurrent = limit.as_ref().map(|s| s.available_permits()),
        "Job dispatcher started"
    );
    let mut running = JoinSet::new();

    loop {
        tokio::select! {
            msg = receiver.recv() => {
                let Some(msg) = msg else { break };
                let permit = match &limit {
                    Some(semaphore) => match semaphore.clone().acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                    None => None,
                };
                let runner = runner.clone();
                running.spawn(async move {
                    let _permit = permit;
                    supervise(runner, msg).await;
                });
            }
            Some(result) = running.join_next(), if !running.is_empty() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Job supervisor task failed");
                }
            }
        }
    }

    let in_flight = running.len();
    if in_flight > 0 {
        tracing::info!(in_flight, "Waiting for in-flight jobs");
    }
    while let Some(result) = running.join_next().await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Job supervisor task failed");
        }
    }
    tracing::info!("Job dispatcher stopped: queue closed");
}

async fn supervise(runner: Arc<JobRunner>, msg: JobMessage) {
    let job_id = msg.job_id;
    let span = tracing::info_span!(
        "generation_job",
        job_id = %job_id,
        images = msg.image_refs.len(),
    );

    let worker = tokio::spawn({
        let runner = runner.clone();
        async move { runner.run(msg).await }.instrument(span.clone())
    });

    if let Err(e) = worker.await {
        let message = if e.is_panic() {
            PANIC_MESSAGE
        } else {
            "job processing was aborted"
        };
        async {
            tracing::error!(error = %e, "{}", message);
            runner.record_failure(job_id, message).await;
        }
        .instrument(span)
        .await;
    }
}
