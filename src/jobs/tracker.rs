//! Job Tracker
//!
//! Accepts generation requests, hands them to the background dispatcher and
//! answers status queries from the job store.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::book::{ArtifactPublisher, BookComposer, PublishedArtifact, DEFAULT_TITLE};
use crate::config::JobsConfig;
use crate::images::{ImageResolver, ReferenceParser};

use super::cancel::CancelRegistry;
use super::store::JobStore;
use super::types::{
    GenerationJob, JobError, JobId, JobStatus, JobStatusView, JobSummary, SubmitRequest,
    DEFAULT_OWNER, MAX_IMAGES_PER_JOB, MAX_TITLE_CHARS,
};
use super::worker::{dispatch, JobMessage, JobRunner};

/// A finished book ready to be sent to a client
#[derive(Debug)]
pub struct Download {
    pub title: String,
    pub data: Vec<u8>,
}

/// Front door of the generation pipeline
#[derive(Clone)]
pub struct JobTracker {
    inner: Arc<JobTrackerInner>,
}

struct JobTrackerInner {
    store: Arc<dyn JobStore>,
    parser: ReferenceParser,
    publisher: Arc<ArtifactPublisher>,

    /// Taken on shutdown; `None` means the queue is closed
    queue: Mutex<Option<mpsc::Sender<JobMessage>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,

    cancels: CancelRegistry,
}

impl JobTracker {
    /// Build the tracker and start its dispatcher on the current runtime
    pub fn start(
        store: Arc<dyn JobStore>,
        resolver: Arc<ImageResolver>,
        publisher: Arc<ArtifactPublisher>,
        parser: ReferenceParser,
        config: &JobsConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let limit = (config.max_concurrent > 0).then(|| Arc::new(Semaphore::new(config.max_concurrent)));

        let cancels = CancelRegistry::default();
        let runner = Arc::new(JobRunner::new(
            store.clone(),
            BookComposer::new(resolver),
            publisher.clone(),
            cancels.clone(),
        ));
        let dispatcher = tokio::spawn(dispatch(receiver, runner, limit));

        Self {
            inner: Arc::new(JobTrackerInner {
                store,
                parser,
                publisher,
                queue: Mutex::new(Some(sender)),
                dispatcher: Mutex::new(Some(dispatcher)),
                cancels,
            }),
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Validate and enqueue a request. Returns once the job is `processing`.
    ///
    /// Never waits for queue space: a full queue refuses the job instead.
    pub async fn submit(&self, request: SubmitRequest) -> Result<JobStatusView, JobError> {
        let SubmitRequest {
            image_refs,
            title,
            owner_id,
        } = request;

        if image_refs.is_empty() {
            return Err(JobError::Validation("at least one image reference is required".into()));
        }
        if image_refs.len() > MAX_IMAGES_PER_JOB {
            return Err(JobError::Validation(format!(
                "too many images: {} (max: {})",
                image_refs.len(),
                MAX_IMAGES_PER_JOB
            )));
        }

        let title = match title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => DEFAULT_TITLE.to_string(),
        };
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(JobError::Validation(format!(
                "title is longer than {} characters",
                MAX_TITLE_CHARS
            )));
        }

        let refs = self
            .inner
            .parser
            .parse_all(&image_refs)
            .map_err(|(position, e)| JobError::Validation(format!("image {}: {}", position, e)))?;

        let owner_id = owner_id
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| DEFAULT_OWNER.to_string());

        let sender = self.sender()?;

        let mut job = GenerationJob::new(owner_id, refs, title);
        let job_id = job.id;
        self.inner.store.create(job.clone()).await?;

        job.start();
        self.inner.store.update(job.clone()).await?;

        let cancel = self.inner.cancels.register(job_id);
        let message = JobMessage {
            job_id,
            image_refs: job.image_refs.clone(),
            title: job.title.clone(),
            cancel,
        };
        if let Err(e) = sender.try_send(message) {
            self.inner.cancels.take(job_id);
            self.inner.store.delete(job_id).await?;
            return Err(match e {
                TrySendError::Full(_) => {
                    tracing::warn!(job_id = %job_id, "Job queue full, submission refused");
                    JobError::QueueFull
                }
                TrySendError::Closed(_) => JobError::QueueClosed,
            });
        }

        tracing::info!(
            job_id = %job_id,
            owner_id = %job.owner_id,
            images = job.image_refs.len(),
            "Generation job submitted"
        );

        Ok(job.status_view())
    }

    pub async fn get_status(&self, job_id: &str) -> Result<JobStatusView, JobError> {
        Ok(self.find(job_id).await?.status_view())
    }

    pub async fn list_jobs(&self, owner_id: &str) -> Result<Vec<JobSummary>, JobError> {
        let jobs = self.inner.store.list_by_owner(owner_id).await?;
        Ok(jobs.iter().map(GenerationJob::summary).collect())
    }

    /// Cancel a job that has not finished and forget it
    pub async fn cancel(&self, job_id: &str) -> Result<(), JobError> {
        let job = self.find(job_id).await?;
        if job.status.is_terminal() {
            return Err(JobError::AlreadyFinished(job.id.to_string()));
        }

        if let Some(token) = self.inner.cancels.take(job.id) {
            token.cancel();
        }

        // The worker may have finished between the read above and this delete
        if let Some(removed) = self.inner.store.delete(job.id).await? {
            if let (JobStatus::Completed, Some(location), Some(locator)) =
                (removed.status, removed.artifact, removed.result_locator)
            {
                self.inner
                    .publisher
                    .discard(&PublishedArtifact { locator, location })
                    .await;
            }
        }

        tracing::info!(job_id = %job.id, "Generation job cancelled");
        Ok(())
    }

    /// PDF bytes of a completed job
    pub async fn download(&self, job_id: &str) -> Result<Download, JobError> {
        let job = self.find(job_id).await?;
        let location = match (job.status, &job.artifact) {
            (JobStatus::Completed, Some(location)) => location,
            _ => {
                return Err(JobError::NotCompleted(format!(
                    "{} is {}",
                    job.id, job.status
                )))
            }
        };

        let data = self.inner.publisher.fetch(location).await?;
        Ok(Download {
            title: job.title,
            data,
        })
    }

    /// Stop accepting jobs and wait for in-flight ones to finish
    pub async fn shutdown(&self) {
        let sender = self.lock(&self.inner.queue).take();
        drop(sender);

        let dispatcher = self.lock(&self.inner.dispatcher).take();
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Job dispatcher ended abnormally");
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn find(&self, job_id: &str) -> Result<GenerationJob, JobError> {
        let id: JobId = job_id.parse()?;
        self.inner
            .store
            .get(id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    fn sender(&self) -> Result<mpsc::Sender<JobMessage>, JobError> {
        self.lock(&self.inner.queue)
            .as_ref()
            .cloned()
            .ok_or(JobError::QueueClosed)
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use lopdf::Document;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::book::testing::{page_ids, page_image_width, page_texts};
    use crate::images::testing::{png, png_data_uri, StaticFetcher};
    use crate::images::{FetchError, RemoteFetcher, ResolvedImage};
    use crate::jobs::worker::PANIC_MESSAGE;
    use crate::jobs::InMemoryJobStore;
    use crate::storage::{MemoryStore, ObjectLocation, ObjectStore, StorageError, StorageObject};

    const BUCKET: &str = "coloring-books";

    /// Holds every fetch until the test opens the gate
    struct GatedFetcher {
        gate: Semaphore,
        calls: AtomicUsize,
    }

    impl GatedFetcher {
        fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
                calls: AtomicUsize::new(0),
            }
        }

        fn open(&self, permits: usize) {
            self.gate.add_permits(permits);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteFetcher for GatedFetcher {
        async fn fetch(&self, _url: &str) -> Result<ResolvedImage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate
                .acquire()
                .await
                .map_err(|_| FetchError::Request("gate closed".into()))?
                .forget();
            Ok(ResolvedImage::new(png(6, 6), "image/png"))
        }
    }

    /// Holds every upload until the test opens the gate
    struct GatedStore {
        inner: MemoryStore,
        gate: Semaphore,
        puts: AtomicUsize,
    }

    impl GatedStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                gate: Semaphore::new(0),
                puts: AtomicUsize::new(0),
            }
        }

        async fn wait_for_put(&self) {
            for _ in 0..500 {
                if self.puts.load(Ordering::SeqCst) > 0 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("no upload started");
        }
    }

    #[async_trait]
    impl ObjectStore for GatedStore {
        async fn get_object(&self, location: &ObjectLocation) -> Result<StorageObject, StorageError> {
            self.inner.get_object(location).await
        }

        async fn put_object(
            &self,
            location: &ObjectLocation,
            data: Vec<u8>,
            content_type: &str,
        ) -> Result<String, StorageError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.gate
                .acquire()
                .await
                .map_err(|_| StorageError::ConnectionFailed("gate closed".into()))?
                .forget();
            self.inner.put_object(location, data, content_type).await
        }

        async fn delete_object(&self, location: &ObjectLocation) -> Result<(), StorageError> {
            self.inner.delete_object(location).await
        }
    }

    struct PanickingFetcher;

    #[async_trait]
    impl RemoteFetcher for PanickingFetcher {
        async fn fetch(&self, url: &str) -> Result<ResolvedImage, FetchError> {
            panic!("fetcher exploded on {}", url);
        }
    }

    struct Harness {
        tracker: JobTracker,
        objects: MemoryStore,
        jobs: Arc<InMemoryJobStore>,
    }

    fn harness(fetcher: Arc<dyn RemoteFetcher>) -> Harness {
        harness_with(fetcher, JobsConfig::default())
    }

    fn harness_with(fetcher: Arc<dyn RemoteFetcher>, config: JobsConfig) -> Harness {
        let objects = MemoryStore::new();
        harness_on(fetcher, objects.clone(), Arc::new(objects), config)
    }

    /// `store` fronts `objects`, so assertions still see what was written
    fn harness_on(
        fetcher: Arc<dyn RemoteFetcher>,
        objects: MemoryStore,
        store: Arc<dyn ObjectStore>,
        config: JobsConfig,
    ) -> Harness {
        let resolver = Arc::new(ImageResolver::new(store.clone(), fetcher));
        let publisher = Arc::new(ArtifactPublisher::new(store, BUCKET, "books"));
        let jobs = Arc::new(InMemoryJobStore::new());
        let tracker = JobTracker::start(
            jobs.clone(),
            resolver,
            publisher,
            ReferenceParser::default(),
            &config,
        );
        Harness {
            tracker,
            objects,
            jobs,
        }
    }

    fn request(refs: Vec<String>, title: Option<&str>) -> SubmitRequest {
        SubmitRequest {
            image_refs: refs,
            title: title.map(str::to_string),
            owner_id: None,
        }
    }

    async fn wait_finished(tracker: &JobTracker, job_id: &str) -> JobStatusView {
        for _ in 0..500 {
            let view = tracker.get_status(job_id).await.unwrap();
            if view.status.is_terminal() {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", job_id);
    }

    async fn wait_for_calls(fetcher: &GatedFetcher, calls: usize) {
        for _ in 0..500 {
            if fetcher.calls() >= calls {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("fetcher was called {} times, expected {}", fetcher.calls(), calls);
    }

    async fn downloaded(tracker: &JobTracker, job_id: &str) -> Document {
        let download = tracker.download(job_id).await.unwrap();
        Document::load_mem(&download.data).unwrap()
    }

    #[tokio::test]
    async fn test_test_book_scenario() {
        let h = harness(Arc::new(StaticFetcher::new()));
        let refs = vec![png_data_uri(30, 20), png_data_uri(31, 20), png_data_uri(32, 20)];

        let submitted = h.tracker.submit(request(refs, Some("Test Book"))).await.unwrap();
        assert_eq!(submitted.status, JobStatus::Processing);

        let job_id = submitted.job_id.to_string();
        let finished = wait_finished(&h.tracker, &job_id).await;
        assert_eq!(finished.status, JobStatus::Completed);
        assert!(finished.error_message.is_none());
        assert!(finished.result_locator.unwrap().starts_with("memory://coloring-books/books/"));

        let doc = downloaded(&h.tracker, &job_id).await;
        let ids = page_ids(&doc);
        assert_eq!(ids.len(), 4);
        assert!(page_texts(&doc, ids[0]).contains(&"Test Book".to_string()));
        assert_eq!(page_image_width(&doc, ids[1]), Some(30));
        assert_eq!(page_image_width(&doc, ids[2]), Some(31));
        assert_eq!(page_image_width(&doc, ids[3]), Some(32));
    }

    #[tokio::test]
    async fn test_unreachable_storage_ref_still_completes() {
        let h = harness(Arc::new(StaticFetcher::new()));
        let refs = vec!["http://localhost:9000/processed/missing.png".to_string()];

        let job_id = h.tracker.submit(request(refs, None)).await.unwrap().job_id.to_string();
        let finished = wait_finished(&h.tracker, &job_id).await;
        assert_eq!(finished.status, JobStatus::Completed);

        let doc = downloaded(&h.tracker, &job_id).await;
        let ids = page_ids(&doc);
        assert_eq!(ids.len(), 2);
        assert!(page_texts(&doc, ids[0]).contains(&DEFAULT_TITLE.to_string()));
        assert!(page_texts(&doc, ids[1]).contains(&"Image 1 could not be included".to_string()));
        assert_eq!(page_image_width(&doc, ids[1]), None);
    }

    #[tokio::test]
    async fn test_two_bad_images_out_of_ten() {
        let h = harness(Arc::new(StaticFetcher::new()));
        let refs: Vec<String> = (0..10)
            .map(|i| match i {
                2 | 5 => format!("https://cdn.test/missing-{}.png", i),
                _ => png_data_uri(10 + i, 10),
            })
            .collect();

        let job_id = h.tracker.submit(request(refs, None)).await.unwrap().job_id.to_string();
        assert_eq!(wait_finished(&h.tracker, &job_id).await.status, JobStatus::Completed);

        let doc = downloaded(&h.tracker, &job_id).await;
        let ids = page_ids(&doc);
        assert_eq!(ids.len(), 11);
        for i in 0..10u32 {
            let page = ids[i as usize + 1];
            if i == 2 || i == 5 {
                assert_eq!(page_image_width(&doc, page), None);
                assert!(page_texts(&doc, page).contains(&format!("Image {} could not be included", i + 1)));
            } else {
                assert_eq!(page_image_width(&doc, page), Some((10 + i) as i64));
            }
            assert!(page_texts(&doc, page).contains(&format!("Page {} of 11", i + 2)));
        }
    }

    #[tokio::test]
    async fn test_empty_submission_is_rejected() {
        let h = harness(Arc::new(StaticFetcher::new()));
        let err = h.tracker.submit(request(Vec::new(), Some("Empty"))).await.unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));
        assert_eq!(h.jobs.len().await, 0);
    }

    #[tokio::test]
    async fn test_submission_validation() {
        let h = harness(Arc::new(StaticFetcher::new()));

        let err = h
            .tracker
            .submit(request(vec![png_data_uri(2, 2), "ftp://nope/a.png".into()], None))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Validation(ref m) if m.starts_with("image 2:")));

        let long_title = "x".repeat(MAX_TITLE_CHARS + 1);
        let err = h
            .tracker
            .submit(request(vec![png_data_uri(2, 2)], Some(&long_title)))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));

        let too_many = vec![png_data_uri(1, 1); MAX_IMAGES_PER_JOB + 1];
        let err = h.tracker.submit(request(too_many, None)).await.unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));

        assert_eq!(h.jobs.len().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let h = harness(Arc::new(StaticFetcher::new()));
        assert!(matches!(
            h.tracker.get_status("not-a-real-id").await,
            Err(JobError::NotFound(_))
        ));
        assert!(matches!(
            h.tracker.get_status(&JobId::new().to_string()).await,
            Err(JobError::NotFound(_))
        ));
        assert!(matches!(
            h.tracker.cancel("not-a-real-id").await,
            Err(JobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_finished_jobs_do_not_change() {
        let h = harness(Arc::new(StaticFetcher::new()));
        let job_id = h
            .tracker
            .submit(request(vec![png_data_uri(4, 4)], None))
            .await
            .unwrap()
            .job_id;
        let job_id = job_id.to_string();

        let first = wait_finished(&h.tracker, &job_id).await;
        let stored = h.jobs.get(first.job_id).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let second = h.tracker.get_status(&job_id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(h.tracker.get_status(&job_id).await.unwrap(), second);

        let restored = h.jobs.get(first.job_id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, restored.updated_at);
        assert_eq!(h.objects.object_count(BUCKET).await, 1);
    }

    #[tokio::test]
    async fn test_publish_failure_fails_job() {
        let h = harness(Arc::new(StaticFetcher::new()));
        h.objects.set_fail_writes(true);

        let job_id = h
            .tracker
            .submit(request(vec![png_data_uri(4, 4)], None))
            .await
            .unwrap()
            .job_id
            .to_string();

        let finished = wait_finished(&h.tracker, &job_id).await;
        assert_eq!(finished.status, JobStatus::Failed);
        assert!(finished.result_locator.is_none());
        assert!(finished
            .error_message
            .unwrap()
            .starts_with("failed to store document"));
        assert!(matches!(
            h.tracker.download(&job_id).await,
            Err(JobError::NotCompleted(_))
        ));
    }

    #[tokio::test]
    async fn test_panicking_job_is_recorded_as_failed() {
        let h = harness(Arc::new(PanickingFetcher));
        let job_id = h
            .tracker
            .submit(request(vec!["https://cdn.test/a.png".into()], None))
            .await
            .unwrap()
            .job_id
            .to_string();

        let finished = wait_finished(&h.tracker, &job_id).await;
        assert_eq!(finished.status, JobStatus::Failed);
        assert_eq!(finished.error_message.as_deref(), Some(PANIC_MESSAGE));

        // The dispatcher keeps serving other jobs
        let h2 = h.tracker.submit(request(vec![png_data_uri(2, 2)], None)).await.unwrap();
        let second = wait_finished(&h.tracker, &h2.job_id.to_string()).await;
        assert_eq!(second.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_job() {
        let fetcher = Arc::new(GatedFetcher::new());
        let h = harness(fetcher.clone());
        let job_id = h
            .tracker
            .submit(request(vec!["https://cdn.test/a.png".into()], None))
            .await
            .unwrap()
            .job_id
            .to_string();

        wait_for_calls(&fetcher, 1).await;
        assert!(matches!(
            h.tracker.download(&job_id).await,
            Err(JobError::NotCompleted(_))
        ));

        h.tracker.cancel(&job_id).await.unwrap();
        assert!(matches!(h.tracker.get_status(&job_id).await, Err(JobError::NotFound(_))));

        fetcher.open(1);
        h.tracker.shutdown().await;

        assert_eq!(h.objects.object_count(BUCKET).await, 0);
        assert_eq!(h.jobs.len().await, 0);
        assert!(matches!(h.tracker.cancel(&job_id).await, Err(JobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_cancel_during_upload_leaves_no_artifact() {
        let objects = MemoryStore::new();
        let gated = Arc::new(GatedStore::new(objects.clone()));
        let h = harness_on(
            Arc::new(StaticFetcher::new()),
            objects,
            gated.clone(),
            JobsConfig::default(),
        );
        let job_id = h
            .tracker
            .submit(request(vec![png_data_uri(4, 4)], None))
            .await
            .unwrap()
            .job_id
            .to_string();

        gated.wait_for_put().await;
        h.tracker.cancel(&job_id).await.unwrap();

        gated.gate.add_permits(1);
        h.tracker.shutdown().await;

        assert_eq!(h.objects.object_count(BUCKET).await, 0);
        assert_eq!(h.jobs.len().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_job_waiting_for_permit() {
        let fetcher = Arc::new(GatedFetcher::new());
        let h = harness_with(
            fetcher.clone(),
            JobsConfig {
                max_concurrent: 1,
                queue_capacity: 8,
            },
        );

        let running = h
            .tracker
            .submit(request(vec!["https://cdn.test/a.png".into()], None))
            .await
            .unwrap()
            .job_id
            .to_string();
        let waiting = h
            .tracker
            .submit(request(vec!["https://cdn.test/b.png".into()], None))
            .await
            .unwrap()
            .job_id
            .to_string();

        wait_for_calls(&fetcher, 1).await;
        h.tracker.cancel(&waiting).await.unwrap();

        fetcher.open(2);
        assert_eq!(wait_finished(&h.tracker, &running).await.status, JobStatus::Completed);
        h.tracker.shutdown().await;

        // The cancelled job never fetched or published anything
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(h.objects.object_count(BUCKET).await, 1);
        assert_eq!(h.jobs.len().await, 1);
        assert!(matches!(h.tracker.get_status(&waiting).await, Err(JobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_full_queue_refuses_submission() {
        let fetcher = Arc::new(GatedFetcher::new());
        let h = harness_with(
            fetcher.clone(),
            JobsConfig {
                max_concurrent: 1,
                queue_capacity: 1,
            },
        );

        let mut accepted = Vec::new();
        let err = loop {
            assert!(accepted.len() < 10, "queue never filled");
            match h
                .tracker
                .submit(request(vec!["https://cdn.test/a.png".into()], None))
                .await
            {
                Ok(view) => accepted.push(view.job_id.to_string()),
                Err(e) => break e,
            }
        };

        assert!(matches!(err, JobError::QueueFull));
        assert_eq!(err.status_code(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
        // The refused job left no record behind
        assert_eq!(h.jobs.len().await, accepted.len());

        fetcher.open(accepted.len());
        for id in &accepted {
            assert_eq!(wait_finished(&h.tracker, id).await.status, JobStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_cancel_finished_job_conflicts() {
        let h = harness(Arc::new(StaticFetcher::new()));
        let job_id = h
            .tracker
            .submit(request(vec![png_data_uri(4, 4)], None))
            .await
            .unwrap()
            .job_id
            .to_string();
        wait_finished(&h.tracker, &job_id).await;

        let err = h.tracker.cancel(&job_id).await.unwrap_err();
        assert!(matches!(err, JobError::AlreadyFinished(_)));
        assert_eq!(
            h.tracker.get_status(&job_id).await.unwrap().status,
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_concurrency_limit() {
        let fetcher = Arc::new(GatedFetcher::new());
        let h = harness_with(
            fetcher.clone(),
            JobsConfig {
                max_concurrent: 1,
                queue_capacity: 8,
            },
        );

        let mut ids = Vec::new();
        for _ in 0..2 {
            let view = h
                .tracker
                .submit(request(vec!["https://cdn.test/a.png".into()], None))
                .await
                .unwrap();
            ids.push(view.job_id.to_string());
        }

        wait_for_calls(&fetcher, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fetcher.calls(), 1);

        fetcher.open(2);
        for id in &ids {
            assert_eq!(wait_finished(&h.tracker, id).await.status, JobStatus::Completed);
        }
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_list_jobs_by_owner() {
        let h = harness(Arc::new(StaticFetcher::new()));
        for (owner, title) in [("alice", "One"), ("bob", "Two"), ("alice", "Three")] {
            h.tracker
                .submit(SubmitRequest {
                    image_refs: vec![png_data_uri(2, 2)],
                    title: Some(title.into()),
                    owner_id: Some(owner.into()),
                })
                .await
                .unwrap();
        }
        h.tracker.submit(request(vec![png_data_uri(2, 2)], None)).await.unwrap();

        let titles: Vec<String> = h
            .tracker
            .list_jobs("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["One", "Three"]);

        let anonymous = h.tracker.list_jobs(DEFAULT_OWNER).await.unwrap();
        assert_eq!(anonymous.len(), 1);
        assert_eq!(anonymous[0].title, DEFAULT_TITLE);
        assert_eq!(anonymous[0].image_count, 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_queue() {
        let h = harness(Arc::new(StaticFetcher::new()));
        let job_id = h
            .tracker
            .submit(request(vec![png_data_uri(4, 4)], None))
            .await
            .unwrap()
            .job_id
            .to_string();

        h.tracker.shutdown().await;
        // In-flight work was drained
        assert!(h.tracker.get_status(&job_id).await.unwrap().status.is_terminal());

        let err = h
            .tracker
            .submit(request(vec![png_data_uri(4, 4)], None))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::QueueClosed));
    }
}
