//! Asynchronous generation jobs
//!
//! A submission becomes a [`GenerationJob`] in the [`JobStore`], is queued
//! for the background dispatcher, and is polled by clients until it reaches
//! `completed` or `failed`.

mod cancel;
mod store;
mod tracker;
mod types;
mod worker;

pub use cancel::CancelToken;
pub use store::{InMemoryJobStore, JobStore, StoreError};
pub use tracker::{Download, JobTracker};
pub use types::{
    GenerationJob, JobError, JobId, JobStatus, JobStatusView, JobSummary, SubmitRequest,
    DEFAULT_OWNER, MAX_IMAGES_PER_JOB, MAX_TITLE_CHARS,
};
