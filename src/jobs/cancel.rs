use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::types::JobId;

/// Shared flag set when a client cancels a job.
///
/// Checked cooperatively by the composer between pages and by the worker
/// before publishing; nothing is interrupted mid-request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tokens of jobs that are still running, shared by the tracker and its workers
#[derive(Clone, Default)]
pub(crate) struct CancelRegistry(Arc<Mutex<HashMap<JobId, CancelToken>>>);

impl CancelRegistry {
    pub fn register(&self, job_id: JobId) -> CancelToken {
        let token = CancelToken::new();
        self.tokens().insert(job_id, token.clone());
        token
    }

    /// Remove and return a job's token
    pub fn take(&self, job_id: JobId) -> Option<CancelToken> {
        self.tokens().remove(&job_id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tokens().len()
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<JobId, CancelToken>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
