//! Job persistence port and its in-memory implementation

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::types::{GenerationJob, JobId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} already exists")]
    Duplicate(JobId),

    #[error("job {0} does not exist")]
    Missing(JobId),

    #[error("job {0} is finished and cannot be modified")]
    Finished(JobId),
}

/// Job table. Backends must keep each call atomic with respect to the others.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: GenerationJob) -> Result<(), StoreError>;

    async fn get(&self, id: JobId) -> Result<Option<GenerationJob>, StoreError>;

    /// Replace a stored job. Fails with `Missing` if it was deleted and with
    /// `Finished` if the stored record is already terminal.
    async fn update(&self, job: GenerationJob) -> Result<(), StoreError>;

    /// Remove a job, returning the record that was removed
    async fn delete(&self, id: JobId) -> Result<Option<GenerationJob>, StoreError>;

    /// Jobs of one owner in creation order
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<GenerationJob>, StoreError>;
}

#[derive(Default)]
struct JobTable {
    jobs: HashMap<JobId, GenerationJob>,
    order: Vec<JobId>,
}

/// Process-local job table; records live until deleted
#[derive(Default)]
pub struct InMemoryJobStore {
    table: RwLock<JobTable>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.jobs.len()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: GenerationJob) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        if table.jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(job.id));
        }
        table.order.push(job.id);
        table.jobs.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<GenerationJob>, StoreError> {
        Ok(self.table.read().await.jobs.get(&id).cloned())
    }

    async fn update(&self, job: GenerationJob) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        let stored = table
            .jobs
            .get_mut(&job.id)
            .ok_or(StoreError::Missing(job.id))?;
        if stored.status.is_terminal() {
            return Err(StoreError::Finished(job.id));
        }
        *stored = job;
        Ok(())
    }

    async fn delete(&self, id: JobId) -> Result<Option<GenerationJob>, StoreError> {
        let mut table = self.table.write().await;
        let removed = table.jobs.remove(&id);
        if removed.is_some() {
            table.order.retain(|existing| *existing != id);
        }
        Ok(removed)
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<GenerationJob>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .order
            .iter()
            .filter_map(|id| table.jobs.get(id))
            .filter(|job| job.owner_id == owner_id)
            .cloned()
            .collect())
    }
}
