//! # Job Queue
//!
//! Durable-queue contract plus an in-process implementation with retry,
//! exponential backoff and bounded retention of finished jobs.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures_util::future::{self, BoxFuture, FutureExt};
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::errors::{JobError, JobResult};
use super::payload::{Job, JobOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: Uuid,
    pub job: Job,
    pub options: JobOptions,
    pub state: JobState,
    /// Runs started so far
    pub attempts_made: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Not claimable before this instant
    ready_at: Instant,
}

impl JobRecord {
    fn new(job: Job, options: JobOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            options,
            state: JobState::Waiting,
            attempts_made: 0,
            last_error: None,
            enqueued_at: Utc::now(),
            finished_at: None,
            ready_at: Instant::now(),
        }
    }

    fn is_due(&self, queue: &str, now: Instant) -> bool {
        self.state == JobState::Waiting && self.job.queue() == queue && self.ready_at <= now
    }
}

/// Queue runtime seen by producers and workers
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: Job, options: JobOptions) -> BoxFuture<'_, JobResult<Uuid>>;

    /// Take the oldest due job of `queue` and mark it active
    fn claim<'a>(&'a self, queue: &'a str) -> BoxFuture<'a, JobResult<Option<JobRecord>>>;

    fn complete(&self, id: Uuid) -> BoxFuture<'_, JobResult<()>>;

    /// Record a failed run. Returns `Waiting` when a retry is scheduled,
    /// `Failed` when attempts are exhausted.
    fn fail(&self, id: Uuid, error: String) -> BoxFuture<'_, JobResult<JobState>>;

    fn get(&self, id: Uuid) -> BoxFuture<'_, JobResult<Option<JobRecord>>>;
}

#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<VecDeque<JobRecord>>,
    notify: Notify,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until something is enqueued or a retry is scheduled
    pub async fn notified(&self) {
        self.notify.notified().await
    }

    /// Every retained record, oldest first
    pub fn records(&self) -> Vec<JobRecord> {
        self.jobs
            .lock()
            .map(|jobs| jobs.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, queue: &str, state: JobState) -> usize {
        self.jobs
            .lock()
            .map(|jobs| {
                jobs.iter()
                    .filter(|r| r.job.queue() == queue && r.state == state)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Earliest instant a waiting job of `queue` becomes due
    pub fn next_ready_at(&self, queue: &str) -> Option<Instant> {
        self.jobs.lock().ok().and_then(|jobs| {
            jobs.iter()
                .filter(|r| r.state == JobState::Waiting && r.job.queue() == queue)
                .map(|r| r.ready_at)
                .min()
        })
    }

    fn lock(&self) -> JobResult<std::sync::MutexGuard<'_, VecDeque<JobRecord>>> {
        self.jobs
            .lock()
            .map_err(|_| JobError::Internal("Lock poisoned".into()))
    }

    fn enqueue_sync(&self, job: Job, options: JobOptions) -> JobResult<Uuid> {
        if options.attempts == 0 {
            return Err(JobError::InvalidJob("attempts must be at least 1".into()));
        }
        let record = JobRecord::new(job, options);
        let id = record.id;
        self.lock()?.push_back(record);
        self.notify.notify_waiters();
        Ok(id)
    }

    fn claim_sync(&self, queue: &str) -> JobResult<Option<JobRecord>> {
        let now = Instant::now();
        let mut jobs = self.lock()?;
        Ok(jobs.iter_mut().find(|r| r.is_due(queue, now)).map(|record| {
            record.state = JobState::Active;
            record.attempts_made += 1;
            record.clone()
        }))
    }

    fn finish(&self, id: Uuid, error: Option<String>) -> JobResult<JobState> {
        let mut jobs = self.lock()?;
        let record = jobs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        if record.state != JobState::Active {
            return Err(JobError::InvalidJob(format!("job {} is not active", id)));
        }

        let state = match error {
            None => JobState::Completed,
            Some(error) => {
                record.last_error = Some(error);
                if record.attempts_made < record.options.attempts {
                    record.ready_at = Instant::now() + record.options.backoff(record.attempts_made);
                    JobState::Waiting
                } else {
                    JobState::Failed
                }
            }
        };
        record.state = state;
        if state != JobState::Waiting {
            record.finished_at = Some(Utc::now());
        }

        let queue = record.job.queue();
        let keep = match state {
            JobState::Completed => Some(record.options.keep_completed),
            JobState::Failed => Some(record.options.keep_failed),
            _ => None,
        };
        if let Some(keep) = keep {
            trim(&mut jobs, queue, state, keep);
        }
        drop(jobs);

        if state == JobState::Waiting {
            self.notify.notify_waiters();
        }
        Ok(state)
    }

    fn get_sync(&self, id: Uuid) -> JobResult<Option<JobRecord>> {
        Ok(self.lock()?.iter().find(|r| r.id == id).cloned())
    }
}

/// Drop the oldest finished records of one queue beyond `keep`
fn trim(jobs: &mut VecDeque<JobRecord>, queue: &str, state: JobState, keep: usize) {
    let matching = jobs
        .iter()
        .filter(|r| r.state == state && r.job.queue() == queue)
        .count();
    let mut excess = matching.saturating_sub(keep);
    jobs.retain(|r| {
        if excess > 0 && r.state == state && r.job.queue() == queue {
            excess -= 1;
            false
        } else {
            true
        }
    });
}

impl JobQueue for MemoryJobQueue {
    fn enqueue(&self, job: Job, options: JobOptions) -> BoxFuture<'_, JobResult<Uuid>> {
        future::ready(self.enqueue_sync(job, options)).boxed()
    }

    fn claim<'a>(&'a self, queue: &'a str) -> BoxFuture<'a, JobResult<Option<JobRecord>>> {
        future::ready(self.claim_sync(queue)).boxed()
    }

    fn complete(&self, id: Uuid) -> BoxFuture<'_, JobResult<()>> {
        future::ready(self.finish(id, None).map(|_| ())).boxed()
    }

    fn fail(&self, id: Uuid, error: String) -> BoxFuture<'_, JobResult<JobState>> {
        future::ready(self.finish(id, Some(error))).boxed()
    }

    fn get(&self, id: Uuid) -> BoxFuture<'_, JobResult<Option<JobRecord>>> {
        future::ready(self.get_sync(id)).boxed()
    }
}
