//! # Background Jobs
//!
//! Queue contract, audited producers, drift-triggered recompute, the
//! nightly tenant refresh schedule and the worker that runs it all.

pub mod errors;
pub mod payload;
pub mod producer;
pub mod queue;
pub mod recompute;
pub mod runner;
pub mod schedule;

pub use errors::{JobError, JobResult};
pub use payload::{
    ExplainRecomputeJob, Job, JobName, JobOptions, RefreshReason, TenantRefreshJob, AI_EXPLAIN_QUEUE, OPS_QUEUE,
};
pub use producer::JobProducer;
pub use queue::{JobQueue, JobRecord, JobState, MemoryJobQueue};
pub use recompute::{RecomputeOutcome, Recomputer};
pub use runner::{JobRunner, Processed, RefreshStats};
pub use schedule::{RefreshSchedule, NIGHTLY_REFRESH_CRON};
