//! Audit Trail
//!
//! Append-only record of every decision the pipeline makes:
//! - every fact computation, and every drift between snapshots
//! - every explanation request, cache hit and generation
//! - every AI call attempt and its terminal outcome
//! - every rate-limit decision, impact detection and job enqueue
//!
//! The sink is the system of record; `tracing` output is diagnostic only.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::{Actor, RequestContext};

/// Audit event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    /// A fact snapshot was computed (new or deduplicated).
    FactComputed,

    /// A newly computed fact hash differs from the previous snapshot.
    FactDriftDetected,

    /// An explanation was requested and missed the cache.
    ExplainRequested,

    /// An explanation was generated and persisted.
    ExplainGenerated,

    /// An explanation was served from the cache.
    ExplainCacheHit,

    /// A generation backend call is about to be made.
    AiCallRequested,

    /// A generation backend call succeeded and validated.
    AiCallCompleted,

    /// A generation backend call failed terminally.
    AiCallFailed,

    /// Rate limiter admitted a call.
    AiRateLimitAllowed,

    /// Rate limiter rejected a call.
    AiRateLimitDenied,

    /// A user forced an explanation recompute.
    AiExplainRecomputeRequested,

    /// An explanation recompute job was enqueued.
    AiJobEnqueued,

    /// An explanation recompute job started running.
    AiJobStarted,

    /// An explanation recompute job finished.
    AiJobCompleted,

    /// An explanation recompute job run failed.
    AiJobFailed,

    /// A source change was mapped to downstream recompute targets.
    ImpactDetected,

    /// An ops job was enqueued.
    OpsJobEnqueued,

    /// An ops job started running.
    OpsJobStarted,

    /// An ops job finished.
    OpsJobCompleted,

    /// An ops job failed.
    OpsJobFailed,
}

impl AuditEventType {
    /// Returns the event type string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::FactComputed => "FACT_COMPUTED",
            AuditEventType::FactDriftDetected => "FACT_DRIFT_DETECTED",
            AuditEventType::ExplainRequested => "EXPLAIN_REQUESTED",
            AuditEventType::ExplainGenerated => "EXPLAIN_GENERATED",
            AuditEventType::ExplainCacheHit => "EXPLAIN_CACHE_HIT",
            AuditEventType::AiCallRequested => "AI_CALL_REQUESTED",
            AuditEventType::AiCallCompleted => "AI_CALL_COMPLETED",
            AuditEventType::AiCallFailed => "AI_CALL_FAILED",
            AuditEventType::AiRateLimitAllowed => "AI_RATE_LIMIT_ALLOWED",
            AuditEventType::AiRateLimitDenied => "AI_RATE_LIMIT_DENIED",
            AuditEventType::AiExplainRecomputeRequested => "AI_EXPLAIN_RECOMPUTE_REQUESTED",
            AuditEventType::AiJobEnqueued => "AI_JOB_ENQUEUED",
            AuditEventType::AiJobStarted => "AI_JOB_STARTED",
            AuditEventType::AiJobCompleted => "AI_JOB_COMPLETED",
            AuditEventType::AiJobFailed => "AI_JOB_FAILED",
            AuditEventType::ImpactDetected => "IMPACT_DETECTED",
            AuditEventType::OpsJobEnqueued => "OPS_JOB_ENQUEUED",
            AuditEventType::OpsJobStarted => "OPS_JOB_STARTED",
            AuditEventType::OpsJobCompleted => "OPS_JOB_COMPLETED",
            AuditEventType::OpsJobFailed => "OPS_JOB_FAILED",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: Uuid,

    pub tenant_id: String,

    #[serde(rename = "type")]
    pub event_type: AuditEventType,

    pub summary: String,

    /// Entity the event is evidence for (loan id, portfolio id, impact id).
    pub evidence_ref: Option<String>,

    pub actor: Actor,

    pub correlation_id: Option<String>,

    pub payload: Value,

    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Create a new event acting as the given service.
    pub fn new(
        tenant_id: impl Into<String>,
        event_type: AuditEventType,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            event_type,
            summary: summary.into(),
            evidence_ref: None,
            actor: Actor::service("factline"),
            correlation_id: None,
            payload: Value::Null,
            recorded_at: Utc::now(),
        }
    }

    /// Create an event scoped to a request: tenant, actor and correlation id
    /// come from `ctx`, `client_id` names the service when no user is present.
    pub fn for_request(
        ctx: &RequestContext,
        client_id: &str,
        event_type: AuditEventType,
        summary: impl Into<String>,
    ) -> Self {
        Self::new(ctx.tenant_id(), event_type, summary)
            .with_actor(ctx.actor(client_id))
            .with_correlation(ctx.correlation_id().map(str::to_string))
    }

    /// Set evidence reference.
    pub fn with_evidence(mut self, evidence_ref: impl Into<String>) -> Self {
        self.evidence_ref = Some(evidence_ref.into());
        self
    }

    /// Set actor.
    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    /// Set correlation id.
    pub fn with_correlation(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Set payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Serialize to a JSON line.
    pub fn to_json(&self) -> io::Result<String> {
        serde_json::to_string(self).map_err(io::Error::from)
    }
}

/// Append-only audit sink.
///
/// `append` must be durable when it returns.
pub trait AuditSink: Send + Sync {
    /// Append an event.
    fn append(&self, event: &AuditEvent) -> io::Result<()>;

    /// Sync buffered events to durable storage.
    fn sync(&self) -> io::Result<()>;
}

/// File-based sink, one JSON event per line, synced after each write.
pub struct FileAuditSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileAuditSink {
    /// Open or create an audit file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Get the audit file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditSink {
    fn append(&self, event: &AuditEvent) -> io::Result<()> {
        let line = event.to_json()?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "audit writer lock poisoned"))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    fn sync(&self) -> io::Result<()> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "audit writer lock poisoned"))?;
        writer.get_ref().sync_all()
    }
}

/// In-memory sink, used by tests and the default server wiring.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, in append order.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Recorded events of one type.
    pub fn of_type(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Number of events of one type.
    pub fn count(&self, event_type: AuditEventType) -> usize {
        self.of_type(event_type).len()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, event: &AuditEvent) -> io::Result<()> {
        self.events
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "audit buffer lock poisoned"))?
            .push(event.clone());
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Shared handle the pipeline records through.
#[derive(Clone)]
pub struct Auditor {
    sink: Arc<dyn AuditSink>,
}

impl Auditor {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record an event; failures propagate to the caller.
    pub fn record(&self, event: AuditEvent) -> io::Result<()> {
        tracing::debug!(
            event_type = event.event_type.as_str(),
            tenant_id = %event.tenant_id,
            evidence_ref = event.evidence_ref.as_deref().unwrap_or(""),
            "audit"
        );
        self.sink.append(&event)
    }

    /// Record an event on a path that is already failing. A sink error is
    /// logged so the original error can still be returned.
    pub fn record_on_failure(&self, event: AuditEvent) {
        let event_type = event.event_type;
        if let Err(e) = self.record(event) {
            tracing::error!(event_type = event_type.as_str(), error = %e, "audit write failed");
        }
    }
}

impl fmt::Debug for Auditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auditor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn ctx() -> RequestContext {
        RequestContext::new("tenant-1")
            .unwrap()
            .with_correlation("corr-1")
    }

    #[test]
    fn test_event_for_request() {
        let event = AuditEvent::for_request(
            &ctx(),
            "fact-engine",
            AuditEventType::FactComputed,
            "computed",
        )
        .with_evidence("L1")
        .with_payload(json!({"factHash": "abc"}));

        assert_eq!(event.tenant_id, "tenant-1");
        assert_eq!(event.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(event.actor, Actor::service("fact-engine"));
        assert_eq!(event.evidence_ref.as_deref(), Some("L1"));
    }

    #[test]
    fn test_event_json_shape() {
        let event = AuditEvent::new("t1", AuditEventType::AiRateLimitDenied, "denied");
        let json: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "AI_RATE_LIMIT_DENIED");
        assert_eq!(json["tenantId"], "t1");
        assert_eq!(json["actor"]["type"], "SERVICE");
    }

    #[test]
    fn test_type_strings_match_serde() {
        for t in [
            AuditEventType::FactDriftDetected,
            AuditEventType::AiExplainRecomputeRequested,
            AuditEventType::OpsJobFailed,
        ] {
            assert_eq!(serde_json::to_value(t).unwrap(), json!(t.as_str()));
        }
    }

    #[test]
    fn test_memory_sink_filters() {
        let sink = MemoryAuditSink::new();
        sink.append(&AuditEvent::new("t", AuditEventType::AiCallRequested, "a"))
            .unwrap();
        sink.append(&AuditEvent::new("t", AuditEventType::AiCallCompleted, "b"))
            .unwrap();
        sink.append(&AuditEvent::new("t", AuditEventType::AiCallRequested, "c"))
            .unwrap();

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.count(AuditEventType::AiCallRequested), 2);
        assert_eq!(sink.events()[1].event_type, AuditEventType::AiCallCompleted);
    }

    #[test]
    fn test_file_sink_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit").join("events.jsonl");

        {
            let sink = FileAuditSink::open(&path).unwrap();
            sink.append(&AuditEvent::new("t", AuditEventType::ImpactDetected, "one"))
                .unwrap();
            sink.append(&AuditEvent::new("t", AuditEventType::OpsJobEnqueued, "two"))
                .unwrap();
            sink.sync().unwrap();
        }

        // Reopening appends rather than truncates
        let sink = FileAuditSink::open(&path).unwrap();
        sink.append(&AuditEvent::new("t", AuditEventType::OpsJobStarted, "three"))
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        let last: AuditEvent = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last.event_type, AuditEventType::OpsJobStarted);
    }

    #[test]
    fn test_auditor_forwards() {
        let sink = Arc::new(MemoryAuditSink::new());
        let auditor = Auditor::new(sink.clone());
        auditor
            .record(AuditEvent::new("t", AuditEventType::ExplainCacheHit, "hit"))
            .unwrap();
        auditor.record_on_failure(AuditEvent::new("t", AuditEventType::AiCallFailed, "x"));
        assert_eq!(sink.len(), 2);
    }
}
