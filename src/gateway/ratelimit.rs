//! # Rate Limiter
//!
//! Fixed-window call counter per `(tenant, actor|SERVICE, module, template)`.
//!
//! INCR the scope key; on the first hit set its expiry to the window; the
//! remaining TTL is the retry hint. A fixed window admits up to twice the
//! nominal rate across a window boundary.
//!
//! The counter sits behind [`RateCounter`] so a shared store can back it
//! across processes; [`MemoryRateCounter`] covers a single process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{self, BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;

use super::errors::{GatewayError, GatewayResult};
use super::policy::Module;
use super::prompts::TemplateId;
use crate::config::{RateLimitConfig, WindowLimit};
use crate::context::RequestContext;
use crate::observability::{AuditEvent, AuditEventType, Auditor};

/// Client id on rate-limit audit events.
pub const RATE_LIMIT_CLIENT: &str = "ai-ratelimit-service";

/// TTL reported for a key with no expiry.
pub const TTL_NO_EXPIRY: i64 = -1;

/// TTL reported for a missing key.
pub const TTL_MISSING: i64 = -2;

/// Atomic counter with per-key expiry
pub trait RateCounter: Send + Sync {
    /// Increment and return the post-increment value
    fn incr<'a>(&'a self, key: &'a str) -> BoxFuture<'a, GatewayResult<u64>>;

    /// Set the key's time to live
    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> BoxFuture<'a, GatewayResult<()>>;

    /// Remaining whole seconds, or [`TTL_NO_EXPIRY`] / [`TTL_MISSING`]
    fn ttl<'a>(&'a self, key: &'a str) -> BoxFuture<'a, GatewayResult<i64>>;
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.map(|t| t <= now).unwrap_or(false)
    }
}

/// In-process counter on tokio's clock
#[derive(Debug, Default)]
pub struct MemoryRateCounter {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryRateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn incr_sync(&self, key: &str) -> GatewayResult<u64> {
        let now = Instant::now();
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| GatewayError::Internal("Lock poisoned".into()))?;

        // Expired windows are dropped, not reset in place
        entries.retain(|_, entry| !entry.expired(now));
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            count: 0,
            expires_at: None,
        });
        entry.count += 1;
        Ok(entry.count)
    }

    fn expire_sync(&self, key: &str, ttl: Duration) -> GatewayResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| GatewayError::Internal("Lock poisoned".into()))?;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    fn ttl_sync(&self, key: &str) -> GatewayResult<i64> {
        let now = Instant::now();
        let entries = self
            .entries
            .lock()
            .map_err(|_| GatewayError::Internal("Lock poisoned".into()))?;

        Ok(match entries.get(key) {
            None => TTL_MISSING,
            Some(entry) if entry.expired(now) => TTL_MISSING,
            Some(Entry {
                expires_at: None, ..
            }) => TTL_NO_EXPIRY,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => {
                let remaining = at.saturating_duration_since(now);
                // Round up so a live key never reports 0
                let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                secs as i64
            }
        })
    }
}

impl MemoryRateCounter {
    /// Number of tracked keys, live or not yet swept
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RateCounter for MemoryRateCounter {
    fn incr<'a>(&'a self, key: &'a str) -> BoxFuture<'a, GatewayResult<u64>> {
        future::ready(self.incr_sync(key)).boxed()
    }

    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> BoxFuture<'a, GatewayResult<()>> {
        future::ready(self.expire_sync(key, ttl)).boxed()
    }

    fn ttl<'a>(&'a self, key: &'a str) -> BoxFuture<'a, GatewayResult<i64>> {
        future::ready(self.ttl_sync(key)).boxed()
    }
}

/// An admitted call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateDecision {
    pub key: String,
    pub count: u64,
    pub limit: u64,
    pub window_seconds: u64,
    pub retry_after_seconds: u64,
}

/// Scope key for a call
pub fn scope_key(ctx: &RequestContext, module: Module, template_id: TemplateId) -> String {
    format!(
        "ai:rl:{}:{}:{}:{}",
        ctx.tenant_id(),
        ctx.actor_scope(),
        module.as_str(),
        template_id.as_str()
    )
}

/// Policy-driven limiter with audited decisions
pub struct RateLimiter {
    counter: Arc<dyn RateCounter>,
    policy: RateLimitConfig,
    auditor: Auditor,
}

impl RateLimiter {
    pub fn new(counter: Arc<dyn RateCounter>, policy: RateLimitConfig, auditor: Auditor) -> Self {
        Self {
            counter,
            policy,
            auditor,
        }
    }

    pub fn limit_for(&self, module: Module) -> WindowLimit {
        self.policy.for_module(module)
    }

    /// Count the call and admit or deny it. A denial is audited before
    /// the error is returned.
    pub async fn enforce(
        &self,
        ctx: &RequestContext,
        module: Module,
        template_id: TemplateId,
        evidence_ref: &str,
    ) -> GatewayResult<RateDecision> {
        let limit = self.policy.for_module(module);
        let key = scope_key(ctx, module, template_id);

        let count = self.counter.incr(&key).await?;
        if count == 1 {
            self.counter
                .expire(&key, Duration::from_secs(limit.window_seconds))
                .await?;
        }
        let ttl = self.counter.ttl(&key).await?;
        let retry_after_seconds = if ttl > 0 {
            ttl as u64
        } else {
            limit.window_seconds
        };

        let payload = json!({
            "key": key,
            "count": count,
            "limit": limit.max,
            "windowSeconds": limit.window_seconds,
            "templateId": template_id.as_str(),
            "module": module.as_str(),
            "retryAfterSeconds": retry_after_seconds,
        });

        if count > limit.max {
            self.auditor.record(
                AuditEvent::for_request(
                    ctx,
                    RATE_LIMIT_CLIENT,
                    AuditEventType::AiRateLimitDenied,
                    format!("AI rate limit exceeded for {} ({}/{})", template_id, count, limit.max),
                )
                .with_evidence(evidence_ref)
                .with_payload(payload),
            )?;
            tracing::warn!(key = %key, count, limit = limit.max, retry_after_seconds, "rate limit denied");

            return Err(GatewayError::RateLimitExceeded {
                key,
                retry_after_seconds,
                count,
                limit: limit.max,
            });
        }

        self.auditor.record(
            AuditEvent::for_request(
                ctx,
                RATE_LIMIT_CLIENT,
                AuditEventType::AiRateLimitAllowed,
                format!("AI rate limit allowed for {} ({}/{})", template_id, count, limit.max),
            )
            .with_evidence(evidence_ref)
            .with_payload(payload),
        )?;

        Ok(RateDecision {
            key,
            count,
            limit: limit.max,
            window_seconds: limit.window_seconds,
            retry_after_seconds,
        })
    }
}
