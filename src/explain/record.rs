//! # Explanation Records
//!
//! Content-addressed cache of validated gateway outputs. The key hash
//! covers everything that changes the output: tenant, entity, fact hash,
//! audience, verbosity, explain version and generation variant. Records are
//! never updated; a changed fact hash simply produces a different key.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use futures_util::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::errors::{ExplainError, ExplainResult};
use crate::facts::EntityRef;
use crate::gateway::{ExplainOutput, Verbosity};
use crate::hashing;

/// Current explanation format version.
pub const EXPLAIN_VERSION: u32 = 1;

/// Generation variant in the cache key. The backend that served a call is
/// recorded on the row but is not part of the key.
pub const GENERATION_VARIANT: &str = "gateway-v1";

/// Inputs of the explanation hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplanationKey<'a> {
    pub tenant_id: &'a str,
    pub entity: &'a EntityRef,
    pub fact_hash: &'a str,
    pub audience: &'a str,
    pub verbosity: Verbosity,
    pub explain_version: u32,
}

impl ExplanationKey<'_> {
    pub fn to_value(&self) -> Value {
        let mut key = json!({
            "tenantId": self.tenant_id,
            "domain": self.entity.domain().as_str(),
            "factHash": self.fact_hash,
            "audience": self.audience,
            "verbosity": self.verbosity.as_str(),
            "explainVersion": self.explain_version,
            "provider": GENERATION_VARIANT,
        });
        if let (Some(map), Value::Object(ids)) = (key.as_object_mut(), self.entity.id_fields()) {
            map.extend(ids);
        }
        key
    }

    pub fn hash(&self) -> String {
        hashing::hash_value(&self.to_value())
    }
}

/// A persisted explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub entity: EntityRef,
    pub explanation_hash: String,
    /// Fact hash the explanation was generated against
    pub fact_hash: String,
    pub audience: String,
    pub verbosity: Verbosity,
    pub explain_version: u32,
    /// Backend that actually served the call
    pub backend: String,
    pub model: String,
    pub result: ExplainOutput,
    pub created_at: DateTime<Utc>,
    pub correlation_id: Option<String>,
}

/// Unique-by-hash explanation storage
pub trait ExplanationStore: Send + Sync {
    fn find<'a>(
        &'a self,
        tenant_id: &'a str,
        explanation_hash: &'a str,
    ) -> BoxFuture<'a, ExplainResult<Option<ExplanationRecord>>>;

    /// Insert unless the hash exists; returns the stored row either way.
    fn insert_if_absent(&self, record: ExplanationRecord) -> BoxFuture<'_, ExplainResult<ExplanationRecord>>;

    /// Most recent record for an entity, audience and verbosity
    fn latest_for<'a>(
        &'a self,
        tenant_id: &'a str,
        entity: &'a EntityRef,
        audience: &'a str,
        verbosity: Verbosity,
    ) -> BoxFuture<'a, ExplainResult<Option<ExplanationRecord>>>;
}

#[derive(Debug, Default)]
pub struct MemoryExplanationStore {
    records: RwLock<Vec<ExplanationRecord>>,
}

impl MemoryExplanationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_sync(&self, tenant_id: &str, explanation_hash: &str) -> ExplainResult<Option<ExplanationRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| ExplainError::Internal("Lock poisoned".into()))?;
        Ok(records
            .iter()
            .find(|r| r.tenant_id == tenant_id && r.explanation_hash == explanation_hash)
            .cloned())
    }

    fn insert_sync(&self, record: ExplanationRecord) -> ExplainResult<ExplanationRecord> {
        let mut records = self
            .records
            .write()
            .map_err(|_| ExplainError::Internal("Lock poisoned".into()))?;

        if let Some(existing) = records
            .iter()
            .find(|r| r.tenant_id == record.tenant_id && r.explanation_hash == record.explanation_hash)
        {
            return Ok(existing.clone());
        }
        records.push(record.clone());
        Ok(record)
    }

    fn latest_sync(
        &self,
        tenant_id: &str,
        entity: &EntityRef,
        audience: &str,
        verbosity: Verbosity,
    ) -> ExplainResult<Option<ExplanationRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| ExplainError::Internal("Lock poisoned".into()))?;

        // max_by_key keeps the last maximum, so ties go to the later insert
        Ok(records
            .iter()
            .filter(|r| {
                r.tenant_id == tenant_id
                    && &r.entity == entity
                    && r.audience == audience
                    && r.verbosity == verbosity
            })
            .max_by_key(|r| r.created_at)
            .cloned())
    }
}

impl ExplanationStore for MemoryExplanationStore {
    fn find<'a>(
        &'a self,
        tenant_id: &'a str,
        explanation_hash: &'a str,
    ) -> BoxFuture<'a, ExplainResult<Option<ExplanationRecord>>> {
        future::ready(self.find_sync(tenant_id, explanation_hash)).boxed()
    }

    fn insert_if_absent(&self, record: ExplanationRecord) -> BoxFuture<'_, ExplainResult<ExplanationRecord>> {
        future::ready(self.insert_sync(record)).boxed()
    }

    fn latest_for<'a>(
        &'a self,
        tenant_id: &'a str,
        entity: &'a EntityRef,
        audience: &'a str,
        verbosity: Verbosity,
    ) -> BoxFuture<'a, ExplainResult<Option<ExplanationRecord>>> {
        future::ready(self.latest_sync(tenant_id, entity, audience, verbosity)).boxed()
    }
}
