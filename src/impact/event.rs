//! # Impact Events
//!
//! What changed, which downstream fact domains it is assumed to touch, and
//! the append-only store of those decisions.

use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use futures_util::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{ImpactError, ImpactResult};

pub const REASON_SOURCE_CHANGED: &str = "SOURCE_CHANGED_DOCUMENT_OR_AMENDMENT";
pub const REASON_FACTS_MAY_BE_STALE: &str = "DOWNSTREAM_FACTS_MAY_BE_STALE";

/// Default page size of impact queries
pub const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Document,
    Amendment,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Document => "DOCUMENT",
            SourceType::Amendment => "AMENDMENT",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = ImpactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DOCUMENT" => Ok(SourceType::Document),
            "AMENDMENT" => Ok(SourceType::Amendment),
            other => Err(ImpactError::Validation(format!("unknown source type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceAction {
    Created,
    Updated,
    Deleted,
}

impl SourceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceAction::Created => "CREATED",
            SourceAction::Updated => "UPDATED",
            SourceAction::Deleted => "DELETED",
        }
    }
}

/// The mutated upstream entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactSource {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub id: String,
    pub action: SourceAction,
}

impl ImpactSource {
    pub fn new(source_type: SourceType, id: impl Into<String>, action: SourceAction) -> Self {
        Self {
            source_type,
            id: id.into(),
            action,
        }
    }
}

/// Downstream recompute intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImpactTarget {
    TradingFactsRecompute {
        #[serde(rename = "loanId")]
        loan_id: String,
    },
    CovenantFactsRecompute {
        #[serde(rename = "loanId")]
        loan_id: String,
    },
    EsgFactsRecompute {
        #[serde(rename = "loanId")]
        loan_id: String,
    },
    PortfolioFactsRecompute,
}

/// Conservative rule: any document or amendment change may affect every
/// loan-level domain plus the portfolio aggregate. Without a loan only the
/// portfolio is targeted.
pub fn detect_targets(loan_id: Option<&str>) -> Vec<ImpactTarget> {
    let mut targets = Vec::with_capacity(4);
    if let Some(loan_id) = loan_id {
        targets.push(ImpactTarget::TradingFactsRecompute {
            loan_id: loan_id.to_string(),
        });
        targets.push(ImpactTarget::CovenantFactsRecompute {
            loan_id: loan_id.to_string(),
        });
        targets.push(ImpactTarget::EsgFactsRecompute {
            loan_id: loan_id.to_string(),
        });
    }
    targets.push(ImpactTarget::PortfolioFactsRecompute);
    targets
}

/// Persisted propagation decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactEvent {
    pub id: Uuid,
    pub tenant_id: String,
    pub source: ImpactSource,
    pub loan_id: Option<String>,
    pub targets: Vec<ImpactTarget>,
    pub reason_codes: Vec<String>,
    pub detected_at: DateTime<Utc>,
    pub correlation_id: Option<String>,
}

impl ImpactEvent {
    pub fn detect(
        tenant_id: impl Into<String>,
        source: ImpactSource,
        loan_id: Option<String>,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            targets: detect_targets(loan_id.as_deref()),
            source,
            loan_id,
            reason_codes: vec![REASON_SOURCE_CHANGED.into(), REASON_FACTS_MAY_BE_STALE.into()],
            detected_at: Utc::now(),
            correlation_id,
        }
    }
}

/// Append-only impact event persistence
pub trait ImpactStore: Send + Sync {
    fn insert(&self, event: ImpactEvent) -> BoxFuture<'_, ImpactResult<()>>;

    /// Newest first
    fn by_loan<'a>(
        &'a self,
        tenant_id: &'a str,
        loan_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, ImpactResult<Vec<ImpactEvent>>>;

    /// Newest first
    fn by_source<'a>(
        &'a self,
        tenant_id: &'a str,
        source_type: SourceType,
        source_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, ImpactResult<Vec<ImpactEvent>>>;
}

#[derive(Debug, Default)]
pub struct MemoryImpactStore {
    events: RwLock<Vec<ImpactEvent>>,
}

impl MemoryImpactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn query(&self, limit: usize, pred: impl Fn(&ImpactEvent) -> bool) -> ImpactResult<Vec<ImpactEvent>> {
        let events = self
            .events
            .read()
            .map_err(|_| ImpactError::Internal("Lock poisoned".into()))?;
        Ok(events.iter().rev().filter(|e| pred(e)).take(limit).cloned().collect())
    }
}

impl ImpactStore for MemoryImpactStore {
    fn insert(&self, event: ImpactEvent) -> BoxFuture<'_, ImpactResult<()>> {
        let result = self
            .events
            .write()
            .map_err(|_| ImpactError::Internal("Lock poisoned".into()))
            .map(|mut events| events.push(event));
        future::ready(result).boxed()
    }

    fn by_loan<'a>(
        &'a self,
        tenant_id: &'a str,
        loan_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, ImpactResult<Vec<ImpactEvent>>> {
        let result = self.query(limit, |e| {
            e.tenant_id == tenant_id && e.loan_id.as_deref() == Some(loan_id)
        });
        future::ready(result).boxed()
    }

    fn by_source<'a>(
        &'a self,
        tenant_id: &'a str,
        source_type: SourceType,
        source_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, ImpactResult<Vec<ImpactEvent>>> {
        let result = self.query(limit, |e| {
            e.tenant_id == tenant_id && e.source.source_type == source_type && e.source.id == source_id
        });
        future::ready(result).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_targets_wire_shape() {
        let targets = detect_targets(Some("L1"));
        assert_eq!(
            serde_json::to_value(&targets).unwrap(),
            json!([
                { "type": "TRADING_FACTS_RECOMPUTE", "loanId": "L1" },
                { "type": "COVENANT_FACTS_RECOMPUTE", "loanId": "L1" },
                { "type": "ESG_FACTS_RECOMPUTE", "loanId": "L1" },
                { "type": "PORTFOLIO_FACTS_RECOMPUTE" }
            ])
        );
        assert_eq!(detect_targets(None), vec![ImpactTarget::PortfolioFactsRecompute]);
    }

    #[tokio::test]
    async fn test_queries_are_scoped_and_newest_first() {
        let store = MemoryImpactStore::new();
        let doc = |id: &str| ImpactSource::new(SourceType::Document, id, SourceAction::Updated);

        let first = ImpactEvent::detect("t1", doc("D1"), Some("L1".into()), None);
        let second = ImpactEvent::detect("t1", doc("D2"), Some("L1".into()), None);
        let other_tenant = ImpactEvent::detect("t2", doc("D1"), Some("L1".into()), None);
        for e in [first.clone(), second.clone(), other_tenant] {
            store.insert(e).await.unwrap();
        }

        let by_loan = store.by_loan("t1", "L1", DEFAULT_LIMIT).await.unwrap();
        assert_eq!(by_loan.iter().map(|e| e.id).collect::<Vec<_>>(), vec![second.id, first.id]);
        assert_eq!(store.by_loan("t1", "L1", 1).await.unwrap().len(), 1);

        let by_source = store.by_source("t1", SourceType::Document, "D1", DEFAULT_LIMIT).await.unwrap();
        assert_eq!(by_source.len(), 1);
        assert_eq!(by_source[0].id, first.id);
        assert!(store
            .by_source("t1", SourceType::Amendment, "D1", DEFAULT_LIMIT)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_source_type_parse() {
        assert_eq!("amendment".parse::<SourceType>().unwrap(), SourceType::Amendment);
        assert!("invoice".parse::<SourceType>().is_err());
    }
}
