//! Request Context
//!
//! Tenant, actor and correlation identity carried through every pipeline
//! call. Passed explicitly as `&RequestContext`; the HTTP layer additionally
//! scopes it to the handling task so handlers can fetch it with [`current`].

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client id used when no user is attached to the context.
pub const SERVICE_ACTOR: &str = "SERVICE";

/// Context errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// Context was read outside of an established scope
    #[error("Request context missing: {0}")]
    Missing(String),

    /// A field required by the caller was empty
    #[error("Request context invalid: {0}")]
    Invalid(String),
}

/// Result type for context operations
pub type ContextResult<T> = Result<T, ContextError>;

/// Per-request identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    tenant_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    actor_user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

impl RequestContext {
    /// Create a context for a tenant, acting as the service
    pub fn new(tenant_id: impl Into<String>) -> ContextResult<Self> {
        let tenant_id = tenant_id.into();
        if tenant_id.trim().is_empty() {
            return Err(ContextError::Invalid("tenant id is empty".into()));
        }

        Ok(Self {
            tenant_id,
            actor_user_id: None,
            roles: Vec::new(),
            correlation_id: None,
        })
    }

    /// Attach a user actor
    pub fn with_actor(mut self, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        self.actor_user_id = if user_id.trim().is_empty() {
            None
        } else {
            Some(user_id)
        };
        self
    }

    /// Attach actor roles
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    /// Attach a correlation id
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Attach an optional correlation id
    pub fn with_correlation_opt(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn actor_user_id(&self) -> Option<&str> {
        self.actor_user_id.as_deref()
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Actor id or `SERVICE` for rate-limit scoping
    pub fn actor_scope(&self) -> &str {
        self.actor_user_id.as_deref().unwrap_or(SERVICE_ACTOR)
    }

    /// Audit actor for this context; `client_id` names the service when no user is present
    pub fn actor(&self, client_id: &str) -> Actor {
        match &self.actor_user_id {
            Some(user_id) => Actor::User {
                user_id: user_id.clone(),
                roles: self.roles.clone(),
            },
            None => Actor::Service {
                client_id: client_id.to_string(),
            },
        }
    }
}

/// Who performed an audited action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Actor {
    #[serde(rename_all = "camelCase")]
    User { user_id: String, roles: Vec<String> },

    #[serde(rename_all = "camelCase")]
    Service { client_id: String },
}

impl Actor {
    /// A service actor
    pub fn service(client_id: impl Into<String>) -> Self {
        Actor::Service {
            client_id: client_id.into(),
        }
    }
}

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// Run `fut` with `ctx` as the task's current context.
pub async fn scope<F>(ctx: RequestContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(ctx, fut).await
}

/// The context established for the running task.
///
/// Reading outside of [`scope`] is a wiring bug and fails loudly.
pub fn current() -> ContextResult<RequestContext> {
    CURRENT
        .try_with(|ctx| ctx.clone())
        .map_err(|_| ContextError::Missing("no request context established for this task".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tenant_rejected() {
        assert!(matches!(
            RequestContext::new("  "),
            Err(ContextError::Invalid(_))
        ));
    }

    #[test]
    fn test_actor_scope_defaults_to_service() {
        let ctx = RequestContext::new("t1").unwrap();
        assert_eq!(ctx.actor_scope(), "SERVICE");
        assert_eq!(ctx.actor("fact-engine"), Actor::service("fact-engine"));

        let ctx = ctx.with_actor("u1").with_roles(vec!["TRADING_ANALYST".into()]);
        assert_eq!(ctx.actor_scope(), "u1");
        assert!(matches!(ctx.actor("x"), Actor::User { ref user_id, .. } if user_id == "u1"));
    }

    #[test]
    fn test_actor_serializes_tagged() {
        let json = serde_json::to_value(Actor::service("ai-gateway-service")).unwrap();
        assert_eq!(json["type"], "SERVICE");
        assert_eq!(json["clientId"], "ai-gateway-service");
    }

    #[test]
    fn test_current_outside_scope_fails() {
        assert!(matches!(current(), Err(ContextError::Missing(_))));
    }

    #[tokio::test]
    async fn test_scope_is_task_local() {
        let ctx = RequestContext::new("tenant-a").unwrap().with_correlation("c-1");
        let seen = scope(ctx.clone(), async { current() }).await.unwrap();
        assert_eq!(seen, ctx);

        // A spawned task does not inherit the scope
        let leaked = scope(ctx, async { tokio::spawn(async { current() }).await })
            .await
            .unwrap();
        assert!(leaked.is_err());
    }
}
