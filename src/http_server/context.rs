//! Request context middleware
//!
//! Builds a [`RequestContext`] from the identity headers and scopes it to
//! the handling task. Requests without a tenant are rejected here.

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

use super::errors::ApiError;
use crate::context::{self, RequestContext};
use crate::errors::FactlineError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ACTOR_HEADER: &str = "x-actor-id";
pub const ROLES_HEADER: &str = "x-actor-roles";
pub const CORRELATION_HEADER: &str = "x-correlation-id";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Context for a request; a correlation id is minted when absent
pub fn context_from_headers(headers: &HeaderMap) -> Result<RequestContext, FactlineError> {
    let tenant = header(headers, TENANT_HEADER)
        .ok_or_else(|| FactlineError::MissingContext(format!("{} header is required", TENANT_HEADER)))?;

    let mut ctx = RequestContext::new(tenant)?.with_correlation(
        header(headers, CORRELATION_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
    );
    if let Some(actor) = header(headers, ACTOR_HEADER) {
        ctx = ctx.with_actor(actor);
    }
    if let Some(roles) = header(headers, ROLES_HEADER) {
        ctx = ctx.with_roles(
            roles
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect(),
        );
    }
    Ok(ctx)
}

pub async fn scope_context(req: Request, next: Next) -> Result<Response, ApiError> {
    let ctx = context_from_headers(req.headers())?;
    let span = tracing::debug_span!(
        "request",
        tenant_id = %ctx.tenant_id(),
        correlation_id = ctx.correlation_id().unwrap_or_default(),
    );
    Ok(context::scope(ctx, next.run(req)).instrument(span).await)
}

/// Context of the running request
pub fn current() -> Result<RequestContext, ApiError> {
    Ok(context::current()?)
}
