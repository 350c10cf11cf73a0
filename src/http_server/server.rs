//! # HTTP Server
//!
//! Combines the route groups behind the context middleware. `/health`
//! is mounted outside it; everything under `/api` needs `x-tenant-id`.

use std::future::Future;
use std::net::SocketAddr;

use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::config::HttpServerConfig;
use super::context::scope_context;
use super::explain_routes::explain_routes;
use super::fact_routes::fact_routes;
use super::impact_routes::impact_routes;
use super::ops_routes::{health_routes, ops_routes};
use crate::errors::{FactlineError, FactlineResult};
use crate::pipeline::Pipeline;

pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, pipeline: Pipeline) -> Self {
        let router = Self::build_router(&config, pipeline);
        Self { config, router }
    }

    fn build_router(config: &HttpServerConfig, pipeline: Pipeline) -> Router {
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        let api = Router::new()
            .nest("/facts", fact_routes(pipeline.clone()))
            .nest("/explanations", explain_routes(pipeline.clone()))
            .nest("/impact", impact_routes(pipeline.clone()))
            .nest("/ops", ops_routes(pipeline))
            .layer(middleware::from_fn(scope_context));

        Router::new()
            .merge(health_routes())
            .nest("/api", api)
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// The assembled router (for tests)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(self, shutdown: F) -> FactlineResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self
            .config
            .socket_addr()
            .parse()
            .map_err(|e| FactlineError::Config(format!("invalid socket address {}: {}", self.config.socket_addr(), e)))?;

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "factline HTTP server listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("factline HTTP server stopped");
        Ok(())
    }
}
