//! HTTP error mapping

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::FactlineError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub status: u16,
}

/// Any crate error on its way out as JSON
#[derive(Debug)]
pub struct ApiError(pub FactlineError);

impl<E> From<E> for ApiError
where
    E: Into<FactlineError>,
{
    fn from(e: E) -> Self {
        ApiError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, code = self.0.code(), "request failed");
        } else {
            tracing::debug!(error = %self.0, code = self.0.code(), "request rejected");
        }

        let retry_after = self.0.retry_after();
        let body = ErrorResponse {
            error: self.0.to_string(),
            code: self.0.code(),
            status: status.as_u16(),
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
