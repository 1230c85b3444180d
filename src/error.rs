//! Gateway errors and their HTTP rendering.
//!
//! `GatewayError::into_response` is the only place a failure becomes a
//! status and body. Internal details are logged by the dispatcher and never
//! written to the client.

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::bus::envelope::RpcError;
use crate::bus::error::{BusError, ProtocolError};
use crate::dispatcher::codes::INVALID_REQUEST_CODE;

/// Any failure that ends a request without a translated handler reply.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no route for {method} {path}")]
    RouteNotFound { method: Method, path: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("unmapped application error {}: {}", .0.code, .0.message)]
    Application(RpcError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Bus(e) if e.is_bad_gateway() => StatusCode::BAD_GATEWAY,
            GatewayError::Bus(_)
            | GatewayError::Protocol(_)
            | GatewayError::Handler(_)
            | GatewayError::Application(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            GatewayError::RouteNotFound { .. } => (status, "Not Found").into_response(),
            GatewayError::BadRequest(message) => (
                status,
                Json(json!({ "code": INVALID_REQUEST_CODE, "message": message })),
            )
                .into_response(),
            _ if status == StatusCode::BAD_GATEWAY => (status, "Bad Gateway").into_response(),
            _ => (status, "Internal Server Error").into_response(),
        }
    }
}
