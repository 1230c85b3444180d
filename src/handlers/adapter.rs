//! Uniform wrapper around every resource handler.
//!
//! # Responsibilities
//! - Extract RPC parameters from path, query and body
//! - Build the RPC envelope with a fresh correlation id
//! - Invoke the inner handler, containing panics
//! - Translate the handler's response into a status and JSON body
//!
//! # Design Decisions
//! - Applied by `RouteTable::connect`, so no route can skip it
//! - Client-error codes render with the error object as body
//! - Server-error or unknown codes become a generic 500
//! - A successful PUT is 201 unless the route is tagged member-add

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use futures_util::FutureExt;
use serde_json::Value;

use crate::bus::channel::CorrelationId;
use crate::bus::envelope::{RpcOutcome, RpcRequest, RpcResponse};
use crate::bus::error::ProtocolError;
use crate::dispatcher::codes::ErrorCodeTable;
use crate::dispatcher::params::extract_params;
use crate::error::GatewayError;
use crate::handlers::{Handler, HandlerContext};
use crate::routing::PathParams;

/// The HTTP side of one call, as seen by the adapter.
#[derive(Debug, Clone, Copy)]
pub struct HttpCall<'a> {
    pub method: &'a Method,
    pub path_params: &'a PathParams,
    pub query: Option<&'a str>,
    pub body: &'a [u8],
}

/// A translated handler result.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: Value,
}

impl IntoResponse for HttpReply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Wraps an inner handler with extraction and translation.
#[derive(Clone)]
pub struct JsonRpcHandler {
    inner: Arc<dyn Handler>,
    member_add: bool,
}

impl JsonRpcHandler {
    pub fn new(inner: Arc<dyn Handler>) -> Self {
        Self {
            inner,
            member_add: false,
        }
    }

    pub(crate) fn set_member_add(&mut self, member_add: bool) {
        self.member_add = member_add;
    }

    pub fn is_member_add(&self) -> bool {
        self.member_add
    }

    /// Run the wrapped handler for one HTTP call.
    pub async fn handle(&self, call: HttpCall<'_>, ctx: HandlerContext) -> Result<HttpReply, GatewayError> {
        let params = extract_params(call.method, call.path_params, call.query, call.body)
            .map_err(|e| GatewayError::BadRequest(e.to_string()))?;

        let request = RpcRequest::new(
            CorrelationId::new().as_str(),
            call.method.as_str(),
            Value::Object(params),
        );
        tracing::debug!(
            id = %request.id,
            routing_key = %ctx.routing_key,
            params = %request.params,
            "Request transformed"
        );

        let codes = ctx.codes.clone();
        let invocation = self.inner.call(request.clone(), ctx);
        let response = match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(Ok(response)) => response,
            Ok(Err(bus_error)) => return Err(GatewayError::Bus(bus_error)),
            Err(panic) => return Err(GatewayError::Handler(panic_message(panic.as_ref()))),
        };

        self.translate(call.method, &request, response, &codes)
    }

    fn translate(
        &self,
        method: &Method,
        request: &RpcRequest,
        response: RpcResponse,
        codes: &ErrorCodeTable,
    ) -> Result<HttpReply, GatewayError> {
        if response.id != request.id {
            return Err(ProtocolError::CorrelationMismatch {
                expected: request.id.clone(),
                actual: response.id,
            }
            .into());
        }

        match response.into_outcome()? {
            RpcOutcome::Result(result) => {
                let status = if *method == Method::PUT && !self.member_add {
                    StatusCode::CREATED
                } else {
                    StatusCode::OK
                };
                Ok(HttpReply { status, body: result })
            }
            RpcOutcome::Error(error) => match codes.status_for(error.code) {
                Some(status) if status.is_client_error() => {
                    tracing::debug!(id = %request.id, code = error.code, status = %status, "Application error");
                    let body = serde_json::to_value(&error).unwrap_or(Value::Null);
                    Ok(HttpReply { status, body })
                }
                _ => Err(GatewayError::Application(error)),
            },
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::client::BusClient;
    use crate::bus::envelope::RpcError;
    use crate::bus::memory::MemoryBroker;
    use crate::handlers::HandlerResult;
    use serde_json::json;
    use std::time::Duration;

    fn context() -> HandlerContext {
        HandlerContext {
            bus: BusClient::new(Arc::new(MemoryBroker::new()), Duration::from_millis(50)),
            codes: Arc::new(ErrorCodeTable::standard()),
            routing_key: "test.route".into(),
        }
    }

    async fn call(handler: JsonRpcHandler, method: Method, body: &[u8]) -> Result<HttpReply, GatewayError> {
        let path_params = PathParams::default();
        let call = HttpCall {
            method: &method,
            path_params: &path_params,
            query: None,
            body,
        };
        handler.handle(call, context()).await
    }

    async fn echo(request: RpcRequest, _ctx: HandlerContext) -> HandlerResult {
        let params = request.params.clone();
        Ok(RpcResponse::success(request.id, params))
    }

    async fn not_found(request: RpcRequest, ctx: HandlerContext) -> HandlerResult {
        Ok(RpcResponse::failure(request.id, ctx.codes.error("NOT_FOUND", "missing")))
    }

    async fn internal(request: RpcRequest, _ctx: HandlerContext) -> HandlerResult {
        Ok(RpcResponse::failure(request.id, RpcError::new(-32603, "boom")))
    }

    async fn wrong_id(_request: RpcRequest, _ctx: HandlerContext) -> HandlerResult {
        Ok(RpcResponse::success("someone-else", json!(1)))
    }

    async fn panics(_request: RpcRequest, _ctx: HandlerContext) -> HandlerResult {
        panic!("handler bug")
    }

    #[tokio::test]
    async fn test_put_is_created_unless_member_add() {
        let reply = call(JsonRpcHandler::new(Arc::new(echo)), Method::PUT, br#"{"a": 1}"#)
            .await
            .unwrap();
        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.body, json!({"a": 1}));

        let mut member_add = JsonRpcHandler::new(Arc::new(echo));
        member_add.set_member_add(true);
        let reply = call(member_add, Method::PUT, b"").await.unwrap();
        assert_eq!(reply.status, StatusCode::OK);

        let reply = call(JsonRpcHandler::new(Arc::new(echo)), Method::GET, b"").await.unwrap();
        assert_eq!(reply.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_client_error_code_maps_to_status() {
        let reply = call(JsonRpcHandler::new(Arc::new(not_found)), Method::GET, b"")
            .await
            .unwrap();
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body, json!({"code": 404, "message": "missing"}));
    }

    #[tokio::test]
    async fn test_server_error_code_is_internal() {
        let err = call(JsonRpcHandler::new(Arc::new(internal)), Method::GET, b"")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Application(ref e) if e.code == -32603));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let err = call(JsonRpcHandler::new(Arc::new(echo)), Method::PUT, b"{oops")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_mismatched_response_id_is_protocol_error() {
        let err = call(JsonRpcHandler::new(Arc::new(wrong_id)), Method::GET, b"")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Protocol(ProtocolError::CorrelationMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let err = call(JsonRpcHandler::new(Arc::new(panics)), Method::GET, b"")
            .await
            .unwrap_err();
        match err {
            GatewayError::Handler(message) => assert_eq!(message, "handler bug"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bus_timeout_surfaces_as_bus_error() {
        async fn unanswered(request: RpcRequest, ctx: HandlerContext) -> HandlerResult {
            crate::handlers::forward(&request, &ctx).await
        }
        let err = call(JsonRpcHandler::new(Arc::new(unanswered)), Method::PUT, b"")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Bus(ref e) if e.is_bad_gateway()));
    }
}
