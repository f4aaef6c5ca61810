//! Top-level request router — decodes JSON requests, routes by service,
//! and answers on the session's reply channel.
//!
//! Request: `{"id": "...", "service": "...", "method": "...", "body": {...}}`
//! Response: `{"id": "...", "ok": true, "body": ...}` or
//! `{"id": "...", "ok": false, "error": {"code": "...", "message": "..."}}`

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::dispatcher::{RequestContext, RequestHandler};
use crate::host::{ForegroundArbiter, LifecycleStateMachine};
use crate::ipc::handlers;
use crate::types::{Error, Result};

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: String,
    service: String,
    method: String,
    #[serde(default)]
    body: Value,
}

/// Request handler wired to the host's lifecycle machine and foreground arbiter.
#[derive(Debug, Clone)]
pub struct HostRequestHandler {
    lifecycle: Arc<LifecycleStateMachine>,
    foreground: Arc<ForegroundArbiter>,
}

impl HostRequestHandler {
    pub fn new(lifecycle: Arc<LifecycleStateMachine>, foreground: Arc<ForegroundArbiter>) -> Self {
        Self {
            lifecycle,
            foreground,
        }
    }

    /// Route a decoded request to the appropriate service handler.
    pub async fn route(
        &self,
        ctx: &RequestContext,
        service: &str,
        method: &str,
        body: Value,
    ) -> Result<Value> {
        match service {
            "lifecycle" => handlers::lifecycle::handle(&self.lifecycle, method, body).await,
            "foreground" => handlers::foreground::handle(&self.foreground, ctx, method, body).await,
            _ => Err(Error::not_found(format!("Unknown service: {}", service))),
        }
    }

    async fn respond(&self, ctx: &RequestContext, request: &[u8]) -> Value {
        let request: Request = match serde_json::from_slice(request) {
            Ok(request) => request,
            Err(e) => return error_response("", &Error::from(e)),
        };

        match self
            .route(ctx, &request.service, &request.method, request.body)
            .await
        {
            Ok(body) => json!({ "id": request.id, "ok": true, "body": body }),
            Err(e) => {
                tracing::debug!(
                    client_id = %ctx.client_id,
                    "{}.{} failed: {}",
                    request.service,
                    request.method,
                    e
                );
                error_response(&request.id, &e)
            }
        }
    }
}

#[async_trait]
impl RequestHandler for HostRequestHandler {
    async fn handle(&self, ctx: &RequestContext, request: Vec<u8>) {
        let response = self.respond(ctx, &request).await;
        let encoded = match serde_json::to_vec(&response) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!("response encoding failed: {}", e);
                return;
            }
        };
        if let Err(e) = ctx.reply.send(encoded).await {
            tracing::debug!(client_id = %ctx.client_id, "reply dropped: {}", e);
        }
    }
}

/// Build the error response envelope.
pub fn error_response(id: &str, error: &Error) -> Value {
    json!({
        "id": id,
        "ok": false,
        "error": {
            "code": error.to_ipc_error_code(),
            "message": error.to_string(),
        }
    })
}

// =============================================================================
// Shared helpers — used by all handler modules
// =============================================================================

pub fn str_field(body: &Value, key: &str) -> Result<String> {
    body.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::invalid_argument(format!("Missing required field: {}", key)))
}

pub fn bool_field(body: &Value, key: &str) -> bool {
    body.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{MemoryTransport, Transport};
    use crate::types::{ClientId, LifecycleConfig, SessionId};

    fn handler_and_ctx() -> (HostRequestHandler, RequestContext, crate::channel::ReceiveEndpoint) {
        let lifecycle = Arc::new(LifecycleStateMachine::spawn(LifecycleConfig::default()).unwrap());
        let handler = HostRequestHandler::new(lifecycle, Arc::new(ForegroundArbiter::default()));
        let (reply, replies) = MemoryTransport::new().channel("replies").unwrap();
        let ctx = RequestContext {
            client_id: ClientId::must("midlet-1"),
            session_id: SessionId::new(),
            reply,
        };
        (handler, ctx, replies)
    }

    async fn roundtrip(handler: &HostRequestHandler, ctx: &RequestContext, replies: &crate::channel::ReceiveEndpoint, raw: &[u8]) -> Value {
        handler.handle(ctx, raw.to_vec()).await;
        serde_json::from_slice(&replies.recv().await.unwrap().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_service_is_not_found() {
        let (handler, ctx, replies) = handler_and_ctx();
        let reply = roundtrip(
            &handler,
            &ctx,
            &replies,
            br#"{"id":"7","service":"media","method":"Play"}"#,
        )
        .await;
        assert_eq!(reply["id"], "7");
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_malformed_request_is_invalid_argument() {
        let (handler, ctx, replies) = handler_and_ctx();
        let reply = roundtrip(&handler, &ctx, &replies, b"\x00not-json").await;
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["code"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_get_state() {
        let (handler, ctx, replies) = handler_and_ctx();
        let reply = roundtrip(
            &handler,
            &ctx,
            &replies,
            br#"{"id":"1","service":"lifecycle","method":"GetState"}"#,
        )
        .await;
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["body"]["state"], "ACTIVE");
        assert_eq!(reply["body"]["transitions"], 0);
    }

    #[test]
    fn test_str_field() {
        let body = json!({"client_id": "x", "n": 1});
        assert_eq!(str_field(&body, "client_id").unwrap(), "x");
        assert!(str_field(&body, "n").is_err());
        assert!(str_field(&body, "missing").is_err());
        assert!(!bool_field(&body, "wait"));
    }
}
