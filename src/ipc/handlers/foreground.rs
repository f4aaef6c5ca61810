//! Foreground service handler — request, query and release the foreground slot.

use crate::dispatcher::RequestContext;
use crate::host::ForegroundArbiter;
use crate::ipc::router::str_field;
use crate::types::{ClientId, Error, Result};
use serde_json::{json, Value};

pub async fn handle(
    arbiter: &ForegroundArbiter,
    ctx: &RequestContext,
    method: &str,
    body: Value,
) -> Result<Value> {
    match method {
        // The requesting session's own client unless `client_id` names another.
        "Request" => {
            let client = match body.get("client_id") {
                Some(_) => ClientId::from_string(str_field(&body, "client_id")?)
                    .map_err(Error::invalid_argument)?,
                None => ctx.client_id.clone(),
            };
            let holder = arbiter.request_foreground(client).await?;
            Ok(json!({ "holder": holder }))
        }

        "Get" => {
            let holder = arbiter.current_foreground().await;
            Ok(json!({ "holder": holder }))
        }

        "Release" => {
            let released = arbiter.release_foreground(&ctx.client_id).await;
            Ok(json!({ "released": released }))
        }

        _ => Err(Error::not_found(format!("Unknown foreground method: {}", method))),
    }
}
