//! Lifecycle service handler — suspend/resume requests and state queries.

use crate::host::LifecycleStateMachine;
use crate::ipc::router::bool_field;
use crate::types::{Error, Result};
use serde_json::{json, Value};

pub async fn handle(lifecycle: &LifecycleStateMachine, method: &str, body: Value) -> Result<Value> {
    match method {
        "Suspend" => {
            if bool_field(&body, "wait") {
                lifecycle.suspend().await?;
            } else {
                lifecycle.request_suspend()?;
            }
            Ok(state_to_value(lifecycle))
        }

        "Resume" => {
            if bool_field(&body, "wait") {
                lifecycle.resume().await?;
            } else {
                lifecycle.request_resume()?;
            }
            Ok(state_to_value(lifecycle))
        }

        "GetState" => Ok(state_to_value(lifecycle)),

        _ => Err(Error::not_found(format!("Unknown lifecycle method: {}", method))),
    }
}

fn state_to_value(lifecycle: &LifecycleStateMachine) -> Value {
    json!({
        "state": lifecycle.current_state(),
        "transitions": lifecycle.transitions(),
    })
}
