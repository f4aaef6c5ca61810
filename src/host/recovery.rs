//! Panic isolation for collaborator callbacks.
//!
//! Listeners, hooks, handlers and fault reporters are foreign code. A panic
//! inside one is captured and logged here so it can never unwind through a
//! lock holder or abort a state transition that was already committed.

use crate::types::{Error, Result};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Execute a fallible callback with panic recovery.
///
/// A panic is converted into `Error::Internal`.
///
/// # Example
/// ```
/// use isolate_ipc::host::with_recovery;
///
/// let result = with_recovery(|| Ok(7), "compute");
/// assert_eq!(result.unwrap(), 7);
/// ```
pub fn with_recovery<F, T>(operation: F, operation_name: &str) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match catch_unwind(AssertUnwindSafe(operation)) {
        Ok(result) => result,
        Err(payload) => {
            let panic_msg = panic_message(&payload);
            tracing::error!(
                "panic_recovered: operation={}, panic={}",
                operation_name,
                panic_msg
            );
            Err(Error::internal(format!(
                "Panic in {}: {}",
                operation_name, panic_msg
            )))
        }
    }
}

/// Run a notification callback; a panic is logged and swallowed.
///
/// Returns `false` if the callback panicked.
pub(crate) fn guard_callback<F: FnOnce()>(callback_name: &str, callback: F) -> bool {
    with_recovery(
        || {
            callback();
            Ok(())
        },
        callback_name,
    )
    .is_ok()
}

/// Extract panic message from panic payload.
pub(crate) fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic (no message)".to_string()
    }
}
