//! Collaborator seams of the dispatcher: request handling and fault reporting.

use async_trait::async_trait;
use std::fmt;

use crate::channel::SendEndpoint;
use crate::types::{ClientId, Error, SessionId};

/// Per-request context handed to the handler.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub client_id: ClientId,
    pub session_id: SessionId,
    /// The service→client channel of this session.
    pub reply: SendEndpoint,
}

/// Invoked synchronously by a session worker for every inbound message.
///
/// Must not block indefinitely: it stalls the session's FIFO. Failures are
/// reported through `ctx.reply`, not by panicking; a panic is caught and
/// logged by the worker and the session moves on to the next request.
#[async_trait]
pub trait RequestHandler: Send + Sync + fmt::Debug {
    async fn handle(&self, ctx: &RequestContext, request: Vec<u8>);
}

/// Receives abnormal session terminations.
#[cfg_attr(test, mockall::automock)]
pub trait FaultReporter: Send + Sync + fmt::Debug {
    fn report(&self, client_id: &ClientId, reason: &Error);
}

/// Default fault reporter: logs at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFaultReporter;

impl FaultReporter for LogFaultReporter {
    fn report(&self, client_id: &ClientId, reason: &Error) {
        tracing::error!(client_id = %client_id, "session fault: {}", reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_log_fault_reporter_logs_reason() {
        LogFaultReporter.report(&ClientId::must("midlet-7"), &Error::io("connection reset"));
        assert!(logs_contain("session fault"));
        assert!(logs_contain("connection reset"));
    }
}
