//! Per-client session worker.
//!
//! ```text
//!   Running ──(peer close | close request | I/O fault)──► Draining ──► Closed
//! ```
//!
//! The worker is the only reader of its inbound endpoint, so one client's
//! requests are handled strictly in arrival order.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::handler::{FaultReporter, RequestContext, RequestHandler};
use super::DispatcherStats;
use crate::channel::{ChannelRegistry, ReceiveEndpoint, SendEndpoint};
use crate::host::recovery::{guard_callback, panic_message};
use crate::types::{ClientId, Error, SessionId};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Running,
    Draining,
    Closed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }
}

/// Public description of an open session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub client_id: ClientId,
    pub session_id: SessionId,
    /// client→service channel name (requests).
    pub inbound_name: String,
    /// service→client channel name (responses).
    pub outbound_name: String,
    pub opened_at: DateTime<Utc>,
}

/// Dispatcher-side bookkeeping for a live session.
#[derive(Debug)]
pub(super) struct SessionHandle {
    pub(super) info: SessionInfo,
    pub(super) state: watch::Receiver<SessionState>,
    pub(super) cancel: CancellationToken,
    pub(super) task: JoinHandle<()>,
}

pub(super) type SessionTable = Arc<RwLock<HashMap<ClientId, SessionHandle>>>;

/// Why the receive loop stopped.
#[derive(Debug)]
enum Exit {
    PeerClosed,
    Requested,
    Fault(Error),
}

pub(super) struct Worker {
    pub(super) info: SessionInfo,
    pub(super) inbound: ReceiveEndpoint,
    pub(super) outbound: SendEndpoint,
    pub(super) handler: Arc<dyn RequestHandler>,
    pub(super) faults: Arc<dyn FaultReporter>,
    pub(super) registry: Arc<ChannelRegistry>,
    pub(super) sessions: SessionTable,
    pub(super) stats: Arc<RwLock<DispatcherStats>>,
    pub(super) state: watch::Sender<SessionState>,
    pub(super) cancel: CancellationToken,
}

impl Worker {
    pub(super) async fn run(self) {
        tracing::debug!(
            client_id = %self.info.client_id,
            session_id = %self.info.session_id,
            "session worker running"
        );

        let exit = self.receive_loop().await;
        self.teardown(exit).await;
    }

    async fn receive_loop(&self) -> Exit {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Exit::Requested,
                received = self.inbound.recv() => received,
            };

            match received {
                Ok(Some(request)) => self.dispatch(request).await,
                Ok(None) => return Exit::PeerClosed,
                Err(e) if e.is_channel_closed() => return Exit::PeerClosed,
                Err(e) => return Exit::Fault(e),
            }
        }
    }

    async fn dispatch(&self, request: Vec<u8>) {
        let ctx = RequestContext {
            client_id: self.info.client_id.clone(),
            session_id: self.info.session_id.clone(),
            reply: self.outbound.clone(),
        };

        let outcome = AssertUnwindSafe(self.handler.handle(&ctx, request))
            .catch_unwind()
            .await;

        let mut stats = self.stats.write().await;
        stats.requests_dispatched += 1;
        if let Err(payload) = outcome {
            stats.handler_panics += 1;
            tracing::error!(
                client_id = %self.info.client_id,
                "request handler panicked: {}",
                panic_message(&payload)
            );
        }
    }

    async fn teardown(self, exit: Exit) {
        self.state.send_replace(SessionState::Draining);
        match &exit {
            Exit::PeerClosed => tracing::debug!(
                client_id = %self.info.client_id,
                "inbound channel closed, draining session"
            ),
            Exit::Requested => tracing::debug!(
                client_id = %self.info.client_id,
                "close requested, draining session"
            ),
            Exit::Fault(e) => tracing::warn!(
                client_id = %self.info.client_id,
                "transport fault, draining session: {}",
                e
            ),
        }

        self.inbound.close().await;
        self.outbound.close().await;
        self.registry
            .revoke_owned(&self.info.inbound_name, &self.info.session_id)
            .await;
        self.registry
            .revoke_owned(&self.info.outbound_name, &self.info.session_id)
            .await;

        {
            let mut stats = self.stats.write().await;
            stats.sessions_closed += 1;
            if matches!(exit, Exit::Fault(_)) {
                stats.faults_reported += 1;
            }
        }

        if let Exit::Fault(reason) = &exit {
            let client_id = &self.info.client_id;
            guard_callback("fault_reporter", || self.faults.report(client_id, reason));
        }

        // Last externally visible step before Closed: a caller that finds the
        // session gone sees its stats and fault report already recorded.
        {
            let mut sessions = self.sessions.write().await;
            let ours = sessions
                .get(&self.info.client_id)
                .is_some_and(|handle| handle.info.session_id == self.info.session_id);
            if ours {
                sessions.remove(&self.info.client_id);
            }
        }

        self.state.send_replace(SessionState::Closed);
        tracing::info!(
            client_id = %self.info.client_id,
            session_id = %self.info.session_id,
            "session closed"
        );
    }
}
