//! Service request dispatcher: one worker task per client session.
//!
//! Opening a session allocates two channels, publishes both client-facing
//! ends in the [`ChannelRegistry`] under names derived from the client id,
//! and spawns a worker that reads requests and invokes the
//! [`RequestHandler`]:
//!
//! ```text
//!   client                      registry                     worker
//!   ──────                      ────────                     ──────
//!   lookup "client->service:X" ──► SendEndpoint ── request ──► inbound.recv()
//!   lookup "service->client:X" ──► ReceiveEndpoint ◄── reply ── ctx.reply.send()
//! ```
//!
//! Sessions are isolated from each other: a fault in one closes only that
//! session's channel pair and is reported to the [`FaultReporter`].

mod handler;
mod session;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

pub use handler::{FaultReporter, LogFaultReporter, RequestContext, RequestHandler};
pub use session::{SessionInfo, SessionState};

use crate::channel::{ChannelRegistry, ReceiveEndpoint, SendEndpoint, Transport};
use crate::types::{ClientId, DispatcherConfig, Error, Result, SessionId};
use session::{SessionHandle, SessionTable, Worker};

/// Registry name of the client→service (request) channel.
pub fn inbound_channel_name(client_id: &ClientId) -> String {
    format!("client->service:{}", client_id)
}

/// Registry name of the service→client (response) channel.
pub fn outbound_channel_name(client_id: &ClientId) -> String {
    format!("service->client:{}", client_id)
}

/// Statistics about dispatcher usage.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub requests_dispatched: u64,
    pub handler_panics: u64,
    pub faults_reported: u64,
    pub active_sessions: usize,
}

/// The client's view of a session, obtained purely by name.
#[derive(Debug, Clone)]
pub struct ClientChannels {
    pub requests: SendEndpoint,
    pub responses: ReceiveEndpoint,
}

impl ClientChannels {
    pub async fn lookup(registry: &ChannelRegistry, client_id: &ClientId) -> Result<Self> {
        let requests = registry
            .lookup(&inbound_channel_name(client_id))
            .await?
            .into_send()?;
        let responses = registry
            .lookup(&outbound_channel_name(client_id))
            .await?
            .into_receive()?;
        Ok(Self {
            requests,
            responses,
        })
    }
}

/// Per-client dispatcher.
#[derive(Debug)]
pub struct ServiceRequestDispatcher {
    config: DispatcherConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<ChannelRegistry>,
    handler: Arc<dyn RequestHandler>,
    faults: Arc<dyn FaultReporter>,
    sessions: SessionTable,
    stats: Arc<RwLock<DispatcherStats>>,
}

impl ServiceRequestDispatcher {
    pub fn new(
        config: DispatcherConfig,
        transport: Arc<dyn Transport>,
        registry: Arc<ChannelRegistry>,
        handler: Arc<dyn RequestHandler>,
        faults: Arc<dyn FaultReporter>,
    ) -> Self {
        Self {
            config,
            transport,
            registry,
            handler,
            faults,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(DispatcherStats::default())),
        }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Open a session for `client_id` and start its worker.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(&self, client_id: ClientId) -> Result<SessionInfo> {
        let mut sessions = self.sessions.write().await;

        if sessions.contains_key(&client_id) {
            return Err(Error::illegal_state(format!(
                "Client {} already has an open session",
                client_id
            )));
        }
        if sessions.len() >= self.config.max_sessions {
            return Err(Error::quota_exceeded(format!(
                "Session limit reached ({})",
                self.config.max_sessions
            )));
        }

        let info = SessionInfo {
            inbound_name: inbound_channel_name(&client_id),
            outbound_name: outbound_channel_name(&client_id),
            client_id: client_id.clone(),
            session_id: SessionId::new(),
            opened_at: Utc::now(),
        };

        let (request_tx, request_rx) = self.transport.channel(&info.inbound_name)?;
        let (reply_tx, reply_rx) = self.transport.channel(&info.outbound_name)?;

        self.registry
            .publish_owned(info.inbound_name.clone(), info.session_id.clone(), request_tx.into())
            .await;
        self.registry
            .publish_owned(info.outbound_name.clone(), info.session_id.clone(), reply_rx.into())
            .await;

        let (state_tx, state_rx) = watch::channel(SessionState::Running);
        let cancel = CancellationToken::new();
        let worker = Worker {
            info: info.clone(),
            inbound: request_rx,
            outbound: reply_tx,
            handler: self.handler.clone(),
            faults: self.faults.clone(),
            registry: self.registry.clone(),
            sessions: self.sessions.clone(),
            stats: self.stats.clone(),
            state: state_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run());

        sessions.insert(
            client_id.clone(),
            SessionHandle {
                info: info.clone(),
                state: state_rx,
                cancel,
                task,
            },
        );

        self.stats.write().await.sessions_opened += 1;

        tracing::info!(
            client_id = %client_id,
            session_id = %info.session_id,
            "session opened"
        );

        Ok(info)
    }

    /// Stop a session's worker and wait for it to reach `Closed`.
    ///
    /// The worker finishes the request it is currently handling first.
    pub async fn close(&self, client_id: &ClientId) -> Result<()> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(client_id)
            .ok_or_else(|| Error::not_found(format!("No open session for client {}", client_id)))?;

        tracing::debug!(client_id = %client_id, "closing session");
        handle.cancel.cancel();
        handle
            .task
            .await
            .map_err(|e| Error::internal(format!("Session worker for {} failed: {}", client_id, e)))
    }

    /// Close every open session.
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = self
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        tracing::info!("Dispatcher shutting down {} session(s)", handles.len());
        for handle in &handles {
            handle.cancel.cancel();
        }
        for handle in handles {
            if let Err(e) = handle.task.await {
                tracing::warn!(
                    client_id = %handle.info.client_id,
                    "session worker join failed: {}",
                    e
                );
            }
        }
    }

    /// Current state of a client's session, `None` once it is gone.
    pub async fn session_state(&self, client_id: &ClientId) -> Option<SessionState> {
        self.sessions
            .read()
            .await
            .get(client_id)
            .map(|handle| *handle.state.borrow())
    }

    /// Wait until a client's session (if any) reaches `Closed`.
    pub async fn wait_closed(&self, client_id: &ClientId) {
        let state = self
            .sessions
            .read()
            .await
            .get(client_id)
            .map(|handle| handle.state.clone());
        if let Some(mut state) = state {
            let _ = state.wait_for(|s| s.is_terminal()).await;
        }
    }

    /// All open sessions.
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .read()
            .await
            .values()
            .map(|handle| handle.info.clone())
            .collect();
        infos.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        infos
    }

    pub async fn stats(&self) -> DispatcherStats {
        let mut stats = self.stats.read().await.clone();
        stats.active_sessions = self.sessions.read().await.len();
        stats
    }
}

// =============================================================================
// Tests
// =============================================================================
