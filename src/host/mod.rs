//! Host context - owns every process-wide piece of the substrate.
//!
//! Instead of statics, one [`IsolateHost`] is constructed explicitly and
//! shared (`Arc`) with whoever needs it; tests build as many independent
//! hosts as they like.
//!
//! ```text
//!                    ┌──────────────────────────────────────┐
//!   client isolates  │             IsolateHost              │
//!   ──── channels ──►│  ┌──────────────┐  ┌──────────────┐  │
//!                    │  │  Dispatcher  │─►│   Request    │  │
//!                    │  │ (per-client) │  │   handler    │  │
//!                    │  └──────┬───────┘  └──┬────────┬──┘  │
//!                    │  ┌──────▼───────┐  ┌──▼─────┐ ┌▼───┐ │
//!                    │  │   Channel    │  │Lifecyc.│ │Fg. │ │
//!                    │  │   registry   │  │  SM    │ │arb.│ │
//!                    │  └──────────────┘  └────────┘ └────┘ │
//!                    └──────────────────────────────────────┘
//! ```

pub mod foreground;
pub mod lifecycle;
pub mod recovery;

pub use foreground::{ForegroundArbiter, ForegroundListener, ForegroundPolicy, GrantRequested};
pub use lifecycle::{LifecycleListener, LifecycleStateMachine, ListenerId, SystemState};
pub use recovery::with_recovery;

use std::collections::HashSet;
use std::sync::Arc;

use crate::channel::{ChannelRegistry, MemoryTransport, Transport};
use crate::dispatcher::{
    FaultReporter, LogFaultReporter, ServiceRequestDispatcher, SessionInfo,
};
use crate::ipc::HostRequestHandler;
use crate::sync::RendezvousSynch;
use crate::types::{ClientId, Config, Error, Result};

/// Process-wide context.
#[derive(Debug)]
pub struct IsolateHost {
    config: Config,
    registry: Arc<ChannelRegistry>,
    rendezvous: Arc<RendezvousSynch>,
    lifecycle: Arc<LifecycleStateMachine>,
    foreground: Arc<ForegroundArbiter>,
    dispatcher: Arc<ServiceRequestDispatcher>,
}

impl IsolateHost {
    /// Host with in-memory channels, the default foreground policy and
    /// logging fault reporter. Must be called inside a tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_collaborators(
            config,
            Arc::new(MemoryTransport::new()),
            Arc::new(GrantRequested),
            Arc::new(LogFaultReporter),
        )
    }

    pub fn with_collaborators(
        config: Config,
        transport: Arc<dyn Transport>,
        policy: Arc<dyn ForegroundPolicy>,
        faults: Arc<dyn FaultReporter>,
    ) -> Result<Self> {
        let registry = Arc::new(ChannelRegistry::new());
        let lifecycle = Arc::new(LifecycleStateMachine::spawn(config.lifecycle.clone())?);
        let foreground = Arc::new(ForegroundArbiter::new(policy));
        let handler = Arc::new(HostRequestHandler::new(lifecycle.clone(), foreground.clone()));
        let dispatcher = Arc::new(ServiceRequestDispatcher::new(
            config.dispatcher.clone(),
            transport,
            registry.clone(),
            handler,
            faults,
        ));

        Ok(Self {
            config,
            registry,
            rendezvous: Arc::new(RendezvousSynch::new()),
            lifecycle,
            foreground,
            dispatcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn rendezvous(&self) -> &Arc<RendezvousSynch> {
        &self.rendezvous
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleStateMachine> {
        &self.lifecycle
    }

    pub fn foreground(&self) -> &Arc<ForegroundArbiter> {
        &self.foreground
    }

    pub fn dispatcher(&self) -> &Arc<ServiceRequestDispatcher> {
        &self.dispatcher
    }

    /// Open a service session for a client isolate.
    pub async fn connect(&self, client_id: ClientId) -> Result<SessionInfo> {
        self.dispatcher.open(client_id).await
    }

    /// End a client's session and give up its foreground slot.
    ///
    /// Succeeds if the session had already ended on its own.
    pub async fn disconnect(&self, client_id: &ClientId) -> Result<()> {
        let closed = match self.dispatcher.close(client_id).await {
            Ok(()) | Err(Error::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        };
        self.foreground.release_foreground(client_id).await;
        closed
    }

    /// Release the foreground if its holder no longer has a session.
    pub async fn prune_foreground(&self) -> bool {
        let live: HashSet<ClientId> = self
            .dispatcher
            .sessions()
            .await
            .into_iter()
            .map(|info| info.client_id)
            .collect();
        self.foreground
            .prune_holder(|holder| live.contains(holder))
            .await
    }

    /// Close all sessions.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
        self.prune_foreground().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::ClientChannels;
    use serde_json::{json, Value};

    async fn call(channels: &ClientChannels, request: Value) -> Value {
        channels
            .requests
            .send(serde_json::to_vec(&request).unwrap())
            .await
            .unwrap();
        let reply = channels.responses.recv().await.unwrap().unwrap();
        serde_json::from_slice(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_hosts_are_independent() {
        let a = IsolateHost::new(Config::default()).unwrap();
        let b = IsolateHost::new(Config::default()).unwrap();

        a.connect(ClientId::must("x")).await.unwrap();
        assert_eq!(a.registry().len().await, 2);
        assert!(b.registry().is_empty().await);

        a.rendezvous().init().unwrap();
        assert!(!b.rendezvous().is_initialized());

        a.shutdown().await;
    }

    #[tokio::test]
    async fn test_requests_drive_lifecycle_and_foreground() {
        let host = IsolateHost::new(Config::default()).unwrap();
        let client = ClientId::must("midlet-1");
        host.connect(client.clone()).await.unwrap();
        let channels = ClientChannels::lookup(host.registry(), &client).await.unwrap();

        let reply = call(
            &channels,
            json!({"id": "1", "service": "lifecycle", "method": "Suspend", "body": {"wait": true}}),
        )
        .await;
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["body"]["state"], "SUSPENDED");
        assert_eq!(host.lifecycle().current_state(), SystemState::Suspended);

        let reply = call(
            &channels,
            json!({"id": "2", "service": "foreground", "method": "Request", "body": {}}),
        )
        .await;
        assert_eq!(reply["body"]["holder"], "midlet-1");
        assert_eq!(host.foreground().current_foreground().await, Some(client.clone()));

        host.disconnect(&client).await.unwrap();
        assert_eq!(host.foreground().current_foreground().await, None);
    }

    #[tokio::test]
    async fn test_disconnect_after_session_ended_is_ok() {
        let host = IsolateHost::new(Config::default()).unwrap();
        let client = ClientId::must("midlet-1");
        host.connect(client.clone()).await.unwrap();
        host.foreground().request_foreground(client.clone()).await.unwrap();

        let channels = ClientChannels::lookup(host.registry(), &client).await.unwrap();
        channels.requests.close().await;
        host.dispatcher().wait_closed(&client).await;

        assert!(host.prune_foreground().await);
        host.disconnect(&client).await.unwrap();
    }
}
