//! System-wide suspend/resume state machine.
//!
//! ```text
//!            request_suspend
//!   ACTIVE ──────────────────► SUSPENDED
//!     ▲                            │
//!     └────────────────────────────┘
//!            request_resume
//! ```
//!
//! Requests are queued to a single driver task and applied in order, so the
//! transition completes some time after the request returns. Readers either
//! poll [`LifecycleStateMachine::current_state`] or await the driver's
//! acknowledgement of their own request with
//! [`LifecycleStateMachine::suspend`] / [`LifecycleStateMachine::resume`].
//! A request for the state the machine is already in is a no-op: no
//! transition is counted and no listener fires.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, RwLock};

use super::recovery::guard_callback;
use crate::types::{Error, LifecycleConfig, Result};

/// System state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemState {
    Active,
    Suspended,
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemState::Active => write!(f, "ACTIVE"),
            SystemState::Suspended => write!(f, "SUSPENDED"),
        }
    }
}

/// Notified once per committed transition, from the driver task.
pub trait LifecycleListener: Send + Sync + fmt::Debug {
    fn on_transition(&self, from: SystemState, to: SystemState);
}

/// Handle returned by listener registration.
pub type ListenerId = u64;

type ListenerList = Arc<RwLock<Vec<(ListenerId, Arc<dyn LifecycleListener>)>>>;

/// A queued transition request. `done` fires once the driver has applied
/// or skipped it.
#[derive(Debug)]
struct Request {
    target: SystemState,
    done: Option<oneshot::Sender<()>>,
}

/// Suspend/resume state machine.
#[derive(Debug)]
pub struct LifecycleStateMachine {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<SystemState>,
    listeners: ListenerList,
    transitions: Arc<AtomicU64>,
    next_listener: AtomicU64,
}

impl LifecycleStateMachine {
    /// Start the machine in `ACTIVE` with its driver on the current runtime.
    pub fn spawn(config: LifecycleConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::illegal_state(format!("lifecycle driver needs a tokio runtime: {}", e))
        })?;

        let (requests, queue) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SystemState::Active);
        let listeners: ListenerList = Arc::new(RwLock::new(Vec::new()));
        let transitions = Arc::new(AtomicU64::new(0));

        runtime.spawn(drive(
            queue,
            state_tx,
            listeners.clone(),
            transitions.clone(),
            config.transition_delay,
        ));

        Ok(Self {
            requests,
            state,
            listeners,
            transitions,
            next_listener: AtomicU64::new(1),
        })
    }

    /// Ask for `SUSPENDED`. Returns before the transition is applied.
    pub fn request_suspend(&self) -> Result<()> {
        self.request(SystemState::Suspended)
    }

    /// Ask for `ACTIVE`. Returns before the transition is applied.
    pub fn request_resume(&self) -> Result<()> {
        self.request(SystemState::Active)
    }

    /// Ask for `SUSPENDED` and wait until the driver has processed this
    /// request. Later requests from other callers cannot hold it up.
    pub async fn suspend(&self) -> Result<()> {
        self.request_and_wait(SystemState::Suspended).await
    }

    /// Ask for `ACTIVE` and wait until the driver has processed this request.
    pub async fn resume(&self) -> Result<()> {
        self.request_and_wait(SystemState::Active).await
    }

    fn request(&self, target: SystemState) -> Result<()> {
        self.enqueue(target, None)
    }

    async fn request_and_wait(&self, target: SystemState) -> Result<()> {
        let (done, applied) = oneshot::channel();
        self.enqueue(target, Some(done))?;
        applied
            .await
            .map_err(|_| Error::illegal_state("lifecycle driver has stopped"))
    }

    fn enqueue(&self, target: SystemState, done: Option<oneshot::Sender<()>>) -> Result<()> {
        tracing::debug!("lifecycle transition to {} requested", target);
        self.requests
            .send(Request { target, done })
            .map_err(|_| Error::illegal_state("lifecycle driver has stopped"))
    }

    /// Instantaneous state. May lag a request that was just made.
    pub fn current_state(&self) -> SystemState {
        *self.state.borrow()
    }

    /// Block until the machine is observed in `target`.
    ///
    /// Only the latest state is observed: if `target` is entered and left
    /// again before this task runs, it keeps waiting. Use
    /// [`suspend`](Self::suspend) / [`resume`](Self::resume) to wait for a
    /// specific request. Unbounded; wrap in `tokio::time::timeout` for a
    /// deadline.
    pub async fn wait_for(&self, target: SystemState) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_| Error::illegal_state("lifecycle driver has stopped"))
    }

    /// Watch receiver over the committed state.
    pub fn subscribe(&self) -> watch::Receiver<SystemState> {
        self.state.clone()
    }

    /// Committed transitions so far. No-op requests are not counted.
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::SeqCst)
    }

    pub async fn register_listener(&self, listener: Arc<dyn LifecycleListener>) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.write().await.push((id, listener));
        id
    }

    pub async fn unregister_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().await;
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }
}

/// Driver loop: the only writer of the state.
async fn drive(
    mut queue: mpsc::UnboundedReceiver<Request>,
    state: watch::Sender<SystemState>,
    listeners: ListenerList,
    transitions: Arc<AtomicU64>,
    transition_delay: Duration,
) {
    while let Some(Request { target, done }) = queue.recv().await {
        let from = *state.borrow();
        if from == target {
            tracing::debug!("lifecycle already {}, request ignored", target);
            acknowledge(done);
            continue;
        }

        if !transition_delay.is_zero() {
            tokio::time::sleep(transition_delay).await;
        }

        state.send_replace(target);
        transitions.fetch_add(1, Ordering::SeqCst);
        tracing::info!("system state {} -> {}", from, target);

        let snapshot = listeners.read().await.clone();
        for (_, listener) in snapshot {
            guard_callback("lifecycle_listener", || listener.on_transition(from, target));
        }
        acknowledge(done);
    }
    tracing::debug!("lifecycle driver stopped");
}

fn acknowledge(done: Option<oneshot::Sender<()>>) {
    if let Some(done) = done {
        // The requester may have given up waiting.
        let _ = done.send(());
    }
}
