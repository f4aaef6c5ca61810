//! Single-holder foreground arbitration.
//!
//! At most one client holds the foreground slot. Every change goes through
//! the [`ForegroundPolicy`] "changing" hook, which sees the requested client
//! and the current holder and decides who actually gets the slot (it may
//! substitute a higher-priority client, or keep the current one).
//!
//! The holder is tracked by [`ClientId`] only; the arbiter never keeps a
//! client alive. Callers that own client lifetimes prune departed holders
//! with [`ForegroundArbiter::release_foreground`] or
//! [`ForegroundArbiter::prune_holder`].
//!
//! Listeners are called synchronously on the committing task, in
//! registration order, after the change is committed and outside the state
//! lock. Notification is serialized in commit order: every listener sees a
//! chain of changes where each `old` is the previous `new`.

use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::lifecycle::ListenerId;
use super::recovery::{guard_callback, with_recovery};
use crate::types::{ClientId, Result};

/// The "changing" hook.
pub trait ForegroundPolicy: Send + Sync + fmt::Debug {
    /// Return the client that will actually hold the foreground.
    fn changing(&self, requested: &ClientId, current: Option<&ClientId>) -> Option<ClientId>;
}

/// Default policy: the requester always wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrantRequested;

impl ForegroundPolicy for GrantRequested {
    fn changing(&self, requested: &ClientId, _current: Option<&ClientId>) -> Option<ClientId> {
        Some(requested.clone())
    }
}

/// Receives `(old_holder, new_holder)` for every committed change.
pub trait ForegroundListener: Send + Sync + fmt::Debug {
    fn foreground_changed(&self, old: Option<&ClientId>, new: Option<&ClientId>);
}

#[derive(Debug, Default)]
struct ArbiterState {
    holder: Option<ClientId>,
    listeners: Vec<(ListenerId, Arc<dyn ForegroundListener>)>,
    next_listener: ListenerId,
    changes: u64,
}

/// Foreground slot arbiter.
#[derive(Debug)]
pub struct ForegroundArbiter {
    state: RwLock<ArbiterState>,
    /// Taken before the state lock is released; held while notifying.
    notify_order: Mutex<()>,
    policy: Arc<dyn ForegroundPolicy>,
}

impl Default for ForegroundArbiter {
    fn default() -> Self {
        Self::new(Arc::new(GrantRequested))
    }
}

impl ForegroundArbiter {
    pub fn new(policy: Arc<dyn ForegroundPolicy>) -> Self {
        Self {
            state: RwLock::new(ArbiterState {
                next_listener: 1,
                ..ArbiterState::default()
            }),
            notify_order: Mutex::new(()),
            policy,
        }
    }

    /// Request the foreground for `client`.
    ///
    /// Returns the committed holder, which is whoever the policy chose. If
    /// the policy panics nothing changes and the panic is returned as
    /// `Error::Internal`.
    pub async fn request_foreground(&self, client: ClientId) -> Result<Option<ClientId>> {
        let (old, new, listeners, _order) = {
            let mut state = self.state.write().await;
            let current = state.holder.clone();
            let policy = &self.policy;
            let granted = with_recovery(
                || Ok(policy.changing(&client, current.as_ref())),
                "foreground_policy",
            )?;

            if granted == current {
                tracing::debug!(
                    requested = %client,
                    "foreground unchanged (holder {:?})",
                    current.as_ref().map(ClientId::as_str)
                );
                return Ok(granted);
            }

            state.holder = granted.clone();
            state.changes += 1;
            let order = self.notify_order.lock().await;
            (current, granted, state.listeners.clone(), order)
        };

        if new.as_ref() != Some(&client) {
            tracing::info!(
                requested = %client,
                "foreground request preempted, granted to {:?}",
                new.as_ref().map(ClientId::as_str)
            );
        }
        self.notify(old.as_ref(), new.as_ref(), &listeners);
        Ok(new)
    }

    /// Current holder, if any.
    pub async fn current_foreground(&self) -> Option<ClientId> {
        self.state.read().await.holder.clone()
    }

    /// Clear the slot if `client` holds it. Returns whether it did.
    pub async fn release_foreground(&self, client: &ClientId) -> bool {
        self.prune_holder(|holder| holder != client).await
    }

    /// Clear the slot if `is_alive` reports the holder gone.
    pub async fn prune_holder(&self, is_alive: impl FnOnce(&ClientId) -> bool) -> bool {
        let (old, listeners, _order) = {
            let mut state = self.state.write().await;
            let departed = state.holder.as_ref().is_some_and(|holder| !is_alive(holder));
            if !departed {
                return false;
            }
            state.changes += 1;
            let order = self.notify_order.lock().await;
            (state.holder.take(), state.listeners.clone(), order)
        };

        tracing::info!(
            "foreground released by {:?}",
            old.as_ref().map(ClientId::as_str)
        );
        self.notify(old.as_ref(), None, &listeners);
        true
    }

    pub async fn register_listener(&self, listener: Arc<dyn ForegroundListener>) -> ListenerId {
        let mut state = self.state.write().await;
        let id = state.next_listener;
        state.next_listener += 1;
        state.listeners.push((id, listener));
        id
    }

    pub async fn unregister_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state.write().await;
        let before = state.listeners.len();
        state.listeners.retain(|(lid, _)| *lid != id);
        state.listeners.len() != before
    }

    /// Committed holder changes so far.
    pub async fn change_count(&self) -> u64 {
        self.state.read().await.changes
    }

    fn notify(
        &self,
        old: Option<&ClientId>,
        new: Option<&ClientId>,
        listeners: &[(ListenerId, Arc<dyn ForegroundListener>)],
    ) {
        for (_, listener) in listeners {
            guard_callback("foreground_listener", || listener.foreground_changed(old, new));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Error;
    use std::sync::Mutex;

    type Change = (Option<String>, Option<String>);

    #[derive(Debug, Default)]
    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<(&'static str, Change)>>>,
    }

    impl ForegroundListener for Recorder {
        fn foreground_changed(&self, old: Option<&ClientId>, new: Option<&ClientId>) {
            self.log.lock().unwrap().push((
                self.tag,
                (old.map(|c| c.to_string()), new.map(|c| c.to_string())),
            ));
        }
    }

    /// Always hands the slot to a fixed client.
    #[derive(Debug)]
    struct Preempt(ClientId);

    impl ForegroundPolicy for Preempt {
        fn changing(&self, _requested: &ClientId, _current: Option<&ClientId>) -> Option<ClientId> {
            Some(self.0.clone())
        }
    }

    #[derive(Debug)]
    struct BrokenPolicy;

    impl ForegroundPolicy for BrokenPolicy {
        fn changing(&self, _requested: &ClientId, _current: Option<&ClientId>) -> Option<ClientId> {
            panic!("policy failure");
        }
    }

    #[derive(Debug)]
    struct BrokenListener;

    impl ForegroundListener for BrokenListener {
        fn foreground_changed(&self, _old: Option<&ClientId>, _new: Option<&ClientId>) {
            panic!("listener failure");
        }
    }

    fn recorder(tag: &'static str, log: &Arc<Mutex<Vec<(&'static str, Change)>>>) -> Arc<Recorder> {
        Arc::new(Recorder {
            tag,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn test_first_request_grants_and_notifies_once() {
        let arbiter = ForegroundArbiter::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        arbiter.register_listener(recorder("a", &log)).await;

        let x = ClientId::must("X");
        let granted = arbiter.request_foreground(x.clone()).await.unwrap();

        assert_eq!(granted, Some(x.clone()));
        assert_eq!(arbiter.current_foreground().await, Some(x));
        assert_eq!(
            *log.lock().unwrap(),
            vec![("a", (None, Some("X".to_string())))]
        );
    }

    #[tokio::test]
    async fn test_repeat_request_by_holder_is_silent() {
        let arbiter = ForegroundArbiter::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        arbiter.register_listener(recorder("a", &log)).await;

        arbiter.request_foreground(ClientId::must("X")).await.unwrap();
        arbiter.request_foreground(ClientId::must("X")).await.unwrap();

        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(arbiter.change_count().await, 1);
    }

    #[tokio::test]
    async fn test_policy_substitutes_holder() {
        let y = ClientId::must("Y");
        let arbiter = ForegroundArbiter::new(Arc::new(Preempt(y.clone())));

        let granted = arbiter.request_foreground(ClientId::must("X")).await.unwrap();
        assert_eq!(granted, Some(y.clone()));
        assert_eq!(arbiter.current_foreground().await, Some(y));
    }

    #[tokio::test]
    async fn test_listeners_notified_in_registration_order() {
        let arbiter = ForegroundArbiter::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        arbiter.register_listener(recorder("first", &log)).await;
        arbiter.register_listener(recorder("second", &log)).await;

        arbiter.request_foreground(ClientId::must("X")).await.unwrap();
        arbiter.request_foreground(ClientId::must("Z")).await.unwrap();

        let tags: Vec<&str> = log.lock().unwrap().iter().map(|(t, _)| *t).collect();
        assert_eq!(tags, vec!["first", "second", "first", "second"]);
        assert_eq!(
            log.lock().unwrap()[2].1,
            (Some("X".to_string()), Some("Z".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unregister_listener() {
        let arbiter = ForegroundArbiter::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = arbiter.register_listener(recorder("a", &log)).await;
        assert!(arbiter.unregister_listener(id).await);

        arbiter.request_foreground(ClientId::must("X")).await.unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_only_by_holder() {
        let arbiter = ForegroundArbiter::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        arbiter.register_listener(recorder("a", &log)).await;
        arbiter.request_foreground(ClientId::must("X")).await.unwrap();

        assert!(!arbiter.release_foreground(&ClientId::must("other")).await);
        assert!(arbiter.release_foreground(&ClientId::must("X")).await);
        assert_eq!(arbiter.current_foreground().await, None);
        assert_eq!(log.lock().unwrap()[1].1, (Some("X".to_string()), None));
        assert!(!arbiter.release_foreground(&ClientId::must("X")).await);
    }

    #[tokio::test]
    async fn test_prune_holder_uses_liveness() {
        let arbiter = ForegroundArbiter::default();
        arbiter.request_foreground(ClientId::must("X")).await.unwrap();

        assert!(!arbiter.prune_holder(|_| true).await);
        assert!(arbiter.prune_holder(|_| false).await);
        assert_eq!(arbiter.current_foreground().await, None);
    }

    #[tokio::test]
    async fn test_panicking_policy_leaves_holder_unchanged() {
        let arbiter = ForegroundArbiter::new(Arc::new(BrokenPolicy));
        let err = arbiter
            .request_foreground(ClientId::must("X"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(arbiter.current_foreground().await, None);
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_undo_commit() {
        let arbiter = ForegroundArbiter::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        arbiter.register_listener(Arc::new(BrokenListener)).await;
        arbiter.register_listener(recorder("after", &log)).await;

        arbiter.request_foreground(ClientId::must("X")).await.unwrap();
        assert_eq!(arbiter.current_foreground().await, Some(ClientId::must("X")));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_changes_are_notified_in_commit_order() {
        let arbiter = Arc::new(ForegroundArbiter::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        arbiter.register_listener(recorder("chain", &log)).await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let arbiter = arbiter.clone();
            handles.push(tokio::spawn(async move {
                let client = ClientId::must(&format!("c{}", i));
                arbiter.request_foreground(client.clone()).await.unwrap();
                arbiter.release_foreground(&client).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let changes = arbiter.change_count().await;
        let holder = arbiter.current_foreground().await.map(|c| c.to_string());

        let log = log.lock().unwrap();
        assert_eq!(log.len() as u64, changes);
        let mut previous: Option<String> = None;
        for (_, (old, new)) in log.iter() {
            assert_eq!(old, &previous);
            previous = new.clone();
        }
        assert_eq!(previous, holder);
    }

    #[tokio::test]
    async fn test_concurrent_requests_leave_one_holder() {
        let arbiter = Arc::new(ForegroundArbiter::default());
        let mut handles = Vec::new();
        for i in 0..8 {
            let arbiter = arbiter.clone();
            handles.push(tokio::spawn(async move {
                arbiter
                    .request_foreground(ClientId::must(&format!("c{}", i)))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(arbiter.current_foreground().await.is_some());
        assert_eq!(arbiter.change_count().await, 8);
    }
}
