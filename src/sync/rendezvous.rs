//! Two-semaphore rendezvous.
//!
//! One task parks itself with [`RendezvousSynch::pause`]; another waits for
//! it to arrive with [`RendezvousSynch::await_ready`] and later lets it go
//! with [`RendezvousSynch::signal_continue`].
//!
//! ```text
//!   awaited task                 awaiting task
//!   ────────────                 ─────────────
//!   pause():
//!     ready.release()  ───────►  await_ready(): ready.acquire()
//!     proceed.acquire() ◄──────  signal_continue(): proceed.release()
//! ```
//!
//! Lifecycle is `Uninitialized → Initialized → Uninitialized`. `fini` on an
//! uninitialized rendezvous is an `IllegalState` error, same as a double
//! `init`. Tasks still parked when `fini` runs keep their semaphore alive
//! but can no longer be reached through this rendezvous; drain them first.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::semaphore::Semaphore;
use crate::types::{Error, Result};

#[derive(Debug, Clone)]
struct Gates {
    ready: Arc<Semaphore>,
    proceed: Arc<Semaphore>,
}

/// Rendezvous point shared by an awaited and an awaiting task.
#[derive(Debug, Default)]
pub struct RendezvousSynch {
    gates: Mutex<Option<Gates>>,
}

impl RendezvousSynch {
    /// Create an uninitialized rendezvous.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Gates>> {
        self.gates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gates(&self) -> Result<Gates> {
        self.lock()
            .clone()
            .ok_or_else(|| Error::illegal_state("rendezvous is not initialized"))
    }

    /// Allocate both semaphores at zero permits.
    pub fn init(&self) -> Result<()> {
        let mut gates = self.lock();
        if gates.is_some() {
            return Err(Error::illegal_state("rendezvous already initialized"));
        }
        *gates = Some(Gates {
            ready: Arc::new(Semaphore::with_permits(0)),
            proceed: Arc::new(Semaphore::with_permits(0)),
        });
        tracing::debug!("rendezvous initialized");
        Ok(())
    }

    /// Discard both semaphores.
    pub fn fini(&self) -> Result<()> {
        let mut gates = self.lock();
        match gates.take() {
            Some(old) => {
                let parked = old.ready.waiting() + old.proceed.waiting();
                if parked > 0 {
                    tracing::warn!("rendezvous finalized with {} parked task(s)", parked);
                } else {
                    tracing::debug!("rendezvous finalized");
                }
                Ok(())
            }
            None => Err(Error::illegal_state("rendezvous is not initialized")),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    /// Called by the awaited task: announce arrival, then park until
    /// `signal_continue`.
    pub async fn pause(&self) -> Result<()> {
        let gates = self.gates()?;
        gates.ready.release();
        gates.proceed.acquire().await;
        Ok(())
    }

    /// Called by the awaiting task: park until the awaited task is in `pause`.
    pub async fn await_ready(&self) -> Result<()> {
        let gates = self.gates()?;
        gates.ready.acquire().await;
        Ok(())
    }

    /// Release the task parked in `pause`.
    pub fn signal_continue(&self) -> Result<()> {
        self.gates()?.proceed.release();
        Ok(())
    }

    /// The "ready" semaphore, absent while uninitialized.
    pub fn ready(&self) -> Option<Arc<Semaphore>> {
        self.lock().as_ref().map(|g| g.ready.clone())
    }

    /// The "continue" semaphore, absent while uninitialized.
    pub fn proceed(&self) -> Option<Arc<Semaphore>> {
        self.lock().as_ref().map(|g| g.proceed.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_handles_absent_before_init() {
        let rv = RendezvousSynch::new();
        assert!(rv.ready().is_none());
        assert!(rv.proceed().is_none());
    }

    #[test]
    fn test_handles_stable_while_initialized() {
        let rv = RendezvousSynch::new();
        rv.init().unwrap();

        let ready = rv.ready().unwrap();
        let proceed = rv.proceed().unwrap();
        assert!(Arc::ptr_eq(&ready, &rv.ready().unwrap()));
        assert!(Arc::ptr_eq(&proceed, &rv.proceed().unwrap()));
        assert!(!Arc::ptr_eq(&ready, &proceed));
        assert_eq!(ready.available_permits(), 0);

        rv.fini().unwrap();
        assert!(rv.ready().is_none());
        assert!(rv.proceed().is_none());
    }

    #[test]
    fn test_double_init_fails() {
        let rv = RendezvousSynch::new();
        rv.init().unwrap();
        let err = rv.init().unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
        // Original gates survive the failed init.
        assert!(rv.is_initialized());
    }

    #[test]
    fn test_fini_when_uninitialized_fails() {
        let rv = RendezvousSynch::new();
        assert!(matches!(rv.fini().unwrap_err(), Error::IllegalState(_)));

        rv.init().unwrap();
        rv.fini().unwrap();
        assert!(matches!(rv.fini().unwrap_err(), Error::IllegalState(_)));
    }

    #[test]
    fn test_reinit_after_fini_yields_fresh_handles() {
        let rv = RendezvousSynch::new();
        rv.init().unwrap();
        let first = rv.ready().unwrap();
        rv.fini().unwrap();
        rv.init().unwrap();
        assert!(!Arc::ptr_eq(&first, &rv.ready().unwrap()));
    }

    #[tokio::test]
    async fn test_operations_require_init() {
        let rv = RendezvousSynch::new();
        assert!(rv.pause().await.is_err());
        assert!(rv.await_ready().await.is_err());
        assert!(rv.signal_continue().is_err());
    }

    #[tokio::test]
    async fn test_pause_blocks_until_signal_continue() {
        let rv = Arc::new(RendezvousSynch::new());
        rv.init().unwrap();
        let resumed = Arc::new(AtomicBool::new(false));

        let paused = {
            let rv = rv.clone();
            let resumed = resumed.clone();
            tokio::spawn(async move {
                rv.pause().await.unwrap();
                resumed.store(true, Ordering::SeqCst);
            })
        };

        rv.await_ready().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!resumed.load(Ordering::SeqCst));

        rv.signal_continue().unwrap();
        tokio::time::timeout(Duration::from_secs(5), paused)
            .await
            .unwrap()
            .unwrap();
        assert!(resumed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_await_ready_blocks_until_pause_entered() {
        let rv = RendezvousSynch::new();
        rv.init().unwrap();
        let early = tokio::time::timeout(Duration::from_millis(30), rv.await_ready()).await;
        assert!(early.is_err());
    }
}
