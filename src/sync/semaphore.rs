//! Counting semaphore with direct permit handoff.
//!
//! A `release` with parked waiters hands its permit straight to one of them;
//! the counter only grows when nobody is waiting. The internal lock is never
//! exposed and is held only for queue/counter bookkeeping, never across an
//! await point.
//!
//! Wake order is unspecified. The current implementation happens to wake in
//! arrival order, but callers must not depend on it.
//!
//! There is no timeout variant. A parked `acquire` returns only after a
//! matching `release`; wrap it in `tokio::time::timeout` for a bounded wait.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

use crate::types::{Error, Result};

#[derive(Debug)]
struct State {
    permits: u64,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Counting semaphore.
pub struct Semaphore {
    state: Mutex<State>,
}

impl Semaphore {
    /// Create a semaphore holding `permits` permits.
    ///
    /// Negative counts are rejected with `InvalidArgument`, never clamped.
    pub fn new(permits: i64) -> Result<Self> {
        let permits = u64::try_from(permits).map_err(|_| {
            Error::invalid_argument(format!("semaphore permits must be >= 0, got {}", permits))
        })?;
        Ok(Self::with_permits(permits))
    }

    /// Infallible constructor for counts that are non-negative by type.
    pub fn with_permits(permits: u64) -> Self {
        Self {
            state: Mutex::new(State {
                permits,
                waiters: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // No user code runs under this lock, so a poisoned guard still holds
        // a consistent counter.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take one permit, parking the calling task until one is available.
    pub async fn acquire(&self) {
        loop {
            let rx = {
                let mut state = self.lock();
                if state.permits > 0 {
                    state.permits -= 1;
                    return;
                }
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                rx
            };

            let mut waiter = Waiter {
                rx: Some(rx),
                semaphore: self,
            };
            if waiter.wait().await {
                return;
            }
        }
    }

    /// Blocking form of [`acquire`](Self::acquire) for plain OS threads.
    ///
    /// Must not be called from inside an async task; it parks the whole
    /// worker thread.
    pub fn acquire_blocking(&self) {
        futures::executor::block_on(self.acquire());
    }

    /// Return one permit, handing it to a parked waiter if there is one.
    pub fn release(&self) {
        let mut state = self.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            // A failed send means that waiter was cancelled; try the next.
            if waiter.send(()).is_ok() {
                return;
            }
        }
        state.permits += 1;
    }

    /// Permits currently available without blocking.
    pub fn available_permits(&self) -> u64 {
        self.lock().permits
    }

    /// Number of tasks/threads currently parked in `acquire`.
    pub fn waiting(&self) -> usize {
        self.lock()
            .waiters
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Semaphore")
            .field("permits", &state.permits)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}

/// A parked acquire. Dropping it before the handoff is observed passes any
/// permit it already received on to the next waiter.
struct Waiter<'a> {
    rx: Option<oneshot::Receiver<()>>,
    semaphore: &'a Semaphore,
}

impl Waiter<'_> {
    /// Returns `true` once a permit has been handed over.
    async fn wait(&mut self) -> bool {
        let Some(rx) = self.rx.as_mut() else {
            return false;
        };
        let received = rx.await.is_ok();
        self.rx = None;
        received
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if rx.try_recv().is_ok() {
                self.semaphore.release();
            }
        }
    }
}
