//! Blocking coordination primitives.
//!
//! - [`Semaphore`]: counting semaphore with direct permit handoff
//! - [`RendezvousSynch`]: ready/continue handshake built on two semaphores

mod rendezvous;
mod semaphore;

pub use rendezvous::RendezvousSynch;
pub use semaphore::Semaphore;
