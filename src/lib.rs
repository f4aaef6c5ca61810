//! # Isolate IPC - cross-isolate service request substrate
//!
//! Plumbing that lets client isolates talk to a central service isolate:
//! - Counting semaphores and a two-gate rendezvous for pausing tasks
//! - Named, directional message channels published in a shared registry
//! - A per-client dispatcher that serves each client on its own worker task
//! - A system-wide suspend/resume state machine
//! - Foreground arbitration with change notifications
//! - A TCP front-end for clients living in other processes
//!
//! ## Architecture
//!
//! Everything process-wide hangs off one explicitly constructed host:
//! ```text
//!                    ┌─────────────────────────────────┐
//!   TCP clients  →   │           IsolateHost           │
//!                    │  ┌──────────┐ ┌──────────────┐  │
//!                    │  │ Channel  │ │   Service    │  │
//!                    │  │ Registry │ │  Dispatcher  │  │
//!                    │  └──────────┘ └──────────────┘  │
//!                    │  ┌──────────┐ ┌──────────────┐  │
//!                    │  │Lifecycle │ │  Foreground  │  │
//!                    │  │    SM    │ │   Arbiter    │  │
//!                    │  └──────────┘ └──────────────┘  │
//!                    └─────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod channel;
pub mod dispatcher;
pub mod host;
pub mod ipc;
pub mod sync;
pub mod types;

// Internal utilities
pub mod observability;

pub use host::IsolateHost;
pub use types::{Config, Error, Result};
