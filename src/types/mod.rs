//! Core types for the isolate IPC substrate.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (ClientId, SessionId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for server, dispatcher and lifecycle

mod config;
mod errors;
mod ids;

pub use config::{Config, DispatcherConfig, LifecycleConfig, ObservabilityConfig, ServerConfig};
pub use errors::{Error, Result};
pub use ids::{ClientId, SessionId};
