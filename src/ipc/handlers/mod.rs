//! Per-service request handlers.

pub mod foreground;
pub mod lifecycle;
