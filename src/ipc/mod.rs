//! TCP front-end for out-of-process clients.
//!
//! A client connects, sends one HELLO frame naming itself, and from then on
//! its REQUEST frames are delivered on the session's client→service channel
//! while messages from the service→client channel come back as RESPONSE
//! frames. Requests are JSON and routed by [`HostRequestHandler`].

pub mod codec;
pub mod handlers;
pub mod router;
pub mod server;

pub use router::HostRequestHandler;
pub use server::IpcServer;
