//! Named unidirectional channels.
//!
//! - **Endpoints**: cloneable send/receive handles over pluggable transports
//! - **Transports**: in-memory (`mpsc`) and framed byte streams
//! - **Registry**: name → endpoint directory for handing ends across contexts

mod endpoint;
mod framed;
mod memory;
mod registry;

pub use endpoint::{Endpoint, MessageSink, MessageSource, ReceiveEndpoint, SendEndpoint, Transport};
pub use framed::{FramedSink, FramedSource, FramedTransport};
pub use memory::MemoryTransport;
pub use registry::ChannelRegistry;
