//! Channel endpoint traits and handles.
//!
//! A channel is unidirectional: one [`SendEndpoint`], one [`ReceiveEndpoint`].
//! Transports plug in by implementing [`MessageSink`] / [`MessageSource`].

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::types::{Error, Result};

/// Write side of a channel.
#[async_trait]
pub trait MessageSink: Send + Sync + fmt::Debug {
    /// Deliver one message. `ChannelClosed` once either side has closed.
    async fn send(&self, message: Vec<u8>) -> Result<()>;

    /// Close the write side. The reader sees end-of-channel after draining.
    async fn close(&self);
}

/// Read side of a channel.
#[async_trait]
pub trait MessageSource: Send + fmt::Debug {
    /// Block until the next message. `Ok(None)` means the channel closed
    /// normally; `Err` is a transport fault.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>>;

    /// Stop accepting messages from the writer.
    fn close(&mut self);
}

/// Cloneable handle to the write side of a named channel.
#[derive(Debug, Clone)]
pub struct SendEndpoint {
    name: Arc<str>,
    sink: Arc<dyn MessageSink>,
}

impl SendEndpoint {
    pub fn new(name: impl Into<Arc<str>>, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            name: name.into(),
            sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn send(&self, message: Vec<u8>) -> Result<()> {
        self.sink.send(message).await
    }

    pub async fn close(&self) {
        self.sink.close().await;
    }
}

/// Cloneable handle to the read side of a named channel.
///
/// Clones share one underlying source; concurrent `recv` calls are
/// serialized, so only one reader is ever active.
#[derive(Debug, Clone)]
pub struct ReceiveEndpoint {
    name: Arc<str>,
    source: Arc<Mutex<Box<dyn MessageSource>>>,
}

impl ReceiveEndpoint {
    pub fn new(name: impl Into<Arc<str>>, source: Box<dyn MessageSource>) -> Self {
        Self {
            name: name.into(),
            source: Arc::new(Mutex::new(source)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn recv(&self) -> Result<Option<Vec<u8>>> {
        self.source.lock().await.recv().await
    }

    /// Close the read side. Waits for an in-flight `recv` to return first.
    pub async fn close(&self) {
        self.source.lock().await.close();
    }
}

/// Either end of a channel, as stored in the registry.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Send(SendEndpoint),
    Receive(ReceiveEndpoint),
}

impl Endpoint {
    pub fn name(&self) -> &str {
        match self {
            Endpoint::Send(ep) => ep.name(),
            Endpoint::Receive(ep) => ep.name(),
        }
    }

    pub fn into_send(self) -> Result<SendEndpoint> {
        match self {
            Endpoint::Send(ep) => Ok(ep),
            Endpoint::Receive(ep) => Err(Error::illegal_state(format!(
                "endpoint {} is a receive endpoint",
                ep.name()
            ))),
        }
    }

    pub fn into_receive(self) -> Result<ReceiveEndpoint> {
        match self {
            Endpoint::Receive(ep) => Ok(ep),
            Endpoint::Send(ep) => Err(Error::illegal_state(format!(
                "endpoint {} is a send endpoint",
                ep.name()
            ))),
        }
    }
}

impl From<SendEndpoint> for Endpoint {
    fn from(ep: SendEndpoint) -> Self {
        Endpoint::Send(ep)
    }
}

impl From<ReceiveEndpoint> for Endpoint {
    fn from(ep: ReceiveEndpoint) -> Self {
        Endpoint::Receive(ep)
    }
}

/// Factory for channel pairs. The platform primitive behind all dispatch I/O.
pub trait Transport: Send + Sync + fmt::Debug {
    fn channel(&self, name: &str) -> Result<(SendEndpoint, ReceiveEndpoint)>;
}
