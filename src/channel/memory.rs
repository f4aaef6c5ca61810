//! In-process transport backed by tokio `mpsc` channels.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use super::endpoint::{MessageSink, MessageSource, ReceiveEndpoint, SendEndpoint, Transport};
use crate::types::{Error, Result};

#[derive(Debug)]
struct MemorySink {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn send(&self, message: Vec<u8>) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::channel_closed(format!("{} closed by writer", self.name)))?;
        tx.send(message)
            .map_err(|_| Error::channel_closed(format!("{} closed by reader", self.name)))
    }

    async fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

#[derive(Debug)]
struct MemorySource {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.rx.recv().await)
    }

    fn close(&mut self) {
        self.rx.close();
    }
}

/// Unbounded in-memory channels. FIFO per channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryTransport;

impl MemoryTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for MemoryTransport {
    fn channel(&self, name: &str) -> Result<(SendEndpoint, ReceiveEndpoint)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = MemorySink {
            name: name.to_string(),
            tx: Mutex::new(Some(tx)),
        };
        Ok((
            SendEndpoint::new(name, Arc::new(sink)),
            ReceiveEndpoint::new(name, Box::new(MemorySource { rx })),
        ))
    }
}
