//! Byte-stream transport: messages travel as length-prefixed frames.
//!
//! [`FramedSink`] and [`FramedSource`] wrap any `AsyncWrite` / `AsyncRead`
//! half, so the same code serves in-process duplex pipes and TCP sockets.
//! A clean EOF between frames is a normal close; EOF inside a frame or a
//! frame of the wrong type is an I/O fault.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::endpoint::{MessageSink, MessageSource, ReceiveEndpoint, SendEndpoint, Transport};
use crate::ipc::codec::{read_frame, write_frame, MSG_DATA};
use crate::types::{Error, Result};

/// Default in-process pipe buffer for [`FramedTransport`].
const PIPE_BUFFER_BYTES: usize = 64 * 1024;

/// Write side over an async byte stream.
#[derive(Debug)]
pub struct FramedSink<W> {
    name: String,
    writer: Mutex<Option<W>>,
}

impl<W> FramedSink<W> {
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer: Mutex::new(Some(writer)),
        }
    }
}

#[async_trait]
impl<W> MessageSink for FramedSink<W>
where
    W: AsyncWrite + Unpin + Send + Sync + std::fmt::Debug,
{
    async fn send(&self, message: Vec<u8>) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::channel_closed(format!("{} closed by writer", self.name)))?;
        match write_frame(writer, MSG_DATA, &message).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                guard.take();
                Err(Error::channel_closed(format!("{} closed by reader", self.name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("shutdown of {} failed: {}", self.name, e);
            }
        }
    }
}

/// Read side over an async byte stream.
#[derive(Debug)]
pub struct FramedSource<R> {
    name: String,
    reader: Option<R>,
    max_frame_bytes: u32,
}

impl<R> FramedSource<R> {
    pub fn new(name: impl Into<String>, reader: R, max_frame_bytes: u32) -> Self {
        Self {
            name: name.into(),
            reader: Some(reader),
            max_frame_bytes,
        }
    }
}

#[async_trait]
impl<R> MessageSource for FramedSource<R>
where
    R: AsyncRead + Unpin + Send + std::fmt::Debug,
{
    async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        match read_frame(reader, self.max_frame_bytes).await? {
            None => {
                self.reader = None;
                Ok(None)
            }
            Some(frame) if frame.kind == MSG_DATA => Ok(Some(frame.payload)),
            Some(frame) => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{}: unexpected frame type 0x{:02X}", self.name, frame.kind),
            ))),
        }
    }

    fn close(&mut self) {
        self.reader = None;
    }
}

/// In-process framed channels over `tokio::io::duplex` pipes.
#[derive(Debug, Clone, Copy)]
pub struct FramedTransport {
    max_frame_bytes: u32,
}

impl FramedTransport {
    pub fn new(max_frame_bytes: u32) -> Self {
        Self { max_frame_bytes }
    }
}

impl Transport for FramedTransport {
    fn channel(&self, name: &str) -> Result<(SendEndpoint, ReceiveEndpoint)> {
        let (write_half, read_half) = tokio::io::duplex(PIPE_BUFFER_BYTES);
        Ok((
            SendEndpoint::new(name, Arc::new(FramedSink::new(name, write_half))),
            ReceiveEndpoint::new(
                name,
                Box::new(FramedSource::new(name, read_half, self.max_frame_bytes)),
            ),
        ))
    }
}
