//! TCP IPC server — accept loop and per-connection session bridge.

use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::channel::{ReceiveEndpoint, SendEndpoint};
use crate::dispatcher::ClientChannels;
use crate::host::IsolateHost;
use crate::ipc::codec::{read_frame, write_frame, MSG_ERROR, MSG_HELLO, MSG_REQUEST, MSG_RESPONSE};
use crate::ipc::router::error_response;
use crate::types::{ClientId, Error, Result, ServerConfig};

#[derive(Debug, Deserialize)]
struct Hello {
    client_id: String,
}

/// IPC server wrapping an [`IsolateHost`].
#[derive(Debug)]
pub struct IpcServer {
    host: Arc<IsolateHost>,
    addr: SocketAddr,
    cancel: CancellationToken,
}

impl IpcServer {
    pub fn new(host: Arc<IsolateHost>, addr: SocketAddr) -> Self {
        Self {
            host,
            addr,
            cancel: CancellationToken::new(),
        }
    }

    /// Bind the configured address and serve until cancelled.
    pub async fn serve(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_listener(listener).await
    }

    /// Serve on an already bound listener until cancelled or a fatal error occurs.
    pub async fn serve_listener(&self, listener: TcpListener) -> std::io::Result<()> {
        tracing::info!("IPC server listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("IPC server shutting down");
                    break;
                }
                accept = listener.accept() => {
                    let (stream, peer) = accept?;
                    tracing::debug!("IPC connection from {}", peer);

                    let host = self.host.clone();
                    let cancel = self.cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, host, cancel).await {
                            tracing::warn!("Connection from {} error: {}", peer, e);
                        }
                    });
                }
            }
        }
        Ok(())
    }

    /// Request graceful shutdown. Open connections are closed as well.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Handshake, then pump frames between the socket and the client's session
/// channels until either side goes away.
async fn handle_connection(
    stream: TcpStream,
    host: Arc<IsolateHost>,
    cancel: CancellationToken,
) -> Result<()> {
    let server_config = host.config().server.clone();
    let max_frame_bytes = host.config().dispatcher.max_frame_bytes;
    let (mut reader, mut writer) = stream.into_split();

    let client_id = match handshake(&mut reader, max_frame_bytes, &server_config).await {
        Ok(Some(client_id)) => client_id,
        Ok(None) => return Ok(()),
        Err(e) => {
            write_json(&mut writer, MSG_ERROR, &error_response("", &e), server_config.write_timeout)
                .await?;
            return Ok(());
        }
    };

    let info = match host.connect(client_id.clone()).await {
        Ok(info) => info,
        Err(e) => {
            tracing::info!(client_id = %client_id, "session refused: {}", e);
            write_json(&mut writer, MSG_ERROR, &error_response("", &e), server_config.write_timeout)
                .await?;
            return Ok(());
        }
    };

    let channels = match ClientChannels::lookup(host.registry(), &client_id).await {
        Ok(channels) => channels,
        Err(e) => {
            warn_on_cleanup_failure(&client_id, host.disconnect(&client_id).await);
            return Err(e);
        }
    };

    let welcome = json!({ "ok": true, "body": info });
    if let Err(e) = write_json(&mut writer, MSG_RESPONSE, &welcome, server_config.write_timeout).await {
        warn_on_cleanup_failure(&client_id, host.disconnect(&client_id).await);
        return Err(e);
    }
    tracing::info!(client_id = %client_id, session_id = %info.session_id, "client connected");

    let outbound = tokio::spawn(pump_responses(
        channels.responses,
        writer,
        server_config.write_timeout,
    ));
    let inbound = pump_requests(
        &mut reader,
        &channels.requests,
        max_frame_bytes,
        server_config.read_timeout,
        &cancel,
    )
    .await;

    channels.requests.close().await;
    host.disconnect(&client_id).await?;
    if let Err(e) = outbound.await {
        tracing::warn!(client_id = %client_id, "response pump aborted: {}", e);
    }
    tracing::info!(client_id = %client_id, "client disconnected");
    inbound
}

fn warn_on_cleanup_failure(client_id: &ClientId, result: Result<()>) {
    if let Err(e) = result {
        tracing::warn!(client_id = %client_id, "session cleanup failed: {}", e);
    }
}

/// Read the HELLO frame. `None` if the peer left before sending one.
async fn handshake(
    reader: &mut OwnedReadHalf,
    max_frame_bytes: u32,
    config: &ServerConfig,
) -> Result<Option<ClientId>> {
    let frame = match tokio::time::timeout(config.read_timeout, read_frame(reader, max_frame_bytes)).await {
        Err(_elapsed) => {
            tracing::debug!("No HELLO within {:?}, dropping connection", config.read_timeout);
            return Ok(None);
        }
        Ok(result) => match result? {
            Some(frame) => frame,
            None => return Ok(None),
        },
    };

    if frame.kind != MSG_HELLO {
        return Err(Error::invalid_argument(format!(
            "Expected HELLO, got message type 0x{:02X}",
            frame.kind
        )));
    }
    let hello: Hello = serde_json::from_slice(&frame.payload)?;
    ClientId::from_string(hello.client_id)
        .map(Some)
        .map_err(Error::invalid_argument)
}

/// Socket → client→service channel. Ends on EOF, idle timeout, shutdown or
/// a protocol violation.
async fn pump_requests(
    reader: &mut OwnedReadHalf,
    requests: &SendEndpoint,
    max_frame_bytes: u32,
    read_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            frame_result = tokio::time::timeout(read_timeout, read_frame(reader, max_frame_bytes)) => {
                match frame_result {
                    Err(_elapsed) => {
                        tracing::debug!("Read timeout ({:?}), dropping connection", read_timeout);
                        return Ok(());
                    }
                    Ok(result) => match result? {
                        Some(frame) => frame,
                        None => return Ok(()),
                    },
                }
            }
        };

        if frame.kind != MSG_REQUEST {
            return Err(Error::invalid_argument(format!(
                "Unexpected message type: 0x{:02X}",
                frame.kind
            )));
        }

        match requests.send(frame.payload).await {
            Ok(()) => {}
            Err(e) if e.is_channel_closed() => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

/// Service→client channel → socket. Ends when the session closes the
/// channel or the peer stops accepting writes.
async fn pump_responses(responses: ReceiveEndpoint, mut writer: OwnedWriteHalf, write_timeout: Duration) {
    loop {
        let message = match responses.recv().await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("response channel failed: {}", e);
                break;
            }
        };
        if let Err(e) = timed_write(&mut writer, MSG_RESPONSE, &message, write_timeout).await {
            tracing::debug!("dropping responses for departed peer: {}", e);
            break;
        }
    }
}

async fn write_json(
    writer: &mut OwnedWriteHalf,
    msg_type: u8,
    value: &Value,
    timeout: Duration,
) -> Result<()> {
    let encoded = serde_json::to_vec(value)?;
    timed_write(writer, msg_type, &encoded, timeout).await?;
    Ok(())
}

/// Write a frame with a timeout. Returns an error if the write takes too long
/// (prevents slow consumers from holding connections indefinitely).
async fn timed_write<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg_type: u8,
    payload: &[u8],
    timeout: Duration,
) -> std::io::Result<()> {
    tokio::time::timeout(timeout, write_frame(writer, msg_type, payload))
        .await
        .map_err(|_| {
            tracing::warn!("Write timeout ({:?}), dropping connection", timeout);
            std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout")
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_cleanup_failure_is_logged() {
        let client_id = ClientId::must("midlet-1");
        warn_on_cleanup_failure(&client_id, Ok(()));
        assert!(!logs_contain("session cleanup failed"));

        warn_on_cleanup_failure(&client_id, Err(Error::internal("worker join failed")));
        assert!(logs_contain("session cleanup failed"));
        assert!(logs_contain("worker join failed"));
    }
}
