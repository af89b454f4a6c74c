//! Unix stream socket front-end.
//!
//! Accepts any number of concurrent connections; each connection is
//! handled by its own task and is independent of the others. The server
//! never sends unsolicited frames, and a failed request does not close
//! the connection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use super::protocol;
use crate::bus::message::HandlerId;
use crate::bus::MessageBus;
use crate::error::{Result, StrataError};

/// Listens on a Unix stream socket and feeds decoded requests to the
/// storage coordinator via the bus.
pub struct SocketServer {
    listener: UnixListener,
    path: PathBuf,
    bus: Arc<MessageBus>,
}

impl SocketServer {
    /// Bind the listener, replacing any stale socket file.
    pub fn bind(path: impl AsRef<Path>, bus: Arc<MessageBus>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed stale socket file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(&path)?;
        info!(path = %path.display(), "listening on unix socket");
        Ok(Self {
            listener,
            path,
            bus,
        })
    }

    /// The bound socket path.
    pub fn local_path(&self) -> &Path {
        &self.path
    }

    /// Accept loop. Runs until cancelled or the listener fails.
    pub async fn run(&self) -> Result<()> {
        loop {
            let (stream, _addr) = self.listener.accept().await?;
            debug!("client connected");
            let bus = Arc::clone(&self.bus);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, bus).await {
                    warn!("connection ended with error: {e}");
                }
            });
        }
    }
}

/// Per-connection loop: one JSON request per line, one JSON reply per line.
async fn handle_connection(stream: UnixStream, bus: Arc<MessageBus>) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match dispatch_line(&bus, &line).await {
            Ok(frame) => frame,
            Err(StrataError::ShuttingDown) => {
                // shutdown: drop the request and close the connection
                debug!("bus shutting down, closing connection");
                break;
            }
            Err(
                e @ (StrataError::HandlerNotFound(_) | StrataError::HandlerAlreadyRegistered(_)),
            ) => {
                // a build misconfiguration, not a client mistake
                error!("bus misconfiguration: {e}");
                protocol::encode_error(&e.to_string())
            }
            Err(e) => {
                warn!("request failed: {e}");
                protocol::encode_error(&e.to_string())
            }
        };

        write_half.write_all(reply.as_bytes()).await?;
        write_half.write_all(b"\n").await?;
        write_half.flush().await?;
    }

    debug!("client disconnected");
    Ok(())
}

/// Decode, dispatch to the coordinator, and encode the reply.
async fn dispatch_line(bus: &MessageBus, line: &str) -> Result<String> {
    let request = protocol::decode_request(line)?;
    let response = bus.request(HandlerId::Storage, request).await?;
    Ok(protocol::encode_response(&response))
}
