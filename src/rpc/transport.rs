//! TCP transport for listeners.
//!
//! Handles one accepted connection with newline-delimited JSON framing.
//! Each connection is handled in its own task and processes requests
//! strictly one at a time.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::dispatch::Dispatcher;
use super::lifecycle::Status;
use super::protocol::{self, Envelope};

/// Resolves once the listener has left the running state.
pub(crate) async fn stopping(status: &mut watch::Receiver<Status>) {
    // An error means the listener is gone, which is as good as stopping.
    let _ = status.wait_for(|s| *s != Status::Running).await;
}

/// Serve a single client connection until it disconnects or the listener stops.
pub(crate) async fn serve_connection<T: Send + Sync + 'static>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    dispatcher: Arc<Dispatcher<T>>,
    server: Arc<T>,
    mut status: watch::Receiver<Status>,
) {
    debug!(peer = %peer_addr, "Client connected");
    if let Err(e) = handle_connection(stream, peer_addr, &dispatcher, &server, &mut status).await {
        debug!(peer = %peer_addr, error = %e, "Connection error");
    }
    debug!(peer = %peer_addr, "Client disconnected");
}

async fn handle_connection<T: Send + Sync + 'static>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    dispatcher: &Dispatcher<T>,
    server: &Arc<T>,
    status: &mut watch::Receiver<Status>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();

        let bytes_read = tokio::select! {
            biased;
            _ = stopping(status) => {
                debug!(peer = %peer_addr, "Listener stopping, ending session");
                send(&mut writer, &Envelope::ServiceStop).await?;
                break;
            }
            read = protocol::read_line(&mut reader, &mut line) => match read {
                Ok(bytes_read) => bytes_read,
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    warn!(peer = %peer_addr, error = %e, "Corrupt input, closing connection");
                    break;
                }
                Err(e) => return Err(e.into()),
            },
        };

        if bytes_read == 0 {
            // EOF - client disconnected
            break;
        }

        if line.trim().is_empty() {
            continue;
        }

        let envelope = match Envelope::from_line(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "Malformed envelope, closing connection");
                break;
            }
        };

        let reply = match envelope {
            Envelope::InterfaceQuery => Envelope::InterfaceReply(dispatcher.interface().clone()),
            Envelope::Invoke(invocation) => match dispatcher.dispatch(server, invocation).await {
                Ok(value) => Envelope::InvokeSuccess(value),
                Err(fault) => Envelope::InvokeFailure(fault),
            },
            Envelope::ServiceStop => {
                debug!(peer = %peer_addr, "Client ended session");
                break;
            }
            other => {
                warn!(
                    peer = %peer_addr,
                    kind = other.kind(),
                    "Unexpected envelope from client, closing connection"
                );
                break;
            }
        };

        send(&mut writer, &reply).await?;
    }

    Ok(())
}

async fn send(writer: &mut OwnedWriteHalf, envelope: &Envelope) -> anyhow::Result<()> {
    let line = envelope.to_line()?;
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}
