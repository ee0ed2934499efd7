//! Client side of a listener connection.
//!
//! A [`Connection`] performs strictly sequential request/response exchanges
//! over one TCP stream. Stubs open a fresh connection for every call.

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

use super::error::{CallError, RpcFailure};
use super::interface::InterfaceDescriptor;
use super::protocol::{self, Envelope, FaultKind, Invocation};
use super::stub::Address;
use super::value::Value;

/// An open connection to a listener.
pub struct Connection {
    address: Address,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    line: String,
}

impl Connection {
    /// Connect to the listener at `address`. One attempt, no retry.
    pub async fn open(address: &Address) -> Result<Self, RpcFailure> {
        let stream = TcpStream::connect((address.host(), address.port()))
            .await
            .map_err(|source| RpcFailure::Connect {
                address: address.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;

        debug!(addr = %address, "Connected");

        let (reader, writer) = stream.into_split();
        Ok(Self {
            address: address.clone(),
            reader: BufReader::new(reader),
            writer,
            line: String::new(),
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), RpcFailure> {
        let line = envelope.to_line()?;
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Wait for the next envelope. End of stream is [`RpcFailure::Closed`].
    pub async fn receive(&mut self) -> Result<Envelope, RpcFailure> {
        self.line.clear();
        let bytes_read = protocol::read_line(&mut self.reader, &mut self.line).await?;
        if bytes_read == 0 {
            return Err(RpcFailure::Closed);
        }
        Ok(Envelope::from_line(&self.line)?)
    }

    pub async fn exchange(&mut self, envelope: &Envelope) -> Result<Envelope, RpcFailure> {
        self.send(envelope).await?;
        self.receive().await
    }

    /// Ask the listener which interface it serves.
    pub async fn query_interface(&mut self) -> Result<InterfaceDescriptor, RpcFailure> {
        match self.exchange(&Envelope::InterfaceQuery).await? {
            Envelope::InterfaceReply(interface) => Ok(interface),
            Envelope::ServiceStop => Err(RpcFailure::ServiceStopped),
            other => Err(RpcFailure::UnexpectedReply(other.kind())),
        }
    }

    /// Perform one method call.
    pub async fn invoke(&mut self, invocation: Invocation) -> Result<Value, CallError> {
        match self.exchange(&Envelope::Invoke(invocation)).await? {
            Envelope::InvokeSuccess(value) => Ok(value),
            Envelope::InvokeFailure(fault) if fault.kind == FaultKind::Rpc => {
                Err(RpcFailure::Rejected(fault).into())
            }
            Envelope::InvokeFailure(fault) => Err(CallError::Remote(fault)),
            Envelope::ServiceStop => Err(RpcFailure::ServiceStopped.into()),
            other => Err(RpcFailure::UnexpectedReply(other.kind()).into()),
        }
    }

    /// Shut down the write side so the listener sees end of stream.
    pub async fn close(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!(addr = %self.address, error = %e, "Error closing connection");
        }
    }
}
