//! Wire protocol types.
//!
//! Every message is an [`Envelope`] serialized as one line of JSON. The
//! newline terminates the envelope, so no length prefix is needed.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::interface::InterfaceDescriptor;
use super::value::Value;

/// The unit of exchange between a client connection and a listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Envelope {
    /// Ask the listener which interface it serves.
    InterfaceQuery,
    /// Reply to [`Envelope::InterfaceQuery`].
    InterfaceReply(InterfaceDescriptor),
    /// Call a method on the bound server object.
    Invoke(Invocation),
    /// The method returned normally.
    InvokeSuccess(Value),
    /// The method failed, or could not be called.
    InvokeFailure(Fault),
    /// Sent by either side before it stops using the connection.
    ServiceStop,
}

/// Method name plus ordered arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Category of a transmitted failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    FileNotFound,
    InvalidArgument,
    IllegalState,
    OutOfBounds,
    Io,
    Unsupported,
    /// The call itself could not be carried out.
    Rpc,
    /// The method panicked.
    Internal,
}

/// A failure raised by a remote method, transmitted as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Envelope {
    /// Kind name as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::InterfaceQuery => "interface_query",
            Envelope::InterfaceReply(_) => "interface_reply",
            Envelope::Invoke(_) => "invoke",
            Envelope::InvokeSuccess(_) => "invoke_success",
            Envelope::InvokeFailure(_) => "invoke_failure",
            Envelope::ServiceStop => "service_stop",
        }
    }

    /// Serialize as a single newline-terminated line.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}

/// Longest accepted envelope line, newline included.
pub const MAX_LINE: u64 = 8 * 1024 * 1024;

/// Read one envelope line, failing with `InvalidData` past [`MAX_LINE`].
pub(crate) async fn read_line<R>(reader: &mut R, line: &mut String) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    read_line_limited(reader, line, MAX_LINE).await
}

async fn read_line_limited<R>(reader: &mut R, line: &mut String, limit: u64) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let bytes_read = (&mut *reader).take(limit + 1).read_line(line).await?;
    if bytes_read as u64 > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("envelope line exceeds {} bytes", limit),
        ));
    }
    Ok(bytes_read)
}

impl Invocation {
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn file_not_found(message: impl Into<String>) -> Self {
        Self::new(FaultKind::FileNotFound, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(FaultKind::InvalidArgument, message)
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new(FaultKind::IllegalState, message)
    }

    pub fn out_of_bounds(message: impl Into<String>) -> Self {
        Self::new(FaultKind::OutOfBounds, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Unsupported, message)
    }

    pub fn rpc(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Rpc, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Internal, message)
    }

    /// The fault sent when no declared method matches an invocation.
    pub fn no_such_method(method: &str) -> Self {
        Self::rpc(format!("no such method ({}) with given parameters", method))
    }
}

impl From<std::io::Error> for Fault {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::file_not_found(e.to_string()),
            _ => Self::new(FaultKind::Io, e.to_string()),
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::FileNotFound => "file not found",
            FaultKind::InvalidArgument => "invalid argument",
            FaultKind::IllegalState => "illegal state",
            FaultKind::OutOfBounds => "out of bounds",
            FaultKind::Io => "i/o error",
            FaultKind::Unsupported => "unsupported",
            FaultKind::Rpc => "rpc failure",
            FaultKind::Internal => "internal error",
        };
        f.write_str(name)
    }
}
