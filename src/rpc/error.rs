//! Error taxonomy for the RPC layer.
//!
//! - [`ConfigError`]: local misuse detected before any network activity.
//! - [`StateError`]: an operation issued in the wrong lifecycle state.
//! - [`RpcFailure`]: the call could not be completed as a call.
//! - [`Fault`]: the call completed and the remote method itself failed.

use std::net::SocketAddr;

use thiserror::Error;

use super::protocol::Fault;
use super::stub::Address;

/// Invalid interfaces, missing addresses and bad factory arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{interface} is not a remote interface: method {method} cannot signal an RPC failure")]
    NotRemote { interface: String, method: String },

    #[error("{interface} declares {method} with {arity} parameter(s) more than once")]
    DuplicateMethod {
        interface: String,
        method: String,
        arity: usize,
    },

    #[error("{interface}: no handler registered for method {method}")]
    MissingHandler { interface: String, method: String },

    #[error("{interface}: handler registered for undeclared method {method}")]
    UnknownMethod { interface: String, method: String },

    #[error("{interface}: method {method} is overloaded, register handlers by arity")]
    AmbiguousHandler { interface: String, method: String },

    #[error("listener has not been assigned an address")]
    MissingAddress,

    #[error("stub hostname must not be empty")]
    EmptyHost,
}

/// Operations attempted in an invalid lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("listener is already bound to {0}")]
    AlreadyBound(SocketAddr),

    #[error("listener has no address yet")]
    Unbound,

    #[error("a previous start failed; clear the error before starting again")]
    Errored,
}

/// Errors from listener management and the stub factory.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// The call did not happen, or its outcome could not be observed.
#[derive(Debug, Error)]
pub enum RpcFailure {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: Address,
        #[source]
        source: std::io::Error,
    },

    #[error("communication error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed envelope: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("connection closed before a reply arrived")]
    Closed,

    #[error("remote service is stopping")]
    ServiceStopped,

    #[error("unexpected {0} envelope")]
    UnexpectedReply(&'static str),

    #[error("reply could not be decoded: {0}")]
    BadReply(Fault),

    #[error("call rejected by remote: {0}")]
    Rejected(Fault),
}

/// Outcome of a remote method call that did not succeed.
#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Rpc(#[from] RpcFailure),

    #[error(transparent)]
    Remote(#[from] Fault),
}

impl CallError {
    /// The remote fault, if the call completed and the method failed.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            CallError::Remote(fault) => Some(fault),
            CallError::Rpc(_) => None,
        }
    }

    pub fn is_rpc_failure(&self) -> bool {
        matches!(self, CallError::Rpc(_))
    }
}
