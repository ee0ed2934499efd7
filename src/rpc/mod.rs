//! RPC framework used by every server in the filesystem.
//!
//! A server object is exposed through a [`Listener`], which accepts TCP
//! connections and dispatches invocations against the object's interface
//! descriptor. Clients hold a [`Stub`], which opens one connection per call.
//!
//! ## Architecture
//!
//! - `protocol`: wire envelopes, invocations and faults
//! - `value`: tagged argument and return values
//! - `interface`: interface descriptors and method signatures
//! - `dispatch`: signature table mapping invocations to handlers
//! - `lifecycle`: the stopped/running/stopping state machine
//! - `listener`: accept loop, connection tracking and drain
//! - `transport`: per-connection handler with newline-delimited JSON framing
//! - `client`: client side of one connection
//! - `stub`: stubs, addresses and the stub factory

pub mod client;
pub mod dispatch;
pub mod error;
pub mod interface;
pub mod lifecycle;
pub mod listener;
pub mod protocol;
pub mod stub;
mod transport;
pub mod value;

pub use client::Connection;
pub use dispatch::{Arguments, Dispatcher, DispatcherBuilder};
pub use error::{CallError, ConfigError, Error, RpcFailure, StateError};
pub use interface::{InterfaceDescriptor, MethodSignature};
pub use lifecycle::{Lifecycle, Status};
pub use listener::{Listener, ListenerOptions, WeakListener};
pub use protocol::{Envelope, Fault, FaultKind, Invocation};
pub(crate) use stub::typed_stub;
pub use stub::{Address, Stub};
pub use value::{FromValue, TypeTag, Value};
