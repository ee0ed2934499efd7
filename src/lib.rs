//! A distributed filesystem built on a small RPC framework.
//!
//! - [`rpc`]: listeners, stubs and the wire protocol between them
//! - [`naming`]: the naming server holding the directory tree
//! - [`storage`]: storage nodes holding file contents
//! - [`path`]: filesystem paths shared by all of the above

pub mod config;
pub mod logging;
pub mod naming;
pub mod path;
pub mod rpc;
pub mod storage;
