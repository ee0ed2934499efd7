//! Storage nodes.
//!
//! A storage node keeps file contents in a local directory and exposes two
//! interfaces: [`Storage`] for clients reading and writing data, and
//! [`Command`] for the naming server creating and deleting files.

pub mod client;
pub mod command;
pub mod server;

pub use client::{Storage, StorageStub};
pub use command::{Command, CommandStub};
pub use server::{LocalStorage, StartError, StorageServer};
