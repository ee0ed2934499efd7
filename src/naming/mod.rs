//! The naming server.
//!
//! Clients talk to it through [`Service`] to browse the directory tree and
//! find which storage node holds a file. Storage nodes announce themselves
//! through [`Registration`].

pub mod registration;
pub mod server;
pub mod service;
mod store;

pub use registration::{Registration, RegistrationStub};
pub use server::{NamingServer, NamingService};
pub use service::{Service, ServiceStub};

/// Well-known port of the client-facing service interface.
pub const SERVICE_PORT: u16 = 6000;

/// Well-known port of the registration interface.
pub const REGISTRATION_PORT: u16 = 6001;
