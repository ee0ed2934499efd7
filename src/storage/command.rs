//! The `Command` contract: maintenance requests from the naming server.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;

use crate::path::Path;
use crate::rpc::{CallError, ConfigError, Dispatcher, InterfaceDescriptor, TypeTag, Value, typed_stub};

pub const INTERFACE_NAME: &str = "Command";

#[async_trait]
pub trait Command: Send + Sync {
    /// Create an empty file, along with any missing parent directories.
    ///
    /// Returns false if the file already exists or `file` is the root.
    async fn create(&self, file: Path) -> Result<bool, CallError>;

    /// Delete a file, or a directory and everything beneath it.
    ///
    /// Returns false if nothing was there or `path` is the root.
    async fn delete(&self, path: Path) -> Result<bool, CallError>;
}

pub fn interface() -> &'static InterfaceDescriptor {
    static INTERFACE: LazyLock<InterfaceDescriptor> = LazyLock::new(|| {
        InterfaceDescriptor::builder(INTERFACE_NAME)
            .method("create", &[TypeTag::Path])
            .method("delete", &[TypeTag::Path])
            .build()
    });
    &INTERFACE
}

/// Build the dispatcher that serves [`Command`] calls on `C`.
pub fn dispatcher<C: Command + 'static>() -> Result<Dispatcher<C>, ConfigError> {
    Dispatcher::builder(interface().clone())
        .handle("create", |command: Arc<C>, mut args| async move {
            let file: Path = args.take()?;
            command.create(file).await.map(Value::from)
        })
        .handle("delete", |command: Arc<C>, mut args| async move {
            let path: Path = args.take()?;
            command.delete(path).await.map(Value::from)
        })
        .build()
}

typed_stub! {
    /// Client-side proxy for a storage node's [`Command`] interface.
    pub struct CommandStub => interface()
}

#[async_trait]
impl Command for CommandStub {
    async fn create(&self, file: Path) -> Result<bool, CallError> {
        self.stub().call("create", vec![file.into()]).await
    }

    async fn delete(&self, path: Path) -> Result<bool, CallError> {
        self.stub().call("delete", vec![path.into()]).await
    }
}
