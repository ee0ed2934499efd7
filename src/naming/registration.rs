//! The `Registration` contract: how storage nodes join the filesystem.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;

use crate::path::Path;
use crate::rpc::{CallError, ConfigError, Dispatcher, InterfaceDescriptor, TypeTag, Value, typed_stub};
use crate::storage::{CommandStub, StorageStub, client, command};

pub const INTERFACE_NAME: &str = "Registration";

#[async_trait]
pub trait Registration: Send + Sync {
    /// Register a storage node and the files it already holds.
    ///
    /// Returns the files the node must delete because the naming server
    /// already knows them, or because they clash with an existing file.
    async fn register(
        &self,
        client_stub: StorageStub,
        command_stub: CommandStub,
        files: Vec<Path>,
    ) -> Result<Vec<Path>, CallError>;
}

pub fn interface() -> &'static InterfaceDescriptor {
    static INTERFACE: LazyLock<InterfaceDescriptor> = LazyLock::new(|| {
        InterfaceDescriptor::builder(INTERFACE_NAME)
            .method(
                "register",
                &[
                    TypeTag::Stub(client::INTERFACE_NAME.to_string()),
                    TypeTag::Stub(command::INTERFACE_NAME.to_string()),
                    TypeTag::List,
                ],
            )
            .build()
    });
    &INTERFACE
}

/// Build the dispatcher that serves [`Registration`] calls on `R`.
pub fn dispatcher<R: Registration + 'static>() -> Result<Dispatcher<R>, ConfigError> {
    Dispatcher::builder(interface().clone())
        .handle("register", |registration: Arc<R>, mut args| async move {
            let client_stub: StorageStub = args.take()?;
            let command_stub: CommandStub = args.take()?;
            let files: Vec<Path> = args.take()?;
            registration
                .register(client_stub, command_stub, files)
                .await
                .map(Value::from)
        })
        .build()
}

typed_stub! {
    /// Client-side proxy for the naming server's [`Registration`] interface.
    pub struct RegistrationStub => interface()
}

#[async_trait]
impl Registration for RegistrationStub {
    async fn register(
        &self,
        client_stub: StorageStub,
        command_stub: CommandStub,
        files: Vec<Path>,
    ) -> Result<Vec<Path>, CallError> {
        self.stub()
            .call(
                "register",
                vec![client_stub.into(), command_stub.into(), files.into()],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{Address, Value};

    #[test]
    fn register_matches_only_the_right_stub_kinds() {
        let storage = StorageStub::new(Address::new("127.0.0.1", 7000)).unwrap();
        let command = CommandStub::new(Address::new("127.0.0.1", 7001)).unwrap();

        let good = [
            Value::from(&storage),
            Value::from(&command),
            Value::from(Vec::<Path>::new()),
        ];
        assert!(interface().resolve("register", &good).is_some());

        let swapped = [
            Value::from(&command),
            Value::from(&storage),
            Value::from(Vec::<Path>::new()),
        ];
        assert!(interface().resolve("register", &swapped).is_none());
    }
}
