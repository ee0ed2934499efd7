//! The `Storage` contract: file access offered by a storage node to clients.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;

use crate::path::Path;
use crate::rpc::{CallError, ConfigError, Dispatcher, InterfaceDescriptor, TypeTag, Value, typed_stub};

pub const INTERFACE_NAME: &str = "Storage";

/// Read and write access to the files a storage node holds.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Length of `file` in bytes.
    async fn size(&self, file: Path) -> Result<u64, CallError>;

    /// Read `length` bytes starting at `offset`.
    async fn read(&self, file: Path, offset: u64, length: u64) -> Result<Vec<u8>, CallError>;

    /// Write `data` at `offset`, extending the file if needed.
    async fn write(&self, file: Path, offset: u64, data: Vec<u8>) -> Result<(), CallError>;
}

pub fn interface() -> &'static InterfaceDescriptor {
    static INTERFACE: LazyLock<InterfaceDescriptor> = LazyLock::new(|| {
        InterfaceDescriptor::builder(INTERFACE_NAME)
            .method("size", &[TypeTag::Path])
            .method("read", &[TypeTag::Path, TypeTag::Int, TypeTag::Int])
            .method("write", &[TypeTag::Path, TypeTag::Int, TypeTag::Bytes])
            .build()
    });
    &INTERFACE
}

/// Build the dispatcher that serves [`Storage`] calls on `S`.
pub fn dispatcher<S: Storage + 'static>() -> Result<Dispatcher<S>, ConfigError> {
    Dispatcher::builder(interface().clone())
        .handle("size", |storage: Arc<S>, mut args| async move {
            let file: Path = args.take()?;
            storage.size(file).await.map(Value::from)
        })
        .handle("read", |storage: Arc<S>, mut args| async move {
            let file: Path = args.take()?;
            let offset: u64 = args.take()?;
            let length: u64 = args.take()?;
            storage.read(file, offset, length).await.map(Value::from)
        })
        .handle("write", |storage: Arc<S>, mut args| async move {
            let file: Path = args.take()?;
            let offset: u64 = args.take()?;
            let data: Vec<u8> = args.take()?;
            storage.write(file, offset, data).await.map(Value::from)
        })
        .build()
}

typed_stub! {
    /// Client-side proxy for a storage node's [`Storage`] interface.
    pub struct StorageStub => interface()
}

#[async_trait]
impl Storage for StorageStub {
    async fn size(&self, file: Path) -> Result<u64, CallError> {
        self.stub().call("size", vec![file.into()]).await
    }

    async fn read(&self, file: Path, offset: u64, length: u64) -> Result<Vec<u8>, CallError> {
        self.stub()
            .call("read", vec![file.into(), offset.into(), length.into()])
            .await
    }

    async fn write(&self, file: Path, offset: u64, data: Vec<u8>) -> Result<(), CallError> {
        self.stub()
            .call("write", vec![file.into(), offset.into(), data.into()])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{Address, Stub};

    #[test]
    fn interface_is_remote() {
        assert!(interface().validate().is_ok());
        assert_eq!(interface().name(), "Storage");
    }

    #[test]
    fn wrong_interface_is_refused() {
        let command = Stub::new(
            crate::storage::command::interface().clone(),
            Address::new("127.0.0.1", 7000),
        )
        .unwrap();
        assert!(StorageStub::try_from(command).is_err());

        let storage = StorageStub::new(Address::new("127.0.0.1", 7000)).unwrap();
        assert_eq!(StorageStub::try_from(storage.stub().clone()), Ok(storage));
    }
}
