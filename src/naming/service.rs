//! The `Service` contract: directory tree operations offered to clients.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;

use crate::path::Path;
use crate::rpc::{CallError, ConfigError, Dispatcher, InterfaceDescriptor, TypeTag, Value, typed_stub};
use crate::storage::StorageStub;

pub const INTERFACE_NAME: &str = "Service";

#[async_trait]
pub trait Service: Send + Sync {
    async fn is_directory(&self, path: Path) -> Result<bool, CallError>;

    /// Names of the entries directly beneath `directory`, sorted.
    async fn list(&self, directory: Path) -> Result<Vec<String>, CallError>;

    /// Create an empty file on one of the storage nodes.
    async fn create_file(&self, file: Path) -> Result<bool, CallError>;

    async fn create_directory(&self, directory: Path) -> Result<bool, CallError>;

    async fn delete(&self, path: Path) -> Result<bool, CallError>;

    /// The storage node holding `file`.
    async fn get_storage(&self, file: Path) -> Result<StorageStub, CallError>;
}

pub fn interface() -> &'static InterfaceDescriptor {
    static INTERFACE: LazyLock<InterfaceDescriptor> = LazyLock::new(|| {
        InterfaceDescriptor::builder(INTERFACE_NAME)
            .method("is_directory", &[TypeTag::Path])
            .method("list", &[TypeTag::Path])
            .method("create_file", &[TypeTag::Path])
            .method("create_directory", &[TypeTag::Path])
            .method("delete", &[TypeTag::Path])
            .method("get_storage", &[TypeTag::Path])
            .build()
    });
    &INTERFACE
}

/// Build the dispatcher that serves [`Service`] calls on `S`.
pub fn dispatcher<S: Service + 'static>() -> Result<Dispatcher<S>, ConfigError> {
    Dispatcher::builder(interface().clone())
        .handle("is_directory", |service: Arc<S>, mut args| async move {
            let path: Path = args.take()?;
            service.is_directory(path).await.map(Value::from)
        })
        .handle("list", |service: Arc<S>, mut args| async move {
            let directory: Path = args.take()?;
            service.list(directory).await.map(Value::from)
        })
        .handle("create_file", |service: Arc<S>, mut args| async move {
            let file: Path = args.take()?;
            service.create_file(file).await.map(Value::from)
        })
        .handle("create_directory", |service: Arc<S>, mut args| async move {
            let directory: Path = args.take()?;
            service.create_directory(directory).await.map(Value::from)
        })
        .handle("delete", |service: Arc<S>, mut args| async move {
            let path: Path = args.take()?;
            service.delete(path).await.map(Value::from)
        })
        .handle("get_storage", |service: Arc<S>, mut args| async move {
            let file: Path = args.take()?;
            service.get_storage(file).await.map(Value::from)
        })
        .build()
}

typed_stub! {
    /// Client-side proxy for the naming server's [`Service`] interface.
    pub struct ServiceStub => interface()
}

#[async_trait]
impl Service for ServiceStub {
    async fn is_directory(&self, path: Path) -> Result<bool, CallError> {
        self.stub().call("is_directory", vec![path.into()]).await
    }

    async fn list(&self, directory: Path) -> Result<Vec<String>, CallError> {
        self.stub().call("list", vec![directory.into()]).await
    }

    async fn create_file(&self, file: Path) -> Result<bool, CallError> {
        self.stub().call("create_file", vec![file.into()]).await
    }

    async fn create_directory(&self, directory: Path) -> Result<bool, CallError> {
        self.stub().call("create_directory", vec![directory.into()]).await
    }

    async fn delete(&self, path: Path) -> Result<bool, CallError> {
        self.stub().call("delete", vec![path.into()]).await
    }

    async fn get_storage(&self, file: Path) -> Result<StorageStub, CallError> {
        self.stub().call("get_storage", vec![file.into()]).await
    }
}
