//! The naming server: the directory tree plus its two listeners.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::registration::{self, Registration};
use super::service::{self, Service};
use super::store::{NamingStore, StorageNode};
use crate::path::Path;
use crate::rpc::{self, CallError, ConfigError, Fault, Lifecycle, Listener, ListenerOptions, Status};
use crate::storage::{Command, CommandStub, StorageStub};

/// The object both naming listeners dispatch to.
#[derive(Default)]
pub struct NamingService {
    store: Mutex<NamingStore>,
}

impl NamingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of storage nodes registered so far.
    pub fn storage_nodes(&self) -> usize {
        self.lock().node_count()
    }

    fn lock(&self) -> MutexGuard<'_, NamingStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Service for NamingService {
    async fn is_directory(&self, path: Path) -> Result<bool, CallError> {
        Ok(self.lock().is_directory(&path)?)
    }

    async fn list(&self, directory: Path) -> Result<Vec<String>, CallError> {
        Ok(self.lock().list(&directory)?)
    }

    async fn create_file(&self, file: Path) -> Result<bool, CallError> {
        let reserved = self.lock().reserve_file(&file);
        let Some(command) = reserved? else {
            return Ok(false);
        };

        match command.create(file.clone()).await {
            Ok(created) => Ok(created),
            Err(e) => {
                warn!(path = %file, error = %e, "Storage node failed to create file");
                self.lock().release_file(&file);
                Err(e)
            }
        }
    }

    async fn create_directory(&self, directory: Path) -> Result<bool, CallError> {
        Ok(self.lock().create_directory(&directory)?)
    }

    async fn delete(&self, path: Path) -> Result<bool, CallError> {
        Err(Fault::unsupported(format!("cannot delete {}: deletion is not supported", path)).into())
    }

    async fn get_storage(&self, file: Path) -> Result<StorageStub, CallError> {
        Ok(self.lock().storage_for(&file)?)
    }
}

#[async_trait]
impl Registration for NamingService {
    async fn register(
        &self,
        client_stub: StorageStub,
        command_stub: CommandStub,
        files: Vec<Path>,
    ) -> Result<Vec<Path>, CallError> {
        let node = StorageNode {
            storage: client_stub,
            command: command_stub,
        };
        Ok(self.lock().register(node, files)?)
    }
}

/// Serves [`Service`] to clients and [`Registration`] to storage nodes.
pub struct NamingServer {
    service: Arc<NamingService>,
    service_listener: Listener<NamingService>,
    registration_listener: Listener<NamingService>,
    lifecycle: Mutex<Lifecycle>,
}

impl NamingServer {
    pub fn new(
        service_addr: SocketAddr,
        registration_addr: SocketAddr,
        options: ListenerOptions,
    ) -> Result<Self, ConfigError> {
        let service = Arc::new(NamingService::new());
        let service_listener = Listener::with_address(
            service::dispatcher()?,
            Arc::clone(&service),
            options.clone(),
            service_addr,
        );
        let registration_listener = Listener::with_address(
            registration::dispatcher()?,
            Arc::clone(&service),
            options,
            registration_addr,
        );

        // Either listener failing takes the other down with it.
        for (failed, other) in [
            (&service_listener, &registration_listener),
            (&registration_listener, &service_listener),
        ] {
            let other = other.downgrade();
            failed.on_stopped(move |failure| {
                if let Some(e) = failure {
                    error!(error = %e, "Naming listener failed, stopping naming server");
                    if let Some(other) = other.upgrade() {
                        other.stop();
                    }
                }
            });
        }

        Ok(Self {
            service,
            service_listener,
            registration_listener,
            lifecycle: Mutex::new(Lifecycle::new()),
        })
    }

    pub fn service(&self) -> &Arc<NamingService> {
        &self.service
    }

    pub fn service_address(&self) -> Option<SocketAddr> {
        self.service_listener.address()
    }

    pub fn registration_address(&self) -> Option<SocketAddr> {
        self.registration_listener.address()
    }

    pub fn status(&self) -> Status {
        self.lock().status()
    }

    pub fn service_stub(&self) -> Result<service::ServiceStub, rpc::Error> {
        service::ServiceStub::for_listener(&self.service_listener)
    }

    pub fn registration_stub(&self) -> Result<registration::RegistrationStub, rpc::Error> {
        registration::RegistrationStub::for_listener(&self.registration_listener)
    }

    /// Start both listeners.
    ///
    /// If either fails to start, both are stopped and the server is marked
    /// errored; it cannot be started again.
    pub fn start(&self) -> Result<(), rpc::Error> {
        let mut lifecycle = self.lock();
        if !lifecycle.can_start()? {
            return Ok(());
        }

        let started = self
            .service_listener
            .start()
            .and_then(|()| self.registration_listener.start());
        if let Err(e) = started {
            lifecycle.fail();
            self.service_listener.stop();
            self.registration_listener.stop();
            error!(error = %e, "Naming server failed to start");
            return Err(e);
        }

        lifecycle.start()?;
        info!(
            service = ?self.service_listener.address(),
            registration = ?self.registration_listener.address(),
            "Naming server started"
        );
        Ok(())
    }

    /// Stop both listeners and wait for their connections to drain.
    pub async fn stop(&self) {
        if !self.lock().stop() {
            return;
        }

        self.service_listener.stop();
        self.registration_listener.stop();
        self.service_listener.wait().await;
        self.registration_listener.wait().await;

        self.lock().complete_stop();
        info!("Naming server stopped");
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{FaultKind, StateError};

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn path(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[tokio::test]
    async fn delete_is_unsupported() {
        let service = NamingService::new();
        let err = service.delete(path("/anything")).await.unwrap_err();
        assert_eq!(err.fault().map(|f| f.kind), Some(FaultKind::Unsupported));
    }

    #[tokio::test]
    async fn create_file_without_nodes_is_illegal_state() {
        let service = NamingService::new();
        let err = service.create_file(path("/f")).await.unwrap_err();
        assert_eq!(err.fault().map(|f| f.kind), Some(FaultKind::IllegalState));
    }

    #[tokio::test]
    async fn create_file_rolls_back_when_node_is_unreachable() {
        let service = NamingService::new();

        let unused = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = unused.local_addr().unwrap().port();
        drop(unused);
        let node = rpc::Address::new("127.0.0.1", port);
        service
            .register(
                StorageStub::new(node.clone()).unwrap(),
                CommandStub::new(node).unwrap(),
                vec![],
            )
            .await
            .unwrap();

        let err = service.create_file(path("/f")).await.unwrap_err();
        assert!(err.is_rpc_failure());
        assert!(service.is_directory(path("/f")).await.is_err());
    }

    #[tokio::test]
    async fn start_and_stop_both_listeners() {
        let server = NamingServer::new(loopback(), loopback(), ListenerOptions::default()).unwrap();
        server.start().unwrap();
        assert_eq!(server.status(), Status::Running);
        assert_ne!(server.service_address().unwrap().port(), 0);
        assert_ne!(server.registration_address().unwrap().port(), 0);

        server.stop().await;
        server.stop().await;
        assert_eq!(server.status(), Status::Stopped);
    }

    #[tokio::test]
    async fn failed_start_is_not_restartable() {
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken = blocker.local_addr().unwrap();

        let server = NamingServer::new(loopback(), taken, ListenerOptions::default()).unwrap();
        assert!(matches!(server.start(), Err(rpc::Error::Bind { .. })));
        assert!(matches!(
            server.start(),
            Err(rpc::Error::State(StateError::Errored))
        ));

        server.service_listener.wait().await;
        assert_eq!(server.service_listener.status(), Status::Stopped);
    }
}
