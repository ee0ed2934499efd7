//! Storage node: local file operations and the two listeners that expose them.

use std::io::SeekFrom;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::client::{self, Storage, StorageStub};
use super::command::{self, Command, CommandStub};
use crate::naming::{Registration, RegistrationStub};
use crate::path::Path;
use crate::rpc::{self, CallError, ConfigError, Fault, Listener, ListenerOptions};

/// Files stored beneath one local directory.
///
/// Every operation holds the same lock, so a read never observes a
/// half-finished write.
pub struct LocalStorage {
    root: PathBuf,
    lock: Mutex<()>,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Length of a regular file. Anything else is reported as not found.
    async fn file_len(&self, file: &Path) -> Result<u64, Fault> {
        let metadata = fs::metadata(file.to_local(&self.root))
            .await
            .map_err(|_| Fault::file_not_found(format!("{} does not exist", file)))?;
        if !metadata.is_file() {
            return Err(Fault::file_not_found(format!("{} is not a file", file)));
        }
        Ok(metadata.len())
    }

    /// Remove empty directories above `path`, stopping at the first that is not empty.
    async fn prune_empty_parents(&self, path: &Path) {
        for ancestor in path.ancestors() {
            if fs::remove_dir(ancestor.to_local(&self.root)).await.is_err() {
                break;
            }
            debug!(path = %ancestor, "Pruned empty directory");
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn size(&self, file: Path) -> Result<u64, CallError> {
        let _guard = self.lock.lock().await;
        Ok(self.file_len(&file).await?)
    }

    async fn read(&self, file: Path, offset: u64, length: u64) -> Result<Vec<u8>, CallError> {
        let _guard = self.lock.lock().await;
        let size = self.file_len(&file).await?;

        let end = offset.checked_add(length);
        if end.is_none_or(|end| end > size) {
            return Err(Fault::out_of_bounds(format!(
                "read of {} bytes at offset {} exceeds {} ({} bytes)",
                length, offset, file, size
            ))
            .into());
        }
        let length = usize::try_from(length)
            .map_err(|_| Fault::out_of_bounds(format!("read length {} too large", length)))?;

        let mut handle = fs::File::open(file.to_local(&self.root))
            .await
            .map_err(Fault::from)?;
        handle.seek(SeekFrom::Start(offset)).await.map_err(Fault::from)?;
        let mut buffer = vec![0; length];
        handle.read_exact(&mut buffer).await.map_err(Fault::from)?;
        Ok(buffer)
    }

    async fn write(&self, file: Path, offset: u64, data: Vec<u8>) -> Result<(), CallError> {
        let _guard = self.lock.lock().await;
        self.file_len(&file).await?;

        let mut handle = fs::OpenOptions::new()
            .write(true)
            .open(file.to_local(&self.root))
            .await
            .map_err(Fault::from)?;
        handle.seek(SeekFrom::Start(offset)).await.map_err(Fault::from)?;
        handle.write_all(&data).await.map_err(Fault::from)?;
        handle.flush().await.map_err(Fault::from)?;
        Ok(())
    }
}

#[async_trait]
impl Command for LocalStorage {
    async fn create(&self, file: Path) -> Result<bool, CallError> {
        let Some(parent) = file.parent() else {
            return Ok(false);
        };

        let _guard = self.lock.lock().await;
        fs::create_dir_all(parent.to_local(&self.root))
            .await
            .map_err(Fault::from)?;

        let created = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(file.to_local(&self.root))
            .await;
        match created {
            Ok(_) => {
                debug!(path = %file, "Created file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(Fault::from(e).into()),
        }
    }

    async fn delete(&self, path: Path) -> Result<bool, CallError> {
        if path.is_root() {
            return Ok(false);
        }

        let _guard = self.lock.lock().await;
        let local = path.to_local(&self.root);
        let metadata = match fs::symlink_metadata(&local).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(Fault::from(e).into()),
        };

        if metadata.is_dir() {
            fs::remove_dir_all(&local).await.map_err(Fault::from)?;
        } else {
            fs::remove_file(&local).await.map_err(Fault::from)?;
        }
        debug!(path = %path, "Deleted");
        Ok(true)
    }
}

/// Reasons a storage server fails to start.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("storage root {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to scan storage root {}: {source}", .root.display())]
    Scan {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Listener(#[from] rpc::Error),

    #[error("registration with the naming server failed: {0}")]
    Registration(#[from] CallError),
}

/// A storage node serving client and command requests for one local directory.
pub struct StorageServer {
    storage: Arc<LocalStorage>,
    client_listener: Listener<LocalStorage>,
    command_listener: Listener<LocalStorage>,
}

impl StorageServer {
    /// Create a server that binds its listeners on `bind`. Port 0 picks a free port.
    pub fn new(
        root: impl Into<PathBuf>,
        bind: IpAddr,
        client_port: u16,
        command_port: u16,
        options: ListenerOptions,
    ) -> Result<Self, ConfigError> {
        let storage = Arc::new(LocalStorage::new(root));
        let client_listener = Listener::with_address(
            client::dispatcher()?,
            Arc::clone(&storage),
            options.clone(),
            SocketAddr::new(bind, client_port),
        );
        let command_listener = Listener::with_address(
            command::dispatcher()?,
            Arc::clone(&storage),
            options,
            SocketAddr::new(bind, command_port),
        );

        Ok(Self {
            storage,
            client_listener,
            command_listener,
        })
    }

    pub fn storage(&self) -> &Arc<LocalStorage> {
        &self.storage
    }

    pub fn client_address(&self) -> Option<SocketAddr> {
        self.client_listener.address()
    }

    pub fn command_address(&self) -> Option<SocketAddr> {
        self.command_listener.address()
    }

    /// Start both listeners and register with the naming server.
    ///
    /// `hostname` is the externally routable name placed in the stubs sent
    /// to the naming server. Files the naming server reports as duplicates
    /// are deleted locally, and directories left empty are pruned.
    pub async fn start(&self, hostname: &str, naming: &RegistrationStub) -> Result<(), StartError> {
        let root = self.storage.root().to_path_buf();
        let is_dir = fs::metadata(&root).await.is_ok_and(|m| m.is_dir());
        if !is_dir {
            return Err(StartError::NotADirectory(root));
        }

        let scan_root = root.clone();
        let files = tokio::task::spawn_blocking(move || Path::list(&scan_root))
            .await
            .map_err(std::io::Error::other)
            .and_then(|listed| listed)
            .map_err(|source| StartError::Scan {
                root: root.clone(),
                source,
            })?;

        if let Err(e) = self.start_listeners() {
            self.stop().await;
            return Err(e.into());
        }

        let stubs = StorageStub::for_listener_with_host(&self.client_listener, hostname).and_then(
            |client| {
                CommandStub::for_listener_with_host(&self.command_listener, hostname)
                    .map(|command| (client, command))
            },
        );
        let (client_stub, command_stub) = match stubs {
            Ok(stubs) => stubs,
            Err(e) => {
                self.stop().await;
                return Err(e.into());
            }
        };

        info!(files = files.len(), naming = %naming.address(), "Registering with naming server");
        let duplicates = match naming.register(client_stub, command_stub, files).await {
            Ok(duplicates) => duplicates,
            Err(e) => {
                self.stop().await;
                return Err(e.into());
            }
        };

        for duplicate in &duplicates {
            if let Err(e) = Command::delete(self.storage.as_ref(), duplicate.clone()).await {
                warn!(path = %duplicate, error = %e, "Failed to delete duplicate file");
                continue;
            }
            self.storage.prune_empty_parents(duplicate).await;
        }

        info!(
            root = %root.display(),
            duplicates = duplicates.len(),
            "Storage server started"
        );
        Ok(())
    }

    fn start_listeners(&self) -> Result<(), rpc::Error> {
        self.client_listener.start()?;
        self.command_listener.start()
    }

    /// Stop both listeners and wait for their connections to drain.
    pub async fn stop(&self) {
        self.client_listener.stop();
        self.command_listener.stop();
        self.client_listener.wait().await;
        self.command_listener.wait().await;
        info!("Storage server stopped");
    }
}
