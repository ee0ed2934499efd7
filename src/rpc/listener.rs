//! Listeners: remote endpoints that serve one interface for one server object.
//!
//! A listener owns a TCP socket and an accept task. Every accepted
//! connection gets its own handler task. Stopping closes the socket, asks
//! every handler to finish its current exchange, and waits up to one drain
//! interval at a time before forcibly closing whatever is left.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info};

use super::dispatch::Dispatcher;
use super::error::{ConfigError, Error, StateError};
use super::interface::InterfaceDescriptor;
use super::lifecycle::{Lifecycle, Status};
use super::transport;

/// Called once the listener has fully stopped.
///
/// The argument is the accept error that brought the listener down, or
/// `None` for an orderly stop.
pub type StoppedHook = Arc<dyn Fn(Option<&io::Error>) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ListenerOptions {
    /// How long a stop waits for open connections before closing them.
    pub drain_interval: Duration,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            drain_interval: Duration::from_secs(1),
        }
    }
}

/// A remote endpoint for one server object.
///
/// Cloning yields another handle to the same listener.
pub struct Listener<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// A handle that does not keep the listener alive.
pub struct WeakListener<T> {
    shared: Weak<Shared<T>>,
}

impl<T> WeakListener<T> {
    pub fn upgrade(&self) -> Option<Listener<T>> {
        self.shared.upgrade().map(|shared| Listener { shared })
    }
}

impl<T> Listener<T> {
    pub fn downgrade(&self) -> WeakListener<T> {
        WeakListener {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

struct Shared<T> {
    dispatcher: Arc<Dispatcher<T>>,
    server: Arc<T>,
    options: ListenerOptions,
    state: Mutex<State>,
    status: watch::Sender<Status>,
    drained: Notify,
    on_stopped: Mutex<Option<StoppedHook>>,
}

#[derive(Default)]
struct State {
    lifecycle: Lifecycle,
    address: Option<SocketAddr>,
    connections: HashMap<u64, JoinHandle<()>>,
    next_connection: u64,
}

/// Removes a connection from the table when its task ends or is aborted.
struct ConnectionGuard<T> {
    shared: Arc<Shared<T>>,
    id: u64,
}

impl<T> Drop for ConnectionGuard<T> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.connections.remove(&self.id);
        if state.connections.is_empty() {
            self.shared.drained.notify_one();
        }
    }
}

impl<T: Send + Sync + 'static> Listener<T> {
    /// Create a listener with no address. One is required before [`start`](Self::start).
    pub fn new(dispatcher: Dispatcher<T>, server: Arc<T>, options: ListenerOptions) -> Self {
        let (status, _) = watch::channel(Status::Stopped);
        Self {
            shared: Arc::new(Shared {
                dispatcher: Arc::new(dispatcher),
                server,
                options,
                state: Mutex::new(State::default()),
                status,
                drained: Notify::new(),
                on_stopped: Mutex::new(None),
            }),
        }
    }

    /// Create a listener that will bind `addr`. Port 0 picks a free port at start.
    pub fn with_address(
        dispatcher: Dispatcher<T>,
        server: Arc<T>,
        options: ListenerOptions,
        addr: SocketAddr,
    ) -> Self {
        let listener = Self::new(dispatcher, server, options);
        listener.shared.lock().address = Some(addr);
        listener
    }

    /// Assign the address to bind. Only allowed once.
    pub fn bind(&self, addr: SocketAddr) -> Result<(), Error> {
        let mut state = self.shared.lock();
        if let Some(existing) = state.address {
            return Err(StateError::AlreadyBound(existing).into());
        }
        state.address = Some(addr);
        Ok(())
    }

    /// The listener's address. After a start this is the address actually bound.
    pub fn address(&self) -> Option<SocketAddr> {
        self.shared.lock().address
    }

    pub fn status(&self) -> Status {
        self.shared.lock().lifecycle.status()
    }

    pub fn interface(&self) -> &InterfaceDescriptor {
        self.shared.dispatcher.interface()
    }

    pub fn is_errored(&self) -> bool {
        self.shared.lock().lifecycle.is_errored()
    }

    /// Allow a start after a failed one.
    pub fn clear_error(&self) {
        self.shared.lock().lifecycle.clear_error();
    }

    /// Number of connection handlers still alive.
    pub fn active_connections(&self) -> usize {
        self.shared.lock().connections.len()
    }

    /// Replace the hook run when the listener has fully stopped.
    pub fn on_stopped(&self, hook: impl Fn(Option<&io::Error>) + Send + Sync + 'static) {
        *self
            .shared
            .on_stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    /// Bind the socket and begin accepting connections.
    ///
    /// A no-op while running or stopping. On a bind failure the listener is
    /// marked errored and stays stopped. Must be called within a Tokio runtime.
    pub fn start(&self) -> Result<(), Error> {
        let mut state = self.shared.lock();
        if !state.lifecycle.can_start()? {
            return Ok(());
        }

        let addr = state.address.ok_or(ConfigError::MissingAddress)?;
        let socket = match bind_socket(addr) {
            Ok(socket) => socket,
            Err(source) => {
                state.lifecycle.fail();
                error!(interface = %self.interface().name(), addr = %addr, error = %source, "Failed to bind");
                return Err(Error::Bind { addr, source });
            }
        };

        state.address = Some(socket.local_addr);
        state.lifecycle.start()?;
        self.shared.status.send_replace(Status::Running);
        drop(state);

        info!(interface = %self.interface().name(), addr = %socket.local_addr, "Listening");
        tokio::spawn(accept_loop(Arc::clone(&self.shared), socket.listener));
        Ok(())
    }

    /// Begin an orderly stop. Returns immediately; use [`wait`](Self::wait)
    /// to block until every connection has drained.
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// Resolve once the listener is stopped.
    pub async fn wait(&self) {
        let mut status = self.shared.status.subscribe();
        let _ = status.wait_for(|s| *s == Status::Stopped).await;
    }
}

struct BoundSocket {
    listener: TcpListener,
    local_addr: SocketAddr,
}

fn bind_socket(addr: SocketAddr) -> io::Result<BoundSocket> {
    let std_listener = std::net::TcpListener::bind(addr)?;
    std_listener.set_nonblocking(true)?;
    let local_addr = std_listener.local_addr()?;
    let listener = TcpListener::from_std(std_listener)?;
    Ok(BoundSocket {
        listener,
        local_addr,
    })
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_stop(&self) {
        let mut state = self.lock();
        if state.lifecycle.stop() {
            self.status.send_replace(Status::Stopping);
            info!(interface = %self.dispatcher.interface().name(), "Stopping listener");
        }
    }
}

impl<T: Send + Sync + 'static> Shared<T> {
    /// Hand an accepted stream to a new handler task.
    ///
    /// Spawns with the state lock released; the task's guard takes that lock
    /// when dropped. The task serves only once its handle is in the table.
    fn admit(self: &Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        let id = {
            let mut state = self.lock();
            if state.lifecycle.status() != Status::Running {
                debug!(peer = %peer_addr, "Dropping connection accepted while stopping");
                return;
            }
            let id = state.next_connection;
            state.next_connection += 1;
            id
        };

        let guard = ConnectionGuard {
            shared: Arc::clone(self),
            id,
        };
        let dispatcher = Arc::clone(&self.dispatcher);
        let server = Arc::clone(&self.server);
        let status = self.status.subscribe();
        let (admitted, ready) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let _guard = guard;
            if ready.await.is_err() {
                return;
            }
            transport::serve_connection(stream, peer_addr, dispatcher, server, status).await;
        });

        {
            let mut state = self.lock();
            // A closed gate means the task was already dropped along with its guard.
            if state.lifecycle.status() != Status::Running || admitted.is_closed() {
                debug!(peer = %peer_addr, "Dropping connection admitted while stopping");
                return;
            }
            state.connections.insert(id, task);
        }
        let _ = admitted.send(());
    }

    /// Wait for every handler to exit, aborting stragglers after each drain interval.
    async fn drain(&self) {
        loop {
            let remaining = self.lock().connections.len();
            if remaining == 0 {
                return;
            }

            debug!(remaining, "Waiting for connections to drain");
            let drained = tokio::time::timeout(self.options.drain_interval, self.drained.notified());
            if drained.await.is_ok() {
                continue;
            }

            let stragglers: Vec<AbortHandle> = self
                .lock()
                .connections
                .values()
                .map(JoinHandle::abort_handle)
                .collect();
            if !stragglers.is_empty() {
                info!(count = stragglers.len(), "Closing connections still open after drain interval");
            }
            for handle in stragglers {
                handle.abort();
            }
        }
    }

    fn finish(&self, failure: Option<io::Error>) {
        {
            let mut state = self.lock();
            state.lifecycle.complete_stop();
            self.status.send_replace(Status::Stopped);
        }
        info!(interface = %self.dispatcher.interface().name(), "Listener stopped");

        let hook = self
            .on_stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match hook {
            Some(hook) => hook(failure.as_ref()),
            None => {
                if let Some(e) = &failure {
                    error!(interface = %self.dispatcher.interface().name(), error = %e, "Listener stopped after accept failure");
                }
            }
        }
    }
}

async fn accept_loop<T: Send + Sync + 'static>(shared: Arc<Shared<T>>, listener: TcpListener) {
    let mut status = shared.status.subscribe();

    let failure = loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => shared.admit(stream, peer_addr),
                Err(e) => break Some(e),
            },
            _ = transport::stopping(&mut status) => break None,
        }
    };

    // Close the socket before draining so no new connections queue up.
    drop(listener);

    if let Some(e) = &failure {
        error!(error = %e, "Accept failed, stopping listener");
        shared.request_stop();
    }

    shared.drain().await;
    shared.finish(failure);
}
