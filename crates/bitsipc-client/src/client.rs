use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connector::Connection;
use crate::correlation::{CorrelationRegistry, PendingResponse};
use crate::dispatch::{self, Exit, MessageSink, Mode, Router};
use crate::error::{ClientError, Result};
use crate::listeners::ListenerRegistry;
use crate::message::{Message, Scopes};
use crate::stats::{ClientStats, StatsSnapshot};

const DISPATCH_THREAD_NAME: &str = "bitsipc-dispatch";

/// Who drives the dispatch loop after [`Client::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// A background thread reads and routes inbound messages.
    Background,
    /// The embedding application calls [`Client::dispatch_messages`].
    Manual,
}

/// Connection to the BITS message center.
///
/// All methods take `&self`; share the client between threads with an
/// `Arc`. Listener registrations may be made before [`start`](Self::start)
/// and are announced to the message center on every connect.
///
/// ```no_run
/// use bitsipc_client::{Client, DispatchMode, Scopes};
///
/// let client = Client::new("/tmp/bits-ipc.sock");
/// client.add_event_listener("bits-ipc#heartbeat", &Scopes::none(), |params| {
///     println!("heartbeat {params:?}");
/// })?;
/// client.start(DispatchMode::Background)?;
///
/// client.send_event("bits-ipc#Client connected", &Scopes::none(), vec![])?;
/// let bits_id = client.send_request("base#System bitsId", &Scopes::none(), vec![])?;
/// println!("{bits_id}");
///
/// client.stop();
/// # Ok::<(), bitsipc_client::ClientError>(())
/// ```
pub struct Client {
    socket_path: PathBuf,
    config: ClientConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// State reachable from both the caller side and the dispatch thread.
struct Shared {
    connection: RwLock<Option<Arc<Connection>>>,
    correlation: Arc<CorrelationRegistry>,
    listeners: ListenerRegistry,
    stats: ClientStats,
    stop: AtomicBool,
    background: AtomicBool,
    // Threads currently inside the dispatch loop. An old loop can still be
    // unwinding from a callback after a restart has spawned a new one.
    dispatch_threads: Mutex<Vec<ThreadId>>,
    // Serializes "record registration + send it" against connect-time replay.
    registration_gate: Mutex<()>,
}

impl Client {
    /// Client with default configuration for the socket at `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self::build(socket_path.into(), ClientConfig::default())
    }

    /// Client with explicit configuration.
    pub fn with_config(socket_path: impl Into<PathBuf>, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(socket_path.into(), config))
    }

    fn build(socket_path: PathBuf, config: ClientConfig) -> Self {
        Self {
            socket_path,
            config,
            shared: Arc::new(Shared {
                connection: RwLock::new(None),
                correlation: Arc::new(CorrelationRegistry::new()),
                listeners: ListenerRegistry::new(),
                stats: ClientStats::default(),
                stop: AtomicBool::new(false),
                background: AtomicBool::new(false),
                dispatch_threads: Mutex::new(Vec::new()),
                registration_gate: Mutex::new(()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Connect and, for [`DispatchMode::Background`], spawn the dispatch
    /// thread.
    ///
    /// Listener registrations recorded so far are sent before this returns.
    /// A client that was stopped or lost its connection can be started
    /// again.
    pub fn start(&self, mode: DispatchMode) -> Result<()> {
        let mut worker = lock(&self.worker);
        if self.shared.connection().is_some() {
            return Err(ClientError::AlreadyStarted);
        }
        if let Some(finished) = worker.take() {
            let _ = finished.join();
        }

        let connection = Arc::new(Connection::open(&self.socket_path, &self.config)?);
        {
            let _gate = lock(&self.shared.registration_gate);
            for registration in self.shared.listeners.registrations() {
                connection.send(&registration)?;
            }
            self.shared.stop.store(false, Ordering::Release);
            self.shared
                .background
                .store(mode == DispatchMode::Background, Ordering::Release);
            *self
                .shared
                .connection
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&connection));
        }

        if mode == DispatchMode::Background {
            let shared = Arc::clone(&self.shared);
            let reading = Arc::clone(&connection);
            let spawned = thread::Builder::new()
                .name(DISPATCH_THREAD_NAME.to_string())
                .spawn(move || shared.run_background(reading));
            match spawned {
                Ok(handle) => *worker = Some(handle),
                Err(err) => {
                    self.shared.connection_lost(&connection, "dispatch thread failed to start");
                    return Err(bitsipc_transport::TransportError::Io(err).into());
                }
            }
        }

        info!(path = ?self.socket_path, ?mode, "client started");
        Ok(())
    }

    /// Send a fire-and-forget event.
    ///
    /// `Ok` means the whole frame was written; no acknowledgement is awaited.
    pub fn send_event(&self, event: &str, scopes: &Scopes, args: Vec<Value>) -> Result<()> {
        let connection = self.connection()?;
        self.shared
            .send(&connection, &Message::event(event, scopes, args))?;
        debug!(event, "sent event");
        Ok(())
    }

    /// Send a request and wait for its result, bounded by
    /// [`ClientConfig::request_timeout`].
    pub fn send_request(&self, event: &str, scopes: &Scopes, args: Vec<Value>) -> Result<Value> {
        self.request(event, scopes, args, self.config.request_timeout)
    }

    /// Send a request and wait at most `timeout` for its result.
    pub fn send_request_timeout(
        &self,
        event: &str,
        scopes: &Scopes,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        self.request(event, scopes, args, Some(timeout))
    }

    /// Send a request and return the handle to wait on.
    ///
    /// In manual mode the response only arrives while somebody calls
    /// [`dispatch_messages`](Self::dispatch_messages).
    pub fn begin_request(
        &self,
        event: &str,
        scopes: &Scopes,
        args: Vec<Value>,
    ) -> Result<PendingResponse> {
        let connection = self.connection()?;
        let pending = self.shared.correlation.register_next();
        self.shared
            .send(&connection, &Message::request(event, pending.id(), scopes, args))?;
        debug!(event, request_id = pending.id(), "sent request");
        Ok(pending)
    }

    fn request(
        &self,
        event: &str,
        scopes: &Scopes,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        if self.shared.on_dispatch_thread() {
            return Err(ClientError::ReentrantRequest);
        }
        let pending = self.begin_request(event, scopes, args)?;

        if self.shared.background.load(Ordering::Acquire) {
            return match timeout {
                Some(timeout) => pending.wait_timeout(timeout),
                None => pending.wait(),
            };
        }
        self.pump_until_answered(pending, timeout)
    }

    // Manual mode: drive the dispatch loop from this thread until our
    // response shows up. If another thread is already pumping, wait on the
    // slot instead of competing for the reader.
    fn pump_until_answered(
        &self,
        pending: PendingResponse,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(outcome) = pending.try_take() {
                return outcome;
            }
            if let (Some(deadline), Some(timeout)) = (deadline, timeout) {
                if Instant::now() >= deadline {
                    return Err(ClientError::Timeout(timeout));
                }
            }

            match self.dispatch_messages(1) {
                Ok(_) => {}
                Err(ClientError::ReaderBusy) => {
                    let wait = deadline.map_or(self.config.read_timeout, |d| {
                        d.saturating_duration_since(Instant::now())
                            .min(self.config.read_timeout)
                    });
                    if let Some(outcome) = pending.wait_briefly(wait) {
                        return outcome;
                    }
                }
                Err(err) => return pending.try_take().unwrap_or(Err(err)),
            }
        }
    }

    /// Register a callback for inbound events named `event`.
    ///
    /// Callbacks for the same name run in registration order on the
    /// dispatch thread. Before [`start`](Self::start) the registration is
    /// only recorded; it is sent on connect.
    pub fn add_event_listener<F>(&self, event: &str, scopes: &Scopes, callback: F) -> Result<()>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let _gate = lock(&self.shared.registration_gate);
        let registration = self
            .shared
            .listeners
            .add_event_listener(event, scopes, callback);
        self.announce(&registration)
    }

    /// Install the handler answering inbound requests named `event`,
    /// replacing any previous one.
    pub fn add_request_listener<F>(&self, event: &str, scopes: &Scopes, handler: F) -> Result<()>
    where
        F: Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        let _gate = lock(&self.shared.registration_gate);
        let registration = self
            .shared
            .listeners
            .add_request_listener(event, scopes, handler);
        self.announce(&registration)
    }

    fn announce(&self, registration: &Message) -> Result<()> {
        if let Some(connection) = self.shared.connection() {
            self.shared.send(&connection, registration)?;
            debug!(
                kind = registration.kind(),
                event = registration.event_name().unwrap_or_default(),
                "registered listener"
            );
        }
        Ok(())
    }

    /// Read and route up to `max` inbound messages on the calling thread.
    /// A `max` of 0 means no limit: read until nothing arrives for one read
    /// timeout.
    ///
    /// Returns early after one read timeout with nothing to read. Fails with
    /// [`ClientError::ReaderBusy`] while the background thread or another
    /// caller is reading, and with [`ClientError::Disconnected`] once the
    /// message center closes the connection.
    pub fn dispatch_messages(&self, max: usize) -> Result<usize> {
        let connection = self.connection()?;
        let Some(mut reader) = connection.try_lock_reader() else {
            return Err(ClientError::ReaderBusy);
        };

        self.shared.enter_dispatch();
        let outcome = {
            let router = self.shared.router(connection.as_ref());
            dispatch::run(&mut reader, &router, &self.shared.stop, Mode::Bounded(max))
        };
        self.shared.leave_dispatch();
        drop(reader);

        match outcome.exit {
            Exit::Stopped | Exit::LimitReached | Exit::Idle => Ok(outcome.processed),
            Exit::Closed => {
                let reason = "connection closed by message center";
                self.shared.connection_lost(&connection, reason);
                Err(ClientError::Disconnected(reason.to_string()))
            }
            Exit::Failed(err) => {
                self.shared.connection_lost(&connection, &err.to_string());
                Err(err.into())
            }
        }
    }

    /// Disconnect, end the dispatch loop, and fail outstanding requests with
    /// [`ClientError::Disconnected`]. Idempotent.
    pub fn stop(&self) {
        let mut worker = lock(&self.worker);
        self.shared.stop.store(true, Ordering::Release);

        let connection = self
            .shared
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(connection) = &connection {
            if let Err(err) = connection.shutdown() {
                warn!(error = %err, "socket shutdown failed");
            }
        }

        if let Some(handle) = worker.take() {
            if self.shared.on_dispatch_thread() {
                // Called from a listener; the loop sees the stop flag on return.
                debug!("stop requested from the dispatch thread");
            } else if handle.join().is_err() {
                warn!("dispatch thread panicked");
            }
        }

        let failed = self.shared.correlation.fail_all("client stopped");
        if connection.is_some() {
            info!(path = ?self.socket_path, failed, "client stopped");
        }
    }

    /// Whether a connection to the message center is open.
    pub fn is_connected(&self) -> bool {
        self.shared.connection().is_some()
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.correlation.len()
    }

    /// Counters for handled and dropped inbound traffic.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn connection(&self) -> Result<Arc<Connection>> {
        self.shared.connection().ok_or(ClientError::NotConnected)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("socket_path", &self.socket_path)
            .field("connected", &self.is_connected())
            .field("pending_requests", &self.pending_requests())
            .finish()
    }
}

impl Shared {
    fn connection(&self) -> Option<Arc<Connection>> {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Send on `connection`, retiring it if the frame was cut short.
    fn send(&self, connection: &Arc<Connection>, message: &Message) -> Result<()> {
        let sent = connection.send(message);
        if sent.is_err() && connection.is_broken() {
            self.connection_lost(connection, "frame write was cut short");
        }
        sent
    }

    fn router<'a>(&'a self, replies: &'a dyn MessageSink) -> Router<'a> {
        Router {
            correlation: &self.correlation,
            listeners: &self.listeners,
            stats: &self.stats,
            replies,
        }
    }

    fn run_background(&self, connection: Arc<Connection>) {
        self.enter_dispatch();
        let outcome = {
            let mut reader = connection.lock_reader();
            let router = self.router(connection.as_ref());
            dispatch::run(&mut reader, &router, &self.stop, Mode::Continuous)
        };
        self.leave_dispatch();

        match outcome.exit {
            Exit::Closed => self.connection_lost(&connection, "connection closed by message center"),
            Exit::Failed(err) => self.connection_lost(&connection, &err.to_string()),
            _ => {}
        }
    }

    /// Forget `connection` if it is still the current one and fail every
    /// request waiting on it.
    fn connection_lost(&self, connection: &Arc<Connection>, reason: &str) {
        {
            let mut current = self
                .connection
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if current
                .as_ref()
                .is_some_and(|c| Arc::ptr_eq(c, connection))
            {
                *current = None;
            }
        }
        let _ = connection.shutdown();
        let failed = self.correlation.fail_all(reason);
        warn!(path = ?connection.path(), reason, failed, "lost connection to message center");
    }

    fn enter_dispatch(&self) {
        lock(&self.dispatch_threads).push(thread::current().id());
    }

    fn leave_dispatch(&self) {
        let current = thread::current().id();
        let mut threads = lock(&self.dispatch_threads);
        if let Some(index) = threads.iter().position(|id| *id == current) {
            threads.swap_remove(index);
        }
    }

    fn on_dispatch_thread(&self) -> bool {
        lock(&self.dispatch_threads).contains(&thread::current().id())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
