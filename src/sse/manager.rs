//! Subscriber registry and connection lifecycle management.
//!
//! [`Client`] is the façade the rest of the application talks to. It owns at
//! most one [`session`](super::session) at a time and multiplexes it across
//! every registered listener. Session starts are coalesced (a freshly
//! registered first listener waits out [`Config::start_coalesce`] before a
//! connection is made) and teardown is debounced (the session survives
//! [`Config::teardown_grace`] after the last listener leaves), so rapid
//! subscribe/unsubscribe churn never flaps the physical connection.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::Config;
use super::error::StreamError;
use super::parse::Frame;
use super::session::{self, ConnectionState};
use crate::Result;
use crate::auth::TokenProvider;
use crate::error::Error;
use crate::types::Notification;

/// Callback invoked with every notification delivered over the stream.
pub type NotificationHandler = Arc<dyn Fn(Notification) + Send + Sync>;

/// Callback invoked when the stream hits a transport failure.
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// One registered listener.
struct Listener {
    on_notification: NotificationHandler,
    on_error: Option<ErrorHandler>,
}

/// A running session and the means to stop it.
struct Session {
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Registry and scheduled work, all behind one lock.
///
/// The timers are named fields rather than ad hoc timer ids so that any
/// transition can deterministically cancel a stale one.
#[derive(Default)]
struct Registry {
    listeners: BTreeMap<u64, Listener>,
    next_listener_id: u64,
    next_generation: u64,
    scheduled_start: Option<JoinHandle<()>>,
    scheduled_teardown: Option<JoinHandle<()>>,
    session: Option<Session>,
}

/// Notification stream client.
///
/// The application instantiates exactly one and shares it (clones are cheap
/// handles onto the same state), e.g. behind a `std::sync::OnceLock`. The type
/// itself is an ordinary service object with injectable dependencies so tests
/// can substitute token sources and timings.
///
/// # Example
///
/// ```ignore
/// static STREAM: OnceLock<Client> = OnceLock::new();
///
/// let client = STREAM.get_or_init(|| {
///     Client::new(&api_base, Arc::new(token_store), Config::default())
///         .expect("stream client")
/// });
///
/// let subscription = client.connect(|n| ui.push_toast(n));
/// // ... on logout:
/// client.destroy();
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    /// Handle to ourselves for timer tasks; a fired timer must not keep the
    /// client alive on its own.
    weak_self: Weak<ClientInner>,
    config: Config,
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    stream_url: String,
    /// Watch channel sender for state changes (enables reconnection detection)
    state_tx: watch::Sender<ConnectionState>,
    /// Watch channel receiver kept so `send` never fails and `state()` can borrow
    state_rx: watch::Receiver<ConnectionState>,
    registry: Mutex<Registry>,
}

impl Client {
    /// Create a new notification stream client.
    ///
    /// `base_url` is the API base; the client connects to
    /// `{base_url}/notifications/stream`. No connection is made until the
    /// first listener registers.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is empty or the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>, config: Config) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(Error::validation("base_url cannot be empty"));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        let stream_url = format!("{}/notifications/stream", base_url.trim_end_matches('/'));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            inner: Arc::new_cyclic(|weak| ClientInner {
                weak_self: weak.clone(),
                config,
                http,
                tokens,
                stream_url,
                state_tx,
                state_rx,
                registry: Mutex::new(Registry::default()),
            }),
        })
    }

    /// Register a listener for notifications.
    ///
    /// Registration is synchronous and immediate: the listener is part of the
    /// dispatch set even while the physical connection is still being
    /// established. If this is the first listener, a session start is
    /// scheduled after the coalescing delay.
    ///
    /// The returned [`Subscription`] removes the listener when dropped.
    pub fn connect<F>(&self, on_notification: F) -> Subscription
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        self.inner.register(Arc::new(on_notification), None)
    }

    /// Register a listener for notifications and transport errors.
    ///
    /// The error callback observes transport failures (connection refused,
    /// non-success status, mid-stream read errors). It is informational: the
    /// client retries on its own regardless.
    pub fn connect_with_errors<F, E>(&self, on_notification: F, on_error: E) -> Subscription
    where
        F: Fn(Notification) + Send + Sync + 'static,
        E: Fn(&Error) + Send + Sync + 'static,
    {
        self.inner
            .register(Arc::new(on_notification), Some(Arc::new(on_error)))
    }

    /// Hard-stop for logout: clears every listener, cancels all scheduled
    /// work, and aborts the in-flight connection immediately, bypassing the
    /// teardown grace period.
    ///
    /// The client remains usable; a later `connect` starts over from scratch.
    pub fn destroy(&self) {
        let mut registry = self.inner.lock_registry();
        registry.listeners.clear();
        if let Some(handle) = registry.scheduled_start.take() {
            handle.abort();
        }
        if let Some(handle) = registry.scheduled_teardown.take() {
            handle.abort();
        }
        if let Some(session) = registry.session.take() {
            session.cancel.cancel();
            session.task.abort();
        }
        drop(registry);

        tracing::debug!("notification stream client destroyed");
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    ///
    /// Returns a receiver that notifies when the connection state changes,
    /// useful for surfacing a "live"/"offline" indicator.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Get the number of currently registered listeners.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_registry().listeners.len()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("stream_url", &self.inner.stream_url)
            .field("state", &*self.inner.state_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl ClientInner {
    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn tokens(&self) -> &dyn TokenProvider {
        self.tokens.as_ref()
    }

    pub(crate) fn stream_url(&self) -> &str {
        &self.stream_url
    }

    /// Publish a state transition. Re-publishing the current state is a
    /// no-op so observers only wake on real changes.
    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// We can recover from a poisoned lock because the registry has no
    /// inconsistent intermediate state.
    fn lock_registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(
        &self,
        on_notification: NotificationHandler,
        on_error: Option<ErrorHandler>,
    ) -> Subscription {
        let mut registry = self.lock_registry();
        let id = registry.next_listener_id;
        registry.next_listener_id += 1;
        registry.listeners.insert(
            id,
            Listener {
                on_notification,
                on_error,
            },
        );

        // A listener arriving always cancels a pending teardown.
        if let Some(handle) = registry.scheduled_teardown.take() {
            handle.abort();
        }

        let is_first = registry.listeners.len() == 1;
        if is_first && registry.session.is_none() && registry.scheduled_start.is_none() {
            tracing::debug!(
                delay = ?self.config.start_coalesce,
                "first listener registered, scheduling stream start"
            );
            registry.scheduled_start = Some(self.spawn_scheduled_start());
        }
        drop(registry);

        Subscription {
            inner: self.weak_self.clone(),
            id,
            active: true,
        }
    }

    /// Schedule a session start after the coalescing delay.
    fn spawn_scheduled_start(&self) -> JoinHandle<()> {
        let weak = self.weak_self.clone();
        let delay = self.config.start_coalesce;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.start_session_if_wanted();
            }
        })
    }

    fn start_session_if_wanted(&self) {
        let Some(strong) = self.weak_self.upgrade() else {
            return;
        };
        let mut registry = self.lock_registry();
        registry.scheduled_start = None;

        // The coalescing window absorbed a subscribe/unsubscribe pair, or a
        // session already exists: skip the start entirely.
        if registry.listeners.is_empty() || registry.session.is_some() {
            return;
        }

        let generation = registry.next_generation;
        registry.next_generation += 1;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(session::run_session(strong, cancel.clone(), generation));
        registry.session = Some(Session {
            generation,
            cancel,
            task,
        });
    }

    fn remove_listener(&self, id: u64) {
        let mut registry = self.lock_registry();
        if registry.listeners.remove(&id).is_none() {
            return;
        }
        if !registry.listeners.is_empty() {
            return;
        }

        // Last listener gone: never start a pending session, and give a
        // running one a grace period before stopping it.
        if let Some(handle) = registry.scheduled_start.take() {
            handle.abort();
        }
        if registry.session.is_some() && registry.scheduled_teardown.is_none() {
            tracing::debug!(
                grace = ?self.config.teardown_grace,
                "last listener removed, scheduling stream teardown"
            );
            registry.scheduled_teardown = Some(self.spawn_scheduled_teardown());
        }
    }

    /// Schedule a session stop after the grace period.
    fn spawn_scheduled_teardown(&self) -> JoinHandle<()> {
        let weak = self.weak_self.clone();
        let grace = self.config.teardown_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = weak.upgrade() {
                inner.teardown_if_drained();
            }
        })
    }

    fn teardown_if_drained(&self) {
        let session = {
            let mut registry = self.lock_registry();
            registry.scheduled_teardown = None;
            if !registry.listeners.is_empty() {
                return;
            }
            registry.session.take()
        };

        if let Some(session) = session {
            tracing::debug!("no listeners past grace period, stopping notification stream");
            // Cooperative stop: the session observes the token at its next
            // suspension point and exits without reconnecting.
            session.cancel.cancel();
        }
    }

    /// Called by the session driver on its way out. Clears the slot unless a
    /// newer session has already replaced it.
    pub(crate) fn finish_session(&self, generation: u64) {
        let mut registry = self.lock_registry();
        if registry
            .session
            .as_ref()
            .is_some_and(|s| s.generation == generation)
        {
            registry.session = None;
        }
    }

    /// Interpret one parsed frame.
    pub(crate) fn route_frame(&self, frame: &Frame) {
        match frame.event.as_str() {
            "connected" => tracing::debug!("server acknowledged stream establishment"),
            "heartbeat" => tracing::trace!("stream heartbeat"),
            "notification" if frame.is_content_less() => {
                tracing::trace!("content-less notification frame");
            }
            "notification" => match serde_json::from_str::<Notification>(&frame.data) {
                Ok(notification) => {
                    tracing::debug!(id = %notification.id, "notification received");
                    self.dispatch_notification(&notification);
                }
                // A bad payload costs one frame, never the connection.
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed notification payload");
                    self.dispatch_error(&Error::from(StreamError::MessageParse(e)));
                }
            },
            other => {
                if frame.is_content_less() {
                    tracing::trace!(event = %other, "content-less frame");
                } else {
                    tracing::debug!(event = %other, "ignoring unrecognized frame type");
                }
            }
        }
    }

    /// Deliver a notification to every registered listener.
    ///
    /// Iterates over a snapshot so listeners registered or removed from
    /// inside a callback cannot corrupt the iteration, and isolates each
    /// callback so one panicking listener cannot block delivery to the rest.
    fn dispatch_notification(&self, notification: &Notification) {
        let snapshot: Vec<NotificationHandler> = {
            let registry = self.lock_registry();
            registry
                .listeners
                .values()
                .map(|listener| Arc::clone(&listener.on_notification))
                .collect()
        };

        for handler in snapshot {
            let delivery = catch_unwind(AssertUnwindSafe(|| handler(notification.clone())));
            if delivery.is_err() {
                tracing::error!(id = %notification.id, "notification listener panicked");
            }
        }
    }

    /// Report a transport failure to every listener that asked for errors.
    pub(crate) fn dispatch_error(&self, error: &Error) {
        let snapshot: Vec<ErrorHandler> = {
            let registry = self.lock_registry();
            registry
                .listeners
                .values()
                .filter_map(|listener| listener.on_error.as_ref().map(Arc::clone))
                .collect()
        };

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(error))).is_err() {
                tracing::error!("error listener panicked");
            }
        }
    }
}

/// Guard for one registered listener.
///
/// Dropping the guard (or calling [`unsubscribe`](Subscription::unsubscribe))
/// removes the listener; when the last one goes, the shared connection is
/// torn down after the grace period. The guard holds no network resources
/// itself and outliving the [`Client`] is harmless.
pub struct Subscription {
    inner: Weak<ClientInner>,
    id: u64,
    active: bool,
}

impl Subscription {
    /// Remove the listener now. Equivalent to dropping the guard.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(inner) = self.inner.upgrade() {
            inner.remove_listener(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
