//! Gateway connection manager.
//!
//! Owns at most one live WebSocket connection per authenticated session. A
//! supervisor task dials the gateway, authenticates with a post-connect
//! message, pumps inbound events into the notification aggregator and the
//! listener fan-out, and recovers from unexpected drops with bounded
//! exponential backoff. A deliberate [`GatewayClient::disconnect`] cancels
//! any pending reconnect atomically with closing the socket.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::api::ApiClient;
use crate::error::RealtimeError;
use crate::notifications::NotificationCenter;
use crate::session::{Session, SessionStore};

use super::events::{ClientMessage, EventEnvelope, EventType, ServerEvent};
use super::fanout::{ListenerGuard, ListenerRegistry};

/// Timeout for the WebSocket dial + handshake. Expiry counts as a failed
/// attempt and goes through the normal backoff schedule.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection lifecycle, observable by the embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Retry schedule for unexpected disconnects.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Automatic reconnection stops after this many failed attempts.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30000),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `n` (0-indexed): `min(base · 2^n, max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

struct Shared {
    conn_state: Mutex<ConnectionState>,
    retries: AtomicU32,
    shutdown: AtomicBool,
    /// Replaced on every `connect()` so a stale wake from a previous
    /// teardown cannot leak into a new supervisor run.
    cancel: Mutex<Arc<Notify>>,
}

/// Client-side gateway connection manager.
pub struct GatewayClient {
    gateway_url: String,
    sessions: Arc<SessionStore>,
    api: ApiClient,
    notifications: Arc<NotificationCenter>,
    listeners: ListenerRegistry,
    policy: ReconnectPolicy,
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl GatewayClient {
    pub fn new(
        gateway_url: impl Into<String>,
        sessions: Arc<SessionStore>,
        api: ApiClient,
        notifications: Arc<NotificationCenter>,
    ) -> Arc<Self> {
        Self::with_policy(
            gateway_url,
            sessions,
            api,
            notifications,
            ReconnectPolicy::default(),
        )
    }

    pub fn with_policy(
        gateway_url: impl Into<String>,
        sessions: Arc<SessionStore>,
        api: ApiClient,
        notifications: Arc<NotificationCenter>,
        policy: ReconnectPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway_url: gateway_url.into(),
            sessions,
            api,
            notifications,
            listeners: ListenerRegistry::new(),
            policy,
            shared: Arc::new(Shared {
                conn_state: Mutex::new(ConnectionState::Disconnected),
                retries: AtomicU32::new(0),
                shutdown: AtomicBool::new(false),
                cancel: Mutex::new(Arc::new(Notify::new())),
            }),
            supervisor: Mutex::new(None),
        })
    }

    /// Register a listener for inbound gateway events.
    pub fn add_listener(
        &self,
        callback: impl Fn(&EventEnvelope) + Send + Sync + 'static,
    ) -> ListenerGuard {
        self.listeners.add(callback)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.conn_state.lock()
    }

    /// Start the connection supervisor.
    ///
    /// No-ops (with a debug log) when no valid session exists or a
    /// supervisor is already running. Recovery from exhausted retries
    /// requires calling this again, typically on an identity transition.
    pub fn connect(self: &Arc<Self>) {
        if self.sessions.current().is_none() {
            tracing::debug!("gateway connect skipped: no authenticated session");
            return;
        }

        let mut supervisor = self.supervisor.lock();
        if supervisor.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::debug!("gateway connect skipped: supervisor already running");
            return;
        }

        self.shared.shutdown.store(false, Ordering::SeqCst);
        self.shared.retries.store(0, Ordering::SeqCst);
        *self.shared.cancel.lock() = Arc::new(Notify::new());

        let client = Arc::clone(self);
        *supervisor = Some(tokio::spawn(async move { client.run().await }));
    }

    /// Tear down the connection and cancel any pending reconnect. Idempotent.
    pub async fn disconnect(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.cancel.lock().notify_one();

        let handle = self.supervisor.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        *self.shared.conn_state.lock() = ConnectionState::Disconnected;
    }

    fn set_state(&self, state: ConnectionState) {
        *self.shared.conn_state.lock() = state;
    }

    async fn run(self: Arc<Self>) {
        let cancel = self.shared.cancel.lock().clone();

        loop {
            if self.shared.shutdown.load(Ordering::SeqCst) {
                break;
            }
            let Some(session) = self.sessions.current() else {
                tracing::debug!("gateway supervisor stopping: session gone");
                break;
            };

            self.set_state(ConnectionState::Connecting);
            let dialed = match time::timeout(
                CONNECT_TIMEOUT,
                tokio_tungstenite::connect_async(self.gateway_url.as_str()),
            )
            .await
            {
                Ok(Ok((ws, _))) => Some(ws),
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "gateway dial failed");
                    None
                }
                Err(_) => {
                    tracing::debug!("gateway dial timed out");
                    None
                }
            };

            if let Some(ws) = dialed {
                if let Err(e) = self.drive_connection(ws, &session, &cancel).await {
                    tracing::debug!(error = %e, "gateway connection error");
                }
            }
            self.set_state(ConnectionState::Disconnected);

            if self.shared.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let attempt = self.shared.retries.load(Ordering::SeqCst);
            if attempt >= self.policy.max_retries {
                tracing::warn!(
                    attempts = attempt,
                    "gateway reconnect attempts exhausted; staying disconnected"
                );
                break;
            }

            let delay = self.policy.delay(attempt);
            self.shared.retries.fetch_add(1, Ordering::SeqCst);
            tracing::info!(attempt = attempt + 1, ?delay, "scheduling gateway reconnect");

            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = cancel.notified() => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::debug!("gateway supervisor stopped");
    }

    /// Authenticate, join, and pump one live connection until it closes.
    async fn drive_connection(
        &self,
        ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
        session: &Session,
        cancel: &Notify,
    ) -> Result<(), RealtimeError> {
        let (mut ws_tx, mut ws_rx) = ws.split();

        // Credential goes in a post-connect message, never the URL.
        let auth = serde_json::to_string(&ClientMessage::Authenticate {
            token: session.token.clone(),
        })?;
        ws_tx.send(Message::Text(auth.into())).await?;

        let join = serde_json::to_string(&ClientMessage::JoinConversations {
            user_id: session.user_id.clone(),
        })?;
        ws_tx.send(Message::Text(join.into())).await?;

        self.shared.retries.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);
        tracing::info!(user_id = %session.user_id, "gateway connected");

        // Seed the authoritative unread count. Failure is non-fatal.
        match self.api.unread_count(&session.token).await {
            Ok(count) => self.notifications.seed_unread(count),
            Err(e) => tracing::warn!(error = %e, "unread-count seed failed"),
        }

        loop {
            tokio::select! {
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!("gateway closed by server");
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "gateway read error");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                },
                _ = cancel.notified() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }

    /// Parse and dispatch one inbound frame. Malformed frames are logged and
    /// dropped; they never affect connection state.
    fn handle_text(&self, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed gateway frame");
                return;
            }
        };
        let event: ServerEvent = match serde_json::from_value(value.clone()) {
            Ok(ev) => ev,
            Err(e) => {
                tracing::warn!(error = %e, "dropping unrecognized gateway frame");
                return;
            }
        };

        match event.kind.as_str() {
            EventType::NOTIFICATION => match event.notification {
                Some(payload) => {
                    self.notifications.push(payload);
                }
                None => tracing::warn!("notification event without payload"),
            },
            EventType::NOTIFICATION_READ => match event.notification_id.as_deref() {
                Some(id) => {
                    self.notifications.mark_read(id);
                }
                None => tracing::warn!("notification_read event without id"),
            },
            // `new_message` never changes unread state on its own; the
            // backend emits a paired `notification` event for that.
            _ => {}
        }

        self.listeners.dispatch(&EventEnvelope {
            kind: event.kind,
            data: value,
        });
    }
}
