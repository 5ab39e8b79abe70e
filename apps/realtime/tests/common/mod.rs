//! Shared test harness: an in-process mock of the Focal backend, serving
//! both the gateway WebSocket endpoint and the unread-count REST route.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time;

use focal_realtime::gateway::client::ReconnectPolicy;
use focal_realtime::session::{Session, SessionStore};

pub struct MockBackend {
    pub addr: SocketAddr,
    state: Arc<BackendState>,
}

struct BackendState {
    frames: broadcast::Sender<String>,
    kick: broadcast::Sender<()>,
    connections: AtomicU32,
    unread: AtomicU64,
    received: Mutex<Vec<serde_json::Value>>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState {
            frames: broadcast::channel(64).0,
            kick: broadcast::channel(8).0,
            connections: AtomicU32::new(0),
            unread: AtomicU64::new(0),
            received: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/gateway", get(ws_upgrade))
            .route("/notifications/unread-count", get(unread_count))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn gateway_url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }

    pub fn api_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_unread(&self, count: u64) {
        self.state.unread.store(count, Ordering::SeqCst);
    }

    /// Number of gateway connections accepted so far.
    pub fn connections(&self) -> u32 {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Every client→server frame received, in order.
    pub fn received(&self) -> Vec<serde_json::Value> {
        self.state.received.lock().clone()
    }

    /// Push a frame to every connected client.
    pub fn send(&self, frame: serde_json::Value) {
        let _ = self.state.frames.send(frame.to_string());
    }

    /// Push a raw (possibly malformed) frame to every connected client.
    pub fn send_raw(&self, frame: &str) {
        let _ = self.state.frames.send(frame.to_string());
    }

    /// Drop every live gateway connection server-side.
    pub fn kick(&self) {
        let _ = self.state.kick.send(());
    }
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<BackendState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<BackendState>) {
    let mut frames = state.frames.subscribe();
    let mut kick = state.kick.subscribe();
    // Incremented only after subscribing, so a test that observed the new
    // count can immediately kick or push frames without losing them.
    state.connections.fetch_add(1, Ordering::SeqCst);
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str(&text) {
                        state.received.lock().push(value);
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                _ => {}
            },
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            _ = kick.recv() => break,
        }
    }
}

async fn unread_count(State(state): State<Arc<BackendState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "count": state.unread.load(Ordering::SeqCst) }))
}

/// Fast retry schedule so reconnect tests finish in milliseconds.
pub fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
    }
}

/// Session store in a temp dir with `usr_1` already logged in.
pub fn logged_in_store(dir: &tempfile::TempDir) -> Arc<SessionStore> {
    let store = Arc::new(SessionStore::load(dir.path().join("session.json")));
    store
        .login(Session {
            user_id: "usr_1".to_string(),
            token: "tok_abc".to_string(),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
        })
        .expect("login");
    store
}

/// Poll `cond` every 10ms until it holds, panicking after `timeout`.
pub async fn wait_until(timeout: Duration, what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = time::Instant::now() + timeout;
    while !cond() {
        if time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        time::sleep(Duration::from_millis(10)).await;
    }
}
