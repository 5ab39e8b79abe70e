use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use focal_realtime::call::{ActiveCall, CallService};
use focal_realtime::config::Config;
use focal_realtime::error::CallError;
use focal_realtime::session::Session;
use focal_realtime::Realtime;

/// Stand-in call service for the demo binary; a real client plugs its
/// media/signaling stack in here.
struct LoggingCallService;

#[async_trait]
impl CallService for LoggingCallService {
    async fn start(&self, call: &ActiveCall) -> Result<(), CallError> {
        tracing::info!(call_id = %call.call_id, conversation_id = %call.conversation_id, "call start");
        Ok(())
    }

    async fn accept(&self, call_id: &str) -> Result<(), CallError> {
        tracing::info!(call_id, "call accept");
        Ok(())
    }

    async fn reject(&self, call_id: &str) -> Result<(), CallError> {
        tracing::info!(call_id, "call reject");
        Ok(())
    }

    async fn hangup(&self, call_id: &str) -> Result<(), CallError> {
        tracing::info!(call_id, "call hangup");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(gateway_url = %config.gateway_url, api_url = %config.api_url, "focal-realtime configured");

    let realtime = Realtime::build(&config, Arc::new(LoggingCallService)).expect("build services");

    // Dev convenience: fabricate a session from env when nothing is persisted.
    if realtime.sessions.current().is_none() {
        if let (Ok(user_id), Ok(token)) = (
            std::env::var("FOCAL_USER_ID"),
            std::env::var("FOCAL_TOKEN"),
        ) {
            realtime
                .sessions
                .login(Session {
                    user_id,
                    token,
                    expires_at: Utc::now() + Duration::hours(12),
                })
                .expect("persist session");
        }
    }

    realtime.calls.mark_ready();

    let calls = Arc::clone(&realtime.calls);
    let _listener = realtime.gateway.add_listener(move |envelope| {
        tracing::info!(kind = %envelope.kind, "gateway event");
        calls.apply_envelope(envelope);
    });

    // Follow identity transitions: connect on login, tear down on logout.
    let mut identity = realtime.sessions.subscribe();
    let gateway = Arc::clone(&realtime.gateway);
    tokio::spawn(async move {
        while identity.changed().await.is_ok() {
            let present = identity.borrow_and_update().is_some();
            if present {
                gateway.connect();
            } else {
                gateway.disconnect().await;
            }
        }
    });

    realtime.gateway.connect();

    tokio::signal::ctrl_c().await.expect("ctrl-c handler");
    tracing::info!("shutting down");
    realtime.gateway.disconnect().await;
}
