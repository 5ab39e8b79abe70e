pub mod api;
pub mod call;
pub mod config;
pub mod error;
pub mod gateway;
pub mod notifications;
pub mod session;

use std::sync::Arc;

use api::ApiClient;
use call::{CallCoordinator, CallService};
use config::Config;
use error::RealtimeError;
use gateway::client::GatewayClient;
use notifications::NotificationCenter;
use session::SessionStore;

/// The real-time service graph, constructed once at process start and passed
/// down explicitly. No global singletons: every component owns its state and
/// exposes a narrow interface.
#[derive(Clone)]
pub struct Realtime {
    pub sessions: Arc<SessionStore>,
    pub notifications: Arc<NotificationCenter>,
    pub gateway: Arc<GatewayClient>,
    pub calls: Arc<CallCoordinator>,
}

impl Realtime {
    /// Wire the services together. The call coordinator starts `NotReady`;
    /// call [`CallCoordinator::mark_ready`] once `call_service` finished its
    /// own initialization.
    pub fn build(
        config: &Config,
        call_service: Arc<dyn CallService>,
    ) -> Result<Self, RealtimeError> {
        let sessions = Arc::new(SessionStore::load(&config.session_file));
        let notifications = Arc::new(NotificationCenter::new());
        let api = ApiClient::new(&config.api_url)?;
        let gateway = GatewayClient::new(
            &config.gateway_url,
            Arc::clone(&sessions),
            api,
            Arc::clone(&notifications),
        );
        let calls = CallCoordinator::new(call_service);

        Ok(Self {
            sessions,
            notifications,
            gateway,
            calls,
        })
    }
}
