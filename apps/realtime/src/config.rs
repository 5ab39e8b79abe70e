use std::path::PathBuf;

/// Realtime client configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket gateway URL (e.g. `ws://localhost:4010/gateway`).
    pub gateway_url: String,
    /// REST API origin (e.g. `http://localhost:4000`).
    pub api_url: String,
    /// Path the authenticated session is persisted to between runs.
    pub session_file: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            gateway_url: required_var("FOCAL_GATEWAY_URL"),
            api_url: required_var("FOCAL_API_URL"),
            session_file: std::env::var("FOCAL_SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".focal-session.json")),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}
