use thiserror::Error;

/// Errors surfaced by the real-time client library.
///
/// Connectivity and parse failures inside the gateway loop are handled
/// locally (logged, retried or dropped) and never reach callers; these
/// variants cover explicit operations like session persistence and the
/// unread-count fetch.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("no authenticated session")]
    NoSession,
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("session persistence error: {0}")]
    Persist(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors returned by explicit call commands.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("call service is not ready")]
    NotReady,
    #[error("another call is already in progress")]
    Busy,
    #[error("no active call")]
    NoActiveCall,
    #[error("current call is not incoming")]
    NotIncoming,
    #[error("call service error: {0}")]
    Service(String),
}
