//! Call-signaling coordinator.
//!
//! Tracks a single active call's lifecycle, driven by explicit user commands
//! and by events from an external call service (the media/signaling stack is
//! out of scope behind the [`CallService`] trait). Readiness is an explicit
//! state: until [`CallCoordinator::mark_ready`] runs, every command fails
//! with [`CallError::NotReady`] instead of racing a half-initialized service.
//!
//! Lifecycle: `NotReady → Idle → (Calling | Ringing) → Connected → Ended →
//! Idle`. A remote hang-up parks in `Ended` (metadata already cleared) until
//! the user dismisses; local reject/hang-up go straight back to `Idle`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time;

use focal_common::id::{prefix, prefixed_ulid};

use crate::error::CallError;
use crate::gateway::events::{CallStatePayload, EventEnvelope, EventType, IncomingCallPayload};

/// Lifecycle of the (at most one) active call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    NotReady,
    Idle,
    /// Outgoing call awaiting remote accept.
    Calling,
    /// Incoming call awaiting local accept/reject.
    Ringing,
    Connected,
    /// Remote side ended the call; awaiting user dismissal.
    Ended,
}

/// Metadata for the active call.
#[derive(Debug, Clone)]
pub struct ActiveCall {
    pub call_id: String,
    pub conversation_id: String,
    pub remote_user_id: String,
    pub remote_name: String,
    pub is_incoming: bool,
}

/// Events pushed by the external call service.
#[derive(Debug, Clone)]
pub enum CallServiceEvent {
    Incoming {
        call_id: String,
        conversation_id: String,
        remote_user_id: String,
        remote_name: String,
    },
    Connected {
        call_id: String,
    },
    Ended {
        call_id: String,
    },
}

/// The external call service this coordinator delegates to.
#[async_trait]
pub trait CallService: Send + Sync {
    async fn start(&self, call: &ActiveCall) -> Result<(), CallError>;
    async fn accept(&self, call_id: &str) -> Result<(), CallError>;
    async fn reject(&self, call_id: &str) -> Result<(), CallError>;
    async fn hangup(&self, call_id: &str) -> Result<(), CallError>;
}

struct Slot {
    state: CallState,
    call: Option<ActiveCall>,
}

/// Single-call state machine with a per-second duration counter.
pub struct CallCoordinator {
    service: Arc<dyn CallService>,
    slot: Mutex<Slot>,
    duration_secs: Arc<AtomicU64>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl CallCoordinator {
    pub fn new(service: Arc<dyn CallService>) -> Arc<Self> {
        Arc::new(Self {
            service,
            slot: Mutex::new(Slot {
                state: CallState::NotReady,
                call: None,
            }),
            duration_secs: Arc::new(AtomicU64::new(0)),
            ticker: Mutex::new(None),
        })
    }

    /// Flip `NotReady → Idle` once the external service finished
    /// initializing. Calling it in any other state is a no-op.
    pub fn mark_ready(&self) {
        let mut slot = self.slot.lock();
        if slot.state == CallState::NotReady {
            slot.state = CallState::Idle;
        }
    }

    pub fn state(&self) -> CallState {
        self.slot.lock().state
    }

    pub fn active_call(&self) -> Option<ActiveCall> {
        self.slot.lock().call.clone()
    }

    /// Seconds since the call reached `Connected`; zero otherwise.
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs.load(Ordering::SeqCst)
    }

    /// Start an outgoing call. Metadata is set optimistically before the
    /// service is invoked and rolled back if the delegate fails.
    pub async fn start_call(
        &self,
        conversation_id: impl Into<String>,
        remote_user_id: impl Into<String>,
        remote_name: impl Into<String>,
    ) -> Result<ActiveCall, CallError> {
        let call = {
            let mut slot = self.slot.lock();
            match slot.state {
                CallState::NotReady => return Err(CallError::NotReady),
                CallState::Idle => {}
                _ => return Err(CallError::Busy),
            }
            let call = ActiveCall {
                call_id: prefixed_ulid(prefix::CALL),
                conversation_id: conversation_id.into(),
                remote_user_id: remote_user_id.into(),
                remote_name: remote_name.into(),
                is_incoming: false,
            };
            slot.state = CallState::Calling;
            slot.call = Some(call.clone());
            call
        };

        if let Err(e) = self.service.start(&call).await {
            tracing::warn!(call_id = %call.call_id, error = %e, "call start failed");
            self.clear(CallState::Idle);
            return Err(e);
        }
        Ok(call)
    }

    /// Accept the ringing incoming call.
    pub async fn accept_call(&self) -> Result<(), CallError> {
        let call_id = {
            let slot = self.slot.lock();
            let call = slot.call.as_ref().ok_or(CallError::NoActiveCall)?;
            if !call.is_incoming {
                return Err(CallError::NotIncoming);
            }
            call.call_id.clone()
        };
        self.service.accept(&call_id).await
    }

    /// Reject the ringing incoming call.
    ///
    /// Local-optimistic: state drops to `Idle` immediately; the service is
    /// notified best-effort without waiting for confirmation.
    pub async fn reject_call(&self) -> Result<(), CallError> {
        let call_id = {
            let slot = self.slot.lock();
            let call = slot.call.as_ref().ok_or(CallError::NoActiveCall)?;
            if !call.is_incoming {
                return Err(CallError::NotIncoming);
            }
            call.call_id.clone()
        };
        self.clear(CallState::Idle);
        if let Err(e) = self.service.reject(&call_id).await {
            tracing::debug!(call_id = %call_id, error = %e, "call reject delegate failed");
        }
        Ok(())
    }

    /// Force the coordinator back to `Idle` from any state. Used both for
    /// hanging up and for dismissing a finished-call UI.
    pub async fn end_call(&self) {
        let call_id = {
            let slot = self.slot.lock();
            slot.call.as_ref().map(|c| c.call_id.clone())
        };
        self.clear(CallState::Idle);
        if let Some(call_id) = call_id {
            if let Err(e) = self.service.hangup(&call_id).await {
                tracing::debug!(call_id = %call_id, error = %e, "call hangup delegate failed");
            }
        }
    }

    /// Apply a state-change event from the external service.
    pub fn handle_service_event(&self, event: CallServiceEvent) {
        match event {
            CallServiceEvent::Incoming {
                call_id,
                conversation_id,
                remote_user_id,
                remote_name,
            } => {
                let mut slot = self.slot.lock();
                if slot.state != CallState::Idle {
                    tracing::debug!(
                        %call_id,
                        state = ?slot.state,
                        "incoming call ignored while not idle"
                    );
                    return;
                }
                slot.call = Some(ActiveCall {
                    call_id,
                    conversation_id,
                    remote_user_id,
                    remote_name,
                    is_incoming: true,
                });
                slot.state = CallState::Ringing;
            }
            CallServiceEvent::Connected { call_id } => {
                {
                    let mut slot = self.slot.lock();
                    let matches = slot
                        .call
                        .as_ref()
                        .is_some_and(|c| c.call_id == call_id);
                    let pending = matches!(slot.state, CallState::Calling | CallState::Ringing);
                    if !matches || !pending {
                        tracing::debug!(%call_id, state = ?slot.state, "stray connected event");
                        return;
                    }
                    slot.state = CallState::Connected;
                }
                self.start_ticker();
            }
            CallServiceEvent::Ended { call_id } => {
                let matches = {
                    let slot = self.slot.lock();
                    slot.call.as_ref().is_some_and(|c| c.call_id == call_id)
                };
                if !matches {
                    tracing::debug!(%call_id, "stray ended event");
                    return;
                }
                self.clear(CallState::Ended);
            }
        }
    }

    /// Translate a gateway envelope into a service event, if call-related.
    pub fn apply_envelope(&self, envelope: &EventEnvelope) {
        match envelope.kind.as_str() {
            EventType::INCOMING_CALL => {
                match serde_json::from_value::<IncomingCallPayload>(envelope.data.clone()) {
                    Ok(p) => self.handle_service_event(CallServiceEvent::Incoming {
                        call_id: p.call_id,
                        conversation_id: p.conversation_id,
                        remote_user_id: p.caller_id,
                        remote_name: p.caller_name,
                    }),
                    Err(e) => tracing::warn!(error = %e, "malformed incoming_call event"),
                }
            }
            EventType::CALL_STATE => {
                match serde_json::from_value::<CallStatePayload>(envelope.data.clone()) {
                    Ok(p) => match p.state.as_str() {
                        "connected" => self.handle_service_event(CallServiceEvent::Connected {
                            call_id: p.call_id,
                        }),
                        "ended" => self.handle_service_event(CallServiceEvent::Ended {
                            call_id: p.call_id,
                        }),
                        other => {
                            tracing::debug!(state = other, "unhandled call_state value")
                        }
                    },
                    Err(e) => tracing::warn!(error = %e, "malformed call_state event"),
                }
            }
            _ => {}
        }
    }

    /// Stop the duration ticker and drop call metadata, landing in
    /// `final_state` (unless the coordinator was never ready).
    fn clear(&self, final_state: CallState) {
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
        }
        self.duration_secs.store(0, Ordering::SeqCst);
        let mut slot = self.slot.lock();
        if slot.state != CallState::NotReady {
            slot.state = final_state;
        }
        slot.call = None;
    }

    fn start_ticker(&self) {
        let counter = Arc::clone(&self.duration_secs);
        counter.store(0, Ordering::SeqCst);
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(1));
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                interval.tick().await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        if let Some(previous) = self.ticker.lock().replace(handle) {
            previous.abort();
        }
    }
}
