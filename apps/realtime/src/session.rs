//! Authenticated session state, persisted across restarts.
//!
//! The store owns the current identity and credential. Everything else in the
//! process observes identity transitions through [`SessionStore::subscribe`]
//! instead of reaching into shared globals.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::RealtimeError;

/// The authenticated identity plus its bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Durable session store with identity-transition notifications.
pub struct SessionStore {
    path: PathBuf,
    current: Mutex<Option<Session>>,
    tx: watch::Sender<Option<Session>>,
}

impl SessionStore {
    /// Open the store, restoring a persisted session if one exists.
    ///
    /// Corrupt or expired session files are discarded with a log line; they
    /// never fail startup.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let session = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Session>(&raw) {
                Ok(s) if !s.is_expired() => Some(s),
                Ok(s) => {
                    tracing::debug!(
                        path = %path.display(),
                        user_id = %s.user_id,
                        "persisted session expired, discarding"
                    );
                    None
                }
                Err(e) => {
                    tracing::warn!(?e, path = %path.display(), "corrupt session file, discarding");
                    None
                }
            },
            Err(_) => None,
        };

        let (tx, _) = watch::channel(session.clone());
        Self {
            path,
            current: Mutex::new(session),
            tx,
        }
    }

    /// Install a new session, persisting it and notifying subscribers.
    pub fn login(&self, session: Session) -> Result<(), RealtimeError> {
        self.persist(&session)?;
        *self.current.lock() = Some(session.clone());
        let _ = self.tx.send(Some(session));
        Ok(())
    }

    /// Replace the credential and expiry of the current session in place.
    pub fn refresh(
        &self,
        token: String,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RealtimeError> {
        let updated = {
            let mut cur = self.current.lock();
            let session = cur.as_mut().ok_or(RealtimeError::NoSession)?;
            session.token = token;
            session.expires_at = expires_at;
            session.clone()
        };
        self.persist(&updated)?;
        let _ = self.tx.send(Some(updated));
        Ok(())
    }

    /// Destroy the session and its on-disk copy. Idempotent.
    pub fn logout(&self) -> Result<(), RealtimeError> {
        *self.current.lock() = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let _ = self.tx.send(None);
        Ok(())
    }

    /// Current session, if present and unexpired.
    pub fn current(&self) -> Option<Session> {
        let mut cur = self.current.lock();
        match cur.as_ref() {
            Some(s) if s.is_expired() => {
                tracing::debug!(user_id = %s.user_id, "session expired");
                *cur = None;
                let _ = self.tx.send(None);
                None
            }
            Some(s) => Some(s.clone()),
            None => None,
        }
    }

    /// Watch identity transitions (`Some` on login/refresh, `None` on logout).
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }

    fn persist(&self, session: &Session) -> Result<(), RealtimeError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(user_id: &str, hours: i64) -> Session {
        Session {
            user_id: user_id.to_string(),
            token: "tok_secret".to_string(),
            expires_at: Utc::now() + Duration::hours(hours),
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::load(dir.path().join("session.json"))
    }

    #[test]
    fn login_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.login(session("usr_1", 12)).unwrap();

        let reloaded = store_in(&dir);
        let current = reloaded.current().unwrap();
        assert_eq!(current.user_id, "usr_1");
        assert_eq!(current.token, "tok_secret");
    }

    #[test]
    fn expired_session_is_discarded_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.login(session("usr_1", -1)).unwrap();

        let reloaded = store_in(&dir);
        assert!(reloaded.current().is_none());
    }

    #[test]
    fn corrupt_file_is_discarded_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = SessionStore::load(path);
        assert!(store.current().is_none());
    }

    #[test]
    fn current_expires_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.login(session("usr_1", -1)).unwrap();
        assert!(store.current().is_none());
    }

    #[test]
    fn logout_is_idempotent_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.login(session("usr_1", 12)).unwrap();

        store.logout().unwrap();
        store.logout().unwrap();
        assert!(store.current().is_none());
        assert!(!dir.path().join("session.json").exists());
    }

    #[test]
    fn refresh_without_session_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let err = store.refresh("tok_new".into(), Utc::now()).unwrap_err();
        assert!(matches!(err, RealtimeError::NoSession));
    }

    #[test]
    fn refresh_updates_credential() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.login(session("usr_1", 1)).unwrap();
        store
            .refresh("tok_new".into(), Utc::now() + Duration::hours(24))
            .unwrap();
        assert_eq!(store.current().unwrap().token, "tok_new");
    }

    #[test]
    fn subscribe_sees_identity_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let rx = store.subscribe();
        assert!(rx.borrow().is_none());

        store.login(session("usr_1", 12)).unwrap();
        assert_eq!(rx.borrow().as_ref().unwrap().user_id, "usr_1");

        store.logout().unwrap();
        assert!(rx.borrow().is_none());
    }
}
