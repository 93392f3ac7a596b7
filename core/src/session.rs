//! Transport sessions and the guard that keeps them alive.
//!
//! # Design
//! A `Session` wraps the transport client plus the configuration it was built
//! from. Spawned exchanges hold their own clone, so a session lives at least
//! as long as any request using it. `SessionGuard` additionally retains the
//! session of the most recently completed request: an ephemeral session
//! built for a one-off dispatch survives until its completion callback has
//! returned, even if the caller dropped every other handle.
//!
//! The guard holds exactly one session. Retaining a new one releases the
//! previous one, so an older session may outlive its last request until the
//! next request completes. This is a last-one-wins slot, not reference
//! counting; the mutex keeps concurrent completions from racing on it.

use std::sync::{Arc, Mutex, PoisonError};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::SessionError;

#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    client: reqwest::Client,
    config: Arc<SessionConfig>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(default_header_map(&config.default_headers)?);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self {
            id: Uuid::new_v4(),
            client: builder.build()?,
            config: Arc::new(config),
        })
    }

    /// Wraps an already configured transport client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            config: Arc::new(SessionConfig::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

fn default_header_map(headers: &[(String, String)]) -> Result<HeaderMap, SessionError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let invalid = || SessionError::InvalidHeader { name: name.clone() };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Keeps the session of the last completed request alive.
#[derive(Debug, Default)]
pub struct SessionGuard {
    last: Mutex<Option<Session>>,
}

impl SessionGuard {
    /// Retains `session`, returning the one it replaces.
    pub fn retain(&self, session: Session) -> Option<Session> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.replace(session)
    }

    pub fn retained_id(&self) -> Option<Uuid> {
        let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.as_ref().map(Session::id)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn new_session_has_config() {
        let config = SessionConfig::default().with_user_agent("tests/1.0");
        let session = Session::new(config).unwrap();
        assert_eq!(session.config().user_agent, "tests/1.0");
    }

    #[test]
    fn invalid_default_header_is_rejected() {
        let config = SessionConfig::default().with_default_header("bad header", "x");
        let err = Session::new(config).unwrap_err();
        assert!(matches!(err, SessionError::InvalidHeader { name } if name == "bad header"));
    }

    #[test]
    fn clones_share_identity() {
        let session = Session::new(SessionConfig::default()).unwrap();
        assert_eq!(session.clone().id(), session.id());
        assert_ne!(
            Session::new(SessionConfig::default()).unwrap().id(),
            session.id()
        );
    }

    #[test]
    fn guard_keeps_last_retained_session() {
        let guard = SessionGuard::default();
        assert!(guard.retained_id().is_none());

        let first = Session::new(SessionConfig::default()).unwrap();
        let second = Session::new(SessionConfig::default()).unwrap();
        assert!(guard.retain(first.clone()).is_none());

        let released = guard.retain(second.clone()).unwrap();
        assert_eq!(released.id(), first.id());
        assert_eq!(guard.retained_id(), Some(second.id()));
    }

    #[test]
    fn concurrent_retains_leave_one_session() {
        let guard = Arc::new(SessionGuard::default());
        let sessions: Vec<Session> = (0..8)
            .map(|_| Session::new(SessionConfig::default()).unwrap())
            .collect();
        let ids: Vec<Uuid> = sessions.iter().map(Session::id).collect();

        let handles: Vec<_> = sessions
            .into_iter()
            .map(|session| {
                let guard = guard.clone();
                thread::spawn(move || {
                    guard.retain(session);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let retained = guard.retained_id().unwrap();
        assert!(ids.contains(&retained));
    }
}
