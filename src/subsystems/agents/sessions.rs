//! In-memory intake session registry.
//!
//! Transcripts live only in process memory for the lifetime of one run —
//! nothing is written to disk. Each session holds an append-only ordered
//! turn list plus two flags: `completed` (the model signalled the intake is
//! done) and `in_flight` (an exchange is awaiting its reply; further sends
//! are rejected until it settles).
//!
//! The exchange protocol keeps failure handling exact: `begin_exchange`
//! appends the user turn and raises the in-flight flag; `commit_reply`
//! appends the assistant turn and lowers it; `abort_exchange` lowers the
//! flag and leaves the user turn in place, unanswered.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::llm::Turn;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("an exchange is already in flight for session {0}")]
    Busy(String),
}

struct IntakeSession {
    user_name: String,
    transcript: Vec<Turn>,
    completed: bool,
    in_flight: bool,
    created_at: DateTime<Utc>,
}

/// Point-in-time view of one session, serializable for detail queries.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub session_id: String,
    pub user_name: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub transcript: Vec<Turn>,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, IntakeSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session seeded with the greeting turn; returns its id.
    pub fn create(&self, user_name: &str, greeting: Turn) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = IntakeSession {
            user_name: user_name.to_string(),
            transcript: vec![greeting],
            completed: false,
            in_flight: false,
            created_at: Utc::now(),
        };
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(session_id.clone(), session);
        }
        session_id
    }

    /// Append the user turn, raise the in-flight flag, and return a
    /// transcript snapshot for forwarding.
    ///
    /// Rejects with [`SessionError::Busy`] while a previous exchange is
    /// still awaiting its reply — the transcript is not touched in that
    /// case.
    pub fn begin_exchange(&self, session_id: &str, user_text: &str) -> Result<Vec<Turn>, SessionError> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        if session.in_flight {
            return Err(SessionError::Busy(session_id.to_string()));
        }
        session.in_flight = true;
        session.transcript.push(Turn::user(user_text));
        Ok(session.transcript.clone())
    }

    /// Append the assistant reply and lower the in-flight flag.
    /// `completed` latches: once a session is complete it stays complete.
    pub fn commit_reply(&self, session_id: &str, reply: &str, completed: bool) -> Result<(), SessionError> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        session.transcript.push(Turn::assistant(reply));
        session.completed |= completed;
        session.in_flight = false;
        Ok(())
    }

    /// Lower the in-flight flag after a failed forward. The user turn
    /// appended by [`begin_exchange`](Self::begin_exchange) stays in the
    /// transcript, unanswered.
    pub fn abort_exchange(&self, session_id: &str) {
        let mut sessions = self.lock();
        if let Some(session) = sessions.get_mut(session_id) {
            session.in_flight = false;
        }
    }

    pub fn detail(&self, session_id: &str) -> Result<SessionDetail, SessionError> {
        let sessions = self.lock();
        let session = sessions
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        Ok(SessionDetail {
            session_id: session_id.to_string(),
            user_name: session.user_name.clone(),
            completed: session.completed,
            created_at: session.created_at,
            transcript: session.transcript.clone(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, IntakeSession>> {
        // A poisoned mutex means another thread panicked mid-update; the
        // registry holds only plain data, so continuing is safe.
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    fn registry_with_session() -> (SessionRegistry, String) {
        let registry = SessionRegistry::new();
        let id = registry.create("Ana", Turn::assistant("Hi Ana!"));
        (registry, id)
    }

    #[test]
    fn create_seeds_greeting() {
        let (registry, id) = registry_with_session();
        let detail = registry.detail(&id).unwrap();
        assert_eq!(detail.transcript.len(), 1);
        assert_eq!(detail.transcript[0].role, Role::Assistant);
        assert!(!detail.completed);
    }

    #[test]
    fn exchange_appends_in_order() {
        let (registry, id) = registry_with_session();

        let snapshot = registry.begin_exchange(&id, "I'm 30").unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1], Turn::user("I'm 30"));

        registry.commit_reply(&id, "How tall are you?", false).unwrap();
        let detail = registry.detail(&id).unwrap();
        assert_eq!(detail.transcript.len(), 3);
        assert_eq!(detail.transcript[2], Turn::assistant("How tall are you?"));
    }

    #[test]
    fn second_send_while_in_flight_is_busy() {
        let (registry, id) = registry_with_session();

        registry.begin_exchange(&id, "first").unwrap();
        let err = registry.begin_exchange(&id, "second").unwrap_err();
        assert!(matches!(err, SessionError::Busy(_)));

        // The rejected send must not have touched the transcript.
        let detail = registry.detail(&id).unwrap();
        assert_eq!(detail.transcript.len(), 2);
        assert_eq!(detail.transcript[1], Turn::user("first"));
    }

    #[test]
    fn abort_keeps_user_turn_and_allows_retry() {
        let (registry, id) = registry_with_session();

        registry.begin_exchange(&id, "I'm 30").unwrap();
        registry.abort_exchange(&id);

        // User turn is present, unanswered.
        let detail = registry.detail(&id).unwrap();
        assert_eq!(detail.transcript.len(), 2);
        assert_eq!(detail.transcript[1], Turn::user("I'm 30"));

        // A retry goes through (flag released) and preserves prior turns.
        let snapshot = registry.begin_exchange(&id, "I'm 30, really").unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[1], Turn::user("I'm 30"));
    }

    #[test]
    fn completion_latches() {
        let (registry, id) = registry_with_session();

        registry.begin_exchange(&id, "done?").unwrap();
        registry.commit_reply(&id, "kindly click Generate Program!", true).unwrap();
        assert!(registry.detail(&id).unwrap().completed);

        registry.begin_exchange(&id, "thanks").unwrap();
        registry.commit_reply(&id, "you're welcome", false).unwrap();
        assert!(registry.detail(&id).unwrap().completed);
    }

    #[test]
    fn unknown_session_not_found() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.begin_exchange("nope", "hi"),
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(registry.detail("nope"), Err(SessionError::NotFound(_))));
    }
}
