//! In-memory session store
//!
//! Sessions live for the lifetime of the process. Callers always receive
//! clones, so mutation only happens through [`SessionService::append_event`].

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info};

use super::service::SessionService;
use super::types::{Session, SessionKey};
use crate::error::SessionError;
use crate::event::Event;

/// Process-local session service backed by a hash map
#[derive(Default)]
pub struct InMemorySessionService {
    sessions: RwLock<HashMap<SessionKey, Session>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions across all apps and users
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<Map<String, Value>>,
        session_id: Option<&str>,
    ) -> Result<Session, SessionError> {
        let id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let key = SessionKey::new(app_name, user_id, &id);

        let mut sessions = self.sessions.write();
        if sessions.contains_key(&key) {
            return Err(SessionError::AlreadyExists(key.to_string()));
        }

        let session = Session::new(app_name, user_id, id, state.unwrap_or_default());
        sessions.insert(key.clone(), session.clone());
        info!("Created session {}", key);
        Ok(session)
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>, SessionError> {
        let key = SessionKey::new(app_name, user_id, session_id);
        Ok(self.sessions.read().get(&key).cloned())
    }

    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<Vec<Session>, SessionError> {
        let sessions = self.sessions.read();
        let mut listed: Vec<Session> = sessions
            .iter()
            .filter(|(key, _)| key.app_name == app_name && key.user_id == user_id)
            .map(|(_, session)| Session {
                events: Vec::new(),
                ..session.clone()
            })
            .collect();
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listed)
    }

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), SessionError> {
        let key = SessionKey::new(app_name, user_id, session_id);
        if self.sessions.write().remove(&key).is_some() {
            info!("Deleted session {}", key);
        }
        Ok(())
    }

    async fn append_event(&self, session: &Session, event: Event) -> Result<Event, SessionError> {
        if event.partial {
            return Ok(event);
        }

        let key = SessionKey::of(session);
        let mut sessions = self.sessions.write();
        let stored = sessions
            .get_mut(&key)
            .ok_or_else(|| SessionError::NotFound(key.to_string()))?;

        stored.apply_delta(&event.actions.state_delta);
        stored.events.push(event.clone());
        stored.last_update_time = Utc::now();
        debug!(
            "Appended event {} from '{}' to session {} ({} events)",
            event.id,
            event.author,
            key,
            stored.events.len()
        );
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_generates_id_when_missing() {
        let service = InMemorySessionService::new();
        let session = service.create_session("agents", "u1", None, None).await.unwrap();
        assert!(!session.id.is_empty());
        assert_eq!(service.session_count(), 1);
    }

    #[tokio::test]
    async fn test_same_id_for_different_users_is_allowed() {
        let service = InMemorySessionService::new();
        service.create_session("agents", "u1", None, Some("s")).await.unwrap();
        service.create_session("agents", "u2", None, Some("s")).await.unwrap();
        assert_eq!(service.session_count(), 2);
    }

    #[tokio::test]
    async fn test_append_to_unknown_session_fails() {
        let service = InMemorySessionService::new();
        let ghost = Session::new("agents", "u1", "ghost", Map::new());
        let err = service
            .append_event(&ghost, Event::new("inv", "a"))
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::NotFound("agents/u1/ghost".to_string()));
    }
}
