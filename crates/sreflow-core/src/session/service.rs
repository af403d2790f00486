//! Session service abstraction

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::types::Session;
use crate::error::SessionError;
use crate::event::Event;

/// Storage for sessions and their event history
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Create a session
    ///
    /// A fresh id is generated when `session_id` is `None`. Creating an id
    /// that already exists for the same app and user fails.
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<Map<String, Value>>,
        session_id: Option<&str>,
    ) -> Result<Session, SessionError>;

    /// Fetch a snapshot of a session
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>, SessionError>;

    /// List sessions for a user, without their events
    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<Vec<Session>, SessionError>;

    /// Delete a session; deleting an unknown session is not an error
    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), SessionError>;

    /// Record an event against a session and apply its state delta
    ///
    /// Partial events are returned unchanged without being stored.
    async fn append_event(&self, session: &Session, event: Event) -> Result<Event, SessionError>;
}
