//! Session data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::Event;

/// Unique identifier for a session
pub type SessionId = String;

/// State keys with this prefix live only for the current invocation
pub const TEMP_PREFIX: &str = "temp:";

/// A stateful context tracking one interaction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub app_name: String,
    pub user_id: String,
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub events: Vec<Event>,
    pub last_update_time: DateTime<Utc>,
}

impl Session {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        id: impl Into<String>,
        state: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            state,
            events: Vec::new(),
            last_update_time: Utc::now(),
        }
    }

    /// Fold an event's state delta into this session's state
    ///
    /// `temp:` keys are dropped.
    pub fn apply_delta(&mut self, delta: &Map<String, Value>) {
        for (key, value) in delta {
            if key.starts_with(TEMP_PREFIX) {
                continue;
            }
            self.state.insert(key.clone(), value.clone());
        }
    }
}

/// Key of a session inside a session store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: SessionId,
}

impl SessionKey {
    pub fn new(app_name: &str, user_id: &str, session_id: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }

    pub fn of(session: &Session) -> Self {
        Self::new(&session.app_name, &session.user_id, &session.id)
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.app_name, self.user_id, self.session_id)
    }
}
