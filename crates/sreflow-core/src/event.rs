//! Events produced while a pipeline runs
//!
//! Every message in a session, whether the user's input or an agent's
//! output, is recorded as an [`Event`]. Events carry optional state deltas
//! that the session service folds into the session state when appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::content::Content;

/// Author name used for events built from user input
pub const USER_AUTHOR: &str = "user";

/// Side effects attached to an event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventActions {
    /// Keys to merge into the session state
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub state_delta: Map<String, Value>,
}

/// One unit of output yielded during pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub invocation_id: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default)]
    pub actions: EventActions,
    /// Streaming fragment; not persisted to the session
    #[serde(default)]
    pub partial: bool,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(invocation_id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            invocation_id: invocation_id.into(),
            author: author.into(),
            content: None,
            actions: EventActions::default(),
            partial: false,
            timestamp: Utc::now(),
        }
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.content = Some(content);
        self
    }

    /// Record a state change carried by this event
    pub fn with_state(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.actions.state_delta.insert(key.into(), value.into());
        self
    }

    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    /// Text of the event content, if any
    pub fn text(&self) -> Option<String> {
        self.content.as_ref().map(Content::text)
    }

    pub fn is_final_response(&self) -> bool {
        !self.partial && self.content.is_some()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.text() {
            Some(text) => write!(f, "[{}] {}", self.author, text),
            None => write!(f, "[{}] <no content>", self.author),
        }
    }
}
