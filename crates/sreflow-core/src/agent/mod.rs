//! Agent system for sreflow
//!
//! An agent is one step of work executed against a session. Agents report
//! progress by emitting [`Event`]s through their [`InvocationContext`]; the
//! runner persists those events and hands them to the caller.

mod command;
mod sequential;

pub use command::{CommandAgent, CommandOutput, DEFAULT_TIMEOUT_SECS};
pub use sequential::SequentialAgent;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::content::Content;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::session::Session;

/// Core trait for all agents
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique name, used as the author of emitted events
    fn name(&self) -> &str;

    /// Description of what the agent does
    fn description(&self) -> &str;

    /// Child agents, if this agent composes others
    fn sub_agents(&self) -> Vec<std::sync::Arc<dyn Agent>> {
        Vec::new()
    }

    /// Run the agent to completion
    async fn run(&self, ctx: &mut InvocationContext) -> Result<()>;
}

/// Everything an agent sees during one invocation
pub struct InvocationContext {
    pub invocation_id: String,
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    /// The message that started this invocation
    pub user_content: Content,
    state: Map<String, Value>,
    events: mpsc::Sender<Event>,
}

impl InvocationContext {
    pub fn new(
        invocation_id: impl Into<String>,
        session: &Session,
        user_content: Content,
        events: mpsc::Sender<Event>,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            app_name: session.app_name.clone(),
            user_id: session.user_id.clone(),
            session_id: session.id.clone(),
            user_content,
            state: session.state.clone(),
            events,
        }
    }

    /// Working state: the session state plus every delta emitted so far
    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    /// Start an event for this invocation
    pub fn new_event(&self, author: &str) -> Event {
        Event::new(&self.invocation_id, author)
    }

    /// Publish an event to the runner
    ///
    /// The delta, `temp:` keys included, becomes visible to later agents
    /// in this invocation.
    pub async fn emit(&mut self, event: Event) -> Result<()> {
        for (key, value) in &event.actions.state_delta {
            self.state.insert(key.clone(), value.clone());
        }
        self.events
            .send(event)
            .await
            .map_err(|_| Error::Agent("event receiver closed".to_string()))
    }
}
