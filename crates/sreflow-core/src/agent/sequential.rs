//! Sequential composition of agents

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{Agent, InvocationContext};
use crate::error::Result;

/// Runs its sub-agents one after another, stopping at the first error
pub struct SequentialAgent {
    name: String,
    description: String,
    sub_agents: Vec<Arc<dyn Agent>>,
}

impl SequentialAgent {
    pub fn new(name: impl Into<String>, sub_agents: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            sub_agents,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Agent for SequentialAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn sub_agents(&self) -> Vec<Arc<dyn Agent>> {
        self.sub_agents.clone()
    }

    async fn run(&self, ctx: &mut InvocationContext) -> Result<()> {
        info!("Pipeline '{}' starting ({} steps)", self.name, self.sub_agents.len());
        for (index, agent) in self.sub_agents.iter().enumerate() {
            debug!("Step {}/{}: {}", index + 1, self.sub_agents.len(), agent.name());
            agent.run(ctx).await?;
        }
        info!("Pipeline '{}' finished", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Content, Part};
    use crate::error::Error;
    use crate::session::Session;
    use serde_json::Map;
    use tokio::sync::mpsc;

    struct Step {
        name: String,
        fail: bool,
    }

    #[async_trait]
    impl Agent for Step {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "test step"
        }

        async fn run(&self, ctx: &mut InvocationContext) -> Result<()> {
            if self.fail {
                return Err(Error::Agent(format!("{} broke", self.name)));
            }
            let seen = ctx.state().len();
            let event = ctx.new_event(&self.name).with_state(self.name.clone(), seen);
            ctx.emit(event).await
        }
    }

    fn step(name: &str, fail: bool) -> Arc<dyn Agent> {
        Arc::new(Step {
            name: name.to_string(),
            fail,
        })
    }

    fn context(tx: mpsc::Sender<crate::event::Event>) -> InvocationContext {
        let session = Session::new("agents", "u1", "sess1", Map::new());
        InvocationContext::new("inv", &session, Content::user(vec![Part::text("run")]), tx)
    }

    #[tokio::test]
    async fn test_runs_in_order_and_shares_state() {
        let (tx, mut rx) = mpsc::channel(8);
        let pipeline = SequentialAgent::new("p", vec![step("a", false), step("b", false)]);
        let mut ctx = context(tx);

        pipeline.run(&mut ctx).await.unwrap();
        drop(ctx);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.author, "a");
        assert_eq!(second.author, "b");
        // b saw the key written by a
        assert_eq!(second.actions.state_delta["b"], 1);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stops_at_first_error() {
        let (tx, mut rx) = mpsc::channel(8);
        let pipeline = SequentialAgent::new(
            "p",
            vec![step("a", false), step("b", true), step("c", false)],
        );
        let mut ctx = context(tx);

        let err = pipeline.run(&mut ctx).await.unwrap_err();
        drop(ctx);

        assert_eq!(err.to_string(), "Agent error: b broke");
        assert_eq!(rx.recv().await.unwrap().author, "a");
        assert!(rx.recv().await.is_none());
    }
}
