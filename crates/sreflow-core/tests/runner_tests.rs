//! Runner integration tests
//!
//! Tests for driving agents through the runner:
//! - Session bookkeeping (user message first, agent events after)
//! - Error propagation from agents and missing sessions
//! - The blocking iterator entry point

use async_trait::async_trait;
use std::sync::Arc;

use sreflow_core::agent::{Agent, InvocationContext};
use sreflow_core::content::{Content, Part};
use sreflow_core::error::{Error, Result};
use sreflow_core::runner::Runner;
use sreflow_core::session::{InMemorySessionService, SessionService};

/// Emits `count` events, then optionally fails
struct Scripted {
    count: usize,
    fail_with: Option<String>,
}

#[async_trait]
impl Agent for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn description(&self) -> &str {
        "emits numbered events"
    }

    async fn run(&self, ctx: &mut InvocationContext) -> Result<()> {
        for i in 0..self.count {
            let event = ctx
                .new_event(self.name())
                .with_content(Content::model(vec![Part::text(format!("step {}", i))]))
                .with_state("last_step", i);
            ctx.emit(event).await?;
        }
        match &self.fail_with {
            Some(message) => Err(Error::Agent(message.clone())),
            None => Ok(()),
        }
    }
}

struct Panicking;

#[async_trait]
impl Agent for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn description(&self) -> &str {
        "panics"
    }

    async fn run(&self, _ctx: &mut InvocationContext) -> Result<()> {
        panic!("agent exploded");
    }
}

fn run_message() -> Content {
    Content::user(vec![Part::text("run")])
}

async fn service_with_session() -> Arc<InMemorySessionService> {
    let service = Arc::new(InMemorySessionService::new());
    service
        .create_session("agents", "u1", None, Some("sess1"))
        .await
        .unwrap();
    service
}

fn runner(agent: impl Agent + 'static, service: Arc<InMemorySessionService>) -> Runner {
    Runner::new(Arc::new(agent), "agents", service)
}

mod async_run_tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order_and_are_persisted() {
        let service = service_with_session().await;
        let runner = runner(
            Scripted {
                count: 3,
                fail_with: None,
            },
            service.clone(),
        );

        let mut events = runner.run_async("u1", "sess1", run_message()).await.unwrap();
        let mut texts = Vec::new();
        while let Some(item) = events.recv().await {
            texts.push(item.unwrap().text().unwrap());
        }
        assert_eq!(texts, vec!["step 0", "step 1", "step 2"]);

        let session = service
            .get_session("agents", "u1", "sess1")
            .await
            .unwrap()
            .unwrap();
        let authors: Vec<&str> = session.events.iter().map(|e| e.author.as_str()).collect();
        assert_eq!(authors, vec!["user", "scripted", "scripted", "scripted"]);
        assert_eq!(session.events[0].text().as_deref(), Some("run"));
        assert_eq!(session.state["last_step"], 2);

        let invocation = &session.events[0].invocation_id;
        assert!(session.events.iter().all(|e| &e.invocation_id == invocation));
    }

    #[tokio::test]
    async fn test_missing_session_fails_up_front() {
        let service = Arc::new(InMemorySessionService::new());
        let runner = runner(
            Scripted {
                count: 1,
                fail_with: None,
            },
            service,
        );

        let err = runner.run_async("u1", "sess1", run_message()).await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(ref key) if key == "agents/u1/sess1"));
    }

    #[tokio::test]
    async fn test_agent_error_is_last_item() {
        let service = service_with_session().await;
        let runner = runner(
            Scripted {
                count: 1,
                fail_with: Some("disk check failed".to_string()),
            },
            service,
        );

        let mut events = runner.run_async("u1", "sess1", run_message()).await.unwrap();
        assert!(events.recv().await.unwrap().is_ok());
        let err = events.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Agent(ref m) if m == "disk check failed"));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_agent_panic_becomes_error() {
        let service = service_with_session().await;
        let runner = runner(Panicking, service);

        let mut events = runner.run_async("u1", "sess1", run_message()).await.unwrap();
        let err = events.recv().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("agent task failed"));
    }
}

mod blocking_run_tests {
    use super::*;

    fn blocking_service() -> Arc<InMemorySessionService> {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(service_with_session())
    }

    #[test]
    fn test_blocking_iteration_yields_all_events() {
        let service = blocking_service();
        let runner = runner(
            Scripted {
                count: 2,
                fail_with: None,
            },
            service,
        );

        let events: Vec<_> = runner
            .run("u1", "sess1", run_message())
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].text().as_deref(), Some("step 1"));
    }

    #[test]
    fn test_blocking_iteration_surfaces_errors() {
        let service = Arc::new(InMemorySessionService::new());
        let runner = runner(
            Scripted {
                count: 0,
                fail_with: None,
            },
            service,
        );

        let items: Vec<_> = runner.run("u1", "missing", run_message()).collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::SessionNotFound(_))));
    }

    #[test]
    fn test_dropping_iterator_early_is_safe() {
        let service = blocking_service();
        let runner = runner(
            Scripted {
                count: 500,
                fail_with: None,
            },
            service,
        );

        let mut iter = runner.run("u1", "sess1", run_message());
        assert!(iter.next().unwrap().is_ok());
        drop(iter);
    }
}
