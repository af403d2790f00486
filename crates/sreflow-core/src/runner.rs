//! Runner: executes an agent against a stored session
//!
//! The runner owns the glue between an [`Agent`] and a [`SessionService`]:
//! it records the incoming user message, drives the agent, persists every
//! event the agent emits and forwards it to the caller in order.
//!
//! Two entry points are provided. [`Runner::run_async`] returns a channel
//! receiver for use inside a tokio runtime. [`Runner::run`] returns a plain
//! blocking iterator; the agent then executes on a dedicated thread with its
//! own runtime, so callers need no runtime of their own.

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::agent::{Agent, InvocationContext};
use crate::content::Content;
use crate::error::{Error, Result};
use crate::event::{Event, USER_AUTHOR};
use crate::session::{SessionKey, SessionService};

/// Capacity of the event channels between agent, runner and caller
const EVENT_BUFFER: usize = 64;

/// Binds an agent and an application name to a session service
#[derive(Clone)]
pub struct Runner {
    app_name: String,
    agent: Arc<dyn Agent>,
    session_service: Arc<dyn SessionService>,
}

impl Runner {
    pub fn new(
        agent: Arc<dyn Agent>,
        app_name: impl Into<String>,
        session_service: Arc<dyn SessionService>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            agent,
            session_service,
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.agent
    }

    /// Start an invocation and stream its events
    ///
    /// Fails up front if the session does not exist. Once started, an agent
    /// failure arrives as the last item of the stream.
    pub async fn run_async(
        &self,
        user_id: &str,
        session_id: &str,
        new_message: Content,
    ) -> Result<mpsc::Receiver<Result<Event>>> {
        let session = self
            .session_service
            .get_session(&self.app_name, user_id, session_id)
            .await?
            .ok_or_else(|| {
                Error::SessionNotFound(SessionKey::new(&self.app_name, user_id, session_id).to_string())
            })?;

        let invocation_id = format!("e-{}", uuid::Uuid::new_v4());
        info!(
            "Invocation {} of '{}' on session {}",
            invocation_id,
            self.agent.name(),
            session.id
        );

        let user_event = Event::new(&invocation_id, USER_AUTHOR).with_content(new_message.clone());
        self.session_service.append_event(&session, user_event).await?;

        let (out_tx, out_rx) = mpsc::channel(EVENT_BUFFER);
        let agent = self.agent.clone();
        let service = self.session_service.clone();

        tokio::spawn(async move {
            let (agent_tx, mut agent_rx) = mpsc::channel(EVENT_BUFFER);
            let mut ctx = InvocationContext::new(invocation_id, &session, new_message, agent_tx);
            let agent_task = tokio::spawn(async move { agent.run(&mut ctx).await });

            while let Some(event) = agent_rx.recv().await {
                let item = service.append_event(&session, event).await.map_err(Error::from);
                let failed = item.is_err();
                if out_tx.send(item).await.is_err() {
                    debug!("Event consumer dropped, stopping agent");
                    agent_task.abort();
                    return;
                }
                if failed {
                    agent_task.abort();
                    return;
                }
            }

            let outcome = match agent_task.await {
                Ok(result) => result,
                Err(e) => Err(Error::Agent(format!("agent task failed: {}", e))),
            };
            match outcome {
                Ok(()) => debug!("Invocation finished"),
                Err(e) => {
                    warn!("Invocation failed: {}", e);
                    let _ = out_tx.send(Err(e)).await;
                }
            }
        });

        Ok(out_rx)
    }

    /// Start an invocation and iterate its events synchronously
    pub fn run(&self, user_id: &str, session_id: &str, new_message: Content) -> RunIter {
        let (tx, rx) = std_mpsc::channel();
        let spawn_tx = tx.clone();

        let runner = self.clone();
        let user_id = user_id.to_string();
        let session_id = session_id.to_string();

        let spawned = std::thread::Builder::new()
            .name("sreflow-runner".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = tx.send(Err(Error::Runtime(e.to_string())));
                        return;
                    }
                };

                runtime.block_on(async move {
                    match runner.run_async(&user_id, &session_id, new_message).await {
                        Ok(mut events) => {
                            while let Some(item) = events.recv().await {
                                if tx.send(item).is_err() {
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e));
                        }
                    }
                });
            });

        if let Err(e) = spawned {
            let _ = spawn_tx.send(Err(Error::Runtime(format!("failed to spawn runner thread: {}", e))));
        }

        RunIter { receiver: rx }
    }
}

/// Blocking iterator over the events of one invocation
pub struct RunIter {
    receiver: std_mpsc::Receiver<Result<Event>>,
}

impl Iterator for RunIter {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}
