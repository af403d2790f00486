//! sreflow core - sessions, agents and the pipeline runner
//!
//! This crate provides:
//! - Message content and event types
//! - A session service abstraction with an in-memory implementation
//! - Agents, including sequential composition and shell command stages
//! - TOML pipeline definitions
//! - The runner that executes a pipeline against a session
//! - Result reporting and the bootstrap sequence used by the CLI

pub mod agent;
pub mod bootstrap;
pub mod config;
pub mod content;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod session;

pub use agent::{Agent, CommandAgent, InvocationContext, SequentialAgent};
pub use bootstrap::{Bootstrap, EventSource, Phase, RunSummary, load_environment};
pub use config::{Config, ConfigManager, SessionSettings, defaults};
pub use content::{Content, Part, Role};
pub use error::{Error, Result, SessionError};
pub use event::{Event, EventActions};
pub use pipeline::{PipelineDefinition, StageDefinition};
pub use report::{Rendering, Reportable, render_item, report_all};
pub use runner::{RunIter, Runner};
pub use session::{InMemorySessionService, Session, SessionService};
