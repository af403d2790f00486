//! Bootstrap sequence
//!
//! Loads the environment, creates the session, constructs the runner,
//! submits the synthetic user message and reports every result:
//!
//! ```text
//! Uninitialized -> EnvironmentLoaded -> SessionCreated -> RunnerConstructed
//!               -> Executing -> Done | Crashed
//! ```
//!
//! The runner is reached through [`EventSource`] and built by a caller
//! supplied factory, so the sequence runs unchanged against test doubles.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::SessionSettings;
use crate::content::{Content, Part};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::report::{self, Reportable, Rendering};
use crate::runner::{RunIter, Runner};
use crate::session::{Session, SessionService};

/// Something that turns a user message into a sequence of result items
pub trait EventSource {
    type Item: Reportable;
    type Items: Iterator<Item = Result<Self::Item>>;

    fn run(&self, user_id: &str, session_id: &str, new_message: Content) -> Self::Items;
}

impl EventSource for Runner {
    type Item = Event;
    type Items = RunIter;

    fn run(&self, user_id: &str, session_id: &str, new_message: Content) -> RunIter {
        Runner::run(self, user_id, session_id, new_message)
    }
}

/// Where the bootstrap is in its fixed sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    EnvironmentLoaded,
    SessionCreated,
    RunnerConstructed,
    Executing,
    Done,
    Crashed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Uninitialized => "uninitialized",
            Phase::EnvironmentLoaded => "environment loaded",
            Phase::SessionCreated => "session created",
            Phase::RunnerConstructed => "runner constructed",
            Phase::Executing => "executing",
            Phase::Done => "done",
            Phase::Crashed => "crashed",
        };
        f.write_str(name)
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub session: Session,
    pub renderings: Vec<Rendering>,
}

/// Load a `.env` file into the process environment
///
/// With an explicit path the file must exist. Otherwise `.env` is searched
/// for from the working directory upwards and a missing file is not an
/// error. Returns the file that was loaded, if any.
pub fn load_environment(env_file: Option<&Path>) -> Result<Option<PathBuf>> {
    match env_file {
        Some(path) => {
            dotenv::from_path(path).map_err(|e| {
                Error::Environment(format!("Failed to load {}: {}", path.display(), e))
            })?;
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenv::dotenv() {
            Ok(path) => Ok(Some(path)),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(Error::Environment(format!("Failed to load .env: {}", e))),
        },
    }
}

/// Drives the fixed bootstrap sequence
pub struct Bootstrap {
    settings: SessionSettings,
    phase: Phase,
    progress: bool,
}

impl Bootstrap {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            phase: Phase::Uninitialized,
            progress: false,
        }
    }

    /// Write `[DEBUG]` progress lines around the run to the report output
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Replace the session settings, e.g. once `.env` overrides are known
    pub fn set_settings(&mut self, settings: SessionSettings) {
        self.settings = settings;
    }

    fn advance(&mut self, phase: Phase) {
        debug!("Bootstrap: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Load the environment file; see [`load_environment`]
    pub fn load_environment(&mut self, env_file: Option<&Path>) -> Result<Option<PathBuf>> {
        match load_environment(env_file) {
            Ok(loaded) => {
                match &loaded {
                    Some(path) => info!("Loaded environment from {}", path.display()),
                    None => debug!("No .env file found"),
                }
                self.advance(Phase::EnvironmentLoaded);
                Ok(loaded)
            }
            Err(e) => {
                self.advance(Phase::Crashed);
                Err(e)
            }
        }
    }

    /// Create the session, build the runner and report its results to `out`
    ///
    /// `make_runner` is only called once the session exists. Any failure,
    /// including one raised by the result iteration, is returned unchanged.
    pub fn run<S, F, W>(
        &mut self,
        session_service: Arc<dyn SessionService>,
        make_runner: F,
        out: &mut W,
    ) -> Result<RunSummary>
    where
        S: EventSource,
        F: FnOnce(Arc<dyn SessionService>) -> S,
        W: Write + ?Sized,
    {
        let result = self.run_inner(session_service, make_runner, out);
        match &result {
            Ok(summary) => {
                self.advance(Phase::Done);
                info!("Run complete: {} results", summary.renderings.len());
            }
            Err(e) => {
                error!("Bootstrap crashed while {}: {}", self.phase, e);
                self.advance(Phase::Crashed);
            }
        }
        result
    }

    fn run_inner<S, F, W>(
        &mut self,
        session_service: Arc<dyn SessionService>,
        make_runner: F,
        out: &mut W,
    ) -> Result<RunSummary>
    where
        S: EventSource,
        F: FnOnce(Arc<dyn SessionService>) -> S,
        W: Write + ?Sized,
    {
        let session = create_session_blocking(session_service.as_ref(), &self.settings)?;
        self.advance(Phase::SessionCreated);

        let runner = make_runner(session_service);
        self.advance(Phase::RunnerConstructed);

        let message = Content::user(vec![Part::text(self.settings.message.clone())]);
        debug!("Starting pipeline run...");
        if self.progress {
            writeln!(out, "[DEBUG] Starting pipeline run...")?;
        }
        self.advance(Phase::Executing);
        let items = runner.run(&self.settings.user_id, &self.settings.session_id, message);

        debug!("Pipeline run complete");
        if self.progress {
            writeln!(out, "[DEBUG] Pipeline run complete. Results:")?;
        }
        let renderings = report::report_all(items, out)?;

        Ok(RunSummary { session, renderings })
    }
}

/// Create the configured session, waiting for the async service call
fn create_session_blocking(service: &dyn SessionService, settings: &SessionSettings) -> Result<Session> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Runtime(e.to_string()))?;

    let session = runtime.block_on(service.create_session(
        &settings.app_name,
        &settings.user_id,
        None,
        Some(&settings.session_id),
    ))?;
    info!(
        "Session {} ready for user {} in app {}",
        session.id, session.user_id, session.app_name
    );
    Ok(session)
}
