//! Shell command agent
//!
//! Runs one shell command per invocation and reports its stdout as an
//! event. Commands may reference session state with `{key}` placeholders,
//! which lets later stages consume what earlier stages produced. Values
//! are shell-quoted on substitution, so templates must not quote them.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{Agent, InvocationContext};
use crate::content::{Content, Part};
use crate::error::{Error, Result};

/// Default command timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_:.\-]*)\}").expect("placeholder pattern is valid")
});

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Agent that executes a shell command
pub struct CommandAgent {
    name: String,
    description: String,
    command: String,
    timeout_secs: u64,
    working_dir: Option<PathBuf>,
    output_key: Option<String>,
    allow_failure: bool,
}

impl CommandAgent {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            command: command.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            working_dir: None,
            output_key: None,
            allow_failure: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Store trimmed stdout under `key` in the session state
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    /// Report non-zero exits as events instead of failing the pipeline
    pub fn allow_failure(mut self, allow: bool) -> Self {
        self.allow_failure = allow;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Replace `{key}` placeholders with shell-quoted values from `state`
    ///
    /// Unknown keys are left as written. A value that cannot be quoted
    /// (it contains a NUL byte) fails the stage.
    pub fn render_command(&self, state: &Map<String, Value>) -> Result<String> {
        let mut rendered = String::with_capacity(self.command.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(&self.command) {
            let Some(whole) = caps.get(0) else { continue };
            rendered.push_str(&self.command[last..whole.start()]);

            match state.get(&caps[1]) {
                Some(value) => {
                    let raw = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    let quoted = shlex::try_quote(&raw).map_err(|e| Error::Stage {
                        stage: self.name.clone(),
                        message: format!("cannot substitute {{{}}}: {}", &caps[1], e),
                    })?;
                    rendered.push_str(&quoted);
                }
                None => rendered.push_str(whole.as_str()),
            }
            last = whole.end();
        }

        rendered.push_str(&self.command[last..]);
        Ok(rendered)
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        let (shell, shell_arg) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };

        let mut cmd = Command::new(shell);
        cmd.arg(shell_arg)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), cmd.output())
            .await
            .map_err(|_| Error::Stage {
                stage: self.name.clone(),
                message: format!("command timed out after {}s", self.timeout_secs),
            })??;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[async_trait]
impl Agent for CommandAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, ctx: &mut InvocationContext) -> Result<()> {
        let command = self.render_command(ctx.state())?;
        debug!("Stage '{}' executing: {}", self.name, command);

        let output = self.execute(&command).await?;
        if !output.success() {
            let code = output
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            if !self.allow_failure {
                return Err(Error::Stage {
                    stage: self.name.clone(),
                    message: format!("exit code {}: {}", code, output.stderr.trim()),
                });
            }
            warn!("Stage '{}' exited with {} (allowed)", self.name, code);
        }

        let text = output.stdout.trim_end().to_string();
        let mut event = ctx
            .new_event(&self.name)
            .with_content(Content::model(vec![Part::text(text.clone())]));
        if let Some(key) = &self.output_key {
            event = event.with_state(key.clone(), text);
        }
        ctx.emit(event).await
    }
}
