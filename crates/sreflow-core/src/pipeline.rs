//! Pipeline definitions
//!
//! A pipeline is declared in TOML as an ordered list of shell stages:
//!
//! ```toml
//! name = "sre_pipeline"
//! description = "Collect host health and summarize"
//!
//! [[stages]]
//! name = "uptime"
//! command = "uptime"
//! output_key = "uptime"
//!
//! [[stages]]
//! name = "report"
//! command = "echo load: {uptime}"
//! ```
//!
//! Definitions are looked up project-first: an explicit path, then the
//! working directory, then the user config directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::agent::{Agent, CommandAgent, DEFAULT_TIMEOUT_SECS, SequentialAgent};
use crate::error::{Error, Result};

/// Name given to pipelines that do not declare one
pub const DEFAULT_PIPELINE_NAME: &str = "sre_pipeline";

/// File name searched for in project and config directories
pub const PIPELINE_FILE_NAME: &str = "pipeline.toml";

/// One step of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(default)]
    pub allow_failure: bool,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_pipeline_name() -> String {
    DEFAULT_PIPELINE_NAME.to_string()
}

/// Declarative pipeline loaded from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    #[serde(default = "default_pipeline_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

impl PipelineDefinition {
    /// Parse a definition from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let definition: Self = toml::from_str(content)
            .map_err(|e| Error::Pipeline(format!("Failed to parse pipeline: {}", e)))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Read and parse a definition file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Pipeline(format!("Failed to read pipeline {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::Pipeline(format!("Pipeline '{}' has no stages", self.name)));
        }
        let mut seen = std::collections::HashSet::new();
        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                return Err(Error::Pipeline("Stage name must not be empty".to_string()));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(Error::Pipeline(format!("Duplicate stage name: {}", stage.name)));
            }
            if stage.timeout_secs == 0 {
                return Err(Error::Pipeline(format!(
                    "Stage '{}' timeout must be greater than zero",
                    stage.name
                )));
            }
        }
        Ok(())
    }

    /// Build the agent tree for this definition
    pub fn build(&self) -> Arc<dyn Agent> {
        let stages: Vec<Arc<dyn Agent>> = self
            .stages
            .iter()
            .map(|stage| {
                let mut agent = CommandAgent::new(&stage.name, &stage.command)
                    .with_timeout(stage.timeout_secs)
                    .allow_failure(stage.allow_failure);
                if let Some(description) = &stage.description {
                    agent = agent.with_description(description);
                }
                if let Some(dir) = &stage.working_dir {
                    agent = agent.with_working_dir(dir);
                }
                if let Some(key) = &stage.output_key {
                    agent = agent.with_output_key(key);
                }
                Arc::new(agent) as Arc<dyn Agent>
            })
            .collect();

        Arc::new(SequentialAgent::new(&self.name, stages).with_description(&self.description))
    }
}

/// Candidate locations for a pipeline file, most local first
pub fn search_paths(explicit: Option<&Path>, project_dir: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
    }
    paths.push(project_dir.join(PIPELINE_FILE_NAME));
    paths.push(project_dir.join(".sreflow").join(PIPELINE_FILE_NAME));
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("sreflow").join(PIPELINE_FILE_NAME));
    }
    paths
}

/// Find and load the first pipeline definition on the search path
///
/// An explicit path that does not exist is an error rather than a reason
/// to fall through to the next candidate.
pub fn locate(explicit: Option<&Path>, project_dir: &Path) -> Result<(PathBuf, PipelineDefinition)> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Pipeline(format!("Pipeline file not found: {}", path.display())));
        }
    }

    for candidate in search_paths(explicit, project_dir) {
        debug!("Looking for pipeline at {}", candidate.display());
        if candidate.is_file() {
            let definition = PipelineDefinition::load(&candidate)?;
            info!("Loaded pipeline '{}' from {}", definition.name, candidate.display());
            return Ok((candidate, definition));
        }
    }

    Err(Error::Pipeline(format!(
        "No {} found in {} or the user config directory",
        PIPELINE_FILE_NAME,
        project_dir.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
description = "health"

[[stages]]
name = "collect"
command = "echo up"
output_key = "status"

[[stages]]
name = "report"
command = "echo {status}"
timeout_secs = 5
allow_failure = true
"#;

    #[test]
    fn test_parse_applies_defaults() {
        let definition = PipelineDefinition::from_toml(SAMPLE).unwrap();
        assert_eq!(definition.name, DEFAULT_PIPELINE_NAME);
        assert_eq!(definition.stages.len(), 2);
        assert_eq!(definition.stages[0].timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(definition.stages[0].output_key.as_deref(), Some("status"));
        assert!(definition.stages[1].allow_failure);
        assert_eq!(definition.stages[1].timeout_secs, 5);
    }

    #[test]
    fn test_empty_pipeline_is_rejected() {
        let err = PipelineDefinition::from_toml("name = \"x\"").unwrap_err();
        assert!(err.to_string().contains("has no stages"));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let toml = r#"
[[stages]]
name = "instant"
command = "true"
timeout_secs = 0
"#;
        let err = PipelineDefinition::from_toml(toml).unwrap_err();
        assert!(matches!(err, Error::Pipeline(_)));
        assert!(err.to_string().contains("'instant' timeout must be greater than zero"));
    }

    #[test]
    fn test_duplicate_stage_names_are_rejected() {
        let toml = r#"
[[stages]]
name = "a"
command = "true"
[[stages]]
name = "a"
command = "true"
"#;
        let err = PipelineDefinition::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("Duplicate stage name"));
    }

    #[test]
    fn test_build_preserves_stage_order() {
        let agent = PipelineDefinition::from_toml(SAMPLE).unwrap().build();
        let names: Vec<String> = agent.sub_agents().iter().map(|a| a.name().to_string()).collect();
        assert_eq!(agent.name(), DEFAULT_PIPELINE_NAME);
        assert_eq!(names, vec!["collect", "report"]);
    }

    #[test]
    fn test_locate_prefers_project_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PIPELINE_FILE_NAME), SAMPLE).unwrap();
        std::fs::create_dir(dir.path().join(".sreflow")).unwrap();
        std::fs::write(
            dir.path().join(".sreflow").join(PIPELINE_FILE_NAME),
            "name = \"other\"\n[[stages]]\nname = \"x\"\ncommand = \"true\"\n",
        )
        .unwrap();

        let (path, definition) = locate(None, dir.path()).unwrap();
        assert_eq!(path, dir.path().join(PIPELINE_FILE_NAME));
        assert_eq!(definition.name, DEFAULT_PIPELINE_NAME);
    }

    #[test]
    fn test_locate_missing_explicit_path_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PIPELINE_FILE_NAME), SAMPLE).unwrap();
        let err = locate(Some(&dir.path().join("nope.toml")), dir.path()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
