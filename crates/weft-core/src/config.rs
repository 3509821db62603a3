//! Project configuration
//!
//! # Configuration Files
//!
//! - `weft.yaml` - Project root configuration
//! - `flows/*.weft` - Flow sources, one or more flows per file

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, FlowError, Result};
use crate::flow::{self, FlowDefinition};
use crate::port::DEFAULT_BUFFER_SIZE;
use crate::qos::{QualityOfService, RetryPolicy};

/// Name of the project file
pub const CONFIG_FILE: &str = "weft.yaml";

/// Extension of flow source files
pub const FLOW_EXTENSION: &str = "weft";

/// Root project configuration from `weft.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,

    /// Runtime defaults; flows may override them
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Directory holding flow sources, relative to the project root
    #[serde(default = "default_flows_dir")]
    pub flows_dir: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_flows_dir() -> String {
    "flows".to_string()
}

/// Defaults applied to every port the runtime creates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Port buffer capacity
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Delivery guarantee
    #[serde(default)]
    pub qos: QualityOfService,

    /// Backoff for deliveries into a full port
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            qos: QualityOfService::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RuntimeConfig {
    /// Reject values the runtime cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::ConfigInvalid {
                message: "runtime.buffer_size must be at least 1".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::ConfigInvalid {
                message: "runtime.retry.max_attempts must be at least 1".to_string(),
            });
        }
        if self.retry.multiplier < 1.0 {
            return Err(Error::ConfigInvalid {
                message: "runtime.retry.multiplier must be at least 1.0".to_string(),
            });
        }
        Ok(())
    }
}

/// Main configuration container
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Base path of the project
    pub base_path: PathBuf,
}

impl Config {
    /// Load configuration from a directory
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the project directory or weft.yaml file
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::load("./my-project")?;
    /// println!("Project: {}", config.project.name);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join(CONFIG_FILE), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let project: ProjectConfig = serde_yaml::from_str(&contents)?;
        project.runtime.validate()?;

        tracing::debug!(project = %project.name, path = %config_path.display(), "Loaded configuration");
        Ok(Self { project, base_path })
    }

    /// Directory holding the flow sources
    pub fn flows_dir(&self) -> PathBuf {
        self.base_path.join(&self.project.flows_dir)
    }

    /// Flow source files under the flows directory, sorted by path
    pub fn flow_files(&self) -> Result<Vec<PathBuf>> {
        let flows_dir = self.flows_dir();
        if !flows_dir.exists() {
            return Ok(vec![]);
        }

        let files = WalkDir::new(&flows_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == FLOW_EXTENSION))
            .collect();
        Ok(files)
    }

    /// Parse and compile every flow source.
    ///
    /// The first file with syntax errors fails the load with all of that
    /// file's diagnostics. Flow names must be unique across files.
    pub fn load_flows(&self) -> Result<Vec<FlowDefinition>> {
        let mut names = HashSet::new();
        let mut flows = Vec::new();
        for path in self.flow_files()? {
            let source = std::fs::read_to_string(&path)?;
            let source_name = path
                .strip_prefix(&self.base_path)
                .unwrap_or(&path)
                .display()
                .to_string();
            for definition in flow::compile_source(&source_name, &source)? {
                if !names.insert(definition.name.clone()) {
                    return Err(FlowError::DuplicateFlow {
                        flow: definition.name,
                    }
                    .into());
                }
                flows.push(definition);
            }
        }
        Ok(flows)
    }

    /// Compiled flow by name
    pub fn load_flow(&self, name: &str) -> Result<FlowDefinition> {
        self.load_flows()?
            .into_iter()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::ConfigInvalid {
                message: format!("flow '{name}' not found in {}", self.flows_dir().display()),
            })
    }
}
