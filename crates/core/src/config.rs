//! Project configuration loaded from `keel.toml`.

use crate::{Error, Result};
use keel_events::{LogLevel, TracingFormat};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Conventional configuration file name.
pub const CONFIG_FILE: &str = "keel.toml";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeelConfig {
    /// Logging defaults, overridden by CLI flags
    pub log: LogConfig,
    /// Parameter values, the configuration source of parameter lookup
    pub params: BTreeMap<String, String>,
    /// Artifact storage
    pub artifacts: ArtifactsConfig,
    /// Output directories per backend
    pub output: OutputConfig,
    /// Workflow definitions, decoded by the workflow compiler
    pub workflows: Vec<toml::Table>,
}

/// Logging configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level
    pub level: LogLevel,
    /// Output format
    pub format: TracingFormat,
}

/// Artifact storage locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Root of the file-system artifact store
    pub store: PathBuf,
    /// Workspace directory artifacts are published from
    pub workspace: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            store: PathBuf::from(".keel/artifacts"),
            workspace: PathBuf::from("artifacts"),
        }
    }
}

/// Where generated workflow files are written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Azure Pipelines directory
    pub azure: PathBuf,
    /// GitHub Actions directory
    pub github: PathBuf,
    /// Local shell script directory
    pub local: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            azure: PathBuf::from("azure-pipelines"),
            github: PathBuf::from(".github/workflows"),
            local: PathBuf::from("scripts"),
        }
    }
}

impl KeelConfig {
    /// Load configuration from `path`.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file exists but cannot be read, or
    /// [`Error::ConfigParse`] if it is not valid configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No configuration file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::io(e, Some(path.to_path_buf()), "read")),
        };
        Self::parse(path, &contents)
    }

    /// Parse configuration text; `path` is used for error reporting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] on malformed input.
    pub fn parse(path: &Path, contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::config_parse(path, e.to_string()))
    }

    /// Output directory for a backend by its short name.
    #[must_use]
    pub fn output_dir(&self, backend: &str) -> Option<&Path> {
        match backend {
            "azure" => Some(&self.output.azure),
            "github" => Some(&self.output.github),
            "local" => Some(&self.output.local),
            _ => None,
        }
    }
}
