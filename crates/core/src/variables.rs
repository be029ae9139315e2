//! Variable propagation between targets.
//!
//! A producing target writes a named value; a consuming target reads it
//! before its tasks run. Reading copies the value into the parameter cache,
//! so the consumer observes it through ordinary parameter lookup.

use crate::params::{ParamResolution, to_env_name, to_kebab_case};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::io::AsyncWriteExt;

/// Cross-target variable hand-off.
#[async_trait]
pub trait VariablePropagation: Send + Sync {
    /// Record a value produced by `producer`.
    async fn write_variable(&self, producer: &str, name: &str, value: &str) -> Result<()>;

    /// Make the value produced by `producer` visible to parameter lookup.
    ///
    /// Not finding a value is not an error here; the caller checks the
    /// parameter afterwards, since on CI hosts the value arrives through the
    /// environment instead.
    async fn read_variable(&self, producer: &str, name: &str) -> Result<()>;
}

/// Variable store for a single local process.
pub struct InMemoryVariables {
    values: RwLock<HashMap<(String, String), String>>,
    params: Arc<dyn ParamResolution>,
}

impl InMemoryVariables {
    /// Create a store that publishes read values into `params`.
    #[must_use]
    pub fn new(params: Arc<dyn ParamResolution>) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            params,
        }
    }

    /// Look up a stored value.
    #[must_use]
    pub fn get(&self, producer: &str, name: &str) -> Option<String> {
        self.values
            .read()
            .ok()
            .and_then(|values| values.get(&(producer.to_string(), name.to_string())).cloned())
    }
}

#[async_trait]
impl VariablePropagation for InMemoryVariables {
    async fn write_variable(&self, producer: &str, name: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| Error::task(producer, "variable store lock poisoned"))?;
        values.insert((producer.to_string(), name.to_string()), value.to_string());
        tracing::debug!(producer = %producer, variable = %name, "Stored variable");
        Ok(())
    }

    async fn read_variable(&self, producer: &str, name: &str) -> Result<()> {
        if let Some(value) = self.get(producer, name) {
            self.params.cache_param(name, value);
        }
        Ok(())
    }
}

/// CI host the process is running on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiHost {
    /// Plain local run
    Local,
    /// GitHub Actions, outputs appended to this file
    GitHubActions {
        /// Value of `GITHUB_OUTPUT`
        output_file: PathBuf,
    },
    /// Azure Pipelines, outputs set through logging commands
    AzurePipelines,
    /// Generated local script, outputs appended as shell assignments
    Script {
        /// Value of `KEEL_VARIABLES_FILE`
        variables_file: PathBuf,
    },
}

/// Environment variable naming the file a generated local script sources
/// variables from.
pub const VARIABLES_FILE_ENV: &str = "KEEL_VARIABLES_FILE";

impl CiHost {
    /// Detect the host from the process environment.
    #[must_use]
    pub fn detect() -> Self {
        if std::env::var("GITHUB_ACTIONS").is_ok_and(|v| v == "true")
            && let Ok(output_file) = std::env::var("GITHUB_OUTPUT")
        {
            return Self::GitHubActions {
                output_file: PathBuf::from(output_file),
            };
        }
        if std::env::var("TF_BUILD").is_ok_and(|v| v.eq_ignore_ascii_case("true")) {
            return Self::AzurePipelines;
        }
        if let Ok(variables_file) = std::env::var(VARIABLES_FILE_ENV)
            && !variables_file.is_empty()
        {
            return Self::Script {
                variables_file: PathBuf::from(variables_file),
            };
        }
        Self::Local
    }
}

/// Variable propagation that also exports values to the CI host, so that
/// downstream jobs can receive them through generated output bindings.
pub struct HostVariables {
    local: InMemoryVariables,
    host: CiHost,
}

impl HostVariables {
    /// Wrap an in-memory store for the given host.
    #[must_use]
    pub const fn new(local: InMemoryVariables, host: CiHost) -> Self {
        Self { local, host }
    }

    /// The detected host.
    #[must_use]
    pub const fn host(&self) -> &CiHost {
        &self.host
    }

    async fn export(&self, name: &str, value: &str) -> Result<()> {
        match &self.host {
            CiHost::Local => Ok(()),
            CiHost::GitHubActions { output_file } => {
                append_line(output_file, &format!("{name}={value}")).await
            }
            CiHost::Script { variables_file } => {
                let env_name = to_env_name(&to_kebab_case(name));
                append_line(variables_file, &shell_export(&env_name, value)).await
            }
            CiHost::AzurePipelines => {
                keel_events::println_redacted(&azure_set_variable(name, value));
                Ok(())
            }
        }
    }
}

async fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| Error::io(e, Some(path.to_path_buf()), "open"))?;
    file.write_all(format!("{line}\n").as_bytes())
        .await
        .map_err(|e| Error::io(e, Some(path.to_path_buf()), "append"))
}

/// Shell assignment exporting `value` under `name`, single-quoted.
#[must_use]
pub fn shell_export(name: &str, value: &str) -> String {
    format!("export {name}='{}'", value.replace('\'', "'\\''"))
}

/// Azure Pipelines logging command declaring an output variable.
#[must_use]
pub fn azure_set_variable(name: &str, value: &str) -> String {
    format!("##vso[task.setvariable variable={name};isOutput=true]{value}")
}

#[async_trait]
impl VariablePropagation for HostVariables {
    async fn write_variable(&self, producer: &str, name: &str, value: &str) -> Result<()> {
        self.local.write_variable(producer, name, value).await?;
        self.export(name, value).await
    }

    async fn read_variable(&self, producer: &str, name: &str) -> Result<()> {
        self.local.read_variable(producer, name).await
    }
}
