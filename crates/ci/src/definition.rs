//! Workflow definitions.
//!
//! A [`WorkflowDefinition`] names an ordered subset of targets, how the
//! pipeline is triggered, and options the compiler passes through to the
//! backends. Definitions are built in code or read from the `[[workflows]]`
//! tables of `keel.toml`.

use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// CI technology a workflow is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Azure Pipelines YAML
    Azure,
    /// GitHub Actions YAML
    GitHub,
    /// Local bash script
    Local,
}

impl BackendType {
    /// Every backend, in a fixed order.
    pub const ALL: [Self; 3] = [Self::Azure, Self::GitHub, Self::Local];

    /// Short name used on the command line and as emitter format name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Azure => "azure",
            Self::GitHub => "github",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "azure" => Ok(Self::Azure),
            "github" => Ok(Self::GitHub),
            "local" => Ok(Self::Local),
            other => Err(format!(
                "unknown backend '{other}', expected one of: azure, github, local"
            )),
        }
    }
}

/// When a workflow runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum Trigger {
    /// Pushes to matching branches or tags
    Push {
        /// Branch patterns
        #[serde(default)]
        branches: Vec<String>,
        /// Tag patterns
        #[serde(default)]
        tags: Vec<String>,
        /// Path filters
        #[serde(default)]
        paths: Vec<String>,
    },
    /// Pull requests targeting matching branches
    PullRequest {
        /// Target branch patterns
        #[serde(default)]
        branches: Vec<String>,
        /// Path filters
        #[serde(default)]
        paths: Vec<String>,
    },
    /// Cron schedule
    Schedule {
        /// Cron expression
        cron: String,
        /// Branches the schedule applies to
        #[serde(default)]
        branches: Vec<String>,
    },
    /// Manual run with typed inputs
    Manual {
        /// Inputs, each bound to the parameter of the same key
        #[serde(default)]
        inputs: Vec<ManualInput>,
    },
}

/// Type of a manual-run input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// true/false switch
    Boolean,
    /// Free text
    #[default]
    String,
    /// One of a fixed set of options
    Choice,
}

/// Parameter a user supplies when starting a workflow by hand.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManualInput {
    /// Parameter key
    pub name: String,
    /// Description shown in the run dialog
    #[serde(default)]
    pub description: Option<String>,
    /// Input type
    #[serde(rename = "type", default)]
    pub kind: InputKind,
    /// Default value
    #[serde(default)]
    pub default: Option<String>,
    /// Allowed values for choice inputs
    #[serde(default)]
    pub options: Vec<String>,
}

impl ManualInput {
    /// A free-text input.
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind: InputKind::String,
            default: None,
            options: Vec::new(),
        }
    }

    /// A boolean input with its default.
    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        Self {
            kind: InputKind::Boolean,
            default: Some(default.to_string()),
            ..Self::string(name)
        }
    }

    /// A choice input; the first option is the default.
    pub fn choice<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let options: Vec<String> = options.into_iter().map(Into::into).collect();
        Self {
            kind: InputKind::Choice,
            default: options.first().cloned(),
            options,
            ..Self::string(name)
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// A named axis of parameter values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatrixDimension {
    /// Parameter key the values are bound to
    pub name: String,
    /// Values, in expansion order
    pub values: Vec<String>,
}

impl MatrixDimension {
    /// Create a dimension.
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Per-step options of a target reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StepOptions {
    /// Job timeout
    pub timeout_minutes: Option<u32>,
    /// Runner or pool image overriding the workflow pool
    pub runner: Option<String>,
    /// Keep the pipeline going when this job fails
    pub continue_on_error: bool,
}

/// A target included in a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetReference {
    /// Target name
    pub name: String,
    /// Matrix dimensions, outermost first
    #[serde(default)]
    pub matrix: Vec<MatrixDimension>,
    /// Do not publish the artifacts this target produces
    #[serde(default)]
    pub suppress_publish: bool,
    /// Step options
    #[serde(default)]
    pub options: StepOptions,
}

impl TargetReference {
    /// Reference a target by name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matrix: Vec::new(),
            suppress_publish: false,
            options: StepOptions::default(),
        }
    }

    /// Add a matrix dimension.
    #[must_use]
    pub fn matrix(mut self, dimension: MatrixDimension) -> Self {
        self.matrix.push(dimension);
        self
    }

    /// Suppress artifact publishing.
    #[must_use]
    pub const fn suppress_publish(mut self) -> Self {
        self.suppress_publish = true;
        self
    }

    /// Set the step options.
    #[must_use]
    pub fn options(mut self, options: StepOptions) -> Self {
        self.options = options;
        self
    }
}

/// Where artifacts are exchanged between jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactMode {
    /// The backend's own artifact store
    #[default]
    Native,
    /// `keel artifacts store|retrieve` steps
    Custom,
}

/// Backing store of an injected secret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretSource {
    /// Secret stored with the pipeline (repository secret, pipeline variable)
    #[default]
    Plain,
    /// Secret fetched from a key vault at run time
    Vault,
}

/// Binding of a secret parameter to a secret known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretInjection {
    /// Parameter key
    pub param: String,
    /// Name of the secret in the backend store or vault
    #[serde(default)]
    pub secret: Option<String>,
    /// Backing store
    #[serde(default)]
    pub source: SecretSource,
    /// Vault name, for vault secrets
    #[serde(default)]
    pub vault: Option<String>,
    /// Service connection or credentials secret used to reach the vault
    #[serde(default)]
    pub connection: Option<String>,
}

impl SecretInjection {
    /// Inject a pipeline secret.
    pub fn plain(param: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            secret: Some(secret.into()),
            source: SecretSource::Plain,
            vault: None,
            connection: None,
        }
    }

    /// Inject a secret fetched from `vault` through `connection`.
    pub fn vault(
        param: impl Into<String>,
        secret: impl Into<String>,
        vault: impl Into<String>,
        connection: impl Into<String>,
    ) -> Self {
        Self {
            param: param.into(),
            secret: Some(secret.into()),
            source: SecretSource::Vault,
            vault: Some(vault.into()),
            connection: Some(connection.into()),
        }
    }

    /// Backend secret name, if set and non-empty.
    #[must_use]
    pub fn secret_name(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Workflow-level options passed through to the backends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkflowOptions {
    /// Pool image or runner label
    pub pool: Option<String>,
    /// Command invoking the build, `keel` when unset
    pub entrypoint: Option<String>,
    /// Artifact exchange
    pub artifacts: ArtifactMode,
    /// Secret injections
    pub secrets: Vec<SecretInjection>,
    /// Variable groups (Azure) made available to every job
    pub variable_groups: Vec<String>,
    /// Literal parameter values passed to every step
    pub params: IndexMap<String, String>,
    /// Default job timeout
    pub timeout_minutes: Option<u32>,
}

/// Entrypoint used when a workflow does not set one.
pub const DEFAULT_ENTRYPOINT: &str = "keel";

/// Authoring-time workflow.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDefinition {
    /// Workflow name, also the output file stem
    pub name: String,
    /// Triggers
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    /// Targets, each becoming one job
    #[serde(default)]
    pub targets: Vec<TargetReference>,
    /// Options
    #[serde(default)]
    pub options: WorkflowOptions,
    /// Backends the workflow is generated for
    #[serde(default)]
    pub backends: Vec<BackendType>,
}

impl WorkflowDefinition {
    /// Start a workflow with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            triggers: Vec::new(),
            targets: Vec::new(),
            options: WorkflowOptions::default(),
            backends: Vec::new(),
        }
    }

    /// Add a trigger.
    #[must_use]
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Include a target by name.
    #[must_use]
    pub fn target(self, name: impl Into<String>) -> Self {
        self.target_ref(TargetReference::new(name))
    }

    /// Include a target reference.
    #[must_use]
    pub fn target_ref(mut self, reference: TargetReference) -> Self {
        self.targets.push(reference);
        self
    }

    /// Set the options.
    #[must_use]
    pub fn options(mut self, options: WorkflowOptions) -> Self {
        self.options = options;
        self
    }

    /// Request a backend.
    #[must_use]
    pub fn backend(mut self, backend: BackendType) -> Self {
        if !self.backends.contains(&backend) {
            self.backends.push(backend);
        }
        self
    }

    /// Entrypoint command.
    #[must_use]
    pub fn entrypoint(&self) -> &str {
        self.options
            .entrypoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .unwrap_or(DEFAULT_ENTRYPOINT)
    }

    /// Manual inputs across all manual triggers.
    pub fn manual_inputs(&self) -> impl Iterator<Item = &ManualInput> {
        self.triggers.iter().flat_map(|trigger| match trigger {
            Trigger::Manual { inputs } => inputs.as_slice(),
            _ => &[],
        })
    }
}
