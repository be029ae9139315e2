//! Backend-neutral compiled workflow.
//!
//! A [`WorkflowModel`] is produced fresh for every (workflow, backend) pair
//! by the compiler and handed read-only to an emitter. Values that differ
//! between backends (secret references, matrix references, cross-job
//! outputs) are kept symbolic as [`ArgValue`]s; each emitter decides their
//! literal syntax.

use crate::definition::{ArtifactMode, BackendType, ManualInput, MatrixDimension, Trigger};
use indexmap::IndexMap;

/// Id of the step running the target inside each job; cross-job output
/// references go through it.
pub const RUN_STEP_ID: &str = "run";

/// Compiled workflow for one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowModel {
    /// Workflow name
    pub name: String,
    /// Backend this model was compiled for
    pub backend: BackendType,
    /// Triggers, passed through
    pub triggers: Vec<Trigger>,
    /// Manual inputs collected from manual triggers
    pub inputs: Vec<InputModel>,
    /// Default pool image or runner label
    pub pool: Option<String>,
    /// Variable groups, passed through
    pub variable_groups: Vec<String>,
    /// Artifact exchange mode
    pub artifacts: ArtifactMode,
    /// Build command
    pub entrypoint: String,
    /// Jobs in dependency order
    pub jobs: Vec<WorkflowJobModel>,
    /// Recoverable inconsistencies found while compiling
    pub warnings: Vec<String>,
}

impl WorkflowModel {
    /// Job by id.
    #[must_use]
    pub fn job(&self, id: &str) -> Option<&WorkflowJobModel> {
        self.jobs.iter().find(|job| job.id == id)
    }

    /// Whether any job reads a secret from a vault.
    #[must_use]
    pub fn uses_vault(&self) -> bool {
        self.jobs.iter().any(|job| !job.vault_secrets().is_empty())
    }
}

/// Manual input with its external argument name resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputModel {
    /// Declared input
    pub input: ManualInput,
    /// External argument name of the bound parameter
    pub external_name: String,
}

/// One matrix combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixInstance {
    /// Stable slice identifier, e.g. `002_a_2`
    pub slice: String,
    /// Dimension name to value
    pub values: IndexMap<String, String>,
}

/// One job, normally one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowJobModel {
    /// Job id, unique within the workflow
    pub id: String,
    /// Target the job runs
    pub target: String,
    /// Target description
    pub description: Option<String>,
    /// Ids of jobs that must finish first
    pub depends_on: Vec<String>,
    /// Matrix dimensions, outermost first
    pub dimensions: Vec<MatrixDimension>,
    /// Expanded combinations; empty when the job is not a matrix job
    pub matrix: Vec<MatrixInstance>,
    /// Pool image or runner label overriding the workflow default
    pub runner: Option<String>,
    /// Timeout
    pub timeout_minutes: Option<u32>,
    /// Keep the pipeline going when this job fails
    pub continue_on_error: bool,
    /// Variables the job exports to later jobs
    pub outputs: Vec<String>,
    /// Steps in order
    pub steps: Vec<WorkflowStepModel>,
}

impl WorkflowJobModel {
    /// Whether the job is expanded over a matrix.
    #[must_use]
    pub fn is_matrix(&self) -> bool {
        !self.matrix.is_empty()
    }

    /// The step running the target.
    #[must_use]
    pub fn run_step(&self) -> Option<&RunStep> {
        self.steps.iter().find_map(|step| match step {
            WorkflowStepModel::Run(run) => Some(run),
            _ => None,
        })
    }

    /// Secrets fetched from vaults, in binding order, without duplicates.
    #[must_use]
    pub fn vault_secrets(&self) -> Vec<&SecretRef> {
        let mut seen: Vec<&SecretRef> = Vec::new();
        if let Some(run) = self.run_step() {
            for binding in &run.env {
                if let ArgValue::Secret(secret) = &binding.value
                    && secret.vault.is_some()
                    && !seen.iter().any(|s| s.name == secret.name)
                {
                    seen.push(secret);
                }
            }
        }
        seen
    }

    /// Vault secrets grouped by vault, in first-use order.
    #[must_use]
    pub fn vault_fetches(&self) -> Vec<VaultFetch<'_>> {
        let mut fetches: Vec<VaultFetch<'_>> = Vec::new();
        for secret in self.vault_secrets() {
            let Some(vault) = secret.vault.as_deref() else {
                continue;
            };
            match fetches.iter_mut().find(|f| f.vault == vault) {
                Some(fetch) => fetch.secrets.push(&secret.name),
                None => fetches.push(VaultFetch {
                    vault,
                    connection: secret.connection.as_deref(),
                    secrets: vec![&secret.name],
                }),
            }
        }
        fetches
    }

    /// Cross-job variable bindings of the run step.
    pub fn variable_bindings(&self) -> impl Iterator<Item = &Binding> {
        self.run_step()
            .into_iter()
            .flat_map(|run| run.env.iter())
            .filter(|binding| matches!(binding.value, ArgValue::Variable { .. }))
    }
}

/// Secrets a job fetches from one vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultFetch<'a> {
    /// Vault name
    pub vault: &'a str,
    /// Connection of the first secret bound from this vault
    pub connection: Option<&'a str>,
    /// Secret names
    pub secrets: Vec<&'a str>,
}

/// Reference to an artifact in the backend's native store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeArtifact {
    /// Artifact name
    pub name: String,
    /// Job producing it
    pub producer_job: String,
    /// Slice selection
    pub slice: SliceSelector,
}

impl NativeArtifact {
    /// Name of the artifact in the native store, given the backend's
    /// expression for the running slice. `None` when every slice is meant.
    #[must_use]
    pub fn stored_name(&self, current: &str) -> Option<String> {
        match &self.slice {
            SliceSelector::Unsliced => Some(self.name.clone()),
            SliceSelector::Current => Some(format!("{}-{current}", self.name)),
            SliceSelector::Exact(slice) => Some(format!("{}-{slice}", self.name)),
            SliceSelector::All => None,
        }
    }
}

/// Which slices of an artifact a step addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceSelector {
    /// Artifact was not produced by a matrix job
    Unsliced,
    /// The slice of the job instance running the step
    Current,
    /// One named slice
    Exact(String),
    /// Every slice, merged
    All,
}

/// A step of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowStepModel {
    /// Download one artifact from the native store into `artifacts/<name>`
    DownloadArtifact(NativeArtifact),
    /// Retrieve artifacts through `keel artifacts retrieve`
    RetrieveArtifacts {
        /// Artifact names
        names: Vec<String>,
        /// Slice the names are retrieved from
        slice: SliceSelector,
    },
    /// Run the target
    Run(RunStep),
    /// Upload one artifact to the native store
    PublishArtifact {
        /// Artifact
        artifact: NativeArtifact,
        /// Workspace paths making up the artifact
        paths: Vec<String>,
    },
    /// Store artifacts through `keel artifacts store`
    StoreArtifacts {
        /// Artifact names
        names: Vec<String>,
        /// Slice the names are stored under
        slice: SliceSelector,
    },
}

/// The step invoking the build for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStep {
    /// Step id
    pub id: String,
    /// Target name
    pub target: String,
    /// `--name value` arguments, in order
    pub args: Vec<Binding>,
    /// Environment variables
    pub env: Vec<Binding>,
}

/// A name bound to a backend-specific value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Argument name (without dashes) or environment variable name
    pub name: String,
    /// Bound value
    pub value: ArgValue,
}

impl Binding {
    /// Bind `value` to `name`.
    pub fn new(name: impl Into<String>, value: ArgValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Secret known to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    /// Secret name in the backend store or vault
    pub name: String,
    /// Vault name, for vault secrets
    pub vault: Option<String>,
    /// Service connection or credentials used to reach the vault
    pub connection: Option<String>,
}

/// Symbolic value rendered by each emitter in its own syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// Literal text
    Literal(String),
    /// Value of a matrix dimension in the current instance
    Matrix(String),
    /// Secret reference
    Secret(SecretRef),
    /// Output of another job
    Variable {
        /// Producing job id
        job: String,
        /// Variable name as written by the producer
        name: String,
    },
    /// Manual input by parameter key
    Input(String),
}
