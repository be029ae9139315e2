//! Pipeline emitters.
//!
//! An [`Emitter`] renders a compiled [`WorkflowModel`] as the text of one
//! backend's pipeline file. Emitters never mutate the model and have no side
//! effects beyond returning text; writing the file is the caller's job.
//!
//! All emitters share the [`LineWriter`] and walk the model in the same
//! order: triggers, top-level options, then jobs in model order, each job's
//! matrix, pool and steps.
//!
//! The [`EmitterRegistry`] maps format names to emitters so the CLI can look
//! them up by `--backend`.

mod local;
mod registry;
mod writer;

pub use local::LocalScriptEmitter;
pub use registry::{EmitterRegistry, RenderedPipeline};
pub use writer::{
    LineWriter, artifacts_command, command_line, shell_glob, shell_quote, yaml_scalar,
};

use crate::model::WorkflowModel;
use std::collections::HashSet;
use thiserror::Error;

/// Error types for emitter operations
#[derive(Debug, Error)]
pub enum EmitterError {
    /// The model cannot be rendered; a compiler defect
    #[error("Invalid workflow model: {0}")]
    InvalidModel(String),

    /// IO error during emission
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for emitter operations
pub type EmitterResult<T> = std::result::Result<T, EmitterError>;

/// Trait for pipeline emitters.
///
/// # Example
///
/// ```
/// use keel_ci::emitter::{Emitter, EmitterResult};
/// use keel_ci::WorkflowModel;
///
/// struct Names;
///
/// impl Emitter for Names {
///     fn emit(&self, model: &WorkflowModel) -> EmitterResult<String> {
///         Ok(model.jobs.iter().map(|job| format!("{}\n", job.id)).collect())
///     }
///
///     fn format_name(&self) -> &'static str {
///         "names"
///     }
///
///     fn file_extension(&self) -> &'static str {
///         "txt"
///     }
/// }
/// ```
pub trait Emitter: Send + Sync {
    /// Render the model.
    ///
    /// # Errors
    /// Returns `EmitterError` if the model cannot be rendered
    fn emit(&self, model: &WorkflowModel) -> EmitterResult<String>;

    /// Format identifier, matched against `--backend`
    fn format_name(&self) -> &'static str;

    /// File extension for output files
    fn file_extension(&self) -> &'static str;

    /// Human-readable description of this emitter
    fn description(&self) -> &'static str {
        "Pipeline emitter"
    }

    /// File name for a workflow, relative to the backend's output directory.
    fn file_name(&self, workflow: &str) -> String {
        format!("{workflow}.{}", self.file_extension())
    }

    /// Check the model before rendering.
    ///
    /// # Errors
    /// Returns `EmitterError::InvalidModel` if job ids repeat or a job
    /// depends on a job that does not precede it
    fn validate(&self, model: &WorkflowModel) -> EmitterResult<()> {
        validate_model(model)
    }
}

/// Structural checks every emitter relies on.
///
/// # Errors
/// Returns `EmitterError::InvalidModel` on a repeated job id or a dependency
/// on a job that is not declared earlier.
pub fn validate_model(model: &WorkflowModel) -> EmitterResult<()> {
    let mut seen = HashSet::new();
    for job in &model.jobs {
        for dep in &job.depends_on {
            if !seen.contains(dep.as_str()) {
                return Err(EmitterError::InvalidModel(format!(
                    "job '{}' depends on '{dep}', which is not declared before it",
                    job.id
                )));
            }
        }
        if !seen.insert(job.id.as_str()) {
            return Err(EmitterError::InvalidModel(format!(
                "job id '{}' is used more than once",
                job.id
            )));
        }
        if job.run_step().is_none() {
            return Err(EmitterError::InvalidModel(format!(
                "job '{}' has no run step",
                job.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::definition::{ArtifactMode, BackendType};
    use crate::model::{RUN_STEP_ID, RunStep, WorkflowJobModel, WorkflowStepModel};

    pub(crate) fn job(id: &str, depends_on: &[&str]) -> WorkflowJobModel {
        WorkflowJobModel {
            id: id.to_string(),
            target: id.to_string(),
            description: None,
            depends_on: depends_on.iter().map(ToString::to_string).collect(),
            dimensions: Vec::new(),
            matrix: Vec::new(),
            runner: None,
            timeout_minutes: None,
            continue_on_error: false,
            outputs: Vec::new(),
            steps: vec![WorkflowStepModel::Run(RunStep {
                id: RUN_STEP_ID.to_string(),
                target: id.to_string(),
                args: Vec::new(),
                env: Vec::new(),
            })],
        }
    }

    pub(crate) fn workflow(jobs: Vec<WorkflowJobModel>) -> WorkflowModel {
        WorkflowModel {
            name: "ci".to_string(),
            backend: BackendType::Local,
            triggers: Vec::new(),
            inputs: Vec::new(),
            pool: None,
            variable_groups: Vec::new(),
            artifacts: ArtifactMode::Native,
            entrypoint: "keel".to_string(),
            jobs,
            warnings: Vec::new(),
        }
    }

    struct TestEmitter;

    impl Emitter for TestEmitter {
        fn emit(&self, model: &WorkflowModel) -> EmitterResult<String> {
            Ok(format!("# {}", model.name))
        }

        fn format_name(&self) -> &'static str {
            "test"
        }

        fn file_extension(&self) -> &'static str {
            "yml"
        }
    }

    #[test]
    fn test_emitter_defaults() {
        let emitter = TestEmitter;
        assert_eq!(emitter.emit(&workflow(vec![])).unwrap(), "# ci");
        assert_eq!(emitter.file_name("release"), "release.yml");
        assert_eq!(emitter.description(), "Pipeline emitter");
    }

    #[test]
    fn test_validation_accepts_ordered_jobs() {
        let model = workflow(vec![job("A", &[]), job("B", &["A"])]);
        assert!(TestEmitter.validate(&model).is_ok());
    }

    #[test]
    fn test_validation_rejects_forward_dependency() {
        let model = workflow(vec![job("B", &["A"]), job("A", &[])]);
        let err = TestEmitter.validate(&model).unwrap_err();
        assert!(err.to_string().contains("not declared before"));
    }

    #[test]
    fn test_validation_rejects_duplicate_ids() {
        let model = workflow(vec![job("A", &[]), job("A", &[])]);
        let err = validate_model(&model).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
