//! Workflow compilation for keel.
//!
//! A [`WorkflowDefinition`] names the targets a pipeline runs, with their
//! matrices, triggers and secrets. The [`WorkflowCompiler`] turns it into a
//! backend-neutral [`WorkflowModel`] against a resolved build model, and an
//! [`Emitter`](emitter::Emitter) renders that model as a pipeline file.
//!
//! ```
//! use keel_ci::{BackendType, WorkflowCompiler, WorkflowDefinition};
//! use keel_ci::emitter::{Emitter, LocalScriptEmitter};
//! use keel_core::{ParamCatalog, TargetDefinition, resolve};
//!
//! let model = resolve(
//!     vec![
//!         TargetDefinition::new("Restore"),
//!         TargetDefinition::new("Compile").depends_on(["Restore"]),
//!     ],
//!     &[],
//!     false,
//! )
//! .unwrap();
//! let catalog = ParamCatalog::new();
//! let workflow = WorkflowDefinition::new("ci").target("Restore").target("Compile");
//!
//! let compiled = WorkflowCompiler::new(&model, &catalog).compile(&workflow, BackendType::Local);
//! let script = LocalScriptEmitter.emit(&compiled).unwrap();
//! assert!(script.contains("keel run Compile --skip-dependencies --non-interactive"));
//! ```

pub mod compiler;
pub mod definition;
pub mod emitter;
pub mod matrix;
pub mod model;

pub use compiler::WorkflowCompiler;
pub use definition::{
    ArtifactMode, BackendType, InputKind, ManualInput, MatrixDimension, SecretInjection,
    SecretSource, StepOptions, TargetReference, Trigger, WorkflowDefinition, WorkflowOptions,
};
pub use model::{
    ArgValue, Binding, InputModel, MatrixInstance, NativeArtifact, RunStep, SecretRef,
    SliceSelector, VaultFetch, WorkflowJobModel, WorkflowModel, WorkflowStepModel,
};
