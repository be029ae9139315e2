//! Build host and command line for keel.
//!
//! A build program declares its targets, parameters and workflows on a
//! [`Build`] and hands control to it:
//!
//! ```no_run
//! use keel::{Build, TargetDefinition};
//!
//! std::process::exit(
//!     Build::new()
//!         .target(TargetDefinition::new("Restore"))
//!         .target(TargetDefinition::new("Compile").depends_on(["Restore"]))
//!         .run(),
//! );
//! ```
//!
//! The resulting binary understands `run`, `plan`, `list`, `generate` and
//! `artifacts`; generated pipelines call it back with
//! `run <Target> --skip-dependencies --non-interactive`.

pub mod args;
pub mod build;
pub mod cli;
mod commands;

pub use args::RunArgs;
pub use build::{Build, Outcome};
pub use cli::{Cli, CliError, Commands};

pub use keel_ci::{
    ArtifactMode, BackendType, ManualInput, MatrixDimension, SecretInjection, StepOptions,
    TargetReference, Trigger, WorkflowDefinition, WorkflowOptions,
};
pub use keel_core::{CiHost, ParamDefinition, TargetDefinition, TargetRegistry, TaskContext};
