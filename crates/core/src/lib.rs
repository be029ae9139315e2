//! Core types for keel.
//!
//! Targets are declared as [`TargetDefinition`]s, usually through a
//! [`TargetRegistry`], resolved into a [`BuildModel`] by [`resolve`], and run
//! in dependency order by the [`BuildExecutor`]. Tasks reach parameters,
//! variables, services and child processes through their [`TaskContext`].
//!
//! ```no_run
//! use keel_core::{BuildExecutor, InMemoryVariables, LayeredParams, ParamCatalog, Services};
//! use keel_core::{TargetDefinition, resolve};
//! use std::sync::Arc;
//!
//! # async fn run() -> keel_core::Result<()> {
//! let targets = vec![
//!     TargetDefinition::new("Restore"),
//!     TargetDefinition::new("Build")
//!         .depends_on(["Restore"])
//!         .executes(|_ctx| async { Ok(()) }),
//! ];
//! let mut model = resolve(targets, &["Build".to_string()], false)?;
//!
//! let params = Arc::new(LayeredParams::new(Arc::new(ParamCatalog::new())));
//! let variables = Arc::new(InMemoryVariables::new(params.clone()));
//! let executor = BuildExecutor::new(params, variables, Arc::new(Services::new()));
//! let summary = executor.execute(&mut model).await;
//! assert!(summary.is_success());
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod model;
pub mod params;
pub mod process;
pub mod registry;
pub mod resolver;
pub mod summary;
pub mod target;
pub mod variables;

pub use artifacts::{ALL_SLICES, ArtifactProvider, FileSystemArtifactProvider};
pub use config::KeelConfig;
pub use context::{Services, TaskContext};
pub use error::{Error, Result};
pub use executor::BuildExecutor;
pub use model::{BuildModel, TargetId, TargetModel, TargetState, TargetStatus};
pub use params::{
    LayeredParams, ParamCatalog, ParamDefinition, ParamResolution, ParamSources, SecretProvider,
    StaticSecrets,
};
pub use process::{ProcessOutput, run_process};
pub use registry::TargetRegistry;
pub use resolver::resolve;
pub use summary::{BuildSummary, SummaryEntry};
pub use target::{ArtifactBinding, ProducedArtifact, TargetDefinition, TaskFn, VariableBinding};
pub use variables::{CiHost, HostVariables, InMemoryVariables, VariablePropagation};
