//! Error types for keel-core

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for keel operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Two or more targets share a name
    #[error("Duplicate target names: {}", names.join(", "))]
    #[diagnostic(
        code(keel::config::duplicate_target),
        help("Target names must be unique; rename or remove the extra declarations")
    )]
    DuplicateTargets {
        /// Every name declared more than once
        names: Vec<String>,
    },

    /// A dependency, artifact or variable consumption names an undefined target
    #[error("Missing dependencies: {}", format_missing(missing))]
    #[diagnostic(
        code(keel::config::missing_dependency),
        help("Declare the referenced target or remove the reference")
    )]
    MissingDependencies {
        /// (dependent, missing dependency) pairs
        missing: Vec<(String, String)>,
    },

    /// The target graph contains a cycle
    #[error("Circular dependency: {}", path.join(" -> "))]
    #[diagnostic(code(keel::config::cycle))]
    Cycle {
        /// Cycle in traversal order, first and last entries are the same target
        path: Vec<String>,
    },

    /// A requested target does not exist
    #[error("Unknown target '{name}'")]
    #[diagnostic(code(keel::config::unknown_target), help("Available targets: {available}"))]
    UnknownTarget {
        /// The requested name
        name: String,
        /// Comma separated list of declared targets
        available: String,
    },

    /// Configuration file could not be parsed
    #[error("Failed to parse {}: {message}", path.display())]
    #[diagnostic(code(keel::config::parse))]
    ConfigParse {
        /// Path of the offending file
        path: Box<Path>,
        /// Parser message
        message: String,
    },

    /// I/O error with path context
    #[error("I/O error during {operation}: {source}")]
    #[diagnostic(code(keel::io))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// The path involved, if any
        path: Option<Box<Path>>,
        /// Description of the operation that failed
        operation: String,
    },

    /// A task closure reported a failure
    #[error("Target '{target}' failed: {message}")]
    #[diagnostic(code(keel::task::failed))]
    Task {
        /// Target whose task failed
        target: String,
        /// Failure description
        message: String,
    },

    /// A required parameter has no value
    #[error("Target '{target}' requires parameter '{param}' which has no value")]
    #[diagnostic(
        code(keel::task::missing_parameter),
        help("Pass --{param} <value>, set it in the environment, or add it to [params] in keel.toml")
    )]
    MissingParameter {
        /// Target requiring the parameter
        target: String,
        /// External name of the parameter
        param: String,
    },

    /// A consumed variable was not produced
    #[error("Variable '{variable}' from target '{producer}' has no value")]
    #[diagnostic(code(keel::task::missing_variable))]
    MissingVariable {
        /// Producing target
        producer: String,
        /// Variable name
        variable: String,
    },

    /// A task asked for a service that was never registered
    #[error("No service of type {type_name} is registered")]
    #[diagnostic(code(keel::task::missing_service))]
    MissingService {
        /// Rust type name of the requested service
        type_name: &'static str,
    },

    /// Artifact storage failure
    #[error("Artifact error: {message}")]
    #[diagnostic(code(keel::artifact))]
    Artifact {
        /// Failure description
        message: String,
    },

    /// Illegal target status change
    #[error("Target '{target}' cannot move from {from} to {to}")]
    #[diagnostic(code(keel::state::transition))]
    InvalidTransition {
        /// Target name
        target: String,
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },
}

fn format_missing(missing: &[(String, String)]) -> String {
    missing
        .iter()
        .map(|(dependent, dependency)| {
            format!("target '{dependent}' depends on undefined target '{dependency}'")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create an I/O error with context
    pub fn io(source: std::io::Error, path: Option<PathBuf>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.map(PathBuf::into_boxed_path),
            operation: operation.into(),
        }
    }

    /// Create a config parse error
    pub fn config_parse(path: &Path, message: impl Into<String>) -> Self {
        Self::ConfigParse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a task failure for the given target
    pub fn task(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Task {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create an artifact error
    pub fn artifact(message: impl Into<String>) -> Self {
        Self::Artifact {
            message: message.into(),
        }
    }

    /// Whether this error is a fatal configuration error (raised by resolve)
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTargets { .. }
                | Self::MissingDependencies { .. }
                | Self::Cycle { .. }
                | Self::UnknownTarget { .. }
                | Self::ConfigParse { .. }
        )
    }
}

impl From<keel_task_graph::Error> for Error {
    fn from(err: keel_task_graph::Error) -> Self {
        match err {
            keel_task_graph::Error::DuplicateTargets { names } => Self::DuplicateTargets { names },
            keel_task_graph::Error::MissingDependencies { missing } => {
                Self::MissingDependencies { missing }
            }
            keel_task_graph::Error::CycleDetected { path } => Self::Cycle { path },
        }
    }
}

/// Result type for keel operations
pub type Result<T> = std::result::Result<T, Error>;
