//! Command line definition, CLI errors and exit codes.

use clap::{Args, Parser, Subcommand};
use keel_ci::BackendType;
use keel_ci::emitter::EmitterError;
use keel_core::config::CONFIG_FILE;
use keel_events::{LogLevel, TracingFormat};
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// At least one target failed
pub const EXIT_FAILED: i32 = 1;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Runtime error exit code (I/O, artifact storage, rendering)
pub const EXIT_RUNTIME: i32 = 3;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// CLI or configuration error (exit code 2)
    #[error("{message}")]
    #[diagnostic(code(keel::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },

    /// Runtime failure outside of target tasks (exit code 3)
    #[error("{message}")]
    #[diagnostic(code(keel::cli::runtime))]
    Runtime {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new runtime error
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new runtime error with help text
    #[must_use]
    pub fn runtime_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

/// Convert `keel_core::Error` to the matching `CliError` variant.
///
/// Resolve and configuration failures map to `Config`, everything else to
/// `Runtime`. Diagnostic help text is carried over.
impl From<keel_core::Error> for CliError {
    fn from(err: keel_core::Error) -> Self {
        let help = err.help().map(|h| h.to_string());
        let message = err.to_string();
        match err {
            keel_core::Error::Io {
                source,
                path,
                operation,
            } => {
                let path_str = path
                    .as_ref()
                    .map_or(String::new(), |p| format!(" on {}", p.display()));
                Self::runtime_with_help(
                    format!("I/O {operation} failed{path_str}: {source}"),
                    "Check file permissions and ensure the path exists",
                )
            }
            err if err.is_configuration() => Self::Config { message, help },
            _ => Self::Runtime { message, help },
        }
    }
}

impl From<EmitterError> for CliError {
    fn from(err: EmitterError) -> Self {
        match err {
            EmitterError::InvalidModel(message) => {
                Self::config_with_help(message, "Check the workflow definition and target graph")
            }
            EmitterError::Io(source) => Self::runtime(format!("I/O error: {source}")),
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Runtime { .. } => EXIT_RUNTIME,
    }
}

/// Command line of a keel build.
#[derive(Parser, Debug)]
#[command(name = "keel", about = "Declarative build targets for local runs and CI pipelines", version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file.
    #[arg(long, global = true, default_value = CONFIG_FILE, help = "Path to the configuration file")]
    pub config: PathBuf,

    /// Logging verbosity level, overriding the configuration file.
    #[arg(short = 'l', long, global = true, help = "Set logging level")]
    pub level: Option<LogLevel>,

    /// Log output format, overriding the configuration file.
    #[arg(long, global = true, help = "Log format: pretty, compact or json")]
    pub log_format: Option<TracingFormat>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run targets and their dependencies.
    #[command(
        about = "Run targets and their dependencies",
        long_about = "Run targets and their dependencies.\n\n\
            Flags after the targets are passed as parameters: --name value, \
            --name=value, or a bare --flag meaning true. \
            --skip-dependencies and --non-interactive are reserved."
    )]
    Run {
        /// Targets followed by flags and parameters.
        #[arg(
            value_name = "TARGETS",
            required = true,
            num_args = 1..,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        args: Vec<String>,
    },

    /// Show what a run would execute.
    #[command(about = "Show the execution plan without running anything")]
    Plan {
        /// Targets to plan.
        #[arg(value_name = "TARGETS", required = true)]
        targets: Vec<String>,

        /// Plan only the requested targets.
        #[arg(long)]
        skip_dependencies: bool,
    },

    /// List declared targets.
    #[command(about = "List declared targets")]
    List {
        /// Include hidden targets.
        #[arg(long)]
        all: bool,
    },

    /// Generate pipeline files from workflow definitions.
    #[command(about = "Generate pipeline files from workflow definitions")]
    Generate(GenerateArgs),

    /// Artifact storage used by generated pipelines.
    #[command(about = "Store, retrieve and clean up build artifacts")]
    Artifacts {
        /// Artifact subcommand to execute.
        #[command(subcommand)]
        command: ArtifactCommands,
    },
}

/// Arguments of `keel generate`.
#[derive(Args, Debug, Clone, Default)]
pub struct GenerateArgs {
    /// Only this workflow.
    #[arg(long, value_name = "NAME")]
    pub workflow: Option<String>,

    /// Only this backend, instead of the workflow's own backends.
    #[arg(long, value_name = "BACKEND", help = "Backend: azure, github or local")]
    pub backend: Option<BackendType>,

    /// Print to stdout instead of writing files.
    #[arg(long)]
    pub stdout: bool,
}

/// Location of a stored artifact.
#[derive(Args, Debug, Clone, Default)]
pub struct ArtifactLocation {
    /// Build the artifacts belong to.
    #[arg(long, value_name = "ID")]
    pub build_id: Option<String>,

    /// Matrix slice the artifacts belong to. `*` retrieves every slice, merged.
    #[arg(long, value_name = "SLICE")]
    pub slice: Option<String>,
}

/// `keel artifacts` subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum ArtifactCommands {
    /// Copy artifacts from the workspace into the store.
    #[command(about = "Store workspace artifacts")]
    Store {
        /// Artifact names.
        #[arg(value_name = "NAMES", required = true)]
        names: Vec<String>,
        /// Storage location.
        #[command(flatten)]
        location: ArtifactLocation,
    },

    /// Copy artifacts from the store into the workspace.
    #[command(about = "Retrieve stored artifacts into the workspace")]
    Retrieve {
        /// Artifact names.
        #[arg(value_name = "NAMES", required = true)]
        names: Vec<String>,
        /// Storage location.
        #[command(flatten)]
        location: ArtifactLocation,
    },

    /// Delete everything stored for some builds.
    #[command(about = "Remove stored artifacts of the given builds")]
    Cleanup {
        /// Build ids.
        #[arg(value_name = "BUILD_IDS", required = true)]
        build_ids: Vec<String>,
    },

    /// List builds holding stored artifacts.
    #[command(about = "List build ids with stored artifacts")]
    List {
        /// Only builds holding this artifact.
        #[arg(long)]
        artifact: Option<String>,
        /// Only builds holding this slice.
        #[arg(long)]
        slice: Option<String>,
    },
}
