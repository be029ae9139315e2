//! The build host: everything a build program registers, plus the entry
//! points that parse the command line and dispatch to a command.

use crate::args::RunArgs;
use crate::cli::{Cli, CliError, Commands, EXIT_FAILED, EXIT_OK, exit_code_for};
use crate::commands;
use clap::Parser;
use keel_azure::AzurePipelinesEmitter;
use keel_ci::WorkflowDefinition;
use keel_ci::emitter::{Emitter, EmitterRegistry, LocalScriptEmitter};
use keel_core::{
    ArtifactProvider, CiHost, KeelConfig, ParamCatalog, ParamDefinition, SecretProvider, Services,
    TargetDefinition, TargetRegistry,
};
use keel_events::{TracingConfig, TracingError, init_tracing};
use keel_github::GitHubActionsEmitter;
use std::any::Any;
use std::ffi::OsString;
use std::sync::Arc;

/// Result of a command: text for stdout and whether it succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Text printed to stdout, secrets redacted on the way out
    pub output: String,
    /// False when a target failed
    pub success: bool,
}

impl Outcome {
    pub(crate) fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    /// Process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.success { EXIT_OK } else { EXIT_FAILED }
    }
}

/// Build program host.
///
/// ```no_run
/// use keel::{Build, ParamDefinition, TargetDefinition, WorkflowDefinition};
///
/// fn main() {
///     let code = Build::new()
///         .param(ParamDefinition::new("Configuration"))
///         .target(TargetDefinition::new("Compile").executes(|ctx| async move {
///             let configuration = ctx.param("Configuration").unwrap_or_default();
///             tracing::info!(%configuration, "Compiling");
///             Ok(())
///         }))
///         .workflow(WorkflowDefinition::new("ci").target("Compile"))
///         .run();
///     std::process::exit(code);
/// }
/// ```
pub struct Build {
    pub(crate) registry: TargetRegistry,
    pub(crate) catalog: ParamCatalog,
    pub(crate) workflows: Vec<WorkflowDefinition>,
    pub(crate) services: Services,
    pub(crate) host: Option<CiHost>,
    pub(crate) secrets: Option<Arc<dyn SecretProvider>>,
    pub(crate) artifacts: Option<Arc<dyn ArtifactProvider>>,
    pub(crate) emitters: EmitterRegistry,
}

impl Default for Build {
    fn default() -> Self {
        Self::new()
    }
}

impl Build {
    /// Empty build with the three built-in pipeline emitters.
    #[must_use]
    pub fn new() -> Self {
        let mut emitters = EmitterRegistry::new();
        emitters.register(AzurePipelinesEmitter::new());
        emitters.register(GitHubActionsEmitter::new());
        emitters.register(LocalScriptEmitter);

        Self {
            registry: TargetRegistry::new(),
            catalog: ParamCatalog::new(),
            workflows: Vec::new(),
            services: Services::new(),
            host: None,
            secrets: None,
            artifacts: None,
            emitters,
        }
    }

    /// Declare a target.
    #[must_use]
    pub fn target(mut self, definition: TargetDefinition) -> Self {
        self.registry.add(definition);
        self
    }

    /// Include every target of a registry.
    #[must_use]
    pub fn targets(mut self, registry: &TargetRegistry) -> Self {
        self.registry.include(registry);
        self
    }

    /// Declare a parameter.
    #[must_use]
    pub fn param(mut self, definition: ParamDefinition) -> Self {
        self.catalog.insert(definition);
        self
    }

    /// Declare a workflow. A `[[workflows]]` entry of the same name in the
    /// configuration file replaces it.
    #[must_use]
    pub fn workflow(mut self, definition: WorkflowDefinition) -> Self {
        self.workflows.push(definition);
        self
    }

    /// Register a service tasks can look up by type.
    #[must_use]
    pub fn service<T: Any + Send + Sync>(mut self, service: T) -> Self {
        self.services.insert(service);
        self
    }

    /// Host variables are exported to, instead of detecting it from the
    /// environment.
    #[must_use]
    pub fn variables(mut self, host: CiHost) -> Self {
        self.host = Some(host);
        self
    }

    /// Secret provider consulted for secret parameters.
    #[must_use]
    pub fn secrets(mut self, provider: Arc<dyn SecretProvider>) -> Self {
        self.secrets = Some(provider);
        self
    }

    /// Artifact provider used by `keel artifacts`, instead of the file-system
    /// store configured in `keel.toml`.
    #[must_use]
    pub fn artifacts(mut self, provider: Arc<dyn ArtifactProvider>) -> Self {
        self.artifacts = Some(provider);
        self
    }

    /// Register a pipeline emitter, replacing a built-in one of the same
    /// format name.
    #[must_use]
    pub fn emitter(mut self, emitter: impl Emitter + 'static) -> Self {
        self.emitters.register(emitter);
        self
    }

    /// Run with the process arguments.
    #[must_use]
    pub fn run(self) -> i32 {
        self.run_with_args(std::env::args_os())
    }

    /// Parse `args` (program name first), set up logging, and run the
    /// command on a fresh runtime. Returns the process exit code.
    #[must_use]
    pub fn run_with_args<I, T>(self, args: I) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = match Cli::try_parse_from(args) {
            Ok(cli) => cli,
            Err(e) => {
                let _ = e.print();
                return e.exit_code();
            }
        };

        let config = match KeelConfig::load(&cli.config) {
            Ok(config) => config,
            Err(e) => return report(&e.into()),
        };

        let tracing_config = TracingConfig {
            format: cli.log_format.unwrap_or(config.log.format),
            level: cli.level.unwrap_or(config.log.level),
            filter: None,
        };
        match init_tracing(&tracing_config) {
            Ok(()) | Err(TracingError::AlreadyInitialized(_)) => {}
            Err(e) => return report(&CliError::config(e.to_string())),
        }

        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                return report(&CliError::runtime(format!(
                    "Failed to create tokio runtime: {e}"
                )));
            }
        };

        match runtime.block_on(self.execute(cli.command, &config)) {
            Ok(outcome) => {
                if !outcome.output.is_empty() {
                    keel_events::println_redacted(outcome.output.trim_end());
                }
                outcome.exit_code()
            }
            Err(e) => report(&e),
        }
    }

    /// Run one command against an already loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`CliError`] for configuration problems (unknown targets,
    /// graph errors, malformed arguments or workflows) and runtime failures
    /// outside of target tasks. Failing targets are not errors; they show in
    /// the returned [`Outcome`].
    pub async fn execute(self, command: Commands, config: &KeelConfig) -> Result<Outcome, CliError> {
        match command {
            Commands::Run { args } => commands::run(self, config, RunArgs::parse(&args)?).await,
            Commands::Plan {
                targets,
                skip_dependencies,
            } => commands::plan(&self, &targets, skip_dependencies),
            Commands::List { all } => commands::list(&self, all),
            Commands::Generate(args) => commands::generate(self, config, &args).await,
            Commands::Artifacts { command } => commands::artifacts(self, config, command).await,
        }
    }
}

#[allow(clippy::print_stderr)]
fn report(err: &CliError) -> i32 {
    eprintln!("{:?}", miette::Report::new(err.clone()));
    exit_code_for(err)
}
