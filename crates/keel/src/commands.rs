//! Command handlers. Each returns the text to print instead of printing it.

use crate::args::RunArgs;
use crate::build::{Build, Outcome};
use crate::cli::{ArtifactCommands, CliError, GenerateArgs};
use keel_ci::{BackendType, WorkflowCompiler, WorkflowDefinition};
use keel_core::{
    ArtifactProvider, BuildExecutor, CiHost, FileSystemArtifactProvider, HostVariables,
    InMemoryVariables, KeelConfig, LayeredParams, resolve,
};
use keel_events::emit_workflow_written;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

/// Resolve and execute the requested targets.
pub async fn run(build: Build, config: &KeelConfig, args: RunArgs) -> Result<Outcome, CliError> {
    let Build {
        registry,
        catalog,
        services,
        host,
        secrets,
        ..
    } = build;

    let mut model = resolve(
        registry.build_definitions(),
        &args.targets,
        args.skip_dependencies,
    )?;
    tracing::debug!(
        pending = ?model.pending(),
        non_interactive = args.non_interactive,
        "Resolved build"
    );

    for definition in catalog.iter().filter(|d| d.secret) {
        let external = catalog.external_arg_name(&definition.key);
        let values = [
            args.params.get(&external),
            config.params.get(&definition.key),
            config.params.get(&external),
        ];
        keel_events::register_secrets(
            values
                .into_iter()
                .flatten()
                .filter(|value| !value.is_empty())
                .cloned(),
        );
    }

    let mut params = LayeredParams::new(Arc::new(catalog))
        .with_cli_args(args.params)
        .with_config(config.params.clone());
    if let Some(secrets) = secrets {
        params = params.with_secret_provider(secrets);
    }
    let params = Arc::new(params);
    let variables = Arc::new(HostVariables::new(
        InMemoryVariables::new(params.clone()),
        host.unwrap_or_else(CiHost::detect),
    ));

    let executor = BuildExecutor::new(params, variables, Arc::new(services));
    let summary = executor.execute(&mut model).await;

    Ok(Outcome {
        output: format!("{summary}\n"),
        success: summary.is_success(),
    })
}

/// Show the resolved targets and whether each would run.
pub fn plan(
    build: &Build,
    targets: &[String],
    skip_dependencies: bool,
) -> Result<Outcome, CliError> {
    let model = resolve(build.registry.build_definitions(), targets, skip_dependencies)?;

    let width = model
        .targets()
        .iter()
        .map(|target| target.name.len())
        .max()
        .unwrap_or(0);
    let mut output = String::new();
    for (target, state) in model.iter() {
        let _ = writeln!(output, "{:width$}  {}", target.name, state.status);
    }
    let _ = writeln!(
        output,
        "\n{} of {} targets to run",
        model.pending().len(),
        model.targets().len()
    );
    Ok(Outcome::ok(output))
}

/// List declared targets in dependency order.
pub fn list(build: &Build, all: bool) -> Result<Outcome, CliError> {
    let model = resolve(build.registry.build_definitions(), &[], false)?;

    let visible: Vec<_> = model
        .targets()
        .iter()
        .filter(|target| all || !target.hidden)
        .collect();
    if visible.is_empty() {
        return Ok(Outcome::ok("No targets declared\n"));
    }

    let width = visible.iter().map(|target| target.name.len()).max().unwrap_or(0);
    let mut output = String::new();
    for target in visible {
        match &target.description {
            Some(description) => {
                let _ = writeln!(output, "{:width$}  {description}", target.name);
            }
            None => {
                let _ = writeln!(output, "{}", target.name);
            }
        }
    }
    Ok(Outcome::ok(output))
}

/// Compile workflows and write them, or print them with `--stdout`.
pub async fn generate(
    build: Build,
    config: &KeelConfig,
    args: &GenerateArgs,
) -> Result<Outcome, CliError> {
    let model = resolve(build.registry.build_definitions(), &[], false)?;
    let mut workflows = merge_workflows(build.workflows, config)?;

    if let Some(name) = &args.workflow {
        if !workflows.iter().any(|w| &w.name == name) {
            let available: Vec<&str> = workflows.iter().map(|w| w.name.as_str()).collect();
            return Err(CliError::config_with_help(
                format!("Unknown workflow '{name}'"),
                format!("Available workflows: {}", available.join(", ")),
            ));
        }
        workflows.retain(|w| &w.name == name);
    }

    let compiler = WorkflowCompiler::new(&model, &build.catalog);
    let mut output = String::new();
    for workflow in &workflows {
        let backends = match args.backend {
            Some(backend) => vec![backend],
            None => workflow.backends.clone(),
        };
        if backends.is_empty() {
            tracing::warn!(
                workflow = %workflow.name,
                "Workflow lists no backends, pass --backend to generate it"
            );
            continue;
        }

        for backend in backends {
            let compiled = compiler.compile(workflow, backend);
            let rendered = build.emitters.render(&compiled)?;

            if args.stdout {
                output.push_str(&rendered.content);
                continue;
            }

            let dir = config.output_dir(backend.as_str()).ok_or_else(|| {
                CliError::config(format!("No output directory for backend '{backend}'"))
            })?;
            let path = dir.join(&rendered.file_name);
            write_pipeline(&path, &rendered.content, backend).await?;
            emit_workflow_written!(workflow.name, backend, path.display());

            let _ = write!(output, "Wrote {}", path.display());
            match compiled.warnings.len() {
                0 => output.push('\n'),
                1 => output.push_str(" (1 warning)\n"),
                n => {
                    let _ = writeln!(output, " ({n} warnings)");
                }
            }
        }
    }

    if output.is_empty() {
        output.push_str("Nothing generated\n");
    }
    Ok(Outcome::ok(output))
}

/// Workflows declared in code, with configuration entries replacing those
/// of the same name and adding the rest.
fn merge_workflows(
    mut workflows: Vec<WorkflowDefinition>,
    config: &KeelConfig,
) -> Result<Vec<WorkflowDefinition>, CliError> {
    for table in &config.workflows {
        let definition: WorkflowDefinition = toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e| {
                CliError::config_with_help(
                    format!("Invalid [[workflows]] entry: {e}"),
                    "Workflow entries need a name and a list of targets",
                )
            })?;
        match workflows.iter_mut().find(|w| w.name == definition.name) {
            Some(existing) => {
                tracing::debug!(workflow = %definition.name, "Configuration replaces workflow");
                *existing = definition;
            }
            None => workflows.push(definition),
        }
    }
    Ok(workflows)
}

async fn write_pipeline(path: &Path, text: &str, backend: BackendType) -> Result<(), CliError> {
    let io_error = |e: std::io::Error, operation: &str| {
        CliError::from(keel_core::Error::io(e, Some(path.to_path_buf()), operation))
    };

    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| io_error(e, "create_dir_all"))?;
    }
    tokio::fs::write(path, text)
        .await
        .map_err(|e| io_error(e, "write"))?;

    #[cfg(unix)]
    if backend == BackendType::Local {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| io_error(e, "set_permissions"))?;
    }
    #[cfg(not(unix))]
    let _ = backend;

    Ok(())
}

/// `keel artifacts` subcommands.
pub async fn artifacts(
    build: Build,
    config: &KeelConfig,
    command: ArtifactCommands,
) -> Result<Outcome, CliError> {
    let provider: Arc<dyn ArtifactProvider> = build.artifacts.unwrap_or_else(|| {
        Arc::new(FileSystemArtifactProvider::new(
            config.artifacts.store.clone(),
            config.artifacts.workspace.clone(),
        ))
    });

    let output = match command {
        ArtifactCommands::Store { names, location } => {
            provider
                .store_artifacts(&names, location.build_id.as_deref(), location.slice.as_deref())
                .await?;
            format!("Stored {}\n", names.join(", "))
        }
        ArtifactCommands::Retrieve { names, location } => {
            provider
                .retrieve_artifacts(&names, location.build_id.as_deref(), location.slice.as_deref())
                .await?;
            format!("Retrieved {}\n", names.join(", "))
        }
        ArtifactCommands::Cleanup { build_ids } => {
            provider.cleanup(&build_ids).await?;
            format!("Removed artifacts of {}\n", build_ids.join(", "))
        }
        ArtifactCommands::List { artifact, slice } => {
            let ids = provider
                .stored_run_identifiers(artifact.as_deref(), slice.as_deref())
                .await?;
            if ids.is_empty() {
                "No stored artifacts\n".to_string()
            } else {
                ids.iter().map(|id| format!("{id}\n")).collect()
            }
        }
    };
    Ok(Outcome::ok(output))
}
