//! Commands driven through the build host, the way a build program runs.

use clap::Parser;
use keel::cli::{EXIT_CLI, EXIT_FAILED, exit_code_for};
use keel::{
    BackendType, Build, CiHost, Cli, CliError, Outcome, ParamDefinition, TargetDefinition,
    WorkflowDefinition,
};
use keel_core::KeelConfig;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct Journal(Mutex<Vec<String>>);

impl Journal {
    fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

fn recording(name: &str) -> TargetDefinition {
    let owned = name.to_string();
    TargetDefinition::new(name).executes(move |ctx| {
        let name = owned.clone();
        async move {
            ctx.service::<Arc<Journal>>()?.record(name);
            Ok(())
        }
    })
}

fn build(journal: &Arc<Journal>) -> Build {
    Build::new()
        .variables(CiHost::Local)
        .service(journal.clone())
        .param(ParamDefinition::new("Configuration"))
        .param(ParamDefinition::secret("ApiKey"))
        .target(recording("Restore").description("Restore packages"))
        .target(recording("Compile").depends_on(["Restore"]))
        .target(
            TargetDefinition::new("Pack")
                .depends_on(["Compile"])
                .requires(["Configuration"])
                .executes(|ctx| async move {
                    let configuration = ctx.require_param("Configuration")?;
                    ctx.service::<Arc<Journal>>()?
                        .record(format!("Pack:{configuration}"));
                    Ok(())
                }),
        )
        .target(recording("Lint").hidden())
}

async fn execute(build: Build, config: &KeelConfig, args: &[&str]) -> Result<Outcome, CliError> {
    let cli = Cli::try_parse_from(std::iter::once("keel").chain(args.iter().copied())).unwrap();
    build.execute(cli.command, config).await
}

fn config_in(dir: &Path, extra: &str) -> KeelConfig {
    let root = dir.display().to_string().replace('\\', "/");
    let text = format!(
        r#"
[artifacts]
store = "{root}/store"
workspace = "{root}/artifacts"

[output]
azure = "{root}/azure-pipelines"
github = "{root}/.github/workflows"
local = "{root}/scripts"
{extra}
"#
    );
    KeelConfig::parse(Path::new("keel.toml"), &text).unwrap()
}

#[tokio::test]
async fn test_run_executes_dependencies_in_order() {
    let journal = Arc::new(Journal::default());
    let outcome = execute(
        build(&journal),
        &KeelConfig::default(),
        &["run", "Pack", "--configuration", "Release"],
    )
    .await
    .unwrap();

    assert!(outcome.success, "{}", outcome.output);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(journal.entries(), ["Restore", "Compile", "Pack:Release"]);
    assert!(outcome.output.contains("Build succeeded"));
}

#[tokio::test]
async fn test_run_skip_dependencies_and_config_params() {
    let journal = Arc::new(Journal::default());
    let config = KeelConfig::parse(
        Path::new("keel.toml"),
        "[params]\nConfiguration = \"Debug\"\n",
    )
    .unwrap();

    let outcome = execute(
        build(&journal),
        &config,
        &["run", "Pack", "--skip-dependencies", "--non-interactive"],
    )
    .await
    .unwrap();

    assert!(outcome.success);
    assert_eq!(journal.entries(), ["Pack:Debug"]);
}

#[tokio::test]
async fn test_run_reports_failures_and_skips_dependents() {
    let journal = Arc::new(Journal::default());
    let failing = build(&journal).target(
        TargetDefinition::new("Publish")
            .depends_on(["Pack"])
            .executes(|_ctx| async { Ok(()) }),
    );

    let outcome = execute(failing, &KeelConfig::default(), &["run", "Publish"])
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.exit_code(), EXIT_FAILED);
    assert_eq!(journal.entries(), ["Restore", "Compile"]);
    assert!(outcome.output.contains("Build failed: Pack"));
    assert!(outcome.output.contains("Skipped"));
}

#[tokio::test]
async fn test_run_unknown_target_is_a_configuration_error() {
    let journal = Arc::new(Journal::default());
    let err = execute(build(&journal), &KeelConfig::default(), &["run", "Deploy"])
        .await
        .unwrap_err();

    assert_eq!(exit_code_for(&err), EXIT_CLI);
    assert!(err.to_string().contains("Deploy"));
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn test_plan_shows_status_per_target() {
    let journal = Arc::new(Journal::default());
    let outcome = execute(build(&journal), &KeelConfig::default(), &["plan", "Compile"])
        .await
        .unwrap();

    let lines: Vec<&str> = outcome.output.lines().collect();
    assert!(lines[0].starts_with("Restore") && lines[0].ends_with("PendingRun"));
    assert!(lines[1].starts_with("Compile") && lines[1].ends_with("PendingRun"));
    assert!(lines.iter().any(|l| l.starts_with("Pack") && l.ends_with("Skipped")));
    assert!(outcome.output.contains("2 of 4 targets to run"));
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn test_list_hides_hidden_targets() {
    let journal = Arc::new(Journal::default());
    let visible = execute(build(&journal), &KeelConfig::default(), &["list"])
        .await
        .unwrap();
    assert!(visible.output.contains("Restore  Restore packages"));
    assert!(!visible.output.contains("Lint"));

    let all = execute(build(&journal), &KeelConfig::default(), &["list", "--all"])
        .await
        .unwrap();
    assert!(all.output.contains("Lint"));
}

#[tokio::test]
async fn test_generate_writes_each_backend() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path(), "");
    let journal = Arc::new(Journal::default());
    let workflow = WorkflowDefinition::new("ci")
        .backend(BackendType::GitHub)
        .backend(BackendType::Local)
        .target("Restore")
        .target("Compile");

    let outcome = execute(build(&journal).workflow(workflow), &config, &["generate"])
        .await
        .unwrap();

    let github = dir.path().join(".github/workflows/ci.yml");
    let script = dir.path().join("scripts/ci.sh");
    assert!(outcome.output.contains(&github.display().to_string()));
    assert!(std::fs::read_to_string(&github).unwrap().contains("needs:"));
    assert!(
        std::fs::read_to_string(&script)
            .unwrap()
            .starts_with("#!/usr/bin/env bash")
    );
    assert!(!dir.path().join("azure-pipelines").exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}

#[tokio::test]
async fn test_generate_config_workflow_to_stdout() {
    let dir = TempDir::new().unwrap();
    let config = config_in(
        dir.path(),
        r#"
[[workflows]]
name = "nightly"
targets = [{ name = "Pack" }]
"#,
    );
    let journal = Arc::new(Journal::default());

    let outcome = execute(
        build(&journal),
        &config,
        &["generate", "--workflow", "nightly", "--backend", "azure", "--stdout"],
    )
    .await
    .unwrap();

    assert!(outcome.output.contains("- job: Pack"));
    assert!(!dir.path().join("azure-pipelines").exists());
}

#[tokio::test]
async fn test_generate_unknown_workflow() {
    let journal = Arc::new(Journal::default());
    let err = execute(
        build(&journal).workflow(WorkflowDefinition::new("ci").target("Compile")),
        &KeelConfig::default(),
        &["generate", "--workflow", "release"],
    )
    .await
    .unwrap_err();

    let CliError::Config { help, .. } = &err else {
        panic!("expected configuration error, got {err:?}");
    };
    assert_eq!(help.as_deref(), Some("Available workflows: ci"));
}

#[tokio::test]
async fn test_artifact_commands_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path(), "");
    let workspace = dir.path().join("artifacts/bin");
    std::fs::create_dir_all(&workspace).unwrap();
    std::fs::write(workspace.join("app.dll"), b"binary").unwrap();

    let store = execute(
        Build::new(),
        &config,
        &["artifacts", "store", "bin", "--build-id", "42", "--slice", "001_a"],
    )
    .await
    .unwrap();
    assert_eq!(store.output, "Stored bin\n");

    let listed = execute(Build::new(), &config, &["artifacts", "list", "--artifact", "bin"])
        .await
        .unwrap();
    assert_eq!(listed.output, "42\n");

    std::fs::remove_dir_all(dir.path().join("artifacts")).unwrap();
    execute(
        Build::new(),
        &config,
        &["artifacts", "retrieve", "bin", "--build-id", "42", "--slice", "001_a"],
    )
    .await
    .unwrap();
    assert_eq!(std::fs::read(workspace.join("app.dll")).unwrap(), b"binary");

    execute(Build::new(), &config, &["artifacts", "cleanup", "42"])
        .await
        .unwrap();
    let after = execute(Build::new(), &config, &["artifacts", "list"])
        .await
        .unwrap();
    assert_eq!(after.output, "No stored artifacts\n");
}

#[test]
fn test_run_with_args_maps_parse_errors_to_exit_codes() {
    assert_eq!(Build::new().run_with_args(["keel", "--version"]), 0);
    assert_eq!(Build::new().run_with_args(["keel", "frobnicate"]), 2);
}
