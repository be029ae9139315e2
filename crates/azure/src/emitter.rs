//! Azure Pipelines Emitter
//!
//! Renders a compiled workflow as an Azure Pipelines YAML file.

use keel_ci::emitter::{
    Emitter, EmitterResult, LineWriter, artifacts_command, command_line, shell_glob, shell_quote,
    yaml_scalar,
};
use keel_ci::model::RUN_STEP_ID;
use keel_ci::{
    ArgValue, InputKind, InputModel, NativeArtifact, Trigger, WorkflowJobModel, WorkflowModel,
    WorkflowStepModel,
};

const KEYVAULT_TASK: &str = "AzureKeyVault@2";
const DOWNLOAD_TASK: &str = "DownloadPipelineArtifact@2";
const BUILD_ID: &str = "$(Build.BuildId)";
const CURRENT_SLICE: &str = "$(slice)";
const STAGING_DIR: &str = "$(Build.ArtifactStagingDirectory)";
const WORKSPACE_DIR: &str = "$(System.DefaultWorkingDirectory)";
const TEMP_DIR: &str = "$(Agent.TempDirectory)";

/// Azure Pipelines emitter
///
/// # Model to Azure Pipelines Mapping
///
/// | Model | Azure Pipelines |
/// |-------|-----------------|
/// | push / pull request triggers | `trigger:` / `pr:`, all triggers of a kind merged |
/// | schedule triggers | `schedules:` |
/// | manual inputs | `parameters:` |
/// | `variable_groups` | `variables: - group:` |
/// | `job.depends_on` | `dependsOn:` |
/// | `job.matrix` | `strategy.matrix`, one leg per slice |
/// | `ArgValue::Variable` | job variable from `dependencies.<job>.outputs['run.<name>']` |
/// | `ArgValue::Secret` | `$(name)`, vault secrets loaded by `AzureKeyVault@2` |
/// | native artifacts | staged copy + `publish:` / `DownloadPipelineArtifact@2` into `artifacts/<name>` |
#[derive(Debug, Clone)]
pub struct AzurePipelinesEmitter {
    /// Default VM image
    pub vm_image: String,
}

impl Default for AzurePipelinesEmitter {
    fn default() -> Self {
        Self {
            vm_image: "ubuntu-latest".to_string(),
        }
    }
}

impl AzurePipelinesEmitter {
    /// Create a new Azure Pipelines emitter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the VM image used when the workflow names no pool
    #[must_use]
    pub fn with_vm_image(mut self, image: impl Into<String>) -> Self {
        self.vm_image = image.into();
        self
    }
}

/// Name of the pipeline parameter bound to an input.
fn parameter_name(input: &InputModel) -> String {
    input.external_name.replace('-', "_")
}

/// Matrix leg names must be identifiers.
fn leg_name(slice: &str) -> String {
    let id: String = slice
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("slice_{id}")
}

/// Job variable holding another job's output.
fn output_variable(job: &str, name: &str) -> String {
    format!("{job}_{name}")
}

fn include_list(w: &mut LineWriter, key: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    w.section(format!("{key}:"), |w| {
        w.section("include:", |w| {
            for value in values {
                w.line(format!("- {}", yaml_scalar(value)));
            }
        });
    });
}

/// Union of the filters of every trigger of one kind. A trigger without
/// branch (and tag) filters matches every branch; a trigger without path
/// filters lifts the path filter for all of them.
#[derive(Debug, Default)]
struct MergedFilter {
    branches: Vec<String>,
    tags: Vec<String>,
    paths: Vec<String>,
    any_path: bool,
}

impl MergedFilter {
    fn add(&mut self, branches: &[String], tags: &[String], paths: &[String]) {
        if branches.is_empty() && tags.is_empty() {
            union(&mut self.branches, &["*".to_string()]);
        }
        union(&mut self.branches, branches);
        union(&mut self.tags, tags);
        if paths.is_empty() {
            self.any_path = true;
        }
        union(&mut self.paths, paths);
    }

    fn write(&self, w: &mut LineWriter) {
        if self.branches.iter().any(|b| b == "*") {
            include_list(w, "branches", &["*".to_string()]);
        } else {
            include_list(w, "branches", &self.branches);
        }
        include_list(w, "tags", &self.tags);
        if !self.any_path {
            include_list(w, "paths", &self.paths);
        }
    }
}

fn union(into: &mut Vec<String>, values: &[String]) {
    for value in values {
        if !into.contains(value) {
            into.push(value.clone());
        }
    }
}

fn write_triggers(w: &mut LineWriter, model: &WorkflowModel) {
    let mut push: Option<MergedFilter> = None;
    let mut pr: Option<MergedFilter> = None;
    let mut schedules = Vec::new();
    for trigger in &model.triggers {
        match trigger {
            Trigger::Push {
                branches,
                tags,
                paths,
            } => push.get_or_insert_with(MergedFilter::default).add(branches, tags, paths),
            Trigger::PullRequest { branches, paths } => {
                pr.get_or_insert_with(MergedFilter::default).add(branches, &[], paths);
            }
            Trigger::Schedule { cron, branches } => schedules.push((cron, branches)),
            Trigger::Manual { .. } => {}
        }
    }

    match push {
        Some(filter) => w.section("trigger:", |w| filter.write(w)),
        None => w.line("trigger: none"),
    }
    match pr {
        Some(filter) => w.section("pr:", |w| filter.write(w)),
        None => w.line("pr: none"),
    }
    if !schedules.is_empty() {
        w.section("schedules:", |w| {
            for (cron, branches) in schedules {
                w.line(format!("- cron: {}", yaml_scalar(cron)));
                w.indented(|w| {
                    w.line(format!("displayName: {}", yaml_scalar(&format!("Scheduled {}", model.name))));
                    include_list(w, "branches", branches);
                    w.line("always: true");
                });
            }
        });
    }
}

fn write_parameters(w: &mut LineWriter, model: &WorkflowModel) {
    if model.inputs.is_empty() {
        return;
    }
    w.section("parameters:", |w| {
        for input in &model.inputs {
            let declared = &input.input;
            w.line(format!("- name: {}", parameter_name(input)));
            w.indented(|w| {
                let display = declared.description.as_deref().unwrap_or(&declared.name);
                w.line(format!("displayName: {}", yaml_scalar(display)));
                match declared.kind {
                    InputKind::Boolean => {
                        w.line("type: boolean");
                        let default = declared.default.as_deref() == Some("true");
                        w.line(format!("default: {default}"));
                    }
                    InputKind::String | InputKind::Choice => {
                        w.line("type: string");
                        if let Some(default) = &declared.default {
                            w.line(format!("default: {}", yaml_scalar(default)));
                        }
                        if declared.kind == InputKind::Choice && !declared.options.is_empty() {
                            w.section("values:", |w| {
                                for option in &declared.options {
                                    w.line(format!("- {}", yaml_scalar(option)));
                                }
                            });
                        }
                    }
                }
            });
        }
    });
}

/// Expression for a value, as used in `env:` entries.
fn expression(model: &WorkflowModel, value: &ArgValue) -> String {
    match value {
        ArgValue::Literal(text) => text.clone(),
        ArgValue::Matrix(dimension) => format!("$({dimension})"),
        ArgValue::Secret(secret) => format!("$({})", secret.name),
        ArgValue::Variable { job, name } => format!("$({})", output_variable(job, name)),
        ArgValue::Input(key) => {
            let name = model
                .inputs
                .iter()
                .find(|input| &input.input.name == key)
                .map_or_else(|| key.clone(), parameter_name);
            format!("${{{{ parameters.{name} }}}}")
        }
    }
}

fn render_arg(model: &WorkflowModel, value: &ArgValue) -> String {
    match value {
        ArgValue::Literal(text) => shell_quote(text),
        other => format!("\"{}\"", expression(model, other)),
    }
}

fn script_step(w: &mut LineWriter, script: &str, display: &str) {
    w.line(format!("- script: {}", yaml_scalar(script)));
    w.indented(|w| w.line(format!("displayName: {}", yaml_scalar(display))));
}

/// Bash step, also available on Windows agents.
fn bash_step(w: &mut LineWriter, script: &str, display: &str) {
    w.line(format!("- bash: {}", yaml_scalar(script)));
    w.indented(|w| w.line(format!("displayName: {}", yaml_scalar(display))));
}

fn write_download(w: &mut LineWriter, artifact: &NativeArtifact) {
    let dest = format!("{WORKSPACE_DIR}/artifacts/{}", artifact.name);
    let stored = artifact.stored_name(CURRENT_SLICE);
    let download_dir = match stored {
        Some(_) => dest.clone(),
        None => format!("{TEMP_DIR}/{}", artifact.name),
    };
    w.line(format!("- task: {DOWNLOAD_TASK}"));
    w.indented(|w| {
        let display = match stored {
            Some(_) => format!("Download {}", artifact.name),
            None => format!("Download all slices of {}", artifact.name),
        };
        w.line(format!("displayName: {}", yaml_scalar(&display)));
        w.section("inputs:", |w| {
            w.line("buildType: current");
            match &stored {
                Some(name) => w.line(format!("artifact: {}", yaml_scalar(name))),
                None => w.line(format!(
                    "itemPattern: {}",
                    yaml_scalar(&format!("{}-*/**", artifact.name))
                )),
            }
            w.line(format!("targetPath: {}", yaml_scalar(&download_dir)));
        });
    });
    if stored.is_none() {
        bash_step(
            w,
            &format!("mkdir -p \"{dest}\" && cp -R \"{download_dir}\"/*/. \"{dest}/\""),
            &format!("Merge slices of {}", artifact.name),
        );
    }
}

/// Copy the artifact's paths into a staging directory. A single plain path
/// contributes its contents; globs and multiple paths contribute each match.
fn stage_script(staging: &str, paths: &[String]) -> String {
    let copy = match paths {
        [path] if !path.contains(['*', '?', '[']) => {
            let source = shell_quote(path);
            format!(
                "if [ -d {source} ]; then cp -R {source}/. \"{staging}/\"; else cp {source} \"{staging}/\"; fi"
            )
        }
        _ => {
            let sources: Vec<String> = paths.iter().map(|p| shell_glob(p)).collect();
            format!("cp -R {} \"{staging}/\"", sources.join(" "))
        }
    };
    format!("set -e; mkdir -p \"{staging}\"; {copy}")
}

fn write_publish(w: &mut LineWriter, artifact: &NativeArtifact, paths: &[String]) {
    let name = artifact
        .stored_name(CURRENT_SLICE)
        .unwrap_or_else(|| artifact.name.clone());
    let staging = format!("{STAGING_DIR}/{}", artifact.name);
    bash_step(
        w,
        &stage_script(&staging, paths),
        &format!("Stage {}", artifact.name),
    );
    w.line(format!("- publish: {}", yaml_scalar(&staging)));
    w.indented(|w| {
        w.line(format!("artifact: {}", yaml_scalar(&name)));
        w.line(format!("displayName: {}", yaml_scalar(&format!("Publish {}", artifact.name))));
    });
}

fn write_step(w: &mut LineWriter, model: &WorkflowModel, step: &WorkflowStepModel) {
    match step {
        WorkflowStepModel::DownloadArtifact(artifact) => write_download(w, artifact),
        WorkflowStepModel::RetrieveArtifacts { names, slice } => script_step(
            w,
            &artifacts_command(
                &model.entrypoint,
                "retrieve",
                names,
                slice,
                BUILD_ID,
                CURRENT_SLICE,
            ),
            "Retrieve artifacts",
        ),
        WorkflowStepModel::Run(run) => {
            let command = command_line(&model.entrypoint, run, |value| render_arg(model, value));
            w.line(format!("- script: {}", yaml_scalar(&command)));
            w.indented(|w| {
                w.line(format!("name: {}", run.id));
                w.line(format!("displayName: {}", yaml_scalar(&format!("Run {}", run.target))));
                if !run.env.is_empty() {
                    w.section("env:", |w| {
                        for binding in &run.env {
                            w.line(format!(
                                "{}: {}",
                                binding.name,
                                yaml_scalar(&expression(model, &binding.value))
                            ));
                        }
                    });
                }
            });
        }
        WorkflowStepModel::PublishArtifact { artifact, paths } => {
            write_publish(w, artifact, paths);
        }
        WorkflowStepModel::StoreArtifacts { names, slice } => script_step(
            w,
            &artifacts_command(
                &model.entrypoint,
                "store",
                names,
                slice,
                BUILD_ID,
                CURRENT_SLICE,
            ),
            "Store artifacts",
        ),
    }
}

fn write_job(w: &mut LineWriter, model: &WorkflowModel, job: &WorkflowJobModel) {
    w.line(format!("- job: {}", job.id));
    w.indented(|w| {
        let display = job.description.as_deref().unwrap_or(&job.target);
        w.line(format!("displayName: {}", yaml_scalar(display)));
        if !job.depends_on.is_empty() {
            w.section("dependsOn:", |w| {
                for dep in &job.depends_on {
                    w.line(format!("- {dep}"));
                }
            });
        }
        if let Some(minutes) = job.timeout_minutes {
            w.line(format!("timeoutInMinutes: {minutes}"));
        }
        if job.continue_on_error {
            w.line("continueOnError: true");
        }
        if job.is_matrix() {
            w.section("strategy:", |w| {
                w.section("matrix:", |w| {
                    for instance in &job.matrix {
                        w.section(format!("{}:", leg_name(&instance.slice)), |w| {
                            w.line(format!("slice: {}", yaml_scalar(&instance.slice)));
                            for (name, value) in &instance.values {
                                w.line(format!("{name}: {}", yaml_scalar(value)));
                            }
                        });
                    }
                });
            });
        }
        if let Some(runner) = &job.runner {
            w.section("pool:", |w| w.line(format!("vmImage: {}", yaml_scalar(runner))));
        }
        let consumed: Vec<_> = job
            .variable_bindings()
            .filter_map(|binding| match &binding.value {
                ArgValue::Variable { job, name } => Some((job, name)),
                _ => None,
            })
            .collect();
        if !consumed.is_empty() {
            w.section("variables:", |w| {
                for (producer, name) in consumed {
                    let reference =
                        format!("$[ dependencies.{producer}.outputs['{RUN_STEP_ID}.{name}'] ]");
                    w.line(format!(
                        "{}: {}",
                        output_variable(producer, name),
                        yaml_scalar(&reference)
                    ));
                }
            });
        }
        w.section("steps:", |w| {
            w.line("- checkout: self");
            for fetch in job.vault_fetches() {
                w.line(format!("- task: {KEYVAULT_TASK}"));
                w.indented(|w| {
                    w.line(format!(
                        "displayName: {}",
                        yaml_scalar(&format!("Read secrets from {}", fetch.vault))
                    ));
                    w.section("inputs:", |w| {
                        if let Some(connection) = fetch.connection {
                            w.line(format!("azureSubscription: {}", yaml_scalar(connection)));
                        }
                        w.line(format!("KeyVaultName: {}", yaml_scalar(fetch.vault)));
                        w.line(format!("SecretsFilter: {}", yaml_scalar(&fetch.secrets.join(","))));
                        w.line("RunAsPreJob: false");
                    });
                });
            }
            for step in &job.steps {
                write_step(w, model, step);
            }
        });
    });
}

impl Emitter for AzurePipelinesEmitter {
    fn emit(&self, model: &WorkflowModel) -> EmitterResult<String> {
        let mut w = LineWriter::new();
        w.comment("Generated by keel - do not edit");
        w.comment(format!("Workflow: {}", model.name));
        w.blank();
        write_triggers(&mut w, model);
        write_parameters(&mut w, model);
        if !model.variable_groups.is_empty() {
            w.section("variables:", |w| {
                for group in &model.variable_groups {
                    w.line(format!("- group: {}", yaml_scalar(group)));
                }
            });
        }
        let image = model.pool.as_deref().unwrap_or(&self.vm_image);
        w.section("pool:", |w| w.line(format!("vmImage: {}", yaml_scalar(image))));
        w.blank();
        w.section("jobs:", |w| {
            for job in &model.jobs {
                write_job(w, model, job);
            }
        });
        Ok(w.finish())
    }

    fn format_name(&self) -> &'static str {
        "azure"
    }

    fn file_extension(&self) -> &'static str {
        "yml"
    }

    fn description(&self) -> &'static str {
        "Azure Pipelines YAML"
    }
}
