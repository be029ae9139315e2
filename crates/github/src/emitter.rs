//! GitHub Actions Workflow Emitter
//!
//! Renders a compiled workflow as a GitHub Actions workflow file for
//! `.github/workflows/`.

use keel_ci::emitter::{
    Emitter, EmitterResult, LineWriter, artifacts_command, command_line, shell_quote, yaml_scalar,
};
use keel_ci::{
    ArgValue, InputKind, NativeArtifact, Trigger, WorkflowJobModel, WorkflowModel,
    WorkflowStepModel,
};
use keel_ci::model::RUN_STEP_ID;

const CHECKOUT_ACTION: &str = "actions/checkout@v4";
const UPLOAD_ACTION: &str = "actions/upload-artifact@v4";
const DOWNLOAD_ACTION: &str = "actions/download-artifact@v4";
const AZURE_LOGIN_ACTION: &str = "azure/login@v2";
const KEYVAULT_ACTION: &str = "azure/get-keyvault-secrets@v1";

const BUILD_ID: &str = "${{ github.run_id }}";
const CURRENT_SLICE: &str = "${{ matrix.slice }}";

/// GitHub Actions workflow emitter
///
/// # Model to GitHub Actions Mapping
///
/// | Model | GitHub Actions |
/// |-------|----------------|
/// | `triggers` | `on:` push / pull_request / schedule / workflow_dispatch |
/// | `job.id` | Job key |
/// | `job.depends_on` | `needs:` |
/// | `job.matrix` | `strategy.matrix.include` |
/// | `job.outputs` | `outputs:` read from the run step |
/// | `ArgValue::Secret` | `${{ secrets.NAME }}` or a key vault step output |
/// | `ArgValue::Variable` | `${{ needs.<job>.outputs.<name> }}` |
/// | native artifacts | `actions/upload-artifact` / `actions/download-artifact` |
#[derive(Debug, Clone)]
pub struct GitHubActionsEmitter {
    /// Default runner for jobs
    pub runner: String,
}

impl Default for GitHubActionsEmitter {
    fn default() -> Self {
        Self {
            runner: "ubuntu-latest".to_string(),
        }
    }
}

impl GitHubActionsEmitter {
    /// Create a new GitHub Actions emitter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the runner used when neither the job nor the workflow names one
    #[must_use]
    pub fn with_runner(mut self, runner: impl Into<String>) -> Self {
        self.runner = runner.into();
        self
    }

    fn write_triggers(w: &mut LineWriter, model: &WorkflowModel) {
        w.section("on:", |w| {
            if model.triggers.is_empty() {
                w.line("workflow_dispatch:");
                return;
            }
            let mut schedules = Vec::new();
            for trigger in &model.triggers {
                match trigger {
                    Trigger::Push {
                        branches,
                        tags,
                        paths,
                    } => w.section("push:", |w| {
                        list(w, "branches", branches);
                        list(w, "tags", tags);
                        list(w, "paths", paths);
                    }),
                    Trigger::PullRequest { branches, paths } => w.section("pull_request:", |w| {
                        list(w, "branches", branches);
                        list(w, "paths", paths);
                    }),
                    Trigger::Schedule { cron, .. } => schedules.push(cron.as_str()),
                    Trigger::Manual { .. } => {}
                }
            }
            if !schedules.is_empty() {
                w.section("schedule:", |w| {
                    for cron in schedules {
                        w.line(format!("- cron: {}", yaml_scalar(cron)));
                    }
                });
            }
            if model
                .triggers
                .iter()
                .any(|t| matches!(t, Trigger::Manual { .. }))
            {
                Self::write_dispatch(w, model);
            }
        });
    }

    fn write_dispatch(w: &mut LineWriter, model: &WorkflowModel) {
        if model.inputs.is_empty() {
            w.line("workflow_dispatch:");
            return;
        }
        w.section("workflow_dispatch:", |w| {
            w.section("inputs:", |w| {
                for input in &model.inputs {
                    let declared = &input.input;
                    w.section(format!("{}:", input.external_name), |w| {
                        if let Some(description) = &declared.description {
                            w.line(format!("description: {}", yaml_scalar(description)));
                        }
                        w.line(format!("required: {}", declared.default.is_none()));
                        match declared.kind {
                            InputKind::Boolean => {
                                w.line("type: boolean");
                                if let Some(default) = &declared.default {
                                    w.line(format!("default: {}", default == "true"));
                                }
                            }
                            InputKind::String => {
                                w.line("type: string");
                                if let Some(default) = &declared.default {
                                    w.line(format!("default: {}", yaml_scalar(default)));
                                }
                            }
                            InputKind::Choice => {
                                w.line("type: choice");
                                if let Some(default) = &declared.default {
                                    w.line(format!("default: {}", yaml_scalar(default)));
                                }
                                list(w, "options", &declared.options);
                            }
                        }
                    });
                }
            });
        });
    }

    fn write_job(&self, w: &mut LineWriter, model: &WorkflowModel, job: &WorkflowJobModel) {
        w.section(format!("{}:", job.id), |w| {
            w.line(format!("name: {}", yaml_scalar(&job.target)));
            let runner = job
                .runner
                .as_deref()
                .or(model.pool.as_deref())
                .unwrap_or(&self.runner);
            w.line(format!("runs-on: {}", yaml_scalar(runner)));
            list(w, "needs", &job.depends_on);
            if let Some(minutes) = job.timeout_minutes {
                w.line(format!("timeout-minutes: {minutes}"));
            }
            if job.continue_on_error {
                w.line("continue-on-error: true");
            }
            if job.is_matrix() {
                w.section("strategy:", |w| {
                    w.line("fail-fast: false");
                    w.section("matrix:", |w| {
                        w.section("include:", |w| {
                            for instance in &job.matrix {
                                w.line(format!("- slice: {}", yaml_scalar(&instance.slice)));
                                w.indented(|w| {
                                    for (name, value) in &instance.values {
                                        w.line(format!("{name}: {}", yaml_scalar(value)));
                                    }
                                });
                            }
                        });
                    });
                });
            }
            if !job.outputs.is_empty() {
                w.section("outputs:", |w| {
                    for output in &job.outputs {
                        w.line(format!(
                            "{output}: {}",
                            yaml_scalar(&format!("${{{{ steps.{RUN_STEP_ID}.outputs.{output} }}}}"))
                        ));
                    }
                });
            }
            w.section("steps:", |w| {
                w.line(format!("- uses: {CHECKOUT_ACTION}"));
                write_vault_steps(w, job);
                for step in &job.steps {
                    write_step(w, model, step);
                }
            });
        });
    }
}

fn list(w: &mut LineWriter, key: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    w.section(format!("{key}:"), |w| {
        for value in values {
            w.line(format!("- {}", yaml_scalar(value)));
        }
    });
}

fn vault_step_id(vault: &str) -> String {
    let id: String = vault
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("vault_{id}")
}

fn write_vault_steps(w: &mut LineWriter, job: &WorkflowJobModel) {
    let mut logged_in: Vec<&str> = Vec::new();
    for fetch in job.vault_fetches() {
        if let Some(connection) = fetch.connection
            && !logged_in.contains(&connection)
        {
            logged_in.push(connection);
            w.line(format!("- uses: {AZURE_LOGIN_ACTION}"));
            w.indented(|w| {
                w.section("with:", |w| {
                    w.line(format!(
                        "creds: {}",
                        yaml_scalar(&format!("${{{{ secrets.{connection} }}}}"))
                    ));
                });
            });
        }
        w.line(format!("- id: {}", vault_step_id(fetch.vault)));
        w.indented(|w| {
            w.line(format!("uses: {KEYVAULT_ACTION}"));
            w.section("with:", |w| {
                w.line(format!("keyvault: {}", yaml_scalar(fetch.vault)));
                w.line(format!("secrets: {}", yaml_scalar(&fetch.secrets.join(", "))));
            });
        });
    }
}

fn write_step(w: &mut LineWriter, model: &WorkflowModel, step: &WorkflowStepModel) {
    match step {
        WorkflowStepModel::DownloadArtifact(artifact) => write_download(w, artifact),
        WorkflowStepModel::RetrieveArtifacts { names, slice } => {
            w.line(format!("- name: {}", yaml_scalar("Retrieve artifacts")));
            w.indented(|w| {
                let command = artifacts_command(
                    &model.entrypoint,
                    "retrieve",
                    names,
                    slice,
                    BUILD_ID,
                    CURRENT_SLICE,
                );
                w.line(format!("run: {}", yaml_scalar(&command)));
            });
        }
        WorkflowStepModel::Run(run) => {
            w.line(format!("- name: {}", yaml_scalar(&format!("Run {}", run.target))));
            w.indented(|w| {
                w.line(format!("id: {}", run.id));
                let command = command_line(&model.entrypoint, run, |value| {
                    render_arg(model, value)
                });
                w.line(format!("run: {}", yaml_scalar(&command)));
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
            let name = artifact
                .stored_name(CURRENT_SLICE)
                .unwrap_or_else(|| artifact.name.clone());
            w.line(format!("- name: {}", yaml_scalar(&format!("Upload {}", artifact.name))));
            w.indented(|w| {
                w.line(format!("uses: {UPLOAD_ACTION}"));
                w.section("with:", |w| {
                    w.line(format!("name: {}", yaml_scalar(&name)));
                    if let [path] = paths.as_slice() {
                        w.line(format!("path: {}", yaml_scalar(path)));
                    } else {
                        w.section("path: |", |w| {
                            for path in paths {
                                w.line(path);
                            }
                        });
                    }
                });
            });
        }
        WorkflowStepModel::StoreArtifacts { names, slice } => {
            w.line(format!("- name: {}", yaml_scalar("Store artifacts")));
            w.indented(|w| {
                let command = artifacts_command(
                    &model.entrypoint,
                    "store",
                    names,
                    slice,
                    BUILD_ID,
                    CURRENT_SLICE,
                );
                w.line(format!("run: {}", yaml_scalar(&command)));
            });
        }
    }
}

fn write_download(w: &mut LineWriter, artifact: &NativeArtifact) {
    w.line(format!("- name: {}", yaml_scalar(&format!("Download {}", artifact.name))));
    w.indented(|w| {
        w.line(format!("uses: {DOWNLOAD_ACTION}"));
        w.section("with:", |w| {
            if let Some(name) = artifact.stored_name(CURRENT_SLICE) {
                w.line(format!("name: {}", yaml_scalar(&name)));
            } else {
                w.line(format!("pattern: {}", yaml_scalar(&format!("{}-*", artifact.name))));
                w.line("merge-multiple: true");
            }
            w.line(format!("path: {}", yaml_scalar(&format!("artifacts/{}", artifact.name))));
        });
    });
}

/// Expression for a value, as used in `env:` entries.
fn expression(model: &WorkflowModel, value: &ArgValue) -> String {
    match value {
        ArgValue::Literal(text) => text.clone(),
        ArgValue::Matrix(dimension) => format!("${{{{ matrix.{dimension} }}}}"),
        ArgValue::Secret(secret) => match &secret.vault {
            Some(vault) => format!(
                "${{{{ steps.{}.outputs.{} }}}}",
                vault_step_id(vault),
                secret.name
            ),
            None => format!("${{{{ secrets.{} }}}}", secret.name),
        },
        ArgValue::Variable { job, name } => format!("${{{{ needs.{job}.outputs.{name} }}}}"),
        ArgValue::Input(key) => {
            let name = model
                .inputs
                .iter()
                .find(|input| &input.input.name == key)
                .map_or(key.as_str(), |input| input.external_name.as_str());
            format!("${{{{ inputs.{name} }}}}")
        }
    }
}

/// Command-line form of a value.
fn render_arg(model: &WorkflowModel, value: &ArgValue) -> String {
    match value {
        ArgValue::Literal(text) => shell_quote(text),
        other => format!("\"{}\"", expression(model, other)),
    }
}

impl Emitter for GitHubActionsEmitter {
    fn emit(&self, model: &WorkflowModel) -> EmitterResult<String> {
        let mut w = LineWriter::new();
        w.comment("Generated by keel - do not edit");
        w.line(format!("name: {}", yaml_scalar(&model.name)));
        w.blank();
        Self::write_triggers(&mut w, model);
        if !model.variable_groups.is_empty() {
            tracing::debug!(
                workflow = %model.name,
                "Variable groups have no GitHub Actions equivalent and are ignored"
            );
        }
        w.blank();
        w.section("jobs:", |w| {
            for job in &model.jobs {
                self.write_job(w, model, job);
            }
        });
        Ok(w.finish())
    }

    fn format_name(&self) -> &'static str {
        "github"
    }

    fn file_extension(&self) -> &'static str {
        "yml"
    }

    fn description(&self) -> &'static str {
        "GitHub Actions workflow"
    }
}
