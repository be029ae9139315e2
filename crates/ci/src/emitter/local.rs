//! Local bash script emitter.
//!
//! Renders a workflow as a self-contained script that runs every job in
//! dependency order on the current machine. Jobs share one workspace, so
//! native artifact steps become comments; custom artifact steps call
//! `keel artifacts`. Variables pass between jobs through the file named by
//! `KEEL_VARIABLES_FILE`, which the build appends `export` lines to.

use super::{Emitter, EmitterResult, LineWriter, artifacts_command, command_line, shell_quote};
use crate::model::{
    ArgValue, Binding, MatrixInstance, WorkflowJobModel, WorkflowModel, WorkflowStepModel,
};
use keel_core::params::{to_env_name, to_kebab_case};
use keel_core::variables::VARIABLES_FILE_ENV;

/// Header line marking generated files.
pub const GENERATED_HEADER: &str = "# Generated by keel - do not edit";

const BUILD_ID: &str = "$KEEL_BUILD_ID";
const CURRENT_SLICE: &str = "$slice";

/// Emitter for `scripts/<workflow>.sh`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalScriptEmitter;

impl Emitter for LocalScriptEmitter {
    fn emit(&self, model: &WorkflowModel) -> EmitterResult<String> {
        let mut w = LineWriter::new();
        w.line("#!/usr/bin/env bash");
        w.line(GENERATED_HEADER);
        w.comment(format!("Workflow: {}", model.name));
        w.line("set -euo pipefail");
        w.blank();
        w.line(r#"export KEEL_BUILD_ID="${KEEL_BUILD_ID:-local}""#);
        w.line(format!(
            r#"export {VARIABLES_FILE_ENV}="${{{VARIABLES_FILE_ENV}:-$(mktemp)}}""#
        ));
        w.line(format!(r#"touch "${VARIABLES_FILE_ENV}""#));

        if !model.inputs.is_empty() {
            w.blank();
            for input in &model.inputs {
                let name = to_env_name(&input.external_name);
                let default = input.input.default.as_deref().unwrap_or_default();
                if let Some(description) = &input.input.description {
                    w.comment(description);
                }
                w.line(format!(
                    "{name}=\"${{{name}:-{}}}\"",
                    escape_double_quoted(default)
                ));
            }
        }

        for job in &model.jobs {
            w.blank();
            write_job(&mut w, model, job);
        }

        w.blank();
        w.section("main() {", |w| {
            for job in &model.jobs {
                let function = function_name(job);
                if job.is_matrix() {
                    for instance in &job.matrix {
                        call(w, job, &format!("{function} {}", instance_args(instance)));
                    }
                } else {
                    call(w, job, &function);
                }
            }
        });
        w.line("}");
        w.blank();
        w.line(r#"main "$@""#);
        Ok(w.finish())
    }

    fn format_name(&self) -> &'static str {
        "local"
    }

    fn file_extension(&self) -> &'static str {
        "sh"
    }

    fn description(&self) -> &'static str {
        "Bash script running the workflow on this machine"
    }
}

fn function_name(job: &WorkflowJobModel) -> String {
    format!("job_{}", job.id)
}

fn call(w: &mut LineWriter, job: &WorkflowJobModel, invocation: &str) {
    if job.continue_on_error {
        w.line(format!(
            "{invocation} || echo \"job {} failed, continuing\" >&2",
            job.id
        ));
    } else {
        w.line(invocation);
    }
}

fn instance_args(instance: &MatrixInstance) -> String {
    std::iter::once(shell_quote(&instance.slice))
        .chain(instance.values.values().map(|v| shell_quote(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn matrix_local(dimension: &str) -> String {
    format!("MATRIX_{}", to_env_name(&to_kebab_case(dimension)))
}

fn write_job(w: &mut LineWriter, model: &WorkflowModel, job: &WorkflowJobModel) {
    match &job.description {
        Some(description) => w.comment(format!("{}: {description}", job.target)),
        None => w.comment(&job.target),
    }
    if let Some(minutes) = job.timeout_minutes {
        w.comment(format!("timeout: {minutes} minutes (not enforced locally)"));
    }
    w.section(format!("{}() {{", function_name(job)), |w| {
        if job.is_matrix() {
            w.line(r#"local slice="$1""#);
            for (i, dimension) in job.dimensions.iter().enumerate() {
                w.line(format!(r#"local {}="${}""#, matrix_local(&dimension.name), i + 2));
            }
        }
        if job.variable_bindings().next().is_some() {
            w.line("# shellcheck disable=SC1090");
            w.line(format!(r#"source "${VARIABLES_FILE_ENV}""#));
        }
        for step in &job.steps {
            write_step(w, model, job, step);
        }
    });
    w.line("}");
}

fn write_step(
    w: &mut LineWriter,
    model: &WorkflowModel,
    job: &WorkflowJobModel,
    step: &WorkflowStepModel,
) {
    match step {
        WorkflowStepModel::DownloadArtifact(artifact) => w.comment(format!(
            "artifact '{}' from {} is already in the workspace",
            artifact.name, artifact.producer_job
        )),
        WorkflowStepModel::PublishArtifact { artifact, .. } => {
            w.comment(format!("artifact '{}' stays in the workspace", artifact.name));
        }
        WorkflowStepModel::RetrieveArtifacts { names, slice } => w.line(artifacts_command(
            &model.entrypoint,
            "retrieve",
            names,
            slice,
            BUILD_ID,
            CURRENT_SLICE,
        )),
        WorkflowStepModel::StoreArtifacts { names, slice } => w.line(artifacts_command(
            &model.entrypoint,
            "store",
            names,
            slice,
            BUILD_ID,
            CURRENT_SLICE,
        )),
        WorkflowStepModel::Run(run) => {
            let mut line: String = run
                .env
                .iter()
                .map(|binding| format!("{} ", env_assignment(binding)))
                .collect();
            line.push_str(&command_line(&model.entrypoint, run, |value| {
                render(model, job, value)
            }));
            w.line(line);
        }
    }
}

fn env_assignment(binding: &Binding) -> String {
    let source = match &binding.value {
        ArgValue::Secret(secret) => to_env_name(&secret.name),
        ArgValue::Variable { name, .. } => to_env_name(&to_kebab_case(name)),
        ArgValue::Literal(text) => {
            return format!("{}={}", binding.name, shell_quote(text));
        }
        ArgValue::Matrix(dimension) => matrix_local(dimension),
        ArgValue::Input(_) => binding.name.clone(),
    };
    format!("{}=\"${{{source}:?}}\"", binding.name)
}

fn render(model: &WorkflowModel, job: &WorkflowJobModel, value: &ArgValue) -> String {
    match value {
        ArgValue::Literal(text) => shell_quote(text),
        ArgValue::Matrix(dimension) if job.is_matrix() => {
            format!("\"${}\"", matrix_local(dimension))
        }
        ArgValue::Matrix(_) => "''".to_string(),
        ArgValue::Secret(secret) => format!("\"${{{}:?}}\"", to_env_name(&secret.name)),
        ArgValue::Variable { name, .. } => format!("\"${{{}}}\"", to_env_name(&to_kebab_case(name))),
        ArgValue::Input(key) => {
            let external = model
                .inputs
                .iter()
                .find(|input| &input.input.name == key)
                .map_or_else(|| to_kebab_case(key), |input| input.external_name.clone());
            format!("\"${{{}}}\"", to_env_name(&external))
        }
    }
}

fn escape_double_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
