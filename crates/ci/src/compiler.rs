//! Workflow compiler.
//!
//! Compiles a [`WorkflowDefinition`] against a resolved [`BuildModel`] into
//! a backend-neutral [`WorkflowModel`]: one job per referenced target, in
//! the model's topological order, with matrix expansion and the artifact,
//! variable and secret wiring each job needs.
//!
//! Compilation is pure. Inconsistencies that only break part of the
//! pipeline are reported as warnings and the broken binding is left out.

use crate::definition::{
    ArtifactMode, BackendType, MatrixDimension, SecretSource, TargetReference, WorkflowDefinition,
};
use crate::matrix;
use crate::model::{
    ArgValue, Binding, InputModel, NativeArtifact, RUN_STEP_ID, RunStep, SecretRef,
    SliceSelector, WorkflowJobModel, WorkflowModel, WorkflowStepModel,
};
use keel_core::{
    ArtifactBinding, BuildModel, ParamCatalog, ProducedArtifact, TargetId, TargetModel,
};
use keel_events::emit_workflow_warning;
use std::collections::{HashMap, HashSet};

/// Compiles workflows against one build model and parameter catalog.
pub struct WorkflowCompiler<'a> {
    model: &'a BuildModel,
    catalog: &'a ParamCatalog,
}

/// Per-compilation state shared by the job builders.
struct Scope<'a> {
    definition: &'a WorkflowDefinition,
    references: HashMap<&'a str, &'a TargetReference>,
    job_ids: HashMap<TargetId, String>,
    shared_args: Vec<Binding>,
    warnings: Vec<String>,
}

impl Scope<'_> {
    fn warn(&mut self, message: String) {
        emit_workflow_warning!(self.definition.name, message);
        self.warnings.push(message);
    }

    fn is_matrix(&self, target: &str) -> bool {
        self.references
            .get(target)
            .is_some_and(|reference| !usable_dimensions(&reference.matrix).is_empty())
    }

    /// Slice identifiers of a matrix job, empty for a plain job.
    fn slices_of(&self, target: &str) -> Vec<String> {
        self.references
            .get(target)
            .map(|reference| {
                matrix::expand(&usable_dimensions(&reference.matrix))
                    .into_iter()
                    .map(|instance| instance.slice)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn publish_suppressed(&self, target: &str) -> bool {
        self.references
            .get(target)
            .is_some_and(|reference| reference.suppress_publish)
    }
}

fn usable_dimensions(dimensions: &[MatrixDimension]) -> Vec<MatrixDimension> {
    dimensions
        .iter()
        .filter(|d| !d.values.is_empty())
        .cloned()
        .collect()
}

impl<'a> WorkflowCompiler<'a> {
    /// Create a compiler.
    #[must_use]
    pub const fn new(model: &'a BuildModel, catalog: &'a ParamCatalog) -> Self {
        Self { model, catalog }
    }

    /// Compile `definition` for `backend`.
    #[must_use]
    pub fn compile(&self, definition: &WorkflowDefinition, backend: BackendType) -> WorkflowModel {
        let mut scope = Scope {
            definition,
            references: HashMap::new(),
            job_ids: HashMap::new(),
            shared_args: Vec::new(),
            warnings: Vec::new(),
        };

        self.collect_references(&mut scope);
        let targets: Vec<&TargetModel> = self
            .model
            .targets()
            .iter()
            .filter(|target| scope.references.contains_key(target.name.as_str()))
            .collect();
        assign_job_ids(&targets, &mut scope.job_ids);

        self.check_secret_injections(&mut scope);
        scope.shared_args = self.shared_args(&mut scope);
        let inputs = definition
            .manual_inputs()
            .map(|input| InputModel {
                input: input.clone(),
                external_name: self.catalog.external_arg_name(&input.name),
            })
            .collect();

        let jobs = targets
            .iter()
            .map(|target| self.compile_job(target, &mut scope))
            .collect();

        tracing::debug!(
            workflow = %definition.name,
            backend = %backend,
            warnings = scope.warnings.len(),
            "Compiled workflow"
        );

        WorkflowModel {
            name: definition.name.clone(),
            backend,
            triggers: definition.triggers.clone(),
            inputs,
            pool: definition.options.pool.clone(),
            variable_groups: definition.options.variable_groups.clone(),
            artifacts: definition.options.artifacts,
            entrypoint: definition.entrypoint().to_string(),
            jobs,
            warnings: scope.warnings,
        }
    }

    fn collect_references(&self, scope: &mut Scope<'_>) {
        let definition = scope.definition;
        for reference in &definition.targets {
            if self.model.find(&reference.name).is_none() {
                scope.warn(format!(
                    "workflow references undefined target '{}'",
                    reference.name
                ));
                continue;
            }
            if scope
                .references
                .insert(reference.name.as_str(), reference)
                .is_some()
            {
                scope.warn(format!(
                    "target '{}' is listed more than once; using the last entry",
                    reference.name
                ));
            }
        }
    }

    fn check_secret_injections(&self, scope: &mut Scope<'_>) {
        let definition = scope.definition;
        for injection in &definition.options.secrets {
            if !self.catalog.contains(&injection.param) {
                scope.warn(format!(
                    "secret injection references undefined parameter '{}'",
                    injection.param
                ));
            } else if !self.catalog.is_secret(&injection.param) {
                scope.warn(format!(
                    "secret injection for '{}' targets a parameter not marked secret",
                    injection.param
                ));
            }
        }
    }

    /// Literal parameters and manual inputs passed to every run step.
    fn shared_args(&self, scope: &mut Scope<'_>) -> Vec<Binding> {
        let definition = scope.definition;
        let mut args = Vec::new();
        for (key, value) in &definition.options.params {
            if self.catalog.contains(key) {
                args.push(Binding::new(
                    self.catalog.external_arg_name(key),
                    ArgValue::Literal(value.clone()),
                ));
            } else {
                scope.warn(format!(
                    "injected parameter '{key}' is not declared in the parameter catalog"
                ));
            }
        }
        for input in definition.manual_inputs() {
            let key = &input.name;
            if self.catalog.contains(key) {
                args.push(Binding::new(
                    self.catalog.external_arg_name(key),
                    ArgValue::Input(key.clone()),
                ));
            } else {
                scope.warn(format!(
                    "manual input '{key}' is not declared in the parameter catalog"
                ));
            }
        }
        args
    }

    fn compile_job(&self, target: &TargetModel, scope: &mut Scope<'_>) -> WorkflowJobModel {
        let reference = scope.references[target.name.as_str()];
        let id = scope.job_ids[&target.id].clone();

        let mut depends_on = Vec::new();
        for dep in &target.dependencies {
            match scope.job_ids.get(dep) {
                Some(job) => depends_on.push(job.clone()),
                None => tracing::debug!(
                    job = %id,
                    dependency = %self.model.target(*dep).name,
                    "Dependency outside workflow dropped"
                ),
            }
        }

        for dimension in reference.matrix.iter().filter(|d| d.values.is_empty()) {
            scope.warn(format!(
                "matrix dimension '{}' of '{}' has no values and is ignored",
                dimension.name, target.name
            ));
        }
        let dimensions = usable_dimensions(&reference.matrix);
        let matrix = matrix::expand(&dimensions);
        let sliced = !matrix.is_empty();

        let mut steps = self.consume_artifacts(target, scope);

        let mut args = scope.shared_args.clone();
        args.extend(dimensions.iter().map(|dimension| {
            Binding::new(
                self.catalog.external_arg_name(&dimension.name),
                ArgValue::Matrix(dimension.name.clone()),
            )
        }));
        let mut env = self.variable_bindings(target, scope);
        env.extend(self.secret_bindings(target, scope));
        steps.push(WorkflowStepModel::Run(RunStep {
            id: RUN_STEP_ID.to_string(),
            target: target.name.clone(),
            args,
            env,
        }));

        if !reference.suppress_publish {
            steps.extend(publish_steps(target, &id, sliced, scope.definition.options.artifacts));
        }

        WorkflowJobModel {
            id,
            target: target.name.clone(),
            description: target.description.clone(),
            depends_on,
            dimensions,
            matrix,
            runner: reference.options.runner.clone(),
            timeout_minutes: reference
                .options
                .timeout_minutes
                .or(scope.definition.options.timeout_minutes),
            continue_on_error: reference.options.continue_on_error,
            outputs: target.produces_variables.clone(),
            steps,
        }
    }

    fn consume_artifacts(
        &self,
        target: &TargetModel,
        scope: &mut Scope<'_>,
    ) -> Vec<WorkflowStepModel> {
        let mut native = Vec::new();
        let mut retrieve: Vec<(SliceSelector, Vec<String>)> = Vec::new();

        for binding in &target.consumes_artifacts {
            let Some(producer) = self.model.find(&binding.producer) else {
                continue;
            };
            let Some(producer_job) = scope.job_ids.get(&producer.id).cloned() else {
                scope.warn(format!(
                    "'{}' consumes artifact '{}' from '{}', which is not part of this workflow",
                    target.name, binding.artifact, producer.name
                ));
                continue;
            };
            let produced: Vec<&ProducedArtifact> = producer
                .produces_artifacts
                .iter()
                .filter(|artifact| artifact.name == binding.artifact)
                .collect();
            if produced.is_empty() {
                scope.warn(format!(
                    "'{}' consumes artifact '{}' from '{}', which does not produce it",
                    target.name, binding.artifact, producer.name
                ));
                continue;
            }
            if scope.publish_suppressed(&producer.name) {
                scope.warn(format!(
                    "'{}' consumes artifact '{}' from '{}', which has artifact publishing suppressed",
                    target.name, binding.artifact, producer.name
                ));
                continue;
            }
            let Some(slice) = consumed_slice(binding, &produced, &scope.slices_of(&producer.name))
            else {
                scope.warn(format!(
                    "'{}' consumes slice '{}' of artifact '{}', which '{}' does not publish",
                    target.name,
                    binding.slice.as_deref().unwrap_or_default(),
                    binding.artifact,
                    producer.name
                ));
                continue;
            };

            match scope.definition.options.artifacts {
                ArtifactMode::Custom => group_by_slice(&mut retrieve, slice, &binding.artifact),
                ArtifactMode::Native => {
                    native.push(WorkflowStepModel::DownloadArtifact(NativeArtifact {
                        name: binding.artifact.clone(),
                        producer_job,
                        slice,
                    }));
                }
            }
        }

        native.extend(
            retrieve
                .into_iter()
                .map(|(slice, names)| WorkflowStepModel::RetrieveArtifacts { names, slice }),
        );
        native
    }

    fn variable_bindings(&self, target: &TargetModel, scope: &mut Scope<'_>) -> Vec<Binding> {
        let mut env = Vec::new();
        for binding in &target.consumes_variables {
            let Some(producer) = self.model.find(&binding.producer) else {
                continue;
            };
            let Some(job) = scope.job_ids.get(&producer.id).cloned() else {
                scope.warn(format!(
                    "'{}' reads variable '{}' from '{}', which is not part of this workflow",
                    target.name, binding.name, producer.name
                ));
                continue;
            };
            if !producer.produces_variables.contains(&binding.name) {
                scope.warn(format!(
                    "'{}' reads variable '{}' from '{}', which does not produce it",
                    target.name, binding.name, producer.name
                ));
                continue;
            }
            if scope.is_matrix(&producer.name) {
                scope.warn(format!(
                    "'{}' reads variable '{}' from matrix job '{job}'; the last instance to finish wins",
                    target.name, binding.name
                ));
            }
            env.push(Binding::new(
                self.catalog.env_name(&binding.name),
                ArgValue::Variable {
                    job,
                    name: binding.name.clone(),
                },
            ));
        }
        env
    }

    fn secret_bindings(&self, target: &TargetModel, scope: &mut Scope<'_>) -> Vec<Binding> {
        let definition = scope.definition;
        let mut env = Vec::new();
        for key in target.requires.iter().filter(|key| self.catalog.is_secret(key)) {
            let Some(injection) = definition
                .options
                .secrets
                .iter()
                .find(|injection| &injection.param == key)
            else {
                tracing::debug!(target_name = %target.name, param = %key, "No secret injection");
                continue;
            };
            let Some(name) = injection.secret_name() else {
                scope.warn(format!(
                    "secret injection for '{key}' has no secret name; '{}' will not receive it",
                    target.name
                ));
                continue;
            };
            let vault = match injection.source {
                SecretSource::Plain => None,
                SecretSource::Vault => {
                    let Some(vault) = injection.vault.clone().filter(|v| !v.is_empty()) else {
                        scope.warn(format!(
                            "vault secret injection for '{key}' does not name a vault"
                        ));
                        continue;
                    };
                    Some(vault)
                }
            };
            env.push(Binding::new(
                self.catalog.env_name(key),
                ArgValue::Secret(SecretRef {
                    name: name.to_string(),
                    connection: vault.as_ref().and(injection.connection.clone()),
                    vault,
                }),
            ));
        }
        env
    }
}

fn publish_steps(
    target: &TargetModel,
    job_id: &str,
    sliced: bool,
    mode: ArtifactMode,
) -> Vec<WorkflowStepModel> {
    match mode {
        ArtifactMode::Custom => {
            let mut store: Vec<(SliceSelector, Vec<String>)> = Vec::new();
            for artifact in &target.produces_artifacts {
                group_by_slice(&mut store, produced_slice(artifact, sliced), &artifact.name);
            }
            store
                .into_iter()
                .map(|(slice, names)| WorkflowStepModel::StoreArtifacts { names, slice })
                .collect()
        }
        ArtifactMode::Native => target
            .produces_artifacts
            .iter()
            .map(|artifact| WorkflowStepModel::PublishArtifact {
                artifact: NativeArtifact {
                    name: artifact.name.clone(),
                    producer_job: job_id.to_string(),
                    slice: produced_slice(artifact, sliced),
                },
                paths: artifact.publish_paths(),
            })
            .collect(),
    }
}

/// Slice an artifact is published under. A matrix job publishes one slice
/// per instance.
fn produced_slice(artifact: &ProducedArtifact, sliced: bool) -> SliceSelector {
    match (&artifact.slice, sliced) {
        (_, true) => SliceSelector::Current,
        (Some(slice), false) => SliceSelector::Exact(slice.clone()),
        (None, false) => SliceSelector::Unsliced,
    }
}

/// Slice a consumer reads, given every declaration of the artifact and the
/// slices of a matrix producer (empty for a plain job). `None` when the
/// requested slice is never published.
fn consumed_slice(
    binding: &ArtifactBinding,
    produced: &[&ProducedArtifact],
    producer_slices: &[String],
) -> Option<SliceSelector> {
    match (&binding.slice, producer_slices.is_empty()) {
        (Some(slice), false) => producer_slices
            .contains(slice)
            .then(|| SliceSelector::Exact(slice.clone())),
        (Some(slice), true) => produced
            .iter()
            .any(|artifact| artifact.slice.as_ref() == Some(slice))
            .then(|| SliceSelector::Exact(slice.clone())),
        (None, false) => Some(SliceSelector::All),
        (None, true) => {
            let mut published: Vec<SliceSelector> = Vec::new();
            for artifact in produced {
                let slice = produced_slice(artifact, false);
                if !published.contains(&slice) {
                    published.push(slice);
                }
            }
            match published.len() {
                1 => published.pop(),
                _ => Some(SliceSelector::All),
            }
        }
    }
}

/// Add `name` to the group of `slice`, keeping groups in first-use order.
fn group_by_slice(
    groups: &mut Vec<(SliceSelector, Vec<String>)>,
    slice: SliceSelector,
    name: &str,
) {
    match groups.iter_mut().find(|(selector, _)| *selector == slice) {
        Some((_, names)) => {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        None => groups.push((slice, vec![name.to_string()])),
    }
}

/// Job ids are target names restricted to `[A-Za-z0-9_]`, never starting
/// with a digit, made unique with a numeric suffix.
fn assign_job_ids(targets: &[&TargetModel], ids: &mut HashMap<TargetId, String>) {
    let mut used = HashSet::new();
    for target in targets {
        let mut base: String = target
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        if base.is_empty() || base.starts_with(|c: char| c.is_ascii_digit()) {
            base.insert(0, '_');
        }
        let mut id = base.clone();
        let mut n = 2;
        while !used.insert(id.clone()) {
            id = format!("{base}_{n}");
            n += 1;
        }
        ids.insert(target.id, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{MatrixDimension, SecretInjection, WorkflowOptions};
    use keel_core::{ParamDefinition, TargetDefinition, resolve};

    fn model(defs: Vec<TargetDefinition>) -> BuildModel {
        resolve(defs, &[], false).unwrap()
    }

    fn catalog() -> ParamCatalog {
        [
            ParamDefinition::new("Configuration"),
            ParamDefinition::new("Framework"),
            ParamDefinition::secret("NuGetApiKey"),
            ParamDefinition::new("SemVer"),
        ]
        .into_iter()
        .collect()
    }

    fn run_step(job: &WorkflowJobModel) -> &RunStep {
        job.run_step().unwrap()
    }

    #[test]
    fn test_jobs_follow_topological_order_within_scope() {
        let model = model(vec![
            TargetDefinition::new("Publish").depends_on(["Test"]),
            TargetDefinition::new("Test").depends_on(["Compile"]),
            TargetDefinition::new("Compile").depends_on(["Restore"]),
            TargetDefinition::new("Restore"),
        ]);
        let catalog = catalog();
        let workflow = WorkflowDefinition::new("ci").target("Publish").target("Compile");

        let compiled = WorkflowCompiler::new(&model, &catalog).compile(&workflow, BackendType::GitHub);

        let ids: Vec<&str> = compiled.jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["Compile", "Publish"]);
        assert!(compiled.jobs[0].depends_on.is_empty());
        // Test is not in the workflow, so Publish keeps no job dependency.
        assert!(compiled.jobs[1].depends_on.is_empty());
        assert!(compiled.warnings.is_empty());
    }

    #[test]
    fn test_matrix_expansion_binds_dimension_args() {
        let model = model(vec![TargetDefinition::new("Test")]);
        let catalog = catalog();
        let workflow = WorkflowDefinition::new("ci").target_ref(
            TargetReference::new("Test")
                .matrix(MatrixDimension::new("Framework", ["net8.0", "net9.0"]))
                .matrix(MatrixDimension::new("Configuration", ["Debug", "Release"])),
        );

        let compiled = WorkflowCompiler::new(&model, &catalog).compile(&workflow, BackendType::Azure);
        let job = &compiled.jobs[0];

        let slices: Vec<&str> = job.matrix.iter().map(|m| m.slice.as_str()).collect();
        assert_eq!(
            slices,
            vec!["001_net8-0_Debug", "002_net8-0_Release", "003_net9-0_Debug", "004_net9-0_Release"]
        );
        let args = &run_step(job).args;
        assert_eq!(args[0], Binding::new("framework", ArgValue::Matrix("Framework".into())));
        assert_eq!(
            args[1],
            Binding::new("configuration", ArgValue::Matrix("Configuration".into()))
        );
    }

    #[test]
    fn test_native_artifacts_download_and_publish() {
        let model = model(vec![
            TargetDefinition::new("Pack").produces_artifact("packages", ["out/*.nupkg"]),
            TargetDefinition::new("Push").consumes_artifact("Pack", "packages"),
        ]);
        let catalog = catalog();
        let workflow = WorkflowDefinition::new("release").target("Pack").target("Push");

        let compiled = WorkflowCompiler::new(&model, &catalog).compile(&workflow, BackendType::GitHub);
        let pack = compiled.job("Pack").unwrap();
        let push = compiled.job("Push").unwrap();

        assert_eq!(push.depends_on, vec!["Pack"]);
        assert_eq!(
            push.steps[0],
            WorkflowStepModel::DownloadArtifact(NativeArtifact {
                name: "packages".into(),
                producer_job: "Pack".into(),
                slice: SliceSelector::Unsliced,
            })
        );
        assert!(matches!(
            pack.steps.last(),
            Some(WorkflowStepModel::PublishArtifact { paths, .. }) if paths == &["out/*.nupkg"]
        ));
    }

    #[test]
    fn test_custom_provider_uses_single_retrieve_step() {
        let model = model(vec![
            TargetDefinition::new("Compile")
                .produces_artifact("bin", Vec::<String>::new())
                .produces_artifact("docs", Vec::<String>::new()),
            TargetDefinition::new("Package")
                .consumes_artifact("Compile", "bin")
                .consumes_artifact("Compile", "docs"),
        ]);
        let catalog = catalog();
        let workflow = WorkflowDefinition::new("ci")
            .target("Compile")
            .target("Package")
            .options(WorkflowOptions {
                artifacts: ArtifactMode::Custom,
                ..WorkflowOptions::default()
            });

        let compiled = WorkflowCompiler::new(&model, &catalog).compile(&workflow, BackendType::Local);
        let package = compiled.job("Package").unwrap();
        assert_eq!(
            package.steps[0],
            WorkflowStepModel::RetrieveArtifacts {
                names: vec!["bin".into(), "docs".into()],
                slice: SliceSelector::Unsliced,
            }
        );
        assert_eq!(
            compiled.job("Compile").unwrap().steps.last(),
            Some(&WorkflowStepModel::StoreArtifacts {
                names: vec!["bin".into(), "docs".into()],
                slice: SliceSelector::Unsliced,
            })
        );
    }

    fn custom(workflow: WorkflowDefinition) -> WorkflowDefinition {
        workflow.options(WorkflowOptions {
            artifacts: ArtifactMode::Custom,
            ..WorkflowOptions::default()
        })
    }

    #[test]
    fn test_custom_provider_slices_follow_the_producer() {
        let model = model(vec![
            TargetDefinition::new("Compile").produces_artifact("bin", ["bin"]),
            TargetDefinition::new("Test")
                .consumes_artifact("Compile", "bin")
                .produces_artifact("results", ["results"]),
            TargetDefinition::new("Pick").consumes_artifact_slice("Test", "results", "001_a"),
            TargetDefinition::new("Report")
                .consumes_artifact("Test", "results")
                .consumes_artifact("Compile", "bin"),
        ]);
        let catalog = catalog();
        let workflow = custom(
            WorkflowDefinition::new("ci")
                .target("Compile")
                .target_ref(
                    TargetReference::new("Test")
                        .matrix(MatrixDimension::new("Framework", ["a", "b"])),
                )
                .target("Pick")
                .target("Report"),
        );

        let compiled = WorkflowCompiler::new(&model, &catalog).compile(&workflow, BackendType::Local);
        assert!(compiled.warnings.is_empty());

        let compile = compiled.job("Compile").unwrap();
        assert_eq!(
            compile.steps.last(),
            Some(&WorkflowStepModel::StoreArtifacts {
                names: vec!["bin".into()],
                slice: SliceSelector::Unsliced,
            })
        );

        // A matrix consumer of a plain producer reads the unsliced copy.
        let test = compiled.job("Test").unwrap();
        assert_eq!(
            test.steps[0],
            WorkflowStepModel::RetrieveArtifacts {
                names: vec!["bin".into()],
                slice: SliceSelector::Unsliced,
            }
        );
        assert_eq!(
            test.steps.last(),
            Some(&WorkflowStepModel::StoreArtifacts {
                names: vec!["results".into()],
                slice: SliceSelector::Current,
            })
        );

        assert_eq!(
            compiled.job("Pick").unwrap().steps[0],
            WorkflowStepModel::RetrieveArtifacts {
                names: vec!["results".into()],
                slice: SliceSelector::Exact("001_a".into()),
            }
        );

        let report = compiled.job("Report").unwrap();
        assert_eq!(
            report.steps[..2],
            [
                WorkflowStepModel::RetrieveArtifacts {
                    names: vec!["results".into()],
                    slice: SliceSelector::All,
                },
                WorkflowStepModel::RetrieveArtifacts {
                    names: vec!["bin".into()],
                    slice: SliceSelector::Unsliced,
                },
            ]
        );
    }

    #[test]
    fn test_fixed_slice_artifacts_are_consumed_by_their_slice() {
        let model = model(vec![
            TargetDefinition::new("Pack").produces_artifact_slice("packages", "linux"),
            TargetDefinition::new("Push").consumes_artifact("Pack", "packages"),
            TargetDefinition::new("Sign").consumes_artifact_slice("Pack", "packages", "linux"),
        ]);
        let catalog = catalog();
        for mode in [ArtifactMode::Native, ArtifactMode::Custom] {
            let workflow = WorkflowDefinition::new("release")
                .target("Pack")
                .target("Push")
                .target("Sign")
                .options(WorkflowOptions {
                    artifacts: mode,
                    ..WorkflowOptions::default()
                });
            let compiled =
                WorkflowCompiler::new(&model, &catalog).compile(&workflow, BackendType::GitHub);
            assert!(compiled.warnings.is_empty());
            for consumer in ["Push", "Sign"] {
                let slice = match &compiled.job(consumer).unwrap().steps[0] {
                    WorkflowStepModel::DownloadArtifact(artifact) => artifact.slice.clone(),
                    WorkflowStepModel::RetrieveArtifacts { slice, .. } => slice.clone(),
                    other => panic!("unexpected first step {other:?}"),
                };
                assert_eq!(slice, SliceSelector::Exact("linux".into()));
            }
        }
    }

    #[test]
    fn test_unpublished_slice_warns_and_is_skipped() {
        let model = model(vec![
            TargetDefinition::new("Compile").produces_artifact("bin", ["bin"]),
            TargetDefinition::new("Test").produces_artifact("results", ["results"]),
            TargetDefinition::new("Pick")
                .consumes_artifact_slice("Test", "results", "003_c")
                .consumes_artifact_slice("Compile", "bin", "001_a"),
        ]);
        let catalog = catalog();
        let workflow = custom(
            WorkflowDefinition::new("ci")
                .target("Compile")
                .target_ref(
                    TargetReference::new("Test")
                        .matrix(MatrixDimension::new("Framework", ["a", "b"])),
                )
                .target("Pick"),
        );

        let compiled = WorkflowCompiler::new(&model, &catalog).compile(&workflow, BackendType::Local);
        assert_eq!(compiled.warnings.len(), 2);
        assert!(compiled.warnings[0].contains("slice '003_c'"));
        assert!(compiled.warnings[1].contains("slice '001_a'"));
        assert!(matches!(
            compiled.job("Pick").unwrap().steps[0],
            WorkflowStepModel::Run(_)
        ));
    }

    #[test]
    fn test_suppressed_publish_warns_consumer_only() {
        let model = model(vec![
            TargetDefinition::new("Compile").produces_artifact("bin", ["bin"]),
            TargetDefinition::new("Test").consumes_artifact("Compile", "bin"),
            TargetDefinition::new("Report").produces_artifact("report", ["report"]),
        ]);
        let catalog = catalog();
        let workflow = WorkflowDefinition::new("ci")
            .target_ref(TargetReference::new("Compile").suppress_publish())
            .target("Test")
            .target_ref(TargetReference::new("Report").suppress_publish());

        let compiled = WorkflowCompiler::new(&model, &catalog).compile(&workflow, BackendType::GitHub);

        assert_eq!(compiled.warnings.len(), 1);
        assert!(compiled.warnings[0].contains("publishing suppressed"));
        let test = compiled.job("Test").unwrap();
        assert!(matches!(test.steps[0], WorkflowStepModel::Run(_)));
        for job in &compiled.jobs {
            assert!(
                !job.steps
                    .iter()
                    .any(|s| matches!(s, WorkflowStepModel::PublishArtifact { .. }))
            );
        }
    }

    #[test]
    fn test_variables_bind_cross_job_outputs() {
        let model = model(vec![
            TargetDefinition::new("Version").produces_variable("SemVer"),
            TargetDefinition::new("Pack").consumes_variable("Version", "SemVer"),
        ]);
        let catalog = catalog();
        let workflow = WorkflowDefinition::new("ci").target("Version").target("Pack");

        let compiled = WorkflowCompiler::new(&model, &catalog).compile(&workflow, BackendType::Azure);

        assert_eq!(compiled.job("Version").unwrap().outputs, vec!["SemVer"]);
        let pack = compiled.job("Pack").unwrap();
        assert_eq!(
            run_step(pack).env,
            vec![Binding::new(
                "SEM_VER",
                ArgValue::Variable {
                    job: "Version".into(),
                    name: "SemVer".into(),
                }
            )]
        );
        assert_eq!(pack.variable_bindings().count(), 1);
    }

    #[test]
    fn test_secret_injection_binding_and_warnings() {
        let model = model(vec![
            TargetDefinition::new("Push").requires(["NuGetApiKey"]),
            TargetDefinition::new("Sign").requires(["NuGetApiKey"]),
        ]);
        let catalog = catalog();
        let with_secret = WorkflowDefinition::new("release")
            .target("Push")
            .options(WorkflowOptions {
                secrets: vec![
                    SecretInjection::plain("NuGetApiKey", "NUGET_API_KEY"),
                    SecretInjection::plain("GhostToken", "GHOST"),
                ],
                ..WorkflowOptions::default()
            });

        let compiled =
            WorkflowCompiler::new(&model, &catalog).compile(&with_secret, BackendType::GitHub);
        assert_eq!(
            run_step(&compiled.jobs[0]).env,
            vec![Binding::new(
                "NU_GET_API_KEY",
                ArgValue::Secret(SecretRef {
                    name: "NUGET_API_KEY".into(),
                    vault: None,
                    connection: None,
                })
            )]
        );
        assert_eq!(compiled.warnings.len(), 1);
        assert!(compiled.warnings[0].contains("GhostToken"));

        let without_name = WorkflowDefinition::new("release")
            .target("Sign")
            .options(WorkflowOptions {
                secrets: vec![SecretInjection::plain("NuGetApiKey", "  ")],
                ..WorkflowOptions::default()
            });
        let compiled =
            WorkflowCompiler::new(&model, &catalog).compile(&without_name, BackendType::GitHub);
        assert!(run_step(&compiled.jobs[0]).env.is_empty());
        assert!(compiled.warnings[0].contains("no secret name"));
    }

    #[test]
    fn test_vault_secret_carries_vault_and_connection() {
        let model = model(vec![TargetDefinition::new("Push").requires(["NuGetApiKey"])]);
        let catalog = catalog();
        let workflow = WorkflowDefinition::new("release")
            .target("Push")
            .options(WorkflowOptions {
                secrets: vec![SecretInjection::vault(
                    "NuGetApiKey",
                    "nuget-api-key",
                    "kv-release",
                    "release-sp",
                )],
                ..WorkflowOptions::default()
            });

        let compiled = WorkflowCompiler::new(&model, &catalog).compile(&workflow, BackendType::Azure);
        let job = &compiled.jobs[0];
        assert!(compiled.uses_vault());
        let secrets = job.vault_secrets();
        assert_eq!(secrets.len(), 1);
        assert_eq!(secrets[0].vault.as_deref(), Some("kv-release"));
        assert_eq!(secrets[0].connection.as_deref(), Some("release-sp"));
    }

    #[test]
    fn test_injected_params_and_undeclared_ones() {
        let model = model(vec![TargetDefinition::new("Compile")]);
        let catalog = catalog();
        let mut params = indexmap::IndexMap::new();
        params.insert("Configuration".to_string(), "Release".to_string());
        params.insert("Verbosity".to_string(), "minimal".to_string());
        let workflow = WorkflowDefinition::new("ci")
            .target("Compile")
            .options(WorkflowOptions {
                params,
                ..WorkflowOptions::default()
            });

        let compiled = WorkflowCompiler::new(&model, &catalog).compile(&workflow, BackendType::Local);
        assert_eq!(
            run_step(&compiled.jobs[0]).args,
            vec![Binding::new("configuration", ArgValue::Literal("Release".into()))]
        );
        assert_eq!(compiled.warnings.len(), 1);
        assert!(compiled.warnings[0].contains("Verbosity"));
    }

    #[test]
    fn test_unknown_target_reference_warns() {
        let model = model(vec![TargetDefinition::new("Compile")]);
        let catalog = catalog();
        let workflow = WorkflowDefinition::new("ci").target("Compile").target("Deploy");

        let compiled = WorkflowCompiler::new(&model, &catalog).compile(&workflow, BackendType::Local);
        assert_eq!(compiled.jobs.len(), 1);
        assert!(compiled.warnings[0].contains("Deploy"));
    }

    #[test]
    fn test_job_ids_are_sanitized_and_unique() {
        let model = model(vec![
            TargetDefinition::new("Build.Docs"),
            TargetDefinition::new("Build-Docs"),
            TargetDefinition::new("2fa"),
        ]);
        let catalog = catalog();
        let workflow = WorkflowDefinition::new("ci")
            .target("Build.Docs")
            .target("Build-Docs")
            .target("2fa");

        let compiled = WorkflowCompiler::new(&model, &catalog).compile(&workflow, BackendType::GitHub);
        let mut ids: Vec<&str> = compiled.jobs.iter().map(|j| j.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["Build_Docs", "Build_Docs_2", "_2fa"]);
    }

    #[test]
    fn test_compilation_is_repeatable() {
        let model = model(vec![
            TargetDefinition::new("Compile").produces_artifact("bin", ["bin"]),
            TargetDefinition::new("Test")
                .consumes_artifact("Compile", "bin")
                .requires(["NuGetApiKey"]),
        ]);
        let catalog = catalog();
        let workflow = WorkflowDefinition::new("ci")
            .target("Compile")
            .target_ref(
                TargetReference::new("Test").matrix(MatrixDimension::new("Framework", ["a", "b"])),
            );
        let compiler = WorkflowCompiler::new(&model, &catalog);
        assert_eq!(
            compiler.compile(&workflow, BackendType::GitHub),
            compiler.compile(&workflow, BackendType::GitHub)
        );
    }
}
