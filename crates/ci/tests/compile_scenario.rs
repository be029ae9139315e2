//! Compile a release workflow and render it as a local script.

use keel_ci::emitter::{Emitter, LocalScriptEmitter};
use keel_ci::{
    BackendType, MatrixDimension, SliceSelector, TargetReference, WorkflowCompiler,
    WorkflowDefinition, WorkflowStepModel,
};
use keel_core::{BuildModel, ParamCatalog, ParamDefinition, TargetDefinition, resolve};

fn build_model() -> BuildModel {
    resolve(
        vec![
            TargetDefinition::new("Restore"),
            TargetDefinition::new("Build").depends_on(["Restore"]),
            TargetDefinition::new("Test")
                .depends_on(["Build"])
                .produces_artifact("test-results", ["artifacts/test-results"]),
            TargetDefinition::new("Publish")
                .depends_on(["Test"])
                .produces_artifact("packages", ["artifacts/packages"])
                .requires(["NuGetApiKey"]),
            TargetDefinition::new("Announce").consumes_artifact("Publish", "packages"),
        ],
        &[],
        false,
    )
    .unwrap()
}

fn catalog() -> ParamCatalog {
    [
        ParamDefinition::new("Framework"),
        ParamDefinition::secret("NuGetApiKey"),
    ]
    .into_iter()
    .collect()
}

fn release() -> WorkflowDefinition {
    let toml = r#"
        name = "release"
        backends = ["local"]

        [[triggers]]
        type = "push"
        branches = ["main"]

        [[targets]]
        name = "Restore"

        [[targets]]
        name = "Build"

        [[targets]]
        name = "Test"

        [[targets.matrix]]
        name = "Framework"
        values = ["net8.0", "net9.0"]

        [[targets]]
        name = "Publish"
        suppress_publish = true

        [[targets]]
        name = "Announce"

        [[options.secrets]]
        param = "NuGetApiKey"
        secret = "NUGET_API_KEY"
    "#;
    toml::from_str(toml).unwrap()
}

#[test]
fn test_scenario_jobs_and_matrix() {
    let model = build_model();
    let catalog = catalog();
    let compiled = WorkflowCompiler::new(&model, &catalog).compile(&release(), BackendType::Local);

    let ids: Vec<&str> = compiled.jobs.iter().map(|job| job.id.as_str()).collect();
    assert_eq!(ids, vec!["Restore", "Build", "Test", "Publish", "Announce"]);

    let test = compiled.job("Test").unwrap();
    let slices: Vec<&str> = test.matrix.iter().map(|m| m.slice.as_str()).collect();
    assert_eq!(slices, vec!["001_net8-0", "002_net9-0"]);
    assert!(test.steps.iter().any(|step| matches!(
        step,
        WorkflowStepModel::PublishArtifact { artifact, .. } if artifact.slice == SliceSelector::Current
    )));
}

#[test]
fn test_suppressed_producer_warns_its_consumer() {
    let model = build_model();
    let catalog = catalog();
    let compiled = WorkflowCompiler::new(&model, &catalog).compile(&release(), BackendType::Local);

    assert_eq!(compiled.warnings.len(), 1);
    assert!(compiled.warnings[0].contains("Announce"));
    assert!(compiled.warnings[0].contains("packages"));
    let publish = compiled.job("Publish").unwrap();
    assert!(
        !publish
            .steps
            .iter()
            .any(|step| matches!(step, WorkflowStepModel::PublishArtifact { .. }))
    );
}

#[test]
fn test_rendered_script_is_byte_identical_across_compilations() {
    let model = build_model();
    let catalog = catalog();
    let workflow = release();
    let compiler = WorkflowCompiler::new(&model, &catalog);

    let first = LocalScriptEmitter
        .emit(&compiler.compile(&workflow, BackendType::Local))
        .unwrap();
    let second = LocalScriptEmitter
        .emit(&compiler.compile(&workflow, BackendType::Local))
        .unwrap();
    assert_eq!(first, second);
    assert!(first.contains("  job_Test 001_net8-0 net8.0\n  job_Test 002_net9-0 net9.0\n"));
    assert!(first.contains("NU_GET_API_KEY=\"${NUGET_API_KEY:?}\" keel run Publish"));
}

#[test]
fn test_subset_workflow_drops_outside_dependencies() {
    let model = build_model();
    let catalog = catalog();
    let workflow = WorkflowDefinition::new("nightly")
        .target("Restore")
        .target_ref(
            TargetReference::new("Test").matrix(MatrixDimension::new("Framework", ["net9.0"])),
        );

    let compiled = WorkflowCompiler::new(&model, &catalog).compile(&workflow, BackendType::GitHub);
    assert_eq!(compiled.jobs.len(), 2);
    assert!(compiled.job("Test").unwrap().depends_on.is_empty());
}
