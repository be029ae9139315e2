//! End-to-end resolve and execute of a restore/build/test/publish chain.

use keel_core::{
    BuildExecutor, Error, InMemoryVariables, LayeredParams, ParamCatalog, ParamDefinition,
    ParamResolution, Services, TargetDefinition, TargetRegistry, TargetStatus, resolve,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<&'static str>>>;

fn step(name: &'static str, log: &Log, fail: bool) -> TargetDefinition {
    let log = Arc::clone(log);
    TargetDefinition::new(name).executes(move |ctx| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(name);
            if fail {
                return Err(Error::task(ctx.target(), "exit code 1"));
            }
            Ok(())
        }
    })
}

fn pipeline(log: &Log, failing: Option<&str>) -> TargetRegistry {
    let fails = |name: &str| failing == Some(name);
    let mut registry = TargetRegistry::new();
    registry
        .add(step("Restore", log, fails("Restore")))
        .add(step("Build", log, fails("Build")).depends_on(["Restore"]))
        .add(step("Test", log, fails("Test")).depends_on(["Build"]))
        .add(
            step("Publish", log, fails("Publish"))
                .depends_on(["Test"])
                .produces_artifact("packages", ["artifacts/packages"]),
        );
    registry
}

fn executor(params: Arc<dyn ParamResolution>) -> BuildExecutor {
    let variables = Arc::new(InMemoryVariables::new(Arc::clone(&params)));
    BuildExecutor::new(params, variables, Arc::new(Services::new()))
}

fn empty_params() -> Arc<dyn ParamResolution> {
    Arc::new(LayeredParams::new(Arc::new(ParamCatalog::new())))
}

#[tokio::test]
async fn test_plan_orders_and_schedules_whole_chain() {
    let log = Log::default();
    let model = resolve(
        pipeline(&log, None).build_definitions(),
        &["Publish".to_string()],
        false,
    )
    .unwrap();

    assert_eq!(model.pending(), vec!["Restore", "Build", "Test", "Publish"]);
}

#[tokio::test]
async fn test_build_failure_skips_downstream() {
    let log = Log::default();
    let mut model = resolve(
        pipeline(&log, Some("Build")).build_definitions(),
        &["Publish".to_string()],
        false,
    )
    .unwrap();

    let summary = executor(empty_params()).execute(&mut model).await;

    assert_eq!(model.status_of("Restore"), Some(TargetStatus::Succeeded));
    assert_eq!(model.status_of("Build"), Some(TargetStatus::Failed));
    assert_eq!(model.status_of("Test"), Some(TargetStatus::Skipped));
    assert_eq!(model.status_of("Publish"), Some(TargetStatus::Skipped));
    assert_eq!(*log.lock().unwrap(), vec!["Restore", "Build"]);

    assert!(!summary.is_success());
    assert_eq!(summary.failed_targets(), vec!["Build"]);
    assert_eq!(summary.skipped(), vec!["Test", "Publish"]);
    assert!(summary.to_string().ends_with("Build failed: Build"));
}

#[tokio::test]
async fn test_successful_run_reports_every_target() {
    let log = Log::default();
    let mut model = resolve(
        pipeline(&log, None).build_definitions(),
        &["Publish".to_string()],
        false,
    )
    .unwrap();

    let summary = executor(empty_params()).execute(&mut model).await;

    assert!(summary.is_success());
    assert_eq!(summary.succeeded(), vec!["Restore", "Build", "Test", "Publish"]);
    for entry in &summary.entries {
        assert!(entry.duration.is_some(), "{} has no duration", entry.name);
    }
}

#[tokio::test]
async fn test_skip_dependencies_runs_only_requested() {
    let log = Log::default();
    let mut model = resolve(
        pipeline(&log, None).build_definitions(),
        &["Test".to_string()],
        true,
    )
    .unwrap();

    executor(empty_params()).execute(&mut model).await;

    assert_eq!(*log.lock().unwrap(), vec!["Test"]);
    assert_eq!(model.status_of("Build"), Some(TargetStatus::Skipped));
}

#[tokio::test]
async fn test_required_parameter_from_cli_arguments() {
    let log = Log::default();
    let mut registry = pipeline(&log, None);
    registry.add(
        step("Deploy", &log, false)
            .depends_on(["Publish"])
            .requires(["NuGetApiKey"]),
    );

    let catalog: ParamCatalog = [ParamDefinition::secret("NuGetApiKey")].into_iter().collect();
    let params: Arc<dyn ParamResolution> = Arc::new(
        LayeredParams::new(Arc::new(catalog)).with_cli_args(HashMap::from([(
            "nu-get-api-key".to_string(),
            "oy2abc".to_string(),
        )])),
    );
    let mut model = resolve(registry.build_definitions(), &["Deploy".to_string()], false).unwrap();
    let summary = executor(params).execute(&mut model).await;

    assert!(summary.is_success());
    assert_eq!(log.lock().unwrap().last(), Some(&"Deploy"));
}

#[test]
fn test_cycle_through_artifact_consumption_is_rejected() {
    let defs = vec![
        TargetDefinition::new("Pack").consumes_artifact("Sign", "signed"),
        TargetDefinition::new("Sign").depends_on(["Pack"]),
    ];
    let err = resolve(defs, &[], false).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("Circular dependency"));
}
