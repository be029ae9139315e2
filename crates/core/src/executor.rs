//! Build executor.
//!
//! Runs the `PendingRun` targets of a [`BuildModel`] sequentially, depth
//! first from each requested target, dependencies in declared order. A
//! target whose dependency failed is skipped; its own dependents then see a
//! skipped-by-failure dependency and skip in turn.

use crate::context::{Services, TaskContext};
use crate::model::{BuildModel, TargetId, TargetStatus};
use crate::params::ParamResolution;
use crate::summary::{BuildSummary, SummaryEntry};
use crate::variables::VariablePropagation;
use crate::{Error, Result};
use async_recursion::async_recursion;
use futures::FutureExt;
use keel_events::{
    emit_target_failed, emit_target_skipped, emit_target_started, emit_target_succeeded,
    target_span,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Sequential executor over a resolved build model.
pub struct BuildExecutor {
    params: Arc<dyn ParamResolution>,
    variables: Arc<dyn VariablePropagation>,
    services: Arc<Services>,
}

impl BuildExecutor {
    /// Create an executor with its collaborators.
    #[must_use]
    pub fn new(
        params: Arc<dyn ParamResolution>,
        variables: Arc<dyn VariablePropagation>,
        services: Arc<Services>,
    ) -> Self {
        Self {
            params,
            variables,
            services,
        }
    }

    /// Run every requested target and its pending dependencies.
    ///
    /// Target failures never abort the run; they are recorded on the model
    /// and reflected in the returned summary.
    pub async fn execute(&self, model: &mut BuildModel) -> BuildSummary {
        let mut handled = vec![false; model.targets.len()];
        let requested = model.requested.clone();
        for id in requested {
            self.visit(model, id, &mut handled).await;
        }

        BuildSummary {
            entries: model
                .iter()
                .filter(|(target, _)| handled[target.id.index()])
                .map(|(target, state)| SummaryEntry {
                    name: target.name.clone(),
                    status: state.status,
                    duration: state.duration,
                })
                .collect(),
        }
    }

    #[async_recursion]
    async fn visit(&self, model: &mut BuildModel, id: TargetId, handled: &mut Vec<bool>) {
        if model.state(id).status != TargetStatus::PendingRun {
            return;
        }
        handled[id.index()] = true;

        let dependencies = model.target(id).dependencies.clone();
        for &dep in &dependencies {
            self.visit(model, dep, handled).await;
        }

        let blocked_by = dependencies.iter().find(|&&dep| {
            let status = model.state(dep).status;
            status == TargetStatus::Failed
                || (status == TargetStatus::Skipped && handled[dep.index()])
        });
        if let Some(&dep) = blocked_by {
            let name = model.target(id).name.clone();
            emit_target_skipped!(name, model.target(dep).name);
            set_status(model, id, TargetStatus::Skipped);
            return;
        }

        let name = model.target(id).name.clone();
        let span = target_span!(name);
        self.run_target(model, id).instrument(span).await;
    }

    async fn run_target(&self, model: &mut BuildModel, id: TargetId) {
        let name = model.target(id).name.clone();

        if let Err(err) = self.check_inputs(model, id).await {
            emit_target_failed!(name, err);
            set_status(model, id, TargetStatus::Failed);
            return;
        }

        set_status(model, id, TargetStatus::Running);
        emit_target_started!(name);
        let started = Instant::now();

        let tasks = model.target(id).tasks.clone();
        let ctx = TaskContext::new(
            &name,
            Arc::clone(&self.params),
            Arc::clone(&self.variables),
            Arc::clone(&self.services),
        );

        let mut outcome = Ok(());
        for task in &tasks {
            let run = AssertUnwindSafe(task(ctx.clone())).catch_unwind().await;
            outcome = match run {
                Ok(result) => result,
                Err(panic) => Err(Error::task(&name, panic_message(panic.as_ref()))),
            };
            if outcome.is_err() {
                break;
            }
        }

        let elapsed = started.elapsed();
        model.record_duration(id, elapsed);
        match outcome {
            Ok(()) => {
                emit_target_succeeded!(name, u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
                set_status(model, id, TargetStatus::Succeeded);
            }
            Err(err) => {
                emit_target_failed!(name, err);
                set_status(model, id, TargetStatus::Failed);
            }
        }
    }

    /// Consumed variables must be readable and required parameters present
    /// before any task runs.
    async fn check_inputs(&self, model: &BuildModel, id: TargetId) -> Result<()> {
        let target = model.target(id);

        for binding in &target.consumes_variables {
            self.variables
                .read_variable(&binding.producer, &binding.name)
                .await?;
            if self.params.get_param(&binding.name).is_none() {
                return Err(Error::MissingVariable {
                    producer: binding.producer.clone(),
                    variable: binding.name.clone(),
                });
            }
        }

        for key in &target.requires {
            if self.params.get_param(key).is_none() {
                return Err(Error::MissingParameter {
                    target: target.name.clone(),
                    param: key.clone(),
                });
            }
        }

        Ok(())
    }
}

fn set_status(model: &mut BuildModel, id: TargetId, status: TargetStatus) {
    if let Err(err) = model.transition(id, status) {
        tracing::error!(error = %err, "Rejected target status change");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .map_or_else(|| "task panicked".to_string(), |msg| format!("task panicked: {msg}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{LayeredParams, ParamCatalog};
    use crate::resolve;
    use crate::target::TargetDefinition;
    use crate::variables::InMemoryVariables;
    use std::sync::Mutex;

    fn executor() -> BuildExecutor {
        let params: Arc<dyn ParamResolution> =
            Arc::new(LayeredParams::new(Arc::new(ParamCatalog::new())));
        let variables = Arc::new(InMemoryVariables::new(params.clone()));
        BuildExecutor::new(params, variables, Arc::new(Services::new()))
    }

    fn recording(name: &str, log: &Arc<Mutex<Vec<String>>>) -> TargetDefinition {
        let log = Arc::clone(log);
        let label = name.to_string();
        TargetDefinition::new(name).executes(move |_ctx| {
            let log = Arc::clone(&log);
            let label = label.clone();
            async move {
                log.lock().unwrap().push(label);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_diamond_runs_shared_dependency_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let defs = vec![
            recording("Root", &log),
            recording("Left", &log).depends_on(["Root"]),
            recording("Right", &log).depends_on(["Root"]),
            recording("Join", &log).depends_on(["Left", "Right"]),
        ];
        let mut model = resolve(defs, &["Join".to_string()], false).unwrap();
        let summary = executor().execute(&mut model).await;

        assert_eq!(*log.lock().unwrap(), vec!["Root", "Left", "Right", "Join"]);
        assert!(summary.is_success());
        assert_eq!(summary.entries.len(), 4);
    }

    #[tokio::test]
    async fn test_missing_parameter_fails_without_running() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let defs = vec![recording("Deploy", &log).requires(["KeelExecutorMissingToken"])];
        let mut model = resolve(defs, &["Deploy".to_string()], false).unwrap();
        executor().execute(&mut model).await;

        assert_eq!(model.status_of("Deploy"), Some(TargetStatus::Failed));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_variable_fails_consumer() {
        let defs = vec![
            TargetDefinition::new("Version").produces_variable("KeelExecutorSemVer"),
            TargetDefinition::new("Pack").consumes_variable("Version", "KeelExecutorSemVer"),
        ];
        let mut model = resolve(defs, &["Pack".to_string()], false).unwrap();
        executor().execute(&mut model).await;

        assert_eq!(model.status_of("Version"), Some(TargetStatus::Succeeded));
        assert_eq!(model.status_of("Pack"), Some(TargetStatus::Failed));
    }

    #[tokio::test]
    async fn test_variable_flows_from_producer_to_consumer() {
        let seen = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&seen);
        let defs = vec![
            TargetDefinition::new("Version")
                .produces_variable("KeelExecutorVersion")
                .executes(|ctx| async move {
                    ctx.write_variable("KeelExecutorVersion", "3.1.4").await
                }),
            TargetDefinition::new("Pack")
                .consumes_variable("Version", "KeelExecutorVersion")
                .executes(move |ctx| {
                    let captured = Arc::clone(&captured);
                    async move {
                        *captured.lock().unwrap() = ctx.param("KeelExecutorVersion");
                        Ok(())
                    }
                }),
        ];
        let mut model = resolve(defs, &["Pack".to_string()], false).unwrap();
        let summary = executor().execute(&mut model).await;

        assert!(summary.is_success());
        assert_eq!(seen.lock().unwrap().as_deref(), Some("3.1.4"));
    }

    #[tokio::test]
    async fn test_later_tasks_do_not_run_after_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tail = Arc::clone(&log);
        let defs = vec![
            TargetDefinition::new("Build")
                .executes(|ctx| async move { Err(Error::task(ctx.target(), "compile error")) })
                .executes(move |_ctx| {
                    let tail = Arc::clone(&tail);
                    async move {
                        tail.lock().unwrap().push("second");
                        Ok(())
                    }
                }),
        ];
        let mut model = resolve(defs, &["Build".to_string()], false).unwrap();
        let summary = executor().execute(&mut model).await;

        assert_eq!(summary.failed_targets(), vec!["Build"]);
        assert!(log.lock().unwrap().is_empty());
        assert!(model.state(model.id_of("Build").unwrap()).duration.is_some());
    }

    #[tokio::test]
    async fn test_panicking_task_fails_target() {
        let defs = vec![
            TargetDefinition::new("Explode").executes(|_ctx| async {
                let exploded = true;
                assert!(!exploded, "kaboom");
                Ok(())
            }),
            TargetDefinition::new("After").depends_on(["Explode"]),
        ];
        let mut model = resolve(defs, &["After".to_string()], false).unwrap();
        executor().execute(&mut model).await;

        assert_eq!(model.status_of("Explode"), Some(TargetStatus::Failed));
        assert_eq!(model.status_of("After"), Some(TargetStatus::Skipped));
    }

    #[test]
    fn test_release_profile_unwinds_panics() {
        let manifest: toml::Table =
            toml::from_str(include_str!("../../../Cargo.toml")).unwrap();
        let release = &manifest["profile"]["release"];
        assert_ne!(release.get("panic").and_then(toml::Value::as_str), Some("abort"));
    }

    #[tokio::test]
    async fn test_untouched_targets_are_not_summarized() {
        let defs = vec![
            TargetDefinition::new("A"),
            TargetDefinition::new("B").depends_on(["A"]),
        ];
        let mut model = resolve(defs, &["B".to_string()], true).unwrap();
        let summary = executor().execute(&mut model).await;

        assert_eq!(summary.succeeded(), vec!["B"]);
        assert_eq!(summary.entries.len(), 1);
        assert_eq!(model.status_of("A"), Some(TargetStatus::Skipped));
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "task panicked: boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "task panicked");
    }
}
