//! Declarative target authoring.
//!
//! A [`TargetDefinition`] is plain data plus an ordered list of task
//! closures. Definitions are built with a fluent builder and are immutable
//! once handed to the resolver.

use crate::context::TaskContext;
use crate::Result;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Future returned by a task closure.
pub type TaskFuture = BoxFuture<'static, Result<()>>;

/// A single executable step of a target.
pub type TaskFn = Arc<dyn Fn(TaskContext) -> TaskFuture + Send + Sync>;

/// An artifact a target produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedArtifact {
    /// Artifact name
    pub name: String,
    /// Optional slice (matrix instance) the artifact belongs to
    pub slice: Option<String>,
    /// Workspace paths making up the artifact
    pub paths: Vec<String>,
}

impl ProducedArtifact {
    /// Paths to publish, defaulting to `artifacts/<name>`.
    #[must_use]
    pub fn publish_paths(&self) -> Vec<String> {
        if self.paths.is_empty() {
            vec![format!("artifacts/{}", self.name)]
        } else {
            self.paths.clone()
        }
    }
}

/// Dependency on an artifact produced by another target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactBinding {
    /// Producing target
    pub producer: String,
    /// Artifact name
    pub artifact: String,
    /// Optional slice
    pub slice: Option<String>,
}

/// Dependency on a variable produced by another target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableBinding {
    /// Producing target
    pub producer: String,
    /// Variable name
    pub name: String,
}

/// Authoring-time declaration of a target.
#[derive(Clone, Default)]
pub struct TargetDefinition {
    /// Unique target name
    pub name: String,
    /// Human readable description
    pub description: Option<String>,
    /// Hidden targets are omitted from listings
    pub hidden: bool,
    /// Task closures, run strictly in order
    pub tasks: Vec<TaskFn>,
    /// Explicit dependencies
    pub depends_on: Vec<String>,
    /// Required parameter keys
    pub requires: Vec<String>,
    /// Produced artifacts
    pub produces_artifacts: Vec<ProducedArtifact>,
    /// Consumed artifacts
    pub consumes_artifacts: Vec<ArtifactBinding>,
    /// Produced variable names
    pub produces_variables: Vec<String>,
    /// Consumed variables
    pub consumes_variables: Vec<VariableBinding>,
    /// Base definition this target extends
    pub base: Option<String>,
}

impl TargetDefinition {
    /// Start a definition with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Hide the target from listings.
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Add explicit dependencies.
    #[must_use]
    pub fn depends_on<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(targets.into_iter().map(Into::into));
        self
    }

    /// Require parameters to have a value before the target runs.
    #[must_use]
    pub fn requires<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(params.into_iter().map(Into::into));
        self
    }

    /// Declare a produced artifact made of the given paths.
    #[must_use]
    pub fn produces_artifact<I, S>(mut self, name: impl Into<String>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produces_artifacts.push(ProducedArtifact {
            name: name.into(),
            slice: None,
            paths: paths.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Declare a produced artifact for one slice.
    #[must_use]
    pub fn produces_artifact_slice(
        mut self,
        name: impl Into<String>,
        slice: impl Into<String>,
    ) -> Self {
        self.produces_artifacts.push(ProducedArtifact {
            name: name.into(),
            slice: Some(slice.into()),
            paths: Vec::new(),
        });
        self
    }

    /// Consume an artifact produced by another target.
    #[must_use]
    pub fn consumes_artifact(
        mut self,
        producer: impl Into<String>,
        artifact: impl Into<String>,
    ) -> Self {
        self.consumes_artifacts.push(ArtifactBinding {
            producer: producer.into(),
            artifact: artifact.into(),
            slice: None,
        });
        self
    }

    /// Consume one slice of an artifact produced by another target.
    #[must_use]
    pub fn consumes_artifact_slice(
        mut self,
        producer: impl Into<String>,
        artifact: impl Into<String>,
        slice: impl Into<String>,
    ) -> Self {
        self.consumes_artifacts.push(ArtifactBinding {
            producer: producer.into(),
            artifact: artifact.into(),
            slice: Some(slice.into()),
        });
        self
    }

    /// Declare a produced variable.
    #[must_use]
    pub fn produces_variable(mut self, name: impl Into<String>) -> Self {
        self.produces_variables.push(name.into());
        self
    }

    /// Consume a variable produced by another target.
    #[must_use]
    pub fn consumes_variable(mut self, producer: impl Into<String>, name: impl Into<String>) -> Self {
        self.consumes_variables.push(VariableBinding {
            producer: producer.into(),
            name: name.into(),
        });
        self
    }

    /// Extend a base definition; the base becomes an implicit dependency.
    #[must_use]
    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Append a task closure.
    #[must_use]
    pub fn executes<F, Fut>(mut self, task: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks.push(Arc::new(move |ctx| Box::pin(task(ctx))));
        self
    }

    /// Every target name this definition needs to run after: explicit
    /// dependencies, artifact and variable producers, and the base.
    /// Duplicates are removed, first occurrence wins.
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        let mut seen: Vec<&str> = Vec::new();
        self.depends_on
            .iter()
            .map(String::as_str)
            .chain(self.consumes_artifacts.iter().map(|a| a.producer.as_str()))
            .chain(self.consumes_variables.iter().map(|v| v.producer.as_str()))
            .chain(self.base.as_deref())
            .filter(move |name| {
                if seen.contains(name) {
                    false
                } else {
                    seen.push(*name);
                    true
                }
            })
    }
}

impl fmt::Debug for TargetDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("hidden", &self.hidden)
            .field("tasks", &self.tasks.len())
            .field("depends_on", &self.depends_on)
            .field("requires", &self.requires)
            .field("produces_artifacts", &self.produces_artifacts)
            .field("consumes_artifacts", &self.consumes_artifacts)
            .field("produces_variables", &self.produces_variables)
            .field("consumes_variables", &self.consumes_variables)
            .field("base", &self.base)
            .finish()
    }
}

impl keel_task_graph::TargetNodeData for TargetDefinition {
    fn dependency_names(&self) -> impl Iterator<Item = &str> {
        Self::dependency_names(self)
    }
}
