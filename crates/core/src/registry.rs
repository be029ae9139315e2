//! Target registry: ordered builder functions producing target definitions.
//!
//! Capabilities are expressed as registries that other registries
//! [`include`](TargetRegistry::include), so a build composes "compile",
//! "test" and "publish" capabilities by explicit merging.

use crate::target::TargetDefinition;
use std::sync::Arc;

type Builder = Arc<dyn Fn() -> TargetDefinition + Send + Sync>;

/// Ordered collection of target builders.
#[derive(Clone, Default)]
pub struct TargetRegistry {
    builders: Vec<Builder>,
}

impl TargetRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder invoked each time definitions are built.
    pub fn register<F>(&mut self, builder: F) -> &mut Self
    where
        F: Fn() -> TargetDefinition + Send + Sync + 'static,
    {
        self.builders.push(Arc::new(builder));
        self
    }

    /// Register an already built definition.
    pub fn add(&mut self, definition: TargetDefinition) -> &mut Self {
        self.register(move || definition.clone())
    }

    /// Merge every builder of another registry, after the existing ones.
    pub fn include(&mut self, other: &Self) -> &mut Self {
        self.builders.extend(other.builders.iter().cloned());
        self
    }

    /// Invoke every builder in registration order.
    ///
    /// Duplicate names are kept; the resolver rejects them.
    #[must_use]
    pub fn build_definitions(&self) -> Vec<TargetDefinition> {
        self.builders.iter().map(|builder| builder()).collect()
    }

    /// Number of registered builders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.builders.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}
