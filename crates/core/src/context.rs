//! Context handed to every task closure.

use crate::params::ParamResolution;
use crate::process::{ProcessOutput, run_process};
use crate::variables::VariablePropagation;
use crate::{Error, Result};
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

/// Type map of shared services (process runners, API clients, ...).
#[derive(Default)]
pub struct Services {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Services {
    /// Create an empty service map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, replacing any earlier one of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, service: T) {
        self.entries.insert(TypeId::of::<T>(), Arc::new(service));
    }

    /// Look up a service by type.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|entry| entry.downcast::<T>().ok())
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no service is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Explicit context for task closures: parameter access, variable output
/// and service lookup for the target being run.
#[derive(Clone)]
pub struct TaskContext {
    target: Arc<str>,
    params: Arc<dyn ParamResolution>,
    variables: Arc<dyn VariablePropagation>,
    services: Arc<Services>,
}

impl TaskContext {
    /// Create a context for `target`.
    #[must_use]
    pub fn new(
        target: &str,
        params: Arc<dyn ParamResolution>,
        variables: Arc<dyn VariablePropagation>,
        services: Arc<Services>,
    ) -> Self {
        Self {
            target: Arc::from(target),
            params,
            variables,
            services,
        }
    }

    /// Name of the target being run.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Resolve a parameter.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<String> {
        self.params.get_param(key)
    }

    /// Resolve a parameter that must have a value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParameter`] if no source provides a value.
    pub fn require_param(&self, key: &str) -> Result<String> {
        self.param(key).ok_or_else(|| Error::MissingParameter {
            target: self.target.to_string(),
            param: key.to_string(),
        })
    }

    /// Publish a variable produced by this target.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be stored or exported.
    pub async fn write_variable(&self, name: &str, value: &str) -> Result<()> {
        self.variables
            .write_variable(&self.target, name, value)
            .await
    }

    /// Run a process and fail this target if it exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the process cannot be spawned and
    /// [`Error::Task`] if it exits with a non-zero code.
    pub async fn exec<I, S>(
        &self,
        program: &str,
        args: I,
        working_dir: Option<&Path>,
    ) -> Result<ProcessOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        run_process(program, args, working_dir)
            .await?
            .ensure_success(&self.target)
    }

    /// Look up a registered service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingService`] if nothing of type `T` was registered.
    pub fn service<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.services.get::<T>().ok_or(Error::MissingService {
            type_name: type_name::<T>(),
        })
    }
}
