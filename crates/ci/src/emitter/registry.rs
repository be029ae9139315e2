//! Emitters by format name.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Emitter, EmitterError, EmitterResult};
use crate::model::WorkflowModel;

/// Emitters keyed by format name, the backend's short name for the
/// built-in ones.
///
/// ```
/// use keel_ci::emitter::{EmitterRegistry, LocalScriptEmitter};
///
/// let mut registry = EmitterRegistry::new();
/// registry.register(LocalScriptEmitter);
/// assert_eq!(registry.formats(), vec!["local"]);
/// ```
#[derive(Default, Clone)]
pub struct EmitterRegistry {
    emitters: BTreeMap<&'static str, Arc<dyn Emitter>>,
}

/// A rendered pipeline file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPipeline {
    /// File name inside the backend's output directory
    pub file_name: String,
    /// File content
    pub content: String,
}

impl EmitterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an emitter under its format name, replacing any emitter
    /// already registered under that name.
    pub fn register(&mut self, emitter: impl Emitter + 'static) {
        self.emitters.insert(emitter.format_name(), Arc::new(emitter));
    }

    /// Emitter for a format.
    #[must_use]
    pub fn get(&self, format: &str) -> Option<Arc<dyn Emitter>> {
        self.emitters.get(format).cloned()
    }

    /// Registered format names, sorted.
    #[must_use]
    pub fn formats(&self) -> Vec<&'static str> {
        self.emitters.keys().copied().collect()
    }

    /// Number of registered emitters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    /// Whether no emitter is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }

    /// Validate and render a model with the emitter of `format`.
    ///
    /// # Errors
    ///
    /// Returns [`EmitterError::InvalidModel`] for an unknown format or a
    /// model failing validation, and whatever the emitter itself reports.
    pub fn emit(&self, format: &str, model: &WorkflowModel) -> EmitterResult<String> {
        let emitter = self.lookup(format)?;
        emitter.validate(model)?;
        emitter.emit(model)
    }

    /// Render a model with the emitter of the backend it was compiled for.
    ///
    /// # Errors
    ///
    /// Same as [`emit`](Self::emit).
    pub fn render(&self, model: &WorkflowModel) -> EmitterResult<RenderedPipeline> {
        let emitter = self.lookup(model.backend.as_str())?;
        emitter.validate(model)?;
        Ok(RenderedPipeline {
            file_name: emitter.file_name(&model.name),
            content: emitter.emit(model)?,
        })
    }

    fn lookup(&self, format: &str) -> EmitterResult<&Arc<dyn Emitter>> {
        self.emitters.get(format).ok_or_else(|| {
            let available: Vec<String> = self
                .emitters
                .iter()
                .map(|(name, emitter)| format!("{name} ({})", emitter.description()))
                .collect();
            EmitterError::InvalidModel(format!(
                "Unknown format '{format}'. Available: {}",
                available.join(", ")
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::BackendType;
    use crate::emitter::tests::{job, workflow};

    struct Echo(&'static str);

    impl Emitter for Echo {
        fn emit(&self, model: &WorkflowModel) -> EmitterResult<String> {
            Ok(format!("# {} - {}", self.0, model.name))
        }

        fn format_name(&self) -> &'static str {
            self.0
        }

        fn file_extension(&self) -> &'static str {
            "txt"
        }

        fn description(&self) -> &'static str {
            "Echo"
        }
    }

    #[test]
    fn test_formats_are_sorted_and_unique() {
        let mut registry = EmitterRegistry::new();
        assert!(registry.is_empty());
        registry.register(Echo("local"));
        registry.register(Echo("azure"));
        registry.register(Echo("github"));
        registry.register(Echo("azure"));

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.formats(), vec!["azure", "github", "local"]);
        assert!(registry.get("gitlab").is_none());
    }

    #[test]
    fn test_emit_validates_first() {
        let mut registry = EmitterRegistry::new();
        registry.register(Echo("local"));

        assert_eq!(
            registry.emit("local", &workflow(vec![job("A", &[])])).unwrap(),
            "# local - ci"
        );
        let result = registry.emit("local", &workflow(vec![job("B", &["A"])]));
        assert!(matches!(result, Err(EmitterError::InvalidModel(_))));
    }

    #[test]
    fn test_unknown_format_lists_available() {
        let mut registry = EmitterRegistry::new();
        registry.register(Echo("local"));

        let err = registry.emit("gitlab", &workflow(vec![])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid workflow model: Unknown format 'gitlab'. Available: local (Echo)"
        );
    }

    #[test]
    fn test_render_uses_model_backend() {
        let mut registry = EmitterRegistry::new();
        registry.register(Echo("github"));
        registry.register(Echo("local"));

        let mut model = workflow(vec![job("A", &[])]);
        model.backend = BackendType::GitHub;
        let rendered = registry.render(&model).unwrap();
        assert_eq!(rendered.file_name, "ci.txt");
        assert_eq!(rendered.content, "# github - ci");

        model.backend = BackendType::Azure;
        assert!(registry.render(&model).is_err());
    }
}
