//! Error types for target graph operations.

use thiserror::Error;

/// Result type for target graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or ordering a target graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// One or more target names were declared more than once.
    #[error("Duplicate target names: {}", names.join(", "))]
    DuplicateTargets {
        /// Every name that appeared more than once, in first-seen order.
        names: Vec<String>,
    },

    /// Targets reference dependencies that were never declared.
    #[error("Missing dependencies: {}", format_missing(missing))]
    MissingDependencies {
        /// List of (target, missing_dependency) pairs.
        missing: Vec<(String, String)>,
    },

    /// A dependency cycle was detected in the graph.
    #[error("Circular dependency: {}", path.join(" -> "))]
    CycleDetected {
        /// Target names along the cycle in traversal order. The first name
        /// is repeated at the end to close the loop.
        path: Vec<String>,
    },
}

fn format_missing(missing: &[(String, String)]) -> String {
    missing
        .iter()
        .map(|(target, dep)| format!("target '{target}' depends on undefined target '{dep}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = Error::CycleDetected {
            path: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency: A -> B -> A");
    }

    #[test]
    fn test_missing_message_names_both_ends() {
        let err = Error::MissingDependencies {
            missing: vec![("Test".into(), "Compile".into())],
        };
        let message = err.to_string();
        assert!(message.contains("'Test'"));
        assert!(message.contains("'Compile'"));
    }
}
