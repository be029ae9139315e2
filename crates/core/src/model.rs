//! Resolved build model.
//!
//! The [`BuildModel`] is an arena: targets are stored in topological order
//! and addressed by [`TargetId`], their position in that order. Run state
//! lives in a parallel vector indexed by the same id.

use crate::target::{ArtifactBinding, ProducedArtifact, TaskFn, VariableBinding};
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Index of a target within a [`BuildModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub(crate) usize);

impl TargetId {
    /// Position of the target in topological order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Run status of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    /// Not part of this run, or not run because a dependency failed
    Skipped,
    /// Scheduled to run
    PendingRun,
    /// Currently running
    Running,
    /// Ran to completion
    Succeeded,
    /// Ran (or was validated) and failed
    Failed,
}

impl TargetStatus {
    /// Whether a status change is allowed within one execution pass.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Skipped, Self::PendingRun)
                | (Self::PendingRun, Self::Running | Self::Skipped | Self::Failed)
                | (Self::Running, Self::Succeeded | Self::Failed)
        )
    }

    /// Whether the status is final for this run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Skipped => "Skipped",
            Self::PendingRun => "PendingRun",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// Mutable per-run state of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetState {
    /// Current status
    pub status: TargetStatus,
    /// Elapsed run time, recorded once the target finishes
    pub duration: Option<Duration>,
}

impl Default for TargetState {
    fn default() -> Self {
        Self {
            status: TargetStatus::Skipped,
            duration: None,
        }
    }
}

/// A resolved target with its dependencies materialized as ids.
#[derive(Clone)]
pub struct TargetModel {
    /// Own id
    pub id: TargetId,
    /// Unique name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Hidden from listings
    pub hidden: bool,
    /// Task closures in declared order
    pub tasks: Vec<TaskFn>,
    /// Direct dependencies: explicit, artifact producers, variable producers, base
    pub dependencies: Vec<TargetId>,
    /// Required parameter keys
    pub requires: Vec<String>,
    /// Produced artifacts
    pub produces_artifacts: Vec<ProducedArtifact>,
    /// Consumed artifacts
    pub consumes_artifacts: Vec<ArtifactBinding>,
    /// Produced variables
    pub produces_variables: Vec<String>,
    /// Consumed variables
    pub consumes_variables: Vec<VariableBinding>,
}

impl fmt::Debug for TargetModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetModel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

/// Resolved targets in dependency order plus their run state.
#[derive(Debug, Clone)]
pub struct BuildModel {
    pub(crate) targets: Vec<TargetModel>,
    pub(crate) states: Vec<TargetState>,
    pub(crate) by_name: HashMap<String, TargetId>,
    pub(crate) requested: Vec<TargetId>,
}

impl BuildModel {
    /// All targets, dependencies before dependents.
    #[must_use]
    pub fn targets(&self) -> &[TargetModel] {
        &self.targets
    }

    /// Target by id.
    #[must_use]
    pub fn target(&self, id: TargetId) -> &TargetModel {
        &self.targets[id.0]
    }

    /// Target by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&TargetModel> {
        self.by_name.get(name).map(|&id| &self.targets[id.0])
    }

    /// Id of a target by name.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<TargetId> {
        self.by_name.get(name).copied()
    }

    /// Run state of a target.
    #[must_use]
    pub fn state(&self, id: TargetId) -> &TargetState {
        &self.states[id.0]
    }

    /// Status of a target by name.
    #[must_use]
    pub fn status_of(&self, name: &str) -> Option<TargetStatus> {
        self.id_of(name).map(|id| self.states[id.0].status)
    }

    /// Requested targets in request order.
    #[must_use]
    pub fn requested(&self) -> &[TargetId] {
        &self.requested
    }

    /// Targets paired with their state, in topological order.
    pub fn iter(&self) -> impl Iterator<Item = (&TargetModel, &TargetState)> {
        self.targets.iter().zip(&self.states)
    }

    /// Names of targets scheduled to run, in execution order.
    #[must_use]
    pub fn pending(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, state)| state.status == TargetStatus::PendingRun)
            .map(|(target, _)| target.name.as_str())
            .collect()
    }

    /// Move a target to a new status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] for a backward or skipping move.
    pub(crate) fn transition(&mut self, id: TargetId, next: TargetStatus) -> Result<()> {
        let state = &mut self.states[id.0];
        if !state.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                target: self.targets[id.0].name.clone(),
                from: state.status.to_string(),
                to: next.to_string(),
            });
        }
        state.status = next;
        Ok(())
    }

    pub(crate) fn record_duration(&mut self, id: TargetId, duration: Duration) {
        self.states[id.0].duration = Some(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_are_monotonic() {
        use TargetStatus::{Failed, PendingRun, Running, Skipped, Succeeded};

        assert!(Skipped.can_transition_to(PendingRun));
        assert!(PendingRun.can_transition_to(Running));
        assert!(PendingRun.can_transition_to(Skipped));
        assert!(PendingRun.can_transition_to(Failed));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));

        assert!(!Running.can_transition_to(PendingRun));
        assert!(!Succeeded.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Succeeded));
        assert!(!Skipped.can_transition_to(Running));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TargetStatus::Succeeded.is_terminal());
        assert!(TargetStatus::Failed.is_terminal());
        assert!(!TargetStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_default_state_is_skipped() {
        let state = TargetState::default();
        assert_eq!(state.status, TargetStatus::Skipped);
        assert!(state.duration.is_none());
    }
}
