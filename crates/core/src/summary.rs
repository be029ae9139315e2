//! Per-run build summary.

use crate::model::TargetStatus;
use std::fmt;
use std::time::Duration;

/// Outcome of one target in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    /// Target name
    pub name: String,
    /// Final status
    pub status: TargetStatus,
    /// Elapsed time, absent for targets that never started
    pub duration: Option<Duration>,
}

/// Outcome of every target the executor handled, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Summary rows
    pub entries: Vec<SummaryEntry>,
}

impl BuildSummary {
    /// Names of targets that succeeded.
    #[must_use]
    pub fn succeeded(&self) -> Vec<&str> {
        self.with_status(TargetStatus::Succeeded)
    }

    /// Names of targets that failed.
    #[must_use]
    pub fn failed_targets(&self) -> Vec<&str> {
        self.with_status(TargetStatus::Failed)
    }

    /// Names of targets skipped because an upstream target failed.
    #[must_use]
    pub fn skipped(&self) -> Vec<&str> {
        self.with_status(TargetStatus::Skipped)
    }

    /// Whether every handled target succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.status == TargetStatus::Succeeded)
    }

    /// Sum of all recorded durations.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.entries.iter().filter_map(|entry| entry.duration).sum()
    }

    fn with_status(&self, status: TargetStatus) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.name.as_str())
            .collect()
    }
}

fn format_duration(duration: Option<Duration>) -> String {
    match duration {
        None => "-".to_string(),
        Some(d) if d.as_secs() >= 60 => {
            format!("{}:{:02}", d.as_secs() / 60, d.as_secs() % 60)
        }
        Some(d) => format!("{:.3}s", d.as_secs_f64()),
    }
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .entries
            .iter()
            .map(|entry| entry.name.len())
            .max()
            .unwrap_or(0)
            .max("Target".len());
        let rule = "═".repeat(width + 24);

        writeln!(f, "{rule}")?;
        writeln!(f, "{:<width$}  {:<10}  {:>10}", "Target", "Status", "Duration")?;
        writeln!(f, "{}", "─".repeat(width + 24))?;
        for entry in &self.entries {
            writeln!(
                f,
                "{:<width$}  {:<10}  {:>10}",
                entry.name,
                entry.status.to_string(),
                format_duration(entry.duration)
            )?;
        }
        writeln!(f, "{}", "─".repeat(width + 24))?;
        writeln!(
            f,
            "{:<width$}  {:<10}  {:>10}",
            "Total",
            "",
            format_duration(Some(self.total_duration()))
        )?;
        writeln!(f, "{rule}")?;
        if self.is_success() {
            write!(f, "Build succeeded")
        } else {
            write!(
                f,
                "Build failed: {}",
                self.failed_targets().join(", ")
            )
        }
    }
}
