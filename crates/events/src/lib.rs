//! Structured build events for keel.
//!
//! Events are plain `tracing` events with a stable `target` and an
//! `event_type` field, so any subscriber (human-readable or JSON) can
//! render or filter them. Two event families exist:
//!
//! - `keel::target` for the lifecycle of a target during a local run
//! - `keel::workflow` for workflow compilation and file generation
//!
//! # Usage
//!
//! ```rust,ignore
//! use keel_events::{TracingConfig, init_tracing, emit_target_started};
//!
//! init_tracing(&TracingConfig::default())?;
//! emit_target_started!("Build");
//! ```

pub mod metadata;
pub mod redaction;
pub mod subscriber;

pub use metadata::{CORRELATION_ID_ENV, correlation_id, set_correlation_id, timestamp};
pub use redaction::{REDACTED_PLACEHOLDER, redact, register_secret, register_secrets};
pub use subscriber::{LogLevel, TracingConfig, TracingError, TracingFormat, init_tracing};

// ============================================================================
// Target Lifecycle Macros
// ============================================================================

/// Emit a target started event.
///
/// # Example
/// ```rust,ignore
/// emit_target_started!("Build");
/// ```
#[macro_export]
macro_rules! emit_target_started {
    ($name:expr) => {
        ::tracing::info!(
            target: "keel::target",
            event_type = "target.started",
            target_name = %$name,
        )
    };
}

/// Emit a target succeeded event.
///
/// # Example
/// ```rust,ignore
/// emit_target_succeeded!("Build", 1234_u64);
/// ```
#[macro_export]
macro_rules! emit_target_succeeded {
    ($name:expr, $duration_ms:expr) => {
        ::tracing::info!(
            target: "keel::target",
            event_type = "target.succeeded",
            target_name = %$name,
            duration_ms = $duration_ms,
        )
    };
}

/// Emit a target failed event.
///
/// # Example
/// ```rust,ignore
/// emit_target_failed!("Build", "missing parameter 'api-key'");
/// ```
#[macro_export]
macro_rules! emit_target_failed {
    ($name:expr, $reason:expr) => {
        ::tracing::error!(
            target: "keel::target",
            event_type = "target.failed",
            target_name = %$name,
            reason = %$reason,
        )
    };
}

/// Emit a target skipped event (an upstream dependency did not succeed).
#[macro_export]
macro_rules! emit_target_skipped {
    ($name:expr, $dependency:expr) => {
        ::tracing::warn!(
            target: "keel::target",
            event_type = "target.skipped",
            target_name = %$name,
            failed_dependency = %$dependency,
        )
    };
}

// ============================================================================
// Workflow Macros
// ============================================================================

/// Emit a recoverable workflow compilation warning.
///
/// # Example
/// ```rust,ignore
/// emit_workflow_warning!("ci", "secret 'ApiKey' has no value");
/// ```
#[macro_export]
macro_rules! emit_workflow_warning {
    ($workflow:expr, $message:expr) => {
        ::tracing::warn!(
            target: "keel::workflow",
            event_type = "workflow.warning",
            workflow = %$workflow,
            message = %$message,
        )
    };
}

/// Emit a workflow file written event.
#[macro_export]
macro_rules! emit_workflow_written {
    ($workflow:expr, $backend:expr, $path:expr) => {
        ::tracing::info!(
            target: "keel::workflow",
            event_type = "workflow.written",
            workflow = %$workflow,
            backend = %$backend,
            path = %$path,
        )
    };
}

/// Create a span covering the run of a single target.
#[macro_export]
macro_rules! target_span {
    ($name:expr) => {
        ::tracing::info_span!(
            "target",
            target_name = %$name,
            correlation_id = %$crate::correlation_id(),
            start_time = %$crate::timestamp(),
        )
    };
}

/// Print to stdout with automatic secret redaction (with newline).
///
/// Use this instead of `println!` for anything that might echo parameter
/// values back to the user.
#[allow(clippy::print_stdout)]
pub fn println_redacted(content: &str) {
    println!("{}", redact(content));
}
