//! GitHub Actions support for keel.
//!
//! [`GitHubActionsEmitter`] renders compiled workflows as workflow files
//! under `.github/workflows/`.

mod emitter;

pub use emitter::GitHubActionsEmitter;
