//! Azure Pipelines support for keel.
//!
//! [`AzurePipelinesEmitter`] renders compiled workflows as pipeline files
//! under `azure-pipelines/`.

mod emitter;

pub use emitter::AzurePipelinesEmitter;
