//! Artifact Store: the versioned holder of one actor's parameters, layers and predictions

mod artifact_store;
mod snapshot;

pub use artifact_store::{ApplyOutcome, ArtifactStore, MergePolicy, RejectReason};
