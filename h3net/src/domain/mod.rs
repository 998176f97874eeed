//! Core data model: identifiers, artifacts and mailbox messages

mod artifact;
mod envelope;
mod id;

pub use artifact::{Artifact, ArtifactKind, ArtifactUpdate};
pub use envelope::{Body, ControlSignal, Envelope};
pub use id::{ActorId, LinkId};
