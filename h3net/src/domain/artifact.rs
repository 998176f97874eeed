//! Artifacts: named, versioned pieces of shareable model output

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::ActorId;

/// What an artifact represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Parameter,
    Layer,
    Prediction,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Parameter => write!(f, "parameter"),
            ArtifactKind::Layer => write!(f, "layer"),
            ArtifactKind::Prediction => write!(f, "prediction"),
        }
    }
}

/// A versioned artifact
///
/// The payload is a `Bytes` handle: cloning an artifact shares the buffer but
/// nothing can mutate it, so a version's payload is fixed once assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub payload: Bytes,
    pub version: u64,
    #[serde(rename = "produced-at")]
    pub produced_at: DateTime<Utc>,
    /// Actor whose `put` created this version
    pub origin: ActorId,
}

impl Artifact {
    pub fn new(name: impl Into<String>, kind: ArtifactKind, payload: Bytes, version: u64, origin: ActorId) -> Self {
        Self {
            name: name.into(),
            kind,
            payload,
            version,
            produced_at: Utc::now(),
            origin,
        }
    }
}

/// An unversioned artifact value produced by a model step or a caller
///
/// The store assigns the version when the update is put.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactUpdate {
    pub name: String,
    pub kind: ArtifactKind,
    pub payload: Bytes,
}

impl ArtifactUpdate {
    pub fn new(name: impl Into<String>, kind: ArtifactKind, payload: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            kind,
            payload: payload.into(),
        }
    }

    pub fn parameter(name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self::new(name, ArtifactKind::Parameter, payload)
    }

    pub fn layer(name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self::new(name, ArtifactKind::Layer, payload)
    }

    pub fn prediction(name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self::new(name, ArtifactKind::Prediction, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&ArtifactKind::Prediction).unwrap();
        assert_eq!(json, "\"prediction\"");
        assert_eq!(ArtifactKind::Layer.to_string(), "layer");
    }

    #[test]
    fn test_clone_shares_payload() {
        let artifact = Artifact::new(
            "W",
            ArtifactKind::Parameter,
            Bytes::from_static(b"weights"),
            1,
            ActorId::from("p"),
        );
        let copy = artifact.clone();
        assert_eq!(copy.payload.as_ptr(), artifact.payload.as_ptr());
    }

    #[test]
    fn test_update_constructors() {
        let update = ArtifactUpdate::parameter("W", vec![1u8, 2, 3]);
        assert_eq!(update.kind, ArtifactKind::Parameter);
        assert_eq!(update.payload.as_ref(), &[1, 2, 3]);
    }
}
