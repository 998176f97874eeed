//! Actor and link identifiers
//!
//! Actor IDs use the format `{slug}-{uuid-v7}`, e.g. `encoder-0193f2...`.
//! The slug keeps logs readable; the UUID keeps IDs globally unique. IDs are
//! never reused: a restarted actor gets a fresh one.

use serde::{Deserialize, Serialize};

/// Slugify a name for use in IDs
fn slugify(name: &str) -> String {
    let slug = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() { "actor".to_string() } else { slug }
}

/// Globally unique, immutable actor identifier
///
/// Ordering is lexicographic on the underlying string; the artifact store
/// relies on it for its equal-version tie-break.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Generate a fresh ID for an actor with the given display name
    pub fn generate(name: &str) -> Self {
        Self(format!("{}-{}", slugify(name), uuid::Uuid::now_v7().simple()))
    }

    /// Get the full ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ActorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ActorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Link identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(String);

impl LinkId {
    /// Generate a fresh link ID
    pub fn generate() -> Self {
        Self(format!("link-{}", uuid::Uuid::now_v7().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LinkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
