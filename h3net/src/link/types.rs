//! Link types

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{ActorId, LinkId};
use crate::store::MergePolicy;

/// Who initiates a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkMode {
    /// Producer sends on every successful local put
    #[default]
    Push,
    /// Consumer asks with `request(name)`
    Pull,
}

/// Whether a producer's put waits for receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Consistency {
    Sync,
    #[default]
    Async,
}

/// Link health as seen by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkStatus {
    Active,
    /// Endpoint unreachable or deliveries exhausted; paused until resync
    Degraded,
    /// An endpoint failed; never reactivated
    Broken,
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkStatus::Active => write!(f, "active"),
            LinkStatus::Degraded => write!(f, "degraded"),
            LinkStatus::Broken => write!(f, "broken"),
        }
    }
}

/// Request to establish a link
///
/// `forward` names flow A -> B, `reverse` names flow B -> A.
#[derive(Debug, Clone)]
pub struct LinkSpec {
    pub endpoint_a: ActorId,
    pub endpoint_b: ActorId,
    pub forward: BTreeSet<String>,
    pub reverse: BTreeSet<String>,
    pub mode: LinkMode,
    pub consistency: Consistency,
    pub merge: MergePolicy,
}

impl LinkSpec {
    /// Share `names` from `endpoint_a` to `endpoint_b` with push/async defaults
    pub fn new<I, S>(endpoint_a: ActorId, endpoint_b: ActorId, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoint_a,
            endpoint_b,
            forward: names.into_iter().map(Into::into).collect(),
            reverse: BTreeSet::new(),
            mode: LinkMode::default(),
            consistency: Consistency::default(),
            merge: MergePolicy::default(),
        }
    }

    pub fn mode(mut self, mode: LinkMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn merge(mut self, merge: MergePolicy) -> Self {
        self.merge = merge;
        self
    }

    /// Also share `names` from `endpoint_b` back to `endpoint_a`
    pub fn reverse<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reverse = names.into_iter().map(Into::into).collect();
        self
    }
}

/// A sharing relationship between two actors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Link {
    pub link_id: LinkId,
    pub endpoint_a: ActorId,
    pub endpoint_b: ActorId,
    pub forward: BTreeSet<String>,
    pub reverse: BTreeSet<String>,
    pub mode: LinkMode,
    pub consistency: Consistency,
    pub merge: MergePolicy,
    pub status: LinkStatus,
}

impl Link {
    pub(crate) fn from_spec(spec: LinkSpec) -> Self {
        Self {
            link_id: LinkId::generate(),
            endpoint_a: spec.endpoint_a,
            endpoint_b: spec.endpoint_b,
            forward: spec.forward,
            reverse: spec.reverse,
            mode: spec.mode,
            consistency: spec.consistency,
            merge: spec.merge,
            status: LinkStatus::Active,
        }
    }

    pub fn touches(&self, actor: &ActorId) -> bool {
        &self.endpoint_a == actor || &self.endpoint_b == actor
    }

    /// The other endpoint, if `actor` is one of them
    pub fn peer_of(&self, actor: &ActorId) -> Option<&ActorId> {
        if &self.endpoint_a == actor {
            Some(&self.endpoint_b)
        } else if &self.endpoint_b == actor {
            Some(&self.endpoint_a)
        } else {
            None
        }
    }

    /// Names that `producer` sends to its peer over this link
    pub fn outbound_names(&self, producer: &ActorId) -> Option<&BTreeSet<String>> {
        if &self.endpoint_a == producer {
            Some(&self.forward)
        } else if &self.endpoint_b == producer {
            Some(&self.reverse)
        } else {
            None
        }
    }

    /// Names that `consumer` receives from its peer over this link
    pub fn inbound_names(&self, consumer: &ActorId) -> Option<&BTreeSet<String>> {
        self.peer_of(consumer).and_then(|peer| self.outbound_names(peer))
    }

    pub fn produces(&self, producer: &ActorId, name: &str) -> bool {
        self.outbound_names(producer).is_some_and(|names| names.contains(name))
    }

    /// Every directed (producer, consumer, name) triple carried by the link
    pub fn triples(&self) -> impl Iterator<Item = (&ActorId, &ActorId, &str)> {
        let forward = self
            .forward
            .iter()
            .map(move |n| (&self.endpoint_a, &self.endpoint_b, n.as_str()));
        let reverse = self
            .reverse
            .iter()
            .map(move |n| (&self.endpoint_b, &self.endpoint_a, n.as_str()));
        forward.chain(reverse)
    }

    pub fn is_active(&self) -> bool {
        self.status == LinkStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Link {
        Link::from_spec(
            LinkSpec::new(ActorId::from("p"), ActorId::from("c"), ["W", "b"])
                .reverse(["pred"])
                .mode(LinkMode::Push)
                .consistency(Consistency::Sync),
        )
    }

    #[test]
    fn test_directions() {
        let link = sample();
        let p = ActorId::from("p");
        let c = ActorId::from("c");

        assert!(link.produces(&p, "W"));
        assert!(!link.produces(&c, "W"));
        assert!(link.produces(&c, "pred"));
        assert_eq!(link.peer_of(&p), Some(&c));
        assert_eq!(link.inbound_names(&c).map(|n| n.len()), Some(2));
        assert!(link.peer_of(&ActorId::from("x")).is_none());
    }

    #[test]
    fn test_triples() {
        let link = sample();
        let triples: Vec<_> = link.triples().collect();
        assert_eq!(triples.len(), 3);
        assert!(triples.contains(&(&ActorId::from("c"), &ActorId::from("p"), "pred")));
    }

    #[test]
    fn test_new_link_is_active() {
        let link = sample();
        assert!(link.is_active());
        assert_eq!(link.consistency, Consistency::Sync);
        assert_eq!(LinkStatus::Degraded.to_string(), "degraded");
    }
}
