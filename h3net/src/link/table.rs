//! Link table owned by the coordinator

use std::collections::HashMap;

use tracing::debug;

use super::types::{Link, LinkSpec, LinkStatus};
use crate::domain::{ActorId, LinkId};
use crate::error::{NetError, NetResult};

/// All links known to one coordinator
///
/// Mutated only from the coordinator task.
#[derive(Debug, Default)]
pub struct LinkTable {
    links: HashMap<LinkId, Link>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a link, rejecting it if any directed (producer, consumer, name)
    /// triple is already carried by a link that is not broken
    pub fn establish(&mut self, spec: LinkSpec) -> NetResult<Link> {
        debug!(a = %spec.endpoint_a, b = %spec.endpoint_b, ?spec.mode, ?spec.consistency, "LinkTable::establish: called");
        if spec.endpoint_a == spec.endpoint_b {
            return Err(NetError::InvalidLink(format!(
                "endpoints must differ (both are {})",
                spec.endpoint_a
            )));
        }
        if spec.forward.is_empty() && spec.reverse.is_empty() {
            return Err(NetError::InvalidLink("no shared artifact names".to_string()));
        }

        let candidate = Link::from_spec(spec);
        for existing in self.links.values().filter(|l| l.status != LinkStatus::Broken) {
            for (producer, consumer, name) in candidate.triples() {
                if existing.produces(producer, name) && existing.peer_of(producer) == Some(consumer) {
                    debug!(%existing.link_id, %name, "LinkTable::establish: conflict");
                    return Err(NetError::LinkConflict {
                        producer: producer.clone(),
                        consumer: consumer.clone(),
                        name: name.to_string(),
                        existing: existing.link_id.clone(),
                    });
                }
            }
        }

        self.links.insert(candidate.link_id.clone(), candidate.clone());
        Ok(candidate)
    }

    pub fn get(&self, link_id: &LinkId) -> Option<&Link> {
        self.links.get(link_id)
    }

    pub fn remove(&mut self, link_id: &LinkId) -> Option<Link> {
        self.links.remove(link_id)
    }

    /// Set a link's status, returning the previous one
    pub fn set_status(&mut self, link_id: &LinkId, status: LinkStatus) -> Option<LinkStatus> {
        let link = self.links.get_mut(link_id)?;
        let previous = link.status;
        link.status = status;
        Some(previous)
    }

    /// Links that have `actor` as an endpoint
    pub fn touching(&self, actor: &ActorId) -> Vec<&Link> {
        self.links.values().filter(|l| l.touches(actor)).collect()
    }

    pub fn all(&self) -> Vec<Link> {
        let mut links: Vec<Link> = self.links.values().cloned().collect();
        links.sort_by(|a, b| a.link_id.cmp(&b.link_id));
        links
    }

    /// Status of every link that currently may not carry artifacts
    pub fn paused(&self) -> HashMap<LinkId, LinkStatus> {
        self.links
            .values()
            .filter(|l| !l.is_active())
            .map(|l| (l.link_id.clone(), l.status))
            .collect()
    }

    pub fn count_by_status(&self, status: LinkStatus) -> usize {
        self.links.values().filter(|l| l.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
