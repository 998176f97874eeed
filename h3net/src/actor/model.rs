//! Model units and training data feeds
//!
//! A model unit is the computation an actor hosts: one layer, a classifier
//! head, an embedding table. The actor calls it with a read-only view of its
//! own store and publishes whatever updates it returns.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ArtifactUpdate;
use crate::store::ArtifactStore;

/// Failure inside a model unit; fatal for the hosting actor
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Missing input artifact: {0}")]
    MissingInput(String),

    #[error("Malformed payload for {name}: {reason}")]
    Malformed { name: String, reason: String },

    #[error("Computation failed: {0}")]
    Compute(String),
}

/// Computation hosted by an actor
#[async_trait]
pub trait ModelUnit: Send + 'static {
    /// Called once when the actor starts; returned updates are published
    async fn initialize(&mut self, _store: &ArtifactStore) -> Result<Vec<ArtifactUpdate>, ModelError> {
        Ok(Vec::new())
    }

    /// One computation step over the current store contents
    async fn compute_step(&mut self, store: &ArtifactStore) -> Result<Vec<ArtifactUpdate>, ModelError>;
}

/// Model unit that computes nothing; the actor only stores and relays
#[derive(Debug, Clone, Copy, Default)]
pub struct Passive;

#[async_trait]
impl ModelUnit for Passive {
    async fn compute_step(&mut self, _store: &ArtifactStore) -> Result<Vec<ArtifactUpdate>, ModelError> {
        Ok(Vec::new())
    }
}

/// Source of training batches, consumed in epochs
pub trait DataFeed: Send {
    type Batch;

    /// Rewind to the start of the data
    fn reset(&mut self);

    /// Next batch of the current epoch, `None` at the end
    fn next_batch(&mut self) -> Option<Self::Batch>;
}

/// Data feed over an in-memory list, `batch_size` items at a time
#[derive(Debug, Clone)]
pub struct VecFeed<T> {
    items: Vec<T>,
    batch_size: usize,
    cursor: usize,
}

impl<T: Clone> VecFeed<T> {
    pub fn new(items: Vec<T>, batch_size: usize) -> Self {
        Self {
            items,
            batch_size: batch_size.max(1),
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone + Send> DataFeed for VecFeed<T> {
    type Batch = Vec<T>;

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn next_batch(&mut self) -> Option<Vec<T>> {
        if self.cursor >= self.items.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.items.len());
        let batch = self.items[self.cursor..end].to_vec();
        self.cursor = end;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ActorId;

    #[test]
    fn test_vec_feed_epochs() {
        let mut feed = VecFeed::new(vec![1, 2, 3, 4, 5], 2);
        assert_eq!(feed.next_batch(), Some(vec![1, 2]));
        assert_eq!(feed.next_batch(), Some(vec![3, 4]));
        assert_eq!(feed.next_batch(), Some(vec![5]));
        assert_eq!(feed.next_batch(), None);

        feed.reset();
        assert_eq!(feed.next_batch(), Some(vec![1, 2]));
    }

    #[test]
    fn test_empty_feed() {
        let mut feed: VecFeed<u8> = VecFeed::new(Vec::new(), 0);
        assert!(feed.is_empty());
        assert_eq!(feed.next_batch(), None);
    }

    #[tokio::test]
    async fn test_passive_produces_nothing() {
        let store = ArtifactStore::new(ActorId::from("a"));
        let mut unit = Passive;
        assert!(unit.initialize(&store).await.unwrap().is_empty());
        assert!(unit.compute_step(&store).await.unwrap().is_empty());
    }
}
