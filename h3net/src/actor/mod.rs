//! Actors: isolated units hosting one model computation
//!
//! Each actor runs on its own task and exclusively owns its artifact store
//! and mailbox. The only way to reach another actor's state is a message
//! routed by the coordinator.

mod handle;
mod messages;
mod model;
mod runtime;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::info;

pub use handle::ActorHandle;
pub use messages::{ActorCommand, PullOutcome, PutReceipt};
pub use model::{DataFeed, ModelError, ModelUnit, Passive, VecFeed};
pub use runtime::ActorOptions;
pub use state::ActorState;

use crate::coordinator::CoordinatorHandle;
use crate::domain::ActorId;
use crate::error::NetResult;
use crate::mailbox::Mailbox;
use crate::store::ArtifactStore;
use runtime::ActorRuntime;

/// Configure and spawn an actor
pub struct ActorBuilder<M: ModelUnit> {
    name: String,
    model: M,
    options: Option<ActorOptions>,
    mailbox_capacity: Option<usize>,
    step_interval: Option<Duration>,
    restore_from: Option<PathBuf>,
}

impl<M: ModelUnit> ActorBuilder<M> {
    pub fn new(name: impl Into<String>, model: M) -> Self {
        Self {
            name: name.into(),
            model,
            options: None,
            mailbox_capacity: None,
            step_interval: None,
            restore_from: None,
        }
    }

    /// Replace the settings derived from the coordinator's config
    pub fn options(mut self, options: ActorOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = Some(capacity);
        self
    }

    /// Step the model automatically on this period
    pub fn step_every(mut self, period: Duration) -> Self {
        self.step_interval = Some(period);
        self
    }

    /// Start from a saved store snapshot instead of an empty store
    pub fn restore_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.restore_from = Some(path.into());
        self
    }

    /// Register with the coordinator and start the actor task in `Created`
    pub async fn spawn(self, coordinator: &CoordinatorHandle) -> NetResult<ActorHandle> {
        let id = ActorId::generate(&self.name);
        let mut options = self
            .options
            .unwrap_or_else(|| ActorOptions::from_config(coordinator.config()));
        if let Some(capacity) = self.mailbox_capacity {
            options.mailbox_capacity = capacity;
        }
        if self.step_interval.is_some() {
            options.step_interval = self.step_interval;
        }

        let store = match self.restore_from {
            Some(path) => ArtifactStore::load_snapshot(id.clone(), path)?,
            None => ArtifactStore::new(id.clone()),
        };

        let mailbox = Arc::new(Mailbox::new(id.clone(), options.mailbox_capacity));
        coordinator.register(id.clone(), mailbox.clone()).await?;

        let (tx, rx) = mpsc::channel(options.command_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ActorState::Created);
        let request_timeout = options.sync_timeout;
        let runtime = ActorRuntime::new(store, mailbox, self.model, coordinator.clone(), options, state_tx);
        tokio::spawn(runtime.run(rx));

        info!(actor = %id, "Actor spawned");
        Ok(ActorHandle::new(id, tx, state_rx, request_timeout))
    }
}
