//! Transport bindings for actors in other processes
//!
//! The network only needs `send(address, bytes)` from a binding; inbound
//! bytes are handed to [`CoordinatorHandle::ingest`](super::CoordinatorHandle::ingest).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::handle::CoordinatorHandle;
use crate::error::{NetError, NetResult};

/// Byte transport to remote addresses
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand `bytes` to whatever listens at `address`
    ///
    /// Success means the binding accepted the bytes, not that the remote
    /// actor applied them.
    async fn send(&self, address: &str, bytes: Vec<u8>) -> NetResult<()>;
}

/// In-process transport over channels, one receiver per bound address
#[derive(Clone, Default)]
pub struct ChannelTransport {
    routes: Arc<RwLock<HashMap<String, mpsc::Sender<Vec<u8>>>>>,
    buffer: usize,
}

impl ChannelTransport {
    pub fn new(buffer: usize) -> Self {
        debug!(buffer, "ChannelTransport::new: called");
        Self {
            routes: Arc::new(RwLock::new(HashMap::new())),
            buffer: buffer.max(1),
        }
    }

    /// Listen at `address`; the returned receiver yields inbound bytes
    pub async fn bind(&self, address: impl Into<String>) -> mpsc::Receiver<Vec<u8>> {
        let address = address.into();
        debug!(%address, "ChannelTransport::bind: called");
        let (tx, rx) = mpsc::channel(self.buffer);
        self.routes.write().await.insert(address, tx);
        rx
    }

    /// Stop listening at `address`
    pub async fn unbind(&self, address: &str) -> bool {
        debug!(%address, "ChannelTransport::unbind: called");
        self.routes.write().await.remove(address).is_some()
    }

    /// Forward everything received at a bound address into a coordinator
    pub fn pump(mut rx: mpsc::Receiver<Vec<u8>>, coordinator: CoordinatorHandle) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if let Err(e) = coordinator.ingest(bytes).await {
                    warn!(error = %e, "Dropping inbound transport message");
                    if matches!(e, NetError::ChannelClosed) {
                        break;
                    }
                }
            }
            debug!("ChannelTransport::pump: receiver closed");
        })
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, address: &str, bytes: Vec<u8>) -> NetResult<()> {
        let tx = self
            .routes
            .read()
            .await
            .get(address)
            .cloned()
            .ok_or_else(|| NetError::Transport(format!("no binding at {}", address)))?;

        tx.try_send(bytes).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NetError::Transport(format!("binding at {} is full", address)),
            mpsc::error::TrySendError::Closed(_) => NetError::Transport(format!("binding at {} is closed", address)),
        })
    }
}
