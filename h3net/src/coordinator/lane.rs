//! Delivery lanes
//!
//! One lane per (sender, recipient) pair. A lane delivers its envelopes one
//! at a time in the order they were routed, retrying each with backoff, so a
//! retry can never let a later message overtake an earlier one. Artifacts
//! whose link stops being active while queued are dropped, not delivered.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use super::messages::{CoordRequest, DeliveryReport};
use super::retry::RetryPolicy;
use super::transport::Transport;
use crate::directory::{Address, DirectorySnapshot};
use crate::domain::{ActorId, Envelope, LinkId};
use crate::error::{NetError, NetResult};
use crate::link::LinkStatus;
use crate::mailbox::{EnqueueError, Mailbox};

/// Links that may not carry artifacts right now, published by the coordinator
pub(crate) type PausedLinks = Arc<HashMap<LinkId, LinkStatus>>;

/// Where a lane hands its envelopes
#[derive(Clone)]
pub(crate) enum LaneTarget {
    Local(Arc<Mailbox>),
    Remote(Arc<dyn Transport>),
}

pub(crate) struct Delivery {
    pub envelope: Envelope,
    pub ack_tx: Option<oneshot::Sender<NetResult<()>>>,
}

/// Why a lane refused a delivery; the delivery is handed back
pub(crate) enum PushError {
    Full(Delivery),
    Closed(Delivery),
}

/// Shared views every lane reads before each attempt
#[derive(Clone)]
pub(crate) struct LaneContext {
    pub policy: RetryPolicy,
    pub capacity: usize,
    pub directory: watch::Receiver<Arc<DirectorySnapshot>>,
    pub paused: watch::Receiver<PausedLinks>,
    pub coord_tx: mpsc::Sender<CoordRequest>,
}

/// Sending side of a running lane
pub(crate) struct Lane {
    tx: mpsc::Sender<Delivery>,
}

impl Lane {
    pub fn spawn(recipient: ActorId, target: LaneTarget, context: LaneContext) -> Self {
        debug!(%recipient, capacity = context.capacity, "Lane::spawn: called");
        let (tx, rx) = mpsc::channel(context.capacity.max(1));
        let worker = LaneWorker {
            recipient,
            target,
            context,
        };
        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    /// Queue an envelope without waiting
    pub fn push(&self, delivery: Delivery) -> Result<(), PushError> {
        self.tx.try_send(delivery).map_err(|e| match e {
            TrySendError::Full(delivery) => PushError::Full(delivery),
            TrySendError::Closed(delivery) => PushError::Closed(delivery),
        })
    }
}

struct LaneWorker {
    recipient: ActorId,
    target: LaneTarget,
    context: LaneContext,
}

impl LaneWorker {
    async fn run(self, mut rx: mpsc::Receiver<Delivery>) {
        while let Some(Delivery { envelope, ack_tx }) = rx.recv().await {
            let (attempts, result) = self.deliver(&envelope).await;
            let delivered = result.is_ok();
            let dropped = matches!(result, Err(NetError::LinkInactive { .. }));

            match &result {
                Ok(()) => {}
                Err(e) if dropped => {
                    debug!(sender = %envelope.sender, recipient = %self.recipient, seq = envelope.sequence, error = %e, "Dropping envelope for paused link");
                }
                Err(e) => {
                    warn!(
                        sender = %envelope.sender,
                        recipient = %self.recipient,
                        seq = envelope.sequence,
                        attempts,
                        error = %e,
                        "Delivery failed"
                    );
                }
            }
            if let Some(ack_tx) = ack_tx {
                let _ = ack_tx.send(result);
            }

            let report = DeliveryReport {
                sender: envelope.sender,
                recipient: envelope.recipient,
                link_id: envelope.link_id,
                sequence: envelope.sequence,
                attempts,
                delivered,
                dropped,
            };
            if self.context.coord_tx.send(CoordRequest::Delivery(report)).await.is_err() {
                break;
            }
        }
        debug!(recipient = %self.recipient, "LaneWorker::run: lane closed");
    }

    fn paused_status(&self, envelope: &Envelope) -> Option<(LinkId, LinkStatus)> {
        if !envelope.is_artifact() {
            return None;
        }
        let link_id = envelope.link_id.as_ref()?;
        let status = *self.context.paused.borrow().get(link_id)?;
        Some((link_id.clone(), status))
    }

    /// Try until accepted or out of attempts; returns attempts used
    ///
    /// Droppable signals such as heartbeats get a single attempt and may
    /// reach an unreachable entry, since they are how it recovers.
    async fn deliver(&self, envelope: &Envelope) -> (u32, NetResult<()>) {
        let probe = envelope.is_droppable();
        let max_attempts = if probe { 1 } else { self.context.policy.max_attempts };
        let mut last_err = NetError::Unreachable(self.recipient.clone());

        for attempt in 1..=max_attempts {
            let delay = self.context.policy.delay_before(attempt);
            if !delay.is_zero() {
                debug!(recipient = %self.recipient, attempt, ?delay, "LaneWorker::deliver: backing off");
                tokio::time::sleep(delay).await;
            }

            if let Some((link_id, status)) = self.paused_status(envelope) {
                return (attempt - 1, Err(NetError::LinkInactive { link_id, status }));
            }

            // Fresh snapshot per attempt so a restored entry is picked up
            let address = {
                let snapshot = self.context.directory.borrow();
                if probe {
                    snapshot.probe_address(&self.recipient)
                } else {
                    snapshot.resolve(&self.recipient)
                }
            };
            let address = match address {
                Ok(address) => address,
                Err(e) => {
                    last_err = e;
                    continue;
                }
            };

            match (&self.target, address) {
                (LaneTarget::Local(mailbox), _) => match mailbox.enqueue(envelope.clone()).await {
                    Ok(()) => return (attempt, Ok(())),
                    Err(EnqueueError::Full) => {
                        last_err = NetError::MailboxFull {
                            actor: self.recipient.clone(),
                        };
                    }
                    Err(EnqueueError::Closed) => {
                        return (attempt, Err(NetError::Unreachable(self.recipient.clone())));
                    }
                },
                (LaneTarget::Remote(transport), Address::Remote(addr)) => {
                    let bytes = match envelope.encode() {
                        Ok(bytes) => bytes,
                        Err(e) => return (attempt, Err(e)),
                    };
                    match transport.send(&addr, bytes).await {
                        Ok(()) => return (attempt, Ok(())),
                        Err(e) => last_err = e,
                    }
                }
                (LaneTarget::Remote(_), Address::Local) => {
                    return (attempt, Err(NetError::Unreachable(self.recipient.clone())));
                }
            }
        }

        if probe {
            return (max_attempts, Err(last_err));
        }
        debug!(recipient = %self.recipient, attempts = max_attempts, error = %last_err, "LaneWorker::deliver: giving up");
        (
            max_attempts,
            Err(NetError::DeliveryFailed {
                recipient: self.recipient.clone(),
                attempts: max_attempts,
            }),
        )
    }
}
