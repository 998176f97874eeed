//! Coordinator: directory, link table and message routing
//!
//! A single task owns the directory and every link, so all reachability and
//! link-status changes are serialized. Envelopes flow through per-pair
//! delivery lanes:
//! - **Local:** enqueue into the recipient's mailbox
//! - **Remote:** encode and hand to a [`Transport`] binding
//! - **Retry:** exponential backoff; exhausted retries degrade the link

mod config;
mod core;
mod handle;
mod lane;
mod messages;
mod retry;
mod transport;

pub use config::NetworkConfig;
pub use core::Coordinator;
pub use handle::CoordinatorHandle;
pub use messages::{ActorStatusEvent, CoordRequest, CoordinatorMetrics, DeliveryReport};
pub use retry::RetryPolicy;
pub use transport::{ChannelTransport, Transport};
