//! h3net - Actor network for hierarchical model training
//!
//! Model units run as isolated actors, each owning a versioned store of
//! named artifacts (parameters, layers, predictions). Actors share artifacts
//! only by message, over links managed by a single coordinator.
//!
//! # Core Concepts
//!
//! - **Single Writer**: Only the owning actor mutates its store
//! - **Versions, Not Clocks**: Higher version wins; equal versions tie-break on origin
//! - **Ordered Delivery**: Per sender/recipient FIFO with at-most-once apply
//! - **Self-Healing Links**: Missed heartbeats degrade links; recovery triggers resync
//!
//! # Modules
//!
//! - [`actor`] - Actor runtime, handles and model units
//! - [`coordinator`] - Directory ownership, link management and routing
//! - [`directory`] - Actor addresses and liveness
//! - [`link`] - Link types and the link table
//! - [`mailbox`] - Bounded per-actor inbound queue
//! - [`store`] - Versioned artifact store and snapshots
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod actor;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod demo;
pub mod directory;
pub mod domain;
pub mod error;
pub mod link;
pub mod mailbox;
pub mod store;

// Re-export commonly used types
pub use actor::{
    ActorBuilder, ActorHandle, ActorOptions, ActorState, DataFeed, ModelError, ModelUnit, Passive, PullOutcome,
    PutReceipt, VecFeed,
};
pub use config::{Config, DemoConfig};
pub use coordinator::{
    ActorStatusEvent, ChannelTransport, Coordinator, CoordinatorHandle, CoordinatorMetrics, NetworkConfig, Transport,
};
pub use directory::{Address, DirectoryEntry, EntryStatus};
pub use domain::{ActorId, Artifact, ArtifactKind, ArtifactUpdate, ControlSignal, Envelope, LinkId};
pub use error::{NetError, NetResult};
pub use link::{Consistency, Link, LinkMode, LinkSpec, LinkStatus};
pub use mailbox::Mailbox;
pub use store::{ApplyOutcome, ArtifactStore, MergePolicy, RejectReason};
