//! Box Sync
//!
//! Keeps replica graphs in other execution contexts consistent with a source
//! graph by message passing only. Each committed transaction on the source
//! becomes one batch of [`UpdateTask`]s that the target applies atomically;
//! periodic checksums detect divergence and a full snapshot repairs it.
//!
//! # Core Concepts
//!
//! - [`SyncSource`]: captures updates as owned tasks and flushes on commit
//! - [`SyncTarget`]: replays batches, verifies checksums, requests snapshots
//! - [`Synchronization`]: transport-agnostic outbound interface
//! - [`Messenger`]: named channels multiplexed over one [`Port`]
//! - [`SyncMessage`]: updates, checksum, snapshot and snapshot request
//!
//! # Example
//!
//! ```rust
//! use box_sync::{SyncConfig, SyncMessage, SyncSource, SyncTarget};
//! use box_test_utils::{build_project, graph};
//!
//! let mut source_graph = graph();
//! let source = SyncSource::attach(&mut source_graph, Vec::new(), SyncConfig::default());
//! build_project(&mut source_graph)?;
//!
//! let mut replica = graph();
//! let mut target = SyncTarget::default();
//! for message in source.with_sync(std::mem::take) {
//!     assert_eq!(target.handle(&mut replica, message)?, None::<SyncMessage>);
//! }
//! assert_eq!(replica.checksum(), source_graph.checksum());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(unreachable_pub)]

mod config;
mod error;
mod message;
mod simulator;
mod source;
mod sync;
mod target;
mod task;
mod transport;

// Re-exports
pub use config::{Settings, SyncConfig, DEFAULT_CHANNEL};
pub use error::{CodecError, SyncError, TransportError};
pub use message::SyncMessage;
pub use simulator::{run_simulator, SimulatorConfig, SimulatorReport, SimulatorStats, Violation};
pub use source::SyncSource;
pub use sync::Synchronization;
pub use target::SyncTarget;
pub use task::UpdateTask;
pub use transport::{
    channel_pair, ChannelPort, ChannelSynchronization, Envelope, Messenger, MessengerChannel, Port,
    DEFAULT_INBOX_CAPACITY,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
