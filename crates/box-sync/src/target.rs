//! Target side of a sync connection

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::message::SyncMessage;
use crate::task::UpdateTask;
use box_graph::{BoxGraph, Checksum};
use bytes::Bytes;

/// Replays batches from a [`crate::SyncSource`] onto a replica graph
///
/// After a rejected batch or a checksum mismatch the target asks for a
/// snapshot and ignores incremental traffic until it arrives.
#[derive(Debug, Default)]
pub struct SyncTarget {
    config: SyncConfig,
    awaiting_resync: bool,
    batches: u64,
    resyncs: u64,
    divergence: Option<SyncError>,
}

impl SyncTarget {
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn is_awaiting_resync(&self) -> bool {
        self.awaiting_resync
    }

    #[inline]
    #[must_use]
    pub fn batches_applied(&self) -> u64 {
        self.batches
    }

    #[inline]
    #[must_use]
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Error that last forced a resync, if not yet taken
    pub fn take_divergence(&mut self) -> Option<SyncError> {
        self.divergence.take()
    }

    /// Apply one batch atomically
    ///
    /// Tasks run in order inside a single transaction, so pointers to boxes
    /// created later in the same batch resolve at commit.
    ///
    /// # Errors
    /// Returns [`SyncError::Rejected`] after rolling back when any task or
    /// the commit fails
    pub fn apply(&mut self, graph: &mut BoxGraph, tasks: &[UpdateTask]) -> Result<(), SyncError> {
        graph.begin_transaction()?;
        for task in tasks {
            if let Err(err) = task.apply(graph) {
                tracing::warn!(error = %err, tasks = tasks.len(), "batch rejected");
                graph.rollback()?;
                return Err(SyncError::Rejected(err));
            }
        }
        graph.commit().map_err(SyncError::Rejected)?;
        self.batches += 1;
        tracing::debug!(tasks = tasks.len(), boxes = graph.box_count(), "batch applied");
        Ok(())
    }

    /// Compare the replica against the source checksum
    ///
    /// # Errors
    /// Returns [`SyncError::ChecksumMismatch`] when they differ
    pub fn verify_checksum(&self, graph: &BoxGraph, remote: Checksum) -> Result<(), SyncError> {
        let local = graph.checksum();
        if local != remote {
            return Err(SyncError::ChecksumMismatch { local, remote });
        }
        tracing::info!(checksum = %local, "checksum verified");
        Ok(())
    }

    /// Replace the replica's state with a source snapshot
    ///
    /// # Errors
    /// Returns the decoding error; the replica is then unchanged
    pub fn resync(&mut self, graph: &mut BoxGraph, snapshot: Bytes) -> Result<(), SyncError> {
        graph.load_snapshot(snapshot)?;
        self.awaiting_resync = false;
        self.resyncs += 1;
        tracing::info!(boxes = graph.box_count(), resyncs = self.resyncs, "replica resynchronized");
        Ok(())
    }

    /// Dispatch one message, returning the reply for the source if any
    ///
    /// Divergence is answered with [`SyncMessage::RequestSnapshot`] and the
    /// cause is kept for [`Self::take_divergence`].
    ///
    /// # Errors
    /// Returns errors that a snapshot cannot repair
    pub fn handle(
        &mut self,
        graph: &mut BoxGraph,
        message: SyncMessage,
    ) -> Result<Option<SyncMessage>, SyncError> {
        let outcome = match message {
            SyncMessage::Updates(tasks) => {
                if self.awaiting_resync {
                    tracing::debug!(tasks = tasks.len(), "skipping batch while awaiting snapshot");
                    return Ok(None);
                }
                self.apply(graph, &tasks)
            }
            SyncMessage::Checksum(remote) => {
                if self.awaiting_resync || !self.config.verify_on_checksum {
                    return Ok(None);
                }
                self.verify_checksum(graph, remote)
            }
            SyncMessage::Snapshot(bytes) => self.resync(graph, bytes),
            SyncMessage::RequestSnapshot => Err(SyncError::Unexpected("request-snapshot")),
        };
        match outcome {
            Ok(()) => Ok(None),
            Err(err) if err.requires_resync() => {
                tracing::warn!(error = %err, "replica diverged, requesting snapshot");
                self.awaiting_resync = true;
                self.divergence = Some(err);
                Ok(Some(SyncMessage::RequestSnapshot))
            }
            Err(err) => Err(err),
        }
    }
}
