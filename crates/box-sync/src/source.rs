//! Source side of a sync connection
//!
//! [`SyncSource`] listens to a graph and turns each committed transaction
//! into one batch of [`UpdateTask`]s. Updates are captured as owned tasks the
//! moment they are emitted; a rolled back transaction sends nothing.

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::message::SyncMessage;
use crate::sync::Synchronization;
use crate::task::UpdateTask;
use box_graph::{BoxGraph, GraphError, SubscriptionId, TransactionEvent};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct Shared<S> {
    sync: S,
    buffer: Vec<UpdateTask>,
    since_checksum: u32,
    batches: u64,
    reloaded: bool,
    error: Option<SyncError>,
}

impl<S: Synchronization> Shared<S> {
    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let tasks = std::mem::take(&mut self.buffer);
        tracing::debug!(tasks = tasks.len(), "sending batch");
        match self.sync.send_updates(tasks) {
            Ok(()) => {
                self.batches += 1;
                self.since_checksum = self.since_checksum.saturating_add(1);
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to send batch");
                self.error = Some(err);
            }
        }
    }
}

/// Streams a graph's committed changes through a [`Synchronization`]
#[derive(Debug)]
pub struct SyncSource<S> {
    shared: Arc<Mutex<Shared<S>>>,
    config: SyncConfig,
    subscriptions: [SubscriptionId; 2],
}

impl<S: Synchronization + 'static> SyncSource<S> {
    /// Start listening to `graph`
    ///
    /// Only changes committed from now on are sent; call
    /// [`Self::send_snapshot`] first when the target starts empty and the
    /// graph does not.
    pub fn attach(graph: &mut BoxGraph, sync: S, config: SyncConfig) -> Self {
        let shared = Arc::new(Mutex::new(Shared {
            sync,
            buffer: Vec::new(),
            since_checksum: 0,
            batches: 0,
            reloaded: false,
            error: None,
        }));

        let capture = Arc::clone(&shared);
        let updates = graph.subscribe_all(move |update| {
            capture.lock().buffer.push(UpdateTask::from(update));
        });
        let lifecycle = Arc::clone(&shared);
        let transactions = graph.subscribe_transactions(move |event| {
            let mut shared = lifecycle.lock();
            match event {
                TransactionEvent::Committed => shared.flush(),
                TransactionEvent::RolledBack => shared.buffer.clear(),
                TransactionEvent::Reloaded => shared.reloaded = true,
                TransactionEvent::Began => {}
            }
        });
        tracing::debug!(channel = %config.channel, "sync source attached");

        Self {
            shared,
            config,
            subscriptions: [updates, transactions],
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Batches sent so far
    #[must_use]
    pub fn batches_sent(&self) -> u64 {
        self.shared.lock().batches
    }

    /// Send a checksum when `checksum_interval` batches went out since the last one
    ///
    /// Returns whether a checksum was sent. Nothing is sent while the graph
    /// has an open transaction.
    ///
    /// # Errors
    /// Returns the transport error
    pub fn maybe_send_checksum(&mut self, graph: &BoxGraph) -> Result<bool, SyncError> {
        let interval = self.config.checksum_interval;
        if interval == 0 || graph.in_transaction() {
            return Ok(false);
        }
        let mut shared = self.shared.lock();
        if shared.since_checksum < interval {
            return Ok(false);
        }
        let checksum = graph.checksum();
        shared.sync.checksum(checksum)?;
        shared.since_checksum = 0;
        tracing::info!(%checksum, batches = shared.batches, "checksum sent");
        Ok(true)
    }

    /// Send the whole graph so the target can replace its state
    ///
    /// # Errors
    /// Returns [`GraphError::TransactionInProgress`] while a transaction is
    /// open, or the transport error
    pub fn send_snapshot(&mut self, graph: &BoxGraph) -> Result<(), SyncError> {
        if graph.in_transaction() {
            return Err(GraphError::TransactionInProgress.into());
        }
        let snapshot = graph.to_snapshot();
        let mut shared = self.shared.lock();
        tracing::info!(bytes = snapshot.len(), boxes = graph.box_count(), "sending snapshot");
        shared.sync.snapshot(snapshot)?;
        shared.since_checksum = 0;
        shared.reloaded = false;
        Ok(())
    }

    /// Periodic work: a snapshot after the graph was reloaded, else a due checksum
    ///
    /// # Errors
    /// Returns the transport error, or one recorded by a listener since the
    /// last call
    pub fn poll(&mut self, graph: &BoxGraph) -> Result<(), SyncError> {
        if let Some(err) = self.take_error() {
            return Err(err);
        }
        let reloaded = self.shared.lock().reloaded;
        if reloaded {
            return self.send_snapshot(graph);
        }
        self.maybe_send_checksum(graph).map(|_| ())
    }

    /// React to a message sent back by the target
    ///
    /// # Errors
    /// Returns [`SyncError::Unexpected`] for anything but a snapshot request
    pub fn handle(&mut self, graph: &BoxGraph, message: SyncMessage) -> Result<(), SyncError> {
        match message {
            SyncMessage::RequestSnapshot => {
                tracing::info!("target requested a snapshot");
                self.send_snapshot(graph)
            }
            other => Err(SyncError::Unexpected(other.kind())),
        }
    }

    /// Run `f` with the transport
    pub fn with_sync<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.shared.lock().sync)
    }

    /// Transport error raised inside a graph listener, if any
    pub fn take_error(&mut self) -> Option<SyncError> {
        self.shared.lock().error.take()
    }

    /// Stop listening and hand the transport back
    ///
    /// Tasks of a transaction still open are discarded.
    pub fn detach(self, graph: &mut BoxGraph) -> Option<S> {
        for id in self.subscriptions {
            graph.unsubscribe(id);
        }
        tracing::debug!(channel = %self.config.channel, "sync source detached");
        Arc::try_unwrap(self.shared)
            .ok()
            .map(|shared| shared.into_inner().sync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use box_core::Address;
    use box_graph::Editing;
    use box_test_utils::{build_project, graph, keys};

    fn attached(interval: u32) -> (BoxGraph, SyncSource<Vec<SyncMessage>>) {
        let mut graph = graph();
        let config = SyncConfig {
            checksum_interval: interval,
            ..SyncConfig::default()
        };
        let source = SyncSource::attach(&mut graph, Vec::new(), config);
        (graph, source)
    }

    fn sent(source: &SyncSource<Vec<SyncMessage>>) -> Vec<SyncMessage> {
        source.with_sync(|messages| messages.clone())
    }

    #[test]
    fn one_batch_per_commit() {
        let (mut graph, source) = attached(0);
        let project = build_project(&mut graph).unwrap();
        let mut editing = Editing::default();
        let label = Address::compose(project.unit, &[keys::UNIT_LABEL]);
        editing.modify(&mut graph, |g| g.set_primitive(&label, "Bass")).unwrap();

        let messages = sent(&source);
        assert_eq!(messages.len(), 2);
        let SyncMessage::Updates(first) = &messages[0] else {
            panic!("expected updates, got {:?}", messages[0]);
        };
        assert_eq!(first.len(), 4);
        assert!(first.iter().all(|task| matches!(task, UpdateTask::New { .. })));
        assert_eq!(
            messages[1],
            SyncMessage::Updates(vec![UpdateTask::Primitive {
                address: label,
                value: "Bass".into(),
            }])
        );
    }

    #[test]
    fn rolled_back_transactions_send_nothing() {
        let (mut graph, source) = attached(0);
        graph.begin_transaction().unwrap();
        graph.create(box_test_utils::AUDIO_UNIT, |_| Ok(())).unwrap();
        graph.rollback().unwrap();
        assert!(sent(&source).is_empty());
        assert_eq!(source.batches_sent(), 0);
    }

    #[test]
    fn checksum_follows_interval() {
        let (mut graph, mut source) = attached(2);
        build_project(&mut graph).unwrap();
        assert!(!source.maybe_send_checksum(&graph).unwrap());
        build_project(&mut graph).unwrap();
        assert!(source.maybe_send_checksum(&graph).unwrap());
        assert_eq!(
            sent(&source).last(),
            Some(&SyncMessage::Checksum(graph.checksum()))
        );
        assert!(!source.maybe_send_checksum(&graph).unwrap());
    }

    #[test]
    fn snapshot_request_is_answered() {
        let (mut graph, mut source) = attached(0);
        build_project(&mut graph).unwrap();
        source.handle(&graph, SyncMessage::RequestSnapshot).unwrap();
        assert_eq!(
            sent(&source).last(),
            Some(&SyncMessage::Snapshot(graph.to_snapshot()))
        );
        assert!(matches!(
            source.handle(&graph, SyncMessage::Updates(Vec::new())),
            Err(SyncError::Unexpected("updates"))
        ));
    }

    #[test]
    fn reload_triggers_snapshot_on_poll() {
        let (mut graph, mut source) = attached(0);
        build_project(&mut graph).unwrap();
        let saved = graph.to_snapshot();
        graph.load_snapshot(saved.clone()).unwrap();
        source.poll(&graph).unwrap();
        assert_eq!(sent(&source).last(), Some(&SyncMessage::Snapshot(saved)));
    }

    #[test]
    fn detach_returns_the_transport() {
        let (mut graph, source) = attached(0);
        build_project(&mut graph).unwrap();
        let messages = source.detach(&mut graph).unwrap();
        assert_eq!(messages.len(), 1);
        build_project(&mut graph).unwrap();
    }
}
