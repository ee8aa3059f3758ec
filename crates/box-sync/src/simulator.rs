//! Sync simulator
//!
//! Drives random edits (including undo and redo) on a source graph, mirrors
//! them through an in-process channel to a replica and checks that both end
//! up identical:
//! 1. Every step: one edit, then the source polls and both sides drain
//!    their channels
//! 2. Optionally every n-th batch is dropped in transit, so divergence is
//!    detected by checksum or by a rejected batch and repaired by snapshot
//! 3. Finally a checksum is forced and the replica must match exactly

use crate::config::Settings;
use crate::error::SyncError;
use crate::source::SyncSource;
use crate::sync::Synchronization;
use crate::target::SyncTarget;
use crate::task::UpdateTask;
use crate::transport::{channel_pair, ChannelSynchronization, Messenger};
use box_graph::{BoxGraph, Checksum, Editing};
use box_test_utils::{random_edit, registry};
use bytes::Bytes;
use rand::{rngs::StdRng, SeedableRng};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of random edits
    pub steps: u64,
    /// Drop every n-th batch in transit; 0 keeps all
    pub drop_every: u64,
    pub settings: Settings,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            steps: 500,
            drop_every: 0,
            settings: Settings::default(),
        }
    }
}

/// A problem detected during simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Sync traffic failed in a way a snapshot could not repair
    Sync { step: u64, error: String },
    /// A graph's reverse index disagrees with its pointer fields
    HubInconsistent { replica: bool, error: String },
    /// Replica state differs from the source after the final exchange
    Diverged { source: Checksum, replica: Checksum },
}

/// Statistics for simulation
#[derive(Debug, Clone, Default)]
pub struct SimulatorStats {
    pub edits: BTreeMap<String, u64>,
    pub edits_rejected: u64,
    pub batches_sent: u64,
    pub batches_dropped: u64,
    pub batches_applied: u64,
    pub resyncs: u64,
    pub source_boxes: usize,
    pub replica_boxes: usize,
}

/// Final report from simulator
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    pub config: SimulatorConfig,
    pub stats: SimulatorStats,
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    /// Check if simulation passed all criteria
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        let stats = &self.stats;

        report.push_str("=== Box Graph Sync Simulator Report ===\n\n");
        let _ = writeln!(report, "Seed: {}", self.config.seed);
        let _ = writeln!(report, "Steps: {}", self.config.steps);
        for (edit, count) in &stats.edits {
            let _ = writeln!(report, "  {edit}: {count}");
        }
        let _ = writeln!(report, "Edits Rejected: {}", stats.edits_rejected);
        let _ = writeln!(report, "Batches Sent: {}", stats.batches_sent);
        let _ = writeln!(report, "Batches Dropped: {}", stats.batches_dropped);
        let _ = writeln!(report, "Batches Applied: {}", stats.batches_applied);
        let _ = writeln!(report, "Resyncs: {}", stats.resyncs);
        let _ = writeln!(report, "Source Boxes: {}", stats.source_boxes);
        let _ = writeln!(report, "Replica Boxes: {}", stats.replica_boxes);
        let _ = writeln!(report, "Violations: {}", self.violations.len());

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                let _ = writeln!(report, "{}. {v:?}", i + 1);
            }
        }

        let _ = write!(
            report,
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }
}

/// Drops every n-th update batch
#[derive(Debug)]
struct Lossy<S> {
    inner: S,
    every: u64,
    seen: u64,
    dropped: u64,
}

impl<S: Synchronization> Synchronization for Lossy<S> {
    fn send_updates(&mut self, tasks: Vec<UpdateTask>) -> Result<(), SyncError> {
        self.seen += 1;
        if self.every > 0 && self.seen % self.every == 0 {
            self.dropped += 1;
            tracing::debug!(tasks = tasks.len(), "dropping batch in transit");
            return Ok(());
        }
        self.inner.send_updates(tasks)
    }

    fn checksum(&mut self, checksum: Checksum) -> Result<(), SyncError> {
        self.inner.checksum(checksum)
    }

    fn snapshot(&mut self, snapshot: Bytes) -> Result<(), SyncError> {
        self.inner.snapshot(snapshot)
    }
}

struct Session {
    graph: BoxGraph,
    replica: BoxGraph,
    source: SyncSource<Lossy<ChannelSynchronization>>,
    replies: ChannelSynchronization,
    target: SyncTarget,
    inbound: ChannelSynchronization,
}

impl Session {
    fn new(config: &SimulatorConfig) -> Self {
        let settings = &config.settings;
        let (left, right) = channel_pair();
        let outbound = ChannelSynchronization::new(Messenger::new(left).channel(&settings.sync.channel));
        let inbound = ChannelSynchronization::new(Messenger::new(right).channel(&settings.sync.channel));
        let replies = outbound.clone();

        let mut graph = BoxGraph::with_config(registry(), settings.graph.clone());
        let lossy = Lossy {
            inner: outbound,
            every: config.drop_every,
            seen: 0,
            dropped: 0,
        };
        let source = SyncSource::attach(&mut graph, lossy, settings.sync.clone());
        Self {
            graph,
            replica: BoxGraph::with_config(registry(), settings.graph.clone()),
            source,
            replies,
            target: SyncTarget::new(settings.sync.clone()),
            inbound,
        }
    }

    /// Deliver everything in flight in both directions until quiet
    fn exchange(&mut self) -> Result<(), SyncError> {
        loop {
            let mut moved = false;
            while let Some(message) = self.inbound.receive()? {
                moved = true;
                if let Some(reply) = self.target.handle(&mut self.replica, message)? {
                    self.inbound.post(&reply)?;
                }
            }
            while let Some(message) = self.replies.receive()? {
                moved = true;
                self.source.handle(&self.graph, message)?;
            }
            if !moved {
                return Ok(());
            }
        }
    }

    fn step(&mut self) -> Result<(), SyncError> {
        self.source.poll(&self.graph)?;
        self.exchange()
    }

    fn finish(&mut self) -> Result<(), SyncError> {
        self.source.poll(&self.graph)?;
        let checksum = self.graph.checksum();
        self.source.with_sync(|sync| sync.checksum(checksum))?;
        self.exchange()
    }
}

/// Run the sync simulator
#[must_use]
pub fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut editing = Editing::new(config.settings.editing.clone());
    let mut session = Session::new(&config);
    let mut stats = SimulatorStats::default();
    let mut violations = Vec::new();

    for step in 0..config.steps {
        match random_edit(&mut editing, &mut session.graph, &mut rng) {
            Ok(edit) => *stats.edits.entry(format!("{edit:?}")).or_default() += 1,
            Err(err) => {
                tracing::debug!(step, error = %err, "edit rejected");
                stats.edits_rejected += 1;
            }
        }
        if let Err(err) = session.step() {
            violations.push(Violation::Sync {
                step,
                error: err.to_string(),
            });
            break;
        }
    }
    if violations.is_empty() {
        if let Err(err) = session.finish() {
            violations.push(Violation::Sync {
                step: config.steps,
                error: err.to_string(),
            });
        }
    }

    for (replica, graph) in [(false, &session.graph), (true, &session.replica)] {
        if let Err(err) = graph.verify_pointer_hubs() {
            violations.push(Violation::HubInconsistent {
                replica,
                error: err.to_string(),
            });
        }
    }
    let (source, replica) = (session.graph.checksum(), session.replica.checksum());
    if source != replica {
        violations.push(Violation::Diverged { source, replica });
    }

    let (sent, dropped) = session
        .source
        .with_sync(|lossy| (lossy.seen, lossy.dropped));
    stats.batches_sent = sent;
    stats.batches_dropped = dropped;
    stats.batches_applied = session.target.batches_applied();
    stats.resyncs = session.target.resyncs();
    stats.source_boxes = session.graph.box_count();
    stats.replica_boxes = session.replica.box_count();
    tracing::info!(
        seed = config.seed,
        steps = config.steps,
        violations = violations.len(),
        "simulation finished"
    );

    SimulatorReport {
        config,
        stats,
        violations,
    }
}
