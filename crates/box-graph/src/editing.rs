//! Undo/redo history
//!
//! [`Editing`] runs user procedures as graph transactions and keeps the
//! committed journals as [`Modification`]s. Undo replays a modification's
//! inverses newest first, redo replays it forward; both run as transactions
//! of their own so listeners and sync see ordinary updates.

use crate::config::EditingConfig;
use crate::error::GraphError;
use crate::graph::BoxGraph;
use crate::update::GraphUpdate;
use std::collections::VecDeque;

/// Updates committed by one user action
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Modification {
    updates: Vec<GraphUpdate>,
}

impl Modification {
    #[inline]
    #[must_use]
    pub fn updates(&self) -> &[GraphUpdate] {
        &self.updates
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Linear undo/redo history for one graph
#[derive(Debug, Default)]
pub struct Editing {
    config: EditingConfig,
    undo: VecDeque<Modification>,
    redo: Vec<Modification>,
}

impl Editing {
    #[must_use]
    pub fn new(config: EditingConfig) -> Self {
        Self {
            config,
            undo: VecDeque::new(),
            redo: Vec::new(),
        }
    }

    /// Check if a modification may start now
    ///
    /// Modifications do not nest: this is false while the graph has an open
    /// transaction.
    #[inline]
    #[must_use]
    pub fn can_modify(&self, graph: &BoxGraph) -> bool {
        !graph.in_transaction()
    }

    #[inline]
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    #[inline]
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Drop all history
    pub fn clear_history(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Run `procedure` as one undoable step
    ///
    /// If the procedure fails, or its transaction fails to commit, every
    /// write it made is rolled back before the error is returned. A step
    /// that changes nothing leaves history untouched.
    ///
    /// # Errors
    /// Returns [`GraphError::TransactionInProgress`] when called while a
    /// transaction is open, or the procedure's error
    pub fn modify<R, E, F>(&mut self, graph: &mut BoxGraph, procedure: F) -> Result<R, E>
    where
        E: From<GraphError>,
        F: FnOnce(&mut BoxGraph) -> Result<R, E>,
    {
        let (result, updates) = run_transaction(graph, procedure)?;
        if !updates.is_empty() {
            self.push(Modification { updates });
        }
        Ok(result)
    }

    /// Run `procedure` and merge its updates into the latest undo step
    ///
    /// Used for continuous gestures so that one undo reverts the whole
    /// gesture. Behaves like [`Self::modify`] when history is empty.
    ///
    /// # Errors
    /// Same as [`Self::modify`]
    pub fn append<R, E, F>(&mut self, graph: &mut BoxGraph, procedure: F) -> Result<R, E>
    where
        E: From<GraphError>,
        F: FnOnce(&mut BoxGraph) -> Result<R, E>,
    {
        let (result, updates) = run_transaction(graph, procedure)?;
        if updates.is_empty() {
            return Ok(result);
        }
        match self.undo.back_mut() {
            Some(last) => {
                last.updates.extend(updates);
                self.redo.clear();
            }
            None => self.push(Modification { updates }),
        }
        Ok(result)
    }

    /// Revert the latest step; `Ok(false)` when there is nothing to undo
    ///
    /// # Errors
    /// Returns the graph error if the inverse cannot be applied; the step
    /// stays on the undo stack and the graph is unchanged
    pub fn undo(&mut self, graph: &mut BoxGraph) -> Result<bool, GraphError> {
        let Some(modification) = self.undo.pop_back() else {
            return Ok(false);
        };
        let inverses: Vec<GraphUpdate> = modification
            .updates
            .iter()
            .rev()
            .map(GraphUpdate::inverse)
            .collect();
        if let Err(err) = replay(graph, &inverses) {
            self.undo.push_back(modification);
            return Err(err);
        }
        tracing::debug!(updates = modification.len(), "undo");
        self.redo.push(modification);
        Ok(true)
    }

    /// Re-apply the latest undone step; `Ok(false)` when there is nothing to redo
    ///
    /// # Errors
    /// Returns the graph error if the step cannot be applied; the step stays
    /// on the redo stack and the graph is unchanged
    pub fn redo(&mut self, graph: &mut BoxGraph) -> Result<bool, GraphError> {
        let Some(modification) = self.redo.pop() else {
            return Ok(false);
        };
        if let Err(err) = replay(graph, &modification.updates) {
            self.redo.push(modification);
            return Err(err);
        }
        tracing::debug!(updates = modification.len(), "redo");
        self.undo.push_back(modification);
        self.evict();
        Ok(true)
    }

    fn push(&mut self, modification: Modification) {
        self.undo.push_back(modification);
        self.redo.clear();
        self.evict();
    }

    fn evict(&mut self) {
        let limit = self.config.history_limit;
        while limit > 0 && self.undo.len() > limit {
            self.undo.pop_front();
        }
    }
}

fn run_transaction<R, E, F>(graph: &mut BoxGraph, procedure: F) -> Result<(R, Vec<GraphUpdate>), E>
where
    E: From<GraphError>,
    F: FnOnce(&mut BoxGraph) -> Result<R, E>,
{
    graph.begin_transaction()?;
    match procedure(graph) {
        Ok(result) => {
            let updates = graph.commit()?;
            Ok((result, updates))
        }
        Err(err) => {
            graph.rollback()?;
            Err(err)
        }
    }
}

fn replay(graph: &mut BoxGraph, updates: &[GraphUpdate]) -> Result<(), GraphError> {
    run_transaction(graph, |graph| {
        updates.iter().try_for_each(|update| graph.apply(update))
    })
    .map(|((), _)| ())
}
