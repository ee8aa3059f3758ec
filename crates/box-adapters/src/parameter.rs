//! Parameter adapters
//!
//! A [`ParameterAdapter`] mirrors one primitive field: its current value
//! (kept by a catch-up subscription) and the pointers attached to it, its
//! control sources (kept by a pointer-hub subscription). Writes go through
//! [`Editing`] so every change stays undoable.

use crate::error::AdapterError;
use crate::mapping::ValueMapping;
use box_core::{Address, PrimitiveValue};
use box_graph::{BoxGraph, Editing, HubEvent, SubscriptionId, TransactionEvent};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug)]
struct ParameterState {
    value: PrimitiveValue,
    sources: BTreeSet<Address>,
    stale: bool,
}

/// Observed view of one parameter field
#[derive(Debug)]
pub struct ParameterAdapter {
    address: Address,
    name: String,
    mapping: ValueMapping,
    state: Arc<Mutex<ParameterState>>,
    subscriptions: [SubscriptionId; 3],
}

impl ParameterAdapter {
    /// Start observing the primitive field at `address`
    ///
    /// # Errors
    /// Returns [`AdapterError::MappingMismatch`] when the field is not a
    /// primitive of the mapping's value type, or a graph error when the
    /// address does not resolve
    pub fn bind(
        graph: &mut BoxGraph,
        address: Address,
        mapping: ValueMapping,
    ) -> Result<Self, AdapterError> {
        let vertex = graph.find_vertex(&address)?;
        let name = vertex
            .node()
            .schema()
            .field_schema(address.keys())
            .map(|schema| schema.name.clone())
            .unwrap_or_default();
        let actual = vertex
            .field()
            .and_then(|field| field.as_primitive())
            .map(PrimitiveValue::primitive_type);
        if actual != Some(mapping.value_type()) {
            return Err(AdapterError::MappingMismatch {
                address,
                expected: mapping.value_type(),
                actual,
            });
        }
        let initial = graph.primitive(&address)?.clone();
        let state = Arc::new(Mutex::new(ParameterState {
            value: initial,
            sources: BTreeSet::new(),
            stale: false,
        }));

        let values = Arc::clone(&state);
        let value_subscription = graph.catchup_and_subscribe_primitive(address.clone(), move |value| {
            values.lock().value = value.clone();
        })?;
        let sources = Arc::clone(&state);
        let hub_subscription = graph.catchup_and_subscribe_hub(address.clone(), move |event| {
            let mut state = sources.lock();
            match event {
                HubEvent::Added { pointer, .. } => {
                    state.sources.insert(pointer.clone());
                }
                HubEvent::Removed { pointer, .. } => {
                    state.sources.remove(pointer);
                }
            }
        });
        let reloads = Arc::clone(&state);
        let reload_subscription = graph.subscribe_transactions(move |event| {
            if event == TransactionEvent::Reloaded {
                reloads.lock().stale = true;
            }
        });
        tracing::debug!(%address, %name, "parameter bound");

        Ok(Self {
            address,
            name,
            mapping,
            state,
            subscriptions: [value_subscription, hub_subscription, reload_subscription],
        })
    }

    #[inline]
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Schema name of the field
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn mapping(&self) -> ValueMapping {
        self.mapping
    }

    /// Last observed value
    #[must_use]
    pub fn value(&self) -> PrimitiveValue {
        self.state.lock().value.clone()
    }

    /// Last observed value as a unit position
    #[must_use]
    pub fn unit_value(&self) -> f32 {
        self.mapping.y(&self.state.lock().value).unwrap_or(0.0)
    }

    /// Pointers currently attached to the parameter, in address order
    #[must_use]
    pub fn control_sources(&self) -> Vec<Address> {
        self.state.lock().sources.iter().cloned().collect()
    }

    /// Check if anything (automation, modulation) controls the parameter
    #[must_use]
    pub fn is_controlled(&self) -> bool {
        !self.state.lock().sources.is_empty()
    }

    /// Check if the graph was reloaded since the last [`Self::refresh`]
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.state.lock().stale
    }

    /// Re-read value and control sources after the graph was reloaded
    ///
    /// # Errors
    /// Returns a graph error when the field no longer exists
    pub fn refresh(&self, graph: &BoxGraph) -> Result<(), AdapterError> {
        let value = graph.primitive(&self.address)?.clone();
        let sources = graph.incoming(&self.address).into_iter().collect();
        let mut state = self.state.lock();
        state.value = value;
        state.sources = sources;
        state.stale = false;
        Ok(())
    }

    /// Write a unit position as one undoable step
    ///
    /// # Errors
    /// Returns the graph error of the modification
    pub fn set_unit_value(
        &self,
        editing: &mut Editing,
        graph: &mut BoxGraph,
        unit: f32,
    ) -> Result<(), AdapterError> {
        let value = self.mapping.x(unit);
        editing.modify(graph, |g| g.set_primitive(&self.address, value))?;
        Ok(())
    }

    /// Stop observing
    pub fn terminate(self, graph: &mut BoxGraph) {
        for id in self.subscriptions {
            graph.unsubscribe(id);
        }
        tracing::debug!(address = %self.address, "parameter terminated");
    }
}

/// Parameters bound by address
#[derive(Debug, Default)]
pub struct ParameterAdapterSet {
    parameters: BTreeMap<Address, ParameterAdapter>,
}

impl ParameterAdapterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the parameter at `address`
    ///
    /// # Errors
    /// Returns [`AdapterError::AlreadyBound`] for a second binding of the
    /// same address, or the error of [`ParameterAdapter::bind`]
    pub fn bind(
        &mut self,
        graph: &mut BoxGraph,
        address: Address,
        mapping: ValueMapping,
    ) -> Result<&ParameterAdapter, AdapterError> {
        if self.parameters.contains_key(&address) {
            return Err(AdapterError::AlreadyBound(address));
        }
        let adapter = ParameterAdapter::bind(graph, address.clone(), mapping)?;
        Ok(self.parameters.entry(address).or_insert(adapter))
    }

    #[must_use]
    pub fn get(&self, address: &Address) -> Option<&ParameterAdapter> {
        self.parameters.get(address)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &ParameterAdapter> {
        self.parameters.values()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Refresh every parameter marked stale by a reload
    ///
    /// # Errors
    /// Returns the first refresh error
    pub fn refresh_stale(&self, graph: &BoxGraph) -> Result<(), AdapterError> {
        self.parameters
            .values()
            .filter(|parameter| parameter.is_stale())
            .try_for_each(|parameter| parameter.refresh(graph))
    }

    /// Terminate one parameter; `false` when it was not bound
    pub fn terminate(&mut self, graph: &mut BoxGraph, address: &Address) -> bool {
        match self.parameters.remove(address) {
            Some(parameter) => {
                parameter.terminate(graph);
                true
            }
            None => false,
        }
    }

    pub fn terminate_all(&mut self, graph: &mut BoxGraph) {
        for (_, parameter) in std::mem::take(&mut self.parameters) {
            parameter.terminate(graph);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use box_test_utils::{add_automation, build_project, graph, keys};
    use box_graph::DeleteMode;

    #[test]
    fn tracks_value_and_control_sources() {
        let mut graph = graph();
        let mut editing = Editing::default();
        let project = build_project(&mut graph).unwrap();
        let volume = Address::compose(project.unit, &[keys::UNIT_VOLUME]);
        let parameter = ParameterAdapter::bind(&mut graph, volume.clone(), ValueMapping::UNIPOLAR).unwrap();
        assert_eq!(parameter.name(), "volume");
        assert_eq!(parameter.value(), PrimitiveValue::Float32(0.8));
        assert!(!parameter.is_controlled());

        parameter.set_unit_value(&mut editing, &mut graph, 0.25).unwrap();
        assert_eq!(parameter.value(), PrimitiveValue::Float32(0.25));
        editing.undo(&mut graph).unwrap();
        assert_eq!(parameter.value(), PrimitiveValue::Float32(0.8));

        let automation = editing
            .modify(&mut graph, |g| add_automation(g, &mut rand::thread_rng(), volume.clone()))
            .unwrap();
        assert_eq!(
            parameter.control_sources(),
            vec![Address::compose(automation, &[keys::AUTOMATION_TARGET])]
        );
        editing
            .modify(&mut graph, |g| g.delete_box(automation, DeleteMode::Strict))
            .unwrap();
        assert!(!parameter.is_controlled());
    }

    #[test]
    fn catch_up_sees_existing_sources() {
        let mut graph = graph();
        let project = build_project(&mut graph).unwrap();
        let panning = Address::compose(project.unit, &[keys::UNIT_PANNING]);
        graph.begin_transaction().unwrap();
        add_automation(&mut graph, &mut rand::thread_rng(), panning.clone()).unwrap();
        graph.commit().unwrap();

        let parameter = ParameterAdapter::bind(&mut graph, panning, ValueMapping::BIPOLAR).unwrap();
        assert!(parameter.is_controlled());
        assert!((parameter.unit_value() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn mapping_must_fit_the_field() {
        let mut graph = graph();
        let project = build_project(&mut graph).unwrap();
        let mute = Address::compose(project.unit, &[keys::UNIT_MUTE]);
        assert!(matches!(
            ParameterAdapter::bind(&mut graph, mute.clone(), ValueMapping::UNIPOLAR),
            Err(AdapterError::MappingMismatch { .. })
        ));
        assert!(ParameterAdapter::bind(&mut graph, mute, ValueMapping::Boolean).is_ok());
    }

    #[test]
    fn reload_marks_parameters_stale() {
        let mut graph = graph();
        let project = build_project(&mut graph).unwrap();
        let volume = Address::compose(project.unit, &[keys::UNIT_VOLUME]);
        let mut set = ParameterAdapterSet::new();
        set.bind(&mut graph, volume.clone(), ValueMapping::UNIPOLAR).unwrap();

        let mut other = box_test_utils::graph();
        other.begin_transaction().unwrap();
        other
            .create_box_from_snapshot(
                box_test_utils::AUDIO_UNIT,
                project.unit,
                graph.require_box(project.unit).unwrap().encode(),
            )
            .unwrap();
        other.set_primitive(&volume, 0.1f32).unwrap();
        other.commit().unwrap();

        graph.load_snapshot(other.to_snapshot()).unwrap();
        let parameter = set.get(&volume).unwrap();
        assert!(parameter.is_stale());
        set.refresh_stale(&graph).unwrap();
        assert_eq!(set.get(&volume).unwrap().value(), PrimitiveValue::Float32(0.1));
        assert!(!set.get(&volume).unwrap().is_stale());
    }

    #[test]
    fn set_binds_once_and_terminates() {
        let mut graph = graph();
        let project = build_project(&mut graph).unwrap();
        let volume = Address::compose(project.unit, &[keys::UNIT_VOLUME]);
        let mut set = ParameterAdapterSet::new();
        set.bind(&mut graph, volume.clone(), ValueMapping::UNIPOLAR).unwrap();
        assert!(matches!(
            set.bind(&mut graph, volume.clone(), ValueMapping::UNIPOLAR),
            Err(AdapterError::AlreadyBound(_))
        ));
        assert!(set.terminate(&mut graph, &volume));
        assert!(!set.terminate(&mut graph, &volume));
        assert!(set.is_empty());
    }
}
