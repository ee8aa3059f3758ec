//! Adapter registry lifecycle against an edited graph

use box_adapters::{
    label_of, AdapterError, BoxAdapter, BoxAdapters, ParameterAdapterSet, ValueMapping,
};
use box_core::{Address, BoxId, PrimitiveValue};
use box_graph::{BoxGraph, DeleteMode, Editing};
use box_test_utils::{add_automation, build_project, graph, keys, random_edit, AUDIO_UNIT};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct UnitAdapter {
    uuid: BoxId,
    label: String,
    parameters: ParameterAdapterSet,
    terminated: Arc<AtomicUsize>,
}

impl UnitAdapter {
    fn create(
        graph: &mut BoxGraph,
        uuid: BoxId,
        terminated: Arc<AtomicUsize>,
    ) -> Result<Self, AdapterError> {
        let mut parameters = ParameterAdapterSet::new();
        parameters.bind(
            graph,
            Address::compose(uuid, &[keys::UNIT_VOLUME]),
            ValueMapping::UNIPOLAR,
        )?;
        parameters.bind(
            graph,
            Address::compose(uuid, &[keys::UNIT_PANNING]),
            ValueMapping::BIPOLAR,
        )?;
        Ok(Self {
            uuid,
            label: label_of(graph, uuid)?,
            parameters,
            terminated,
        })
    }

    fn volume(&self) -> Option<PrimitiveValue> {
        self.parameters
            .get(&Address::compose(self.uuid, &[keys::UNIT_VOLUME]))
            .map(|parameter| parameter.value())
    }
}

impl BoxAdapter for UnitAdapter {
    fn uuid(&self) -> BoxId {
        self.uuid
    }

    fn schema_name(&self) -> &str {
        AUDIO_UNIT
    }

    fn terminate(&mut self, graph: &mut BoxGraph) {
        self.parameters.terminate_all(graph);
        self.terminated.fetch_add(1, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn registry(graph: &mut BoxGraph) -> (BoxAdapters, Arc<AtomicUsize>) {
    let terminated = Arc::new(AtomicUsize::new(0));
    let mut adapters = BoxAdapters::attach(graph);
    let counter = Arc::clone(&terminated);
    adapters.register(AUDIO_UNIT, move |graph, uuid| {
        Ok(Box::new(UnitAdapter::create(graph, uuid, Arc::clone(&counter))?) as Box<dyn BoxAdapter>)
    });
    (adapters, terminated)
}

#[test]
fn unit_adapter_follows_its_parameters() {
    let mut graph = graph();
    let mut editing = Editing::default();
    let project = build_project(&mut graph).unwrap();
    let (mut adapters, _) = registry(&mut graph);

    let unit = adapters
        .adapter_as::<UnitAdapter>(&mut graph, project.unit)
        .unwrap()
        .unwrap();
    assert_eq!(unit.label, "Drums");
    assert_eq!(unit.volume(), Some(PrimitiveValue::Float32(0.8)));

    let volume = Address::compose(project.unit, &[keys::UNIT_VOLUME]);
    editing
        .modify(&mut graph, |g| g.set_primitive(&volume, 0.3f32))
        .unwrap();
    editing
        .modify(&mut graph, |g| {
            add_automation(g, &mut rand::thread_rng(), volume.clone())
        })
        .unwrap();

    let unit = adapters
        .adapter_as::<UnitAdapter>(&mut graph, project.unit)
        .unwrap()
        .unwrap();
    assert_eq!(unit.volume(), Some(PrimitiveValue::Float32(0.3)));
    let parameter = unit.parameters.get(&volume).unwrap();
    assert!(parameter.is_controlled());
    assert!(!unit
        .parameters
        .get(&Address::compose(project.unit, &[keys::UNIT_PANNING]))
        .unwrap()
        .is_controlled());
}

#[test]
fn adapters_survive_undo_of_their_deletion() {
    let mut graph = graph();
    let mut editing = Editing::default();
    let project = build_project(&mut graph).unwrap();
    let (mut adapters, terminated) = registry(&mut graph);
    adapters.adapter_for(&mut graph, project.unit).unwrap();

    editing
        .modify(&mut graph, |g| g.delete_box(project.unit, DeleteMode::Cascade))
        .unwrap();
    editing.undo(&mut graph).unwrap();
    assert_eq!(adapters.collect(&mut graph), 0);
    assert_eq!(terminated.load(Ordering::SeqCst), 0);

    editing.redo(&mut graph).unwrap();
    assert_eq!(adapters.collect(&mut graph), 1);
    assert_eq!(terminated.load(Ordering::SeqCst), 1);
    assert!(adapters.is_empty());
}

#[test]
fn detach_terminates_everything() {
    let mut graph = graph();
    let project = build_project(&mut graph).unwrap();
    let (mut adapters, terminated) = registry(&mut graph);
    adapters.adapter_for(&mut graph, project.unit).unwrap();
    adapters.detach(&mut graph);
    assert_eq!(terminated.load(Ordering::SeqCst), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn adapters_only_exist_for_live_boxes(seed in any::<u64>(), steps in 1usize..40) {
        let mut graph = graph();
        let mut editing = Editing::default();
        let mut rng = StdRng::seed_from_u64(seed);
        let (mut adapters, _) = registry(&mut graph);

        for _ in 0..steps {
            let _ = random_edit(&mut editing, &mut graph, &mut rng);
            let units: Vec<BoxId> = graph.boxes_named(AUDIO_UNIT).map(|node| node.uuid()).collect();
            for unit in units {
                adapters.adapter_for(&mut graph, unit).unwrap();
            }
        }
        adapters.collect(&mut graph);
        prop_assert_eq!(adapters.len(), graph.boxes_named(AUDIO_UNIT).count());
    }
}
