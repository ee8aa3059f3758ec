//! Box Graph Test Utilities
//!
//! A miniature DAW project schema plus builders shared by the workspace's
//! tests, property tests and the `boxgraph simulate` command.
//!
//! # Schema
//!
//! ```text
//! AudioUnit  <-(host, TRACK)-  Track  <-(track, REGION)-  AudioRegion  -(file, FILE)->  AudioFile
//!     ^ volume
//!     '-(target, AUTOMATION)-  Automation
//! ```
//!
//! Track hosts and region files are mandatory pointers, so deleting a unit
//! or a file cascades into its dependents.

#![warn(unreachable_pub)]

use box_core::{
    Address, BoxId, BoxSchema, Capability, FieldKey, FieldKind, FieldSchema, PointerRules,
    PrimitiveType, PrimitiveValue, SchemaRegistry,
};
use box_graph::{BoxGraph, DeleteMode, Editing, GraphConfig, GraphError};
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

/// Pointer types of the fixture schema
pub mod pointers {
    use box_core::PointerType;

    pub const TRACK: PointerType = PointerType::new(1);
    pub const REGION: PointerType = PointerType::new(2);
    pub const FILE: PointerType = PointerType::new(3);
    pub const AUTOMATION: PointerType = PointerType::new(4);
}

pub const AUDIO_UNIT: &str = "AudioUnit";
pub const TRACK: &str = "Track";
pub const AUDIO_REGION: &str = "AudioRegion";
pub const AUDIO_FILE: &str = "AudioFile";
pub const AUTOMATION: &str = "Automation";

/// Field keys of the fixture schema
pub mod keys {
    use box_core::FieldKey;

    pub const UNIT_LABEL: FieldKey = 1;
    pub const UNIT_ENABLED: FieldKey = 2;
    pub const UNIT_INDEX: FieldKey = 3;
    pub const UNIT_VOLUME: FieldKey = 4;
    pub const UNIT_PANNING: FieldKey = 5;
    pub const UNIT_MUTE: FieldKey = 6;
    pub const UNIT_TRACKS: FieldKey = 7;

    pub const TRACK_HOST: FieldKey = 1;
    pub const TRACK_INDEX: FieldKey = 2;
    pub const TRACK_ENABLED: FieldKey = 3;
    pub const TRACK_REGIONS: FieldKey = 4;

    pub const REGION_TRACK: FieldKey = 1;
    pub const REGION_POSITION: FieldKey = 2;
    pub const REGION_DURATION: FieldKey = 3;
    pub const REGION_LABEL: FieldKey = 4;
    pub const REGION_GAIN: FieldKey = 5;
    pub const REGION_MUTE: FieldKey = 6;
    pub const REGION_FILE: FieldKey = 7;

    pub const FILE_NAME: FieldKey = 1;
    pub const FILE_PEAKS: FieldKey = 2;

    pub const AUTOMATION_TARGET: FieldKey = 1;
    pub const AUTOMATION_VALUE: FieldKey = 2;
}

/// Fixture box schemas
#[must_use]
pub fn schemas() -> Vec<BoxSchema> {
    use keys::*;
    vec![
        BoxSchema::new(AUDIO_UNIT)
            .field(FieldSchema::string(UNIT_LABEL, "label", "Audio Unit"))
            .field(FieldSchema::boolean(UNIT_ENABLED, "enabled", true))
            .field(FieldSchema::int32(UNIT_INDEX, "index", 0))
            .field(
                FieldSchema::float32(UNIT_VOLUME, "volume", 0.8)
                    .with_rules(PointerRules::accepting(&[pointers::AUTOMATION])),
            )
            .field(
                FieldSchema::float32(UNIT_PANNING, "panning", 0.0)
                    .with_rules(PointerRules::accepting(&[pointers::AUTOMATION])),
            )
            .field(FieldSchema::boolean(UNIT_MUTE, "mute", false))
            .field(FieldSchema::target(
                UNIT_TRACKS,
                "tracks",
                PointerRules::accepting(&[pointers::TRACK]),
            ))
            .capability(Capability::Label, &[UNIT_LABEL])
            .capability(Capability::Enabled, &[UNIT_ENABLED])
            .capability(Capability::Index, &[UNIT_INDEX]),
        BoxSchema::new(TRACK)
            .field(FieldSchema::pointer(TRACK_HOST, "host", pointers::TRACK, true))
            .field(FieldSchema::int32(TRACK_INDEX, "index", 0))
            .field(FieldSchema::boolean(TRACK_ENABLED, "enabled", true))
            .field(FieldSchema::target(
                TRACK_REGIONS,
                "regions",
                PointerRules::accepting(&[pointers::REGION]),
            ))
            .capability(Capability::Host, &[TRACK_HOST])
            .capability(Capability::Enabled, &[TRACK_ENABLED])
            .capability(Capability::Index, &[TRACK_INDEX]),
        BoxSchema::new(AUDIO_REGION)
            .field(FieldSchema::pointer(REGION_TRACK, "track", pointers::REGION, true))
            .field(FieldSchema::int32(REGION_POSITION, "position", 0))
            .field(FieldSchema::int32(REGION_DURATION, "duration", 3840))
            .field(FieldSchema::string(REGION_LABEL, "label", ""))
            .field(FieldSchema::float32(REGION_GAIN, "gain", 1.0))
            .field(FieldSchema::boolean(REGION_MUTE, "mute", false))
            .field(FieldSchema::pointer(REGION_FILE, "file", pointers::FILE, true))
            .capability(Capability::Host, &[REGION_TRACK])
            .capability(Capability::Label, &[REGION_LABEL]),
        BoxSchema::new(AUDIO_FILE)
            .rules(PointerRules::accepting(&[pointers::FILE]))
            .field(FieldSchema::string(FILE_NAME, "name", ""))
            .field(FieldSchema::bytes(FILE_PEAKS, "peaks"))
            .capability(Capability::Label, &[FILE_NAME]),
        BoxSchema::new(AUTOMATION)
            .field(FieldSchema::pointer(
                AUTOMATION_TARGET,
                "target",
                pointers::AUTOMATION,
                false,
            ))
            .field(FieldSchema::float32(AUTOMATION_VALUE, "value", 0.0)),
    ]
}

/// Registry holding the fixture schemas
///
/// # Panics
/// Never in practice: the fixture schemas are valid
#[must_use]
pub fn registry() -> Arc<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    for schema in schemas() {
        if let Err(err) = registry.register(schema) {
            panic!("fixture schema rejected: {err}");
        }
    }
    Arc::new(registry)
}

/// Empty graph over the fixture registry
#[must_use]
pub fn graph() -> BoxGraph {
    BoxGraph::with_config(registry(), GraphConfig::default())
}

/// Ids of a small populated project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Project {
    pub unit: BoxId,
    pub track: BoxId,
    pub file: BoxId,
    pub region: BoxId,
}

/// Create a unit with one track holding one region, in a single transaction
///
/// # Errors
/// Returns graph errors (none expected on an empty graph)
pub fn build_project(graph: &mut BoxGraph) -> Result<Project, GraphError> {
    graph.begin_transaction()?;
    let project = populate(graph, &mut rand::thread_rng());
    match project {
        Ok(project) => {
            graph.commit()?;
            Ok(project)
        }
        Err(err) => {
            graph.rollback()?;
            Err(err)
        }
    }
}

/// Create a unit, track, file and region inside the open transaction
///
/// # Errors
/// Returns graph errors
pub fn populate<R: Rng + ?Sized>(graph: &mut BoxGraph, rng: &mut R) -> Result<Project, GraphError> {
    let unit = add_unit(graph, rng, "Drums")?;
    let track = add_track(graph, rng, unit)?;
    let (file, region) = add_region(graph, rng, track)?;
    Ok(Project {
        unit,
        track,
        file,
        region,
    })
}

/// Create an audio unit
///
/// # Errors
/// Returns graph errors
pub fn add_unit<R: Rng + ?Sized>(
    graph: &mut BoxGraph,
    rng: &mut R,
    label: &str,
) -> Result<BoxId, GraphError> {
    let index = i32::try_from(graph.boxes_named(AUDIO_UNIT).count()).unwrap_or(i32::MAX);
    graph.create_box(AUDIO_UNIT, BoxId::from_rng(rng), |init| {
        init.set(&[keys::UNIT_LABEL], label)?
            .set(&[keys::UNIT_INDEX], index)?;
        Ok(())
    })
}

/// Create a track hosted by `unit`
///
/// # Errors
/// Returns graph errors
pub fn add_track<R: Rng + ?Sized>(
    graph: &mut BoxGraph,
    rng: &mut R,
    unit: BoxId,
) -> Result<BoxId, GraphError> {
    let host = Address::compose(unit, &[keys::UNIT_TRACKS]);
    let index = i32::try_from(graph.incoming(&host).len()).unwrap_or(i32::MAX);
    graph.create_box(TRACK, BoxId::from_rng(rng), |init| {
        init.set_pointer(&[keys::TRACK_HOST], Some(host))?
            .set(&[keys::TRACK_INDEX], index)?;
        Ok(())
    })
}

/// Create an audio file and a region on `track` playing it
///
/// # Errors
/// Returns graph errors
pub fn add_region<R: Rng + ?Sized>(
    graph: &mut BoxGraph,
    rng: &mut R,
    track: BoxId,
) -> Result<(BoxId, BoxId), GraphError> {
    let peaks: Vec<u8> = (0..8).map(|_| rng.gen()).collect();
    let file = graph.create_box(AUDIO_FILE, BoxId::sha256(&peaks), |init| {
        init.set(&[keys::FILE_NAME], "take.wav")?
            .set(&[keys::FILE_PEAKS], peaks.clone())?;
        Ok(())
    })?;
    let position = rng.gen_range(0..64) * 960;
    let region = graph.create_box(AUDIO_REGION, BoxId::from_rng(rng), |init| {
        init.set_pointer(
            &[keys::REGION_TRACK],
            Some(Address::compose(track, &[keys::TRACK_REGIONS])),
        )?
        .set_pointer(&[keys::REGION_FILE], Some(Address::root(file)))?
        .set(&[keys::REGION_POSITION], position)?;
        Ok(())
    })?;
    Ok((file, region))
}

/// Create an automation box controlling `parameter`
///
/// # Errors
/// Returns graph errors
pub fn add_automation<R: Rng + ?Sized>(
    graph: &mut BoxGraph,
    rng: &mut R,
    parameter: Address,
) -> Result<BoxId, GraphError> {
    graph.create_box(AUTOMATION, BoxId::from_rng(rng), |init| {
        init.set_pointer(&[keys::AUTOMATION_TARGET], Some(parameter))?;
        Ok(())
    })
}

/// Kind of edit performed by [`random_edit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    AddUnit,
    AddTrack,
    AddRegion,
    AddAutomation,
    SetPrimitive,
    MoveRegion,
    Delete,
    Undo,
    Redo,
}

const EDITS: [Edit; 9] = [
    Edit::AddUnit,
    Edit::AddTrack,
    Edit::AddRegion,
    Edit::AddAutomation,
    Edit::SetPrimitive,
    Edit::MoveRegion,
    Edit::Delete,
    Edit::Undo,
    Edit::Redo,
];

/// Perform one random, schema-valid edit through `editing`
///
/// Edits that need boxes which do not exist fall back to adding a unit.
///
/// # Errors
/// Returns the graph error of a failed edit; the graph is then unchanged
pub fn random_edit<R: Rng + ?Sized>(
    editing: &mut Editing,
    graph: &mut BoxGraph,
    rng: &mut R,
) -> Result<Edit, GraphError> {
    let units = ids_named(graph, AUDIO_UNIT);
    let tracks = ids_named(graph, TRACK);
    let regions = ids_named(graph, AUDIO_REGION);
    let all: Vec<BoxId> = graph.boxes().map(|node| node.uuid()).collect();

    let mut edit = EDITS[rng.gen_range(0..EDITS.len())];
    let needs_fallback = match edit {
        Edit::AddTrack | Edit::AddAutomation => units.is_empty(),
        Edit::AddRegion => tracks.is_empty(),
        Edit::MoveRegion => regions.is_empty() || tracks.is_empty(),
        Edit::SetPrimitive | Edit::Delete => all.is_empty(),
        Edit::AddUnit | Edit::Undo | Edit::Redo => false,
    };
    if needs_fallback {
        edit = Edit::AddUnit;
    }

    match edit {
        Edit::AddUnit => {
            let label = ["Drums", "Bass", "Keys", "Vox"].choose(rng).copied().unwrap_or("Unit");
            editing.modify(graph, |g| add_unit(g, rng, label))?;
        }
        Edit::AddTrack => {
            let unit = pick(&units, rng)?;
            editing.modify(graph, |g| add_track(g, rng, unit))?;
        }
        Edit::AddRegion => {
            let track = pick(&tracks, rng)?;
            editing.modify(graph, |g| add_region(g, rng, track))?;
        }
        Edit::AddAutomation => {
            let unit = pick(&units, rng)?;
            let key = if rng.gen() { keys::UNIT_VOLUME } else { keys::UNIT_PANNING };
            editing.modify(graph, |g| add_automation(g, rng, Address::compose(unit, &[key])))?;
        }
        Edit::SetPrimitive => {
            let uuid = pick(&all, rng)?;
            let Some((key, value)) = random_primitive(graph, uuid, rng) else {
                return Ok(edit);
            };
            editing.modify(graph, |g| g.set_primitive(&Address::compose(uuid, &[key]), value))?;
        }
        Edit::MoveRegion => {
            let region = pick(&regions, rng)?;
            let track = pick(&tracks, rng)?;
            editing.modify(graph, |g| {
                g.set_pointer(
                    &Address::compose(region, &[keys::REGION_TRACK]),
                    Some(Address::compose(track, &[keys::TRACK_REGIONS])),
                )
            })?;
        }
        Edit::Delete => {
            let uuid = pick(&all, rng)?;
            editing.modify(graph, |g| g.delete_box(uuid, DeleteMode::Cascade))?;
        }
        Edit::Undo => {
            editing.undo(graph)?;
        }
        Edit::Redo => {
            editing.redo(graph)?;
        }
    }
    Ok(edit)
}

fn ids_named(graph: &BoxGraph, name: &str) -> Vec<BoxId> {
    graph.boxes_named(name).map(|node| node.uuid()).collect()
}

fn pick<R: Rng + ?Sized>(ids: &[BoxId], rng: &mut R) -> Result<BoxId, GraphError> {
    ids.choose(rng)
        .copied()
        .ok_or(GraphError::UnknownBox(BoxId::LOWEST))
}

fn random_primitive<R: Rng + ?Sized>(
    graph: &BoxGraph,
    uuid: BoxId,
    rng: &mut R,
) -> Option<(FieldKey, PrimitiveValue)> {
    let node = graph.get_box(uuid)?;
    let candidates: Vec<(FieldKey, PrimitiveType)> = node
        .schema()
        .fields
        .iter()
        .filter_map(|field| match &field.kind {
            FieldKind::Primitive { default } if default.primitive_type() != PrimitiveType::Bytes => {
                Some((field.key, default.primitive_type()))
            }
            _ => None,
        })
        .collect();
    let (key, ty) = *candidates.choose(rng)?;
    let value = match ty {
        PrimitiveType::Int32 => PrimitiveValue::Int32(rng.gen_range(0..10_000)),
        PrimitiveType::Float32 => PrimitiveValue::Float32(rng.gen_range(0.0..1.0)),
        PrimitiveType::Boolean => PrimitiveValue::Boolean(rng.gen()),
        PrimitiveType::String => PrimitiveValue::from(*["kick", "snare", "hat", "pad"].choose(rng)?),
        PrimitiveType::Bytes => return None,
    };
    Some((key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn fixture_schemas_validate() {
        let registry = registry();
        assert_eq!(registry.len(), 5);
        for schema in schemas() {
            schema.validate().unwrap();
        }
    }

    #[test]
    fn project_is_consistent() {
        let mut graph = graph();
        let project = build_project(&mut graph).unwrap();
        assert_eq!(graph.box_count(), 4);
        assert_eq!(
            graph.incoming(&Address::compose(project.track, &[keys::TRACK_REGIONS])),
            vec![Address::compose(project.region, &[keys::REGION_TRACK])]
        );
        graph.verify_pointer_hubs().unwrap();
    }

    #[test]
    fn random_edits_keep_hubs_consistent() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut graph = graph();
        let mut editing = Editing::default();
        for _ in 0..200 {
            let _ = random_edit(&mut editing, &mut graph, &mut rng);
            graph.verify_pointer_hubs().unwrap();
        }
    }
}
