//! Snapshot import
//!
//! Turns a fetched [`Snapshot`] into the `INIT` payload of a new simulation
//! generation. Entity names are mapped to dense indices in first-seen order;
//! the simulator never sees a name.

use std::collections::{HashMap, HashSet};

use crate::protocol::{Connection, InitData, NodePosition};
use crate::simulation::SimulationConfig;
use crate::snapshot::Snapshot;

/// Radius of the ring new nodes are placed on
const PLACEMENT_RADIUS: f32 = 30.0;

/// Base opacity of a relation-derived connection
const RELATION_OPACITY: f32 = 1.0;

/// A snapshot mapped onto one generation of indices
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedGraph {
    /// Entity name for each index
    pub entities: Vec<String>,
    pub init: InitData,
    /// Relations dropped for naming an unknown entity or pointing at themselves
    pub dropped_relations: usize,
}

impl ImportedGraph {
    /// Entity name behind a node index
    pub fn entity(&self, index: usize) -> Option<&str> {
        self.entities.get(index).map(String::as_str)
    }
}

/// Map a snapshot to a fresh generation.
///
/// Duplicate entities keep their first index. Relations naming an entity
/// outside the snapshot are dropped, and repeated relations between the same
/// pair (in either direction) collapse into one connection.
pub fn import_snapshot(snapshot: &Snapshot, config: &SimulationConfig) -> ImportedGraph {
    let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(snapshot.entities.len());
    let mut entities = Vec::with_capacity(snapshot.entities.len());
    for entity in &snapshot.entities {
        if !index_of.contains_key(entity.as_str()) {
            index_of.insert(entity.as_str(), entities.len());
            entities.push(entity.clone());
        }
    }

    let mut seen = HashSet::new();
    let mut connections = Vec::new();
    let mut dropped_relations = 0;
    for relation in &snapshot.relations {
        let endpoints = (
            index_of.get(relation.source.as_str()),
            index_of.get(relation.target.as_str()),
        );
        match endpoints {
            (Some(&i), Some(&j)) if i != j => {
                if seen.insert((i.min(j), i.max(j))) {
                    connections.push(Connection {
                        i,
                        j,
                        opacity: RELATION_OPACITY,
                    });
                }
            }
            _ => dropped_relations += 1,
        }
    }

    let total = entities.len();
    let nodes = (0..total)
        .map(|index| initial_position(index, total, config))
        .collect();

    ImportedGraph {
        entities,
        init: InitData { nodes, connections },
        dropped_relations,
    }
}

/// Distribute nodes on a ring around the center
fn initial_position(index: usize, total: usize, config: &SimulationConfig) -> NodePosition {
    let angle = std::f32::consts::TAU * (index as f32) / (total as f32);
    let [cx, cy] = config.center;
    let [lo, hi] = config.bounds;

    NodePosition {
        id: index,
        x: (cx + PLACEMENT_RADIUS * angle.cos()).clamp(lo, hi),
        y: (cy + PLACEMENT_RADIUS * angle.sin()).clamp(lo, hi),
    }
}
