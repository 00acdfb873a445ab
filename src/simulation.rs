//! Force simulation for the HUD graph layout
//!
//! Implements the discrete-time layout step the HUD runs at its tick rate:
//! a centering pull, short-range pairwise repulsion, friction, and a hard
//! clamp to the normalized viewport `[0, 100]`.
//!
//! Repulsion is evaluated for every node pair, so a tick costs O(N²). The
//! HUD shows tens of entities; beyond a few hundred a spatial index would be
//! needed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{Connection, InitData, NodePosition};

/// Reasons an `INIT` payload is refused.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// A node index falls outside `[0, N)`
    #[error("node index {index} out of bounds for {len} nodes")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Two nodes claim the same index
    #[error("duplicate node index {0}")]
    DuplicateIndex(usize),

    /// A node position is NaN or infinite
    #[error("node {0} has a non-finite position")]
    NonFinite(usize),
}

/// A node with position and velocity for simulation
#[derive(Debug, Clone, PartialEq)]
pub struct SimNode {
    /// Dense index within the current generation
    pub index: usize,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

/// An edge for simulation (indices into node array)
#[derive(Debug, Clone, PartialEq)]
pub struct SimEdge {
    pub i: usize,
    pub j: usize,
    pub strength: f32,
}

/// Configuration for the force simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Point every node is pulled toward
    pub center: [f32; 2],
    /// Centering pull per unit of displacement
    pub center_strength: f32,
    /// Distance under which two nodes push each other apart
    pub repulsion_radius: f32,
    /// Repulsion per unit of overlap inside the radius
    pub repulsion_strength: f32,
    /// Velocity retained per tick
    pub friction: f32,
    /// Inclusive `[min, max]` bound for both coordinates
    pub bounds: [f32; 2],
    /// Spring strength along edges; zero leaves edges rendering-only
    pub link_strength: f32,
    /// Spring rest length
    pub link_distance: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            center: [50.0, 50.0],
            center_strength: 0.01,
            repulsion_radius: 20.0,
            repulsion_strength: 0.05,
            friction: 0.95,
            bounds: [0.0, 100.0],
            link_strength: 0.0,
            link_distance: 15.0,
        }
    }
}

impl SimulationConfig {
    fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.bounds[0], self.bounds[1])
    }
}

/// Layout simulation state for one generation
#[derive(Debug, Default)]
pub struct LayoutSimulation {
    nodes: Vec<SimNode>,
    edges: Vec<SimEdge>,
    config: SimulationConfig,
}

impl LayoutSimulation {
    /// Create an empty simulation
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            config,
        }
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[SimEdge] {
        &self.edges
    }

    /// Replace all state with a new generation.
    ///
    /// Node ids must cover `[0, N)` exactly once; otherwise the payload is
    /// refused and the previous generation stays in place. Connections that
    /// reference a missing node are filtered rather than refused. Returns the
    /// number of connections dropped.
    pub fn init(&mut self, data: InitData) -> Result<usize, SimulationError> {
        let len = data.nodes.len();
        let mut slots: Vec<Option<SimNode>> = vec![None; len];

        for node in &data.nodes {
            if node.id >= len {
                return Err(SimulationError::IndexOutOfBounds {
                    index: node.id,
                    len,
                });
            }
            if !node.x.is_finite() || !node.y.is_finite() {
                return Err(SimulationError::NonFinite(node.id));
            }
            if slots[node.id].is_some() {
                return Err(SimulationError::DuplicateIndex(node.id));
            }
            slots[node.id] = Some(SimNode {
                index: node.id,
                x: self.config.clamp(node.x),
                y: self.config.clamp(node.y),
                vx: 0.0,
                vy: 0.0,
            });
        }

        // Every slot is filled: len ids, all distinct, all below len.
        let nodes: Vec<SimNode> = slots.into_iter().flatten().collect();
        let edges = Self::filter_edges(&data.connections, len);
        let dropped = data.connections.len() - edges.len();

        self.nodes = nodes;
        self.edges = edges;
        Ok(dropped)
    }

    fn filter_edges(connections: &[Connection], len: usize) -> Vec<SimEdge> {
        connections
            .iter()
            .filter(|c| c.i < len && c.j < len && c.i != c.j && c.opacity.is_finite())
            .map(|c| SimEdge {
                i: c.i,
                j: c.j,
                strength: c.opacity.clamp(0.0, 1.0),
            })
            .collect()
    }

    /// Run one simulation tick and return the resulting positions.
    ///
    /// Nodes are updated in index order and each update sees the positions
    /// already written earlier in the same tick. No randomness is involved,
    /// so identical state and tick counts give bit-identical output.
    pub fn tick(&mut self) -> Vec<NodePosition> {
        if self.nodes.is_empty() {
            return Vec::new();
        }

        if self.config.link_strength > 0.0 {
            self.apply_link_force();
        }

        for index in 0..self.nodes.len() {
            self.apply_center_force(index);
            self.apply_repulsion(index);
            self.integrate(index);
        }

        self.positions()
    }

    /// Current positions without advancing the simulation
    pub fn positions(&self) -> Vec<NodePosition> {
        self.nodes
            .iter()
            .map(|n| NodePosition {
                id: n.index,
                x: n.x,
                y: n.y,
            })
            .collect()
    }

    fn apply_center_force(&mut self, index: usize) {
        let [cx, cy] = self.config.center;
        let k = self.config.center_strength;
        let node = &mut self.nodes[index];
        node.vx += (cx - node.x) * k;
        node.vy += (cy - node.y) * k;
    }

    /// Push `index` away from every node inside the repulsion radius
    fn apply_repulsion(&mut self, index: usize) {
        let radius = self.config.repulsion_radius;
        let k = self.config.repulsion_strength;
        let (x, y) = (self.nodes[index].x, self.nodes[index].y);

        let mut ax = 0.0;
        let mut ay = 0.0;
        for other in &self.nodes {
            if other.index == index {
                continue;
            }
            let dx = x - other.x;
            let dy = y - other.y;
            let dist = (dx * dx + dy * dy).sqrt().max(1.0);
            if dist >= radius {
                continue;
            }

            let force = (radius - dist) * k;
            if dx == 0.0 && dy == 0.0 {
                // Coincident nodes: split them along x by index order.
                ax += if index > other.index { force } else { -force };
            } else {
                ax += dx / dist * force;
                ay += dy / dist * force;
            }
        }

        let node = &mut self.nodes[index];
        node.vx += ax;
        node.vy += ay;
    }

    fn integrate(&mut self, index: usize) {
        let friction = self.config.friction;
        let [lo, hi] = self.config.bounds;
        let node = &mut self.nodes[index];
        node.vx *= friction;
        node.vy *= friction;
        node.x = (node.x + node.vx).clamp(lo, hi);
        node.y = (node.y + node.vy).clamp(lo, hi);
    }

    /// Apply spring force between connected nodes
    fn apply_link_force(&mut self) {
        for edge in &self.edges {
            let (source, target) = (edge.i, edge.j);

            let dx = self.nodes[target].x - self.nodes[source].x;
            let dy = self.nodes[target].y - self.nodes[source].y;

            let dist = (dx * dx + dy * dy).sqrt().max(1.0);

            // Hooke's law: F = k * (x - x0)
            let stretch = dist - self.config.link_distance;
            let force = self.config.link_strength * edge.strength * stretch / dist;

            let fx = force * dx;
            let fy = force * dy;

            self.nodes[source].vx += fx;
            self.nodes[source].vy += fy;
            self.nodes[target].vx -= fx;
            self.nodes[target].vy -= fy;
        }
    }
}
