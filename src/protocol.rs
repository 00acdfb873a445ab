//! Worker message protocol
//!
//! The simulator lives behind an isolation boundary and only speaks these
//! messages. They serialize to the same JSON shapes the dashboard's web
//! worker used, so the boundary stays a wire contract even in-process:
//!
//! ```text
//!   {"type":"INIT","data":{"nodes":[{"id":0,"x":50.0,"y":50.0}],"connections":[{"i":0,"j":1,"opacity":1.0}]}}
//!   {"type":"TICK"}                                  (request)
//!   {"type":"TICK","nodes":[{"id":0,"x":50.0,"y":50.0}]}   (reply)
//! ```

use serde::{Deserialize, Serialize};

/// A node position as it crosses the worker boundary.
///
/// `id` is the dense generation index, never the entity name.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: usize,
    pub x: f32,
    pub y: f32,
}

/// A drawable connection between two node indices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub i: usize,
    pub j: usize,
    /// Base opacity in `[0, 1]`; doubles as the spring strength when
    /// link forces are enabled.
    pub opacity: f32,
}

/// Payload of an `INIT` message: the full state of one generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitData {
    pub nodes: Vec<NodePosition>,
    pub connections: Vec<Connection>,
}

/// Messages accepted by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerRequest {
    /// Replace all simulator state with a new generation.
    Init { data: InitData },
    /// Advance one step and reply with positions.
    Tick,
}

/// Messages emitted by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerReply {
    Tick { nodes: Vec<NodePosition> },
}

impl WorkerReply {
    /// Positions carried by the reply.
    pub fn nodes(&self) -> &[NodePosition] {
        match self {
            WorkerReply::Tick { nodes } => nodes,
        }
    }

    pub fn into_nodes(self) -> Vec<NodePosition> {
        match self {
            WorkerReply::Tick { nodes } => nodes,
        }
    }
}

impl WorkerRequest {
    /// Decode a request from its JSON wire form.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
