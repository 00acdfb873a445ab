//! Renderer adapter
//!
//! Read-only consumer of the simulator stream: takes a [`Frame`] of copied
//! positions and connections and projects it into drawable primitives in the
//! HUD's normalized `0..100` viewport, or straight into SVG.

use std::collections::HashMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::protocol::{Connection, NodePosition};

/// Stroke and fill color of the HUD
const ACCENT: &str = "#00f2ff";

/// Stats derived by the supervisor for each frame
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    /// Nodes in the current generation
    pub count: usize,
    /// Duration of the last successful poll, in milliseconds
    pub latency_ms: Option<u64>,
    pub generation: u64,
}

/// One renderable state of the HUD
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Frame {
    pub nodes: Vec<NodePosition>,
    pub connections: Vec<Connection>,
    pub stats: Stats,
}

/// Rendering options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Distance at which a connection fades to the minimum opacity
    pub link_fade_distance: f32,
    /// Floor for faded connections
    pub min_opacity: f32,
    /// Node radius in viewport units
    pub node_radius: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 800,
            link_fade_distance: 30.0,
            min_opacity: 0.1,
            node_radius: 0.6,
        }
    }
}

/// A drawable element in viewport coordinates
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        opacity: f32,
    },
    Node {
        cx: f32,
        cy: f32,
        r: f32,
    },
}

/// Project a frame into primitives, lines first so nodes draw on top.
///
/// Connections naming a node that is not in the frame are skipped.
pub fn project(frame: &Frame, config: &RenderConfig) -> Vec<Primitive> {
    let by_id: HashMap<usize, (f32, f32)> =
        frame.nodes.iter().map(|n| (n.id, (n.x, n.y))).collect();
    let lookup = |id: usize| by_id.get(&id).copied();

    let mut primitives = Vec::with_capacity(frame.connections.len() + frame.nodes.len());

    for connection in &frame.connections {
        let (Some((x1, y1)), Some((x2, y2))) = (lookup(connection.i), lookup(connection.j)) else {
            continue;
        };
        let dist = ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt();
        primitives.push(Primitive::Line {
            x1,
            y1,
            x2,
            y2,
            opacity: fade(connection.opacity, dist, config),
        });
    }

    for node in &frame.nodes {
        primitives.push(Primitive::Node {
            cx: node.x,
            cy: node.y,
            r: config.node_radius,
        });
    }

    primitives
}

/// Opacity falls off linearly with distance, never below the floor.
fn fade(base: f32, dist: f32, config: &RenderConfig) -> f32 {
    let falloff = if config.link_fade_distance > 0.0 {
        1.0 - dist / config.link_fade_distance
    } else {
        1.0
    };
    (base * falloff).clamp(config.min_opacity, 1.0)
}

/// Render primitives as a standalone SVG document
pub fn to_svg(primitives: &[Primitive], config: &RenderConfig) -> String {
    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"0 0 100 100\" preserveAspectRatio=\"none\">\n",
        config.width, config.height
    );

    // Writing to a String cannot fail.
    for primitive in primitives {
        let _ = match primitive {
            Primitive::Line {
                x1,
                y1,
                x2,
                y2,
                opacity,
            } => writeln!(
                svg,
                "<line x1=\"{x1:.2}\" y1=\"{y1:.2}\" x2=\"{x2:.2}\" y2=\"{y2:.2}\" stroke=\"{ACCENT}\" stroke-width=\"0.1\" stroke-opacity=\"{opacity:.2}\"/>"
            ),
            Primitive::Node { cx, cy, r } => writeln!(
                svg,
                "<circle cx=\"{cx:.2}\" cy=\"{cy:.2}\" r=\"{r:.2}\" fill=\"{ACCENT}\"/>"
            ),
        };
    }

    svg.push_str("</svg>\n");
    svg
}

/// Convenience: project and render in one step
pub fn frame_to_svg(frame: &Frame, config: &RenderConfig) -> String {
    to_svg(&project(frame, config), config)
}
