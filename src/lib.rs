//! sentinel-hud - live force-directed graph HUD for the Sentinel agent dashboard.
//!
//! The dashboard API is polled for a `{entities, relations}` snapshot; each
//! snapshot becomes a simulator generation laid out by a small force
//! simulation running on its own thread, and the resulting positions stream
//! out as [`render::Frame`]s for rendering.
//!
//! ```text
//!   fetcher ──Snapshot──▶ supervisor ──INIT/TICK──▶ worker (simulation)
//!                              ▲                         │
//!                              └────── TICK replies ─────┘
//!                              │
//!                              └──Frame──▶ render / server
//! ```

pub mod config;
pub mod fetcher;
pub mod import;
pub mod protocol;
pub mod render;
pub mod server;
pub mod simulation;
pub mod snapshot;
pub mod supervisor;
pub mod worker;
