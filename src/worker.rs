//! Isolated simulator worker
//!
//! The simulator owns its node and edge arrays on a dedicated OS thread and
//! is reachable only through an ordered inbox. Replies stream back on a
//! channel as copies; nothing outside the thread holds a reference into
//! simulator memory.
//!
//! ```text
//!   SimulatorHandle            mpsc (FIFO)       hud-simulator thread
//!   ┌──────────────────┐  ───────────────────▶  ┌─────────────────────┐
//!   │ .init(data)      │                        │ LayoutSimulation    │
//!   │ .tick()          │  ◀───────────────────  │ one message at a    │
//!   │ .terminate()     │     TickFrame copies   │ time, never blocks  │
//!   └──────────────────┘                        └─────────────────────┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tokio::sync::mpsc;

use crate::protocol::{InitData, WorkerReply, WorkerRequest};
use crate::simulation::{LayoutSimulation, SimulationConfig};

/// A reply tagged with the generation it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct TickFrame {
    /// Generation of the last accepted `INIT`; 0 before any
    pub generation: u64,
    pub reply: WorkerReply,
}

enum Inbound {
    Init { generation: u64, data: InitData },
    Tick,
}

/// Handle to a simulator running on its own thread.
///
/// Dropping the handle terminates the worker.
pub struct SimulatorHandle {
    inbox: Option<mpsc::UnboundedSender<Inbound>>,
    terminated: Arc<AtomicBool>,
    next_generation: u64,
}

impl SimulatorHandle {
    /// Spawn the worker thread.
    ///
    /// Returns the handle and the stream of tick replies.
    pub fn spawn(
        config: SimulationConfig,
    ) -> std::io::Result<(Self, mpsc::UnboundedReceiver<TickFrame>)> {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let terminated = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&terminated);
        thread::Builder::new()
            .name("hud-simulator".to_string())
            .spawn(move || run(LayoutSimulation::new(config), inbox_rx, reply_tx, flag))?;

        tracing::debug!("simulator worker started");

        Ok((
            Self {
                inbox: Some(inbox_tx),
                terminated,
                next_generation: 1,
            },
            reply_rx,
        ))
    }

    /// Queue an `INIT`. Returns the generation number replies will carry
    /// once it is accepted, or `None` if the worker is gone.
    pub fn init(&mut self, data: InitData) -> Option<u64> {
        let generation = self.next_generation;
        if self.send(Inbound::Init { generation, data }) {
            self.next_generation += 1;
            Some(generation)
        } else {
            None
        }
    }

    /// Queue a `TICK`. Returns `false` if the worker is gone.
    pub fn tick(&self) -> bool {
        self.send(Inbound::Tick)
    }

    /// Queue a protocol request.
    pub fn post(&mut self, request: WorkerRequest) -> bool {
        match request {
            WorkerRequest::Init { data } => self.init(data).is_some(),
            WorkerRequest::Tick => self.tick(),
        }
    }

    /// Queue a request in its JSON wire form. Undecodable messages are
    /// logged and dropped.
    pub fn post_json(&mut self, raw: &str) -> bool {
        match WorkerRequest::from_json(raw) {
            Ok(request) => self.post(request),
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable worker message");
                false
            }
        }
    }

    /// Stop the worker without draining its inbox. Safe to call repeatedly.
    pub fn terminate(&mut self) {
        self.terminated.store(true, Ordering::Release);
        if self.inbox.take().is_some() {
            tracing::debug!("simulator worker terminated");
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.inbox.is_none()
    }

    fn send(&self, message: Inbound) -> bool {
        let Some(inbox) = &self.inbox else {
            tracing::debug!("message sent to terminated simulator ignored");
            return false;
        };
        inbox.send(message).is_ok()
    }
}

impl Drop for SimulatorHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn run(
    mut sim: LayoutSimulation,
    mut inbox: mpsc::UnboundedReceiver<Inbound>,
    replies: mpsc::UnboundedSender<TickFrame>,
    terminated: Arc<AtomicBool>,
) {
    let mut generation = 0;

    while let Some(message) = inbox.blocking_recv() {
        if terminated.load(Ordering::Acquire) {
            break;
        }

        match message {
            Inbound::Init {
                generation: next,
                data,
            } => match sim.init(data) {
                Ok(dropped) => {
                    generation = next;
                    tracing::debug!(
                        generation,
                        nodes = sim.nodes().len(),
                        edges = sim.edges().len(),
                        dropped,
                        "simulator initialized"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        rejected = next,
                        generation,
                        "rejected INIT, keeping current generation"
                    );
                }
            },
            Inbound::Tick => {
                let nodes = sim.tick();
                tracing::trace!(generation, nodes = nodes.len(), "tick");
                let frame = TickFrame {
                    generation,
                    reply: WorkerReply::Tick { nodes },
                };
                if replies.send(frame).is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!("simulator worker exited");
}
