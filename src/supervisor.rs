//! Simulation supervisor
//!
//! Owns the two clocks of the HUD: the snapshot poll and the fixed-rate
//! tick. Each successful poll re-`INIT`s the simulator with a fresh
//! generation; each tick asks for a step and publishes the reply as a
//! [`Frame`].
//!
//! State machine:
//!
//! ```text
//!   Uninitialized ──first graph fetch──▶ Running ──shutdown──▶ Stopped
//!                                         │    ▲
//!                                         └────┘ later fetches re-INIT in place
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::config::HudConfig;
use crate::fetcher::{FetchError, SnapshotSource};
use crate::import::import_snapshot;
use crate::protocol::Connection;
use crate::render::{Frame, Stats};
use crate::snapshot::{FEED_LIMIT, FeedItem, HealthReport, Snapshot, TelemetryPayload};
use crate::worker::{SimulatorHandle, TickFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No graph has been fetched yet
    Uninitialized,
    /// A generation is loaded and the tick clock is running
    Running,
    /// Torn down; terminal
    Stopped,
}

/// One endpoint's result from a poll cycle, delivered as soon as it lands
enum Poll {
    Graph {
        result: Result<Snapshot, FetchError>,
        latency: Duration,
    },
    Telemetry(Result<TelemetryPayload, FetchError>),
    Health(Result<HealthReport, FetchError>),
}

/// The generation currently loaded in the simulator
struct Current {
    generation: u64,
    connections: Vec<Connection>,
    count: usize,
}

/// Drives a simulator from a [`SnapshotSource`]
pub struct Supervisor<S> {
    config: HudConfig,
    source: Arc<S>,
}

impl<S: SnapshotSource> Supervisor<S> {
    pub fn new(config: HudConfig, source: S) -> Self {
        Self {
            config,
            source: Arc::new(source),
        }
    }

    /// Spawn the simulator worker and the supervisor task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> std::io::Result<SupervisorHandle> {
        let (simulator, replies) = SimulatorHandle::spawn(self.config.physics.clone())?;

        let (frame_tx, frame_rx) = watch::channel(Frame::default());
        let (feed_tx, feed_rx) = watch::channel(Vec::new());
        let (health_tx, health_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(SupervisorState::Uninitialized);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(
            Driver {
                config: self.config,
                source: self.source,
                simulator,
                replies,
                frame_tx,
                feed_tx,
                health_tx,
                state_tx,
                current: None,
                latency: None,
            }
            .run(shutdown_rx),
        );

        Ok(SupervisorHandle {
            frames: frame_rx,
            feed: feed_rx,
            health: health_rx,
            state: state_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

/// Owning view of a running supervisor.
///
/// All accessors hand out copies. Dropping the handle tears the supervisor
/// down just like [`SupervisorHandle::shutdown`].
pub struct SupervisorHandle {
    frames: watch::Receiver<Frame>,
    feed: watch::Receiver<Vec<FeedItem>>,
    health: watch::Receiver<Option<HealthReport>>,
    state: watch::Receiver<SupervisorState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SupervisorHandle {
    /// Subscribe to rendered frames
    pub fn frames(&self) -> watch::Receiver<Frame> {
        self.frames.clone()
    }

    /// Subscribe to the merged telemetry feed
    pub fn feed(&self) -> watch::Receiver<Vec<FeedItem>> {
        self.feed.clone()
    }

    /// Subscribe to the latest health report
    pub fn health(&self) -> watch::Receiver<Option<HealthReport>> {
        self.health.clone()
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions
    pub fn state_changes(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }

    /// Latest frame
    pub fn latest(&self) -> Frame {
        self.frames.borrow().clone()
    }

    /// Tear down and wait for the supervisor task to finish. Safe to call
    /// more than once.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "supervisor task ended abnormally");
            }
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        // The task notices the dropped sender and stops on its own.
        self.shutdown.take();
    }
}

struct Driver<S> {
    config: HudConfig,
    source: Arc<S>,
    simulator: SimulatorHandle,
    replies: mpsc::UnboundedReceiver<TickFrame>,
    frame_tx: watch::Sender<Frame>,
    feed_tx: watch::Sender<Vec<FeedItem>>,
    health_tx: watch::Sender<Option<HealthReport>>,
    state_tx: watch::Sender<SupervisorState>,
    current: Option<Current>,
    latency: Option<Duration>,
}

impl<S: SnapshotSource> Driver<S> {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let alive = Arc::new(AtomicBool::new(true));
        let (poll_tx, mut poll_rx) = mpsc::unbounded_channel();

        let mut poll_clock = interval(self.config.poll_interval());
        poll_clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick_clock = interval(self.config.tick_period());
        tick_clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            api = %self.config.api_base,
            poll_ms = self.config.poll_interval_ms,
            tick_hz = self.config.tick_rate_hz,
            "supervisor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                _ = poll_clock.tick() => {
                    spawn_poll(Arc::clone(&self.source), Arc::clone(&alive), poll_tx.clone());
                }

                Some(poll) = poll_rx.recv() => self.apply_poll(poll),

                Some(frame) = self.replies.recv() => self.publish(frame),

                _ = tick_clock.tick(), if self.current.is_some() => {
                    if !self.simulator.tick() {
                        tracing::warn!("simulator worker is gone, stopping");
                        break;
                    }
                }
            }
        }

        alive.store(false, Ordering::Release);
        self.simulator.terminate();
        self.state_tx.send_replace(SupervisorState::Stopped);
        tracing::info!("supervisor stopped");
    }

    fn apply_poll(&mut self, poll: Poll) {
        match poll {
            Poll::Graph {
                result: Ok(snapshot),
                latency,
            } => self.load(&snapshot, latency),
            Poll::Graph { result: Err(e), .. } if e.is_transient() => {
                tracing::warn!(error = %e, "graph fetch failed, keeping current layout");
            }
            Poll::Graph { result: Err(e), .. } => {
                tracing::error!(error = %e, "graph payload rejected, keeping current layout");
            }
            Poll::Telemetry(Ok(payload)) => {
                self.feed_tx.send_replace(payload.into_feed(FEED_LIMIT));
            }
            Poll::Telemetry(Err(e)) => tracing::warn!(error = %e, "telemetry fetch failed"),
            Poll::Health(Ok(report)) => {
                self.health_tx.send_replace(Some(report));
            }
            Poll::Health(Err(e)) => tracing::warn!(error = %e, "health fetch failed"),
        }
    }

    /// Replace the simulator generation with `snapshot`
    fn load(&mut self, snapshot: &Snapshot, latency: Duration) {
        let imported = import_snapshot(snapshot, &self.config.physics);
        if imported.dropped_relations > 0 {
            tracing::debug!(
                dropped = imported.dropped_relations,
                "ignored relations to unknown entities"
            );
        }

        let count = imported.init.nodes.len();
        let connections = imported.init.connections.clone();
        let Some(generation) = self.simulator.init(imported.init) else {
            tracing::warn!("simulator worker is gone, snapshot not loaded");
            return;
        };

        self.current = Some(Current {
            generation,
            connections,
            count,
        });
        self.latency = Some(latency);

        let was = self.state_tx.send_replace(SupervisorState::Running);
        if was == SupervisorState::Uninitialized {
            tracing::info!(nodes = count, "first snapshot loaded, layout running");
        } else {
            tracing::debug!(nodes = count, generation, "snapshot reloaded");
        }
    }

    /// Forward a reply to the renderer if it belongs to the current generation
    fn publish(&mut self, frame: TickFrame) {
        let Some(current) = &self.current else {
            return;
        };
        if frame.generation != current.generation {
            tracing::trace!(
                stale = frame.generation,
                current = current.generation,
                "dropping frame from superseded generation"
            );
            return;
        }

        self.frame_tx.send_replace(Frame {
            nodes: frame.reply.into_nodes(),
            connections: current.connections.clone(),
            stats: Stats {
                count: current.count,
                latency_ms: self.latency.map(|d| d.as_millis() as u64),
                generation: current.generation,
            },
        });
    }
}

/// Poll all endpoints off the supervisor loop.
///
/// The three fetches run concurrently and each result is forwarded as soon
/// as it lands, so a slow telemetry or health endpoint never holds back the
/// graph. Latency covers the graph fetch only.
///
/// Overlapping polls are allowed; each fully replaces state, so the last
/// one to land wins. Results arriving after teardown are discarded.
fn spawn_poll<S: SnapshotSource>(
    source: Arc<S>,
    alive: Arc<AtomicBool>,
    results: mpsc::UnboundedSender<Poll>,
) {
    tokio::spawn(async move {
        let deliver = |poll: Poll| {
            if !alive.load(Ordering::Acquire) {
                tracing::debug!("discarding poll result after teardown");
                return;
            }
            let _ = results.send(poll);
        };

        let graph = async {
            let started = Instant::now();
            let result = source.fetch_graph().await;
            deliver(Poll::Graph {
                result,
                latency: started.elapsed(),
            });
        };
        let telemetry = async { deliver(Poll::Telemetry(source.fetch_telemetry().await)) };
        let health = async { deliver(Poll::Health(source.fetch_health().await)) };

        tokio::join!(graph, telemetry, health);
    });
}
