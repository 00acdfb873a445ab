use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use sentinel_hud::config::HudConfig;
use sentinel_hud::fetcher::HttpFetcher;
use sentinel_hud::import::import_snapshot;
use sentinel_hud::render::{Frame, Stats, frame_to_svg};
use sentinel_hud::server;
use sentinel_hud::snapshot::Snapshot;
use sentinel_hud::supervisor::Supervisor;
use sentinel_hud::worker::SimulatorHandle;

/// Live force-directed graph HUD for the Sentinel agent dashboard.
#[derive(Parser)]
#[command(name = "sentinel-hud")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the dashboard API (overrides the config file)
    #[arg(long, global = true)]
    api: Option<String>,

    /// Snapshot poll period in milliseconds
    #[arg(long, global = true)]
    poll_ms: Option<u64>,

    /// Simulation ticks per second
    #[arg(long, global = true)]
    tick_hz: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the API and run the live layout, logging stats every second
    Run {
        /// Rewrite this SVG file with the latest frame every second
        #[arg(long)]
        frames_out: Option<PathBuf>,

        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Lay out a graph payload file offline
    Layout {
        /// Graph JSON in the `/api/dashboard/graph` shape
        #[arg(short, long)]
        input: PathBuf,

        /// Number of simulation ticks to run
        #[arg(long, default_value = "300")]
        ticks: usize,

        /// Write an SVG here instead of printing positions as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the live layout and serve it over HTTP
    Serve {
        /// Port to run the server on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

impl Cli {
    /// Config file (if any) with command-line overrides applied
    fn resolve_config(&self) -> anyhow::Result<HudConfig> {
        let mut config = match &self.config {
            Some(path) => HudConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => HudConfig::default(),
        };

        if let Some(api) = &self.api {
            config.api_base = api.clone();
        }
        if let Some(poll_ms) = self.poll_ms {
            config.poll_interval_ms = poll_ms;
        }
        if let Some(tick_hz) = self.tick_hz {
            config.tick_rate_hz = tick_hz;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Serialize)]
struct Placement<'a> {
    entity: &'a str,
    x: f32,
    y: f32,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(
    config: HudConfig,
    frames_out: Option<PathBuf>,
    duration: Option<Duration>,
) -> anyhow::Result<()> {
    let fetcher = HttpFetcher::new(&config.api_base, config.request_timeout())?;
    let render = config.render.clone();
    let mut handle = Supervisor::new(config, fetcher).start()?;

    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut states = handle.state_changes();
    let mut report = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
            Ok(()) = states.changed() => {
                tracing::info!(state = ?*states.borrow_and_update(), "supervisor state changed");
            }
            _ = report.tick() => {
                let frame = handle.latest();
                tracing::info!(
                    state = ?handle.state(),
                    count = frame.stats.count,
                    latency_ms = ?frame.stats.latency_ms,
                    "hud"
                );
                if let Some(path) = &frames_out {
                    std::fs::write(path, frame_to_svg(&frame, &render))
                        .with_context(|| format!("writing {}", path.display()))?;
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

async fn layout(
    config: &HudConfig,
    input: &Path,
    ticks: usize,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let raw = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let snapshot = Snapshot::from_json(&raw)
        .with_context(|| format!("{} is not a graph payload", input.display()))?;
    let imported = import_snapshot(&snapshot, &config.physics);

    let (mut simulator, mut replies) = SimulatorHandle::spawn(config.physics.clone())?;
    let generation = simulator
        .init(imported.init.clone())
        .context("simulator worker exited before INIT")?;
    for _ in 0..ticks {
        simulator.tick();
    }

    let mut nodes = imported.init.nodes.clone();
    for _ in 0..ticks {
        match replies.recv().await {
            Some(frame) => nodes = frame.reply.into_nodes(),
            None => anyhow::bail!("simulator worker exited mid-layout"),
        }
    }
    simulator.terminate();

    match output {
        Some(path) => {
            let frame = Frame {
                stats: Stats {
                    count: nodes.len(),
                    latency_ms: None,
                    generation,
                },
                nodes,
                connections: imported.init.connections.clone(),
            };
            std::fs::write(path, frame_to_svg(&frame, &config.render))
                .with_context(|| format!("writing {}", path.display()))?;
            println!(
                "Laid out {} entities ({} connections) in {}",
                imported.entities.len(),
                imported.init.connections.len(),
                path.display()
            );
        }
        None => {
            let placements: Vec<Placement> = nodes
                .iter()
                .filter_map(|n| {
                    imported.entity(n.id).map(|entity| Placement {
                        entity,
                        x: n.x,
                        y: n.y,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&placements)?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    match cli.command {
        Commands::Run {
            frames_out,
            duration_secs,
        } => {
            run(config, frames_out, duration_secs.map(Duration::from_secs)).await?;
        }
        Commands::Layout {
            input,
            ticks,
            output,
        } => {
            layout(&config, &input, ticks, output.as_deref()).await?;
        }
        Commands::Serve { port } => {
            let fetcher = HttpFetcher::new(&config.api_base, config.request_timeout())?;
            let render = config.render.clone();
            let handle = Supervisor::new(config, fetcher).start()?;
            server::serve(handle, render, port).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_with_defaults() {
        let cli = Cli::try_parse_from(["sentinel-hud", "run"]).unwrap();
        assert!(cli.config.is_none());
        match &cli.command {
            Commands::Run {
                frames_out,
                duration_secs,
            } => {
                assert!(frames_out.is_none());
                assert!(duration_secs.is_none());
            }
            _ => panic!("Expected Run command"),
        }
        assert_eq!(cli.resolve_config().unwrap(), HudConfig::default());
    }

    #[test]
    fn cli_parses_layout_subcommand() {
        let cli = Cli::try_parse_from([
            "sentinel-hud",
            "layout",
            "--input",
            "graph.json",
            "--ticks",
            "50",
            "--output",
            "hud.svg",
        ])
        .unwrap();
        match cli.command {
            Commands::Layout {
                input,
                ticks,
                output,
            } => {
                assert_eq!(input, PathBuf::from("graph.json"));
                assert_eq!(ticks, 50);
                assert_eq!(output, Some(PathBuf::from("hud.svg")));
            }
            _ => panic!("Expected Layout command"),
        }
    }

    #[test]
    fn cli_parses_serve_subcommand() {
        let cli = Cli::try_parse_from(["sentinel-hud", "serve", "--port", "8081"]).unwrap();
        match cli.command {
            Commands::Serve { port } => assert_eq!(port, 8081),
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn global_flags_override_config() {
        let cli = Cli::try_parse_from([
            "sentinel-hud",
            "run",
            "--api",
            "http://sentinel:9000",
            "--poll-ms",
            "2000",
            "--tick-hz",
            "30",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.api_base, "http://sentinel:9000");
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.tick_rate_hz, 30);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let cli = Cli::try_parse_from(["sentinel-hud", "run", "--tick-hz", "0"]).unwrap();
        assert!(cli.resolve_config().is_err());
    }
}
