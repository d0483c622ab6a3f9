//! `sentinel` CLI: loads a trigger configuration, binds a packet source,
//! and runs the detection-and-reaction event loop.
//!
//! Grounded on `examples/BeFeast-panoptikon/agent/src/main.rs`'s
//! `clap::Parser` + `tracing_subscriber::fmt` + `anyhow::Result` shape.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use sentinel_core::actions::ActionRegistry;
use sentinel_core::clock::SystemClock;
use sentinel_core::config::EngineConfig;
use sentinel_core::engine::Engine;
use sentinel_core::eventloop;
use sentinel_core::hooks::HookRegistry;
use sentinel_core::source::ReplaySource;

/// Sentinel — DDoS-mitigation sensor and reactor.
#[derive(Parser, Debug)]
#[command(name = "sentinel", version, about)]
struct Cli {
    /// Path to the trigger configuration (TOML).
    #[arg(short, long)]
    config: PathBuf,

    /// Replay a length-prefixed capture file instead of binding a live
    /// packet source. Pass `-` to read the capture from stdin. Exits once
    /// the source is exhausted.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Kernel queue identifier to bind for live capture (spec §6.1's
    /// `queue <uint>`). Validated against the configuration file's own
    /// `queue` value when both are set; an explicit flag wins when the
    /// config omits one.
    #[arg(long)]
    queue: Option<u32>,
}

fn install_builtin_actions(registry: &mut ActionRegistry) {
    registry.register("log", |kind, direction, packet, record| {
        tracing::info!(
            ?kind,
            ?direction,
            src = %packet.pkt_src,
            dst = %packet.pkt_dst,
            added = record.added(),
            expiry = record.expiry_ts(),
            "action fired"
        );
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let cfg = EngineConfig::from_file(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    tracing::info!(
        expiry = cfg.expiry,
        triggers = cfg.triggers.len(),
        "configuration loaded"
    );

    let queue = match (cli.queue, cfg.queue) {
        (Some(cli_queue), Some(cfg_queue)) if cli_queue != cfg_queue => {
            anyhow::bail!(
                "--queue {cli_queue} does not match configured queue {cfg_queue}"
            );
        }
        (Some(cli_queue), _) => Some(cli_queue),
        (None, cfg_queue) => cfg_queue,
    };

    let mut registry = ActionRegistry::new();
    install_builtin_actions(&mut registry);

    let engine = Engine::new(&cfg, &registry, HookRegistry::new());
    let clock = SystemClock;
    let shutdown = tokio::sync::Notify::new();

    if let Some(replay_path) = cli.replay {
        if replay_path.as_os_str() == "-" {
            tracing::info!("replaying capture from stdin");
            let source = ReplaySource::new(std::io::stdin());
            eventloop::run(source, engine, &clock, &shutdown).await?;
        } else {
            let file = std::fs::File::open(&replay_path)
                .with_context(|| format!("opening replay file {}", replay_path.display()))?;
            let source = ReplaySource::new(std::io::BufReader::new(file));
            tracing::info!(path = %replay_path.display(), "replaying capture file");
            eventloop::run(source, engine, &clock, &shutdown).await?;
        }
        return Ok(());
    }

    #[cfg(target_os = "linux")]
    {
        let interface = cfg
            .interface
            .as_deref()
            .context("config must set `interface` for live capture on Linux")?;
        let source = sentinel_core::source::LinuxRawSocketSource::bind(interface)
            .with_context(|| format!("binding raw socket to interface {interface}"))?;
        tracing::info!(interface, ?queue, "bound live packet source");
        eventloop::run(source, engine, &clock, &shutdown).await?;
        return Ok(());
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = queue;
        anyhow::bail!("live packet capture is only implemented for Linux; pass --replay to run against a capture file");
    }
}
