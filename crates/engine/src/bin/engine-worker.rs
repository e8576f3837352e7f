//! engine-worker — the alert evaluation agent.
//!
//! Runs the stream task (metrics in, alerts out) and the mailbox task (rule
//! CRUD RPC) over one shared rule catalog, and feeds both with the standard
//! control frames at startup.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use sentinel_bus::{topics, BusConfig, MailboxServer, StreamPublisher, StreamSubscriber};
use sentinel_engine::worker::{run_mailbox_worker, run_stream_worker};
use sentinel_engine::EngineService;

/// Alert evaluation engine worker.
#[derive(Parser, Debug)]
#[command(name = "engine-worker", version, about)]
struct Cli {
    /// Path to the bus config file.
    #[arg(long, env = "SENTINEL_BUS_CONFIG", default_value = "config/sentinel.toml")]
    config: String,

    /// Directory holding the `*.rule` files.
    #[arg(long, env = "SENTINEL_RULES_DIR", default_value = "data/rules")]
    rules_dir: String,

    /// Agent name used on the bus.
    #[arg(long, env = "SENTINEL_AGENT_NAME", default_value = "alert-engine")]
    name: String,
}

fn control_frames(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match BusConfig::from_file(&cli.config) {
        Ok(cfg) => {
            info!(path = %cli.config, "loaded bus config");
            cfg
        }
        Err(e) => {
            tracing::warn!(error = %e, path = %cli.config, "failed to load config, using local defaults");
            BusConfig::local()
        }
    };

    let service = Arc::new(EngineService::new(&cli.rules_dir));

    // Stream side: subscribe to metrics, publish alerts.
    let subscriber = StreamSubscriber::connect(&config.backend_transport())
        .await
        .context("connecting stream subscriber")?;
    let stream_publisher = StreamPublisher::connect(&config.frontend_transport())
        .await
        .context("connecting stream publisher")?;

    // Mailbox side: serve the rule RPC, publish cascaded alerts.
    let server = MailboxServer::bind(&config.engine_mailbox_transport(), &cli.name)
        .await
        .context("binding mailbox server")?;
    let mailbox_publisher = StreamPublisher::connect(&config.frontend_transport())
        .await
        .context("connecting mailbox publisher")?;

    let (stream_ctl_tx, stream_ctl_rx) = mpsc::channel::<Vec<String>>(16);
    let (mailbox_ctl_tx, mailbox_ctl_rx) = mpsc::channel::<Vec<String>>(16);

    // Standard startup sequence, same frames an external supervisor would
    // send down the control pipe.
    for frames in [
        control_frames(&["CONNECT", &config.backend]),
        control_frames(&["CONSUMER", topics::STREAM_METRICS, ".*"]),
        control_frames(&["CONSUMER", topics::STREAM_METRICS_UNAVAILABLE, ".*"]),
        control_frames(&["PRODUCER", topics::STREAM_ALERTS]),
        control_frames(&["CONFIG", &cli.rules_dir]),
    ] {
        stream_ctl_tx.send(frames).await.ok();
    }
    mailbox_ctl_tx
        .send(control_frames(&["PRODUCER", topics::STREAM_ALERTS]))
        .await
        .ok();

    let stream_task = tokio::spawn(run_stream_worker(
        Arc::clone(&service),
        subscriber,
        stream_publisher,
        stream_ctl_rx,
        cli.name.clone(),
    ));
    let mailbox_task = tokio::spawn(run_mailbox_worker(
        Arc::clone(&service),
        server,
        mailbox_publisher,
        mailbox_ctl_rx,
        cli.name.clone(),
    ));

    // SIGINT/SIGTERM turn into $TERM frames for both tasks.
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    stream_ctl_tx.send(control_frames(&["$TERM"])).await.ok();
    mailbox_ctl_tx.send(control_frames(&["$TERM"])).await.ok();

    let _ = stream_task.await;
    let _ = mailbox_task.await;
    info!("engine worker shutdown complete");
    Ok(())
}
