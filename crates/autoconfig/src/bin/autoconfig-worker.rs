//! autoconfig-worker — template-driven rule provisioning agent.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use sentinel_autoconfig::worker::run_worker;
use sentinel_autoconfig::Autoconfigurator;
use sentinel_bus::{topics, BusConfig, MailboxClient, MailboxServer, StreamSubscriber};

/// Autoconfigurator worker.
#[derive(Parser, Debug)]
#[command(name = "autoconfig-worker", version, about)]
struct Cli {
    /// Path to the bus config file.
    #[arg(long, env = "SENTINEL_BUS_CONFIG", default_value = "config/sentinel.toml")]
    config: String,

    /// Directory for the autoconfigurator state file.
    #[arg(long, env = "SENTINEL_STATE_DIR", default_value = "data/state")]
    state_dir: String,

    /// Directory holding the shipped rule templates.
    #[arg(long, env = "SENTINEL_TEMPLATES_DIR", default_value = "data/templates")]
    templates_dir: String,

    /// Agent name used on the bus.
    #[arg(long, env = "SENTINEL_AGENT_NAME", default_value = "autoconfig")]
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

    let service = Arc::new(Autoconfigurator::new(&cli.state_dir, &cli.templates_dir));

    let subscriber = StreamSubscriber::connect(&config.backend_transport())
        .await
        .context("connecting stream subscriber")?;
    let server = MailboxServer::bind(&config.autoconfig_mailbox_transport(), &cli.name)
        .await
        .context("binding mailbox server")?;
    let engine_client = MailboxClient::connect(&config.engine_mailbox_transport(), &cli.name)
        .await
        .context("connecting to the alert engine mailbox")?;

    let (ctl_tx, ctl_rx) = mpsc::channel::<Vec<String>>(16);
    for frames in [
        control_frames(&["CONNECT", &config.backend]),
        control_frames(&["CONSUMER", topics::STREAM_ASSETS, ".*"]),
        control_frames(&[
            "CONSUMER",
            topics::STREAM_METRICS,
            r"^(voltage\.input|load\.input|realpower\.output)\.L.*",
        ]),
        control_frames(&["CONFIG", &cli.state_dir]),
        control_frames(&["TEMPLATES_DIR", &cli.templates_dir]),
        control_frames(&["ALERT_ENGINE_NAME", &config.engine_mailbox]),
    ] {
        ctl_tx.send(frames).await.ok();
    }

    let worker = tokio::spawn(run_worker(
        Arc::clone(&service),
        subscriber,
        server,
        engine_client,
        ctl_rx,
        cli.name.clone(),
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    ctl_tx.send(control_frames(&["$TERM"])).await.ok();
    let _ = worker.await;
    info!("autoconfig worker shutdown complete");
    Ok(())
}
