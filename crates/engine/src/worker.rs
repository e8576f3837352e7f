//! Worker event loops of the alert engine.
//!
//! The engine runs as two cooperative tasks sharing one [`EngineService`]:
//! - the **stream worker** drains metric samples and metric-unavailable
//!   signals and publishes the resulting alerts
//! - the **mailbox worker** serves the rule CRUD RPC
//!
//! Each task is driven by a `tokio::select!` over its control channel and
//! its broker socket; a `$TERM` control frame drains the task cleanly.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sentinel_bus::{
    topics, ControlCommand, MailboxServer, Message, StreamPublisher, StreamSubscriber,
};
use sentinel_core::{AlertPayload, MetricPayload};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::protocol;
use crate::service::EngineService;

/// Reply send budget; a stuck client must not block the main loop.
const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Seconds since the epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

async fn publish_alerts(
    publisher: &StreamPublisher,
    out_stream: &str,
    agent_name: &str,
    alerts: Vec<AlertPayload>,
) {
    for alert in alerts {
        let subject = alert.subject();
        let message = match Message::new(&subject, agent_name, &alert) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "failed to serialize alert");
                continue;
            }
        };
        match publisher.publish(out_stream, &message).await {
            Ok(()) => info!(
                subject = %subject,
                state = %alert.state,
                severity = %alert.severity,
                "alert sent"
            ),
            Err(e) => warn!(subject = %subject, error = %e, "alert publish failed, dropping"),
        }
    }
}

/// Stream worker: metric samples in, alerts out.
pub async fn run_stream_worker(
    service: Arc<EngineService>,
    subscriber: StreamSubscriber,
    publisher: StreamPublisher,
    mut control: mpsc::Receiver<Vec<String>>,
    agent_name: String,
) -> Result<(), EngineError> {
    let mut out_stream = topics::STREAM_ALERTS.to_string();
    info!(agent = %agent_name, "stream worker started");

    loop {
        tokio::select! {
            frames = control.recv() => {
                let frames = match frames {
                    Some(f) => f,
                    None => break,
                };
                match ControlCommand::parse(&frames) {
                    Some(ControlCommand::Term) => {
                        info!(agent = %agent_name, "$TERM received");
                        break;
                    }
                    Some(ControlCommand::Config(dir)) => {
                        service.configure(&dir);
                    }
                    Some(ControlCommand::Consumer { stream, pattern }) => {
                        if let Err(e) = subscriber.subscribe(&stream, &pattern).await {
                            warn!(stream = %stream, error = %e, "cannot set consumer");
                        }
                    }
                    Some(ControlCommand::Producer(stream)) => {
                        out_stream = stream;
                    }
                    Some(ControlCommand::Connect(endpoint)) => {
                        // Sockets are connected at construction time; the
                        // endpoint is recorded in the bus config.
                        debug!(endpoint = %endpoint, "CONNECT acknowledged");
                    }
                    Some(other) => debug!(command = ?other, "control command not handled"),
                    None => warn!(frames = ?frames, "unrecognized control command, ignoring"),
                }
            }
            received = subscriber.recv() => {
                let (stream, message) = match received {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "stream recv failed");
                        continue;
                    }
                };
                let now = unix_now();
                let alerts = match stream.as_str() {
                    topics::STREAM_METRICS => match message.decode::<MetricPayload>() {
                        Ok(payload) => service.handle_metric(payload, now),
                        Err(e) => {
                            warn!(subject = %message.subject, error = %e, "cannot decode metric, ignoring");
                            Vec::new()
                        }
                    },
                    topics::STREAM_METRICS_UNAVAILABLE => match message.decode_frames() {
                        Ok(frames) if frames.len() >= 2
                            && frames[0] == topics::METRIC_UNAVAILABLE_FRAME =>
                        {
                            service.handle_metric_unavailable(&frames[1], now)
                        }
                        Ok(frames) => {
                            warn!(frames = ?frames, "malformed metric-unavailable signal");
                            Vec::new()
                        }
                        Err(e) => {
                            warn!(error = %e, "cannot decode metric-unavailable signal");
                            Vec::new()
                        }
                    },
                    other => {
                        debug!(stream = %other, "message from unexpected stream, ignoring");
                        Vec::new()
                    }
                };
                publish_alerts(&publisher, &out_stream, &agent_name, alerts).await;
            }
        }
    }

    info!(agent = %agent_name, "stream worker stopped");
    Ok(())
}

/// Mailbox worker: rule CRUD RPC plus the alerts its mutations cascade.
pub async fn run_mailbox_worker(
    service: Arc<EngineService>,
    server: MailboxServer,
    publisher: StreamPublisher,
    mut control: mpsc::Receiver<Vec<String>>,
    agent_name: String,
) -> Result<(), EngineError> {
    let mut out_stream = topics::STREAM_ALERTS.to_string();
    info!(agent = %agent_name, "mailbox worker started");

    loop {
        tokio::select! {
            frames = control.recv() => {
                let frames = match frames {
                    Some(f) => f,
                    None => break,
                };
                match ControlCommand::parse(&frames) {
                    Some(ControlCommand::Term) => {
                        info!(agent = %agent_name, "$TERM received");
                        break;
                    }
                    Some(ControlCommand::Config(dir)) => {
                        service.configure(&dir);
                    }
                    Some(ControlCommand::Producer(stream)) => {
                        out_stream = stream;
                    }
                    Some(other) => debug!(command = ?other, "control command not handled"),
                    None => warn!(frames = ?frames, "unrecognized control command, ignoring"),
                }
            }
            received = server.recv() => {
                let (handle, request) = match received {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "mailbox recv failed");
                        continue;
                    }
                };

                let (reply, alerts) = protocol::handle_request(&service, &request, unix_now());

                match tokio::time::timeout(REPLY_TIMEOUT, server.reply(handle, &reply)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "mailbox reply failed"),
                    Err(_) => warn!("mailbox reply timed out, continuing"),
                }

                publish_alerts(&publisher, &out_stream, &agent_name, alerts).await;
            }
        }
    }

    info!(agent = %agent_name, "mailbox worker stopped");
    Ok(())
}
