//! Autoconfigurator worker event loop.
//!
//! One cooperative task multiplexing four inputs:
//! - the control channel (`CONFIG`, `TEMPLATES_DIR`, `ALERT_ENGINE_NAME`,
//!   `$TERM`, ...)
//! - the ASSETS stream (and a narrow slice of METRICS for the phase-count
//!   fallback)
//! - the polling timer (5 s with fresh work, 60 s while retrying)
//! - the mailbox (template-listing RPC)

use std::sync::Arc;
use std::time::Duration;

use sentinel_bus::config::parse_endpoint;
use sentinel_bus::{
    topics, ControlCommand, MailboxClient, MailboxReply, MailboxRequest, MailboxServer,
    StreamSubscriber,
};
use sentinel_core::AssetPayload;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::AutoconfigError;
use crate::service::{AssetAction, Autoconfigurator, PendingRules};

/// Budget for one rule-engine RPC round trip.
const RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle poll interval when no asset is waiting.
const IDLE_POLL_S: u64 = 60;

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Send one ADD to the rule engine; `ALREADY_EXISTS` counts as success.
async fn send_rule(client: &MailboxClient, rule_json: &str) -> bool {
    let request = MailboxRequest::Add {
        json: rule_json.to_string(),
    };
    match client.request(&request, RPC_TIMEOUT).await {
        Ok(reply) if reply.is_ok() => true,
        Ok(reply) if reply.error_code() == Some("ALREADY_EXISTS") => {
            debug!("rule already exists, counting as configured");
            true
        }
        Ok(reply) => {
            warn!(code = ?reply.error_code(), "rule engine rejected rule");
            false
        }
        Err(e) => {
            warn!(error = %e, "rule ADD round trip failed");
            false
        }
    }
}

/// Push one batch of pending rules to the engine and record the outcome.
async fn configure_pending(
    service: &Autoconfigurator,
    client: &MailboxClient,
    pending: Vec<PendingRules>,
) {
    for batch in pending {
        let mut all_ok = true;
        for rule_json in &batch.rules {
            all_ok &= send_rule(client, rule_json).await;
        }
        service.mark_configured(&batch.asset, all_ok);
    }
}

/// Ask the engine to drop every rule of a deleted asset.
async fn send_delete_element(client: &MailboxClient, asset: &str) {
    let request = MailboxRequest::DeleteElement {
        asset: asset.to_string(),
    };
    match client.request(&request, RPC_TIMEOUT).await {
        Ok(MailboxReply::Ok(deleted)) => {
            info!(asset = %asset, deleted = deleted.len(), "asset rules deleted");
        }
        Ok(reply) => debug!(asset = %asset, code = ?reply.error_code(), "nothing to delete"),
        Err(e) => warn!(asset = %asset, error = %e, "DELETE_ELEMENT round trip failed"),
    }
}

/// Serve one template-listing request: `[LIST, correlation_id, filter]` →
/// `[correlation_id, LIST, filter, (name, body, assets)...]`.
fn list_reply(service: &Autoconfigurator, frames: &[String], now_s: u64) -> Option<Vec<String>> {
    if frames.first().map(String::as_str) != Some("LIST") {
        return None;
    }
    let correlation = frames.get(1).cloned().unwrap_or_default();
    let filter = frames.get(2).cloned().unwrap_or_else(|| "all".to_string());

    let mut reply = vec![correlation, "LIST".to_string(), filter.clone()];
    for (name, body, assets) in service.list_templates(&filter, now_s) {
        reply.push(name);
        reply.push(body);
        reply.push(assets);
    }
    Some(reply)
}

/// The autoconfigurator task.
pub async fn run_worker(
    service: Arc<Autoconfigurator>,
    subscriber: StreamSubscriber,
    server: MailboxServer,
    mut engine_client: MailboxClient,
    mut control: mpsc::Receiver<Vec<String>>,
    agent_name: String,
) -> Result<(), AutoconfigError> {
    info!(agent = %agent_name, "autoconfig worker started");

    loop {
        let poll_in = service.next_poll_seconds().unwrap_or(IDLE_POLL_S);

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
                    Some(ControlCommand::Config(dir)) => service.configure(&dir),
                    Some(ControlCommand::TemplatesDir(dir)) => service.set_templates_dir(&dir),
                    Some(ControlCommand::AlertEngineName(endpoint)) => {
                        match MailboxClient::connect(&parse_endpoint(&endpoint), &agent_name).await {
                            Ok(client) => {
                                info!(endpoint = %endpoint, "alert engine mailbox reconnected");
                                engine_client = client;
                            }
                            Err(e) => warn!(endpoint = %endpoint, error = %e, "cannot reach alert engine"),
                        }
                    }
                    Some(ControlCommand::Consumer { stream, pattern }) => {
                        if let Err(e) = subscriber.subscribe(&stream, &pattern).await {
                            warn!(stream = %stream, error = %e, "cannot set consumer");
                        }
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
                match stream.as_str() {
                    topics::STREAM_ASSETS => match message.decode::<AssetPayload>() {
                        Ok(payload) => {
                            if let Some(AssetAction::DeleteElement(asset)) =
                                service.handle_asset(&payload)
                            {
                                send_delete_element(&engine_client, &asset).await;
                            }
                        }
                        Err(e) => {
                            warn!(subject = %message.subject, error = %e, "cannot decode asset message, ignoring");
                        }
                    },
                    topics::STREAM_METRICS => {
                        service.note_metric(&message.subject, unix_now());
                    }
                    other => debug!(stream = %other, "message from unexpected stream, ignoring"),
                }
            }

            (handle, frames) = async {
                loop {
                    match server.recv_frames().await {
                        Ok(pair) => break pair,
                        Err(e) => {
                            warn!(error = %e, "mailbox recv failed");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
            } => {
                if let Some(reply_frames) = list_reply(&service, &frames, unix_now()) {
                    if let Err(e) = server.reply_frames(handle, &reply_frames).await {
                        warn!(error = %e, "template list reply failed");
                    }
                } else {
                    warn!(frames = ?frames, "unexpected mailbox request, ignoring");
                }
            }

            _ = tokio::time::sleep(Duration::from_secs(poll_in)) => {
                let pending = service.poll(unix_now());
                if !pending.is_empty() {
                    configure_pending(&service, &engine_client, pending).await;
                }
            }
        }
    }

    info!(agent = %agent_name, "autoconfig worker stopped");
    Ok(())
}
