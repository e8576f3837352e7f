//! Rule-catalog mailbox RPC.
//!
//! Requests travel as frame lists `[command, args...]` on the subject
//! `rfc-evaluator-rules`; replies begin with `OK` (or `LIST` for listings)
//! or `ERROR, <code>`. This module owns both sides of that contract: the
//! typed command and reply model with its exact wire spellings, a DEALER
//! client that performs one round trip at a time, and a ROUTER server that
//! hands out reply handles.
//!
//! Mailbox traffic is low-volume and serialized per peer, so the client
//! keeps the socket for the whole round trip instead of multiplexing;
//! replies left over from a timed-out request are recognized by their
//! correlation id and discarded.

use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use zeromq::prelude::*;
use zeromq::{DealerSocket, RouterSocket, ZmqMessage};

use crate::error::BusError;
use crate::message::Message;
use crate::topics::RULES_SUBJECT;
use crate::transport::Transport;

// ── Command model ───────────────────────────────────────────────────

/// A command understood by the rule catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailboxRequest {
    /// List serialized rules by type (`all`, `threshold`, `single`,
    /// `pattern`, `flexible`) and an optional rule class.
    List { type_filter: String, class: String },
    /// Fetch one rule by name.
    Get { name: String },
    /// Create a rule from its serialized form.
    Add { json: String },
    /// Replace `old_name` with the rule in `json`.
    Update { json: String, old_name: String },
    /// Re-evaluate a rule against the currently cached metrics.
    Touch { name: String },
    /// Delete one rule by name.
    Delete { name: String },
    /// Delete every rule bound to an asset.
    DeleteElement { asset: String },
}

impl MailboxRequest {
    /// Wire form. An update is an `ADD` with the old name as a trailing
    /// frame; there is no separate UPDATE command.
    pub fn to_frames(&self) -> Vec<String> {
        match self {
            MailboxRequest::List { type_filter, class } => {
                vec!["LIST".into(), type_filter.clone(), class.clone()]
            }
            MailboxRequest::Get { name } => vec!["GET".into(), name.clone()],
            MailboxRequest::Add { json } => vec!["ADD".into(), json.clone()],
            MailboxRequest::Update { json, old_name } => {
                vec!["ADD".into(), json.clone(), old_name.clone()]
            }
            MailboxRequest::Touch { name } => vec!["TOUCH".into(), name.clone()],
            MailboxRequest::Delete { name } => vec!["DELETE".into(), name.clone()],
            MailboxRequest::DeleteElement { asset } => {
                vec!["DELETE_ELEMENT".into(), asset.clone()]
            }
        }
    }

    /// Parse a request frame list; `None` for unknown or truncated commands.
    pub fn from_frames(frames: &[String]) -> Option<Self> {
        let mut it = frames.iter().cloned();
        let command = it.next()?;
        let request = match command.as_str() {
            "LIST" => MailboxRequest::List {
                type_filter: it.next()?,
                class: it.next().unwrap_or_default(),
            },
            "GET" => MailboxRequest::Get { name: it.next()? },
            "ADD" => {
                let json = it.next()?;
                match it.next() {
                    Some(old_name) => MailboxRequest::Update { json, old_name },
                    None => MailboxRequest::Add { json },
                }
            }
            "TOUCH" => MailboxRequest::Touch { name: it.next()? },
            "DELETE" => MailboxRequest::Delete { name: it.next()? },
            "DELETE_ELEMENT" => MailboxRequest::DeleteElement { asset: it.next()? },
            _ => return None,
        };
        Some(request)
    }
}

/// Outcome of a mailbox request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailboxReply {
    /// `OK` plus command-specific frames: the rule json for GET/ADD, the
    /// deleted names for DELETE/DELETE_ELEMENT, nothing for TOUCH.
    Ok(Vec<String>),
    /// `LIST` echoing the filters, then one serialized rule per frame.
    Listing {
        type_filter: String,
        class: String,
        rules: Vec<String>,
    },
    /// `ERROR` with a wire code such as `NOT_FOUND` or `BAD_LUA`.
    Error(String),
}

impl MailboxReply {
    pub fn to_frames(&self) -> Vec<String> {
        match self {
            MailboxReply::Ok(rest) => {
                let mut frames = vec!["OK".to_string()];
                frames.extend(rest.iter().cloned());
                frames
            }
            MailboxReply::Listing {
                type_filter,
                class,
                rules,
            } => {
                let mut frames = vec!["LIST".to_string(), type_filter.clone(), class.clone()];
                frames.extend(rules.iter().cloned());
                frames
            }
            MailboxReply::Error(code) => vec!["ERROR".to_string(), code.clone()],
        }
    }

    pub fn from_frames(frames: &[String]) -> Option<Self> {
        match frames.first().map(String::as_str)? {
            "OK" => Some(MailboxReply::Ok(frames[1..].to_vec())),
            "ERROR" => Some(MailboxReply::Error(
                frames.get(1).cloned().unwrap_or_default(),
            )),
            "LIST" => Some(MailboxReply::Listing {
                type_filter: frames.get(1).cloned().unwrap_or_default(),
                class: frames.get(2).cloned().unwrap_or_default(),
                rules: frames.get(3..).map(<[String]>::to_vec).unwrap_or_default(),
            }),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, MailboxReply::Error(_))
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            MailboxReply::Error(code) => Some(code),
            _ => None,
        }
    }
}

// ── Transport ───────────────────────────────────────────────────────

/// The envelope is always the last frame of a mailbox message; whatever
/// routing frames precede it belong to the socket layer.
fn envelope_bytes(msg: &ZmqMessage) -> Option<&[u8]> {
    msg.iter().map(|b| b.as_ref()).filter(|b| !b.is_empty()).last()
}

/// DEALER client of a rule-catalog mailbox.
pub struct MailboxClient {
    socket: Mutex<DealerSocket>,
    sender: String,
}

impl MailboxClient {
    /// Connect to a mailbox endpoint, identifying as `sender`.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(
        transport: &Transport,
        sender: impl Into<String>,
    ) -> Result<Self, BusError> {
        let mut socket = DealerSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting to mailbox");
        socket.connect(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
            sender: sender.into(),
        })
    }

    /// One request/reply round trip, bounded by `timeout`.
    pub async fn request(
        &self,
        request: &MailboxRequest,
        timeout: Duration,
    ) -> Result<MailboxReply, BusError> {
        let message = Message::frames(RULES_SUBJECT, &self.sender, &request.to_frames())?;
        let correlation = message.correlation_id;

        let mut socket = self.socket.lock().await;

        let mut outbound = ZmqMessage::from(RULES_SUBJECT);
        outbound.push_back(message.to_bytes()?.into());
        socket.send(outbound).await?;
        debug!(correlation_id = %correlation, "mailbox request sent");

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(BusError::Timeout(timeout));
            }
            let inbound = match tokio::time::timeout(remaining, socket.recv()).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(e)) => return Err(BusError::Zmq(e)),
                Err(_) => return Err(BusError::Timeout(timeout)),
            };

            let envelope = match envelope_bytes(&inbound) {
                Some(bytes) => bytes,
                None => {
                    warn!("empty mailbox reply frame, ignoring");
                    continue;
                }
            };
            let reply = match Message::from_bytes(envelope) {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "undecodable mailbox reply, ignoring");
                    continue;
                }
            };
            if reply.correlation_id != correlation {
                debug!(correlation_id = %reply.correlation_id, "stale mailbox reply, discarding");
                continue;
            }

            let frames = reply.decode_frames()?;
            return MailboxReply::from_frames(&frames)
                .ok_or_else(|| BusError::Transport("malformed mailbox reply".into()));
        }
    }
}

/// Identifies the peer a reply must be routed to, and the request it
/// answers (the reply reuses the request's correlation id).
pub struct ReplyHandle {
    identity: Vec<u8>,
    request: Message,
}

/// ROUTER server of a rule-catalog mailbox.
pub struct MailboxServer {
    socket: Mutex<RouterSocket>,
    sender: String,
}

impl MailboxServer {
    /// Bind the mailbox endpoint, identifying replies as `sender`.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport, sender: impl Into<String>) -> Result<Self, BusError> {
        transport
            .ensure_ipc_dir()
            .map_err(|e| BusError::Transport(e.to_string()))?;
        transport
            .remove_stale_socket()
            .map_err(|e| BusError::Transport(e.to_string()))?;
        let mut socket = RouterSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding mailbox");
        socket.bind(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
            sender: sender.into(),
        })
    }

    /// Next request as raw frames.
    ///
    /// The autoconfigurator's template-listing mailbox shares the transport
    /// and subject but lays its frames out differently, so the frame level
    /// stays reachable. Messages on a foreign subject and undecodable
    /// messages are dropped with a warning.
    pub async fn recv_frames(&self) -> Result<(ReplyHandle, Vec<String>), BusError> {
        loop {
            let inbound = {
                let mut socket = self.socket.lock().await;
                socket.recv().await?
            };

            // The ROUTER socket prepends the peer identity frame.
            let identity = match inbound.iter().next() {
                Some(frame) if !frame.is_empty() => frame.as_ref().to_vec(),
                _ => {
                    warn!("mailbox request without a peer identity, ignoring");
                    continue;
                }
            };
            let envelope = match envelope_bytes(&inbound) {
                Some(bytes) if bytes != identity.as_slice() => bytes,
                _ => {
                    warn!("mailbox request without an envelope, ignoring");
                    continue;
                }
            };
            let request = match Message::from_bytes(envelope) {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "undecodable mailbox request, ignoring");
                    continue;
                }
            };
            if request.subject != RULES_SUBJECT {
                warn!(subject = %request.subject, "unexpected mailbox subject, ignoring");
                continue;
            }
            let frames = match request.decode_frames() {
                Ok(f) => f,
                Err(e) => {
                    warn!(error = %e, "mailbox request is not a frame list, ignoring");
                    continue;
                }
            };

            debug!(sender = %request.sender, "mailbox request received");
            return Ok((ReplyHandle { identity, request }, frames));
        }
    }

    /// Next rule-catalog command; unknown commands are logged and skipped.
    pub async fn recv(&self) -> Result<(ReplyHandle, MailboxRequest), BusError> {
        loop {
            let (handle, frames) = self.recv_frames().await?;
            match MailboxRequest::from_frames(&frames) {
                Some(request) => return Ok((handle, request)),
                None => warn!(frames = ?frames, "unknown mailbox command, ignoring"),
            }
        }
    }

    /// Route raw reply frames back to the requesting peer.
    pub async fn reply_frames(
        &self,
        handle: ReplyHandle,
        frames: &[String],
    ) -> Result<(), BusError> {
        let reply = Message::reply_to(&handle.request, &self.sender, &frames.to_vec())?;

        let mut outbound = ZmqMessage::from(handle.identity);
        outbound.push_back(reply.subject.as_bytes().to_vec().into());
        outbound.push_back(reply.to_bytes()?.into());

        let mut socket = self.socket.lock().await;
        socket.send(outbound).await?;
        Ok(())
    }

    /// Route a typed reply back to the requesting peer.
    pub async fn reply(&self, handle: ReplyHandle, reply: &MailboxReply) -> Result<(), BusError> {
        self.reply_frames(handle, &reply.to_frames()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn requests_round_trip_through_frames() {
        let requests = [
            MailboxRequest::List {
                type_filter: "all".into(),
                class: String::new(),
            },
            MailboxRequest::Get { name: "r1".into() },
            MailboxRequest::Add { json: "{}".into() },
            MailboxRequest::Update {
                json: "{}".into(),
                old_name: "r1".into(),
            },
            MailboxRequest::Touch { name: "r1".into() },
            MailboxRequest::Delete { name: "r1".into() },
            MailboxRequest::DeleteElement {
                asset: "rack-3".into(),
            },
        ];
        for request in requests {
            let reparsed = MailboxRequest::from_frames(&request.to_frames()).unwrap();
            assert_eq!(reparsed, request);
        }
    }

    #[test]
    fn add_with_trailing_frame_is_an_update() {
        assert_eq!(
            MailboxRequest::from_frames(&frames(&["ADD", "{}", "old"])).unwrap(),
            MailboxRequest::Update {
                json: "{}".into(),
                old_name: "old".into()
            }
        );
        assert_eq!(
            MailboxRequest::from_frames(&frames(&["ADD", "{}"])).unwrap(),
            MailboxRequest::Add { json: "{}".into() }
        );
    }

    #[test]
    fn unknown_or_truncated_requests_are_none() {
        assert!(MailboxRequest::from_frames(&frames(&["ACK", "r1"])).is_none());
        assert!(MailboxRequest::from_frames(&frames(&["GET"])).is_none());
        assert!(MailboxRequest::from_frames(&[]).is_none());
    }

    #[test]
    fn list_without_class_defaults_to_empty() {
        assert_eq!(
            MailboxRequest::from_frames(&frames(&["LIST", "single"])).unwrap(),
            MailboxRequest::List {
                type_filter: "single".into(),
                class: String::new()
            }
        );
    }

    #[test]
    fn replies_round_trip_through_frames() {
        let replies = [
            MailboxReply::Ok(vec!["r1".into()]),
            MailboxReply::Ok(Vec::new()),
            MailboxReply::Listing {
                type_filter: "threshold".into(),
                class: "example class".into(),
                rules: vec!["{}".into(), "{}".into()],
            },
            MailboxReply::Error("NOT_FOUND".into()),
        ];
        for reply in replies {
            let reparsed = MailboxReply::from_frames(&reply.to_frames()).unwrap();
            assert_eq!(reparsed, reply);
        }
    }

    #[test]
    fn empty_listing_is_three_frames() {
        let reply = MailboxReply::Listing {
            type_filter: "single".into(),
            class: String::new(),
            rules: Vec::new(),
        };
        assert_eq!(reply.to_frames(), frames(&["LIST", "single", ""]));
    }

    #[test]
    fn error_codes_are_exposed() {
        let reply = MailboxReply::Error("ALREADY_EXISTS".into());
        assert!(!reply.is_ok());
        assert_eq!(reply.error_code(), Some("ALREADY_EXISTS"));
        assert!(MailboxReply::Ok(Vec::new()).is_ok());
    }
}
