//! PUB/SUB stream access.
//!
//! Messages travel as two-frame ZMQ messages:
//! 1. routing key `"{stream}/{subject}"` (used for subscriber prefix filtering)
//! 2. MessagePack-encoded [`Message`] envelope
//!
//! Publishers connect to the broker frontend; subscribers connect to the
//! backend. Stream-level filtering happens on the socket (prefix), subject
//! patterns are applied client-side with a regex per subscription.

use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::error::BusError;
use crate::message::Message;
use crate::transport::Transport;

/// ZeroMQ PUB socket publisher for broker streams.
pub struct StreamPublisher {
    socket: Mutex<PubSocket>,
}

impl StreamPublisher {
    /// Connect a PUB socket to the broker's frontend endpoint.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = PubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting PUB socket to broker frontend");
        socket.connect(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }

    /// Bind a PUB socket directly (no broker in between).
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, BusError> {
        transport
            .ensure_ipc_dir()
            .map_err(|e| BusError::Transport(e.to_string()))?;
        transport
            .remove_stale_socket()
            .map_err(|e| BusError::Transport(e.to_string()))?;
        let mut socket = PubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding PUB socket");
        socket.bind(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }

    /// Publish a message on the given stream.
    pub async fn publish(&self, stream: &str, message: &Message) -> Result<(), BusError> {
        let key = format!("{}/{}", stream, message.subject);
        let envelope_bytes = message.to_bytes()?;

        let mut zmq_msg = ZmqMessage::from(key.as_str());
        zmq_msg.push_back(envelope_bytes.into());

        let mut socket = self.socket.lock().await;
        socket.send(zmq_msg).await?;

        debug!(stream = %stream, subject = %message.subject, "published message");
        Ok(())
    }
}

/// One active subscription: stream prefix plus a subject regex.
struct Subscription {
    stream: String,
    pattern: Regex,
}

/// ZeroMQ SUB socket subscriber for broker streams.
pub struct StreamSubscriber {
    socket: Mutex<SubSocket>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl StreamSubscriber {
    /// Connect a SUB socket to the broker's backend endpoint.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = SubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting SUB socket to broker backend");
        socket.connect(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Subscribe to a stream, filtering subjects by the given regex pattern.
    pub async fn subscribe(&self, stream: &str, pattern: &str) -> Result<(), BusError> {
        let regex = Regex::new(pattern)
            .map_err(|e| BusError::Config(format!("bad subject pattern '{}': {}", pattern, e)))?;
        {
            let mut socket = self.socket.lock().await;
            socket.subscribe(&format!("{}/", stream)).await?;
        }
        self.subscriptions.lock().await.push(Subscription {
            stream: stream.to_string(),
            pattern: regex,
        });
        info!(stream = %stream, pattern = %pattern, "subscribed to stream");
        Ok(())
    }

    /// Receive the next message matching any subscription.
    ///
    /// Returns the stream name alongside the decoded envelope.
    pub async fn recv(&self) -> Result<(String, Message), BusError> {
        loop {
            let zmq_msg = {
                let mut socket = self.socket.lock().await;
                socket.recv().await?
            };

            let frames: Vec<_> = zmq_msg.iter().collect();
            if frames.len() < 2 {
                warn!(frame_count = frames.len(), "unexpected frame count on SUB recv");
                continue;
            }

            let key = String::from_utf8_lossy(frames[0].as_ref()).to_string();
            let (stream, subject) = match key.split_once('/') {
                Some(parts) => parts,
                None => {
                    warn!(key = %key, "routing key without stream prefix, dropping");
                    continue;
                }
            };

            let message = match Message::from_bytes(frames[1].as_ref()) {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "failed to decode stream envelope, dropping");
                    continue;
                }
            };

            let matched = {
                let subs = self.subscriptions.lock().await;
                subs.iter()
                    .any(|s| s.stream == stream && s.pattern.is_match(subject))
            };
            if !matched {
                debug!(stream = %stream, subject = %subject, "subject filtered out");
                continue;
            }

            debug!(stream = %stream, subject = %message.subject, "received message");
            return Ok((stream.to_string(), message));
        }
    }
}
