//! Broker client layer for the alert evaluation workers.
//!
//! Everything here is plumbing around the external message fabric:
//! - [`Message`]: MessagePack envelope with subject and correlation id
//! - [`StreamPublisher`] / [`StreamSubscriber`]: PUB/SUB stream access
//! - [`MailboxRequest`] / [`MailboxReply`]: the rule-catalog RPC commands
//!   with their wire framing, plus the DEALER/ROUTER endpoints that carry
//!   them ([`MailboxClient`] / [`MailboxServer`])
//! - [`ControlCommand`]: typed control-pipe frames (`CONNECT`, `$TERM`, ...)
//!
//! The broker itself is an external collaborator; no broker logic lives in
//! this crate.

pub mod config;
pub mod control;
pub mod error;
pub mod mailbox;
pub mod message;
pub mod stream;
pub mod topics;
pub mod transport;

pub use config::BusConfig;
pub use control::ControlCommand;
pub use error::BusError;
pub use mailbox::{MailboxClient, MailboxReply, MailboxRequest, MailboxServer, ReplyHandle};
pub use message::Message;
pub use stream::{StreamPublisher, StreamSubscriber};
pub use transport::Transport;
