//! Typed control-pipe commands.
//!
//! Each worker task owns a control channel carrying string frames in the
//! shape `[command, args...]`. Unrecognized commands are surfaced as
//! [`ControlCommand::parse`] returning `None`; the worker logs and ignores
//! them without stopping.

/// A parsed control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Connect the worker's broker client to the given endpoint.
    Connect(String),
    /// Declare the output stream for published messages.
    Producer(String),
    /// Subscribe to a stream with a subject pattern (regex).
    Consumer { stream: String, pattern: String },
    /// Point the worker at its persistence directory (rules or state).
    Config(String),
    /// Point the autoconfigurator at the template library.
    TemplatesDir(String),
    /// Mailbox endpoint of the rule-engine agent.
    AlertEngineName(String),
    /// Drain and shut down.
    Term,
}

impl ControlCommand {
    /// Parse `[command, args...]` frames; `None` for unknown or malformed.
    pub fn parse(frames: &[String]) -> Option<ControlCommand> {
        let mut it = frames.iter();
        let cmd = it.next()?;
        match cmd.as_str() {
            "$TERM" => Some(ControlCommand::Term),
            "CONNECT" => it.next().map(|e| ControlCommand::Connect(e.clone())),
            "PRODUCER" => it.next().map(|s| ControlCommand::Producer(s.clone())),
            "CONSUMER" => {
                let stream = it.next()?.clone();
                let pattern = it.next()?.clone();
                Some(ControlCommand::Consumer { stream, pattern })
            }
            "CONFIG" => it.next().map(|d| ControlCommand::Config(d.clone())),
            "TEMPLATES_DIR" => it.next().map(|d| ControlCommand::TemplatesDir(d.clone())),
            "ALERT_ENGINE_NAME" => it.next().map(|n| ControlCommand::AlertEngineName(n.clone())),
            _ => None,
        }
    }
}
