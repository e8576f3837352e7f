//! Alert severities and alert states with their wire spellings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Severity of an alert outcome.
///
/// `Ok` is reserved for resolved alerts; an outbound alert never carries any
/// other severity together with the RESOLVED state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "CRITICAL")]
    Critical,
    #[serde(rename = "OK")]
    Ok,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
            Severity::Ok => "OK",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(Severity::Info),
            "WARNING" => Ok(Severity::Warning),
            "CRITICAL" => Ok(Severity::Critical),
            "OK" => Ok(Severity::Ok),
            other => Err(format!("unknown severity: '{}'", other)),
        }
    }
}

/// State of a tracked alert.
///
/// The four `Ack*` states are operator-set suspensions of an active alert;
/// the engine preserves them across continuing ACTIVE evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertState {
    #[serde(rename = "RESOLVED")]
    Resolved,
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "ACK-WIP")]
    AckWip,
    #[serde(rename = "ACK-PAUSE")]
    AckPause,
    #[serde(rename = "ACK-IGNORE")]
    AckIgnore,
    #[serde(rename = "ACK-SILENCE")]
    AckSilence,
}

impl AlertState {
    /// True for any of the four operator acknowledgement states.
    pub fn is_ack(self) -> bool {
        matches!(
            self,
            AlertState::AckWip | AlertState::AckPause | AlertState::AckIgnore | AlertState::AckSilence
        )
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertState::Resolved => "RESOLVED",
            AlertState::Active => "ACTIVE",
            AlertState::AckWip => "ACK-WIP",
            AlertState::AckPause => "ACK-PAUSE",
            AlertState::AckIgnore => "ACK-IGNORE",
            AlertState::AckSilence => "ACK-SILENCE",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for AlertState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RESOLVED" => Ok(AlertState::Resolved),
            "ACTIVE" => Ok(AlertState::Active),
            "ACK-WIP" => Ok(AlertState::AckWip),
            "ACK-PAUSE" => Ok(AlertState::AckPause),
            "ACK-IGNORE" => Ok(AlertState::AckIgnore),
            "ACK-SILENCE" => Ok(AlertState::AckSilence),
            other => Err(format!("unknown alert state: '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_roundtrips_wire_spelling() {
        for s in ["INFO", "WARNING", "CRITICAL", "OK"] {
            assert_eq!(s.parse::<Severity>().unwrap().to_string(), s);
        }
        assert!("warning".parse::<Severity>().is_err());
    }

    #[test]
    fn ack_states_are_detected() {
        assert!(AlertState::AckPause.is_ack());
        assert!(AlertState::AckSilence.is_ack());
        assert!(!AlertState::Active.is_ack());
        assert!(!AlertState::Resolved.is_ack());
    }

    #[test]
    fn alert_state_roundtrips_wire_spelling() {
        for s in ["RESOLVED", "ACTIVE", "ACK-WIP", "ACK-PAUSE", "ACK-IGNORE", "ACK-SILENCE"] {
            assert_eq!(s.parse::<AlertState>().unwrap().to_string(), s);
        }
    }
}
