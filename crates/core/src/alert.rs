//! Alert messages as published on the ALERTS stream.

use serde::{Deserialize, Serialize};

use crate::severity::{AlertState, Severity};

/// Wire payload of an ALERTS stream message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    /// Rule identifier; warranty alerts carry `warranty@{element}` here.
    pub rule: String,
    pub element: String,
    pub state: AlertState,
    pub severity: Severity,
    pub description: String,
    pub actions: Vec<String>,
    /// Wall-clock emission time, seconds.
    pub timestamp: u64,
    /// Seconds the alert stays valid; three times the source metric's TTL.
    pub ttl: u64,
}

impl AlertPayload {
    /// Subject this alert is published under: `"{rule}/{severity}@{element}"`.
    ///
    /// The rule part never includes the warranty element suffix.
    pub fn subject(&self) -> String {
        let rule = self.rule.split('@').next().unwrap_or(&self.rule);
        format!("{}/{}@{}", rule, self.severity, self.element)
    }
}
