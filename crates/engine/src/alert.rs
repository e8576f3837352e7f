//! Tracked alert records and their state transitions.

use sentinel_core::{AlertPayload, AlertState, Severity};

/// One tracked alert, keyed by `"{rule}@{element}"` in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub rule: String,
    pub element: String,
    pub state: AlertState,
    /// Outcome key the last evaluation produced (`"ok"` when resolved).
    pub outcome: String,
    pub severity: Severity,
    pub description: String,
    pub actions: Vec<String>,
    /// Creation time of the current activation.
    pub ctime: u64,
    /// Last mutation time.
    pub mtime: u64,
    /// Three times the triggering metric's TTL, so one missed metric does
    /// not immediately resolve the alert.
    pub ttl: u64,
}

impl Alert {
    pub fn id(&self) -> String {
        format!("{}@{}", self.rule, self.element)
    }

    /// Operator-driven state change with legality enforcement.
    ///
    /// A resolved alert cannot be revived by hand, and the engine-owned
    /// RESOLVED transition stays reserved for rule outcomes; operators may
    /// move an active alert into any ack state, shuffle between ack states,
    /// or push an acknowledged alert back to ACTIVE.
    pub fn switch_state(&mut self, target: AlertState, now_s: u64) -> Result<(), String> {
        if self.state == AlertState::Resolved {
            return Err(format!("alert {} is resolved, cannot switch state", self.id()));
        }
        match target {
            AlertState::Resolved => {
                self.state = AlertState::Resolved;
            }
            AlertState::Active if self.state.is_ack() => {
                self.state = AlertState::Active;
            }
            AlertState::Active => {
                return Err("alert is already active".into());
            }
            ack => {
                self.state = ack;
            }
        }
        self.mtime = now_s;
        Ok(())
    }

    /// Snapshot for the ALERTS stream.
    pub fn to_payload(&self, now_s: u64) -> AlertPayload {
        AlertPayload {
            rule: self.rule.clone(),
            element: self.element.clone(),
            state: self.state,
            severity: self.severity,
            description: self.description.clone(),
            actions: self.actions.clone(),
            timestamp: now_s,
            ttl: self.ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_alert() -> Alert {
        Alert {
            rule: "r".into(),
            element: "e".into(),
            state: AlertState::Active,
            outcome: "high_critical".into(),
            severity: Severity::Critical,
            description: "d".into(),
            actions: vec![],
            ctime: 1,
            mtime: 1,
            ttl: 180,
        }
    }

    #[test]
    fn operator_can_ack_an_active_alert() {
        let mut alert = active_alert();
        alert.switch_state(AlertState::AckWip, 2).unwrap();
        assert_eq!(alert.state, AlertState::AckWip);
        alert.switch_state(AlertState::AckSilence, 3).unwrap();
        assert_eq!(alert.state, AlertState::AckSilence);
        alert.switch_state(AlertState::Active, 4).unwrap();
        assert_eq!(alert.state, AlertState::Active);
    }

    #[test]
    fn resolved_alerts_cannot_be_switched() {
        let mut alert = active_alert();
        alert.switch_state(AlertState::Resolved, 2).unwrap();
        assert!(alert.switch_state(AlertState::AckWip, 3).is_err());
        assert!(alert.switch_state(AlertState::Active, 3).is_err());
    }

    #[test]
    fn active_to_active_is_rejected() {
        let mut alert = active_alert();
        assert!(alert.switch_state(AlertState::Active, 2).is_err());
    }
}
