//! Per-(rule, element) alert store with coalescing and change detection.

use std::collections::HashMap;

use sentinel_core::{AlertPayload, AlertState, Severity};
use tracing::debug;

use crate::alert::Alert;

/// Description used for resolved alerts; a resolved alert carries no
/// author-declared outcome fields.
const RESOLVED_DESCRIPTION: &str = "everything is ok";

/// What one rule evaluation concluded for one element.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Resolved,
    Active {
        outcome: String,
        severity: Severity,
        description: String,
        actions: Vec<String>,
    },
}

/// The alert store. Holds at most one alert per (rule, element).
#[derive(Default)]
pub struct AlertStore {
    alerts: HashMap<String, Alert>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(rule: &str, element: &str) -> String {
        format!("{}@{}", rule, element)
    }

    pub fn get(&self, rule: &str, element: &str) -> Option<&Alert> {
        self.alerts.get(&Self::key(rule, element))
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Elements with a tracked alert for `rule`.
    pub fn elements_for_rule(&self, rule: &str) -> Vec<String> {
        self.alerts
            .values()
            .filter(|a| a.rule == rule)
            .map(|a| a.element.clone())
            .collect()
    }

    /// Fold an evaluation verdict into the store.
    ///
    /// Returns a payload only when the result is observable: first ACTIVE
    /// creation, a state flip, or a change in any of outcome, severity,
    /// description or actions. Acknowledgement states survive continuing
    /// ACTIVE evaluations untouched.
    pub fn apply(
        &mut self,
        rule: &str,
        element: &str,
        verdict: Verdict,
        now_s: u64,
        ttl: Option<u64>,
    ) -> Option<AlertPayload> {
        let key = Self::key(rule, element);
        if !self.alerts.contains_key(&key) {
            return match verdict {
                // Nothing tracked, nothing to resolve.
                Verdict::Resolved => None,
                Verdict::Active { outcome, severity, description, actions } => {
                    let alert = Alert {
                        rule: rule.to_string(),
                        element: element.to_string(),
                        state: AlertState::Active,
                        outcome,
                        severity,
                        description,
                        actions,
                        ctime: now_s,
                        mtime: now_s,
                        ttl: ttl.unwrap_or(u64::MAX),
                    };
                    let payload = alert.to_payload(now_s);
                    self.alerts.insert(key, alert);
                    Some(payload)
                }
            };
        }

        let alert = self.alerts.get_mut(&key).expect("presence checked above");
        match verdict {
            Verdict::Resolved => {
                if alert.state == AlertState::Resolved {
                    alert.mtime = now_s;
                    return None;
                }
                alert.state = AlertState::Resolved;
                alert.outcome = "ok".into();
                alert.severity = Severity::Ok;
                alert.description = RESOLVED_DESCRIPTION.into();
                alert.actions.clear();
                alert.mtime = now_s;
                if let Some(ttl) = ttl {
                    alert.ttl = ttl;
                }
                Some(alert.to_payload(now_s))
            }
            Verdict::Active { outcome, severity, description, actions } => {
                let resurrected = alert.state == AlertState::Resolved;
                let changed = alert.outcome != outcome
                    || alert.severity != severity
                    || alert.description != description
                    || alert.actions != actions;

                if resurrected {
                    alert.state = AlertState::Active;
                    alert.ctime = now_s;
                }
                alert.outcome = outcome;
                alert.severity = severity;
                alert.description = description;
                alert.actions = actions;
                alert.mtime = now_s;
                if let Some(ttl) = ttl {
                    alert.ttl = ttl;
                }

                if resurrected || changed {
                    Some(alert.to_payload(now_s))
                } else {
                    debug!(alert = %alert.id(), "alert refreshed, nothing to send");
                    None
                }
            }
        }
    }

    /// Operator state change; emits the updated alert on success.
    pub fn switch_state(
        &mut self,
        rule: &str,
        element: &str,
        target: AlertState,
        now_s: u64,
    ) -> Result<AlertPayload, String> {
        let alert = self
            .alerts
            .get_mut(&Self::key(rule, element))
            .ok_or_else(|| format!("no alert for {}@{}", rule, element))?;
        alert.switch_state(target, now_s)?;
        Ok(alert.to_payload(now_s))
    }

    /// Resolve and drop every alert of a deleted rule.
    ///
    /// Alerts already resolved vanish silently; the rest emit one final
    /// RESOLVED message.
    pub fn remove_rule(&mut self, rule: &str, now_s: u64) -> Vec<AlertPayload> {
        let keys: Vec<String> = self
            .alerts
            .values()
            .filter(|a| a.rule == rule)
            .map(|a| a.id())
            .collect();

        let mut emitted = Vec::new();
        for key in keys {
            if let Some(mut alert) = self.alerts.remove(&key) {
                if alert.state != AlertState::Resolved {
                    alert.state = AlertState::Resolved;
                    alert.severity = Severity::Ok;
                    alert.outcome = "ok".into();
                    alert.description = RESOLVED_DESCRIPTION.into();
                    alert.actions.clear();
                    alert.mtime = now_s;
                    emitted.push(alert.to_payload(now_s));
                }
            }
        }
        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(outcome: &str, severity: Severity) -> Verdict {
        Verdict::Active {
            outcome: outcome.into(),
            severity,
            description: format!("{} description", outcome),
            actions: vec!["EMAIL".into()],
        }
    }

    #[test]
    fn first_active_creates_and_emits() {
        let mut store = AlertStore::new();
        let payload = store
            .apply("r", "e", active("high_critical", Severity::Critical), 10, Some(180))
            .unwrap();
        assert_eq!(payload.state, AlertState::Active);
        assert_eq!(payload.severity, Severity::Critical);
        assert_eq!(payload.ttl, 180);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn resolved_without_history_is_silent() {
        let mut store = AlertStore::new();
        assert!(store.apply("r", "e", Verdict::Resolved, 10, None).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn unchanged_active_is_coalesced() {
        let mut store = AlertStore::new();
        store
            .apply("r", "e", active("high_critical", Severity::Critical), 10, None)
            .unwrap();
        assert!(store
            .apply("r", "e", active("high_critical", Severity::Critical), 20, None)
            .is_none());
        // mtime still advanced
        assert_eq!(store.get("r", "e").unwrap().mtime, 20);
    }

    #[test]
    fn severity_change_emits() {
        let mut store = AlertStore::new();
        store
            .apply("r", "e", active("high_warning", Severity::Warning), 10, None)
            .unwrap();
        let payload = store
            .apply("r", "e", active("high_critical", Severity::Critical), 20, None)
            .unwrap();
        assert_eq!(payload.severity, Severity::Critical);
        assert_eq!(payload.state, AlertState::Active);
    }

    #[test]
    fn resolve_then_resurrect_in_place() {
        let mut store = AlertStore::new();
        store
            .apply("r", "e", active("high_critical", Severity::Critical), 10, None)
            .unwrap();
        let resolved = store.apply("r", "e", Verdict::Resolved, 20, None).unwrap();
        assert_eq!(resolved.state, AlertState::Resolved);
        assert_eq!(resolved.severity, Severity::Ok);
        // second resolve is silent
        assert!(store.apply("r", "e", Verdict::Resolved, 25, None).is_none());
        // resurrection emits and resets ctime
        let again = store
            .apply("r", "e", active("high_warning", Severity::Warning), 30, None)
            .unwrap();
        assert_eq!(again.state, AlertState::Active);
        assert_eq!(store.get("r", "e").unwrap().ctime, 30);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn ack_state_survives_active_evaluations() {
        let mut store = AlertStore::new();
        store
            .apply("r", "e", active("high_critical", Severity::Critical), 10, None)
            .unwrap();
        store
            .switch_state("r", "e", AlertState::AckPause, 11)
            .unwrap();
        // continuing ACTIVE evaluation with identical fields: no emission,
        // ack preserved
        assert!(store
            .apply("r", "e", active("high_critical", Severity::Critical), 12, None)
            .is_none());
        assert_eq!(store.get("r", "e").unwrap().state, AlertState::AckPause);
        // a field change emits but still preserves the ack state
        let payload = store
            .apply("r", "e", active("high_warning", Severity::Warning), 13, None)
            .unwrap();
        assert_eq!(payload.state, AlertState::AckPause);
        // rule says ok: ack resolves
        let resolved = store.apply("r", "e", Verdict::Resolved, 14, None).unwrap();
        assert_eq!(resolved.state, AlertState::Resolved);
    }

    #[test]
    fn remove_rule_emits_final_resolved_once() {
        let mut store = AlertStore::new();
        store
            .apply("r", "e1", active("high_critical", Severity::Critical), 10, None)
            .unwrap();
        store
            .apply("r", "e2", active("high_critical", Severity::Critical), 10, None)
            .unwrap();
        store.apply("r", "e2", Verdict::Resolved, 11, None).unwrap();

        let emitted = store.remove_rule("r", 20);
        // only the still-active alert emits; both are gone
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].element, "e1");
        assert_eq!(emitted[0].state, AlertState::Resolved);
        assert!(store.is_empty());
    }
}
