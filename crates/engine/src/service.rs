//! The engine service: rule catalog, metric cache and alert store behind
//! one shared handle.
//!
//! Both worker tasks (stream and mailbox) drive the same service instance.
//! One mutex guards the catalog because it is read from both sides; locks
//! are held only around map access, never across I/O awaits.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use sentinel_core::{AlertPayload, AlertState, MetricPayload, MetricSample, Severity};
use sentinel_rules::catalog::LoadResult;
use sentinel_rules::schema::{rule_to_json_string, Rule, RuleKind};
use sentinel_rules::{RuleCatalog, RuleError};
use tracing::{debug, error, info, warn};

use crate::cache::MetricCache;
use crate::store::{AlertStore, Verdict};

/// What caused a rule evaluation.
#[derive(Debug, Clone, Copy)]
enum Trigger<'a> {
    /// A fresh sample arrived on the rule's topic.
    Metric(&'a MetricSample),
    /// The named topic was declared unavailable.
    Unavailable(&'a str),
    /// Explicit re-evaluation against the current cache.
    Touch,
}

/// Shared state of the alert engine.
pub struct EngineService {
    catalog: Mutex<RuleCatalog>,
    cache: Mutex<MetricCache>,
    alerts: Mutex<AlertStore>,
    /// Topics observed to match no rule; cleared whenever the rule set
    /// changes so new rules get a chance at old topics.
    quiet_topics: Mutex<HashSet<String>>,
}

impl EngineService {
    pub fn new(rules_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog: Mutex::new(RuleCatalog::new(rules_dir)),
            cache: Mutex::new(MetricCache::new()),
            alerts: Mutex::new(AlertStore::new()),
            quiet_topics: Mutex::new(HashSet::new()),
        }
    }

    /// Point the service at a rules directory and load everything in it.
    pub fn configure(&self, rules_dir: impl Into<PathBuf>) -> Vec<LoadResult> {
        let mut catalog = self.lock_catalog();
        *catalog = RuleCatalog::new(rules_dir);
        let results = catalog.load_all().unwrap_or_default();
        drop(catalog);
        self.lock_quiet().clear();
        info!(loaded = results.len(), "rule directory scanned");
        results
    }

    pub fn rule_count(&self) -> usize {
        self.lock_catalog().len()
    }

    // ── Stream inputs ───────────────────────────────────────────────

    /// Process one metric sample: cache it, evict stale entries, evaluate
    /// every interested rule. Returns the alerts to publish, in order.
    pub fn handle_metric(&self, payload: MetricPayload, now_s: u64) -> Vec<AlertPayload> {
        let sample = match payload.into_sample(now_s) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "dropping unusable metric message");
                return Vec::new();
            }
        };
        let topic = sample.topic();
        debug!(topic = %topic, value = sample.value, "metric received");

        // The cache owns the sample; the dispatch below reads the trigger
        // back as the last-inserted entry, after the eviction pass has had
        // its say. A sample that arrives already stale evaluates nothing.
        let sample = {
            let mut cache = self.lock_cache();
            cache.insert(sample);
            cache.purge_stale(now_s);
            match cache.last() {
                Some(s) => s.clone(),
                None => return Vec::new(),
            }
        };

        if self.lock_quiet().contains(&topic) {
            return Vec::new();
        }

        let names = self.lock_catalog().rules_for_topic(&topic);
        if names.is_empty() {
            debug!(topic = %topic, "no rule consumes this topic, remembering");
            self.lock_quiet().insert(topic);
            return Vec::new();
        }

        let mut out = Vec::new();
        for name in names {
            out.extend(self.evaluate_rule(&name, Trigger::Metric(&sample), now_s));
        }
        out
    }

    /// Process a metric-unavailable signal for one topic.
    ///
    /// The sample is dropped from the cache and every consumer of the topic
    /// re-evaluates with the value gone, which resolves its active alerts.
    pub fn handle_metric_unavailable(&self, topic: &str, now_s: u64) -> Vec<AlertPayload> {
        info!(topic = %topic, "metric unavailable");
        let names = {
            let mut cache = self.lock_cache();
            cache.remove(topic);
            drop(cache);
            self.lock_catalog().rules_for_topic(topic)
        };

        let mut out = Vec::new();
        for name in names {
            out.extend(self.evaluate_rule(&name, Trigger::Unavailable(topic), now_s));
        }
        out
    }

    /// Force a re-evaluation of one rule against the current cache.
    pub fn touch(&self, name: &str, now_s: u64) -> Result<Vec<AlertPayload>, RuleError> {
        if !self.lock_catalog().contains(name) {
            return Err(RuleError::NotFound(name.to_string()));
        }
        Ok(self.evaluate_rule(name, Trigger::Touch, now_s))
    }

    // ── Catalog mutations ───────────────────────────────────────────

    /// Add a new rule; returns its name and the alerts produced by its
    /// first evaluation against the cached metrics.
    pub fn add_rule(&self, json: &str, now_s: u64) -> Result<(String, Vec<AlertPayload>), RuleError> {
        let name = self.lock_catalog().add(json)?;
        self.lock_quiet().clear();
        let alerts = self.evaluate_rule(&name, Trigger::Touch, now_s);
        Ok((name, alerts))
    }

    /// Replace `old_name` with the rule in `json`.
    ///
    /// Open alerts of the replaced rule resolve first; the new rule is then
    /// evaluated against the cache.
    pub fn update_rule(
        &self,
        json: &str,
        old_name: &str,
        now_s: u64,
    ) -> Result<(String, Vec<AlertPayload>), RuleError> {
        let (name, old_rule) = self.lock_catalog().update(json, old_name)?;
        self.lock_quiet().clear();

        let mut alerts = self.resolve_removed_rule(&old_rule, now_s);
        alerts.extend(self.evaluate_rule(&name, Trigger::Touch, now_s));
        Ok((name, alerts))
    }

    /// Delete one rule by name. Empty name list means no match.
    pub fn delete_rule(&self, name: &str, now_s: u64) -> (Vec<String>, Vec<AlertPayload>) {
        let removed = self.lock_catalog().delete(name);
        self.finish_removal(removed, now_s)
    }

    /// Delete every rule bound to `asset`. Empty name list means no match.
    pub fn delete_element(&self, asset: &str, now_s: u64) -> (Vec<String>, Vec<AlertPayload>) {
        let removed = self.lock_catalog().delete_by_asset(asset);
        self.finish_removal(removed, now_s)
    }

    fn finish_removal(&self, removed: Vec<Rule>, now_s: u64) -> (Vec<String>, Vec<AlertPayload>) {
        if removed.is_empty() {
            return (Vec::new(), Vec::new());
        }
        self.lock_quiet().clear();
        let mut names = Vec::new();
        let mut alerts = Vec::new();
        for rule in removed {
            names.push(rule.name.clone());
            alerts.extend(self.resolve_removed_rule(&rule, now_s));
        }
        (names, alerts)
    }

    /// Resolve and drop the alerts of a removed rule.
    ///
    /// A pattern rule that never produced an alert still announces its
    /// departure with a synthetic RESOLVED for element `*`.
    fn resolve_removed_rule(&self, rule: &Rule, now_s: u64) -> Vec<AlertPayload> {
        let mut emitted = self.lock_alerts().remove_rule(&rule.name, now_s);
        if emitted.is_empty() && rule.kind == RuleKind::Pattern {
            emitted.push(AlertPayload {
                rule: rule.name.clone(),
                element: "*".into(),
                state: AlertState::Resolved,
                severity: Severity::Ok,
                description: "everything is ok".into(),
                actions: Vec::new(),
                timestamp: now_s,
                ttl: 0,
            });
        }
        emitted
    }

    // ── Catalog queries ─────────────────────────────────────────────

    /// Serialized rules matching the LIST type and class filters.
    ///
    /// `type_filter` must be one of `all`, `threshold`, `single`, `pattern`,
    /// `flexible`; anything else is an invalid type.
    pub fn list_rules(&self, type_filter: &str, class_filter: &str) -> Option<Vec<String>> {
        let kind: Option<RuleKind> = match type_filter {
            "all" => None,
            other => Some(other.parse().ok()?),
        };
        let catalog = self.lock_catalog();
        let listed = catalog
            .iter()
            .filter(|(_, entry)| kind.map(|k| entry.rule.kind == k).unwrap_or(true))
            .filter(|(_, entry)| {
                class_filter.is_empty()
                    || entry.rule.class.as_deref().unwrap_or_default() == class_filter
            })
            .map(|(_, entry)| rule_to_json_string(&entry.rule))
            .collect();
        Some(listed)
    }

    /// Canonical serialization of one rule.
    pub fn get_rule(&self, name: &str) -> Option<String> {
        self.lock_catalog()
            .get(name)
            .map(|entry| rule_to_json_string(&entry.rule))
    }

    // ── Operator acknowledgement ────────────────────────────────────

    /// Operator-driven alert state change.
    pub fn switch_alert_state(
        &self,
        rule: &str,
        element: &str,
        target: AlertState,
        now_s: u64,
    ) -> Result<AlertPayload, String> {
        self.lock_alerts().switch_state(rule, element, target, now_s)
    }

    // ── Evaluation core ─────────────────────────────────────────────

    /// Evaluate one rule and fold the verdicts into the alert store.
    fn evaluate_rule(&self, name: &str, trigger: Trigger<'_>, now_s: u64) -> Vec<AlertPayload> {
        // (element, verdict, ttl) triples collected under the catalog lock.
        let mut verdicts: Vec<(String, Verdict, Option<u64>)> = Vec::new();
        let rule_name;
        let kind;

        {
            let mut catalog = self.lock_catalog();
            let entry = match catalog.get_mut(name) {
                Some(e) => e,
                None => return Vec::new(),
            };
            rule_name = entry.rule.name.clone();
            kind = entry.rule.kind;

            match kind {
                RuleKind::Pattern => self.eval_pattern(entry, trigger, now_s, &mut verdicts),
                RuleKind::Threshold | RuleKind::Single => {
                    self.eval_fixed_topics(entry, trigger, now_s, &mut verdicts)
                }
                RuleKind::Flexible => self.eval_flexible(entry, now_s, &mut verdicts),
            }
        }

        if rule_name == "warranty" {
            if let Trigger::Metric(sample) = trigger {
                rewrite_warranty_descriptions(&mut verdicts, sample);
            }
        }

        let mut out = Vec::new();
        {
            let mut alerts = self.lock_alerts();
            for (element, verdict, ttl) in verdicts {
                info!(
                    target: "audit",
                    rule = %rule_name,
                    element = %element,
                    verdict = ?verdict_label(&verdict),
                    "rule evaluated"
                );
                if let Some(payload) = alerts.apply(&rule_name, &element, verdict, now_s, ttl) {
                    out.push(payload);
                }
            }
        }

        // Warranty alerts carry the element in their rule identifier; the
        // autoconfigurator never materializes per-asset warranty rules.
        if rule_name == "warranty" {
            for payload in &mut out {
                payload.rule = format!("warranty@{}", payload.element);
            }
        }
        out
    }

    /// Threshold and single rules: every listed topic is required; any
    /// missing or stale sample resolves the alert instead of evaluating.
    fn eval_fixed_topics(
        &self,
        entry: &mut sentinel_rules::CatalogEntry,
        trigger: Trigger<'_>,
        now_s: u64,
        verdicts: &mut Vec<(String, Verdict, Option<u64>)>,
    ) {
        let topics = entry.rule.needed_topics();
        let element = match entry.rule.assets.first() {
            Some(e) => e.clone(),
            None => return,
        };

        let (args, ttl) = {
            let cache = self.lock_cache();
            let args: Vec<f64> = topics.iter().map(|t| cache.find(t, now_s)).collect();
            let ttl = match trigger {
                Trigger::Metric(sample) => Some(u64::from(sample.ttl_s) * 3),
                _ => topics
                    .iter()
                    .find_map(|t| cache.get(t, now_s))
                    .map(|s| u64::from(s.ttl_s) * 3),
            };
            (args, ttl)
        };

        if args.iter().any(|a| a.is_nan()) {
            debug!(rule = %entry.rule.name, "required metric missing, resolving");
            verdicts.push((element, Verdict::Resolved, ttl));
            return;
        }

        match entry.evaluate(&args) {
            Ok(token) => {
                if let Some(verdict) = verdict_from_token(&entry.rule, token) {
                    verdicts.push((element, verdict, ttl));
                }
            }
            Err(e) => error!(rule = %entry.rule.name, error = %e, "cannot evaluate rule"),
        }
    }

    /// Pattern rules: evaluated on the one sample whose topic matched; the
    /// alert element is that sample's element.
    fn eval_pattern(
        &self,
        entry: &mut sentinel_rules::CatalogEntry,
        trigger: Trigger<'_>,
        now_s: u64,
        verdicts: &mut Vec<(String, Verdict, Option<u64>)>,
    ) {
        match trigger {
            Trigger::Metric(sample) => {
                let ttl = Some(u64::from(sample.ttl_s) * 3);
                match entry.evaluate(&[sample.value]) {
                    Ok(token) => {
                        if let Some(verdict) = verdict_from_token(&entry.rule, token) {
                            verdicts.push((sample.element.clone(), verdict, ttl));
                        }
                    }
                    Err(e) => error!(rule = %entry.rule.name, error = %e, "cannot evaluate rule"),
                }
            }
            Trigger::Unavailable(topic) => {
                if let Some((_, element)) = topic.split_once('@') {
                    verdicts.push((element.to_string(), Verdict::Resolved, None));
                }
            }
            Trigger::Touch => {
                // Re-evaluate each fresh matching sample; elements whose
                // metrics went quiet resolve below.
                let samples: Vec<MetricSample> = {
                    let cache = self.lock_cache();
                    cache
                        .samples()
                        .filter(|s| s.is_fresh(now_s) && entry.matches_topic(&s.topic()))
                        .cloned()
                        .collect()
                };
                for sample in &samples {
                    let ttl = Some(u64::from(sample.ttl_s) * 3);
                    match entry.evaluate(&[sample.value]) {
                        Ok(token) => {
                            if let Some(verdict) = verdict_from_token(&entry.rule, token) {
                                verdicts.push((sample.element.clone(), verdict, ttl));
                            }
                        }
                        Err(e) => error!(rule = %entry.rule.name, error = %e, "cannot evaluate rule"),
                    }
                }
                let covered: HashSet<&str> = samples.iter().map(|s| s.element.as_str()).collect();
                for element in self.lock_alerts().elements_for_rule(&entry.rule.name) {
                    if !covered.contains(element.as_str()) {
                        verdicts.push((element, Verdict::Resolved, None));
                    }
                }
            }
        }
    }

    /// Flexible rules: one evaluation per bound asset, metric values in
    /// declared order; any missing metric resolves that asset's alert.
    fn eval_flexible(
        &self,
        entry: &mut sentinel_rules::CatalogEntry,
        now_s: u64,
        verdicts: &mut Vec<(String, Verdict, Option<u64>)>,
    ) {
        let assets = entry.rule.assets.clone();
        let metrics = entry.rule.metrics.clone();

        for asset in assets {
            let (args, ttl) = {
                let cache = self.lock_cache();
                let topics: Vec<String> = metrics
                    .iter()
                    .map(|m| sentinel_core::metric_topic(m, &asset))
                    .collect();
                let args: Vec<f64> = topics.iter().map(|t| cache.find(t, now_s)).collect();
                let ttl = topics
                    .iter()
                    .find_map(|t| cache.get(t, now_s))
                    .map(|s| u64::from(s.ttl_s) * 3);
                (args, ttl)
            };

            if args.iter().any(|a| a.is_nan()) {
                verdicts.push((asset, Verdict::Resolved, ttl));
                continue;
            }
            match entry.evaluate(&args) {
                Ok(token) => {
                    if let Some(verdict) = verdict_from_token(&entry.rule, token) {
                        verdicts.push((asset, verdict, ttl));
                    }
                }
                Err(e) => error!(rule = %entry.rule.name, error = %e, "cannot evaluate rule"),
            }
        }
    }

    // ── Lock helpers ────────────────────────────────────────────────

    fn lock_catalog(&self) -> std::sync::MutexGuard<'_, RuleCatalog> {
        self.catalog.lock().expect("catalog lock poisoned")
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, MetricCache> {
        self.cache.lock().expect("cache lock poisoned")
    }

    fn lock_alerts(&self) -> std::sync::MutexGuard<'_, AlertStore> {
        self.alerts.lock().expect("alert store lock poisoned")
    }

    fn lock_quiet(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.quiet_topics.lock().expect("quiet topics lock poisoned")
    }
}

/// Map a script outcome token to a verdict via the rule's results map.
///
/// `ok` resolves; a declared key activates with its outcome fields; an
/// undeclared key is skipped with a warning and produces nothing.
fn verdict_from_token(rule: &Rule, token: sentinel_rules::OutcomeToken) -> Option<Verdict> {
    let key = match token.into_key() {
        Some(k) => k,
        None => {
            warn!(rule = %rule.name, "script returned an out-of-range outcome code");
            return None;
        }
    };
    if key == "ok" {
        return Some(Verdict::Resolved);
    }
    match rule.outcome(&key) {
        Some(outcome) => Some(Verdict::Active {
            outcome: key,
            severity: outcome.severity,
            description: outcome.description.clone(),
            actions: outcome.actions.clone(),
        }),
        None => {
            warn!(
                rule = %rule.name,
                outcome = %key,
                "outcome is not declared in the rule's results, skipping"
            );
            None
        }
    }
}

/// Warranty alerts read the metric value as a day count and rewrite the
/// author description accordingly.
fn rewrite_warranty_descriptions(
    verdicts: &mut [(String, Verdict, Option<u64>)],
    sample: &MetricSample,
) {
    let days = sample.value.round() as i64;
    for (_, verdict, _) in verdicts.iter_mut() {
        if let Verdict::Active { description, .. } = verdict {
            *description = if days < 0 {
                format!("Warranty on {} expired {} days ago.", sample.element, -days)
            } else {
                format!(
                    "Warranty on {} expires in less than {} days.",
                    sample.element, days
                )
            };
        }
    }
}

fn verdict_label(verdict: &Verdict) -> &'static str {
    match verdict {
        Verdict::Resolved => "RESOLVED",
        Verdict::Active { .. } => "ACTIVE",
    }
}
