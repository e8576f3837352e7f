//! End-to-end scenarios driven through the engine service and the mailbox
//! protocol, without sockets.

use sentinel_bus::MailboxRequest;
use sentinel_core::{AlertPayload, AlertState, MetricPayload, Severity};
use sentinel_engine::{protocol, EngineService};

fn service() -> (tempfile::TempDir, EngineService) {
    let dir = tempfile::tempdir().unwrap();
    let service = EngineService::new(dir.path());
    (dir, service)
}

fn frames(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Drive one mailbox command from its wire frames and return the reply as
/// wire frames, so the assertions below stay frame-exact.
fn request(
    service: &EngineService,
    parts: &[&str],
    now_s: u64,
) -> (Vec<String>, Vec<AlertPayload>) {
    let request = MailboxRequest::from_frames(&frames(parts)).expect("well-formed request");
    let (reply, alerts) = protocol::handle_request(service, &request, now_s);
    (reply.to_frames(), alerts)
}

fn metric(metric_type: &str, element: &str, value: &str, ttl: u32) -> MetricPayload {
    MetricPayload {
        metric_type: metric_type.into(),
        element_src: element.into(),
        value: value.into(),
        unit: "C".into(),
        ttl,
        time: None,
    }
}

fn simple_threshold(name: &str, topic: &str, element: &str) -> String {
    format!(
        r#"{{
            "threshold": {{
                "rule_name": "{name}",
                "rule_class": "example class",
                "target": "{topic}",
                "element": "{element}",
                "values": [
                    {{"low_critical": 30}},
                    {{"low_warning": 40}},
                    {{"high_warning": 50}},
                    {{"high_critical": 60}}
                ],
                "results": [
                    {{"low_critical": {{"action": ["EMAIL", "SMS"], "severity": "CRITICAL", "description": "low critical"}}}},
                    {{"low_warning": {{"action": ["EMAIL"], "severity": "WARNING", "description": "low warning"}}}},
                    {{"high_warning": {{"action": ["EMAIL"], "severity": "WARNING", "description": "high warning"}}}},
                    {{"high_critical": {{"action": ["EMAIL"], "severity": "CRITICAL", "description": "high critical"}}}}
                ]
            }}
        }}"#
    )
}

fn two_topic_single(name: &str, t1: &str, t2: &str, element: &str) -> String {
    format!(
        r#"{{
            "single": {{
                "rule_name": "{name}",
                "target": ["{t1}", "{t2}"],
                "element": "{element}",
                "results": [
                    {{"high_critical": {{"action": ["EMAIL"], "severity": "CRITICAL", "description": "both hot"}}}}
                ],
                "evaluation": "fn main(a, b) {{ if a > 10.0 && b > 10.0 {{ return HIGH_CRITICAL; }} OK }}"
            }}
        }}"#
    )
}

#[test]
fn threshold_boundary_ladder_emits_in_order() {
    let (_dir, service) = service();
    let (reply, _) = request(
        &service,
        &["ADD", &simple_threshold("simplethreshold", "abc@fff", "fff")],
        1,
    );
    assert_eq!(reply[0], "OK");

    let mut emitted = Vec::new();
    for (i, value) in ["20", "42", "52", "62", "42"].iter().enumerate() {
        let now = 10 + i as u64;
        emitted.extend(service.handle_metric(metric("abc", "fff", value, 60), now));
    }

    let observed: Vec<(AlertState, Severity)> =
        emitted.iter().map(|a| (a.state, a.severity)).collect();
    assert_eq!(
        observed,
        vec![
            (AlertState::Active, Severity::Critical),
            (AlertState::Resolved, Severity::Ok),
            (AlertState::Active, Severity::Warning),
            (AlertState::Active, Severity::Critical),
            (AlertState::Resolved, Severity::Ok),
        ]
    );
    assert!(emitted.iter().all(|a| a.element == "fff"));
    assert!(emitted
        .iter()
        .all(|a| a.subject().starts_with("simplethreshold/")));
    // alerts inherit three times the metric TTL
    assert_eq!(emitted[0].ttl, 180);
}

#[test]
fn repeated_identical_sample_emits_once() {
    let (_dir, service) = service();
    service
        .add_rule(&simple_threshold("r", "abc@fff", "fff"), 1)
        .unwrap();

    let first = service.handle_metric(metric("abc", "fff", "70", 60), 10);
    assert_eq!(first.len(), 1);
    let second = service.handle_metric(metric("abc", "fff", "70", 60), 11);
    assert!(second.is_empty());
}

#[test]
fn touch_with_unchanged_metrics_is_silent() {
    let (_dir, service) = service();
    service
        .add_rule(&simple_threshold("r", "abc@fff", "fff"), 1)
        .unwrap();
    service.handle_metric(metric("abc", "fff", "70", 60), 10);

    let (reply, alerts) = request(&service, &["TOUCH", "r"], 11);
    assert_eq!(reply, vec!["OK"]);
    assert!(alerts.is_empty());

    let (reply, _) = request(&service, &["TOUCH", "ghost"], 11);
    assert_eq!(reply, vec!["ERROR", "NOT_FOUND"]);
}

#[test]
fn trash_fields_round_trip_through_add_and_get() {
    let (_dir, service) = service();
    let rule_json = r#"{
        "single": {
            "rule_name": "rule_with_trash",
            "target": "t@e",
            "element": "e",
            "results": [{"ok": {"action": [], "severity": "OK", "description": ""}}],
            "evaluation": "fn main(v) { OK }",
            "trash_field": {"keep": ["me", "verbatim"]}
        }
    }"#;
    let (reply, _) = request(&service, &["ADD", rule_json], 1);
    assert_eq!(reply[0], "OK");

    let (reply, _) = request(&service, &["GET", "rule_with_trash"], 2);
    assert_eq!(reply[0], "OK");
    let fetched: serde_json::Value = serde_json::from_str(&reply[1]).unwrap();
    assert_eq!(fetched["single"]["trash_field"]["keep"][1], "verbatim");
}

#[test]
fn list_filters_by_type_and_rejects_unknown_types() {
    let (_dir, service) = service();
    service
        .add_rule(&simple_threshold("t1", "abc@fff", "fff"), 1)
        .unwrap();

    // threshold-only catalog, asked for singles: empty body
    let (reply, _) = request(&service, &["LIST", "single", ""], 2);
    assert_eq!(reply, vec!["LIST", "single", ""]);

    let (reply, _) = request(&service, &["LIST", "all", ""], 2);
    assert_eq!(reply.len(), 4);
    assert_eq!(&reply[..3], &["LIST", "all", ""]);

    // class filter
    let (reply, _) =
        request(&service, &["LIST", "all", "example class"], 2);
    assert_eq!(reply.len(), 4);
    let (reply, _) =
        request(&service, &["LIST", "all", "other class"], 2);
    assert_eq!(reply.len(), 3);

    let (reply, _) = request(&service, &["LIST", "bogus", ""], 2);
    assert_eq!(reply, vec!["ERROR", "INVALID_TYPE"]);
}

#[test]
fn duplicate_add_and_unknown_update_report_errors() {
    let (_dir, service) = service();
    let json = simple_threshold("X", "abc@fff", "fff");

    let (reply, _) = request(&service, &["ADD", &json], 1);
    assert_eq!(reply[0], "OK");
    let (reply, _) = request(&service, &["ADD", &json], 2);
    assert_eq!(reply, vec!["ERROR", "ALREADY_EXISTS"]);

    let (reply, _) = request(&service, &["ADD", &json, "unknown"], 3);
    assert_eq!(reply, vec!["ERROR", "NOT_FOUND"]);

    let (reply, _) = request(&service, &["ADD", "{ not json"], 4);
    assert_eq!(reply, vec!["ERROR", "BAD_JSON"]);

    let bad_script = r#"{
        "single": {
            "rule_name": "bad",
            "target": "t@e",
            "element": "e",
            "results": [{"ok": {"action": [], "severity": "OK", "description": ""}}],
            "evaluation": "fn main( {"
        }
    }"#;
    let (reply, _) = request(&service, &["ADD", bad_script], 5);
    assert_eq!(reply, vec!["ERROR", "BAD_LUA"]);
}

#[test]
fn metric_unavailable_resolves_every_consumer() {
    let (_dir, service) = service();
    service
        .add_rule(
            &two_topic_single("rule1", "metrictouch1@element1", "metrictouch2@element2", "element1"),
            1,
        )
        .unwrap();
    service
        .add_rule(
            &two_topic_single("rule2", "metrictouch1@element1", "metrictouch2@element2", "element2"),
            1,
        )
        .unwrap();

    // activate both
    service.handle_metric(metric("metrictouch1", "element1", "20", 60), 10);
    let activated = service.handle_metric(metric("metrictouch2", "element2", "20", 60), 11);
    assert_eq!(activated.len(), 2);
    assert!(activated.iter().all(|a| a.state == AlertState::Active));

    // one topic goes dark: both alerts resolve
    let resolved = service.handle_metric_unavailable("metrictouch1@element1", 12);
    assert_eq!(resolved.len(), 2);
    assert!(resolved.iter().all(|a| a.state == AlertState::Resolved));
}

#[test]
fn missing_single_metric_resolves_instead_of_erroring() {
    let (_dir, service) = service();
    service
        .add_rule(&two_topic_single("r", "a@e", "b@e", "e"), 1)
        .unwrap();

    // only one of the two topics present: no activation, no error
    let emitted = service.handle_metric(metric("a", "e", "20", 60), 10);
    assert!(emitted.is_empty());
}

#[test]
fn delete_element_resolves_and_removes_rules() {
    let (_dir, service) = service();
    service
        .add_rule(&simple_threshold("r", "abc@rack-3", "rack-3"), 1)
        .unwrap();
    let active = service.handle_metric(metric("abc", "rack-3", "70", 60), 10);
    assert_eq!(active.len(), 1);

    let (reply, alerts) =
        request(&service, &["DELETE_ELEMENT", "rack-3"], 11);
    assert_eq!(reply, vec!["OK", "r"]);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].state, AlertState::Resolved);
    assert_eq!(service.rule_count(), 0);

    let (reply, _) =
        request(&service, &["DELETE_ELEMENT", "rack-3"], 12);
    assert_eq!(reply, vec!["ERROR", "NO_MATCH"]);
}

#[test]
fn delete_by_name_replies_with_the_name() {
    let (_dir, service) = service();
    service
        .add_rule(&simple_threshold("r", "abc@fff", "fff"), 1)
        .unwrap();
    let (reply, _) = request(&service, &["DELETE", "r"], 2);
    assert_eq!(reply, vec!["OK", "r"]);
    let (reply, _) = request(&service, &["DELETE", "r"], 3);
    assert_eq!(reply, vec!["ERROR", "NO_MATCH"]);
}

#[test]
fn update_resolves_old_alerts_and_reevaluates() {
    let (_dir, service) = service();
    service
        .add_rule(&simple_threshold("r", "abc@fff", "fff"), 1)
        .unwrap();
    service.handle_metric(metric("abc", "fff", "70", 60), 10);

    // replacing the rule resolves the open alert, then re-evaluates the new
    // rule against the cache (70 is still above its high_critical)
    let (_, alerts) = service
        .update_rule(&simple_threshold("r2", "abc@fff", "fff"), "r", 11)
        .unwrap();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].rule, "r");
    assert_eq!(alerts[0].state, AlertState::Resolved);
    assert_eq!(alerts[1].rule, "r2");
    assert_eq!(alerts[1].state, AlertState::Active);
}

#[test]
fn warranty_alerts_rewrite_description_and_rule_id() {
    let (_dir, service) = service();
    let warranty = r#"{
        "pattern": {
            "rule_name": "warranty",
            "target": "^end_warranty_date@.+",
            "values": [{"low_warning": 60}, {"low_critical": 10}],
            "results": [
                {"low_warning": {"action": ["EMAIL"], "severity": "WARNING", "description": "Warranty expires in"}},
                {"low_critical": {"action": ["EMAIL"], "severity": "CRITICAL", "description": "Warranty expires in"}}
            ],
            "evaluation": "fn main(v) { if v <= low_critical { return LOW_CRITICAL; } if v <= low_warning { return LOW_WARNING; } OK }"
        }
    }"#;
    service.add_rule(warranty, 1).unwrap();

    let soon = service.handle_metric(metric("end_warranty_date", "ups-9", "5", 86400), 10);
    assert_eq!(soon.len(), 1);
    assert_eq!(soon[0].rule, "warranty@ups-9");
    assert_eq!(soon[0].element, "ups-9");
    assert_eq!(soon[0].severity, Severity::Critical);
    assert_eq!(
        soon[0].description,
        "Warranty on ups-9 expires in less than 5 days."
    );
    assert_eq!(soon[0].subject(), "warranty/CRITICAL@ups-9");

    let expired = service.handle_metric(metric("end_warranty_date", "ups-8", "-3", 86400), 11);
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].rule, "warranty@ups-8");
    assert_eq!(
        expired[0].description,
        "Warranty on ups-8 expired 3 days ago."
    );
}

#[test]
fn pattern_rule_deletion_emits_synthetic_resolved() {
    let (_dir, service) = service();
    let pattern = r#"{
        "pattern": {
            "rule_name": "quiet_pattern",
            "target": "^never_matched@.+",
            "results": [{"low_critical": {"action": [], "severity": "CRITICAL", "description": "x"}}],
            "evaluation": "fn main(v) { OK }"
        }
    }"#;
    service.add_rule(pattern, 1).unwrap();

    let (names, alerts) = service.delete_rule("quiet_pattern", 2);
    assert_eq!(names, vec!["quiet_pattern"]);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].element, "*");
    assert_eq!(alerts[0].state, AlertState::Resolved);
}

#[test]
fn ack_states_survive_reevaluation_until_resolution() {
    let (_dir, service) = service();
    service
        .add_rule(&simple_threshold("r", "abc@fff", "fff"), 1)
        .unwrap();
    service.handle_metric(metric("abc", "fff", "70", 60), 10);

    service
        .switch_alert_state("r", "fff", AlertState::AckWip, 11)
        .unwrap();

    // still critical: ack preserved, nothing new emitted
    let unchanged = service.handle_metric(metric("abc", "fff", "71", 60), 12);
    assert!(unchanged.is_empty());

    // severity drop: emitted, ack preserved
    let warned = service.handle_metric(metric("abc", "fff", "55", 60), 13);
    assert_eq!(warned.len(), 1);
    assert_eq!(warned[0].state, AlertState::AckWip);

    // back to normal: resolved
    let resolved = service.handle_metric(metric("abc", "fff", "45", 60), 14);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].state, AlertState::Resolved);
}

#[test]
fn rules_survive_restart_via_the_rules_dir() {
    let (dir, service) = service();
    service
        .add_rule(&simple_threshold("persisted", "abc@fff", "fff"), 1)
        .unwrap();
    drop(service);

    let service = EngineService::new(dir.path());
    let results = service.configure(dir.path());
    assert_eq!(results.len(), 1);
    assert_eq!(service.rule_count(), 1);
    assert!(service.get_rule("persisted").is_some());
}
