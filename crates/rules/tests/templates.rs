//! Integration tests that verify every shipped template in
//! `data/templates/` (and the stock rules in `data/rules/`) parses against
//! the codec and carries a compilable script once its tokens are filled in.

use std::path::PathBuf;

use sentinel_rules::schema::parse_rule;
use sentinel_rules::{RuleKind, RuleScript};

/// Resolve the shipped template directory relative to the workspace root.
/// Integration tests run from the crate directory, so we go up two levels.
fn templates_dir() -> PathBuf {
    let manifest = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.join("../../data/templates")
}

fn rules_dir() -> PathBuf {
    let manifest = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.join("../../data/rules")
}

/// Stand in for the autoconfigurator's token substitution.
fn fill_tokens(body: &str) -> String {
    let mut out = body.to_string();
    for placeholder in ["__rack__", "__datacenter__", "__device_epdu__", "__device_sensor__"] {
        out = out.replace(placeholder, "asset-1");
    }
    for (token, replacement) in [
        ("__name__", "asset-1"),
        ("__port__", "GPI1"),
        ("__logicalasset_iname__", "room-1"),
        ("__logicalasset__", "Server Room"),
        ("__severity__", "WARNING"),
        ("__normalstate__", "closed"),
        ("__rule_result__", "warning"),
        ("__ename__", "Asset 1"),
    ] {
        out = out.replace(token, replacement);
    }
    out
}

#[test]
fn every_shipped_template_instantiates_cleanly() {
    let entries: Vec<_> = std::fs::read_dir(templates_dir())
        .expect("template directory present")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "rule").unwrap_or(false))
        .collect();
    assert!(!entries.is_empty(), "no templates found");

    for path in entries {
        let body = std::fs::read_to_string(&path).unwrap();
        let filled = fill_tokens(&body);
        assert!(
            !filled.contains("__"),
            "{} still has unsubstituted tokens",
            path.display()
        );

        let rule = parse_rule(&filled)
            .unwrap_or_else(|e| panic!("failed to parse {}: {}", path.display(), e));
        assert!(rule.name.ends_with("@asset-1"), "{}", rule.name);
        assert_eq!(rule.assets, vec!["asset-1"]);

        RuleScript::compile(&rule.code, &rule.variables)
            .unwrap_or_else(|e| panic!("script of {} does not compile: {}", path.display(), e));
    }
}

#[test]
fn three_phase_voltage_template_flags_the_worst_line() {
    let body = std::fs::read_to_string(
        templates_dir().join("voltage.input_3phase@__device_epdu__.rule"),
    )
    .unwrap();
    let rule = parse_rule(&fill_tokens(&body)).unwrap();
    assert_eq!(rule.kind, RuleKind::Single);
    assert_eq!(rule.metrics.len(), 3);

    let script = RuleScript::compile(&rule.code, &rule.variables).unwrap();
    let verdict = |v: [f64; 3]| script.evaluate(&v).unwrap().into_key().unwrap();
    assert_eq!(verdict([230.0, 230.0, 230.0]), "ok");
    assert_eq!(verdict([230.0, 184.0, 230.0]), "low_critical");
    assert_eq!(verdict([230.0, 230.0, 260.0]), "high_critical");
    assert_eq!(verdict([230.0, 230.0, 248.0]), "high_warning");
}

#[test]
fn stock_warranty_rule_counts_down() {
    let body = std::fs::read_to_string(rules_dir().join("warranty.rule")).unwrap();
    let rule = parse_rule(&body).unwrap();
    assert_eq!(rule.kind, RuleKind::Pattern);
    assert_eq!(rule.name, "warranty");
    assert_eq!(rule.pattern_source(), Some("^end_warranty_date@.+"));

    let script = RuleScript::compile(&rule.code, &rule.variables).unwrap();
    let verdict = |days: f64| script.evaluate(&[days]).unwrap().into_key().unwrap();
    assert_eq!(verdict(365.0), "ok");
    assert_eq!(verdict(30.0), "low_warning");
    assert_eq!(verdict(5.0), "low_critical");
    assert_eq!(verdict(-3.0), "low_critical");
}
