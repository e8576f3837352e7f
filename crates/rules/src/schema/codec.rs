//! JSON codec for the serialized rule form.

use indexmap::IndexMap;
use sentinel_core::Severity;
use serde_json::{json, Map, Value};

use crate::error::{Result, RuleError};

use super::{synthesize_threshold_script, Outcome, ResultsMap, Rule, RuleKind, MANUAL_SOURCE};

/// Parse a serialized rule document.
///
/// Structural problems (wrong shapes, missing members, non-numeric values)
/// surface as [`RuleError::BadJson`]; a flexible rule without a bound asset
/// as [`RuleError::NotInstantiable`]. Script compilation is the catalog's
/// concern and is not attempted here.
pub fn parse_rule(input: &str) -> Result<Rule> {
    let doc: Value = serde_json::from_str(input)
        .map_err(|e| RuleError::BadJson(format!("not valid json: {}", e)))?;

    let top = doc
        .as_object()
        .ok_or_else(|| RuleError::BadJson("document root must be an object".into()))?;
    if top.len() != 1 {
        return Err(RuleError::BadJson(
            "document root must have exactly one member keyed by the rule kind".into(),
        ));
    }
    let (kind_key, inner) = top.iter().next().expect("len checked above");
    let kind: RuleKind = kind_key
        .parse()
        .map_err(|e: String| RuleError::BadJson(e))?;

    let mut body = inner
        .as_object()
        .ok_or_else(|| RuleError::BadJson(format!("member '{}' must be an object", kind_key)))?
        .clone();

    let name = take_string(&mut body, "rule_name")?
        .filter(|n| !n.is_empty())
        .ok_or_else(|| RuleError::BadJson("'rule_name' is mandatory".into()))?;
    let description = take_string(&mut body, "rule_desc")?;
    let class = take_string(&mut body, "rule_class")?;
    let hierarchy = take_string(&mut body, "rule_hierarchy")?;
    let source = take_string(&mut body, "rule_source")?.unwrap_or_else(|| MANUAL_SOURCE.into());
    let categories = take_string_list(&mut body, "rule_cat")?;
    let values_unit = take_string(&mut body, "values_unit")?;
    let models = take_string_list(&mut body, "models")?;

    let metrics = take_string_list(&mut body, "target")?;
    if metrics.is_empty() {
        return Err(RuleError::BadJson("'target' is mandatory".into()));
    }
    match kind {
        RuleKind::Threshold | RuleKind::Pattern if metrics.len() != 1 => {
            return Err(RuleError::BadJson(format!(
                "{} rules take a single 'target'",
                kind
            )));
        }
        _ => {}
    }

    let assets = take_string_list(&mut body, "element")?;
    match kind {
        RuleKind::Threshold | RuleKind::Single if assets.is_empty() => {
            return Err(RuleError::BadJson("'element' is mandatory".into()));
        }
        RuleKind::Flexible if assets.is_empty() => {
            // a flexible rule needs a concrete asset bound before it may
            // enter the catalog
            return Err(RuleError::NotInstantiable);
        }
        _ => {}
    }

    if kind == RuleKind::Pattern {
        regex::Regex::new(&metrics[0])
            .map_err(|e| RuleError::BadJson(format!("bad 'target' regex: {}", e)))?;
    }

    let variables = take_values(&mut body)?;
    let results = take_results(&mut body)?;

    let code = match kind {
        RuleKind::Threshold => {
            if variables.is_empty() {
                return Err(RuleError::BadJson(
                    "threshold rules need at least one 'values' entry".into(),
                ));
            }
            // The stored evaluation of a threshold rule is always
            // regenerated from its values, never trusted from input.
            body.remove("evaluation");
            synthesize_threshold_script(&variables)
        }
        _ => take_string(&mut body, "evaluation")?
            .filter(|c| !c.is_empty())
            .ok_or_else(|| RuleError::BadJson("'evaluation' is mandatory".into()))?,
    };

    Ok(Rule {
        kind,
        name,
        description,
        class,
        categories,
        metrics,
        assets,
        results,
        source,
        variables,
        values_unit,
        code,
        hierarchy,
        models,
        extra: body,
    })
}

/// Serialize a rule into its canonical document form.
pub fn rule_to_json(rule: &Rule) -> Value {
    // Unknown members first; known fields are written on top so a duplicate
    // key in `extra` cannot shadow a real field.
    let mut body = rule.extra.clone();

    body.insert("rule_name".into(), json!(rule.name));
    if let Some(d) = &rule.description {
        body.insert("rule_desc".into(), json!(d));
    }
    if let Some(c) = &rule.class {
        body.insert("rule_class".into(), json!(c));
    }
    if !rule.categories.is_empty() {
        body.insert("rule_cat".into(), json!(rule.categories));
    }
    body.insert("rule_source".into(), json!(rule.source));
    if let Some(h) = &rule.hierarchy {
        body.insert("rule_hierarchy".into(), json!(h));
    }

    let target: Value = if rule.metrics.len() == 1 {
        json!(rule.metrics[0])
    } else {
        json!(rule.metrics)
    };
    body.insert("target".into(), target);

    let element: Value = if rule.assets.len() == 1 {
        json!(rule.assets[0])
    } else {
        json!(rule.assets)
    };
    body.insert("element".into(), element);

    let values: Vec<Value> = rule
        .variables
        .iter()
        .map(|(k, v)| {
            let mut entry = Map::new();
            entry.insert(k.clone(), json!(v));
            Value::Object(entry)
        })
        .collect();
    body.insert("values".into(), json!(values));
    if let Some(u) = &rule.values_unit {
        body.insert("values_unit".into(), json!(u));
    }

    let results: Vec<Value> = rule
        .results
        .iter()
        .map(|(key, outcome)| {
            let mut fields = Map::new();
            fields.insert("action".into(), json!(outcome.actions));
            fields.insert("severity".into(), json!(outcome.severity.to_string()));
            fields.insert("description".into(), json!(outcome.description));
            if let Some(t) = &outcome.threshold_name {
                fields.insert("threshold_name".into(), json!(t));
            }
            let mut entry = Map::new();
            entry.insert(key.clone(), Value::Object(fields));
            Value::Object(entry)
        })
        .collect();
    body.insert("results".into(), json!(results));

    body.insert("evaluation".into(), json!(rule.code));
    if !rule.models.is_empty() {
        body.insert("models".into(), json!(rule.models));
    }

    let mut doc = Map::new();
    doc.insert(rule.kind.to_string(), Value::Object(body));
    Value::Object(doc)
}

/// Canonical serialization as a string, as written to `.rule` files.
pub fn rule_to_json_string(rule: &Rule) -> String {
    serde_json::to_string_pretty(&rule_to_json(rule)).expect("rule serialization cannot fail")
}

// ── Field extraction helpers ────────────────────────────────────────

fn take_string(body: &mut Map<String, Value>, key: &str) -> Result<Option<String>> {
    match body.remove(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(RuleError::BadJson(format!(
            "'{}' must be a string, got {}",
            key,
            type_name(&other)
        ))),
    }
}

/// Accept either a bare string or an array of strings.
fn take_string_list(body: &mut Map<String, Value>, key: &str) -> Result<Vec<String>> {
    match body.remove(key) {
        None => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s]),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(RuleError::BadJson(format!(
                    "'{}' entries must be strings, got {}",
                    key,
                    type_name(&other)
                ))),
            })
            .collect(),
        Some(other) => Err(RuleError::BadJson(format!(
            "'{}' must be a string or an array, got {}",
            key,
            type_name(&other)
        ))),
    }
}

/// Numeric variables arrive as an array of single-member objects; the
/// numbers themselves may be JSON numbers or numeric strings.
fn take_values(body: &mut Map<String, Value>) -> Result<IndexMap<String, f64>> {
    let mut variables = IndexMap::new();
    let entries = match body.remove("values") {
        None => return Ok(variables),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(RuleError::BadJson(format!(
                "'values' must be an array, got {}",
                type_name(&other)
            )))
        }
    };
    for entry in entries {
        let obj = entry
            .as_object()
            .ok_or_else(|| RuleError::BadJson("'values' entries must be objects".into()))?;
        for (name, value) in obj {
            let number = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .filter(|n| n.is_finite())
            .ok_or_else(|| {
                RuleError::BadJson(format!("value '{}' is not a finite number", name))
            })?;
            variables.insert(name.clone(), number);
        }
    }
    Ok(variables)
}

fn take_results(body: &mut Map<String, Value>) -> Result<ResultsMap> {
    let entries = match body.remove("results") {
        Some(Value::Array(entries)) if !entries.is_empty() => entries,
        Some(Value::Array(_)) | None => {
            return Err(RuleError::BadJson("'results' is mandatory and nonempty".into()))
        }
        Some(other) => {
            return Err(RuleError::BadJson(format!(
                "'results' must be an array, got {}",
                type_name(&other)
            )))
        }
    };

    let mut results = ResultsMap::new();
    for entry in entries {
        let obj = entry
            .as_object()
            .ok_or_else(|| RuleError::BadJson("'results' entries must be objects".into()))?;
        for (key, outcome) in obj {
            results.insert(key.clone(), parse_outcome(key, outcome)?);
        }
    }
    Ok(results)
}

fn parse_outcome(key: &str, value: &Value) -> Result<Outcome> {
    let obj = value
        .as_object()
        .ok_or_else(|| RuleError::BadJson(format!("outcome '{}' must be an object", key)))?;

    let severity: Severity = obj
        .get("severity")
        .and_then(Value::as_str)
        .ok_or_else(|| RuleError::BadJson(format!("outcome '{}' is missing 'severity'", key)))?
        .parse()
        .map_err(|e: String| RuleError::BadJson(e))?;

    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let threshold_name = obj
        .get("threshold_name")
        .and_then(Value::as_str)
        .map(str::to_string);

    let actions = match obj.get("action") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| parse_action(key, item))
            .collect::<Result<Vec<_>>>()?,
        Some(Value::String(s)) => vec![s.clone()],
        Some(other) => {
            return Err(RuleError::BadJson(format!(
                "outcome '{}' field 'action' must be an array, got {}",
                key,
                type_name(other)
            )))
        }
    };

    Ok(Outcome {
        actions,
        severity,
        description,
        threshold_name,
    })
}

/// Actions come either as plain strings or as objects with an `action`
/// member plus optional `asset`/`mode` qualifiers (GPO interactions). The
/// object form is flattened into a `:`-joined tag.
fn parse_action(key: &str, item: &Value) -> Result<String> {
    match item {
        Value::String(s) => Ok(s.clone()),
        Value::Object(obj) => {
            let action = obj.get("action").and_then(Value::as_str).ok_or_else(|| {
                RuleError::BadJson(format!("outcome '{}' action object without 'action'", key))
            })?;
            let mut tag = action.to_string();
            for qualifier in ["asset", "mode"] {
                if let Some(v) = obj.get(qualifier).and_then(Value::as_str) {
                    tag.push(':');
                    tag.push_str(v);
                }
            }
            Ok(tag)
        }
        other => Err(RuleError::BadJson(format!(
            "outcome '{}' actions must be strings or objects, got {}",
            key,
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
