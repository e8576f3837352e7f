//! The rule model shared by all four kinds.

use sentinel_core::metric_topic;
use serde_json::{Map, Value};

use indexmap::IndexMap;

use super::{Outcome, ResultsMap, RuleKind};

/// Default origin tag for rules not instantiated from a template.
pub const MANUAL_SOURCE: &str = "Manual user input";

/// A parsed rule of any kind.
///
/// Rule names are unique ASCII identifiers; the persistence file name equals
/// `{name}.rule`. `extra` carries the unrecognized JSON members of the source
/// document so they survive a round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub kind: RuleKind,
    pub name: String,
    pub description: Option<String>,
    pub class: Option<String>,
    pub categories: Vec<String>,
    /// Metric topics; for pattern rules a single regex over topics.
    pub metrics: Vec<String>,
    /// Element names the rule applies to; may be empty for pattern rules.
    pub assets: Vec<String>,
    pub results: ResultsMap,
    /// Origin tag; the sender's address when instantiated from a template.
    pub source: String,
    /// Numeric variables injected as globals into the script.
    pub variables: IndexMap<String, f64>,
    pub values_unit: Option<String>,
    /// Script body; synthesized for threshold rules.
    pub code: String,
    pub hierarchy: Option<String>,
    /// Device models a flexible rule is limited to.
    pub models: Vec<String>,
    /// Unrecognized JSON members, round-tripped verbatim.
    pub extra: Map<String, Value>,
}

impl Rule {
    /// Topics whose samples this rule consumes.
    ///
    /// For pattern rules the single entry is the regex source; the catalog
    /// routes those by regex match rather than through the literal topic
    /// index. Flexible rules consume the cross product of their metric
    /// names and assets.
    pub fn needed_topics(&self) -> Vec<String> {
        match self.kind {
            RuleKind::Threshold | RuleKind::Single | RuleKind::Pattern => self.metrics.clone(),
            RuleKind::Flexible => self
                .assets
                .iter()
                .flat_map(|asset| {
                    self.metrics
                        .iter()
                        .map(move |metric| metric_topic(metric, asset))
                })
                .collect(),
        }
    }

    /// The regex source of a pattern rule.
    pub fn pattern_source(&self) -> Option<&str> {
        match self.kind {
            RuleKind::Pattern => self.metrics.first().map(String::as_str),
            _ => None,
        }
    }

    /// Look up the outcome declared for `key`.
    pub fn outcome(&self, key: &str) -> Option<&Outcome> {
        self.results.get(key)
    }

    /// True when `asset` is one of the rule's bound elements.
    pub fn references_asset(&self, asset: &str) -> bool {
        self.assets.iter().any(|a| a == asset)
    }

    /// Rule names are ASCII identifiers compared exactly; input that is not
    /// valid UTF-8 never reaches this point.
    pub fn has_name(&self, name: &str) -> bool {
        self.name == name
    }
}

/// Synthesize the evaluation script of a threshold rule from its variables.
///
/// Branches are emitted only for the threshold values actually present, in
/// the order `high_critical`, `high_warning`, `low_critical`, `low_warning`;
/// anything that falls through resolves to `ok`.
pub fn synthesize_threshold_script(variables: &IndexMap<String, f64>) -> String {
    let mut body = String::from("fn main(v) {");
    if variables.contains_key("high_critical") {
        body.push_str(" if v > high_critical { return \"high_critical\"; }");
    }
    if variables.contains_key("high_warning") {
        body.push_str(" if v > high_warning { return \"high_warning\"; }");
    }
    if variables.contains_key("low_critical") {
        body.push_str(" if v < low_critical { return \"low_critical\"; }");
    }
    if variables.contains_key("low_warning") {
        body.push_str(" if v < low_warning { return \"low_warning\"; }");
    }
    body.push_str(" \"ok\" }");
    body
}
