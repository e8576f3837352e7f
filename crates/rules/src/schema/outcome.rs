//! Rule evaluation outcomes.

use indexmap::IndexMap;
use sentinel_core::Severity;
use serde::{Deserialize, Serialize};

/// One possible outcome of a rule evaluation.
///
/// Severity is declared by the rule author per outcome; the implicit `ok`
/// outcome is not stored here and always maps to a resolved alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Action tags handed to downstream dispatchers (e.g. `EMAIL`, `SMS`).
    pub actions: Vec<String>,
    pub severity: Severity,
    pub description: String,
    /// Display name of the threshold that produced this outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_name: Option<String>,
}

/// Outcome map keyed by outcome key, in declaration order.
pub type ResultsMap = IndexMap<String, Outcome>;
