//! Rule kind enum used for codec dispatch and LIST filtering.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The four rule kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// One metric, one asset; script synthesized from the threshold values.
    Threshold,
    /// A fixed list of topics, all required, one asset.
    Single,
    /// A regex over topics; the alert element comes from the triggering sample.
    Pattern,
    /// General form: metric names crossed with a list of assets.
    Flexible,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleKind::Threshold => "threshold",
            RuleKind::Single => "single",
            RuleKind::Pattern => "pattern",
            RuleKind::Flexible => "flexible",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "threshold" => Ok(RuleKind::Threshold),
            "single" => Ok(RuleKind::Single),
            "pattern" => Ok(RuleKind::Pattern),
            "flexible" => Ok(RuleKind::Flexible),
            other => Err(format!("unknown rule kind: '{}'", other)),
        }
    }
}
