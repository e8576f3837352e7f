//! Asset stream payloads and their attribute accessors.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Operation carried by an ASSETS stream message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetOperation {
    Create,
    Update,
    Delete,
    Retire,
    Inventory,
}

impl fmt::Display for AssetOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetOperation::Create => "create",
            AssetOperation::Update => "update",
            AssetOperation::Delete => "delete",
            AssetOperation::Retire => "retire",
            AssetOperation::Inventory => "inventory",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for AssetOperation {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(AssetOperation::Create),
            "update" => Ok(AssetOperation::Update),
            "delete" => Ok(AssetOperation::Delete),
            "retire" => Ok(AssetOperation::Retire),
            "inventory" => Ok(AssetOperation::Inventory),
            other => Err(ModelError::UnknownOperation(other.to_string())),
        }
    }
}

/// Administrative status of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Active,
    Nonactive,
}

/// Wire payload of an ASSETS stream message.
///
/// `aux` holds the structural attributes (type, subtype, status, priority,
/// `parent_name.1`..`parent_name.4`); `ext` holds the extended attributes
/// (display `name`, contacts, `phases.input`/`phases.output`, `model`,
/// `update_ts`, `logical_asset`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPayload {
    /// Internal asset identifier, e.g. `rack-3`.
    pub name: String,
    pub operation: AssetOperation,
    #[serde(default)]
    pub aux: HashMap<String, String>,
    #[serde(default)]
    pub ext: HashMap<String, String>,
}

impl AssetPayload {
    pub fn asset_type(&self) -> &str {
        self.aux.get("type").map(String::as_str).unwrap_or("")
    }

    pub fn subtype(&self) -> &str {
        self.aux.get("subtype").map(String::as_str).unwrap_or("")
    }

    /// Status defaults to active when the attribute is absent.
    pub fn status(&self) -> AssetStatus {
        match self.aux.get("status").map(String::as_str) {
            Some("nonactive") => AssetStatus::Nonactive,
            _ => AssetStatus::Active,
        }
    }

    /// Priority clamps into 1..=5, defaulting to the lowest priority.
    pub fn priority(&self) -> u8 {
        self.aux
            .get("priority")
            .and_then(|p| p.trim_start_matches('P').parse::<u8>().ok())
            .map(|p| p.clamp(1, 5))
            .unwrap_or(5)
    }

    /// Containment chain, outermost first (`parent_name.1`..`parent_name.4`).
    pub fn parents(&self) -> Vec<String> {
        (1..=4)
            .filter_map(|i| self.aux.get(&format!("parent_name.{}", i)).cloned())
            .collect()
    }

    /// Display name, falling back to the internal identifier.
    pub fn display_name(&self) -> &str {
        self.ext.get("name").map(String::as_str).unwrap_or(&self.name)
    }

    pub fn update_ts(&self) -> &str {
        self.aux
            .get("update_ts")
            .or_else(|| self.ext.get("update_ts"))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// True for the four location container types.
    pub fn is_container(&self) -> bool {
        matches!(self.asset_type(), "datacenter" | "room" | "row" | "rack")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(aux: &[(&str, &str)], ext: &[(&str, &str)]) -> AssetPayload {
        AssetPayload {
            name: "rack-3".into(),
            operation: AssetOperation::Create,
            aux: aux.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            ext: ext.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn status_defaults_to_active() {
        assert_eq!(asset(&[], &[]).status(), AssetStatus::Active);
        assert_eq!(
            asset(&[("status", "nonactive")], &[]).status(),
            AssetStatus::Nonactive
        );
    }

    #[test]
    fn parents_follow_aux_numbering() {
        let a = asset(
            &[("parent_name.1", "room-1"), ("parent_name.2", "dc-1")],
            &[],
        );
        assert_eq!(a.parents(), vec!["room-1".to_string(), "dc-1".to_string()]);
    }

    #[test]
    fn display_name_falls_back_to_iname() {
        assert_eq!(asset(&[], &[("name", "Rack 3")]).display_name(), "Rack 3");
        assert_eq!(asset(&[], &[]).display_name(), "rack-3");
    }

    #[test]
    fn containers_are_the_four_location_types() {
        assert!(asset(&[("type", "rack")], &[]).is_container());
        assert!(asset(&[("type", "datacenter")], &[]).is_container());
        assert!(!asset(&[("type", "device")], &[]).is_container());
    }
}
