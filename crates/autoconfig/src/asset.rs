//! Cached per-asset configuration state.

use std::collections::HashMap;

use sentinel_core::{AssetOperation, AssetPayload};
use serde::{Deserialize, Serialize};

/// Everything the autoconfigurator remembers about one asset.
///
/// Persisted in the state file so configured assets are not re-templated on
/// restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    #[serde(rename = "type")]
    pub asset_type: String,
    pub subtype: String,
    pub operation: AssetOperation,
    #[serde(default)]
    pub update_ts: String,
    /// True once every applicable template produced a rule.
    #[serde(default)]
    pub configured: bool,
    /// Monotonic time of the last configuration attempt; 0 = never tried.
    #[serde(default)]
    pub last_attempt: u64,
    /// Extended attributes as carried by the asset message.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Containment chain, outermost first.
    #[serde(default)]
    pub locations: Vec<String>,
}

impl AssetInfo {
    pub fn from_payload(payload: &AssetPayload) -> Self {
        Self {
            asset_type: payload.asset_type().to_string(),
            subtype: payload.subtype().to_string(),
            operation: payload.operation,
            update_ts: payload.update_ts().to_string(),
            configured: false,
            last_attempt: 0,
            attributes: payload.ext.clone(),
            locations: payload.parents(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// True when an UPDATE message carries nothing new versus this record.
    ///
    /// Guards against hourly republish storms re-triggering configuration.
    pub fn same_as_payload(&self, payload: &AssetPayload) -> bool {
        self.operation == payload.operation
            && self.asset_type == payload.asset_type()
            && self.subtype == payload.subtype()
            && self.attributes == payload.ext
    }
}
