//! Rule template library.
//!
//! Templates are shipped `.rule` files whose names embed a pseudo-asset
//! placeholder, `__{type}__` or `__{type}_{subtype}__` (for example
//! `average.temperature-input@__rack__.rule`). Instantiation replaces the
//! placeholder and the substitution tokens with the asset's values.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::asset::AssetInfo;

/// The token set understood by [`TemplateStore::instantiate`].
const TOKENS: [&str; 8] = [
    "__name__",
    "__port__",
    "__logicalasset__",
    "__logicalasset_iname__",
    "__severity__",
    "__normalstate__",
    "__rule_result__",
    "__ename__",
];

/// Placeholder pseudo-asset identifier for a type/subtype pair.
///
/// Empty, `unknown` and `N_A` subtypes collapse to the bare type form.
pub fn placeholder_name(asset_type: &str, subtype: &str) -> String {
    if subtype.is_empty() || subtype == "unknown" || subtype == "N_A" {
        format!("__{}__", asset_type)
    } else {
        format!("__{}_{}__", asset_type, subtype)
    }
}

/// Read-only view over the template directory.
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Every template as a `(file_name, body)` pair, sorted by name.
    pub fn load_all(&self) -> Vec<(String, String)> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) => {
                info!(path = %self.dir.display(), error = %e, "template directory not readable");
                return Vec::new();
            }
        };
        let mut templates: Vec<(String, String)> = entries
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                let name = path.file_name()?.to_str()?.to_string();
                if !path.is_file() || name.starts_with('.') {
                    return None;
                }
                match fs::read_to_string(&path) {
                    Ok(body) => Some((name, body)),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to read template");
                        None
                    }
                }
            })
            .collect();
        templates.sort();
        templates
    }

    /// Templates applicable to a type/subtype pair (file name contains the
    /// placeholder). Fast-track assets skip the datacenter realpower rule.
    pub fn matching(&self, asset_type: &str, subtype: &str, fast_track: bool) -> Vec<(String, String)> {
        let placeholder = placeholder_name(asset_type, subtype);
        self.load_all()
            .into_iter()
            .filter(|(name, _)| name.contains(&placeholder))
            .filter(|(name, _)| {
                if fast_track && name == "realpower.default@__datacenter__.rule" {
                    debug!(template = %name, "matched but skipped for fast track");
                    return false;
                }
                true
            })
            .collect()
    }

    /// Whether any template applies to the type/subtype pair.
    pub fn has_match(&self, asset_type: &str, subtype: &str) -> bool {
        let placeholder = placeholder_name(asset_type, subtype);
        self.load_all().iter().any(|(name, _)| name.contains(&placeholder))
    }

    /// Substitute every token in a template body for one asset.
    ///
    /// `logical_ename` is the display name of the container the asset's
    /// `logical_asset` attribute points at.
    pub fn instantiate(
        &self,
        body: &str,
        asset_id: &str,
        info: &AssetInfo,
        logical_ename: &str,
    ) -> String {
        let severity = info.attribute("alarm_severity").unwrap_or_default();
        let port = info
            .attribute("port")
            .map(|p| format!("GPI{}", p))
            .unwrap_or_default();
        let replacements = [
            asset_id.to_string(),
            port,
            logical_ename.to_string(),
            info.attribute("logical_asset").unwrap_or_default().to_string(),
            severity.to_string(),
            info.attribute("normal_state").unwrap_or_default().to_string(),
            severity.to_lowercase(),
            info.attribute("name").unwrap_or(asset_id).to_string(),
        ];

        let mut out = body.to_string();
        for (token, replacement) in TOKENS.iter().zip(replacements.iter()) {
            out = out.replace(token, replacement);
        }
        // the pseudo-asset placeholder resolves to the asset id itself
        out = out.replace(&placeholder_name(&info.asset_type, &info.subtype), asset_id);
        out
    }

    /// The rule name a template yields for one asset: the placeholder part
    /// of the file stem replaced by the asset id.
    pub fn rule_name_for(template_name: &str, asset_id: &str) -> String {
        let stem = template_name.trim_end_matches(".rule");
        match stem.split_once('@') {
            Some((prefix, _)) => format!("{}@{}", prefix, asset_id),
            None => stem.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::AssetOperation;
    use std::collections::HashMap;

    fn rack_info() -> AssetInfo {
        AssetInfo {
            asset_type: "rack".into(),
            subtype: String::new(),
            operation: AssetOperation::Create,
            update_ts: "1".into(),
            configured: false,
            last_attempt: 0,
            attributes: [("name", "Rack 3"), ("logical_asset", "room-1")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            locations: vec![],
        }
    }

    #[test]
    fn placeholder_collapses_empty_subtypes() {
        assert_eq!(placeholder_name("rack", ""), "__rack__");
        assert_eq!(placeholder_name("device", "unknown"), "__device__");
        assert_eq!(placeholder_name("device", "N_A"), "__device__");
        assert_eq!(placeholder_name("device", "epdu"), "__device_epdu__");
    }

    #[test]
    fn matching_filters_by_placeholder_and_fast_track() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "average.temperature-input@__rack__.rule",
            "voltage.input_1phase@__device_epdu__.rule",
            "realpower.default@__datacenter__.rule",
        ] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }
        let store = TemplateStore::new(dir.path());

        let racks = store.matching("rack", "", false);
        assert_eq!(racks.len(), 1);
        assert!(racks[0].0.contains("__rack__"));

        assert_eq!(store.matching("datacenter", "", false).len(), 1);
        assert!(store.matching("datacenter", "", true).is_empty());
        assert!(store.has_match("device", "epdu"));
        assert!(!store.has_match("device", "ups"));
    }

    #[test]
    fn instantiate_replaces_tokens_and_placeholder() {
        let store = TemplateStore::new("/nonexistent");
        let body = r#"{"threshold": {"rule_name": "average.temperature-input@__name__",
            "element": "__rack__", "rule_desc": "__ename__ in __logicalasset__"}}"#;
        let out = store.instantiate(body, "rack-3", &rack_info(), "Server Room");
        assert!(out.contains("average.temperature-input@rack-3"));
        assert!(out.contains(r#""element": "rack-3""#));
        assert!(out.contains("Rack 3 in Server Room"));
        assert!(!out.contains("__"));
    }

    #[test]
    fn rule_name_follows_the_template_stem() {
        assert_eq!(
            TemplateStore::rule_name_for("phase_imbalance@__rack__.rule", "rack-3"),
            "phase_imbalance@rack-3"
        );
        assert_eq!(
            TemplateStore::rule_name_for("plain.rule", "rack-3"),
            "plain"
        );
    }
}
