//! Filesystem-backed rule catalog with name, topic and asset indexes.
//!
//! One rule persists as one file, `{rules_dir}/{name}.rule`, holding the
//! canonical serialization. Writes go to a temp file in the same directory
//! and are renamed into place so a crash can never leave a torn rule file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{Result, RuleError};
use crate::schema::{parse_rule, rule_to_json_string, Rule, RuleKind};
use crate::script::{OutcomeToken, RuleScript, ScriptError};

/// A catalog slot: the rule plus its compiled artifacts.
///
/// The pattern regex is compiled at insert time (it was already validated by
/// the codec); the script evaluator is created lazily on first evaluation
/// and dropped with the entry.
pub struct CatalogEntry {
    pub rule: Rule,
    pattern: Option<Regex>,
    script: Option<RuleScript>,
}

impl CatalogEntry {
    fn new(rule: Rule) -> Result<Self> {
        let pattern = match rule.pattern_source() {
            Some(src) => Some(
                Regex::new(src)
                    .map_err(|e| RuleError::BadJson(format!("bad 'target' regex: {}", e)))?,
            ),
            None => None,
        };
        Ok(Self {
            rule,
            pattern,
            script: None,
        })
    }

    /// Whether a metric on `topic` should trigger this rule.
    pub fn matches_topic(&self, topic: &str) -> bool {
        match &self.pattern {
            Some(regex) => regex.is_match(topic),
            None => self.rule.needed_topics().iter().any(|t| t == topic),
        }
    }

    /// Evaluate the rule script on the gathered metric values.
    pub fn evaluate(&mut self, args: &[f64]) -> std::result::Result<OutcomeToken, ScriptError> {
        if self.script.is_none() {
            self.script = Some(RuleScript::compile(&self.rule.code, &self.rule.variables)?);
        }
        self.script
            .as_ref()
            .expect("script compiled above")
            .evaluate(args)
    }
}

/// Outcome of loading one `.rule` file during the startup scan.
#[derive(Debug)]
pub enum LoadStatus {
    Loaded { name: String },
    Skipped { reason: String },
    Failed { error: String },
}

/// Per-file result of [`RuleCatalog::load_all`].
#[derive(Debug)]
pub struct LoadResult {
    pub path: PathBuf,
    pub status: LoadStatus,
}

/// The rule catalog: entries by name plus topic and asset indexes.
///
/// Threshold, single and flexible rules are indexed by their literal topics;
/// pattern rules cannot be (no topic ever equals a regex source), so they
/// live on their own list and are routed by regex match.
pub struct RuleCatalog {
    dir: PathBuf,
    entries: IndexMap<String, CatalogEntry>,
    by_metric: HashMap<String, Vec<String>>,
    by_asset: HashMap<String, Vec<String>>,
    patterns: Vec<String>,
}

impl RuleCatalog {
    /// Create a catalog over the given directory, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if !dir.exists() {
            if let Err(e) = fs::create_dir_all(&dir) {
                warn!(path = %dir.display(), error = %e, "failed to create rules directory");
            }
        }
        Self {
            dir,
            entries: IndexMap::new(),
            by_metric: HashMap::new(),
            by_asset: HashMap::new(),
            patterns: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut CatalogEntry> {
        self.entries.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CatalogEntry)> {
        self.entries.iter()
    }

    /// Scan the rules directory and load every `*.rule` file.
    ///
    /// A file whose inner name disagrees with its stem is skipped with a
    /// warning, as is a duplicate name (first wins). Parse errors are
    /// reported per file and do not abort the scan.
    pub fn load_all(&mut self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %self.dir.display(), error = %e, "failed to read rules directory");
                return Ok(results);
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        for path in paths {
            let is_rule_file = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "rule")
                .unwrap_or(false);
            if !is_rule_file {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a .rule file".into(),
                    },
                });
                continue;
            }

            let status = self.load_file(&path);
            results.push(LoadResult { path, status });
        }
        Ok(results)
    }

    fn load_file(&mut self, path: &Path) -> LoadStatus {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => return LoadStatus::Failed { error: e.to_string() },
        };

        let rule = match parse_rule(&contents) {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse rule file");
                return LoadStatus::Failed { error: e.to_string() };
            }
        };

        if rule.name != stem {
            warn!(path = %path.display(), rule = %rule.name, "file name disagrees with rule name, skipping");
            return LoadStatus::Skipped {
                reason: format!("file name disagrees with rule name '{}'", rule.name),
            };
        }
        if self.entries.contains_key(&rule.name) {
            warn!(rule = %rule.name, "duplicate rule name, first wins");
            return LoadStatus::Skipped {
                reason: "duplicate rule name".into(),
            };
        }
        if let Err(e) = RuleScript::compile(&rule.code, &rule.variables) {
            warn!(rule = %rule.name, error = %e, "rule script does not compile, skipping");
            return LoadStatus::Failed { error: e.to_string() };
        }

        let name = rule.name.clone();
        match CatalogEntry::new(rule) {
            Ok(entry) => {
                self.insert_entry(entry);
                info!(rule = %name, path = %path.display(), "loaded rule");
                LoadStatus::Loaded { name }
            }
            Err(e) => LoadStatus::Failed { error: e.to_string() },
        }
    }

    /// Parse, validate and insert a new rule; persists before indexing.
    ///
    /// Returns the new rule's name.
    pub fn add(&mut self, json: &str) -> Result<String> {
        let rule = parse_rule(json)?;
        RuleScript::compile(&rule.code, &rule.variables)
            .map_err(|e| RuleError::BadScript(e.to_string()))?;
        if self.entries.contains_key(&rule.name) {
            return Err(RuleError::AlreadyExists(rule.name));
        }

        self.persist(&rule)?;
        let name = rule.name.clone();
        self.insert_entry(CatalogEntry::new(rule)?);
        info!(rule = %name, "rule added");
        Ok(name)
    }

    /// Replace `old_name` with the rule parsed from `json`.
    ///
    /// Returns the new name and the replaced rule (whose open alerts the
    /// caller must resolve).
    pub fn update(&mut self, json: &str, old_name: &str) -> Result<(String, Rule)> {
        let rule = parse_rule(json)?;
        RuleScript::compile(&rule.code, &rule.variables)
            .map_err(|e| RuleError::BadScript(e.to_string()))?;
        if !self.entries.contains_key(old_name) {
            return Err(RuleError::NotFound(old_name.to_string()));
        }
        if rule.name != old_name && self.entries.contains_key(&rule.name) {
            return Err(RuleError::AlreadyExists(rule.name));
        }

        self.persist(&rule)?;
        let old = self
            .remove_entry(old_name)
            .expect("existence checked above");
        if rule.name != old_name {
            self.remove_rule_file(old_name);
        }
        let name = rule.name.clone();
        self.insert_entry(CatalogEntry::new(rule)?);
        info!(rule = %name, old = %old_name, "rule updated");
        Ok((name, old.rule))
    }

    /// Delete the named rule. Returns the removed rules (empty = no match).
    pub fn delete(&mut self, name: &str) -> Vec<Rule> {
        match self.remove_entry(name) {
            Some(entry) => {
                self.remove_rule_file(name);
                info!(rule = %name, "rule deleted");
                vec![entry.rule]
            }
            None => Vec::new(),
        }
    }

    /// Delete every rule referencing `asset`. Returns the removed rules.
    pub fn delete_by_asset(&mut self, asset: &str) -> Vec<Rule> {
        let names: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.rule.references_asset(asset))
            .map(|(n, _)| n.clone())
            .collect();

        let mut removed = Vec::new();
        for name in names {
            if let Some(entry) = self.remove_entry(&name) {
                self.remove_rule_file(&name);
                info!(rule = %name, asset = %asset, "rule deleted with asset");
                removed.push(entry.rule);
            }
        }
        removed
    }

    /// Names of the rules interested in a metric on `topic`: literal index
    /// hits plus every pattern rule whose regex matches. Each rule appears
    /// at most once regardless of how many ways it matches.
    pub fn rules_for_topic(&self, topic: &str) -> Vec<String> {
        let mut names: Vec<String> = self.by_metric.get(topic).cloned().unwrap_or_default();
        for name in &self.patterns {
            let matches = self
                .entries
                .get(name)
                .map(|entry| entry.matches_topic(topic))
                .unwrap_or(false);
            if matches && !names.iter().any(|n| n == name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Names of the rules bound to `asset`.
    pub fn rules_for_asset(&self, asset: &str) -> Vec<String> {
        self.by_asset.get(asset).cloned().unwrap_or_default()
    }

    // ── Index and persistence internals ─────────────────────────────

    fn insert_entry(&mut self, entry: CatalogEntry) {
        let name = entry.rule.name.clone();
        if entry.rule.kind == RuleKind::Pattern {
            self.patterns.push(name.clone());
        } else {
            for topic in entry.rule.needed_topics() {
                self.by_metric.entry(topic).or_default().push(name.clone());
            }
        }
        for asset in &entry.rule.assets {
            self.by_asset
                .entry(asset.clone())
                .or_default()
                .push(name.clone());
        }
        self.entries.insert(name, entry);
    }

    fn remove_entry(&mut self, name: &str) -> Option<CatalogEntry> {
        let entry = self.entries.shift_remove(name)?;
        if entry.rule.kind == RuleKind::Pattern {
            self.patterns.retain(|n| n != name);
        } else {
            for topic in entry.rule.needed_topics() {
                if let Some(names) = self.by_metric.get_mut(&topic) {
                    names.retain(|n| n != name);
                    if names.is_empty() {
                        self.by_metric.remove(&topic);
                    }
                }
            }
        }
        for asset in &entry.rule.assets {
            if let Some(names) = self.by_asset.get_mut(asset) {
                names.retain(|n| n != name);
                if names.is_empty() {
                    self.by_asset.remove(asset);
                }
            }
        }
        Some(entry)
    }

    fn rule_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.rule", name))
    }

    /// Write the canonical serialization via temp file + atomic rename.
    fn persist(&self, rule: &Rule) -> Result<()> {
        let tmp = self.dir.join(format!(".{}.rule.tmp", rule.name));
        fs::write(&tmp, rule_to_json_string(rule))?;
        fs::rename(&tmp, self.rule_path(&rule.name))?;
        Ok(())
    }

    fn remove_rule_file(&self, name: &str) {
        let path = self.rule_path(name);
        if let Err(e) = fs::remove_file(&path) {
            debug!(path = %path.display(), error = %e, "could not remove rule file");
        }
    }
}
