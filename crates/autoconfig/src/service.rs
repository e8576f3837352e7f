//! Autoconfigurator state and decision logic.
//!
//! The service owns the asset inventory, the container index and the state
//! file. The worker drives it from three directions (asset stream, polling
//! timer, template-list RPC); one mutex guards the inventory so the timer
//! and the stream handler may mutate it without races. Locks are held only
//! around map access, never across the RPC round-trips.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use sentinel_core::{AssetOperation, AssetPayload, AssetStatus};
use tracing::{debug, info, warn};

use crate::asset::AssetInfo;
use crate::phases::{rule_phase_applicable, PhaseObservations};
use crate::state::StateStore;
use crate::templates::TemplateStore;

/// How long a phase-metric sighting stays usable as applicability evidence.
const OBSERVATION_HORIZON_S: u64 = 600;

/// Side effect an asset event asks the worker to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetAction {
    /// Ask the rule engine to drop every rule bound to this asset.
    DeleteElement(String),
}

/// The rule documents one asset is waiting to have added.
#[derive(Debug, Clone)]
pub struct PendingRules {
    pub asset: String,
    pub rules: Vec<String>,
}

pub struct Autoconfigurator {
    inventory: Mutex<HashMap<String, AssetInfo>>,
    /// Container display names, `iname → ename`, for the four location
    /// types; feeds `__logicalasset__` substitution.
    containers: Mutex<HashMap<String, String>>,
    state: Mutex<StateStore>,
    templates: Mutex<TemplateStore>,
    observations: Mutex<PhaseObservations>,
}

impl Autoconfigurator {
    pub fn new(state_dir: impl Into<PathBuf>, templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            inventory: Mutex::new(HashMap::new()),
            containers: Mutex::new(HashMap::new()),
            state: Mutex::new(StateStore::new(state_dir)),
            templates: Mutex::new(TemplateStore::new(templates_dir)),
            observations: Mutex::new(PhaseObservations::new(OBSERVATION_HORIZON_S)),
        }
    }

    /// Re-point the state directory and load what it holds.
    pub fn configure(&self, state_dir: impl Into<PathBuf>) {
        let store = StateStore::new(state_dir);
        match store.load() {
            Ok(loaded) => {
                info!(assets = loaded.len(), "state file loaded");
                *self.lock_inventory() = loaded;
            }
            Err(e) => warn!(error = %e, "cannot parse state file, starting empty"),
        }
        *self.lock_state() = store;
    }

    pub fn set_templates_dir(&self, dir: impl Into<PathBuf>) {
        *self.lock_templates() = TemplateStore::new(dir);
    }

    /// Record a metric sighting for the phase fallback.
    pub fn note_metric(&self, topic: &str, now_s: u64) {
        self.lock_observations().note(topic, now_s);
    }

    // ── Asset stream ────────────────────────────────────────────────

    /// Fold one asset event into the inventory.
    ///
    /// Returns the action (if any) the worker must send to the rule engine.
    pub fn handle_asset(&self, payload: &AssetPayload) -> Option<AssetAction> {
        if payload.operation == AssetOperation::Inventory {
            return None;
        }

        self.maintain_containers(payload);

        if payload.asset_type().is_empty() {
            debug!(asset = %payload.name, "asset message without a type, ignoring");
            return None;
        }

        let removing = payload.operation == AssetOperation::Delete
            || payload.operation == AssetOperation::Retire
            || payload.status() == AssetStatus::Nonactive;

        if removing {
            {
                let mut inventory = self.lock_inventory();
                inventory.remove(&payload.name);
                self.save_state(&inventory);
            }
            // GPIO endpoints have no engine-side rules to clean up.
            if matches!(payload.subtype(), "sensorgpio" | "gpo") {
                return None;
            }
            info!(asset = %payload.name, "asset removed, requesting rule deletion");
            return Some(AssetAction::DeleteElement(payload.name.clone()));
        }

        let mut inventory = self.lock_inventory();
        if let Some(existing) = inventory.get(&payload.name) {
            if payload.operation == AssetOperation::Update
                && existing.update_ts == payload.update_ts()
                && existing.same_as_payload(payload)
            {
                debug!(asset = %payload.name, "update without changes, ignoring");
                return None;
            }
        }

        let info = AssetInfo::from_payload(payload);
        inventory.insert(payload.name.clone(), info);
        self.save_state(&inventory);
        debug!(asset = %payload.name, "asset recorded for configuration");
        None
    }

    fn maintain_containers(&self, payload: &AssetPayload) {
        if !payload.is_container() {
            return;
        }
        let mut containers = self.lock_containers();
        if payload.operation != AssetOperation::Delete && payload.status() == AssetStatus::Active {
            containers.insert(payload.name.clone(), payload.display_name().to_string());
        } else {
            containers.remove(&payload.name);
        }
    }

    /// Display name of a container by internal name.
    pub fn container_ename(&self, iname: &str) -> Option<String> {
        self.lock_containers().get(iname).cloned()
    }

    // ── Polling ─────────────────────────────────────────────────────

    /// Collect the rule documents every unconfigured asset is waiting for.
    ///
    /// Assets with no applicable template at all are marked configured on
    /// the spot; the rest get their instantiated rules returned for the
    /// worker to send, and their attempt time stamped.
    pub fn poll(&self, now_s: u64) -> Vec<PendingRules> {
        let mut pending = Vec::new();
        let mut inventory = self.lock_inventory();
        let templates = self.lock_templates();
        let observations = self.lock_observations();
        let containers = self.lock_containers();
        let mut dirty = false;

        for (asset_id, info) in inventory.iter_mut() {
            if info.configured {
                continue;
            }
            if !templates.has_match(&info.asset_type, &info.subtype) {
                info!(asset = %asset_id, "no applicable template, nothing to configure");
                info.configured = true;
                dirty = true;
                continue;
            }

            let fast_track = info.attribute("fast_track") == Some("true");
            let logical_ename = info
                .attribute("logical_asset")
                .and_then(|la| containers.get(la).cloned())
                .unwrap_or_default();

            let mut rules = Vec::new();
            for (template_name, body) in
                templates.matching(&info.asset_type, &info.subtype, fast_track)
            {
                if info.subtype == "sensorgpio" {
                    if let Some(model) = info.attribute("model") {
                        if !body.contains(model) {
                            debug!(asset = %asset_id, template = %template_name, "model mismatch, skipping");
                            continue;
                        }
                    }
                }

                let rule_name = TemplateStore::rule_name_for(&template_name, asset_id);
                if !rule_phase_applicable(&rule_name, asset_id, info, &observations, now_s) {
                    continue;
                }

                rules.push(templates.instantiate(&body, asset_id, info, &logical_ename));
            }

            info.last_attempt = now_s.max(1);
            pending.push(PendingRules {
                asset: asset_id.clone(),
                rules,
            });
        }

        if dirty {
            self.save_state(&inventory);
        }
        pending
    }

    /// Record the outcome of a configuration round for one asset.
    pub fn mark_configured(&self, asset: &str, success: bool) {
        let mut inventory = self.lock_inventory();
        if let Some(info) = inventory.get_mut(asset) {
            if success {
                info.configured = true;
                info!(asset = %asset, "asset configured");
            } else {
                debug!(asset = %asset, "asset not configured yet");
            }
        }
        self.save_state(&inventory);
    }

    /// Poll cadence: 5 s while an asset waits for its first attempt, 60 s
    /// while retrying, idle when everything is configured.
    pub fn next_poll_seconds(&self) -> Option<u64> {
        let inventory = self.lock_inventory();
        let mut interval = None;
        for info in inventory.values() {
            if info.configured {
                continue;
            }
            if info.last_attempt == 0 {
                return Some(5);
            }
            interval = Some(60);
        }
        interval
    }

    // ── Template listing RPC ────────────────────────────────────────

    /// Template list with applicable assets, for the listing RPC.
    ///
    /// `filter` is `all` or a category tag matched as a substring of the
    /// template body. Each entry is `(name, body, comma-joined asset ids)`.
    pub fn list_templates(&self, filter: &str, now_s: u64) -> Vec<(String, String, String)> {
        let inventory = self.lock_inventory();
        let templates = self.lock_templates();
        let observations = self.lock_observations();

        templates
            .load_all()
            .into_iter()
            .filter(|(_, body)| filter == "all" || body.contains(filter))
            .map(|(name, body)| {
                let mut assets: Vec<&str> = inventory
                    .iter()
                    .filter(|(_, info)| {
                        name.contains(&crate::templates::placeholder_name(
                            &info.asset_type,
                            &info.subtype,
                        ))
                    })
                    .filter(|(id, info)| {
                        let rule_name = TemplateStore::rule_name_for(&name, id);
                        rule_phase_applicable(&rule_name, id, info, &observations, now_s)
                    })
                    .filter(|(_, info)| {
                        if info.subtype != "sensorgpio" {
                            return true;
                        }
                        info.attribute("model")
                            .map(|m| body.contains(m))
                            .unwrap_or(true)
                    })
                    .map(|(id, _)| id.as_str())
                    .collect();
                assets.sort_unstable();
                (name, body, assets.join(","))
            })
            .collect()
    }

    pub fn asset_count(&self) -> usize {
        self.lock_inventory().len()
    }

    pub fn is_configured(&self, asset: &str) -> bool {
        self.lock_inventory()
            .get(asset)
            .map(|i| i.configured)
            .unwrap_or(false)
    }

    // ── Internals ───────────────────────────────────────────────────

    fn save_state(&self, inventory: &HashMap<String, AssetInfo>) {
        if let Err(e) = self.lock_state().save(inventory) {
            warn!(error = %e, "failed to persist state file");
        }
    }

    fn lock_inventory(&self) -> std::sync::MutexGuard<'_, HashMap<String, AssetInfo>> {
        self.inventory.lock().expect("inventory lock poisoned")
    }

    fn lock_containers(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.containers.lock().expect("containers lock poisoned")
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, StateStore> {
        self.state.lock().expect("state lock poisoned")
    }

    fn lock_templates(&self) -> std::sync::MutexGuard<'_, TemplateStore> {
        self.templates.lock().expect("templates lock poisoned")
    }

    fn lock_observations(&self) -> std::sync::MutexGuard<'_, PhaseObservations> {
        self.observations.lock().expect("observations lock poisoned")
    }
}
