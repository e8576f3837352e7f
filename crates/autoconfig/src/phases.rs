//! Phase-count applicability filter.
//!
//! A handful of rule families only make sense on devices with a matching
//! phase count: the one-phase and three-phase voltage/load input rules and
//! the phase-imbalance rules. The filter decides from the asset's
//! `phases.input` / `phases.output` extended attributes when present, and
//! otherwise from which `Lx`/`Lx-N` metrics have been observed recently on
//! the METRICS stream. With no information at all the rule is allowed in;
//! its first evaluation resolves harmlessly if the metrics never appear.

use std::collections::HashMap;

use tracing::debug;

use crate::asset::AssetInfo;

/// Recently observed metric topics, used as the attribute fallback.
#[derive(Default)]
pub struct PhaseObservations {
    seen: HashMap<String, u64>,
    /// Observation freshness horizon, seconds.
    horizon_s: u64,
}

impl PhaseObservations {
    pub fn new(horizon_s: u64) -> Self {
        Self {
            seen: HashMap::new(),
            horizon_s,
        }
    }

    /// Record a metric topic sighting.
    pub fn note(&mut self, topic: &str, now_s: u64) {
        self.seen.insert(topic.to_string(), now_s);
    }

    fn fresh(&self, topic: &str, now_s: u64) -> bool {
        self.seen
            .get(topic)
            .map(|ts| now_s.saturating_sub(*ts) <= self.horizon_s)
            .unwrap_or(false)
    }

    /// True when any observation exists for the metric family on `asset`.
    fn any_fresh(&self, family: &str, phases: &[&str], asset: &str, now_s: u64) -> bool {
        phases
            .iter()
            .any(|p| self.fresh(&format!("{}.{}@{}", family, p, asset), now_s))
    }

    /// Phase count suggested by observations: 3 when all three lines report,
    /// 1 when only the first does, None when nothing was seen.
    fn observed_count(&self, family: &str, phases: [&str; 3], asset: &str, now_s: u64) -> Option<u8> {
        if !self.any_fresh(family, &phases, asset, now_s) {
            return None;
        }
        let all = phases
            .iter()
            .all(|p| self.fresh(&format!("{}.{}@{}", family, p, asset), now_s));
        if all {
            Some(3)
        } else {
            Some(1)
        }
    }
}

/// The rule families the filter applies to, keyed by rule-name prefix.
enum PhaseCheck {
    /// `phases.input` attribute, voltage line-to-neutral metrics.
    VoltageInput(u8),
    /// `phases.input` attribute, load line metrics.
    LoadInput(u8),
    /// `phases.output` attribute, realpower line metrics.
    Imbalance,
    /// Imbalance on containers: metrics only, no phase attribute exists.
    ImbalanceContainer,
}

fn check_for(rule_name: &str) -> Option<PhaseCheck> {
    let device = |prefixes: &[&str]| {
        prefixes
            .iter()
            .any(|p| rule_name.starts_with(&format!("{}@ups-", p)) || rule_name.starts_with(&format!("{}@epdu-", p)))
    };

    if device(&["voltage.input_1phase"]) {
        Some(PhaseCheck::VoltageInput(1))
    } else if device(&["voltage.input_3phase"]) {
        Some(PhaseCheck::VoltageInput(3))
    } else if rule_name.starts_with("load.input_1phase@epdu-") {
        Some(PhaseCheck::LoadInput(1))
    } else if rule_name.starts_with("load.input_3phase@epdu-") {
        Some(PhaseCheck::LoadInput(3))
    } else if device(&["phase_imbalance"]) {
        Some(PhaseCheck::Imbalance)
    } else if rule_name.starts_with("phase_imbalance@datacenter-")
        || rule_name.starts_with("phase_imbalance@rack-")
    {
        Some(PhaseCheck::ImbalanceContainer)
    } else {
        None
    }
}

/// Whether the named rule is applicable to the asset's phase layout.
///
/// Rules outside the filtered families are always applicable.
pub fn rule_phase_applicable(
    rule_name: &str,
    asset_id: &str,
    info: &AssetInfo,
    observations: &PhaseObservations,
    now_s: u64,
) -> bool {
    let check = match check_for(rule_name) {
        Some(c) => c,
        None => return true,
    };

    let applicable = match check {
        PhaseCheck::VoltageInput(wanted) => phase_matches(
            info.attribute("phases.input"),
            observations.observed_count("voltage.input", ["L1-N", "L2-N", "L3-N"], asset_id, now_s),
            wanted,
        ),
        PhaseCheck::LoadInput(wanted) => phase_matches(
            info.attribute("phases.input"),
            observations.observed_count("load.input", ["L1", "L2", "L3"], asset_id, now_s),
            wanted,
        ),
        PhaseCheck::Imbalance => phase_matches(
            info.attribute("phases.output"),
            observations.observed_count("realpower.output", ["L1", "L2", "L3"], asset_id, now_s),
            3,
        ),
        PhaseCheck::ImbalanceContainer => {
            // containers carry no phase attribute; only observations can
            // veto the rule
            match observations.observed_count("realpower.output", ["L1", "L2", "L3"], asset_id, now_s)
            {
                Some(count) => count == 3,
                None => true,
            }
        }
    };

    if !applicable {
        debug!(rule = %rule_name, asset = %asset_id, "phase filter rejected rule");
    }
    applicable
}

/// Attribute wins; observations are the fallback; no information passes.
fn phase_matches(attribute: Option<&str>, observed: Option<u8>, wanted: u8) -> bool {
    match attribute {
        Some(declared) => declared == wanted.to_string(),
        None => match observed {
            Some(count) => count == wanted,
            None => true,
        },
    }
}
