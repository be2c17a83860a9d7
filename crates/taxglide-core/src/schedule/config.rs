use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TaxGlideError;
use crate::schedule::federal::FederalSchedule;
use crate::schedule::local::LocalSchedule;
use crate::types::Currency;
use crate::TaxGlideResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingStatus {
    #[default]
    Single,
    MarriedJoint,
}

impl std::fmt::Display for FilingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilingStatus::Single => write!(f, "single"),
            FilingStatus::MarriedJoint => write!(f, "married_joint"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederalByStatus {
    pub single: FederalSchedule,
    pub married_joint: FederalSchedule,
}

impl FederalByStatus {
    pub fn for_status(&self, status: FilingStatus) -> &FederalSchedule {
        match status {
            FilingStatus::Single => &self.single,
            FilingStatus::MarriedJoint => &self.married_joint,
        }
    }
}

/// A local tax factor applied to the simple tax, e.g. 1.05 for a canton or
/// 0.14 for a fire-service levy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Multiplier {
    pub name: String,
    pub code: String,
    pub rate: Decimal,
    /// At most one multiplier per group may be selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_group: Option<String>,
    /// Only optional multipliers may be deselected.
    #[serde(default)]
    pub optional: bool,
    #[serde(default = "default_selected")]
    pub default_selected: bool,
}

fn default_selected() -> bool {
    true
}

/// Complete input for a [`TwoTierCalculator`](super::TwoTierCalculator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub currency: Currency,
    pub federal: FederalByStatus,
    pub local: LocalSchedule,
    /// Applied in this order.
    #[serde(default)]
    pub multipliers: Vec<Multiplier>,
}

impl ScheduleConfig {
    pub fn from_json(json: &str) -> TaxGlideResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn validate(&self) -> TaxGlideResult<()> {
        self.federal.single.validate("single")?;
        self.federal.married_joint.validate("married_joint")?;
        self.local.validate()?;

        let mut seen = HashSet::new();
        for m in &self.multipliers {
            if m.code.trim().is_empty() {
                return Err(TaxGlideError::InvalidSchedule(format!(
                    "multiplier '{}' has an empty code",
                    m.name
                )));
            }
            if m.rate < Decimal::ZERO {
                return Err(TaxGlideError::InvalidSchedule(format!(
                    "multiplier {} has a negative rate",
                    m.code
                )));
            }
            if !seen.insert(m.code.as_str()) {
                return Err(TaxGlideError::InvalidSchedule(format!(
                    "duplicate multiplier code {}",
                    m.code
                )));
            }
        }
        let defaults = self.default_picks();
        if let Some((a, b, group)) = self.exclusive_conflict(&defaults) {
            return Err(TaxGlideError::InvalidSchedule(format!(
                "multipliers {a} and {b} are both selected by default \
                 but share exclusive group {group}"
            )));
        }
        Ok(())
    }

    fn multiplier(&self, code: &str) -> Option<&Multiplier> {
        self.multipliers.iter().find(|m| m.code == code)
    }

    /// First pair of selected codes that share an exclusive group.
    fn exclusive_conflict<'a>(&'a self, picks: &'a [String]) -> Option<(&'a str, &'a str, &'a str)> {
        let mut groups: HashMap<&str, &str> = HashMap::new();
        for code in picks {
            let Some(group) = self.multiplier(code).and_then(|m| m.exclusive_group.as_deref())
            else {
                continue;
            };
            if let Some(first) = groups.insert(group, code.as_str()) {
                return Some((first, code.as_str(), group));
            }
        }
        None
    }

    /// Reject unknown codes and selections that break an exclusive group.
    pub fn check_picks(&self, picks: &[String]) -> TaxGlideResult<()> {
        if let Some(unknown) = picks.iter().find(|p| self.multiplier(p.as_str()).is_none()) {
            return Err(TaxGlideError::invalid(
                "picks",
                format!("Unknown multiplier code {unknown}"),
            ));
        }
        if let Some((a, b, group)) = self.exclusive_conflict(picks) {
            return Err(TaxGlideError::invalid(
                "picks",
                format!("Multipliers {a} and {b} are mutually exclusive (group {group})"),
            ));
        }
        Ok(())
    }

    pub fn default_picks(&self) -> Vec<String> {
        self.multipliers
            .iter()
            .filter(|m| m.default_selected)
            .map(|m| m.code.clone())
            .collect()
    }

    /// Defaults plus `pick`, minus `skip`, in configuration order.
    ///
    /// Picking a member of an exclusive group replaces the group's default.
    /// Unknown codes, skipping a required multiplier and picking two members
    /// of one group are rejected.
    pub fn resolve_picks(&self, pick: &[String], skip: &[String]) -> TaxGlideResult<Vec<String>> {
        for code in pick.iter().chain(skip) {
            if self.multiplier(code).is_none() {
                return Err(TaxGlideError::invalid(
                    "pick",
                    format!("Unknown multiplier code {code}"),
                ));
            }
        }
        if let Some(required) = skip
            .iter()
            .filter_map(|code| self.multiplier(code))
            .find(|m| !m.optional)
        {
            return Err(TaxGlideError::invalid(
                "skip",
                format!("Multiplier {} is required and cannot be skipped", required.code),
            ));
        }

        let picked_groups: HashSet<&str> = pick
            .iter()
            .filter_map(|code| self.multiplier(code)?.exclusive_group.as_deref())
            .collect();
        let resolved: Vec<String> = self
            .multipliers
            .iter()
            .filter(|m| {
                pick.contains(&m.code)
                    || (m.default_selected
                        && !m
                            .exclusive_group
                            .as_deref()
                            .is_some_and(|g| picked_groups.contains(g)))
            })
            .filter(|m| !skip.contains(&m.code))
            .map(|m| m.code.clone())
            .collect();
        self.check_picks(&resolved)?;
        Ok(resolved)
    }
}
