//! Trial document shape (§3, §6): `protocol_no` plus a nested
//! `treatment_list.step[*].arm[*].dose_level[*]` tree, each level optionally carrying a
//! `match` payload and its own identifiers/suspension flag.

use indexmap::IndexMap;
use serde::Deserialize;

use crate::model::criteria::RawMatchEntry;

/// A single-element `match` list, as it appears on a step/arm/dose node. Treated as exactly
/// one tree; a node with no `match` key has none.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchList(pub Vec<RawMatchEntry>);

impl MatchList {
    /// The one match-tree payload this node carries, if any.
    pub fn sole_entry(&self) -> Option<&RawMatchEntry> {
        self.0.first()
    }
}

/// Fields common to every treatment-list nesting level.
#[derive(Debug, Clone, Deserialize)]
pub struct DoseLevel {
    #[serde(default)]
    pub dose_level_internal_id: Option<String>,
    #[serde(default)]
    pub dose_level_code: Option<String>,
    #[serde(default)]
    pub dose_level_suspended: Option<String>,
    #[serde(default)]
    pub r#match: Option<MatchList>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Arm {
    #[serde(default)]
    pub arm_internal_id: Option<String>,
    #[serde(default)]
    pub arm_code: Option<String>,
    #[serde(default)]
    pub arm_suspended: Option<String>,
    #[serde(default)]
    pub dose_level: Vec<DoseLevel>,
    #[serde(default)]
    pub r#match: Option<MatchList>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub step_internal_id: Option<String>,
    #[serde(default)]
    pub step_code: Option<String>,
    #[serde(default)]
    pub step_suspended: Option<String>,
    #[serde(default)]
    pub arm: Vec<Arm>,
    #[serde(default)]
    pub r#match: Option<MatchList>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TreatmentList {
    #[serde(default)]
    pub step: Vec<Step>,
}

/// One entry of `_summary.status`, e.g. `{"value": "Open to Accrual"}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusEntry {
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Summary {
    #[serde(default)]
    pub status: Vec<StatusEntry>,
}

/// A trial document, as read from the trial collection (§3, §6). Fields beyond what the
/// evaluator needs are preserved in `extra` for round-tripping but never inspected.
#[derive(Debug, Clone, Deserialize)]
pub struct TrialDocument {
    pub protocol_no: String,
    #[serde(default)]
    pub treatment_list: TreatmentList,
    #[serde(default)]
    pub _summary: Summary,
    #[serde(default)]
    pub short_title: Option<String>,
    #[serde(default)]
    pub coordinating_center: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl TrialDocument {
    /// `open` iff `_summary.status[0].value` case-insensitively equals `"open to accrual"`;
    /// absent defaults to `open` (§4.8).
    pub fn trial_level_open(&self) -> bool {
        match self._summary.status.first() {
            Some(entry) => entry.value.eq_ignore_ascii_case("open to accrual"),
            None => true,
        }
    }
}
