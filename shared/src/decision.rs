//! Per-finding review state.
//!
//! The store is the only owner of `Finding::decision`. Decisions change only
//! through [`DecisionStore::approve`] and [`DecisionStore::reject`], which
//! toggle back to pending when repeated.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tracing::debug;

use crate::dto::{Decision, Finding, FindingId, FindingStatus};
use crate::error::{AppError, Result};

/// Refinement stages the analysis pipeline runs for every finding.
pub const STAGES: [&str; 6] = [
    "Clarity & Grammar",
    "Tone Alignment",
    "Criticality Validation",
    "Regulatory Cross-check",
    "Actionability Check",
    "Executive Summary",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Approve,
    Reject,
}

impl Action {
    fn target(self) -> Decision {
        match self {
            Action::Approve => Decision::Approved,
            Action::Reject => Decision::Rejected,
        }
    }
}

/// Apply `action` to `current`: move to the action's state, or back to
/// pending when already there.
pub fn transition(current: Decision, action: Action) -> Decision {
    let target = action.target();
    if current == target {
        Decision::Pending
    } else {
        target
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StageState {
    Pending,
    Processing,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageProgress {
    pub name: &'static str,
    pub state: StageState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewProgress {
    pub processed: usize,
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub stages: Vec<StageProgress>,
}

#[derive(Debug, Clone, Default)]
pub struct DecisionStore {
    findings: Vec<Finding>,
    index: HashMap<FindingId, usize>,
}

impl DecisionStore {
    pub fn new(findings: Vec<Finding>) -> Self {
        let mut store = Self::default();
        store.load(findings);
        store
    }

    /// Replace the whole list. Every finding starts out pending; later
    /// duplicates of an id are dropped.
    pub fn load(&mut self, findings: Vec<Finding>) {
        self.findings.clear();
        self.index.clear();
        for mut finding in findings {
            if self.index.contains_key(&finding.id) {
                debug!(finding_id = %finding.id, "dropping duplicate finding id");
                continue;
            }
            finding.decision = Decision::Pending;
            self.index.insert(finding.id.clone(), self.findings.len());
            self.findings.push(finding);
        }
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn get(&self, id: &str) -> Option<&Finding> {
        self.index.get(id).map(|&i| &self.findings[i])
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Finding> {
        match self.index.get(id) {
            Some(&i) => Ok(&mut self.findings[i]),
            None => Err(AppError::FindingNotFound(id.to_string())),
        }
    }

    pub fn apply(&mut self, id: &str, action: Action) -> Result<Decision> {
        let finding = self.get_mut(id)?;
        finding.decision = transition(finding.decision, action);
        debug!(finding_id = %id, decision = %finding.decision, "decision changed");
        Ok(finding.decision)
    }

    pub fn approve(&mut self, id: &str) -> Result<Decision> {
        self.apply(id, Action::Approve)
    }

    pub fn reject(&mut self, id: &str) -> Result<Decision> {
        self.apply(id, Action::Reject)
    }

    /// Replace the suggested text. The decision is left as it is.
    pub fn edit(&mut self, id: &str, text: impl Into<String>) -> Result<()> {
        let finding = self.get_mut(id)?;
        finding.refined = text.into();
        Ok(())
    }

    /// Approved findings mapped to their (possibly edited) suggested text.
    pub fn export_payload(&self) -> BTreeMap<FindingId, String> {
        self.findings
            .iter()
            .filter(|f| f.decision == Decision::Approved)
            .map(|f| (f.id.clone(), f.refined.clone()))
            .collect()
    }

    pub fn progress(&self) -> ReviewProgress {
        let total = self.findings.len();
        let processed = self
            .findings
            .iter()
            .filter(|f| f.status == FindingStatus::Done)
            .count();
        let count = |d: Decision| self.findings.iter().filter(|f| f.decision == d).count();
        let state = if total == 0 {
            StageState::Pending
        } else if processed == total {
            StageState::Done
        } else {
            StageState::Processing
        };
        ReviewProgress {
            processed,
            total,
            pending: count(Decision::Pending),
            approved: count(Decision::Approved),
            rejected: count(Decision::Rejected),
            stages: STAGES
                .iter()
                .map(|&name| StageProgress { name, state })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DecisionStore {
        DecisionStore::new(vec![
            Finding::new("1", "one original", "X"),
            Finding::new("2", "two original", "Y"),
            Finding::new("3", "three original", "Z"),
        ])
    }

    #[test]
    fn approve_toggles() {
        let mut s = store();
        assert_eq!(s.approve("1").unwrap(), Decision::Approved);
        assert_eq!(s.approve("1").unwrap(), Decision::Pending);
    }

    #[test]
    fn reject_after_approve_switches() {
        let mut s = store();
        s.approve("1").unwrap();
        assert_eq!(s.reject("1").unwrap(), Decision::Rejected);
        assert_eq!(s.reject("1").unwrap(), Decision::Pending);
    }

    #[test]
    fn edit_keeps_decision() {
        let mut s = store();
        s.approve("2").unwrap();
        s.edit("2", "edited").unwrap();
        let f = s.get("2").unwrap();
        assert_eq!(f.refined, "edited");
        assert_eq!(f.decision, Decision::Approved);
    }

    #[test]
    fn export_contains_only_approved() {
        let mut s = store();
        s.approve("1").unwrap();
        s.reject("2").unwrap();
        let payload = s.export_payload();
        assert_eq!(payload, BTreeMap::from([("1".to_string(), "X".to_string())]));
    }

    #[test]
    fn export_uses_edited_text() {
        let mut s = store();
        s.edit("3", "Z edited").unwrap();
        s.approve("3").unwrap();
        assert_eq!(s.export_payload().get("3").map(String::as_str), Some("Z edited"));
    }

    #[test]
    fn unknown_id_is_an_error() {
        let mut s = store();
        assert!(matches!(s.approve("nope"), Err(AppError::FindingNotFound(id)) if id == "nope"));
        assert!(s.edit("nope", "x").is_err());
    }

    #[test]
    fn load_resets_decisions_and_replaces_wholesale() {
        let mut s = store();
        s.approve("1").unwrap();
        let mut incoming = Finding::new("9", "nine original", "N");
        incoming.decision = Decision::Approved;
        s.load(vec![incoming.clone(), incoming]);
        assert_eq!(s.findings().len(), 1);
        assert!(s.get("1").is_none());
        assert_eq!(s.get("9").unwrap().decision, Decision::Pending);
    }

    #[test]
    fn progress_counts_and_stage_timeline() {
        let mut s = store();
        assert_eq!(s.progress().stages[0].state, StageState::Done);

        let mut processing = Finding::new("p", "still running", "p");
        processing.status = FindingStatus::Processing;
        s.load(vec![processing, Finding::new("d", "finished", "d")]);
        s.reject("d").unwrap();
        let progress = s.progress();
        assert_eq!((progress.processed, progress.total), (1, 2));
        assert_eq!((progress.pending, progress.rejected), (1, 1));
        assert!(progress.stages.iter().all(|st| st.state == StageState::Processing));
        assert_eq!(progress.stages.len(), 6);

        s.load(Vec::new());
        assert_eq!(s.progress().stages[5].state, StageState::Pending);
    }
}
