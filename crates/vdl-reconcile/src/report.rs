use serde::{Deserialize, Serialize};
use vdl_types::{EventId, Period};

/// One cross-domain mismatch and the events that caused it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub rule: String,
    pub event_ids: Vec<EventId>,
    pub description: String,
}

impl Discrepancy {
    pub fn new(rule: &str, event_ids: Vec<EventId>, description: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            event_ids,
            description: description.into(),
        }
    }
}

/// Summary of one rule's run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub rule: String,
    pub passed: bool,
    pub discrepancies: usize,
}

/// Outcome of reconciling one period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub period: Period,
    pub checks: Vec<CheckResult>,
    pub discrepancies: Vec<Discrepancy>,
    pub passed: bool,
}

impl ReconciliationReport {
    pub fn new(period: Period) -> Self {
        Self {
            period,
            checks: Vec::new(),
            discrepancies: Vec::new(),
            passed: true,
        }
    }

    pub(crate) fn record(&mut self, rule: &str, found: Vec<Discrepancy>) {
        self.checks.push(CheckResult {
            rule: rule.to_string(),
            passed: found.is_empty(),
            discrepancies: found.len(),
        });
        self.passed &= found.is_empty();
        self.discrepancies.extend(found);
    }

    /// Every event id named by any discrepancy, deduplicated.
    pub fn offending_events(&self) -> Vec<EventId> {
        let mut ids: Vec<EventId> = self
            .discrepancies
            .iter()
            .flat_map(|d| d.event_ids.iter().copied())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn failed_rules(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.rule.as_str())
            .collect()
    }
}
