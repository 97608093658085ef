use vdl_ledger::PeriodView;

use crate::report::ReconciliationReport;
use crate::rules::{standard_rules, ReconciliationRule};

/// Runs every rule over a period snapshot and collects the discrepancies.
pub struct Reconciler {
    rules: Vec<Box<dyn ReconciliationRule>>,
}

impl Reconciler {
    /// An engine with no rules.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// An engine with the built-in rule set.
    pub fn standard() -> Self {
        Self {
            rules: standard_rules(),
        }
    }

    pub fn add_rule(&mut self, rule: Box<dyn ReconciliationRule>) {
        self.rules.push(rule);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Reconcile one period. All rules run; none short-circuit.
    pub fn reconcile(&self, view: &PeriodView) -> ReconciliationReport {
        let mut report = ReconciliationReport::new(view.period);
        for rule in &self.rules {
            report.record(rule.name(), rule.check(view));
        }

        if report.passed {
            tracing::debug!(
                period = %view.period,
                events = view.events.len(),
                "reconciliation passed"
            );
        } else {
            tracing::warn!(
                period = %view.period,
                failed = ?report.failed_rules(),
                discrepancies = report.discrepancies.len(),
                "reconciliation failed"
            );
        }
        report
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::standard()
    }
}
