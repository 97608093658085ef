//! Three-way reconciliation for the Verifiable Disclosure Ledger.
//!
//! For one reporting period the [`Reconciler`] checks that the order domain,
//! the inventory domain, and the accounting postings tell the same story.
//! Any mismatch is reported with the offending event ids; publication treats
//! a failed report as a hard stop.

pub mod engine;
pub mod report;
pub mod rules;

pub use engine::Reconciler;
pub use report::{CheckResult, Discrepancy, ReconciliationReport};
pub use rules::{
    standard_rules, CogsEqualsInventoryDepletion, InventoryNonNegative, PaymentMatchesOrder,
    ReconciliationRule, RefundPostingsMatch, RefundWithinPayment, RevenueEqualsPayments,
    ShipmentWithinOrder,
};
