//! Append-only event ledger for the Verifiable Disclosure Ledger (VDL).
//!
//! This crate is the system of record. It provides:
//! - The versioned event schema (a tagged union of business events)
//! - `LedgerWriter` / `LedgerReader` trait boundaries
//! - `InMemoryLedger`, where append is the single serialization point
//! - Chain verification (hash links, event hashes, signatures)
//! - Deterministic replay into order, inventory, and accounting projections
//! - `PeriodView`, a consistent snapshot for one reporting period

pub mod error;
pub mod events;
pub mod memory;
pub mod projection;
pub mod replay;
pub mod traits;
pub mod validation;
pub mod view;

pub use error::{LedgerError, ReplayError};
pub use events::{
    AdjustmentItem, CostItem, DisclosurePublished, Event, EventDraft, EventPayload, GoodsReceived,
    InventoryAdjusted, OrderItem, OrderPlaced, PaymentCaptured, ProcurementOrdered,
    ReceivedItem, RefundIssued, SelectiveDisclosureRevealed, ShipmentDispatched, ShipmentItem,
    SCHEMA_VERSION,
};
pub use memory::InMemoryLedger;
pub use projection::{
    Account, AccountingState, Anomaly, AnomalyKind, InventoryState, Lot, OrderState, OrderStatus,
    Posting, Projection,
};
pub use replay::ReplayEngine;
pub use traits::{AppendGuard, EventRef, GuardDenial, Ledger, LedgerReader, LedgerWriter};
pub use validation::verify_chain;
pub use view::PeriodView;
