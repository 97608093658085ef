//! Foundation types for the Verifiable Disclosure Ledger (VDL).
//!
//! Every other VDL crate depends on `vdl-types`. Nothing in here knows about
//! events, policies, or Merkle trees; these are the shared vocabulary.
//!
//! # Key Types
//!
//! - [`Digest`]: 32-byte BLAKE3 hash, hex on the wire
//! - [`EventId`]: UUID v7 event identifier (time-ordered)
//! - [`ActorId`] / [`ActorKind`]: who performed an action
//! - [`Timestamp`] / [`Period`]: UTC instants and half-open periods
//! - [`Money`]: integer minor units

pub mod digest;
pub mod error;
pub mod event_id;
pub mod identity;
pub mod money;
pub mod temporal;

pub use digest::Digest;
pub use error::TypeError;
pub use event_id::EventId;
pub use identity::{ActorId, ActorKind};
pub use money::Money;
pub use temporal::{Clock, FixedClock, Period, SystemClock, Timestamp};
