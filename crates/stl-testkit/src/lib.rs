//! stl-testkit
//!
//! Deterministic in-process stand-ins for the ledger and the clock, plus a
//! wired settlement harness. Scenario tests spanning several crates live in
//! this crate's `tests/`.

mod fake_ledger;
mod harness;
mod sleeper;

pub use fake_ledger::{ChoiceEffect, ChoiceHandler, EnvelopeStyle, FakeLedger, NewContract};
pub use harness::{
    alice, allocation_type, holding_type, operator, order_type, SettlementHarness, ALICE, OPERATOR,
    PACKAGE_ID,
};
pub use sleeper::RecordingSleeper;
