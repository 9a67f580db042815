//! stl-schemas
//!
//! Ledger data model shared by every other crate: parties, template
//! identities, offsets, contracts, commands and submission results.
//!
//! Pure types. No IO, no HTTP, no clocks.

mod amount;
mod command;
mod contract;
mod party;
mod template;

pub use amount::{amount_to_micros, micros_to_amount, AmountError, MICROS_PER_UNIT};
pub use command::{Command, CommandId, SubmissionResult};
pub use contract::{Contract, Offset};
pub use party::{Party, PartyError};
pub use template::{TemplateId, TemplateIdError};
