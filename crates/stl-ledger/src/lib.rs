//! stl-ledger
//!
//! Client side of the ledger's JSON API: transport, credentials and the
//! shared retry policy, template qualification, command submission and
//! party-scoped active-state queries.
//!
//! Clients hold a [`LedgerSession`], which owns the [`LedgerApi`] and
//! [`TokenSource`] seams. Production wires [`HttpLedger`]; tests wire an
//! in-memory ledger.

mod api;
mod command;
mod envelope;
mod error;
mod http;
mod query;
mod session;
mod template;

pub use api::{
    InclusiveFilter, LedgerApi, PartyFilter, QueryFilter, QueryRequest, StaticToken,
    SubmitRequest, TokenSource,
};
pub use command::CommandClient;
pub use envelope::{normalize, EnvelopeParser, ParseOutcome};
pub use error::LedgerError;
pub use http::HttpLedger;
pub use query::{ActiveStateQuery, QuerySelector, HOLDING_CURRENCY_FIELD, HOLDING_OWNER_FIELD};
pub use session::{Call, LedgerSession};
pub use template::{PackageCache, TemplateResolver};
