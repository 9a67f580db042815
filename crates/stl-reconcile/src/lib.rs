//! stl-reconcile
//!
//! Confirms what a committed submission actually created. The submit
//! endpoint returns only an update id and an offset; the active-state view
//! may lag the write. [`ContractResolver`] polls that view with capped
//! exponential backoff until a [`Matcher`] recognizes the new contract.
//!
//! The loop is read-only: dropping a `resolve` future at any await point
//! leaves nothing behind.

mod backoff;
mod error;
mod matcher;
mod resolver;
mod sleeper;

pub use backoff::Backoff;
pub use error::ResolveError;
pub use matcher::Matcher;
pub use resolver::ContractResolver;
pub use sleeper::{Sleeper, TokioSleeper};
