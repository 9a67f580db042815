use std::fmt;
use stl_ledger::LedgerError;
use stl_schemas::{Offset, TemplateId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Confirmation timeout. The write already committed; the contract did
    /// not become visible within the polling budget. Not proof of absence.
    NotFoundAfterRetries {
        record_type: TemplateId,
        attempts: u32,
        completion_offset: Offset,
    },
    /// A read failure that ends polling early (credential rejected).
    Ledger(LedgerError),
}

impl ResolveError {
    pub fn is_confirmation_timeout(&self) -> bool {
        matches!(self, ResolveError::NotFoundAfterRetries { .. })
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NotFoundAfterRetries {
                record_type,
                attempts,
                completion_offset,
            } => write!(
                f,
                "{record_type} committed at offset {completion_offset} but not visible after {attempts} attempts"
            ),
            ResolveError::Ledger(e) => write!(f, "confirmation aborted: {e}"),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::Ledger(e) => Some(e),
            ResolveError::NotFoundAfterRetries { .. } => None,
        }
    }
}

impl From<LedgerError> for ResolveError {
    fn from(e: LedgerError) -> Self {
        ResolveError::Ledger(e)
    }
}
