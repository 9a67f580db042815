use std::fmt;
use stl_ledger::LedgerError;
use stl_schemas::Offset;

use crate::{SettlementState, TransitionError};

/// Every way a settlement operation can end short of success.
///
/// The variants split along what the caller must do next: nothing was
/// locked (`NoEligibleHolding`, `LockFailed`, `InvalidRequest`), funds are
/// or may be locked (`LockUnconfirmed`, `OrderUnconfirmed`,
/// `OrderMislinked`, `CompensationFailure`), or the placement failed cleanly
/// (`OrderRejectedReleased`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    InvalidRequest {
        field: &'static str,
        message: String,
    },
    NoEligibleHolding {
        currency: String,
        requested: String,
    },
    /// The lock was definitely not applied.
    LockFailed { reason: LedgerError },
    /// Unknown whether the lock committed. Phase B was not attempted and
    /// Phase A must not be blindly resubmitted.
    LockUnconfirmed {
        holding_id: String,
        completion_offset: Option<Offset>,
        detail: String,
    },
    /// The order may exist. Its allocation stays locked until the read path
    /// shows the outcome.
    OrderUnconfirmed {
        allocation_id: String,
        order_id: String,
        detail: String,
    },
    /// The confirmed order names a different allocation than the one this
    /// run locked. The locked allocation backs no order; both stay as they
    /// are for an operator.
    OrderMislinked {
        allocation_id: String,
        order_id: String,
        order_cid: String,
        allocation_ref: Option<String>,
    },
    /// Placement refused by the ledger; the allocation was released.
    OrderRejectedReleased {
        allocation_id: String,
        order_id: String,
        reason: LedgerError,
    },
    /// Placement refused and the compensating release failed. The lock
    /// persists and needs an operator; never retried automatically.
    CompensationFailure {
        allocation_id: String,
        order_id: String,
        reject_reason: LedgerError,
        release_error: LedgerError,
    },
    CancelFailed {
        contract_id: String,
        reason: LedgerError,
    },
    Transition(TransitionError),
}

impl SettlementError {
    pub fn requires_operator(&self) -> bool {
        matches!(
            self,
            SettlementError::CompensationFailure { .. } | SettlementError::OrderMislinked { .. }
        )
    }

    /// "Your funds are locked but the outcome is unknown" as opposed to
    /// "nothing happened".
    pub fn funds_locked(&self) -> bool {
        matches!(
            self,
            SettlementError::LockUnconfirmed { .. }
                | SettlementError::OrderUnconfirmed { .. }
                | SettlementError::OrderMislinked { .. }
                | SettlementError::CompensationFailure { .. }
        )
    }

    /// Terminal settlement state this error corresponds to, if any.
    pub fn state(&self) -> Option<SettlementState> {
        match self {
            SettlementError::NoEligibleHolding { .. } | SettlementError::LockFailed { .. } => {
                Some(SettlementState::LockFailed)
            }
            SettlementError::LockUnconfirmed { .. } => Some(SettlementState::LockUnconfirmed),
            SettlementError::OrderUnconfirmed { .. } | SettlementError::OrderMislinked { .. } => {
                Some(SettlementState::PlaceUnconfirmed)
            }
            SettlementError::OrderRejectedReleased { .. } => Some(SettlementState::Released),
            SettlementError::CompensationFailure { .. } => Some(SettlementState::ReleaseFailed),
            SettlementError::InvalidRequest { .. }
            | SettlementError::CancelFailed { .. }
            | SettlementError::Transition(_) => None,
        }
    }
}

impl fmt::Display for SettlementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementError::InvalidRequest { field, message } => {
                write!(f, "invalid request field={field}: {message}")
            }
            SettlementError::NoEligibleHolding {
                currency,
                requested,
            } => write!(f, "no single holding covers {requested} {currency}"),
            SettlementError::LockFailed { reason } => write!(f, "lock failed, nothing locked: {reason}"),
            SettlementError::LockUnconfirmed {
                holding_id,
                completion_offset,
                detail,
            } => {
                write!(f, "FUNDS MAY BE LOCKED: lock on holding {holding_id} unconfirmed")?;
                if let Some(o) = completion_offset {
                    write!(f, " (committed at offset {o})")?;
                }
                write!(f, ": {detail}")
            }
            SettlementError::OrderUnconfirmed {
                allocation_id,
                order_id,
                detail,
            } => write!(
                f,
                "FUNDS LOCKED: order {order_id} placed against allocation {allocation_id} but unconfirmed: {detail}"
            ),
            SettlementError::OrderMislinked {
                allocation_id,
                order_id,
                order_cid,
                allocation_ref,
            } => write!(
                f,
                "OPERATOR ACTION REQUIRED: order {order_id} ({order_cid}) references allocation {} but allocation {allocation_id} was locked for it",
                allocation_ref.as_deref().unwrap_or("<none>")
            ),
            SettlementError::OrderRejectedReleased {
                allocation_id,
                order_id,
                reason,
            } => write!(
                f,
                "order {order_id} rejected, allocation {allocation_id} released: {reason}"
            ),
            SettlementError::CompensationFailure {
                allocation_id,
                order_id,
                reject_reason,
                release_error,
            } => write!(
                f,
                "OPERATOR ACTION REQUIRED: allocation {allocation_id} still locked; order {order_id} rejected ({reject_reason}) and release failed ({release_error})"
            ),
            SettlementError::CancelFailed {
                contract_id,
                reason,
            } => write!(f, "cancel/release of {contract_id} failed: {reason}"),
            SettlementError::Transition(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SettlementError {}

impl From<TransitionError> for SettlementError {
    fn from(e: TransitionError) -> Self {
        SettlementError::Transition(e)
    }
}
