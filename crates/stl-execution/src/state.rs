//! Settlement state machine.
//!
//! One [`SettlementRun`] per lock-then-place attempt. Every step is applied
//! through [`SettlementRun::apply`]; an illegal event returns
//! [`TransitionError`] and leaves the run untouched.
//!
//! ```text
//!  Idle ─LockSubmitted─► Locking ─LockConfirmed─► Locked ─PlaceSubmitted─► Placing ─OrderConfirmed─► Placed
//!   │                      │  │                                             │  │
//!   └──LockRefused──┐      │  └─LockUnconfirmed─► LockUnconfirmed            │  └─OrderUnconfirmed─► PlaceUnconfirmed
//!                   ▼      ▼                                                 │
//!                 LockFailed                                           PlaceRejected
//!                                                                            ▼
//!                                          Released ◄─Released─ PlaceFailedCompensating ─ReleaseFailed─► ReleaseFailed
//! ```

use serde::Serialize;

// ---------------------------------------------------------------------------
// SettlementState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SettlementState {
    Idle,
    /// Lock exercise submitted; allocation not yet confirmed.
    Locking,
    Locked,
    /// Order placement submitted; order not yet confirmed.
    Placing,
    /// **Terminal.** Order confirmed against the locked allocation.
    Placed,
    /// **Terminal.** Nothing was locked.
    LockFailed,
    /// **Terminal.** The lock may have committed; Phase B never ran.
    LockUnconfirmed,
    /// **Terminal.** The order may exist; the allocation stays locked.
    PlaceUnconfirmed,
    /// Placement refused; releasing the allocation.
    PlaceFailedCompensating,
    /// **Terminal.** Placement refused and allocation released.
    Released,
    /// **Terminal.** Release failed; the lock persists. Operator action required.
    ReleaseFailed,
}

impl SettlementState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Placed
                | Self::LockFailed
                | Self::LockUnconfirmed
                | Self::PlaceUnconfirmed
                | Self::Released
                | Self::ReleaseFailed
        )
    }

    /// Short operator-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            SettlementState::Idle => "idle",
            SettlementState::Locking => "locking",
            SettlementState::Locked => "locked",
            SettlementState::Placing => "placing",
            SettlementState::Placed => "placed",
            SettlementState::LockFailed => "lock_failed",
            SettlementState::LockUnconfirmed => "lock_unconfirmed",
            SettlementState::PlaceUnconfirmed => "place_unconfirmed",
            SettlementState::PlaceFailedCompensating => "place_failed_compensating",
            SettlementState::Released => "released",
            SettlementState::ReleaseFailed => "release_failed",
        }
    }

    /// Terminal states in which funds are (or may be) held by an allocation.
    pub fn funds_locked(&self) -> bool {
        matches!(
            self,
            Self::Placed | Self::LockUnconfirmed | Self::PlaceUnconfirmed | Self::ReleaseFailed
        )
    }
}

// ---------------------------------------------------------------------------
// SettlementEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementEvent {
    LockSubmitted { holding_id: String },
    /// No eligible holding, or the lock submission was definitely refused.
    LockRefused,
    LockConfirmed { allocation_id: String },
    LockUnconfirmed,
    PlaceSubmitted,
    OrderConfirmed { order_contract_id: String },
    OrderUnconfirmed,
    PlaceRejected,
    Released,
    ReleaseFailed,
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// An event that cannot apply in the current state. Indicates a coordinator
/// bug; the run must not continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: SettlementState,
    pub event: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal settlement transition: {:?} + {}", self.from, self.event)
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// SettlementRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementRun {
    /// Client-generated natural key of the order this run places.
    pub order_id: String,
    pub state: SettlementState,
    /// Every state entered, starting with `Idle`.
    pub history: Vec<SettlementState>,
    pub holding_id: Option<String>,
    pub allocation_id: Option<String>,
    pub order_contract_id: Option<String>,
}

impl SettlementRun {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            state: SettlementState::Idle,
            history: vec![SettlementState::Idle],
            holding_id: None,
            allocation_id: None,
            order_contract_id: None,
        }
    }

    pub fn apply(&mut self, event: SettlementEvent) -> Result<SettlementState, TransitionError> {
        use SettlementEvent as E;
        use SettlementState::*;

        let next = match (self.state, &event) {
            (Idle, E::LockSubmitted { holding_id }) => {
                self.holding_id = Some(holding_id.clone());
                Locking
            }
            (Idle | Locking, E::LockRefused) => LockFailed,
            (Locking, E::LockConfirmed { allocation_id }) => {
                self.allocation_id = Some(allocation_id.clone());
                Locked
            }
            (Locking, E::LockUnconfirmed) => LockUnconfirmed,

            // Phase B needs a confirmed allocation id.
            (Locked, E::PlaceSubmitted) if self.allocation_id.is_some() => Placing,
            (Placing, E::OrderConfirmed { order_contract_id }) => {
                self.order_contract_id = Some(order_contract_id.clone());
                Placed
            }
            (Placing, E::OrderUnconfirmed) => PlaceUnconfirmed,
            (Placing, E::PlaceRejected) => PlaceFailedCompensating,

            (PlaceFailedCompensating, E::Released) => Released,
            (PlaceFailedCompensating, E::ReleaseFailed) => ReleaseFailed,

            (state, ev) => {
                return Err(TransitionError {
                    from: state,
                    event: format!("{ev:?}"),
                })
            }
        };

        self.state = next;
        self.history.push(next);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SettlementState::*;

    fn locked_run() -> SettlementRun {
        let mut r = SettlementRun::new("o-1");
        r.apply(SettlementEvent::LockSubmitted {
            holding_id: "h1".into(),
        })
        .unwrap();
        r.apply(SettlementEvent::LockConfirmed {
            allocation_id: "a1".into(),
        })
        .unwrap();
        r
    }

    #[test]
    fn happy_path_records_history() {
        let mut r = locked_run();
        r.apply(SettlementEvent::PlaceSubmitted).unwrap();
        r.apply(SettlementEvent::OrderConfirmed {
            order_contract_id: "ord1".into(),
        })
        .unwrap();
        assert_eq!(r.history, vec![Idle, Locking, Locked, Placing, Placed]);
        assert_eq!(r.allocation_id.as_deref(), Some("a1"));
        assert!(r.state.is_terminal());
        assert!(r.state.funds_locked());
    }

    #[test]
    fn rejection_compensates_to_released() {
        let mut r = locked_run();
        r.apply(SettlementEvent::PlaceSubmitted).unwrap();
        r.apply(SettlementEvent::PlaceRejected).unwrap();
        assert!(!r.state.is_terminal());
        r.apply(SettlementEvent::Released).unwrap();
        assert_eq!(r.state, Released);
        assert!(!r.state.funds_locked());
    }

    #[test]
    fn unconfirmed_lock_cannot_proceed_to_placement() {
        let mut r = SettlementRun::new("o-1");
        r.apply(SettlementEvent::LockSubmitted {
            holding_id: "h1".into(),
        })
        .unwrap();
        r.apply(SettlementEvent::LockUnconfirmed).unwrap();
        let err = r.apply(SettlementEvent::PlaceSubmitted).unwrap_err();
        assert_eq!(err.from, LockUnconfirmed);
        assert_eq!(r.state, LockUnconfirmed);
    }

    #[test]
    fn unconfirmed_order_is_never_compensated() {
        let mut r = locked_run();
        r.apply(SettlementEvent::PlaceSubmitted).unwrap();
        r.apply(SettlementEvent::OrderUnconfirmed).unwrap();
        assert!(r.apply(SettlementEvent::Released).is_err());
        assert!(r.state.funds_locked());
    }

    #[test]
    fn release_failure_is_terminal() {
        let mut r = locked_run();
        r.apply(SettlementEvent::PlaceSubmitted).unwrap();
        r.apply(SettlementEvent::PlaceRejected).unwrap();
        r.apply(SettlementEvent::ReleaseFailed).unwrap();
        assert!(r.state.is_terminal());
        assert!(r.apply(SettlementEvent::Released).is_err());
    }

    #[test]
    fn no_holding_fails_from_idle() {
        let mut r = SettlementRun::new("o-1");
        r.apply(SettlementEvent::LockRefused).unwrap();
        assert_eq!(r.history, vec![Idle, LockFailed]);
        assert!(!r.state.funds_locked());
    }
}
