//! stl-execution
//!
//! Two-phase settlement over the ledger: lock funds into an Allocation,
//! then place an Order that references it, compensating when placement is
//! refused. The [`Coordinator`] drives a [`SettlementRun`] state machine and
//! announces read-path refreshes on a [`RefreshBus`].

mod bus;
mod coordinator;
mod error;
mod holding;
mod state;

pub use bus::{
    holdings_channel, orders_channel, RefreshBus, RefreshEvent, RefreshReason, Subscription,
};
pub use coordinator::{
    Coordinator, OrderRequest, Placement, SettlementChoices, SettlementTemplates, Side,
    ALLOCATION_AMOUNT_FIELD, ALLOCATION_CURRENCY_FIELD, ALLOCATION_OPERATOR_FIELD,
    ALLOCATION_OWNER_FIELD, ORDER_ALLOCATION_REF_FIELD, ORDER_ID_FIELD, PLACE_ALLOCATION_ARG,
};
pub use error::SettlementError;
pub use holding::{select_holding, HOLDING_AMOUNT_FIELD};
pub use state::{SettlementEvent, SettlementRun, SettlementState, TransitionError};
