//! Two-phase lock-then-place settlement.
//!
//! Phase A exercises the lock choice on a holding and confirms the
//! resulting Allocation. Phase B exercises the placement choice on that
//! confirmed Allocation with a client-generated order id and confirms the
//! Order by it. An Order never exists without a live Allocation behind it:
//! refused placements release the Allocation, and cancellation archives the
//! Order and releases its Allocation in one submission.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use stl_ledger::{ActiveStateQuery, CommandClient, LedgerError, QuerySelector};
use stl_reconcile::{ContractResolver, Matcher, ResolveError};
use stl_schemas::{
    amount_to_micros, micros_to_amount, Command, Contract, Offset, Party, SubmissionResult,
    TemplateId,
};
use tracing::{error, info, warn};

use crate::bus::{holdings_channel, orders_channel, RefreshBus, RefreshEvent, RefreshReason};
use crate::holding::select_holding;
use crate::{SettlementError, SettlementEvent, SettlementRun};

// Allocation payload, as created by the lock choice.
pub const ALLOCATION_OWNER_FIELD: &str = "owner";
pub const ALLOCATION_OPERATOR_FIELD: &str = "operator";
pub const ALLOCATION_AMOUNT_FIELD: &str = "amount";
pub const ALLOCATION_CURRENCY_FIELD: &str = "currency";

// Order payload, as created by the placement choice.
pub const ORDER_ID_FIELD: &str = "orderId";
pub const ORDER_ALLOCATION_REF_FIELD: &str = "allocationRef";

/// Placement choice argument naming the allocation that backs the order.
pub const PLACE_ALLOCATION_ARG: &str = "allocationCid";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementTemplates {
    pub holding: TemplateId,
    pub allocation: TemplateId,
    pub order: TemplateId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementChoices {
    pub lock: String,
    pub release: String,
    pub place: String,
    pub cancel: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(format!("side must be buy or sell, got '{other}'")),
        }
    }
}

/// Lock `amount` of `currency` and place an order backed by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub party: Party,
    pub currency: String,
    pub amount: String,
    pub side: Side,
    pub price: String,
    pub quantity: String,
    pub instrument: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub order_id: String,
    pub allocation: Contract,
    pub order: Contract,
    pub run: SettlementRun,
}

#[derive(Debug, Clone)]
pub struct Coordinator {
    commands: CommandClient,
    query: ActiveStateQuery,
    resolver: ContractResolver,
    templates: SettlementTemplates,
    choices: SettlementChoices,
    operator: Party,
    bus: RefreshBus<String>,
}

impl Coordinator {
    pub fn new(
        commands: CommandClient,
        query: ActiveStateQuery,
        resolver: ContractResolver,
        templates: SettlementTemplates,
        choices: SettlementChoices,
        operator: Party,
        bus: RefreshBus<String>,
    ) -> Self {
        Self {
            commands,
            query,
            resolver,
            templates,
            choices,
            operator,
            bus,
        }
    }

    pub fn bus(&self) -> &RefreshBus<String> {
        &self.bus
    }

    pub async fn place_order(&self, req: OrderRequest) -> Result<Placement, SettlementError> {
        let amount = positive_micros("amount", &req.amount)?;
        positive_micros("price", &req.price)?;
        positive_micros("quantity", &req.quantity)?;
        if req.instrument.trim().is_empty() {
            return Err(SettlementError::InvalidRequest {
                field: "instrument",
                message: "must not be empty".to_string(),
            });
        }

        let order_id = uuid::Uuid::new_v4().to_string();
        let mut run = SettlementRun::new(&order_id);
        let party = &req.party;

        // Holding selection.
        let holdings = match self
            .query
            .holdings(party, &self.templates.holding, &req.currency)
            .await
        {
            Ok(h) => h,
            Err(reason) => {
                run.apply(SettlementEvent::LockRefused)?;
                return Err(SettlementError::LockFailed { reason });
            }
        };
        let Some(holding) = select_holding(&holdings, amount) else {
            run.apply(SettlementEvent::LockRefused)?;
            return Err(SettlementError::NoEligibleHolding {
                currency: req.currency.clone(),
                requested: req.amount.clone(),
            });
        };

        // Phase A.
        let allocation = self.lock(&mut run, party, holding, amount, &req.currency).await?;
        self.publish(
            &holdings_channel(party),
            RefreshReason::LockConfirmed,
            Some(&allocation.id),
        );

        // Phase B.
        run.apply(SettlementEvent::PlaceSubmitted)?;
        let place = Command::exercise(
            allocation.id.clone(),
            self.templates.allocation.clone(),
            self.choices.place.clone(),
            json!({
                ORDER_ID_FIELD: order_id,
                PLACE_ALLOCATION_ARG: allocation.id,
                "side": req.side,
                "price": req.price,
                "quantity": req.quantity,
                "instrument": req.instrument,
            }),
        );
        info!(order_id = %order_id, allocation_id = %allocation.id, "placing order");

        let submitted = match self.commands.submit(vec![place], vec![party.clone()]).await {
            Ok(s) => s,
            Err(e) if e.outcome_unknown() => {
                run.apply(SettlementEvent::OrderUnconfirmed)?;
                warn!(order_id = %order_id, error = %e, "placement outcome unknown; allocation left locked");
                self.publish(&orders_channel(party), RefreshReason::OrderUnconfirmed, None);
                return Err(SettlementError::OrderUnconfirmed {
                    allocation_id: allocation.id,
                    order_id,
                    detail: e.to_string(),
                });
            }
            Err(reason) => {
                run.apply(SettlementEvent::PlaceRejected)?;
                return Err(self.compensate(&mut run, party, &allocation, order_id, reason).await);
            }
        };

        let matcher = Matcher::natural_key(ORDER_ID_FIELD, order_id.as_str());
        let order = match self
            .resolver
            .resolve(&self.templates.order, party, &submitted.completion_offset, &matcher)
            .await
        {
            Ok(order) => order,
            Err(e) => {
                run.apply(SettlementEvent::OrderUnconfirmed)?;
                warn!(order_id = %order_id, error = %e, "order committed but unconfirmed; not compensating");
                self.publish(&orders_channel(party), RefreshReason::OrderUnconfirmed, None);
                return Err(SettlementError::OrderUnconfirmed {
                    allocation_id: allocation.id,
                    order_id,
                    detail: e.to_string(),
                });
            }
        };

        let allocation_ref = order.field_str(ORDER_ALLOCATION_REF_FIELD);
        if allocation_ref != Some(allocation.id.as_str()) {
            error!(
                order_id = %order_id,
                order_cid = %order.id,
                allocation_id = %allocation.id,
                allocation_ref = ?allocation_ref,
                "confirmed order does not reference the locked allocation; operator action required"
            );
            run.apply(SettlementEvent::OrderUnconfirmed)?;
            self.publish(&orders_channel(party), RefreshReason::OrderUnconfirmed, Some(&order.id));
            return Err(SettlementError::OrderMislinked {
                allocation_ref: allocation_ref.map(str::to_string),
                allocation_id: allocation.id,
                order_id,
                order_cid: order.id,
            });
        }

        run.apply(SettlementEvent::OrderConfirmed {
            order_contract_id: order.id.clone(),
        })?;
        info!(order_id = %order_id, order_cid = %order.id, "order placed");
        self.publish(&orders_channel(party), RefreshReason::OrderPlaced, Some(&order.id));

        Ok(Placement {
            order_id,
            allocation,
            order,
            run,
        })
    }

    /// Archive `order` and release its allocation in a single submission.
    pub async fn cancel_order(
        &self,
        party: &Party,
        order: &Contract,
    ) -> Result<SubmissionResult, SettlementError> {
        let Some(allocation_id) = order.field_str(ORDER_ALLOCATION_REF_FIELD) else {
            return Err(SettlementError::InvalidRequest {
                field: ORDER_ALLOCATION_REF_FIELD,
                message: format!("order {} carries no allocation reference", order.id),
            });
        };

        let batch = vec![
            Command::exercise(
                order.id.clone(),
                order.record_type.clone(),
                self.choices.cancel.clone(),
                json!({}),
            ),
            Command::exercise(
                allocation_id,
                self.templates.allocation.clone(),
                self.choices.release.clone(),
                json!({}),
            ),
        ];

        match self.commands.submit(batch, vec![party.clone()]).await {
            Ok(res) => {
                info!(order_cid = %order.id, allocation_id, "order cancelled and allocation released");
                self.publish(&orders_channel(party), RefreshReason::OrderCancelled, Some(&order.id));
                self.publish(
                    &holdings_channel(party),
                    RefreshReason::AllocationReleased,
                    Some(allocation_id),
                );
                Ok(res)
            }
            Err(reason) => {
                warn!(order_cid = %order.id, error = %reason, "cancel failed");
                Err(SettlementError::CancelFailed {
                    contract_id: order.id.clone(),
                    reason,
                })
            }
        }
    }

    /// Look up an order contract visible to `party` by contract id.
    pub async fn find_order(
        &self,
        party: &Party,
        order_cid: &str,
    ) -> Result<Option<Contract>, LedgerError> {
        let found = self
            .query
            .query(
                &QuerySelector::ContractIds(vec![order_cid.to_string()]),
                party,
                &Offset::frontier(),
            )
            .await?;
        Ok(found
            .into_iter()
            .find(|c| c.record_type.same_type(&self.templates.order)))
    }

    /// Explicit release of a leftover allocation (after `LockUnconfirmed` or
    /// `CompensationFailure` has been investigated). Never called
    /// automatically.
    pub async fn release_allocation(
        &self,
        party: &Party,
        allocation_id: &str,
    ) -> Result<SubmissionResult, SettlementError> {
        let cmd = Command::exercise(
            allocation_id,
            self.templates.allocation.clone(),
            self.choices.release.clone(),
            json!({}),
        );
        match self.commands.submit(vec![cmd], vec![party.clone()]).await {
            Ok(res) => {
                info!(allocation_id, "allocation released");
                self.publish(
                    &holdings_channel(party),
                    RefreshReason::AllocationReleased,
                    Some(allocation_id),
                );
                Ok(res)
            }
            Err(reason) => Err(SettlementError::CancelFailed {
                contract_id: allocation_id.to_string(),
                reason,
            }),
        }
    }

    async fn lock(
        &self,
        run: &mut SettlementRun,
        party: &Party,
        holding: &Contract,
        amount: i64,
        currency: &str,
    ) -> Result<Contract, SettlementError> {
        let amount_text = micros_to_amount(amount);
        run.apply(SettlementEvent::LockSubmitted {
            holding_id: holding.id.clone(),
        })?;
        let lock = Command::exercise(
            holding.id.clone(),
            self.templates.holding.clone(),
            self.choices.lock.clone(),
            json!({
                ALLOCATION_AMOUNT_FIELD: amount_text,
                ALLOCATION_OPERATOR_FIELD: self.operator,
            }),
        );
        info!(holding_id = %holding.id, amount = %amount_text, currency, "locking funds");

        let submitted = match self.commands.submit(vec![lock], vec![party.clone()]).await {
            Ok(s) => s,
            Err(e) if e.outcome_unknown() => {
                run.apply(SettlementEvent::LockUnconfirmed)?;
                warn!(holding_id = %holding.id, error = %e, "lock outcome unknown; not placing");
                return Err(SettlementError::LockUnconfirmed {
                    holding_id: holding.id.clone(),
                    completion_offset: None,
                    detail: e.to_string(),
                });
            }
            Err(reason) => {
                run.apply(SettlementEvent::LockRefused)?;
                return Err(SettlementError::LockFailed { reason });
            }
        };

        let mut expected = Map::new();
        expected.insert(ALLOCATION_OWNER_FIELD.to_string(), json!(party));
        expected.insert(ALLOCATION_AMOUNT_FIELD.to_string(), json!(amount_text));
        expected.insert(ALLOCATION_CURRENCY_FIELD.to_string(), json!(currency));
        let matcher = Matcher::PayloadSubset(expected);

        match self
            .resolver
            .resolve(&self.templates.allocation, party, &submitted.completion_offset, &matcher)
            .await
        {
            Ok(allocation) => {
                run.apply(SettlementEvent::LockConfirmed {
                    allocation_id: allocation.id.clone(),
                })?;
                info!(allocation_id = %allocation.id, "allocation confirmed");
                Ok(allocation)
            }
            Err(e) => {
                run.apply(SettlementEvent::LockUnconfirmed)?;
                warn!(
                    holding_id = %holding.id,
                    completion_offset = %submitted.completion_offset,
                    error = %e,
                    "lock committed but allocation unconfirmed; not placing"
                );
                Err(SettlementError::LockUnconfirmed {
                    holding_id: holding.id.clone(),
                    completion_offset: Some(submitted.completion_offset),
                    detail: describe_resolve(&e),
                })
            }
        }
    }

    /// Exactly one release attempt for a refused placement.
    async fn compensate(
        &self,
        run: &mut SettlementRun,
        party: &Party,
        allocation: &Contract,
        order_id: String,
        reject_reason: LedgerError,
    ) -> SettlementError {
        warn!(order_id = %order_id, allocation_id = %allocation.id, reason = %reject_reason, "placement refused; releasing allocation");

        let release = Command::exercise(
            allocation.id.clone(),
            self.templates.allocation.clone(),
            self.choices.release.clone(),
            json!({}),
        );
        let outcome = self.commands.submit(vec![release], vec![party.clone()]).await;

        let event = if outcome.is_ok() {
            SettlementEvent::Released
        } else {
            SettlementEvent::ReleaseFailed
        };
        if let Err(e) = run.apply(event) {
            return SettlementError::Transition(e);
        }

        match outcome {
            Ok(_) => {
                self.publish(
                    &holdings_channel(party),
                    RefreshReason::AllocationReleased,
                    Some(&allocation.id),
                );
                SettlementError::OrderRejectedReleased {
                    allocation_id: allocation.id.clone(),
                    order_id,
                    reason: reject_reason,
                }
            }
            Err(release_error) => {
                error!(
                    order_id = %order_id,
                    allocation_id = %allocation.id,
                    release_error = %release_error,
                    "COMPENSATION FAILED: allocation remains locked; operator action required"
                );
                SettlementError::CompensationFailure {
                    allocation_id: allocation.id.clone(),
                    order_id,
                    reject_reason,
                    release_error,
                }
            }
        }
    }

    fn publish(&self, channel: &String, reason: RefreshReason, contract_id: Option<&str>) {
        self.bus.publish(
            channel,
            RefreshEvent {
                reason,
                contract_id: contract_id.map(str::to_string),
            },
        );
    }
}

fn positive_micros(field: &'static str, raw: &str) -> Result<i64, SettlementError> {
    match amount_to_micros(raw) {
        Ok(m) if m > 0 => Ok(m),
        Ok(_) => Err(SettlementError::InvalidRequest {
            field,
            message: format!("must be positive, got '{raw}'"),
        }),
        Err(e) => Err(SettlementError::InvalidRequest {
            field,
            message: e.to_string(),
        }),
    }
}

fn describe_resolve(e: &ResolveError) -> String {
    match e {
        ResolveError::NotFoundAfterRetries { .. } => format!("confirmation timeout: {e}"),
        ResolveError::Ledger(_) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!("BUY".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!("sell".parse::<Side>().unwrap(), Side::Sell);
        assert!("hold".parse::<Side>().is_err());
    }

    #[test]
    fn amounts_must_be_positive_decimals() {
        assert_eq!(positive_micros("amount", "100").unwrap(), 100_000_000);
        assert!(positive_micros("amount", "0").is_err());
        assert!(positive_micros("amount", "-5").is_err());
        assert!(matches!(
            positive_micros("price", "1.1234567"),
            Err(SettlementError::InvalidRequest { field: "price", .. })
        ));
    }

    #[test]
    fn side_serializes_as_variant_name() {
        assert_eq!(serde_json::to_value(Side::Sell).unwrap(), json!("Sell"));
    }
}
