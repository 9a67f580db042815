use serde_json::json;
use std::sync::Arc;
use stl_execution::{Coordinator, RefreshBus, SettlementChoices, SettlementTemplates};
use stl_ledger::{
    ActiveStateQuery, CommandClient, LedgerSession, PackageCache, StaticToken, TemplateResolver,
};
use stl_reconcile::{Backoff, ContractResolver};
use stl_schemas::{Party, TemplateId};

use crate::{FakeLedger, RecordingSleeper};

pub const ALICE: &str = "alice::1220a1b2c3";
pub const OPERATOR: &str = "operator::1220ffee";
pub const PACKAGE_ID: &str = "pkg-settle-v2";

/// Every settlement component wired against one [`FakeLedger`] with a fresh
/// package cache and a sleeper that never waits.
pub struct SettlementHarness {
    pub ledger: Arc<FakeLedger>,
    pub sleeper: Arc<RecordingSleeper>,
    pub cache: Arc<PackageCache>,
    pub templates: TemplateResolver,
    pub commands: CommandClient,
    pub query: ActiveStateQuery,
    pub resolver: ContractResolver,
    pub coordinator: Coordinator,
    pub bus: RefreshBus<String>,
}

impl SettlementHarness {
    pub fn new() -> Self {
        Self::with_ledger(FakeLedger::settlement(PACKAGE_ID))
    }

    pub fn with_ledger(ledger: FakeLedger) -> Self {
        let ledger = Arc::new(ledger);
        let sleeper = Arc::new(RecordingSleeper::new());
        let cache = Arc::new(PackageCache::new());

        let session = LedgerSession::new(ledger.clone(), Arc::new(StaticToken::new("test-token")));
        let templates = TemplateResolver::new(
            session.clone(),
            cache.clone(),
            vec![holding_type(), allocation_type()],
            Some(alice()),
        );
        let commands = CommandClient::new(session.clone(), templates.clone());
        let query = ActiveStateQuery::new(session, templates.clone());
        let resolver = ContractResolver::new(query.clone(), sleeper.clone(), Backoff::default());
        let bus = RefreshBus::new();
        let coordinator = Coordinator::new(
            commands.clone(),
            query.clone(),
            resolver.clone(),
            SettlementTemplates {
                holding: holding_type(),
                allocation: allocation_type(),
                order: order_type(),
            },
            SettlementChoices {
                lock: "Lock".to_string(),
                release: "Release".to_string(),
                place: "PlaceOrder".to_string(),
                cancel: "Cancel".to_string(),
            },
            operator(),
            bus.clone(),
        );

        Self {
            ledger,
            sleeper,
            cache,
            templates,
            commands,
            query,
            resolver,
            coordinator,
            bus,
        }
    }

    /// Give alice a holding of `amount` `currency`. Returns the contract id.
    pub fn fund(&self, amount: &str, currency: &str) -> String {
        self.ledger.seed(
            "Token:Holding",
            json!({"owner": ALICE, "amount": amount, "currency": currency}),
            &[alice()],
            &[],
        )
    }
}

impl Default for SettlementHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_party(raw: &str) -> Party {
    Party::parse(raw).unwrap_or_else(|e| panic!("fixture party {raw}: {e}"))
}

pub fn alice() -> Party {
    parse_party(ALICE)
}

pub fn operator() -> Party {
    parse_party(OPERATOR)
}

pub fn holding_type() -> TemplateId {
    TemplateId::short("Token", "Holding")
}

pub fn allocation_type() -> TemplateId {
    TemplateId::short("Settlement", "Allocation")
}

pub fn order_type() -> TemplateId {
    TemplateId::short("OrderBook", "Order")
}
