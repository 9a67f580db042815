//! In-memory ledger implementing [`LedgerApi`].
//!
//! Deterministic: offsets, contract ids and update ids are counters. Each
//! submission is atomic (all commands apply or none) and deduplicated by
//! `commandId`. Choices are plain closures registered by name;
//! [`FakeLedger::settlement`] installs the lock/place/release/cancel set.
//!
//! Fault injection: refuse or lose the response of the next submission of
//! a given choice, answer `403` for a record type, hide new contracts of a
//! type for a number of queries, make the packages endpoint fail.

use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use stl_ledger::{LedgerApi, LedgerError, QueryRequest, SubmitRequest};
use stl_schemas::{amount_to_micros, micros_to_amount, Command, Contract, Offset, Party, TemplateId};
use tracing::debug;

/// Hide-forever marker for [`FakeLedger::set_visibility_lag`] and
/// [`FakeLedger::forbid_queries`].
const ALWAYS: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq)]
pub struct NewContract {
    /// Short form; the fake qualifies it with the current package.
    pub template: TemplateId,
    pub payload: Map<String, Value>,
    pub signatories: Vec<Party>,
    pub observers: Vec<Party>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChoiceEffect {
    pub consume: bool,
    pub create: Vec<NewContract>,
}

/// `(target, argument) -> effect`; an `Err` becomes a 400 rejection.
pub type ChoiceHandler =
    Arc<dyn Fn(&Contract, &Value) -> Result<ChoiceEffect, String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStyle {
    /// `[{"contractEntry": {"JsActiveContract": {"createdEvent": ..}}}]`
    BareArray,
    /// `{"activeRecords": [{"createdEvent": ..}]}`
    WrappedActiveRecords,
}

enum SubmitFault {
    Refuse(LedgerError),
    /// Commit, then fail the response as if the connection dropped.
    LoseResponse,
}

struct Stored {
    contract: Contract,
    hidden_for: u32,
}

struct State {
    package_ids: Vec<String>,
    packages_error: Option<LedgerError>,
    package_calls: usize,
    query_calls: usize,
    last_offset: u64,
    next_cid: u64,
    active: Vec<Stored>,
    archived: Vec<Contract>,
    committed: HashMap<String, Value>,
    submissions: Vec<SubmitRequest>,
    commits: Vec<SubmitRequest>,
    faults: HashMap<String, VecDeque<SubmitFault>>,
    forbidden: HashMap<String, u32>,
    visibility_lag: HashMap<String, u32>,
    choices: HashMap<String, ChoiceHandler>,
    envelope: EnvelopeStyle,
}

pub struct FakeLedger {
    state: Mutex<State>,
}

impl std::fmt::Debug for FakeLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeLedger").finish_non_exhaustive()
    }
}

fn type_key(t: &TemplateId) -> String {
    t.short_form().to_string()
}

fn rejection(message: impl Into<String>) -> LedgerError {
    LedgerError::Rejection {
        status: Some(400),
        message: message.into(),
    }
}

impl FakeLedger {
    pub fn new(package_id: &str) -> Self {
        Self {
            state: Mutex::new(State {
                package_ids: vec![package_id.to_string()],
                packages_error: None,
                package_calls: 0,
                query_calls: 0,
                last_offset: 0,
                next_cid: 0,
                active: vec![],
                archived: vec![],
                committed: HashMap::new(),
                submissions: vec![],
                commits: vec![],
                faults: HashMap::new(),
                forbidden: HashMap::new(),
                visibility_lag: HashMap::new(),
                choices: HashMap::new(),
                envelope: EnvelopeStyle::BareArray,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    pub fn register_choice(&self, name: &str, handler: ChoiceHandler) {
        self.lock().choices.insert(name.to_string(), handler);
    }

    pub fn set_packages(&self, ids: &[&str]) {
        let mut st = self.lock();
        st.package_ids = ids.iter().map(|s| s.to_string()).collect();
        st.packages_error = None;
    }

    pub fn fail_packages(&self, err: LedgerError) {
        self.lock().packages_error = Some(err);
    }

    pub fn set_envelope(&self, style: EnvelopeStyle) {
        self.lock().envelope = style;
    }

    /// The next submission whose first command is `choice` (or `"Create"`)
    /// is refused with `err` and not applied.
    pub fn refuse_next(&self, choice: &str, err: LedgerError) {
        self.lock()
            .faults
            .entry(choice.to_string())
            .or_default()
            .push_back(SubmitFault::Refuse(err));
    }

    /// The next submission of `choice` commits but its response is lost.
    pub fn lose_next_response(&self, choice: &str) {
        self.lock()
            .faults
            .entry(choice.to_string())
            .or_default()
            .push_back(SubmitFault::LoseResponse);
    }

    /// The next `count` queries naming `template` answer `403`.
    pub fn forbid_queries(&self, template: &str, count: u32) {
        self.lock().forbidden.insert(template.to_string(), count);
    }

    pub fn forbid_always(&self, template: &str) {
        self.forbid_queries(template, ALWAYS);
    }

    /// Contracts of `template` created from now on stay out of query results
    /// for `queries` matching queries.
    pub fn set_visibility_lag(&self, template: &str, queries: u32) {
        self.lock().visibility_lag.insert(template.to_string(), queries);
    }

    pub fn hide_forever(&self, template: &str) {
        self.set_visibility_lag(template, ALWAYS);
    }

    /// Create a contract outside any submission. Returns its id.
    pub fn seed(
        &self,
        template: &str,
        payload: Value,
        signatories: &[Party],
        observers: &[Party],
    ) -> String {
        let mut st = self.lock();
        let template = TemplateId::parse(template).unwrap_or_else(|e| panic!("seed template: {e}"));
        let payload = match payload {
            Value::Object(m) => m,
            other => panic!("seed payload must be an object, got {other}"),
        };
        st.last_offset += 1;
        let offset = st.last_offset;
        let pkg = st.current_package().unwrap_or_else(|| "pkg".to_string());
        let contract = st.mint(
            NewContract {
                template,
                payload,
                signatories: signatories.to_vec(),
                observers: observers.to_vec(),
            },
            &pkg,
            offset,
        );
        let id = contract.id.clone();
        st.active.push(Stored {
            contract,
            hidden_for: 0,
        });
        id
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Every request received, duplicates and refusals included.
    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.lock().submissions.clone()
    }

    /// Requests that were applied, once per `commandId`.
    pub fn commits(&self) -> Vec<SubmitRequest> {
        self.lock().commits.clone()
    }

    /// Received requests containing an exercise of `choice`.
    pub fn submissions_of(&self, choice: &str) -> Vec<SubmitRequest> {
        self.submissions()
            .into_iter()
            .filter(|r| r.commands.iter().any(|c| c.choice() == Some(choice)))
            .collect()
    }

    pub fn active(&self, template: &str) -> Vec<Contract> {
        let st = self.lock();
        st.active
            .iter()
            .filter(|s| type_key(&s.contract.record_type) == template)
            .map(|s| s.contract.clone())
            .collect()
    }

    pub fn archived(&self, template: &str) -> Vec<Contract> {
        let st = self.lock();
        st.archived
            .iter()
            .filter(|c| type_key(&c.record_type) == template)
            .cloned()
            .collect()
    }

    pub fn package_calls(&self) -> usize {
        self.lock().package_calls
    }

    pub fn query_calls(&self) -> usize {
        self.lock().query_calls
    }

    // -----------------------------------------------------------------------
    // Settlement choices
    // -----------------------------------------------------------------------

    /// Ledger with `Lock` on holdings, `PlaceOrder`/`Release` on allocations
    /// and `Cancel` on orders.
    pub fn settlement(package_id: &str) -> Self {
        let ledger = Self::new(package_id);
        ledger.register_choice("Lock", Arc::new(lock_choice));
        ledger.register_choice("PlaceOrder", Arc::new(place_choice));
        ledger.register_choice("Release", Arc::new(release_choice));
        ledger.register_choice(
            "Cancel",
            Arc::new(|_: &Contract, _: &Value| {
                Ok(ChoiceEffect {
                    consume: true,
                    create: vec![],
                })
            }),
        );
        ledger
    }
}

impl State {
    fn current_package(&self) -> Option<String> {
        self.package_ids.last().cloned()
    }

    fn mint(&mut self, nc: NewContract, pkg: &str, offset: u64) -> Contract {
        self.next_cid += 1;
        Contract {
            id: format!("00{:06x}{}", self.next_cid, pkg.chars().take(4).collect::<String>()),
            record_type: nc.template.qualify(pkg),
            payload: nc.payload,
            signatories: nc.signatories.into_iter().collect(),
            observers: nc.observers.into_iter().collect(),
            offset: Some(Offset::new(offset.to_string())),
        }
    }

    fn apply(&mut self, req: &SubmitRequest) -> Result<Value, String> {
        if req.commands.is_empty() {
            return Err("INVALID_ARGUMENT: no commands".to_string());
        }
        if req.act_as.is_empty() {
            return Err("INVALID_ARGUMENT: actAs is empty".to_string());
        }
        let pkg = self
            .current_package()
            .ok_or_else(|| "PACKAGE_NOT_FOUND: nothing deployed".to_string())?;

        let mut consumed: Vec<String> = vec![];
        let mut created: Vec<NewContract> = vec![];

        for cmd in &req.commands {
            let rt = cmd.record_type();
            if rt.package_id() != Some(pkg.as_str()) {
                return Err(format!("TEMPLATES_OR_INTERFACES_NOT_FOUND: {rt}"));
            }
            match cmd {
                Command::Create {
                    record_type,
                    payload,
                } => created.push(NewContract {
                    template: record_type.short_form(),
                    payload: payload.clone(),
                    signatories: req.act_as.clone(),
                    observers: vec![],
                }),
                Command::Exercise {
                    contract_id,
                    record_type,
                    choice,
                    argument,
                } => {
                    let target = self
                        .active
                        .iter()
                        .map(|s| &s.contract)
                        .find(|c| &c.id == contract_id && !consumed.contains(&c.id))
                        .ok_or_else(|| format!("CONTRACT_NOT_FOUND: {contract_id}"))?;
                    if !target.record_type.same_type(record_type) {
                        return Err(format!(
                            "WRONG_TEMPLATE: {contract_id} is {}, not {record_type}",
                            target.record_type
                        ));
                    }
                    let authorized = req
                        .act_as
                        .iter()
                        .any(|p| target.signatories.contains(p) || target.observers.contains(p));
                    if !authorized {
                        return Err(format!("PERMISSION_DENIED: actAs cannot exercise {choice}"));
                    }
                    let handler = self
                        .choices
                        .get(choice)
                        .cloned()
                        .ok_or_else(|| format!("UNKNOWN_CHOICE: {choice}"))?;
                    let effect = handler(target, argument)?;
                    if effect.consume {
                        consumed.push(target.id.clone());
                    }
                    created.extend(effect.create);
                }
            }
        }

        self.last_offset += 1;
        let offset = self.last_offset;

        let (gone, kept): (Vec<Stored>, Vec<Stored>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|s| consumed.contains(&s.contract.id));
        self.active = kept;
        self.archived.extend(gone.into_iter().map(|s| s.contract));

        for nc in created {
            let hidden_for = self
                .visibility_lag
                .get(&type_key(&nc.template))
                .copied()
                .unwrap_or(0);
            let contract = self.mint(nc, &pkg, offset);
            self.active.push(Stored {
                contract,
                hidden_for,
            });
        }

        Ok(json!({
            "updateId": format!("upd-{offset:06}"),
            "completionOffset": offset,
        }))
    }
}

fn render(c: &Contract) -> Value {
    json!({
        "contractId": c.id,
        "templateId": c.record_type,
        "createArgument": c.payload,
        "signatories": c.signatories,
        "observers": c.observers,
        "offset": c.offset.as_ref().and_then(Offset::ordinal),
    })
}

#[async_trait::async_trait]
impl LedgerApi for FakeLedger {
    async fn submit_and_wait(&self, token: &str, req: &SubmitRequest) -> Result<Value, LedgerError> {
        if token.is_empty() {
            return Err(LedgerError::Auth {
                message: "missing bearer token".to_string(),
            });
        }
        let mut st = self.lock();
        st.submissions.push(req.clone());

        if let Some(prior) = st.committed.get(req.command_id.as_str()) {
            return Ok(prior.clone());
        }

        let key = req.commands.first().and_then(Command::choice).unwrap_or("Create").to_string();
        let fault = st.faults.get_mut(&key).and_then(VecDeque::pop_front);
        if let Some(SubmitFault::Refuse(err)) = fault {
            debug!(choice = %key, error = %err, "fake ledger: refusing submission");
            return Err(err);
        }

        let response = st.apply(req).map_err(rejection)?;
        st.committed
            .insert(req.command_id.as_str().to_string(), response.clone());
        st.commits.push(req.clone());

        if matches!(fault, Some(SubmitFault::LoseResponse)) {
            debug!(choice = %key, command_id = %req.command_id, "fake ledger: dropping response after commit");
            return Err(LedgerError::Transport {
                message: "connection reset after commit".to_string(),
            });
        }
        Ok(response)
    }

    async fn active_contracts(&self, token: &str, req: &QueryRequest) -> Result<Value, LedgerError> {
        if token.is_empty() {
            return Err(LedgerError::Auth {
                message: "missing bearer token".to_string(),
            });
        }
        let mut st = self.lock();
        st.query_calls += 1;

        let (party, filter) = match (req.read_as.as_slice(), req.filter.filters_by_party.iter().next()) {
            ([reader], Some((party, filter))) if reader == party && req.filter.filters_by_party.len() == 1 => {
                (party.clone(), filter.inclusive.clone())
            }
            _ => return Err(rejection("INVALID_ARGUMENT: filter must be scoped to the single reading party")),
        };

        for t in &filter.record_type_ids {
            if let Some(remaining) = st.forbidden.get_mut(&type_key(t)) {
                if *remaining > 0 {
                    if *remaining != ALWAYS {
                        *remaining -= 1;
                    }
                    return Err(LedgerError::Permission {
                        message: format!("PERMISSION_DENIED: {party} cannot read {t}"),
                    });
                }
            }
        }

        let at = if req.active_at_offset.is_frontier() {
            u64::MAX
        } else {
            req.active_at_offset.ordinal().ok_or_else(|| {
                rejection(format!("INVALID_ARGUMENT: offset {}", req.active_at_offset))
            })?
        };

        let mut out = vec![];
        for s in st.active.iter_mut() {
            let c = &s.contract;
            let visible = c.signatories.contains(&party) || c.observers.contains(&party);
            let type_ok = filter.record_type_ids.is_empty()
                || filter.record_type_ids.iter().any(|t| {
                    t.same_type(&c.record_type)
                        && t.package_id().map_or(true, |p| c.record_type.package_id() == Some(p))
                });
            let id_ok = filter.contract_ids.is_empty() || filter.contract_ids.contains(&c.id);
            let created_at = c.offset.as_ref().and_then(Offset::ordinal).unwrap_or(0);
            if !(visible && type_ok && id_ok && created_at <= at) {
                continue;
            }
            if s.hidden_for > 0 {
                if s.hidden_for != ALWAYS {
                    s.hidden_for -= 1;
                }
                continue;
            }
            out.push(render(c));
        }

        Ok(match st.envelope {
            EnvelopeStyle::BareArray => Value::Array(
                out.into_iter()
                    .map(|e| json!({"workflowId": "", "contractEntry": {"JsActiveContract": {"createdEvent": e}}}))
                    .collect(),
            ),
            EnvelopeStyle::WrappedActiveRecords => json!({
                "activeRecords": out.into_iter().map(|e| json!({"createdEvent": e})).collect::<Vec<_>>(),
                "offset": st.last_offset,
            }),
        })
    }

    async fn list_packages(&self, token: &str) -> Result<Value, LedgerError> {
        if token.is_empty() {
            return Err(LedgerError::Auth {
                message: "missing bearer token".to_string(),
            });
        }
        let mut st = self.lock();
        st.package_calls += 1;
        if let Some(err) = &st.packages_error {
            return Err(err.clone());
        }
        Ok(json!({"packageIds": st.package_ids}))
    }
}

// ---------------------------------------------------------------------------
// Settlement choice bodies
// ---------------------------------------------------------------------------

fn arg_str<'a>(arg: &'a Value, name: &str) -> Result<&'a str, String> {
    arg.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing argument {name}"))
}

fn arg_micros(arg: &Value, name: &str) -> Result<i64, String> {
    amount_to_micros(arg_str(arg, name)?).map_err(|e| format!("argument {name}: {e}"))
}

fn payload(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

fn lock_choice(holding: &Contract, arg: &Value) -> Result<ChoiceEffect, String> {
    let amount = arg_micros(arg, "amount")?;
    let operator = Party::parse(arg_str(arg, "operator")?).map_err(|e| e.to_string())?;
    let balance = holding
        .field_micros("amount")
        .ok_or("holding has no amount")?;
    if amount <= 0 || amount > balance {
        return Err(format!(
            "INSUFFICIENT_FUNDS: lock {} from {}",
            micros_to_amount(amount),
            micros_to_amount(balance)
        ));
    }
    let owner = holding.field("owner").cloned().unwrap_or(Value::Null);
    let currency = holding.field("currency").cloned().unwrap_or(Value::Null);
    let owners: Vec<Party> = holding.signatories.iter().cloned().collect();

    let mut create = vec![NewContract {
        template: TemplateId::short("Settlement", "Allocation"),
        payload: payload(json!({
            "owner": owner,
            "operator": operator,
            "amount": micros_to_amount(amount),
            "currency": currency,
        })),
        signatories: owners.clone(),
        observers: vec![operator],
    }];
    if balance > amount {
        create.push(NewContract {
            template: TemplateId::short("Token", "Holding"),
            payload: payload(json!({
                "owner": owner,
                "amount": micros_to_amount(balance - amount),
                "currency": currency,
            })),
            signatories: owners,
            observers: vec![],
        });
    }
    Ok(ChoiceEffect {
        consume: true,
        create,
    })
}

fn place_choice(allocation: &Contract, arg: &Value) -> Result<ChoiceEffect, String> {
    let referenced = arg_str(arg, "allocationCid")?;
    if referenced != allocation.id {
        return Err(format!(
            "ALLOCATION_MISMATCH: exercised on {} but references {referenced}",
            allocation.id
        ));
    }
    let order_id = arg_str(arg, "orderId")?;
    Ok(ChoiceEffect {
        consume: false,
        create: vec![NewContract {
            template: TemplateId::short("OrderBook", "Order"),
            payload: payload(json!({
                "orderId": order_id,
                "owner": allocation.field("owner"),
                "operator": allocation.field("operator"),
                "allocationRef": allocation.id,
                "side": arg.get("side"),
                "price": arg.get("price"),
                "quantity": arg.get("quantity"),
                "instrument": arg.get("instrument"),
                "status": "Open",
            })),
            signatories: allocation.signatories.iter().cloned().collect(),
            observers: allocation.observers.iter().cloned().collect(),
        }],
    })
}

fn release_choice(allocation: &Contract, _: &Value) -> Result<ChoiceEffect, String> {
    Ok(ChoiceEffect {
        consume: true,
        create: vec![NewContract {
            template: TemplateId::short("Token", "Holding"),
            payload: payload(json!({
                "owner": allocation.field("owner"),
                "amount": allocation.field("amount"),
                "currency": allocation.field("currency"),
            })),
            signatories: allocation.signatories.iter().cloned().collect(),
            observers: vec![],
        }],
    })
}
