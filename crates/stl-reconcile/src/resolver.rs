use std::sync::Arc;
use stl_ledger::{ActiveStateQuery, LedgerError, QuerySelector};
use stl_schemas::{Contract, Offset, Party, TemplateId};
use tracing::{debug, info, warn};

use crate::{Backoff, Matcher, ResolveError, Sleeper};

/// Polls the active-state view until a submission's contract appears.
#[derive(Clone)]
pub struct ContractResolver {
    query: ActiveStateQuery,
    sleeper: Arc<dyn Sleeper>,
    backoff: Backoff,
}

impl std::fmt::Debug for ContractResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractResolver")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl ContractResolver {
    pub fn new(query: ActiveStateQuery, sleeper: Arc<dyn Sleeper>, backoff: Backoff) -> Self {
        Self {
            query,
            sleeper,
            backoff,
        }
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Find the `record_type` contract visible to `party` that `matcher`
    /// accepts, created by the submission that completed at
    /// `completion_offset`.
    ///
    /// Each attempt sleeps, queries at `completion_offset`, and if nothing
    /// matches queries again at the frontier. Candidates whose creation
    /// offset is known and earlier than `completion_offset` are ignored: they
    /// predate the submission, however well their payload matches. Permission denials read as
    /// empty; transport and decode failures are logged and count as an empty
    /// attempt; `Auth` ends the loop.
    pub async fn resolve(
        &self,
        record_type: &TemplateId,
        party: &Party,
        completion_offset: &Offset,
        matcher: &Matcher,
    ) -> Result<Contract, ResolveError> {
        let selector = QuerySelector::RecordType(record_type.clone());
        let mut offsets = vec![completion_offset.clone()];
        if !completion_offset.is_frontier() {
            offsets.push(Offset::frontier());
        }

        for attempt in 0..self.backoff.attempts {
            self.sleeper.sleep(self.backoff.delay(attempt)).await;

            for at in &offsets {
                let candidates = match self.query.query(&selector, party, at).await {
                    Ok(c) => c,
                    Err(e @ LedgerError::Auth { .. }) => return Err(ResolveError::Ledger(e)),
                    Err(e) => {
                        warn!(attempt, at = %at, error = %e, "confirmation query failed; treating as empty");
                        continue;
                    }
                };

                let matched: Vec<Contract> = candidates
                    .into_iter()
                    .filter(|c| !created_before(c, completion_offset) && matcher.matches(c))
                    .collect();
                if let Some(found) = prefer(matched, completion_offset) {
                    info!(
                        record_type = %record_type,
                        contract_id = %found.id,
                        attempt,
                        at = %at,
                        "contract confirmed"
                    );
                    return Ok(found);
                }
                debug!(attempt, at = %at, matcher = %matcher, "no match yet");
            }
        }

        warn!(
            record_type = %record_type,
            completion_offset = %completion_offset,
            attempts = self.backoff.attempts,
            "confirmation timed out"
        );
        Err(ResolveError::NotFoundAfterRetries {
            record_type: record_type.clone(),
            attempts: self.backoff.attempts,
            completion_offset: completion_offset.clone(),
        })
    }
}

/// Both offsets known and numeric, and the contract's is the earlier one.
fn created_before(c: &Contract, completion_offset: &Offset) -> bool {
    match (
        c.offset.as_ref().and_then(Offset::ordinal),
        completion_offset.ordinal(),
    ) {
        (Some(created), Some(completed)) => created < completed,
        _ => false,
    }
}

/// Created exactly at the completion offset, else newest by offset, else
/// first returned.
fn prefer(mut matched: Vec<Contract>, completion_offset: &Offset) -> Option<Contract> {
    if let Some(i) = matched
        .iter()
        .position(|c| c.offset.as_ref() == Some(completion_offset))
    {
        return Some(matched.swap_remove(i));
    }
    let newest = matched
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.offset.as_ref().and_then(Offset::ordinal).map(|o| (o, i)))
        .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .map(|(_, i)| i);
    match newest {
        Some(i) => Some(matched.swap_remove(i)),
        None => matched.into_iter().next(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;
    use stl_ledger::{
        LedgerApi, LedgerSession, PackageCache, QueryRequest, StaticToken, SubmitRequest,
        TemplateResolver,
    };

    #[derive(Default)]
    struct RecordedSleeps(Mutex<Vec<Duration>>);

    #[async_trait::async_trait]
    impl Sleeper for RecordedSleeps {
        async fn sleep(&self, d: Duration) {
            self.0.lock().unwrap().push(d);
        }
    }

    /// Answers queries from a script; records the offsets queried.
    struct ScriptedReads {
        answers: Mutex<Vec<Result<Value, LedgerError>>>,
        offsets: Mutex<Vec<String>>,
    }

    impl ScriptedReads {
        fn new(mut answers: Vec<Result<Value, LedgerError>>) -> Arc<Self> {
            answers.reverse();
            Arc::new(Self {
                answers: Mutex::new(answers),
                offsets: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait::async_trait]
    impl LedgerApi for ScriptedReads {
        async fn submit_and_wait(&self, _: &str, _: &SubmitRequest) -> Result<Value, LedgerError> {
            Err(LedgerError::Rejection {
                status: Some(400),
                message: "read-only".to_string(),
            })
        }
        async fn active_contracts(&self, _: &str, req: &QueryRequest) -> Result<Value, LedgerError> {
            self.offsets
                .lock()
                .unwrap()
                .push(req.active_at_offset.to_string());
            self.answers.lock().unwrap().pop().unwrap_or(Ok(json!([])))
        }
        async fn list_packages(&self, _: &str) -> Result<Value, LedgerError> {
            Ok(json!({"packageIds": ["pkg"]}))
        }
    }

    fn order(cid: &str, order_id: &str, offset: u64) -> Value {
        json!({
            "contractId": cid,
            "templateId": "pkg:OrderBook:Order",
            "createArgument": {"orderId": order_id, "side": "Buy", "quantity": "1.0"},
            "signatories": ["alice::1220aa"],
            "offset": offset
        })
    }

    fn resolver(api: Arc<ScriptedReads>, sleeps: Arc<RecordedSleeps>) -> ContractResolver {
        let session = LedgerSession::new(api, Arc::new(StaticToken::new("tok")));
        let templates = TemplateResolver::new(
            session.clone(),
            Arc::new(PackageCache::with_package("pkg")),
            vec![],
            None,
        );
        ContractResolver::new(
            ActiveStateQuery::new(session, templates),
            sleeps,
            Backoff::default(),
        )
    }

    fn alice() -> Party {
        Party::parse("alice::1220aa").unwrap()
    }

    fn order_type() -> TemplateId {
        TemplateId::parse("OrderBook:Order").unwrap()
    }

    #[tokio::test]
    async fn natural_key_selects_the_right_twin() {
        let api = ScriptedReads::new(vec![Ok(json!([
            order("c-a", "o-other", 10),
            order("c-b", "o-mine", 10),
        ]))]);
        let sleeps = Arc::new(RecordedSleeps::default());
        let r = resolver(api, sleeps.clone());

        let got = r
            .resolve(
                &order_type(),
                &alice(),
                &Offset::new("10"),
                &Matcher::natural_key("orderId", "o-mine"),
            )
            .await
            .unwrap();
        assert_eq!(got.id, "c-b");
        assert_eq!(*sleeps.0.lock().unwrap(), vec![Duration::from_millis(500)]);
    }

    #[tokio::test]
    async fn falls_back_to_frontier_within_the_same_attempt() {
        let api = ScriptedReads::new(vec![Ok(json!([])), Ok(json!([order("c1", "o-1", 11)]))]);
        let r = resolver(api.clone(), Arc::new(RecordedSleeps::default()));

        let got = r
            .resolve(
                &order_type(),
                &alice(),
                &Offset::new("10"),
                &Matcher::natural_key("orderId", "o-1"),
            )
            .await
            .unwrap();
        assert_eq!(got.id, "c1");
        assert_eq!(*api.offsets.lock().unwrap(), vec!["10", "0"]);
    }

    #[tokio::test]
    async fn exhaustion_is_a_confirmation_timeout_with_full_schedule() {
        let api = ScriptedReads::new(vec![]);
        let sleeps = Arc::new(RecordedSleeps::default());
        let r = resolver(api.clone(), sleeps.clone());

        let err = r
            .resolve(
                &order_type(),
                &alice(),
                &Offset::new("10"),
                &Matcher::natural_key("orderId", "o-1"),
            )
            .await
            .unwrap_err();

        assert!(err.is_confirmation_timeout());
        let ms: Vec<u128> = sleeps.0.lock().unwrap().iter().map(|d| d.as_millis()).collect();
        assert_eq!(ms, vec![500, 1000, 2000, 4000, 8000]);
        assert_eq!(api.offsets.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn permission_denial_keeps_polling() {
        let forbidden = || {
            Err(LedgerError::Permission {
                message: "no read rights".to_string(),
            })
        };
        let api = ScriptedReads::new(vec![
            forbidden(),
            forbidden(),
            Ok(json!([order("c1", "o-1", 10)])),
        ]);
        let r = resolver(api, Arc::new(RecordedSleeps::default()));
        let got = r
            .resolve(
                &order_type(),
                &alice(),
                &Offset::new("10"),
                &Matcher::natural_key("orderId", "o-1"),
            )
            .await
            .unwrap();
        assert_eq!(got.id, "c1");
    }

    #[tokio::test]
    async fn auth_failure_stops_polling() {
        let auth = || {
            Err(LedgerError::Auth {
                message: "expired".to_string(),
            })
        };
        let api = ScriptedReads::new(vec![auth(), auth()]);
        let sleeps = Arc::new(RecordedSleeps::default());
        let r = resolver(api, sleeps.clone());
        let err = r
            .resolve(
                &order_type(),
                &alice(),
                &Offset::new("10"),
                &Matcher::natural_key("orderId", "o-1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Ledger(LedgerError::Auth { .. })));
        assert_eq!(sleeps.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn older_twin_is_skipped_until_the_new_contract_appears() {
        let twin = || Ok(json!([order("c-old", "o-1", 7)]));
        let api = ScriptedReads::new(vec![
            twin(),
            twin(),
            Ok(json!([order("c-old", "o-1", 7), order("c-new", "o-1", 12)])),
        ]);
        let sleeps = Arc::new(RecordedSleeps::default());
        let r = resolver(api.clone(), sleeps.clone());

        let got = r
            .resolve(
                &order_type(),
                &alice(),
                &Offset::new("12"),
                &Matcher::natural_key("orderId", "o-1"),
            )
            .await
            .unwrap();

        assert_eq!(got.id, "c-new");
        assert_eq!(sleeps.0.lock().unwrap().len(), 2);
        assert_eq!(*api.offsets.lock().unwrap(), vec!["12", "0", "12"]);
    }

    #[tokio::test]
    async fn only_older_twins_time_out() {
        let api = ScriptedReads::new(
            (0..10).map(|_| Ok(json!([order("c-old", "o-1", 7)]))).collect(),
        );
        let r = resolver(api, Arc::new(RecordedSleeps::default()));

        let err = r
            .resolve(
                &order_type(),
                &alice(),
                &Offset::new("12"),
                &Matcher::natural_key("orderId", "o-1"),
            )
            .await
            .unwrap_err();
        assert!(err.is_confirmation_timeout());
    }

    #[test]
    fn created_before_needs_both_offsets() {
        let parse = |v: Value| -> Contract { stl_ledger::normalize(&json!([v])).unwrap().remove(0) };
        let old = parse(order("a", "o", 7));
        assert!(created_before(&old, &Offset::new("8")));
        assert!(!created_before(&old, &Offset::new("7")));
        assert!(!created_before(&old, &Offset::new("opaque-offset")));

        let mut unknown = old.clone();
        unknown.offset = None;
        assert!(!created_before(&unknown, &Offset::new("8")));
    }

    #[test]
    fn preference_exact_offset_then_newest() {
        let parse = |v: Value| -> Contract { stl_ledger::normalize(&json!([v])).unwrap().remove(0) };
        let a = parse(order("a", "o", 9));
        let b = parse(order("b", "o", 12));
        let c = parse(order("c", "o", 10));

        let got = prefer(vec![a.clone(), b.clone(), c.clone()], &Offset::new("10")).unwrap();
        assert_eq!(got.id, "c");
        let got = prefer(vec![a, b, c], &Offset::new("99")).unwrap();
        assert_eq!(got.id, "b");
    }
}
