//! LedgerLens Test Utilities
//!
//! Centralized test infrastructure for the LedgerLens workspace:
//! - A scripted mock view transport that records every call
//! - Fixtures for activity records and a fake activity endpoint
//! - Proptest generators for errors and records
//! - Custom assertions and tracing setup for tests

// Re-export core types for convenience
pub use ledgerlens_core::{
    ActivityConfig, ActivityKind, ActivityRecord, Clock, LensConfig, ManualClock, Page,
    PageSource, ReadError, ReadErrorKind, ReadRequest, ReadResult, RecordOrigin, Subject,
    ViewTransport,
};
pub use ledgerlens_storage::{CacheKey, CacheStatus, MemoryStore, TieredCache};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// Computes a response from the request.
pub type Handler = Arc<dyn Fn(&ReadRequest) -> Result<Value, ReadError> + Send + Sync>;

/// One observed call: the request and the (Tokio) instant it started.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request: ReadRequest,
    pub at: Instant,
}

/// Scripted view transport.
///
/// Per function, one-shot scripted responses are consumed first, then the
/// standing handler answers. Functions with neither are rejected.
#[derive(Default)]
pub struct MockTransport {
    handlers: Mutex<HashMap<String, Handler>>,
    scripted: Mutex<HashMap<String, VecDeque<Result<Value, ReadError>>>>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Mutex<Duration>,
    delays: Mutex<HashMap<String, VecDeque<Duration>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `function` with `value`.
    pub fn respond(&self, function: &str, value: Value) -> &Self {
        self.on(function, move |_| Ok(value.clone()))
    }

    /// Always fail `function` with `error`.
    pub fn fail(&self, function: &str, error: ReadError) -> &Self {
        self.on(function, move |_| Err(error.clone()))
    }

    /// Answer `function` with a handler.
    pub fn on<F>(&self, function: &str, handler: F) -> &Self
    where
        F: Fn(&ReadRequest) -> Result<Value, ReadError> + Send + Sync + 'static,
    {
        lock(&self.handlers).insert(function.to_string(), Arc::new(handler));
        self
    }

    /// Queue one-shot responses for `function`, consumed in order before
    /// the standing handler.
    pub fn script(&self, function: &str, outcomes: Vec<Result<Value, ReadError>>) -> &Self {
        lock(&self.scripted)
            .entry(function.to_string())
            .or_default()
            .extend(outcomes);
        self
    }

    /// Delay every response by `latency` (virtual time under a paused clock).
    pub fn set_latency(&self, latency: Duration) -> &Self {
        *lock(&self.latency) = latency;
        self
    }

    /// Delay the next calls of `function` by `delays`, one per call, in
    /// place of the shared latency.
    pub fn delay_next(&self, function: &str, delays: Vec<Duration>) -> &Self {
        lock(&self.delays)
            .entry(function.to_string())
            .or_default()
            .extend(delays);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn call_count(&self, function: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.request.function() == function)
            .count()
    }

    /// Start instants of every call, in order.
    pub fn call_times(&self) -> Vec<Instant> {
        lock(&self.calls).iter().map(|call| call.at).collect()
    }

    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
    }

    fn answer(&self, request: &ReadRequest) -> Result<Value, ReadError> {
        if let Some(outcome) = lock(&self.scripted)
            .get_mut(request.function())
            .and_then(VecDeque::pop_front)
        {
            return outcome;
        }
        let handler = lock(&self.handlers).get(request.function()).cloned();
        match handler {
            Some(handler) => handler(request),
            None => Err(ReadError::rejected(format!(
                "no response scripted for {}",
                request.function()
            ))),
        }
    }
}

#[async_trait]
impl ViewTransport for MockTransport {
    async fn call_view(&self, request: &ReadRequest) -> Result<ReadResult, ReadError> {
        lock(&self.calls).push(RecordedCall {
            request: request.clone(),
            at: Instant::now(),
        });
        // Answered as of dispatch; the delay only models transit time.
        let outcome = self.answer(request);
        let latency = lock(&self.delays)
            .get_mut(request.function())
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| *lock(&self.latency));
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        outcome
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.total_calls())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for LedgerLens types.

    use super::*;
    use proptest::prelude::*;

    /// Generate an error of any class.
    pub fn arb_read_error() -> impl Strategy<Value = ReadError> {
        prop_oneof![
            "[a-z ]{0,20}".prop_map(ReadError::rate_limited),
            "[a-z ]{0,20}".prop_map(ReadError::transient),
            "[a-z ]{0,20}".prop_map(ReadError::cross_origin),
            "[a-z ]{0,20}".prop_map(ReadError::rejected),
            "[a-z ]{0,20}".prop_map(ReadError::malformed),
        ]
    }

    /// Generate an error the retry policy absorbs.
    pub fn arb_retryable_error() -> impl Strategy<Value = ReadError> {
        arb_read_error().prop_filter("retryable", ReadError::is_retryable)
    }

    pub fn arb_activity_kind() -> impl Strategy<Value = ActivityKind> {
        prop_oneof![
            Just(ActivityKind::DaoCreated),
            Just(ActivityKind::ProposalCreated),
            Just(ActivityKind::VoteCast),
            Just(ActivityKind::ProposalExecuted),
            Just(ActivityKind::MemberJoined),
            Just(ActivityKind::MemberLeft),
            Just(ActivityKind::Deposit),
            Just(ActivityKind::Withdrawal),
        ]
    }

    /// Generate a confirmed record with a non-zero id.
    pub fn arb_activity_record() -> impl Strategy<Value = ActivityRecord> {
        (
            1u64..1_000_000,
            arb_activity_kind(),
            prop_oneof![Just("0xdao1"), Just("0xdao2")],
            1_600_000_000u64..1_900_000_000,
        )
            .prop_map(|(id, kind, dao, ts)| {
                let mut record = fixtures::dao_record(id, dao, ts);
                record.kind = kind;
                record
            })
    }

    /// Generate a set of distinct ids, in no particular order.
    pub fn arb_id_set(max_len: usize) -> impl Strategy<Value = Vec<u64>> {
        prop::collection::hash_set(1u64..10_000, 0..=max_len)
            .prop_map(|ids| ids.into_iter().collect())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use serde_json::json;

    /// Defaults with short delays, so tests stay fast even on real time.
    pub fn fast_config() -> LensConfig {
        let mut config = LensConfig::defaults();
        config.gate.min_spacing_ms = 10;
        config.retry.base_delay_ms = 20;
        config.retry.cap_delay_ms = 100;
        config.batch.inter_batch_delay_ms = 50;
        config
    }

    /// A confirmed record in `dao`, created by `0xuser{id}`.
    pub fn dao_record(id: u64, dao: &str, timestamp_seconds: u64) -> ActivityRecord {
        ActivityRecord {
            id,
            kind: ActivityKind::ProposalCreated,
            subject_address: format!("0xuser{id}"),
            dao_address: dao.to_string(),
            timestamp_seconds,
            amount: None,
            transaction_hash: format!("0x{id:064x}"),
            origin: RecordOrigin::Confirmed,
        }
    }

    /// Records `1..=n` in `dao`, timestamps increasing with id.
    pub fn dao_records(n: u64, dao: &str) -> Vec<ActivityRecord> {
        (1..=n)
            .map(|id| dao_record(id, dao, 1_700_000_000 + id * 60))
            .collect()
    }

    pub fn record_json(record: &ActivityRecord) -> Value {
        serde_json::to_value(record).unwrap_or(Value::Null)
    }

    /// Parse the subject encoding used by the config-driven catalog.
    pub fn subject_from_args(args: &[Value]) -> Subject {
        let address = args.get(1).and_then(Value::as_str).unwrap_or_default();
        match args.first().and_then(Value::as_str) {
            Some("dao") => Subject::dao(address),
            Some("user") => Subject::user(address),
            _ => Subject::Global,
        }
    }

    /// A fake activity endpoint serving a fixed set of records through the
    /// view names in an [`ActivityConfig`].
    ///
    /// Counts come back as decimal strings and ids in ascending order, the
    /// way remotes commonly return them.
    #[derive(Debug, Clone, Default)]
    pub struct ActivityFixture {
        pub records: Vec<ActivityRecord>,
    }

    impl ActivityFixture {
        pub fn new(records: Vec<ActivityRecord>) -> Self {
            Self { records }
        }

        /// Register count, ids, record and events handlers on `transport`.
        pub fn install(&self, transport: &MockTransport, config: &ActivityConfig) {
            let records = Arc::new(self.records.clone());

            let for_count = Arc::clone(&records);
            transport.on(&config.count_view, move |request| {
                let subject = subject_from_args(request.args());
                let n = for_count.iter().filter(|r| subject.matches(r)).count();
                Ok(json!(n.to_string()))
            });

            let for_ids = Arc::clone(&records);
            transport.on(&config.ids_view, move |request| {
                let subject = subject_from_args(request.args());
                let mut ids: Vec<u64> = for_ids
                    .iter()
                    .filter(|r| subject.matches(r))
                    .map(|r| r.id)
                    .collect();
                ids.sort_unstable();
                Ok(json!(ids))
            });

            let for_record = Arc::clone(&records);
            transport.on(&config.record_view, move |request| {
                let id = request.args().first().and_then(Value::as_u64);
                for_record
                    .iter()
                    .find(|r| Some(r.id) == id)
                    .map(record_json)
                    .ok_or_else(|| ReadError::rejected("activity not found"))
            });

            let for_events = Arc::clone(&records);
            transport.on(&config.events_view, move |request| {
                let limit = request
                    .args()
                    .first()
                    .and_then(Value::as_u64)
                    .unwrap_or(u64::MAX);
                let mut events: Vec<&ActivityRecord> = for_events.iter().collect();
                events.sort_by(|a, b| b.timestamp_seconds.cmp(&a.timestamp_seconds));
                let events: Vec<Value> = events
                    .into_iter()
                    .take(usize::try_from(limit).unwrap_or(usize::MAX))
                    .map(record_json)
                    .collect();
                Ok(Value::Array(events))
            });
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for LedgerLens-specific results.

    use super::*;

    /// Assert a page holds exactly `ids`, in order.
    #[track_caller]
    pub fn assert_page_ids(page: &Page, ids: &[u64]) {
        assert_eq!(page.ids(), ids, "unexpected page items: {:?}", page);
    }

    /// Assert a read failed with the given class.
    #[track_caller]
    pub fn assert_read_error<T: std::fmt::Debug>(result: &Result<T, ReadError>, kind: ReadErrorKind) {
        match result {
            Err(error) => assert_eq!(error.kind(), kind, "wrong error class: {error}"),
            Ok(value) => panic!("Expected {kind} error, got Ok: {value:?}"),
        }
    }
}
