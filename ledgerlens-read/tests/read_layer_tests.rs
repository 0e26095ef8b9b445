//! End-to-end tests for cached, retried, rate-limited reads.

use std::sync::Arc;
use std::time::Duration;

use ledgerlens_core::{LensConfig, LensError, ManualClock, ReadError, ReadErrorKind, ReadRequest};
use ledgerlens_read::LedgerLens;
use ledgerlens_storage::cache::class;
use ledgerlens_storage::{CacheStatus, DurableStore, JsonFileStore, MemoryStore, Served};
use ledgerlens_test_utils::assertions::assert_read_error;
use ledgerlens_test_utils::fixtures::fast_config;
use ledgerlens_test_utils::{init_tracing, MockTransport};
use serde_json::json;
use tempfile::TempDir;

fn lens(transport: &Arc<MockTransport>, clock: &Arc<ManualClock>) -> LedgerLens {
    init_tracing();
    LedgerLens::with_clock(
        transport.clone(),
        None,
        &LensConfig::defaults(),
        clock.clone(),
    )
    .expect("default config is valid")
}

async fn settle_refreshes(lens: &LedgerLens) {
    while lens.reader().cache().pending_refreshes() > 0 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn fresh_reads_hit_the_network_once() {
    let transport = Arc::new(MockTransport::new());
    transport.respond("dao_name", json!("Builders"));
    let clock = Arc::new(ManualClock::starting_now());
    let lens = lens(&transport, &clock);

    let request = ReadRequest::call("dao_name");
    assert_eq!(lens.read(&request).await, Ok(json!("Builders")));
    assert_eq!(lens.read(&request).await, Ok(json!("Builders")));

    assert_eq!(transport.call_count("dao_name"), 1);
    let stats = lens.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.fresh_hits, 1);
}

#[tokio::test(start_paused = true)]
async fn stale_read_serves_old_value_and_refreshes_in_background() {
    let transport = Arc::new(MockTransport::new());
    transport.respond("quorum", json!(10));
    let clock = Arc::new(ManualClock::starting_now());
    let lens = lens(&transport, &clock);
    let request = ReadRequest::call("quorum");

    assert_eq!(lens.read(&request).await, Ok(json!(10)));
    transport.respond("quorum", json!(12));
    clock.advance(Duration::from_secs(61));

    let stale = lens
        .reader()
        .read_in(class::VIEW, &request)
        .await
        .expect("stale value is served");
    assert_eq!(stale.served(), Served::Stale);
    assert_eq!(stale.value(), &json!(10));

    settle_refreshes(&lens).await;
    assert_eq!(lens.read(&request).await, Ok(json!(12)));
    assert_eq!(transport.call_count("quorum"), 2);
}

#[tokio::test(start_paused = true)]
async fn overlapping_fetches_never_regress_a_value() {
    let transport = Arc::new(MockTransport::new());
    transport.respond("quorum", json!(1));
    let clock = Arc::new(ManualClock::starting_now());
    let lens = lens(&transport, &clock);
    let request = ReadRequest::call("quorum");
    lens.read(&request).await.expect("warm");

    // The next call is slow and carries older remote state than later ones.
    transport
        .script("quorum", vec![Ok(json!(2))])
        .delay_next("quorum", vec![Duration::from_secs(10)])
        .respond("quorum", json!(3));
    clock.advance(Duration::from_secs(61));

    let reader = lens.reader().clone();
    let forced_request = request.clone();
    let forced = tokio::spawn(async move { reader.read_fresh(&forced_request).await });
    tokio::time::sleep(Duration::from_secs(3)).await;

    let stale = lens
        .reader()
        .read_in(class::VIEW, &request)
        .await
        .expect("stale value is served");
    assert_eq!(stale.served(), Served::Stale);

    let mut highest = 0;
    for _ in 0..15 {
        if let Some(seen) = lens.reader().peek(&request).value.and_then(|v| v.as_u64()) {
            assert!(seen >= highest, "value went back from {highest} to {seen}");
            highest = seen;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    assert_eq!(forced.await.expect("forced read task"), Ok(json!(2)));
    assert_eq!(transport.call_count("quorum"), 2);
    assert_eq!(lens.reader().peek(&request).value, Some(json!(2)));
}

#[tokio::test(start_paused = true)]
async fn read_fresh_bypasses_a_fresh_entry() {
    let transport = Arc::new(MockTransport::new());
    transport.respond("quorum", json!(10));
    let clock = Arc::new(ManualClock::starting_now());
    let lens = lens(&transport, &clock);
    let request = ReadRequest::call("quorum");

    lens.read(&request).await.expect("warm");
    transport.respond("quorum", json!(11));
    clock.advance(Duration::from_secs(1));

    assert_eq!(lens.reader().read_fresh(&request).await, Ok(json!(11)));
    assert_eq!(lens.read(&request).await, Ok(json!(11)));
    assert_eq!(transport.call_count("quorum"), 2);
}

#[tokio::test(start_paused = true)]
async fn peek_never_calls_the_transport() {
    let transport = Arc::new(MockTransport::new());
    transport.respond("quorum", json!(10));
    let clock = Arc::new(ManualClock::starting_now());
    let lens = lens(&transport, &clock);
    let request = ReadRequest::call("quorum");

    assert_eq!(lens.reader().peek(&request).status, CacheStatus::Miss);
    assert_eq!(transport.total_calls(), 0);

    lens.read(&request).await.expect("warm");
    clock.advance(Duration::from_secs(61));
    let lookup = lens.reader().peek(&request);
    assert_eq!(lookup.status, CacheStatus::Stale);
    assert_eq!(lookup.value, Some(json!(10)));
    assert_eq!(transport.total_calls(), 1);
    assert_eq!(lens.reader().cache().pending_refreshes(), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_entry_fails_through_when_remote_is_down() {
    let transport = Arc::new(MockTransport::new());
    transport.respond("quorum", json!(10));
    let clock = Arc::new(ManualClock::starting_now());
    let lens = lens(&transport, &clock);
    let request = ReadRequest::call("quorum");

    lens.read(&request).await.expect("first read");
    transport.fail("quorum", ReadError::rejected("execution reverted"));
    clock.advance(Duration::from_secs(301));

    let result = lens.read(&request).await;
    assert_read_error(&result, ReadErrorKind::RemoteRejected);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() {
    let transport = Arc::new(MockTransport::new());
    transport.respond("treasury", json!("1500")).script(
        "treasury",
        vec![
            Err(ReadError::classify("HTTP 429 Too Many Requests")),
            Err(ReadError::classify("connection reset by peer")),
        ],
    );
    let clock = Arc::new(ManualClock::starting_now());
    let lens = lens(&transport, &clock);

    let value = lens.read(&ReadRequest::call("treasury")).await;
    assert_eq!(value, Ok(json!("1500")));
    assert_eq!(transport.call_count("treasury"), 3);
}

#[tokio::test(start_paused = true)]
async fn retries_give_up_after_max_attempts() {
    let transport = Arc::new(MockTransport::new());
    transport.fail("treasury", ReadError::transient("timed out"));
    let clock = Arc::new(ManualClock::starting_now());
    let lens = lens(&transport, &clock);

    let result = lens.read(&ReadRequest::call("treasury")).await;
    assert_read_error(&result, ReadErrorKind::TransientNetwork);
    assert_eq!(transport.call_count("treasury"), 3);
}

#[tokio::test(start_paused = true)]
async fn batch_results_are_isolated_and_ordered() {
    let transport = Arc::new(MockTransport::new());
    transport
        .respond("a", json!(1))
        .fail("b", ReadError::rejected("no such proposal"))
        .respond("c", json!(3));
    let clock = Arc::new(ManualClock::starting_now());
    let lens = lens(&transport, &clock);

    let results = lens
        .read_batch(&[
            ReadRequest::call("a"),
            ReadRequest::call("b"),
            ReadRequest::call("c"),
        ])
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0], Ok(json!(1)));
    assert_read_error(&results[1], ReadErrorKind::RemoteRejected);
    assert_eq!(results[2], Ok(json!(3)));
}

#[tokio::test(start_paused = true)]
async fn every_call_respects_gate_spacing() {
    let transport = Arc::new(MockTransport::new());
    for i in 0..6 {
        transport.respond(&format!("f{i}"), json!(i));
    }
    let clock = Arc::new(ManualClock::starting_now());
    let lens = lens(&transport, &clock);

    let requests: Vec<_> = (0..6).map(|i| ReadRequest::call(format!("f{i}"))).collect();
    let results = lens.read_batch(&requests).await;
    assert!(results.iter().all(Result::is_ok));

    let times = transport.call_times();
    assert_eq!(times.len(), 6);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(1));
    }
}

#[tokio::test(start_paused = true)]
async fn batch_serves_cached_requests_without_calls() {
    let transport = Arc::new(MockTransport::new());
    transport.respond("a", json!(1)).respond("b", json!(2));
    let clock = Arc::new(ManualClock::starting_now());
    let lens = lens(&transport, &clock);

    lens.read(&ReadRequest::call("a")).await.expect("warm");
    let results = lens
        .read_batch(&[ReadRequest::call("a"), ReadRequest::call("b")])
        .await;
    assert_eq!(results, vec![Ok(json!(1)), Ok(json!(2))]);
    assert_eq!(transport.call_count("a"), 1);
    assert_eq!(transport.call_count("b"), 1);
}

#[tokio::test(start_paused = true)]
async fn typed_read_reports_shape_mismatch_as_malformed() {
    let transport = Arc::new(MockTransport::new());
    transport.respond("member_count", json!({"members": "many"}));
    let clock = Arc::new(ManualClock::starting_now());
    let lens = lens(&transport, &clock);

    let result = lens
        .reader()
        .read_as::<u64>(&ReadRequest::call("member_count"))
        .await;
    assert_read_error(&result, ReadErrorKind::Malformed);
}

#[tokio::test(start_paused = true)]
async fn version_bump_forces_refetch() {
    let transport = Arc::new(MockTransport::new());
    transport.respond("quorum", json!(10));
    let clock = Arc::new(ManualClock::starting_now());
    let lens = lens(&transport, &clock);
    let request = ReadRequest::call("quorum");

    lens.read(&request).await.expect("warm");
    assert_eq!(lens.invalidate_all("2"), 1);
    lens.read(&request).await.expect("refetch");
    assert_eq!(transport.call_count("quorum"), 2);
}

#[tokio::test(start_paused = true)]
async fn restart_serves_from_durable_snapshot() {
    let dir = TempDir::new().expect("temp dir");
    let store: Arc<dyn DurableStore> = Arc::new(JsonFileStore::new(dir.path()));
    let config = LensConfig::defaults();
    let clock = Arc::new(ManualClock::starting_now());
    let request = ReadRequest::new("proposal_title", vec![json!(7)]);

    let first = Arc::new(MockTransport::new());
    first.respond("proposal_title", json!("Fund the grants round"));
    let lens = LedgerLens::with_clock(first.clone(), Some(store.clone()), &config, clock.clone())
        .expect("valid config");
    lens.read(&request).await.expect("first read");
    lens.flush().expect("flush");

    let second = Arc::new(MockTransport::new());
    let restarted = LedgerLens::with_clock(second.clone(), Some(store), &config, clock.clone())
        .expect("valid config");
    assert_eq!(
        restarted.read(&request).await,
        Ok(json!("Fund the grants round"))
    );
    assert_eq!(second.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn durable_failures_never_fail_reads() {
    let store = Arc::new(MemoryStore::new());
    store.set_fail_saves(true);
    let durable: Arc<dyn DurableStore> = store.clone();
    let transport = Arc::new(MockTransport::new());
    transport.respond("quorum", json!(10));
    let lens = LedgerLens::with_clock(
        transport.clone(),
        Some(durable),
        &LensConfig::defaults(),
        Arc::new(ManualClock::starting_now()),
    )
    .expect("valid config");

    assert_eq!(lens.read(&ReadRequest::call("quorum")).await, Ok(json!(10)));
    assert!(lens.flush().is_err());
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let mut config = fast_config();
    config.batch.batch_size = 0;
    let result = LedgerLens::new(Arc::new(MockTransport::new()), None, &config);
    assert!(matches!(result, Err(LensError::Config(_))));
}
