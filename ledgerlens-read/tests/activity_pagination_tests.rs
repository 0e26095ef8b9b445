//! Activity pagination against a fake activity endpoint.

use std::sync::Arc;
use std::time::Duration;

use ledgerlens_core::{
    ActivityKind, ActivityRecord, Clock, LensConfig, ManualClock, PageSource, ReadError,
    RecordOrigin, Subject,
};
use ledgerlens_read::{ChainReader, LedgerLens, LogPaginator, ViewCatalog};
use ledgerlens_storage::TieredCache;
use ledgerlens_test_utils::assertions::assert_page_ids;
use ledgerlens_test_utils::fixtures::{dao_record, dao_records, ActivityFixture};
use ledgerlens_test_utils::generators::arb_id_set;
use ledgerlens_test_utils::{init_tracing, MockTransport};
use proptest::prelude::*;
use serde_json::Value;

const DAO: &str = "0xa";

struct Harness {
    transport: Arc<MockTransport>,
    clock: Arc<ManualClock>,
    config: LensConfig,
    lens: LedgerLens,
}

impl Harness {
    fn new() -> Self {
        init_tracing();
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::starting_now());
        let config = LensConfig::defaults();
        let lens = LedgerLens::with_clock(transport.clone(), None, &config, clock.clone())
            .expect("default config is valid");
        Self {
            transport,
            clock,
            config,
            lens,
        }
    }

    fn serve(&self, records: Vec<ActivityRecord>) {
        ActivityFixture::new(records).install(&self.transport, &self.config.activity);
    }
}

#[tokio::test(start_paused = true)]
async fn indexed_pages_walk_newest_first() {
    let h = Harness::new();
    h.serve(dao_records(5, DAO));
    let subject = Subject::dao(DAO);

    let first = h.lens.get_activity_page(&subject, 1, 2).await;
    assert_page_ids(&first, &[5, 4]);
    assert_eq!(first.source, PageSource::Indexed);
    assert_eq!(first.total_items, 5);
    assert!(first.has_next);
    assert!(!first.has_prev);

    let second = h.lens.get_activity_page(&subject, 2, 2).await;
    assert_page_ids(&second, &[3, 2]);
    assert!(second.has_next);
    assert!(second.has_prev);

    let third = h.lens.get_activity_page(&subject, 3, 2).await;
    assert_page_ids(&third, &[1]);
    assert!(!third.has_next);
}

#[tokio::test(start_paused = true)]
async fn page_past_the_end_is_empty_without_next() {
    let h = Harness::new();
    h.serve(dao_records(3, DAO));

    let page = h.lens.get_activity_page(&Subject::dao(DAO), 5, 2).await;
    assert!(page.is_empty());
    assert!(!page.has_next);
    assert!(page.has_prev);
    assert_eq!(page.page_index, 5);
}

#[tokio::test(start_paused = true)]
async fn page_zero_and_oversized_pages_are_normalised() {
    let h = Harness::new();
    h.serve(dao_records(3, DAO));

    let page = h.lens.get_activity_page(&Subject::dao(DAO), 0, 10_000).await;
    assert_eq!(page.page_index, 1);
    assert_eq!(page.page_size, h.config.activity.max_page_size);
    assert_page_ids(&page, &[3, 2, 1]);
}

#[tokio::test(start_paused = true)]
async fn records_are_fetched_once_across_pages() {
    let h = Harness::new();
    h.serve(dao_records(4, DAO));
    let subject = Subject::dao(DAO);

    h.lens.get_activity_page(&subject, 1, 2).await;
    h.lens.get_activity_page(&subject, 1, 2).await;
    h.lens.get_activity_page(&subject, 2, 2).await;

    let activity = &h.config.activity;
    assert_eq!(h.transport.call_count(&activity.count_view), 1);
    assert_eq!(h.transport.call_count(&activity.ids_view), 1);
    assert_eq!(h.transport.call_count(&activity.record_view), 4);
}

#[tokio::test(start_paused = true)]
async fn unresolved_records_are_skipped() {
    let h = Harness::new();
    h.serve(dao_records(5, DAO));
    let records = dao_records(5, DAO);
    h.transport.on(&h.config.activity.record_view, move |request| {
        let id = request.args().first().and_then(Value::as_u64);
        if id == Some(4) {
            return Err(ReadError::rejected("execution reverted"));
        }
        records
            .iter()
            .find(|r| Some(r.id) == id)
            .map(ledgerlens_test_utils::fixtures::record_json)
            .ok_or_else(|| ReadError::rejected("activity not found"))
    });

    let page = h.lens.get_activity_page(&Subject::dao(DAO), 1, 2).await;
    assert_page_ids(&page, &[5]);
    assert_eq!(page.source, PageSource::Indexed);
    assert!(page.has_next);
}

#[tokio::test(start_paused = true)]
async fn count_failure_falls_back_to_event_scan() {
    let h = Harness::new();
    let mut records = dao_records(4, DAO);
    records.push(dao_record(9, "0xother", 1_800_000_000));
    h.serve(records);
    h.transport.fail(
        &h.config.activity.count_view,
        ReadError::rejected("function not found"),
    );

    let page = h.lens.get_activity_page(&Subject::dao(DAO), 1, 2).await;
    assert_eq!(page.source, PageSource::EventScan);
    assert_page_ids(&page, &[4, 3]);
    assert!(page.has_next);

    let second = h.lens.get_activity_page(&Subject::dao(DAO), 2, 2).await;
    assert_page_ids(&second, &[2, 1]);
}

#[tokio::test(start_paused = true)]
async fn scan_keeps_event_order_for_equal_timestamps() {
    let h = Harness::new();
    let records: Vec<_> = [7, 3, 5]
        .into_iter()
        .map(|id| dao_record(id, DAO, 1_700_000_000))
        .collect();
    h.serve(records);
    h.transport
        .fail(&h.config.activity.count_view, ReadError::rejected("gone"));

    let page = h.lens.get_activity_page(&Subject::dao(DAO), 1, 10).await;
    assert_page_ids(&page, &[7, 3, 5]);
}

#[tokio::test(start_paused = true)]
async fn total_failure_yields_an_empty_page() {
    let h = Harness::new();
    let activity = h.config.activity.clone();
    h.transport
        .fail(&activity.count_view, ReadError::rejected("reverted"))
        .fail(&activity.events_view, ReadError::cross_origin("blocked by CORS policy"));

    let page = h.lens.get_activity_page(&Subject::dao(DAO), 2, 10).await;
    assert!(page.is_empty());
    assert_eq!(page.source, PageSource::Empty);
    assert_eq!(page.page_index, 2);
    assert_eq!(page.total_items, 0);
    assert!(!page.has_next);
    assert!(page.has_prev);
}

#[tokio::test(start_paused = true)]
async fn zero_count_with_no_events_is_empty() {
    let h = Harness::new();
    h.serve(Vec::new());

    let page = h.lens.get_activity_page(&Subject::user("0xnobody"), 1, 10).await;
    assert!(page.is_empty());
    assert_eq!(page.source, PageSource::Empty);
}

#[tokio::test(start_paused = true)]
async fn provisional_record_shows_until_confirmed() {
    let h = Harness::new();
    h.serve(dao_records(5, DAO));
    let subject = Subject::dao(DAO);

    let mut pending = dao_record(0, DAO, 1_900_000_000);
    pending.transaction_hash = format!("0x{:064X}", 6);
    h.lens.inject(pending);

    let first = h.lens.get_activity_page(&subject, 1, 2).await;
    assert_eq!(first.items.len(), 3);
    assert!(first.items[0].is_provisional());
    assert_eq!(first.total_items, 6);

    let second = h.lens.get_activity_page(&subject, 2, 2).await;
    assert_page_ids(&second, &[3, 2]);

    // The remote catches up; counts and ids age out of the cache.
    h.serve(dao_records(6, DAO));
    h.clock.advance(Duration::from_secs(200));

    let confirmed = h.lens.get_activity_page(&subject, 1, 2).await;
    assert_page_ids(&confirmed, &[6, 5]);
    assert!(confirmed.items.iter().all(|r| r.origin == RecordOrigin::Confirmed));
    assert_eq!(confirmed.total_items, 6);
    assert!(h.lens.paginator().provisional().is_empty());
}

#[tokio::test(start_paused = true)]
async fn confirmed_record_past_page_one_drops_its_provisional_copy() {
    let h = Harness::new();
    h.serve(dao_records(5, DAO));
    let subject = Subject::dao(DAO);

    h.lens.inject(dao_record(6, DAO, 1_900_000_000));
    let first = h.lens.get_activity_page(&subject, 1, 2).await;
    assert_page_ids(&first, &[6, 5, 4]);
    assert!(first.items[0].is_provisional());

    // Record 6 is confirmed, and two newer records push it to page 2.
    h.serve(dao_records(8, DAO));
    h.clock.advance(Duration::from_secs(200));

    let first = h.lens.get_activity_page(&subject, 1, 2).await;
    assert_page_ids(&first, &[8, 7]);
    assert!(first.items.iter().all(|r| !r.is_provisional()));
    assert_eq!(first.total_items, 8);

    let second = h.lens.get_activity_page(&subject, 2, 2).await;
    assert_page_ids(&second, &[6, 5]);
    assert!(h.lens.paginator().provisional().is_empty());
}

#[tokio::test(start_paused = true)]
async fn zero_page_limit_still_serves_one_item() {
    let transport = Arc::new(MockTransport::new());
    let mut config = LensConfig::defaults();
    config.activity.max_page_size = 0;
    ActivityFixture::new(dao_records(3, DAO)).install(&transport, &config.activity);

    let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
    let cache = TieredCache::in_memory(&config.cache, Arc::clone(&clock));
    let reader = ChainReader::new(transport, cache, &config);
    let catalog = Arc::new(ViewCatalog::from_config(&config.activity));
    let paginator = LogPaginator::new(reader, catalog, &config.activity, clock);

    let page = paginator.get_activity_page(&Subject::dao(DAO), 1, 5).await;
    assert_eq!(page.page_size, 1);
    assert_page_ids(&page, &[3]);
}

#[tokio::test(start_paused = true)]
async fn provisional_record_is_scoped_to_its_subject() {
    let h = Harness::new();
    h.serve(dao_records(2, DAO));

    let mut vote = dao_record(0, DAO, 1_900_000_000);
    vote.kind = ActivityKind::VoteCast;
    vote.subject_address = "0xvoter".into();
    h.lens.inject(vote);

    let voter = h.lens.get_activity_page(&Subject::user("0xVOTER"), 1, 10).await;
    assert_eq!(voter.items.len(), 1);
    assert_eq!(voter.items[0].kind, ActivityKind::VoteCast);

    let other = h.lens.get_activity_page(&Subject::dao("0xelsewhere"), 1, 10).await;
    assert!(other.items.iter().all(|r| !r.is_provisional()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_pages_partition_ids_descending(ids in arb_id_set(12), page_size in 1u64..5) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .expect("runtime");

        let (collected, flags) = runtime.block_on(async {
            let h = Harness::new();
            let records: Vec<_> = ids
                .iter()
                .map(|&id| dao_record(id, DAO, 1_700_000_000))
                .collect();
            h.serve(records);

            let subject = Subject::dao(DAO);
            let mut collected = Vec::new();
            let mut flags = Vec::new();
            let pages = (ids.len() as u64).div_ceil(page_size).max(1);
            for index in 1..=pages {
                let page = h.lens.get_activity_page(&subject, index, page_size).await;
                collected.extend(page.ids());
                flags.push(page.has_next);
            }
            (collected, flags)
        });

        let mut expected = ids.clone();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        prop_assert_eq!(collected, expected);
        prop_assert_eq!(flags.last().copied(), Some(false));
        prop_assert!(flags.iter().rev().skip(1).all(|&next| next));
    }
}
