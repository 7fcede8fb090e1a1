//! Behavior-driven tests for the periodic trigger
//!
//! These tests verify HOW firings interact: overlap handling per policy,
//! failure reporting, and that the schedule keeps firing after a failed run.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use goldtick_core::{
    Clock, FetcherConfig, GoldenMaterializer, IntradayRequest, IntradaySeries, ManualClock,
    MarketDataFetcher, OverlapPolicy, Pipeline, PriceProvider, RawStoreWriter, ResolvedUniverse,
    RunGuard, RunOutcome, Scheduler, SourceError, StaticCatalog, SystemClock, Trigger,
    UniverseResolver, UtcDateTime, Warehouse, DEFAULT_GOLDEN_WINDOW,
};
use tokio::sync::{mpsc, oneshot};

// =============================================================================
// Fixtures
// =============================================================================

/// Provider that holds every request for a while and returns no rows.
struct SlowProvider {
    delay: Duration,
}

impl PriceProvider for SlowProvider {
    fn id(&self) -> &'static str {
        "slow"
    }

    fn prepare<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<(), SourceError>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }

    fn intraday<'a>(
        &'a self,
        _req: IntradayRequest,
    ) -> Pin<Box<dyn Future<Output = Result<IntradaySeries, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(IntradaySeries::default())
        })
    }
}

/// Catalog that fails on its first `failures` calls.
struct FlakyCatalog {
    failures: u32,
    calls: AtomicU32,
}

impl UniverseResolver for FlakyCatalog {
    fn resolve<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<ResolvedUniverse, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(SourceError::unavailable("catalog returned status 503"));
            }
            StaticCatalog::new(["AAPL"]).resolve().await
        })
    }
}

fn pipeline(name: &str, resolver: Arc<dyn UniverseResolver>, delay: Duration) -> Pipeline {
    pipeline_on_clock(name, resolver, delay, Arc::new(SystemClock))
}

fn pipeline_on_clock(
    name: &str,
    resolver: Arc<dyn UniverseResolver>,
    delay: Duration,
    clock: Arc<dyn Clock>,
) -> Pipeline {
    let warehouse = Warehouse::open_in_memory().expect("warehouse");
    Pipeline::new(
        name,
        resolver,
        MarketDataFetcher::new(
            Arc::new(SlowProvider { delay }),
            clock.clone(),
            FetcherConfig::default(),
        ),
        RawStoreWriter::new(warehouse.clone()),
        GoldenMaterializer::new(warehouse, DEFAULT_GOLDEN_WINDOW),
        clock,
    )
}

fn slow_scheduler(overlap: OverlapPolicy) -> Scheduler {
    Scheduler::new(
        pipeline(
            "stocks_etl",
            Arc::new(StaticCatalog::new(["AAPL"])),
            Duration::from_millis(200),
        ),
        Trigger::default(),
        overlap,
    )
}

fn is_completed(outcome: &RunOutcome) -> bool {
    matches!(outcome, RunOutcome::Completed(_))
}

fn is_skipped(outcome: &RunOutcome) -> bool {
    matches!(outcome, RunOutcome::Skipped { .. })
}

// =============================================================================
// Scheduler: Overlap policy
// =============================================================================

#[tokio::test]
async fn with_skip_an_overlapping_firing_is_dropped() {
    // Given: A scheduler whose runs take a while, with the default policy
    let scheduler = slow_scheduler(OverlapPolicy::default());

    // When: Two firings land while the first run is in flight
    let (first, second) = tokio::join!(scheduler.fire(), scheduler.fire());

    // Then: The first run completes and the second firing is skipped
    assert!(is_completed(&first), "first: {first:?}");
    assert!(is_skipped(&second), "second: {second:?}");

    // And: The next firing after the run finished proceeds normally
    assert!(is_completed(&scheduler.fire().await));
}

#[tokio::test]
async fn a_skipped_firing_is_stamped_by_the_pipeline_clock() {
    // Given: A skipping scheduler whose pipeline runs on a fixed manual clock
    let fixed = UtcDateTime::parse("2024-05-01T16:00:00Z").expect("timestamp");
    let scheduler = Scheduler::new(
        pipeline_on_clock(
            "stocks_etl",
            Arc::new(StaticCatalog::new(["AAPL"])),
            Duration::from_millis(200),
            Arc::new(ManualClock::new(fixed)),
        ),
        Trigger::default(),
        OverlapPolicy::Skip,
    );

    // When: A second firing lands while the first run is in flight
    let (first, second) = tokio::join!(scheduler.fire(), scheduler.fire());

    // Then: The skipped outcome carries the manual clock's instant
    assert!(is_completed(&first), "first: {first:?}");
    match second {
        RunOutcome::Skipped { fired_at, pipeline } => {
            assert_eq!(fired_at, fixed);
            assert_eq!(pipeline, "stocks_etl");
        }
        other => panic!("unexpected second outcome: {other:?}"),
    }
}

#[tokio::test]
async fn with_serialize_overlapping_firings_run_one_after_another() {
    // Given: A scheduler configured to serialize runs
    let scheduler = slow_scheduler(OverlapPolicy::Serialize);

    // When: Two firings land at once
    let started = tokio::time::Instant::now();
    let (first, second) = tokio::join!(scheduler.fire(), scheduler.fire());

    // Then: Both complete, one after the other
    assert!(is_completed(&first));
    assert!(is_completed(&second));
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn with_allow_overlapping_firings_run_concurrently() {
    // Given: A scheduler that allows overlap
    let scheduler = slow_scheduler(OverlapPolicy::Allow);

    // When: Two firings land at once
    let started = tokio::time::Instant::now();
    let (first, second) = tokio::join!(scheduler.fire(), scheduler.fire());

    // Then: Neither is skipped and the runs overlapped in time
    assert!(!is_skipped(&first) && !is_skipped(&second));
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[tokio::test]
async fn the_guard_is_keyed_on_the_pipeline_name() {
    // Given: Two schedulers sharing one guard but driving differently named pipelines
    let guard = RunGuard::new();
    let etl = slow_scheduler(OverlapPolicy::Skip).with_guard(guard.clone());
    let other = Scheduler::new(
        pipeline(
            "other_etl",
            Arc::new(StaticCatalog::new(["MSFT"])),
            Duration::from_millis(200),
        ),
        Trigger::default(),
        OverlapPolicy::Skip,
    )
    .with_guard(guard);

    // When: Both fire at once
    let (a, b) = tokio::join!(etl.fire(), other.fire());

    // Then: Neither blocks the other
    assert!(is_completed(&a));
    assert!(is_completed(&b));
}

// =============================================================================
// Scheduler: Periodic firing
// =============================================================================

#[tokio::test]
async fn a_failed_run_is_reported_and_the_next_firing_proceeds() {
    // Given: A catalog that fails on the first run only, fired every 50ms
    let resolver = Arc::new(FlakyCatalog {
        failures: 1,
        calls: AtomicU32::new(0),
    });
    let scheduler = Scheduler::new(
        pipeline("stocks_etl", resolver, Duration::ZERO),
        Trigger::every(Duration::from_millis(50)),
        OverlapPolicy::Skip,
    );
    let (outcomes_tx, mut outcomes_rx) = mpsc::channel(8);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    // When: The scheduler runs until two outcomes are reported
    let running = tokio::spawn(async move {
        scheduler
            .run_until(
                async {
                    let _ = stop_rx.await;
                },
                outcomes_tx,
            )
            .await;
    });
    let first = outcomes_rx.recv().await.expect("first outcome");
    let second = outcomes_rx.recv().await.expect("second outcome");
    stop_tx.send(()).expect("scheduler listening");
    running.await.expect("scheduler task");

    // Then: The first run failed with a classified error and the next one completed
    match first {
        RunOutcome::Failed { code, pipeline, .. } => {
            assert_eq!(code, "pipeline.source_unavailable");
            assert_eq!(pipeline, "stocks_etl");
        }
        other => panic!("unexpected first outcome: {other:?}"),
    }
    assert!(is_completed(&second), "second: {second:?}");
}

#[test]
fn trigger_expressions_map_to_periods() {
    let every_minute: Trigger = "*/1 * * * *".parse().expect("cron shorthand");
    assert_eq!(every_minute, Trigger::default());

    let every_ten: Trigger = "every 10 seconds".parse().expect("interval");
    assert_eq!(every_ten.period(), Duration::from_secs(10));

    let error = "0 9 * * 1-5".parse::<Trigger>().expect_err("calendar cron");
    assert!(error.to_string().contains("0 9 * * 1-5"));
}
