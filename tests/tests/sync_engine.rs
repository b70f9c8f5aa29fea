//! Sync pipeline: watermark advancement, at-least-once delivery, and
//! skip-on-unreachable behavior against an in-memory warehouse.

use std::sync::Arc;

use uuid::Uuid;

use engine_core::SourceTable;
use worker::{SyncConfig, SyncEngine};

use integration_tests::fixtures::{at, date, install, level_event, purchase, session};
use integration_tests::mocks::{MemoryFacts, MemoryRollups, MockWarehouse};

struct Harness {
    facts: Arc<MemoryFacts>,
    watermarks: Arc<MemoryRollups>,
    warehouse: Arc<MockWarehouse>,
    engine: SyncEngine,
}

fn harness(config: SyncConfig) -> Harness {
    let facts = Arc::new(MemoryFacts::new());
    let watermarks = Arc::new(MemoryRollups::new());
    let warehouse = Arc::new(MockWarehouse::new());
    let engine = SyncEngine::new(
        facts.clone(),
        watermarks.clone(),
        warehouse.clone(),
        config,
    );
    Harness {
        facts,
        watermarks,
        warehouse,
        engine,
    }
}

#[tokio::test]
async fn test_watermark_advances_to_last_delivered_row() {
    let h = harness(SyncConfig {
        batch_size: 2,
        ..Default::default()
    });
    let game = Uuid::new_v4();
    let user = Uuid::new_v4();
    let day = date(2024, 3, 1);

    let events: Vec<_> = (0..5)
        .map(|i| level_event(game, user, "level_start", 1, at(day, 9, i, 0)))
        .collect();
    let last = events.last().unwrap().clone();
    h.facts.add_events(events);

    let summary = h.engine.run_cycle().await.unwrap();
    assert!(!summary.skipped);
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.rows, 5);

    let wm = h.watermarks.watermark("sync.events").unwrap();
    assert_eq!(wm.last_timestamp, last.occurred_at);
    assert_eq!(wm.last_id, last.id);
    assert_eq!(h.warehouse.delivered_ids(SourceTable::Events).len(), 5);
}

#[tokio::test]
async fn test_repeated_cycles_never_redeliver_rows() {
    let h = harness(SyncConfig::default());
    let game = Uuid::new_v4();
    let user = Uuid::new_v4();
    let day = date(2024, 3, 1);

    h.facts.add_events(
        (0..3).map(|i| level_event(game, user, "level_start", 1, at(day, 10, i, 0))),
    );

    h.engine.run_cycle().await.unwrap();
    let second = h.engine.run_cycle().await.unwrap();
    assert_eq!(second.rows, 0);

    let delivered = h.warehouse.delivered_ids(SourceTable::Events);
    assert_eq!(delivered.len(), 3);
    let mut deduped = delivered.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), 3, "a row was delivered twice");
}

#[tokio::test]
async fn test_unreachable_destination_skips_without_advancing() {
    let h = harness(SyncConfig::default());
    let game = Uuid::new_v4();
    let user = Uuid::new_v4();
    let day = date(2024, 3, 1);
    h.facts
        .add_events([level_event(game, user, "level_start", 1, at(day, 9, 0, 0))]);

    h.warehouse.set_live(false);
    let summary = h.engine.run_cycle().await.unwrap();
    assert!(summary.skipped);
    assert_eq!(h.warehouse.total_rows(), 0);
    assert!(h.watermarks.watermark("sync.events").is_none());

    // Once the destination recovers the next cycle picks up from scratch.
    h.warehouse.set_live(true);
    let summary = h.engine.run_cycle().await.unwrap();
    assert_eq!(summary.rows, 1);
    assert!(h.watermarks.watermark("sync.events").is_some());
}

#[tokio::test]
async fn test_disabled_pipeline_is_a_noop() {
    let h = harness(SyncConfig {
        enabled: false,
        ..Default::default()
    });
    let game = Uuid::new_v4();
    h.facts.add_events([level_event(
        game,
        Uuid::new_v4(),
        "level_start",
        1,
        at(date(2024, 3, 1), 9, 0, 0),
    )]);

    let summary = h.engine.run_cycle().await.unwrap();
    assert!(summary.skipped);
    assert_eq!(h.warehouse.total_rows(), 0);
}

#[tokio::test]
async fn test_delivery_failure_aborts_cycle_then_retries_cleanly() {
    let h = harness(SyncConfig::default());
    let game = Uuid::new_v4();
    let user = Uuid::new_v4();
    let day = date(2024, 3, 1);
    h.facts
        .add_events([level_event(game, user, "level_start", 1, at(day, 9, 0, 0))]);

    h.warehouse.set_should_fail(true);
    assert!(h.engine.run_cycle().await.is_err());
    assert!(h.watermarks.watermark("sync.events").is_none());

    h.warehouse.set_should_fail(false);
    let summary = h.engine.run_cycle().await.unwrap();
    assert_eq!(summary.rows, 1);
    assert_eq!(h.warehouse.delivered_ids(SourceTable::Events).len(), 1);
}

#[tokio::test]
async fn test_cycle_covers_all_source_tables() {
    let h = harness(SyncConfig::default());
    let game = Uuid::new_v4();
    let user = Uuid::new_v4();
    let day = date(2024, 3, 1);

    h.facts
        .add_events([level_event(game, user, "level_start", 1, at(day, 9, 0, 0))]);
    h.facts.add_sessions([session(game, user, at(day, 9, 0, 0), 60_000)]);
    h.facts.add_revenue([purchase(game, user, at(day, 9, 5, 0), 299)]);
    h.facts.add_installs([install(game, user, at(day, 8, 0, 0))]);

    let summary = h.engine.run_cycle().await.unwrap();
    assert_eq!(summary.batches, 4);
    assert_eq!(summary.rows, 4);

    for table in SourceTable::ALL {
        assert!(
            h.watermarks.watermark(table.pipeline()).is_some(),
            "missing watermark for {}",
            table.pipeline()
        );
        assert_eq!(h.warehouse.delivered_ids(*table).len(), 1);
    }
}

#[tokio::test]
async fn test_max_batches_bounds_one_cycle() {
    let h = harness(SyncConfig {
        batch_size: 1,
        max_batches: 1,
        ..Default::default()
    });
    let game = Uuid::new_v4();
    let user = Uuid::new_v4();
    let day = date(2024, 3, 1);
    h.facts.add_events(
        (0..3).map(|i| level_event(game, user, "level_start", 1, at(day, 9, i, 0))),
    );

    let first = h.engine.run_cycle().await.unwrap();
    assert_eq!(first.rows, 1);

    // Backlog drains one batch per cycle.
    let second = h.engine.run_cycle().await.unwrap();
    assert_eq!(second.rows, 1);
    assert_eq!(h.warehouse.delivered_ids(SourceTable::Events).len(), 2);
}
