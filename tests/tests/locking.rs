//! Named-lock semantics: concurrent holders skip instead of queueing, and
//! the lock is released after both successful and failed bodies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use engine_core::{run_exclusive, Error, LockManager, LockOutcome};

use integration_tests::mocks::MemoryLock;

#[tokio::test]
async fn test_concurrent_runs_execute_the_body_exactly_once() {
    let lock = MemoryLock::new();
    let ran = AtomicUsize::new(0);

    let body = || async {
        ran.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    };

    let (a, b) = tokio::join!(
        run_exclusive(&lock, "rollup.progression.daily", body),
        run_exclusive(&lock, "rollup.progression.daily", body),
    );

    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert!(outcomes.contains(&LockOutcome::Ran));
    assert!(outcomes.contains(&LockOutcome::Skipped));
}

#[tokio::test]
async fn test_lock_is_released_after_a_successful_run() {
    let lock = MemoryLock::new();

    let first = run_exclusive(&lock, "sync.cycle", || async { Ok(()) })
        .await
        .unwrap();
    assert_eq!(first, LockOutcome::Ran);
    assert!(!lock.is_held("sync.cycle"));

    let second = run_exclusive(&lock, "sync.cycle", || async { Ok(()) })
        .await
        .unwrap();
    assert_eq!(second, LockOutcome::Ran);
}

#[tokio::test]
async fn test_lock_is_released_when_the_body_errors() {
    let lock = MemoryLock::new();

    let result = run_exclusive(&lock, "rollup.hourly", || async {
        Err(Error::store("boom"))
    })
    .await;
    assert!(result.is_err());
    assert!(!lock.is_held("rollup.hourly"));

    let retry = run_exclusive(&lock, "rollup.hourly", || async { Ok(()) })
        .await
        .unwrap();
    assert_eq!(retry, LockOutcome::Ran);
}

#[tokio::test]
async fn test_guard_dropped_without_release_frees_the_lock() {
    let lock = MemoryLock::new();

    // A cancelled or panicking job drops its guard without calling release.
    let guard = lock.try_acquire("rollup.progression.daily").await.unwrap();
    assert!(guard.is_some());
    drop(guard);
    assert!(!lock.is_held("rollup.progression.daily"));

    let next = run_exclusive(&lock, "rollup.progression.daily", || async { Ok(()) })
        .await
        .unwrap();
    assert_eq!(next, LockOutcome::Ran);
}

#[tokio::test]
async fn test_different_job_names_do_not_contend() {
    let lock = MemoryLock::new();

    let guard = lock.try_acquire("rollup.retention.daily").await.unwrap();
    assert!(guard.is_some());

    let other = run_exclusive(&lock, "rollup.monetization.daily", || async { Ok(()) })
        .await
        .unwrap();
    assert_eq!(other, LockOutcome::Ran);

    let contended = run_exclusive(&lock, "rollup.retention.daily", || async { Ok(()) })
        .await
        .unwrap();
    assert_eq!(contended, LockOutcome::Skipped);
}
