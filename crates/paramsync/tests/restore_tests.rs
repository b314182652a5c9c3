//! Point-in-time restores over a recorded history.

mod common;

use std::collections::BTreeMap;

use common::{Agreeable, SqliteHarness, TestHarness};

use paramsync::{PutParameter, RemoteStore};

/// Same mutations on every call, so two harnesses share timestamps.
/// Returns the two restore points.
fn record_history(
    harness: &TestHarness,
) -> (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>) {
    harness.seed(&[("/app/x/a", "1"), ("/app/x/b", "1"), ("/app/x/c", "1")]);
    let t1 = harness.store.now();

    harness.seed(&[("/app/x/a", "2"), ("/app/x/d", "1")]);
    harness.store.delete("/app/x/b").unwrap();
    let t2 = harness.store.now();

    harness.seed(&[("/app/x/a", "3"), ("/app/x/b", "3"), ("/app/x/e", "1")]);
    harness.store.delete("/app/x/c").unwrap();
    (t1, t2)
}

fn expected_at_t2() -> BTreeMap<String, String> {
    [("/app/x/a", "2"), ("/app/x/c", "1"), ("/app/x/d", "1"), ("/app/x/e", "1")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_restore_in_two_steps_matches_direct_restore() {
    let stepwise = TestHarness::new();
    let (t1, t2) = record_history(&stepwise);
    let restorer = stepwise.restorer(&["/app/x/"]);
    restorer.restore("/app/x/", t1, &mut Agreeable::default()).unwrap();
    restorer.restore("/app/x/", t2, &mut Agreeable::default()).unwrap();

    let direct = TestHarness::new();
    let (_, direct_t2) = record_history(&direct);
    assert_eq!(direct_t2, t2);
    let report = direct
        .restorer(&["/app/x/"])
        .restore("/app/x/", t2, &mut Agreeable::default())
        .unwrap();

    assert_eq!(report.restored, vec!["/app/x/a", "/app/x/c"]);
    assert_eq!(report.deleted, vec!["/app/x/b"]);
    assert_eq!(stepwise.state(), direct.state());
    assert_eq!(direct.state(), expected_at_t2());
}

#[test]
fn test_put_delete_put_restores_latest_put() {
    let harness = TestHarness::new();
    harness.seed(&[("/app/x/flag", "first")]);
    harness.store.delete("/app/x/flag").unwrap();
    harness.seed(&[("/app/x/flag", "second")]);
    let t = harness.store.now();
    harness.seed(&[("/app/x/flag", "third")]);

    let report = harness
        .restorer(&["/app/x/"])
        .restore("/app/x/", t, &mut Agreeable::default())
        .unwrap();
    assert_eq!(report.restored, vec!["/app/x/flag"]);
    assert_eq!(harness.value("/app/x/flag").as_deref(), Some("second"));
}

#[test]
fn test_declined_start_changes_nothing() {
    let harness = TestHarness::new();
    harness.seed(&[("/app/x/a", "1")]);
    let t = harness.store.now();
    harness
        .store
        .put(&PutParameter::plain("/app/x/a", "2"))
        .unwrap();
    let before = harness.store.mutation_count();

    let report = harness
        .restorer(&["/app/x/"])
        .restore("/app/x/", t, &mut paramsync::ScriptedDecision::declining())
        .unwrap();
    assert!(report.cancelled);
    assert_eq!(harness.store.mutation_count(), before);
}

/// Lets the wall clock move past the last write.
fn tick() {
    std::thread::sleep(std::time::Duration::from_millis(5));
}

#[test]
fn test_sqlite_restore_is_stable_after_replay() {
    let harness = SqliteHarness::new();
    harness.seed(&[("/app/x/a", "one")]);
    tick();
    let t1 = chrono::Utc::now();
    tick();
    harness.seed(&[("/app/x/a", "two")]);
    harness.seed(&[("/app/x/a", "three")]);

    let restorer = harness.restorer(&["/app/x/"]);
    let first = restorer
        .restore("/app/x/", t1, &mut Agreeable::default())
        .unwrap();
    assert_eq!(first.restored, vec!["/app/x/a"]);
    assert_eq!(harness.value("/app/x/a").as_deref(), Some("one"));

    // The delete and replay above share a millisecond; the replayed put is
    // still the latest entry.
    tick();
    let again = restorer
        .restore("/app/x/", chrono::Utc::now(), &mut Agreeable::default())
        .unwrap();
    assert!(again.restored.is_empty(), "{:?}", again);
    assert!(again.deleted.is_empty(), "{:?}", again);
    assert_eq!(again.unchanged, vec!["/app/x/a"]);
    assert_eq!(harness.value("/app/x/a").as_deref(), Some("one"));
}

#[test]
fn test_sqlite_restore_redoes_deletion_and_value() {
    let harness = SqliteHarness::new();
    harness.seed(&[("/app/x/a", "1"), ("/app/x/b", "1")]);
    harness.store.delete("/app/x/b").unwrap();
    tick();
    let t = chrono::Utc::now();
    tick();
    harness.seed(&[("/app/x/a", "2"), ("/app/x/b", "2")]);

    let report = harness
        .restorer(&["/app/x/"])
        .restore("/app/x/", t, &mut Agreeable::default())
        .unwrap();
    assert_eq!(report.restored, vec!["/app/x/a"]);
    assert_eq!(report.deleted, vec!["/app/x/b"]);
    assert_eq!(harness.value("/app/x/a").as_deref(), Some("1"));
    assert_eq!(
        harness.names().into_iter().collect::<Vec<_>>(),
        vec!["/app/x/a"]
    );
}
