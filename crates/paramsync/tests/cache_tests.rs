//! The name cache follows the store through puts and deletes.

mod common;

use std::collections::BTreeSet;

use chrono::Duration;
use common::{SqliteHarness, TestHarness};

use paramsync::RemoteStore;

fn authoritative(harness: &TestHarness) -> BTreeSet<String> {
    harness.store.names().into_iter().collect()
}

#[test]
fn test_cache_converges_after_each_change() {
    let harness = TestHarness::new();
    let cache = harness
        .name_cache()
        .with_full_refresh_interval(Duration::hours(1));
    harness.seed(&[("/app/x/a", "1"), ("/app/x/b", "1")]);
    assert_eq!(
        cache.get_names_at(harness.store.now()).unwrap(),
        authoritative(&harness)
    );

    let steps: Vec<Box<dyn Fn(&TestHarness)>> = vec![
        Box::new(|h: &TestHarness| h.seed(&[("/app/x/c", "1")])),
        Box::new(|h: &TestHarness| h.store.delete("/app/x/a").unwrap()),
        Box::new(|h: &TestHarness| h.seed(&[("/app/x/a", "again"), ("/shared/z", "1")])),
        Box::new(|h: &TestHarness| {
            h.store.delete("/app/x/b").unwrap();
            h.store.delete("/app/x/c").unwrap();
        }),
    ];
    for step in steps {
        step(&harness);
        assert_eq!(
            cache.get_names_at(harness.store.now()).unwrap(),
            authoritative(&harness)
        );
    }
    assert_eq!(
        cache.names_under("/app/").unwrap(),
        ["/app/x/a".to_string()].into_iter().collect()
    );
}

#[test]
fn test_full_refresh_after_interval_matches_store() {
    let harness = TestHarness::new();
    let cache = harness
        .name_cache()
        .with_full_refresh_interval(Duration::minutes(5));
    harness.seed(&[("/app/x/a", "1")]);
    cache.get_names_at(harness.store.now()).unwrap();

    harness.seed(&[("/app/x/b", "1")]);
    harness.store.delete("/app/x/a").unwrap();

    let later = harness.store.now() + Duration::minutes(10);
    assert_eq!(cache.get_names_at(later).unwrap(), authoritative(&harness));
}

#[test]
fn test_sqlite_cache_sees_writes_in_the_refresh_millisecond() {
    let harness = SqliteHarness::new();
    let cache = harness.name_cache();
    cache.get_names().unwrap();

    for i in 0..50 {
        let name = format!("/app/x/p{}", i);
        cache.get_names().unwrap();
        harness.seed(&[(name.as_str(), "1")]);
        assert!(
            cache.get_names().unwrap().contains(&name),
            "{} missing after incremental refresh",
            name
        );
    }

    harness.store.delete("/app/x/p0").unwrap();
    assert_eq!(cache.get_names().unwrap(), harness.names());
}
