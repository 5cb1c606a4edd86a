use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::process::Child;

use pymutor::error::{Error, Result};
use pymutor::stats::{StatsSnapshot, collect_or_refresh};
use pymutor::testrunner::{RunnerEvent, TestRunner};
use tempfile::TempDir;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

struct StubRunner {
    universe: Option<BTreeSet<String>>,
    events: Vec<RunnerEvent>,
    stats_calls: RefCell<Vec<Vec<String>>>,
    fail_stats: bool,
}

impl StubRunner {
    fn new(universe: Option<BTreeSet<String>>, events: Vec<RunnerEvent>) -> StubRunner {
        StubRunner {
            universe,
            events,
            stats_calls: RefCell::new(vec![]),
            fail_stats: false,
        }
    }
}

impl TestRunner for StubRunner {
    fn list_tests(&self) -> Result<BTreeSet<String>> {
        self.universe.clone().ok_or(Error::TestCollectionFailed)
    }

    fn run_stats(&self, tests: &[String]) -> Result<Vec<RunnerEvent>> {
        self.stats_calls.borrow_mut().push(tests.to_vec());
        if self.fail_stats {
            return Err(Error::StatsRunFailed(1));
        }
        Ok(self.events.clone())
    }

    fn failing_tests(&self) -> Result<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }

    fn run_clean(&self, _tests: &[String], _excluded: &[String]) -> Result<i32> {
        Ok(0)
    }

    fn run_forced_fail(&self) -> Result<i32> {
        Ok(1)
    }

    fn spawn_worker(&self, _mutant: &str, _tests: &[String], _limit: u64) -> Result<Child> {
        panic!("stats tests never spawn workers");
    }
}

fn coverage(test: &str, functions: &[&str]) -> RunnerEvent {
    RunnerEvent::Coverage {
        test: test.to_string(),
        functions: functions.iter().map(|s| s.to_string()).collect(),
    }
}

fn duration(test: &str, secs: f64) -> RunnerEvent {
    RunnerEvent::Duration {
        test: test.to_string(),
        duration: secs,
    }
}

// --- snapshot mechanics ---

#[test]
fn merge_events_builds_both_maps() {
    let mut snapshot = StatsSnapshot::default();
    snapshot.merge_events(&[
        coverage("t1", &["app.x_f"]),
        coverage("t2", &["app.x_f", "app.x_g"]),
        duration("t1", 0.5),
        duration("t2", 1.5),
    ]);

    assert_eq!(snapshot.tests_by_function["app.x_f"], set(&["t1", "t2"]));
    assert_eq!(snapshot.tests_by_function["app.x_g"], set(&["t2"]));
    assert_eq!(snapshot.duration_by_test["t2"], 1.5);
}

#[test]
fn estimated_worst_case_sums_covering_test_durations() {
    let mut snapshot = StatsSnapshot::default();
    snapshot.merge_events(&[
        coverage("t1", &["app.x_f"]),
        coverage("t2", &["app.x_f"]),
        duration("t1", 0.5),
        duration("t2", 1.5),
    ]);
    assert_eq!(snapshot.estimated_worst_case("app.x_f"), 2.0);
    assert_eq!(snapshot.estimated_worst_case("app.x_missing"), 0.0);
}

#[test]
fn tests_fastest_first_orders_by_duration() {
    let mut snapshot = StatsSnapshot::default();
    snapshot.merge_events(&[
        coverage("slow", &["app.x_f"]),
        coverage("fast", &["app.x_f"]),
        duration("slow", 9.0),
        duration("fast", 0.1),
    ]);
    assert_eq!(snapshot.tests_fastest_first("app.x_f"), vec!["fast", "slow"]);
}

// --- pruning / coverage monotonicity ---

#[test]
fn prune_removes_obsolete_test_ids() {
    let mut snapshot = StatsSnapshot::default();
    snapshot.merge_events(&[
        coverage("kept", &["app.x_f"]),
        coverage("gone", &["app.x_f", "app.x_g"]),
        duration("kept", 0.1),
        duration("gone", 0.1),
    ]);

    let removed = snapshot.prune_obsolete(&set(&["kept"]));
    assert_eq!(removed, 2);
    assert_eq!(snapshot.tests_by_function["app.x_f"], set(&["kept"]));
    // Functions left with no covering tests disappear entirely.
    assert!(!snapshot.tests_by_function.contains_key("app.x_g"));
    assert!(!snapshot.duration_by_test.contains_key("gone"));
}

#[test]
fn after_prune_no_mapping_references_outside_universe() {
    let mut snapshot = StatsSnapshot::default();
    snapshot.merge_events(&[
        coverage("a", &["f1", "f2"]),
        coverage("b", &["f2"]),
        coverage("c", &["f3"]),
        duration("a", 0.1),
        duration("b", 0.1),
        duration("c", 0.1),
    ]);
    let universe = set(&["a", "c"]);
    snapshot.prune_obsolete(&universe);
    for tests in snapshot.tests_by_function.values() {
        for test in tests {
            assert!(universe.contains(test), "{test} survived pruning");
        }
    }
}

#[test]
fn new_tests_are_the_uncollected_part_of_the_universe() {
    let mut snapshot = StatsSnapshot::default();
    snapshot.merge_events(&[coverage("old", &["f"]), duration("old", 0.1)]);
    let new = snapshot.new_tests(&set(&["old", "fresh"]));
    assert_eq!(new, set(&["fresh"]));
}

// --- collect_or_refresh ---

#[test]
fn full_collection_when_no_snapshot_exists() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mutation-stats.json");
    let runner = StubRunner::new(
        Some(set(&["t1"])),
        vec![coverage("t1", &["app.x_f"]), duration("t1", 0.3)],
    );

    let snapshot = collect_or_refresh(&runner, &path).unwrap();

    assert_eq!(runner.stats_calls.borrow().len(), 1);
    assert!(runner.stats_calls.borrow()[0].is_empty(), "full run selects no subset");
    assert!(snapshot.tests_by_function.contains_key("app.x_f"));
    assert!(path.exists());
}

#[test]
fn zero_associations_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mutation-stats.json");
    // Durations but no coverage: dispatch never engaged.
    let runner = StubRunner::new(Some(set(&["t1"])), vec![duration("t1", 0.3)]);

    let result = collect_or_refresh(&runner, &path);
    assert!(matches!(result, Err(Error::NoCoverageCollected)));
}

#[test]
fn incremental_refresh_prunes_and_collects_only_new_tests() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mutation-stats.json");

    let mut existing = StatsSnapshot::default();
    existing.merge_events(&[
        coverage("t_old", &["app.x_f"]),
        coverage("t_gone", &["app.x_f"]),
        duration("t_old", 0.1),
        duration("t_gone", 0.1),
    ]);
    existing.save(&path).unwrap();

    let runner = StubRunner::new(
        Some(set(&["t_old", "t_new"])),
        vec![coverage("t_new", &["app.x_g"]), duration("t_new", 0.2)],
    );

    let snapshot = collect_or_refresh(&runner, &path).unwrap();

    assert_eq!(runner.stats_calls.borrow().len(), 1);
    assert_eq!(runner.stats_calls.borrow()[0], vec!["t_new".to_string()]);
    assert_eq!(snapshot.tests_by_function["app.x_f"], set(&["t_old"]));
    assert_eq!(snapshot.tests_by_function["app.x_g"], set(&["t_new"]));
}

#[test]
fn refresh_without_new_tests_runs_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mutation-stats.json");

    let mut existing = StatsSnapshot::default();
    existing.merge_events(&[coverage("t1", &["app.x_f"]), duration("t1", 0.1)]);
    existing.save(&path).unwrap();

    let runner = StubRunner::new(Some(set(&["t1"])), vec![]);
    collect_or_refresh(&runner, &path).unwrap();
    assert!(runner.stats_calls.borrow().is_empty());
}

#[test]
fn listing_failure_falls_back_to_full_recollection() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mutation-stats.json");

    let mut existing = StatsSnapshot::default();
    existing.merge_events(&[coverage("t1", &["app.x_f"]), duration("t1", 0.1)]);
    existing.save(&path).unwrap();

    let runner = StubRunner::new(
        None, // listing the universe fails
        vec![coverage("t2", &["app.x_g"]), duration("t2", 0.2)],
    );

    let snapshot = collect_or_refresh(&runner, &path).unwrap();
    assert_eq!(runner.stats_calls.borrow().len(), 1);
    assert!(runner.stats_calls.borrow()[0].is_empty());
    assert!(snapshot.tests_by_function.contains_key("app.x_g"));
}

// --- persistence round trip ---

#[test]
fn snapshot_save_and_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mutation-stats.json");

    let mut snapshot = StatsSnapshot {
        tests_by_function: BTreeMap::new(),
        duration_by_test: BTreeMap::new(),
        collection_seconds: 4.5,
    };
    snapshot.merge_events(&[coverage("t1", &["app.x_f"]), duration("t1", 0.25)]);
    snapshot.save(&path).unwrap();

    let loaded = StatsSnapshot::load(&path).unwrap().unwrap();
    assert_eq!(loaded.tests_by_function, snapshot.tests_by_function);
    assert_eq!(loaded.duration_by_test, snapshot.duration_by_test);
    assert_eq!(loaded.collection_seconds, 4.5);
}

#[test]
fn corrupt_snapshot_reads_as_absent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mutation-stats.json");
    std::fs::write(&path, "{not json").unwrap();
    assert!(StatsSnapshot::load(&path).unwrap().is_none());
}
