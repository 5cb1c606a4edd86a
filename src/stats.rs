use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::testrunner::{RunnerEvent, TestRunner};

/// Coverage and timing learned from an instrumented run of the full test
/// suite: which tests reach which mutated functions, and how long each
/// test takes. Single persisted file, coordinator-owned.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Module-qualified mangled function name → test ids that reached it.
    pub tests_by_function: BTreeMap<String, BTreeSet<String>>,
    /// Test id → wall-clock duration in seconds, from the most recent
    /// collection that ran it.
    pub duration_by_test: BTreeMap<String, f64>,
    /// Wall-clock seconds of the last full collection pass.
    pub collection_seconds: f64,
}

impl StatsSnapshot {
    pub fn load(path: &Path) -> Result<Option<StatsSnapshot>> {
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(snapshot) => Ok(Some(snapshot)),
                // A corrupt snapshot is rebuilt, not fatal.
                Err(_) => Ok(None),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn collected_test_names(&self) -> BTreeSet<String> {
        self.duration_by_test.keys().cloned().collect()
    }

    /// Drop associations referencing test ids outside the given universe.
    /// Returns how many associations were removed.
    pub fn prune_obsolete(&mut self, universe: &BTreeSet<String>) -> usize {
        let before: usize = self.tests_by_function.values().map(BTreeSet::len).sum();
        for tests in self.tests_by_function.values_mut() {
            tests.retain(|t| universe.contains(t));
        }
        self.tests_by_function.retain(|_, tests| !tests.is_empty());
        self.duration_by_test.retain(|t, _| universe.contains(t));
        let after: usize = self.tests_by_function.values().map(BTreeSet::len).sum();
        before - after
    }

    /// Test ids present in the universe but never collected.
    pub fn new_tests(&self, universe: &BTreeSet<String>) -> BTreeSet<String> {
        let collected = self.collected_test_names();
        universe.difference(&collected).cloned().collect()
    }

    pub fn merge_events(&mut self, events: &[RunnerEvent]) {
        for event in events {
            match event {
                RunnerEvent::Coverage { test, functions } => {
                    for function in functions {
                        self.tests_by_function
                            .entry(function.clone())
                            .or_default()
                            .insert(test.clone());
                    }
                }
                RunnerEvent::Duration { test, duration } => {
                    self.duration_by_test.insert(test.clone(), *duration);
                }
                RunnerEvent::Collected { .. } | RunnerEvent::Failed { .. } => {}
            }
        }
    }

    pub fn tests_for_function(&self, function_key: &str) -> Vec<String> {
        self.tests_by_function
            .get(function_key)
            .map(|tests| tests.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Estimated worst-case run time for one mutant: the summed durations
    /// of every test known to cover its function.
    pub fn estimated_worst_case(&self, function_key: &str) -> f64 {
        self.tests_for_function(function_key)
            .iter()
            .map(|t| self.duration_by_test.get(t).copied().unwrap_or(0.0))
            .sum()
    }

    /// Covering tests ordered fastest first, so workers fail as early as
    /// possible.
    pub fn tests_fastest_first(&self, function_key: &str) -> Vec<String> {
        let mut tests = self.tests_for_function(function_key);
        tests.sort_by(|a, b| {
            let da = self.duration_by_test.get(a).copied().unwrap_or(0.0);
            let db = self.duration_by_test.get(b).copied().unwrap_or(0.0);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        tests
    }
}

/// Load the persisted snapshot and refresh it incrementally, or run a
/// full instrumented collection when there is nothing to start from. A
/// failure to enumerate the current test universe falls back to a full
/// recollection rather than aborting the run.
pub fn collect_or_refresh<R: TestRunner>(runner: &R, snapshot_path: &Path) -> Result<StatsSnapshot> {
    let Some(mut snapshot) = StatsSnapshot::load(snapshot_path)? else {
        return full_collection(runner, snapshot_path);
    };

    let universe = match runner.list_tests() {
        Ok(universe) => universe,
        Err(_) => return full_collection(runner, snapshot_path),
    };

    let removed = snapshot.prune_obsolete(&universe);
    if removed > 0 {
        snapshot.save(snapshot_path)?;
    }

    let new_tests: Vec<String> = snapshot.new_tests(&universe).into_iter().collect();
    if !new_tests.is_empty() {
        match runner.run_stats(&new_tests) {
            Ok(events) => {
                snapshot.merge_events(&events);
                snapshot.save(snapshot_path)?;
            }
            Err(_) => return full_collection(runner, snapshot_path),
        }
    }

    Ok(snapshot)
}

fn full_collection<R: TestRunner>(runner: &R, snapshot_path: &Path) -> Result<StatsSnapshot> {
    let start = Instant::now();
    let events = runner.run_stats(&[])?;

    let mut snapshot = StatsSnapshot::default();
    snapshot.merge_events(&events);
    snapshot.collection_seconds = start.elapsed().as_secs_f64();

    if snapshot.tests_by_function.is_empty() {
        return Err(Error::NoCoverageCollected);
    }

    snapshot.save(snapshot_path)?;
    Ok(snapshot)
}
