// Interruption semantics get their own test binary: the interrupt flag is
// process-global, and sharing it with concurrently running scheduler tests
// would poison them.

use std::collections::BTreeSet;
use std::path::Path;
use std::process::Child;

use pymutor::error::Result;
use pymutor::outcome::Outcome;
use pymutor::records::SourceFileRecord;
use pymutor::scheduler::{RunOptions, interrupted, request_interrupt, reset_interrupt, run};
use pymutor::stats::StatsSnapshot;
use pymutor::testrunner::{RunnerEvent, TestRunner};
use tempfile::TempDir;

struct StubRunner;

impl TestRunner for StubRunner {
    fn list_tests(&self) -> Result<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }

    fn run_stats(&self, _tests: &[String]) -> Result<Vec<RunnerEvent>> {
        Ok(vec![])
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

    fn spawn_worker(&self, mutant: &str, _tests: &[String], _limit: u64) -> Result<Child> {
        panic!("interrupted run must not spawn workers, tried {mutant}");
    }
}

#[test]
fn interruption_stops_spawning_and_preserves_persisted_results() {
    let dir = TempDir::new().unwrap();
    let mut record = SourceFileRecord::for_fresh_generation(
        Path::new("app.py"),
        dir.path(),
        &[
            "app.x_f__mutant_1".to_string(),
            "app.x_f__mutant_2".to_string(),
        ],
    )
    .unwrap();
    // One mutant already has a verdict from an earlier, interrupted run.
    record.register_result("app.x_f__mutant_1", 1).unwrap();
    let mut records = vec![record];

    let mut stats = StatsSnapshot::default();
    stats.merge_events(&[
        RunnerEvent::Coverage {
            test: "t::one".to_string(),
            functions: vec!["app.x_f".to_string()],
        },
        RunnerEvent::Duration {
            test: "t::one".to_string(),
            duration: 0.1,
        },
    ]);

    assert!(!interrupted());
    request_interrupt();
    let summary = run(
        &StubRunner,
        &stats,
        &mut records,
        &RunOptions {
            mutant_filters: vec![],
            max_children: 2,
            debug: false,
        },
    )
    .unwrap();
    reset_interrupt();

    assert_eq!(summary.attempted, 0);
    // The persisted verdict is untouched; the unfinished mutant stays
    // not-checked, ready for a resumed run.
    assert_eq!(records[0].outcome_for("app.x_f__mutant_1"), Some(Outcome::Killed));
    assert_eq!(
        records[0].outcome_for("app.x_f__mutant_2"),
        Some(Outcome::NotChecked)
    );

    let reloaded = SourceFileRecord::load(Path::new("app.py"), dir.path()).unwrap();
    assert_eq!(reloaded.exit_code_by_key["app.x_f__mutant_1"], Some(1));
    assert_eq!(reloaded.exit_code_by_key["app.x_f__mutant_2"], None);
}
