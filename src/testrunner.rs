use std::collections::BTreeSet;
use std::io::BufRead;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::trampoline::{DISPATCH_ENV, FORCED_FAIL_SENTINEL, STATS_SENTINEL};

/// Event emitted by the generated pytest plugin into the JSONL file the
/// coordinator hands each instrumented run.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunnerEvent {
    Collected { tests: Vec<String> },
    Coverage { test: String, functions: Vec<String> },
    Duration { test: String, duration: f64 },
    Failed { test: String },
}

/// The seam between the scheduler and the test tool. Everything but
/// worker spawning blocks in the coordinator; `spawn_worker` hands back
/// the child so the scheduler can manage parallelism itself.
pub trait TestRunner {
    /// The current universe of test ids.
    fn list_tests(&self) -> Result<BTreeSet<String>>;

    /// Instrumented run recording coverage and durations. An empty test
    /// list means the whole suite.
    fn run_stats(&self, tests: &[String]) -> Result<Vec<RunnerEvent>>;

    /// Tests that fail against the unmutated baseline.
    fn failing_tests(&self) -> Result<BTreeSet<String>>;

    /// Run with no mutation active; returns the exit code. An empty test
    /// list means the whole suite.
    fn run_clean(&self, tests: &[String], excluded: &[String]) -> Result<i32>;

    /// Run with the forced-fail sentinel active; returns the exit code.
    fn run_forced_fail(&self) -> Result<i32>;

    /// Spawn one isolated worker running `tests` against `mutant_key`,
    /// with a CPU-time rlimit applied inside the child.
    fn spawn_worker(&self, mutant_key: &str, tests: &[String], cpu_limit_secs: u64)
    -> Result<Child>;
}

pub struct PytestRunner {
    mutants_root: PathBuf,
    python: String,
    debug: bool,
}

impl PytestRunner {
    pub fn new(mutants_root: PathBuf, python: String, debug: bool) -> PytestRunner {
        PytestRunner {
            mutants_root,
            python,
            debug,
        }
    }

    fn base_command(&self, dispatch: &str) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.arg("-m").arg("pytest");
        cmd.current_dir(&self.mutants_root);
        cmd.env(DISPATCH_ENV, dispatch);
        cmd.env("PY_IGNORE_IMPORTMISMATCH", "1");
        cmd.env("PYTHONDONTWRITEBYTECODE", "1");
        // src-layout projects import from the mutated copy of src/.
        if self.mutants_root.join("src").is_dir() {
            cmd.env("PYTHONPATH", "src");
        }
        if !self.debug {
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        }
        cmd
    }

    /// Run a pytest invocation with the plugin's event file attached,
    /// returning the exit code and the parsed events.
    fn run_with_events(&self, mut cmd: Command) -> Result<(i32, Vec<RunnerEvent>)> {
        let events_file = tempfile::NamedTempFile::new()?;
        cmd.env("MUTATION_EVENTS_FILE", events_file.path());
        let status = cmd.status()?;
        let code = status.code().unwrap_or(-1);

        let mut events = Vec::new();
        let reader = std::io::BufReader::new(events_file.reopen()?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunnerEvent>(&line) {
                Ok(event) => events.push(event),
                // A torn line from a killed run is dropped, not fatal.
                Err(_) => continue,
            }
        }
        Ok((code, events))
    }
}

impl TestRunner for PytestRunner {
    fn list_tests(&self) -> Result<BTreeSet<String>> {
        let mut cmd = self.base_command("");
        cmd.args(["--collect-only", "-q", "-p", "_mutation_plugin", "--rootdir=."]);
        let (code, events) = self.run_with_events(cmd)?;
        // 5 is pytest for "collected nothing", which is an answer, not an
        // error.
        if code != 0 && code != 5 {
            return Err(Error::TestCollectionFailed);
        }
        for event in events.into_iter().rev() {
            if let RunnerEvent::Collected { tests } = event {
                return Ok(tests.into_iter().collect());
            }
        }
        Err(Error::TestCollectionFailed)
    }

    fn run_stats(&self, tests: &[String]) -> Result<Vec<RunnerEvent>> {
        let mut cmd = self.base_command(STATS_SENTINEL);
        cmd.args(["-x", "-q", "-p", "_mutation_plugin", "--rootdir=."]);
        cmd.args(tests);
        let (code, events) = self.run_with_events(cmd)?;
        if code != 0 {
            return Err(Error::StatsRunFailed(code));
        }
        Ok(events)
    }

    fn failing_tests(&self) -> Result<BTreeSet<String>> {
        let mut cmd = self.base_command("");
        cmd.args(["-q", "-p", "_mutation_plugin", "--rootdir=."]);
        // The exit code is expected to be nonzero when failures exist;
        // only the failure events matter here.
        let (_code, events) = self.run_with_events(cmd)?;
        let mut failed = BTreeSet::new();
        for event in events {
            if let RunnerEvent::Failed { test } = event {
                failed.insert(test);
            }
        }
        Ok(failed)
    }

    fn run_clean(&self, tests: &[String], excluded: &[String]) -> Result<i32> {
        let mut cmd = self.base_command("");
        cmd.args(["-x", "-q", "--rootdir=."]);
        cmd.args(tests);
        if !excluded.is_empty() {
            cmd.arg("-k").arg(deselect_expression(excluded));
        }
        let status = cmd.status()?;
        Ok(status.code().unwrap_or(-1))
    }

    fn run_forced_fail(&self) -> Result<i32> {
        let mut cmd = self.base_command(FORCED_FAIL_SENTINEL);
        cmd.args(["-x", "-q", "--rootdir=."]);
        let status = cmd.status()?;
        Ok(status.code().unwrap_or(-1))
    }

    fn spawn_worker(
        &self,
        mutant_key: &str,
        tests: &[String],
        cpu_limit_secs: u64,
    ) -> Result<Child> {
        let mut cmd = self.base_command(mutant_key);
        cmd.args(["-x", "-q", "--rootdir=.", "-p", "no:cacheprovider"]);
        cmd.args(tests);
        apply_cpu_rlimit(&mut cmd, cpu_limit_secs);
        Ok(cmd.spawn()?)
    }
}

/// `-k` expression deselecting the given tests by bare name.
pub fn deselect_expression(excluded: &[String]) -> String {
    let names: Vec<String> = excluded
        .iter()
        .map(|nodeid| format!("not {}", test_name_of(nodeid)))
        .collect();
    names.join(" and ")
}

/// The bare test function name of a node id, with any parametrization
/// suffix stripped: `tests/test_a.py::TestX::test_b[0]` → `test_b`.
pub fn test_name_of(nodeid: &str) -> &str {
    let name = nodeid.rsplit("::").next().unwrap_or(nodeid);
    match name.find('[') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Apply a CPU-time rlimit inside the child, between fork and exec. This
/// bounds runaway mutants without relying on wall-clock signals that
/// scheduler contention can skew.
pub fn apply_cpu_rlimit(cmd: &mut Command, cpu_limit_secs: u64) {
    use std::os::unix::process::CommandExt;
    unsafe {
        cmd.pre_exec(move || {
            let rlim = libc::rlimit {
                rlim_cur: cpu_limit_secs,
                rlim_max: cpu_limit_secs,
            };
            if libc::setrlimit(libc::RLIMIT_CPU, &rlim) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}
