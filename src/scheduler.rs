use std::collections::{BTreeSet, HashMap};
use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use crate::config::fnmatch;
use crate::error::{Error, Result};
use crate::outcome::EXIT_NO_TESTS;
use crate::records::SourceFileRecord;
use crate::stats::StatsSnapshot;
use crate::testrunner::TestRunner;
use crate::trampoline::function_key_from_mutant;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

pub fn request_interrupt() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

pub fn reset_interrupt() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Explicit mutant identities or fnmatch-style patterns. Matching
    /// mutants are always re-run; with no filters, only `not checked`
    /// mutants are attempted.
    pub mutant_filters: Vec<String>,
    pub max_children: usize,
    pub debug: bool,
}

#[derive(Debug)]
pub struct RunSummary {
    pub attempted: usize,
    pub elapsed: Duration,
}

/// CPU-time rlimit for one worker, in seconds. Strictly greater than the
/// mutant's estimated worst-case test time, with generous headroom so an
/// honest slow run is never cut down by its own limit.
pub fn cpu_time_limit(estimated: f64, coordinator_cpu: f64) -> u64 {
    (((estimated + 1.0) * 2.0 + coordinator_cpu).ceil() as u64) * 10
}

/// Wall-clock deadline after which the watchdog signals a worker. Catches
/// mutants blocked off-CPU (e.g. on I/O) that the rlimit cannot.
pub fn watchdog_deadline_secs(estimated: f64) -> f64 {
    (estimated + 1.0) * 4.0
}

/// CPU time consumed by this process so far, in seconds.
pub fn process_cpu_time() -> f64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_PROCESS_CPUTIME_ID, &mut ts) };
    if rc != 0 {
        return 0.0;
    }
    ts.tv_sec as f64 + ts.tv_nsec as f64 / 1e9
}

#[derive(Debug, Clone)]
struct WatchEntry {
    started: Instant,
    estimated: f64,
}

/// Second line of defense against runaway workers: a background scan,
/// once per second, that sends SIGXCPU to any worker past its wall-clock
/// deadline.
#[derive(Clone)]
pub struct Watchdog {
    entries: Arc<Mutex<HashMap<u32, WatchEntry>>>,
    stop: Arc<AtomicBool>,
}

impl Watchdog {
    pub fn new() -> Watchdog {
        Watchdog {
            entries: Arc::new(Mutex::new(HashMap::new())),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register(&self, pid: u32, estimated: f64) {
        self.register_at(pid, estimated, Instant::now());
    }

    pub fn register_at(&self, pid: u32, estimated: f64, started: Instant) {
        self.entries
            .lock()
            .unwrap()
            .insert(pid, WatchEntry { started, estimated });
    }

    pub fn deregister(&self, pid: u32) {
        self.entries.lock().unwrap().remove(&pid);
    }

    /// One scan over the in-flight workers; returns the pids signaled.
    /// Overdue workers are signaled on every scan until they exit.
    pub fn sweep_once(&self) -> Vec<u32> {
        let entries = self.entries.lock().unwrap();
        let mut signaled = Vec::new();
        for (pid, entry) in entries.iter() {
            let deadline = watchdog_deadline_secs(entry.estimated);
            if entry.started.elapsed().as_secs_f64() > deadline {
                let _ = kill(Pid::from_raw(*pid as i32), Signal::SIGXCPU);
                signaled.push(*pid);
            }
        }
        signaled
    }

    pub fn spawn_thread(&self) {
        let watchdog = self.clone();
        std::thread::spawn(move || {
            while !watchdog.stop.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_secs(1));
                watchdog.sweep_once();
            }
        });
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl Default for Watchdog {
    fn default() -> Watchdog {
        Watchdog::new()
    }
}

struct Candidate {
    record_idx: usize,
    key: String,
    prior_exit_code: Option<i32>,
    estimated: f64,
}

struct Worker {
    child: Child,
    pid: u32,
    record_idx: usize,
    key: String,
}

fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(code) = status.code() {
        code
    } else if let Some(signal) = status.signal() {
        -signal
    } else {
        // Neither a code nor a signal: call it suspicious.
        35
    }
}

fn matches_filters(key: &str, filters: &[String]) -> bool {
    filters.iter().any(|f| f == key || fnmatch(f, key))
}

/// Tests covering the functions selected by the filters: exact mutant
/// identities resolve through their function, patterns match across the
/// coverage map.
pub fn tests_for_filters(stats: &StatsSnapshot, filters: &[String]) -> BTreeSet<String> {
    let mut tests = BTreeSet::new();
    for filter in filters {
        if filter.contains('*') {
            for (function_key, covering) in &stats.tests_by_function {
                if fnmatch(filter, function_key) {
                    tests.extend(covering.iter().cloned());
                }
            }
        } else {
            tests.extend(
                stats
                    .tests_for_function(function_key_from_mutant(filter))
                    .into_iter(),
            );
        }
    }
    tests
}

/// Run mutation testing over the given records. Ordering per mutant is
/// strict: clean gate, forced-fail self-check, then mutant executions.
pub fn run<R: TestRunner>(
    runner: &R,
    stats: &StatsSnapshot,
    records: &mut [SourceFileRecord],
    options: &RunOptions,
) -> Result<RunSummary> {
    let mut candidates: Vec<Candidate> = Vec::new();
    for (record_idx, record) in records.iter().enumerate() {
        for (key, prior) in &record.exit_code_by_key {
            candidates.push(Candidate {
                record_idx,
                key: key.clone(),
                prior_exit_code: *prior,
                estimated: 0.0,
            });
        }
    }

    if !options.mutant_filters.is_empty() {
        candidates.retain(|c| matches_filters(&c.key, &options.mutant_filters));
        if candidates.is_empty() {
            return Err(Error::FilterMatchedNothing(options.mutant_filters.clone()));
        }
    }

    for candidate in &mut candidates {
        candidate.estimated = stats.estimated_worst_case(function_key_from_mutant(&candidate.key));
    }
    for candidate in &candidates {
        records[candidate.record_idx]
            .estimated_time_by_key
            .insert(candidate.key.clone(), candidate.estimated);
    }

    // Tests already failing on the unmutated baseline can never
    // discriminate a mutant from the original; they are excluded from the
    // gate and from every mutant run.
    let failing = runner.failing_tests()?;

    let clean_tests: Vec<String> = if options.mutant_filters.is_empty() {
        vec![]
    } else {
        tests_for_filters(stats, &options.mutant_filters)
            .into_iter()
            .collect()
    };
    let clean_code = runner.run_clean(&clean_tests, &failing.iter().cloned().collect::<Vec<_>>())?;
    if clean_code != 0 {
        return Err(Error::CleanRunFailed(clean_code));
    }

    if !candidates.is_empty() {
        let forced_code = runner.run_forced_fail()?;
        if forced_code == 0 {
            return Err(Error::ForcedFailIneffective);
        }
    }

    // Cheapest mutants first: maximum verdicts before the budget goes to
    // the expensive ones.
    candidates.sort_by(|a, b| {
        a.estimated
            .partial_cmp(&b.estimated)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let watchdog = Watchdog::new();
    watchdog.spawn_thread();
    let result = run_mutants(runner, stats, records, options, candidates, &failing, &watchdog);
    watchdog.stop();
    result
}

fn run_mutants<R: TestRunner>(
    runner: &R,
    stats: &StatsSnapshot,
    records: &mut [SourceFileRecord],
    options: &RunOptions,
    candidates: Vec<Candidate>,
    failing: &BTreeSet<String>,
    watchdog: &Watchdog,
) -> Result<RunSummary> {
    let start = Instant::now();
    let max_children = options.max_children.max(1);
    let mut in_flight: Vec<Worker> = Vec::new();
    let mut attempted = 0usize;

    'spawning: for candidate in candidates {
        if interrupted() {
            break 'spawning;
        }

        // Re-run policy: explicitly selected mutants always re-run, the
        // rest keep their persisted result.
        if options.mutant_filters.is_empty() && candidate.prior_exit_code.is_some() {
            continue;
        }

        let function_key = function_key_from_mutant(&candidate.key);
        let tests: Vec<String> = stats
            .tests_fastest_first(function_key)
            .into_iter()
            .filter(|t| !failing.contains(t))
            .collect();

        if tests.is_empty() {
            records[candidate.record_idx].register_result(&candidate.key, EXIT_NO_TESTS)?;
            continue;
        }

        let limit = cpu_time_limit(candidate.estimated, process_cpu_time());
        let child = runner.spawn_worker(&candidate.key, &tests, limit)?;
        let pid = child.id();
        watchdog.register(pid, candidate.estimated);
        in_flight.push(Worker {
            child,
            pid,
            record_idx: candidate.record_idx,
            key: candidate.key,
        });
        attempted += 1;

        while in_flight.len() >= max_children {
            if interrupted() {
                break 'spawning;
            }
            if !try_reap(&mut in_flight, records, watchdog, options.debug)? {
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }

    while !in_flight.is_empty() && !interrupted() {
        if !try_reap(&mut in_flight, records, watchdog, options.debug)? {
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    if interrupted() {
        // Stop spawning happened above; terminate what is left. Their
        // results stay unrecorded, so a resume re-attempts them.
        terminate_in_flight(&mut in_flight, watchdog);
    }

    Ok(RunSummary {
        attempted,
        elapsed: start.elapsed(),
    })
}

/// Poll the in-flight workers once; record and persist the first
/// completed result found. Returns whether anything was reaped.
fn try_reap(
    in_flight: &mut Vec<Worker>,
    records: &mut [SourceFileRecord],
    watchdog: &Watchdog,
    debug: bool,
) -> Result<bool> {
    for i in 0..in_flight.len() {
        if let Some(status) = in_flight[i].child.try_wait()? {
            let worker = in_flight.swap_remove(i);
            watchdog.deregister(worker.pid);
            let code = exit_code_of(status);
            if debug {
                eprintln!("    worker exit code {code} for {}", worker.key);
            }
            records[worker.record_idx].register_result(&worker.key, code)?;
            return Ok(true);
        }
    }
    Ok(false)
}

fn terminate_in_flight(in_flight: &mut Vec<Worker>, watchdog: &Watchdog) {
    for worker in in_flight.iter() {
        let _ = kill(Pid::from_raw(worker.pid as i32), Signal::SIGTERM);
    }
    for mut worker in in_flight.drain(..) {
        let _ = worker.child.wait();
        watchdog.deregister(worker.pid);
    }
}
