use std::fmt;

/// Exit code a worker reports when a mutant has no covering tests. Written
/// by the scheduler without spawning a worker.
pub const EXIT_NO_TESTS: i32 = 33;

/// What happened to a mutant, derived from its worker's exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    Killed,
    Survived,
    NoTests,
    Skipped,
    Suspicious,
    Timeout,
    Interrupted,
    Segfault,
    NotChecked,
}

/// Map a worker exit status to an outcome. `None` means the mutant was
/// never run. Signal deaths arrive as negative codes (-24 is SIGXCPU
/// delivered straight to the test process, which pytest turns into a
/// failing run; 24/152 are the shell-reported flavors of the same signal).
/// Codes outside the table mean the worker died in a way we do not
/// understand, which is exactly what `Suspicious` is for.
pub fn outcome_for_exit_code(exit_code: Option<i32>) -> Outcome {
    match exit_code {
        None => Outcome::NotChecked,
        Some(1) | Some(3) | Some(-24) => Outcome::Killed,
        Some(0) => Outcome::Survived,
        Some(5) | Some(EXIT_NO_TESTS) => Outcome::NoTests,
        Some(34) => Outcome::Skipped,
        Some(35) => Outcome::Suspicious,
        Some(36) | Some(24) | Some(152) | Some(255) => Outcome::Timeout,
        Some(2) => Outcome::Interrupted,
        Some(-11) => Outcome::Segfault,
        Some(_) => Outcome::Suspicious,
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Killed => "killed",
            Outcome::Survived => "survived",
            Outcome::NoTests => "no tests",
            Outcome::Skipped => "skipped",
            Outcome::Suspicious => "suspicious",
            Outcome::Timeout => "timeout",
            Outcome::Interrupted => "interrupted by user",
            Outcome::Segfault => "segfault",
            Outcome::NotChecked => "not checked",
        };
        f.write_str(s)
    }
}
