use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The rewritten text of a mutated file no longer parses. This is a bug
    /// in the generator, not a problem with the target project, and the
    /// whole generation pass is aborted.
    #[error("mutated copy of {path} does not parse; aborting generation")]
    GeneratedFileInvalid { path: PathBuf },

    #[error("stats collection recorded no test coverage; the dispatch hook never engaged")]
    NoCoverageCollected,

    #[error("failed to collect the list of tests")]
    TestCollectionFailed,

    #[error("stats collection run failed with exit code {0}")]
    StatsRunFailed(i32),

    #[error("clean test run failed with exit code {0}; fix the failing tests before mutation testing")]
    CleanRunFailed(i32),

    #[error("forced-fail check passed; mutation dispatch is not active in the test run")]
    ForcedFailIneffective,

    #[error("mutant filter matched nothing: {0:?}")]
    FilterMatchedNothing(Vec<String>),

    #[error("could not find code to mutate; pass --paths-to-mutate")]
    NoPathsToMutate,

    #[error("unknown mutant: {0}")]
    UnknownMutant(String),

    #[error("could not find function '{name}' in {path}")]
    FunctionNotFound { name: String, path: PathBuf },

    #[error("missing mutation record for {0}; run `pymutor run` first")]
    MissingRecord(PathBuf),

    #[error("no stats snapshot at {0}; run `pymutor run` first")]
    MissingStats(PathBuf),
}

impl Error {
    /// Exit code for the CLI: 2 for configuration/usage problems the user
    /// can fix by changing arguments, 3 for environment failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::FilterMatchedNothing(_)
            | Error::NoPathsToMutate
            | Error::UnknownMutant(_)
            | Error::MissingRecord(_)
            | Error::MissingStats(_) => 2,
            _ => 3,
        }
    }
}
