use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::copy_tree;
use crate::error::{Error, Result};
use crate::outcome::{Outcome, outcome_for_exit_code};

/// On-disk shape of a record: just the result map. Everything else is
/// reconstructed from the current generation pass.
#[derive(Debug, Serialize, Deserialize)]
struct MetaFile {
    exit_code_by_key: BTreeMap<String, Option<i32>>,
}

/// Mutation bookkeeping for one source file. Owns the side file next to
/// the mutated copy and is the only writer of it; saved after every
/// individual result so an interrupted run loses at most the in-flight
/// workers.
#[derive(Debug)]
pub struct SourceFileRecord {
    /// Original source path, relative to the project root.
    pub path: PathBuf,
    pub meta_path: PathBuf,
    /// Mutant identity → worker exit code; `None` until the mutant runs.
    /// Every key corresponds to a mutant generated for this file in the
    /// current pass.
    pub exit_code_by_key: BTreeMap<String, Option<i32>>,
    /// Estimated covering-test time per mutant, filled in by the scheduler.
    pub estimated_time_by_key: HashMap<String, f64>,
}

pub fn meta_path_for(mutants_dir: &Path, source_path: &Path) -> PathBuf {
    mutants_dir.join(format!("{}.meta", source_path.display()))
}

impl SourceFileRecord {
    /// Record for a fresh generation pass: one entry per generated mutant,
    /// carrying over the persisted result when the identity still exists.
    /// Identities that vanished with their function are dropped.
    pub fn for_fresh_generation(
        source_path: &Path,
        mutants_dir: &Path,
        mutant_names: &[String],
    ) -> Result<SourceFileRecord> {
        let meta_path = meta_path_for(mutants_dir, source_path);
        let previous = load_meta(&meta_path)?;

        let exit_code_by_key = mutant_names
            .iter()
            .map(|key| {
                let prior = previous
                    .as_ref()
                    .and_then(|m| m.exit_code_by_key.get(key).copied())
                    .flatten();
                (key.clone(), prior)
            })
            .collect();

        Ok(SourceFileRecord {
            path: source_path.to_path_buf(),
            meta_path,
            exit_code_by_key,
            estimated_time_by_key: HashMap::new(),
        })
    }

    pub fn load(source_path: &Path, mutants_dir: &Path) -> Result<SourceFileRecord> {
        let meta_path = meta_path_for(mutants_dir, source_path);
        let meta = load_meta(&meta_path)?
            .ok_or_else(|| Error::MissingRecord(source_path.to_path_buf()))?;
        Ok(SourceFileRecord {
            path: source_path.to_path_buf(),
            meta_path,
            exit_code_by_key: meta.exit_code_by_key,
            estimated_time_by_key: HashMap::new(),
        })
    }

    /// Atomic save: write-to-temp then rename, so a crash mid-write never
    /// truncates previously persisted results.
    pub fn save(&self) -> Result<()> {
        let parent = self
            .meta_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        let meta = MetaFile {
            exit_code_by_key: self.exit_code_by_key.clone(),
        };
        serde_json::to_writer_pretty(&mut tmp, &meta)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.meta_path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn register_result(&mut self, mutant_key: &str, exit_code: i32) -> Result<()> {
        self.exit_code_by_key
            .insert(mutant_key.to_string(), Some(exit_code));
        self.save()
    }

    pub fn outcome_for(&self, mutant_key: &str) -> Option<Outcome> {
        self.exit_code_by_key
            .get(mutant_key)
            .map(|code| outcome_for_exit_code(*code))
    }
}

fn load_meta(meta_path: &Path) -> Result<Option<MetaFile>> {
    match std::fs::read_to_string(meta_path) {
        Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Load the records for every mutated file in the project.
pub fn load_all(config: &Config) -> Result<Vec<SourceFileRecord>> {
    let mut records = Vec::new();
    for path in copy_tree::walk_source_files(config)? {
        if config.should_ignore_for_mutation(&path) {
            continue;
        }
        records.push(SourceFileRecord::load(&path, &config.mutants_dir)?);
    }
    Ok(records)
}

/// Outcome tally across a set of records.
pub fn summarize(records: &[SourceFileRecord]) -> BTreeMap<Outcome, usize> {
    let mut counts: BTreeMap<Outcome, usize> = BTreeMap::new();
    for record in records {
        for code in record.exit_code_by_key.values() {
            *counts.entry(outcome_for_exit_code(*code)).or_insert(0) += 1;
        }
    }
    counts
}

/// Mutant identities with a given outcome, across all records.
pub fn mutants_with_outcome<'a>(
    records: &'a [SourceFileRecord],
    outcome: Outcome,
) -> Vec<(&'a SourceFileRecord, &'a str)> {
    let mut result = Vec::new();
    for record in records {
        for (key, code) in &record.exit_code_by_key {
            if outcome_for_exit_code(*code) == outcome {
                result.push((record, key.as_str()));
            }
        }
    }
    result
}
