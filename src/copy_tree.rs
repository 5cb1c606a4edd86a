use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Result;
use crate::generate;
use crate::records::SourceFileRecord;

const SKIP_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    "node_modules",
    "dist",
    "build",
    "mutants",
];

const SKIP_SUFFIXES: &[&str] = &[".pyc", ".pyo", ".meta"];

fn should_skip(name: &str) -> bool {
    SKIP_NAMES.iter().any(|s| *s == name) || SKIP_SUFFIXES.iter().any(|s| name.ends_with(s))
}

#[derive(Debug, Default)]
pub struct GenerationSummary {
    pub files_mutated: usize,
    pub files_copied: usize,
    pub mutants_generated: usize,
}

/// Build the mutated-copy tree: every file under the paths to mutate is
/// mirrored under the mutants directory, with eligible Python files
/// rewritten through the generator and everything else copied verbatim so
/// the program stays importable as a whole. Also copies the auxiliary
/// files the test suite needs and drops in the generated pytest support
/// modules.
pub fn build_mutated_tree(config: &Config) -> Result<GenerationSummary> {
    let root = &config.mutants_dir;
    fs::create_dir_all(root)?;

    let mut summary = GenerationSummary::default();

    for rel in walk_all_files(config)? {
        let src = config.root.join(&rel);
        let dest = root.join(&rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if config.should_ignore_for_mutation(&rel) {
            fs::copy(&src, &dest)?;
            summary.files_copied += 1;
            continue;
        }
        let source = fs::read_to_string(&src)?;
        let mutants = generate::mutate_file_contents(&rel, &source)?;
        fs::write(&dest, &mutants.rewritten)?;
        let record = SourceFileRecord::for_fresh_generation(&rel, root, &mutants.mutant_names)?;
        record.save()?;
        summary.files_mutated += 1;
        summary.mutants_generated += mutants.mutant_names.len();
    }

    copy_also_copy_files(config)?;
    write_support_files(root)?;

    Ok(summary)
}

/// Every file under the configured mutation paths, as root-relative paths
/// in deterministic order.
pub fn walk_all_files(config: &Config) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in &config.paths_to_mutate {
        let full = config.root.join(path);
        if full.is_file() {
            files.push(path.clone());
        } else if full.is_dir() {
            walk_dir(&config.root, path, &mut files)?;
        }
    }
    files.sort();
    Ok(files)
}

/// The Python sources among the mutation paths.
pub fn walk_source_files(config: &Config) -> Result<Vec<PathBuf>> {
    Ok(walk_all_files(config)?
        .into_iter()
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("py"))
        .collect())
}

fn walk_dir(root: &Path, rel_dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(root.join(rel_dir))? {
        let entry = entry?;
        let name = entry.file_name();
        if should_skip(&name.to_string_lossy()) {
            continue;
        }
        let rel_path = rel_dir.join(&name);
        let ft = entry.file_type()?;
        if ft.is_dir() {
            walk_dir(root, &rel_path, files)?;
        } else if ft.is_file() {
            files.push(rel_path);
        }
    }
    Ok(())
}

fn copy_also_copy_files(config: &Config) -> Result<()> {
    for path in &config.also_copy {
        let src = config.root.join(path);
        if !src.exists() {
            continue;
        }
        let destination = config.mutants_dir.join(path);
        if src.is_file() {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&src, &destination)?;
        } else {
            copy_dir_filtered(&src, &destination)?;
        }
    }
    Ok(())
}

fn copy_dir_filtered(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if should_skip(&name.to_string_lossy()) {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(&name);
        let ft = entry.file_type()?;
        if ft.is_dir() {
            copy_dir_filtered(&src_path, &dst_path)?;
        } else if ft.is_file() {
            fs::copy(&src_path, &dst_path)?;
        }
        // Symlinks and other special files are skipped.
    }
    Ok(())
}

/// In-process coverage hit registry, shared by every mutated module's
/// inlined dispatch runtime during stats collection.
const REGISTRY_MODULE: &str = r#"_hits = set()


def record_hit(name):
    _hits.add(name)


def drain():
    hits = sorted(_hits)
    _hits.clear()
    return hits
"#;

/// Pytest plugin bridging the test process back to the coordinator via a
/// JSONL event file: collected test ids, per-test coverage, per-test
/// durations and failures.
const PLUGIN_MODULE: &str = r#"import json
import os

_EVENTS_PATH = os.environ.get('MUTATION_EVENTS_FILE')
_MODE = os.environ.get('MUTANT_UNDER_TEST', '')


def _emit(payload):
    if not _EVENTS_PATH:
        return
    with open(_EVENTS_PATH, 'a') as f:
        f.write(json.dumps(payload) + '\n')


def pytest_collection_modifyitems(items):
    _emit({'event': 'collected', 'tests': [item.nodeid for item in items]})


def pytest_runtest_teardown(item, nextitem):
    if _MODE != 'stats':
        return
    import _mutation_registry
    functions = _mutation_registry.drain()
    if functions:
        _emit({'event': 'coverage', 'test': item.nodeid, 'functions': functions})


def pytest_runtest_logreport(report):
    if report.when != 'call':
        return
    _emit({'event': 'duration', 'test': report.nodeid, 'duration': report.duration})
    if report.failed:
        _emit({'event': 'failed', 'test': report.nodeid})
"#;

fn write_support_files(root: &Path) -> Result<()> {
    fs::write(root.join("_mutation_registry.py"), REGISTRY_MODULE)?;
    fs::write(root.join("_mutation_plugin.py"), PLUGIN_MODULE)?;
    Ok(())
}
