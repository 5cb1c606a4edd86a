use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{Error, Result};

/// Engine configuration. Built from CLI overrides plus source-root
/// inference; config-file loading is left to outer tooling.
#[derive(Debug, Clone)]
pub struct Config {
    /// Project root all relative paths resolve against.
    pub root: PathBuf,
    /// Directories (or single files) holding the code to mutate, relative
    /// to the root.
    pub paths_to_mutate: Vec<PathBuf>,
    /// fnmatch-style patterns for files that must not be mutated. Matching
    /// files are still copied verbatim into the mutated tree.
    pub do_not_mutate: Vec<String>,
    /// Extra files and directories to mirror into the mutated tree so the
    /// test suite can run there in isolation.
    pub also_copy: Vec<PathBuf>,
    /// Worker process bound. Defaults to the logical CPU count.
    pub max_children: usize,
    /// Surface subprocess output and worker exit codes.
    pub debug: bool,
    /// Python interpreter used to drive pytest.
    pub python: String,
    /// Root of the mutated-copy tree.
    pub mutants_dir: PathBuf,
}

impl Config {
    pub fn discover(
        paths_to_mutate: Vec<PathBuf>,
        test_file: Option<PathBuf>,
        max_children: Option<usize>,
    ) -> Result<Config> {
        let paths_to_mutate = if paths_to_mutate.is_empty() {
            guess_paths_to_mutate()?
        } else {
            paths_to_mutate
        };

        let also_copy = match test_file {
            Some(file) => vec![file],
            None => default_also_copy(),
        };

        Ok(Config {
            root: PathBuf::from("."),
            paths_to_mutate,
            do_not_mutate: vec![],
            also_copy,
            max_children: max_children.unwrap_or_else(default_max_children),
            debug: false,
            python: "python3".to_string(),
            mutants_dir: PathBuf::from("mutants"),
        })
    }

    /// A file is ignored for mutation when it is not Python source or when
    /// it matches a do_not_mutate pattern. Ignored files are copied through
    /// unchanged so the mutated tree stays importable as a whole.
    pub fn should_ignore_for_mutation(&self, path: &Path) -> bool {
        if path.extension().and_then(|e| e.to_str()) != Some("py") {
            return true;
        }
        let path_str = path.to_string_lossy();
        self.do_not_mutate.iter().any(|p| fnmatch(p, &path_str))
    }

    pub fn stats_path(&self) -> PathBuf {
        self.mutants_dir.join("mutation-stats.json")
    }

    pub fn survivors_path(&self) -> PathBuf {
        self.mutants_dir.join("survivors.json")
    }
}

fn default_max_children() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Test directories and project files the suite needs at runtime.
fn default_also_copy() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("tests"),
        PathBuf::from("test"),
        PathBuf::from("setup.cfg"),
        PathBuf::from("pyproject.toml"),
        PathBuf::from("conftest.py"),
    ];
    if let Ok(entries) = std::fs::read_dir(".") {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("test") && name.ends_with(".py") {
                paths.push(PathBuf::from(name.as_ref()));
            }
        }
    }
    paths
}

/// Infer where the code to mutate lives: lib/, src/, a directory named
/// after the working directory (with the usual dash/space fixups), or a
/// single module file. Fails when nothing matches and nothing was
/// configured.
pub fn guess_paths_to_mutate() -> Result<Vec<PathBuf>> {
    let cwd = std::env::current_dir()?;
    let this_dir = cwd
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let candidates = [
        "lib".to_string(),
        "src".to_string(),
        this_dir.clone(),
        this_dir.replace('-', "_"),
        this_dir.replace(' ', "_"),
        this_dir.replace('-', ""),
        this_dir.replace(' ', ""),
    ];
    for candidate in &candidates {
        if !candidate.is_empty() && Path::new(candidate).is_dir() {
            return Ok(vec![PathBuf::from(candidate)]);
        }
    }

    let single_module = format!("{this_dir}.py");
    if Path::new(&single_module).is_file() {
        return Ok(vec![PathBuf::from(single_module)]);
    }

    Err(Error::NoPathsToMutate)
}

/// Shell-style wildcard match (`*` and `?`), the same dialect Python's
/// fnmatch speaks. Translated to an anchored regex.
pub fn fnmatch(pattern: &str, text: &str) -> bool {
    let mut translated = String::with_capacity(pattern.len() * 2);
    translated.push('^');
    for c in pattern.chars() {
        match c {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            _ => translated.push_str(&regex::escape(&c.to_string())),
        }
    }
    translated.push('$');
    match Regex::new(&translated) {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}
