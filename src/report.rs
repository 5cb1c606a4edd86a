use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use similar::TextDiff;
use tree_sitter::Node;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::generate;
use crate::parser;
use crate::records::SourceFileRecord;
use crate::stats::StatsSnapshot;
use crate::testrunner::test_name_of;
use crate::trampoline::{function_key_from_mutant, local_mutant_name, original_names_from_key};

/// The record owning a mutant identity.
pub fn find_record<'a>(
    records: &'a [SourceFileRecord],
    mutant_key: &str,
) -> Result<&'a SourceFileRecord> {
    records
        .iter()
        .find(|r| r.exit_code_by_key.contains_key(mutant_key))
        .ok_or_else(|| Error::UnknownMutant(mutant_key.to_string()))
}

/// Unified diff between a mutant and its original function, both rendered
/// under the original function's name.
pub fn diff_for_mutant(
    record: &SourceFileRecord,
    mutants_dir: &Path,
    mutant_key: &str,
) -> Result<String> {
    let mutated_path = mutants_dir.join(&record.path);
    let mutated_source = fs::read_to_string(&mutated_path)?;
    diff_from_source(&mutated_source, &record.path, mutant_key)
}

/// Same as [`diff_for_mutant`], from already-loaded mutated text.
pub fn diff_from_source(
    mutated_source: &str,
    source_path: &Path,
    mutant_key: &str,
) -> Result<String> {
    let mangled = local_mutant_name(function_key_from_mutant(mutant_key)).to_string();
    let (short_name, _) = original_names_from_key(mutant_key);

    let orig_text = extract_renamed_function(
        mutated_source,
        &format!("{mangled}__orig"),
        &short_name,
        source_path,
    )?;
    let mutant_text = extract_renamed_function(
        mutated_source,
        local_mutant_name(mutant_key),
        &short_name,
        source_path,
    )?;

    let path_str = source_path.display().to_string();
    let diff = TextDiff::from_lines(&orig_text, &mutant_text);
    Ok(diff
        .unified_diff()
        .context_radius(3)
        .header(&path_str, &path_str)
        .to_string())
}

/// Materialize a mutant's body into the pristine original file in place
/// of the original function, for manual debugging. Decorators on the
/// original stay in place.
pub fn apply_mutant(record: &SourceFileRecord, config: &Config, mutant_key: &str) -> Result<()> {
    let (short_name, class_name) = original_names_from_key(mutant_key);

    let mutated_path = config.mutants_dir.join(&record.path);
    let mutated_source = fs::read_to_string(&mutated_path)?;
    let mutant_text = extract_renamed_function(
        &mutated_source,
        local_mutant_name(mutant_key),
        &short_name,
        &record.path,
    )?;

    let original_path = config.root.join(&record.path);
    let original_source = fs::read_to_string(&original_path)?;
    let target = locate_function(&original_source, &short_name, class_name.as_deref()).ok_or(
        Error::FunctionNotFound {
            name: short_name.clone(),
            path: record.path.clone(),
        },
    )?;

    let mut patched = original_source.clone();
    patched.replace_range(target.start_byte..target.end_byte, &mutant_text);
    fs::write(&original_path, patched)?;
    Ok(())
}

struct LocatedFunction {
    start_byte: usize,
    end_byte: usize,
    name_start: usize,
    name_end: usize,
}

/// Extract a function definition by name and rewrite its def name.
fn extract_renamed_function(
    source: &str,
    def_name: &str,
    new_name: &str,
    source_path: &Path,
) -> Result<String> {
    let found =
        locate_function_anywhere(source, def_name).ok_or_else(|| Error::FunctionNotFound {
            name: def_name.to_string(),
            path: source_path.to_path_buf(),
        })?;
    let text = &source[found.start_byte..found.end_byte];
    let mut renamed = String::with_capacity(text.len());
    renamed.push_str(&source[found.start_byte..found.name_start]);
    renamed.push_str(new_name);
    renamed.push_str(&source[found.name_end..found.end_byte]);
    Ok(renamed)
}

/// Find a `def` by name at any nesting depth. Mangled names are unique
/// within a generated file, so the first hit is the right one.
fn locate_function_anywhere(source: &str, name: &str) -> Option<LocatedFunction> {
    let tree = parser::parse_module(source);
    find_def(tree.root_node(), source, name)
}

/// Find a `def` by name at its original scope: inside the named class, or
/// at the top level of the module.
fn locate_function(source: &str, name: &str, class_name: Option<&str>) -> Option<LocatedFunction> {
    let tree = parser::parse_module(source);
    let root = tree.root_node();
    match class_name {
        Some(class_name) => {
            let class_node = find_class(root, source, class_name)?;
            let body = class_node.child_by_field_name("body")?;
            find_def(body, source, name)
        }
        None => find_def(root, source, name),
    }
}

fn find_class<'a>(node: Node<'a>, source: &str, name: &str) -> Option<Node<'a>> {
    if node.kind() == "class_definition" {
        if let Some(name_node) = node.child_by_field_name("name") {
            if &source[name_node.start_byte()..name_node.end_byte()] == name {
                return Some(node);
            }
        }
    }
    for i in 0..node.child_count() {
        if let Some(found) = node.child(i).and_then(|c| find_class(c, source, name)) {
            return Some(found);
        }
    }
    None
}

fn find_def(node: Node, source: &str, name: &str) -> Option<LocatedFunction> {
    if node.kind() == "function_definition" {
        if let Some(name_node) = node.child_by_field_name("name") {
            if &source[name_node.start_byte()..name_node.end_byte()] == name {
                return Some(LocatedFunction {
                    start_byte: node.start_byte(),
                    end_byte: node.end_byte(),
                    name_start: name_node.start_byte(),
                    name_end: name_node.end_byte(),
                });
            }
        }
    }
    for i in 0..node.child_count() {
        if let Some(found) = node.child(i).and_then(|c| find_def(c, source, name)) {
            return Some(found);
        }
    }
    None
}

/// One surviving mutant in the export handed to external tooling.
#[derive(Debug, Serialize)]
pub struct SurvivorInfo {
    pub mutant_name: String,
    pub source_file: String,
    pub mutation_desc: String,
    pub tests: Vec<SurvivorTestInfo>,
}

#[derive(Debug, Serialize)]
pub struct SurvivorTestInfo {
    pub test_name: String,
    pub test_code: Option<String>,
}

/// Write the survivor export: every mutant whose covering tests all
/// passed, with its change description and the source of those tests.
/// This file is the engine's only handoff to explanation tooling.
pub fn export_survivors(
    config: &Config,
    records: &[SourceFileRecord],
    stats: &StatsSnapshot,
) -> Result<PathBuf> {
    let mut survivors = Vec::new();

    for record in records {
        let survived: Vec<&String> = record
            .exit_code_by_key
            .iter()
            .filter(|(_, code)| **code == Some(0))
            .map(|(key, _)| key)
            .collect();
        if survived.is_empty() {
            continue;
        }

        // Generation is deterministic, so descriptions can be rebuilt from
        // the pristine source instead of being persisted.
        let source = fs::read_to_string(config.root.join(&record.path))?;
        let descriptions = generate::mutate_file_contents(&record.path, &source)?.descriptions;

        for key in survived {
            let tests = stats
                .tests_for_function(function_key_from_mutant(key))
                .into_iter()
                .map(|test_name| {
                    let test_code = extract_test_code(&config.mutants_dir, &test_name);
                    SurvivorTestInfo {
                        test_name,
                        test_code,
                    }
                })
                .collect();
            survivors.push(SurvivorInfo {
                mutant_name: key.clone(),
                source_file: record.path.display().to_string(),
                mutation_desc: descriptions.get(key).cloned().unwrap_or_default(),
                tests,
            });
        }
    }

    let path = config.survivors_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut json = serde_json::to_string_pretty(&survivors)?;
    json.push('\n');
    fs::write(&path, json)?;
    Ok(path)
}

/// Source text of a test function, looked up from its node id inside the
/// mutated tree.
fn extract_test_code(mutants_dir: &Path, nodeid: &str) -> Option<String> {
    let (file, _) = nodeid.split_once("::")?;
    let source = fs::read_to_string(mutants_dir.join(file)).ok()?;
    let name = test_name_of(nodeid);
    let found = locate_function_anywhere(&source, name)?;
    Some(source[found.start_byte..found.end_byte].to_string())
}
