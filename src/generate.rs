use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::parser;
use crate::trampoline::{self, PREAMBLE};

/// Output of one generation pass over one source file. Generation is
/// deterministic: the same source snapshot always yields the same mutant
/// identities in the same order.
pub struct FileMutants {
    pub rewritten: String,
    /// Full mutant identities in generation order.
    pub mutant_names: Vec<String>,
    /// Identity → human-readable change description.
    pub descriptions: BTreeMap<String, String>,
}

/// Rewrite one file so that every mutated function dispatches through a
/// trampoline. Files with nothing to mutate come back verbatim.
pub fn mutate_file_contents(rel_path: &Path, source: &str) -> Result<FileMutants> {
    let module = trampoline::module_name_for_path(rel_path);
    let functions = parser::discover_functions(source);
    let mutated: Vec<_> = functions.iter().filter(|f| !f.sites.is_empty()).collect();

    if mutated.is_empty() {
        return Ok(FileMutants {
            rewritten: source.to_string(),
            mutant_names: vec![],
            descriptions: BTreeMap::new(),
        });
    }

    let rendered: Vec<_> = mutated
        .iter()
        .map(|f| (*f, trampoline::render_function(source, f, &module)))
        .collect();

    let mut rewritten = source.to_string();
    for (func, r) in rendered.iter().rev() {
        rewritten.replace_range(func.replace_start..func.end_byte, &r.text);
    }

    let mut insert_at = preamble_insert_offset(source);
    if let Some(first) = rendered.first() {
        insert_at = insert_at.min(first.0.replace_start);
    }
    if insert_at == 0 {
        rewritten.insert_str(0, &format!("{PREAMBLE}\n\n"));
    } else {
        rewritten.insert_str(insert_at, &format!("\n\n{PREAMBLE}"));
    }

    let mut mutant_names = Vec::new();
    let mut descriptions = BTreeMap::new();
    for (_, r) in rendered {
        mutant_names.extend(r.mutant_names);
        descriptions.extend(r.descriptions);
    }

    let check = parser::parse_module(&rewritten);
    if check.root_node().has_error() {
        return Err(Error::GeneratedFileInvalid {
            path: rel_path.to_path_buf(),
        });
    }

    Ok(FileMutants {
        rewritten,
        mutant_names,
        descriptions,
    })
}

/// The dispatch runtime has to land after the statements Python requires
/// at the very top of a module: leading comments, the module docstring,
/// and any `from __future__ import` lines.
fn preamble_insert_offset(source: &str) -> usize {
    let tree = parser::parse_module(source);
    let root = tree.root_node();
    let mut offset = 0;
    let mut seen_docstring = false;

    for i in 0..root.child_count() {
        let Some(child) = root.child(i) else { break };
        match child.kind() {
            "comment" => offset = child.end_byte(),
            "expression_statement" if !seen_docstring => {
                let is_docstring = child.child_count() == 1
                    && child.child(0).map(|c| c.kind() == "string").unwrap_or(false);
                if !is_docstring {
                    break;
                }
                seen_docstring = true;
                offset = child.end_byte();
            }
            "import_from_statement" => {
                let is_future = child
                    .child_by_field_name("module_name")
                    .map(|m| &source[m.start_byte()..m.end_byte()] == "__future__")
                    .unwrap_or(false);
                if !is_future {
                    break;
                }
                offset = child.end_byte();
            }
            _ => break,
        }
    }

    offset
}
