use std::collections::BTreeMap;
use std::path::Path;

use crate::parser::MutableFunction;

/// Separator used when folding a class name into a mangled function name.
/// A letter-category codepoint, so the mangled names stay valid Python
/// identifiers while never colliding with anything hand-written.
pub const CLASS_NAME_SEPARATOR: char = 'ǁ';

/// Marker splitting a mangled function name from a mutant ordinal.
pub const MUTANT_SEPARATOR: &str = "__mutant_";

/// Environment variable carrying the dispatch flag into worker processes.
/// Read exactly once, at interpreter startup, by the generated preamble.
pub const DISPATCH_ENV: &str = "MUTANT_UNDER_TEST";

/// Dispatch flag sentinel for coverage collection runs.
pub const STATS_SENTINEL: &str = "stats";

/// Dispatch flag sentinel that makes every wrapped function raise.
pub const FORCED_FAIL_SENTINEL: &str = "fail";

pub fn mangle_function_name(name: &str, class_name: Option<&str>) -> String {
    match class_name {
        Some(class_name) => {
            format!("x{CLASS_NAME_SEPARATOR}{class_name}{CLASS_NAME_SEPARATOR}{name}")
        }
        None => format!("x_{name}"),
    }
}

/// Module path for a source file, as Python will import it from the
/// mutated tree: `src/pkg/mod.py` → `pkg.mod`, `pkg/__init__.py` → `pkg`.
pub fn module_name_for_path(path: &Path) -> String {
    let mut parts: Vec<String> = path
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.first().map(String::as_str) == Some("src") {
        parts.remove(0);
    }
    if parts.last().map(String::as_str) == Some("__init__") {
        parts.pop();
    }
    parts.join(".")
}

/// Full mutant identity: `<module>.<mangled>__mutant_<ordinal>`.
pub fn mutant_key(module: &str, mangled: &str, ordinal: usize) -> String {
    format!("{module}.{mangled}{MUTANT_SEPARATOR}{ordinal}")
}

/// The module-qualified mangled function name a mutant belongs to; this is
/// the key space of the coverage map.
pub fn function_key_from_mutant(mutant_key: &str) -> &str {
    match mutant_key.rfind(MUTANT_SEPARATOR) {
        Some(idx) => &mutant_key[..idx],
        None => mutant_key,
    }
}

/// The local (file-scoped) name of a mutant body, as used in the mutants
/// dict: everything after the module path.
pub fn local_mutant_name(mutant_key: &str) -> &str {
    match mutant_key.rfind('.') {
        Some(idx) => &mutant_key[idx + 1..],
        None => mutant_key,
    }
}

/// Recover the original function and class names from a mutant identity.
pub fn original_names_from_key(mutant_key: &str) -> (String, Option<String>) {
    let local = local_mutant_name(function_key_from_mutant(mutant_key));
    let separators: Vec<usize> = local
        .char_indices()
        .filter(|(_, c)| *c == CLASS_NAME_SEPARATOR)
        .map(|(i, _)| i)
        .collect();
    if separators.len() >= 2 {
        let first = separators[0];
        let last = separators[separators.len() - 1];
        let class_name = local[first + CLASS_NAME_SEPARATOR.len_utf8()..last].to_string();
        let name = local[last + CLASS_NAME_SEPARATOR.len_utf8()..].to_string();
        (name, Some(class_name))
    } else {
        let name = local.strip_prefix("x_").unwrap_or(local).to_string();
        (name, None)
    }
}

/// Runtime support inlined at the top of every mutated file. The dispatch
/// flag is read once at import into a module constant, so the hot call
/// path never touches the environment.
pub const PREAMBLE: &str = r#"from os import environ as _mutation_environ
from typing import Annotated, Callable, ClassVar, Dict

MutantDict = Annotated[Dict[str, Callable], "Mutant"]

_MUTANT_UNDER_TEST = _mutation_environ.get('MUTANT_UNDER_TEST', '')


class MutationForcedFail(Exception):
    pass


if _MUTANT_UNDER_TEST == 'stats':
    from _mutation_registry import record_hit as _mutation_record_hit


def _mutation_trampoline(orig, mutants, call_args, call_kwargs, self_arg=None):
    if _MUTANT_UNDER_TEST == 'fail':
        raise MutationForcedFail('failed programmatically')
    if _MUTANT_UNDER_TEST == 'stats':
        _mutation_record_hit(orig.__module__ + '.' + orig.__name__)
        return orig(*call_args, **call_kwargs)
    prefix = orig.__module__ + '.' + orig.__name__ + '__mutant_'
    if not _MUTANT_UNDER_TEST.startswith(prefix):
        return orig(*call_args, **call_kwargs)
    mutant_name = _MUTANT_UNDER_TEST.rpartition('.')[-1]
    if self_arg is not None:
        return mutants[mutant_name](self_arg, *call_args, **call_kwargs)
    return mutants[mutant_name](*call_args, **call_kwargs)


def _mutation_yield_from_trampoline(orig, mutants, call_args, call_kwargs, self_arg=None):
    if _MUTANT_UNDER_TEST == 'fail':
        raise MutationForcedFail('failed programmatically')
    if _MUTANT_UNDER_TEST == 'stats':
        _mutation_record_hit(orig.__module__ + '.' + orig.__name__)
        result = yield from orig(*call_args, **call_kwargs)
        return result
    prefix = orig.__module__ + '.' + orig.__name__ + '__mutant_'
    if not _MUTANT_UNDER_TEST.startswith(prefix):
        result = yield from orig(*call_args, **call_kwargs)
        return result
    mutant_name = _MUTANT_UNDER_TEST.rpartition('.')[-1]
    if self_arg is not None:
        result = yield from mutants[mutant_name](self_arg, *call_args, **call_kwargs)
    else:
        result = yield from mutants[mutant_name](*call_args, **call_kwargs)
    return result
"#;

/// Rendered replacement for one function: the original body renamed, one
/// renamed body per mutation site, the mutants dict, the dispatch wrapper
/// under the original name, and the name fixup the prefix check relies on.
pub struct RenderedFunction {
    pub text: String,
    /// Full mutant identities, in generation order.
    pub mutant_names: Vec<String>,
    /// Identity → human-readable description of the change.
    pub descriptions: BTreeMap<String, String>,
}

pub fn render_function(source: &str, func: &MutableFunction, module: &str) -> RenderedFunction {
    let mangled = mangle_function_name(&func.name, func.class_name.as_deref());
    let func_text = &source[func.start_byte..func.end_byte];
    let name_range = (
        func.name_start - func.start_byte,
        func.name_end - func.start_byte,
    );

    // Sliced copies keep the absolute indentation they had in the file;
    // synthesized parts are written flush-left and reindented on assembly.
    let mut parts: Vec<(String, bool)> = Vec::new();
    parts.push((splice(func_text, name_range, &format!("{mangled}__orig")), false));

    let mut mutant_names = Vec::new();
    let mut descriptions = BTreeMap::new();
    let mut local_names = Vec::new();
    for (i, site) in func.sites.iter().enumerate() {
        let ordinal = i + 1;
        let local = format!("{mangled}{MUTANT_SEPARATOR}{ordinal}");
        let key = mutant_key(module, &mangled, ordinal);
        let site_range = (site.start_byte - func.start_byte, site.end_byte - func.start_byte);
        let body = splice(
            &splice(func_text, site_range, &site.replacement),
            name_range,
            &local,
        );
        parts.push((body, false));
        descriptions.insert(
            key.clone(),
            format!(
                "line {}: replaced `{}` with `{}`",
                site.line, site.original, site.replacement
            ),
        );
        mutant_names.push(key);
        local_names.push(local);
    }

    parts.push((render_mutants_dict(&mangled, &local_names), true));
    parts.push((render_wrapper(func, &mangled), true));
    parts.push((format!("{mangled}__orig.__name__ = '{mangled}'"), true));

    let mut text = String::new();
    for (i, (part, needs_reindent)) in parts.iter().enumerate() {
        if i > 0 {
            text.push_str("\n\n");
            text.push_str(&func.indent);
        }
        if *needs_reindent {
            text.push_str(&reindent(part, &func.indent));
        } else {
            text.push_str(part);
        }
    }

    RenderedFunction {
        text,
        mutant_names,
        descriptions,
    }
}

fn render_mutants_dict(mangled: &str, local_names: &[String]) -> String {
    let entries: Vec<String> = local_names
        .iter()
        .map(|local| format!("    '{local}': {local}"))
        .collect();
    format!(
        "{mangled}__mutants : ClassVar[MutantDict] = {{\n{}\n}}",
        entries.join(",\n")
    )
}

fn render_wrapper(func: &MutableFunction, mangled: &str) -> String {
    let short = &func.name;
    let mut out = String::new();
    for decorator in &func.decorators {
        out.push_str(decorator);
        out.push('\n');
    }
    let (orig_ref, mutants_ref, self_param, self_arg) = if func.class_name.is_some() {
        (
            format!("object.__getattribute__(self, \"{mangled}__orig\")"),
            format!("object.__getattribute__(self, \"{mangled}__mutants\")"),
            "self, ",
            ", self",
        )
    } else {
        (
            format!("{mangled}__orig"),
            format!("{mangled}__mutants"),
            "",
            "",
        )
    };
    if func.is_generator {
        out.push_str(&format!(
            "def {short}({self_param}*args, **kwargs):\n    result = yield from _mutation_yield_from_trampoline({orig_ref}, {mutants_ref}, args, kwargs{self_arg})\n    return result"
        ));
    } else {
        out.push_str(&format!(
            "def {short}({self_param}*args, **kwargs):\n    return _mutation_trampoline({orig_ref}, {mutants_ref}, args, kwargs{self_arg})"
        ));
    }
    out
}

/// Replace `range` of `text` with `replacement`.
fn splice(text: &str, range: (usize, usize), replacement: &str) -> String {
    let mut out = String::with_capacity(text.len() + replacement.len());
    out.push_str(&text[..range.0]);
    out.push_str(replacement);
    out.push_str(&text[range.1..]);
    out
}

/// Prefix every line after the first with `indent`. Empty lines are left
/// empty rather than padded with trailing whitespace.
fn reindent(text: &str, indent: &str) -> String {
    if indent.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(indent);
            }
        }
        out.push_str(line);
    }
    out
}
