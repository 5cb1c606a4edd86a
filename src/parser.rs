use tree_sitter::{Node, Parser};

use crate::operators;

/// One eligible transformation at one AST location, with byte offsets into
/// the enclosing file.
#[derive(Debug, Clone)]
pub struct MutationSite {
    pub line: usize,
    pub column: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub operator: String,
    pub original: String,
    pub replacement: String,
}

/// A function the generator can replace wholesale: a top-level `def` or a
/// class-scoped `def` taking `self`.
#[derive(Debug, Clone)]
pub struct MutableFunction {
    pub name: String,
    pub class_name: Option<String>,
    /// Byte range of the `def` itself.
    pub start_byte: usize,
    pub end_byte: usize,
    /// Start of the replacement splice: the first decorator when the
    /// function is decorated, otherwise `start_byte`.
    pub replace_start: usize,
    /// Byte range of the function's name identifier.
    pub name_start: usize,
    pub name_end: usize,
    pub decorators: Vec<String>,
    /// Leading whitespace of the `def` line, applied to generated lines.
    pub indent: String,
    pub is_generator: bool,
    pub sites: Vec<MutationSite>,
}

pub fn parse_module(source: &str) -> tree_sitter::Tree {
    let mut parser = Parser::new();
    let language = tree_sitter_python::LANGUAGE;
    parser
        .set_language(&language.into())
        .expect("Failed to set Python grammar");
    parser.parse(source, None).expect("Failed to parse source")
}

/// Enumerate the functions eligible for mutation, in document order, each
/// with the ordered mutation sites found in its body.
pub fn discover_functions(source: &str) -> Vec<MutableFunction> {
    let tree = parse_module(source);
    let root = tree.root_node();
    let mut functions = Vec::new();

    for i in 0..root.child_count() {
        let Some(child) = root.child(i) else { continue };
        match child.kind() {
            "function_definition" => {
                collect_function(child, &[], None, source, &mut functions);
            }
            "decorated_definition" => {
                collect_decorated(child, None, source, &mut functions);
            }
            "class_definition" => {
                collect_class_methods(child, source, &mut functions);
            }
            _ => {}
        }
    }

    functions
}

fn collect_class_methods(class_node: Node, source: &str, out: &mut Vec<MutableFunction>) {
    let Some(name_node) = class_node.child_by_field_name("name") else {
        return;
    };
    let class_name = node_text(name_node, source).to_string();
    let Some(body) = class_node.child_by_field_name("body") else {
        return;
    };
    for i in 0..body.child_count() {
        let Some(child) = body.child(i) else { continue };
        match child.kind() {
            "function_definition" => {
                collect_function(child, &[], Some(class_name.clone()), source, out);
            }
            "decorated_definition" => {
                collect_decorated(child, Some(class_name.clone()), source, out);
            }
            _ => {}
        }
    }
}

fn collect_decorated(
    node: Node,
    class_name: Option<String>,
    source: &str,
    out: &mut Vec<MutableFunction>,
) {
    let Some(def) = node.child_by_field_name("definition") else {
        return;
    };
    if def.kind() != "function_definition" {
        return;
    }
    let mut decorators = Vec::new();
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.kind() == "decorator" {
                decorators.push(node_text(child, source).to_string());
            }
        }
    }
    let mut collected = Vec::new();
    collect_function(def, &decorators, class_name, source, &mut collected);
    for mut f in collected {
        f.replace_start = node.start_byte();
        out.push(f);
    }
}

fn collect_function(
    func_node: Node,
    decorators: &[String],
    class_name: Option<String>,
    source: &str,
    out: &mut Vec<MutableFunction>,
) {
    let Some(name_node) = func_node.child_by_field_name("name") else {
        return;
    };
    let name = node_text(name_node, source).to_string();
    // Dunders carry protocol obligations the dispatch wrapper would break.
    if name.starts_with("__") {
        return;
    }
    // Methods are dispatched through a bound receiver; class-scoped
    // functions without `self` (staticmethods and friends) are left alone.
    if class_name.is_some() && !first_param_is_self(func_node, source) {
        return;
    }

    let is_async = func_node
        .child(0)
        .map(|c| c.kind() == "async")
        .unwrap_or(false);
    let is_generator = !is_async && contains_own_yield(func_node);

    let mut sites = Vec::new();
    walk_node(func_node, source, &mut sites);

    let start_byte = func_node.start_byte();
    let line_start = source[..start_byte].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let indent = source[line_start..start_byte].to_string();

    out.push(MutableFunction {
        name,
        class_name,
        start_byte,
        end_byte: func_node.end_byte(),
        replace_start: start_byte,
        name_start: name_node.start_byte(),
        name_end: name_node.end_byte(),
        decorators: decorators.to_vec(),
        indent,
        is_generator,
        sites,
    });
}

fn first_param_is_self(func_node: Node, source: &str) -> bool {
    let Some(params) = func_node.child_by_field_name("parameters") else {
        return false;
    };
    for i in 0..params.named_child_count() {
        if let Some(param) = params.named_child(i) {
            return param.kind() == "identifier" && node_text(param, source) == "self";
        }
    }
    false
}

/// True when the function body yields at its own scope, excluding yields
/// inside nested defs and lambdas.
fn contains_own_yield(func_node: Node) -> bool {
    fn search(node: Node, root: bool) -> bool {
        if !root && matches!(node.kind(), "function_definition" | "lambda") {
            return false;
        }
        if node.kind() == "yield" {
            return true;
        }
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                if search(child, false) {
                    return true;
                }
            }
        }
        false
    }
    func_node
        .child_by_field_name("body")
        .map(|body| search(body, true))
        .unwrap_or(false)
}

fn walk_node(node: Node, source: &str, sites: &mut Vec<MutationSite>) {
    if should_skip_node(node, source) {
        return;
    }

    match node.kind() {
        "comparison_operator" => collect_comparison_sites(node, source, sites),
        "boolean_operator" => collect_boolean_operator_sites(node, source, sites),
        "not_operator" => collect_not_operator_sites(node, source, sites),
        "binary_operator" => collect_arithmetic_sites(node, source, sites),
        "integer" | "float" => collect_number_sites(node, source, sites),
        "string" => collect_string_sites(node, source, sites),
        "true" | "false" => collect_boolean_literal_sites(node, source, sites),
        "return_statement" => collect_return_sites(node, source, sites),
        "break_statement" | "continue_statement" => collect_loop_control_sites(node, source, sites),
        _ => {}
    }

    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            walk_node(child, source, sites);
        }
    }
}

/// Skip nodes that are not business logic: print/logging calls, docstrings,
/// and type annotations (mutating an annotation yields an unkillable
/// mutant, since annotations are never evaluated).
fn should_skip_node(node: Node, source: &str) -> bool {
    if node.kind() == "type" {
        return true;
    }
    if node.kind() == "call" {
        if let Some(func) = node.child(0) {
            let text = node_text(func, source);
            if text == "print"
                || text.starts_with("logging.")
                || text.starts_with("logger.")
                || text.starts_with("log.")
            {
                return true;
            }
        }
    }
    if node.kind() == "expression_statement" && node.child_count() == 1 {
        if let Some(child) = node.child(0) {
            if child.kind() == "string" {
                return true;
            }
        }
    }
    false
}

fn node_text<'a>(node: Node<'a>, source: &'a str) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}

fn push_sites(node: Node, source: &str, ops: Vec<operators::MutationOp>, sites: &mut Vec<MutationSite>) {
    let original = node_text(node, source);
    for op in ops {
        sites.push(MutationSite {
            line: node.start_position().row + 1,
            column: node.start_position().column + 1,
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            operator: op.operator_name.to_string(),
            original: original.to_string(),
            replacement: op.replacement,
        });
    }
}

fn collect_comparison_sites(node: Node, source: &str, sites: &mut Vec<MutationSite>) {
    for i in 0..node.child_count() {
        let Some(child) = node.child(i) else { continue };
        match child.kind() {
            "<" | ">" | "<=" | ">=" | "==" | "!=" | "is" | "in" | "is not" | "not in" => {
                let ops = operators::comparison_mutations(node_text(child, source));
                push_sites(child, source, ops, sites);
            }
            _ => {}
        }
    }
}

fn collect_boolean_operator_sites(node: Node, source: &str, sites: &mut Vec<MutationSite>) {
    for i in 0..node.child_count() {
        let Some(child) = node.child(i) else { continue };
        if child.kind() == "and" || child.kind() == "or" {
            let ops = operators::logical_mutations(node_text(child, source));
            push_sites(child, source, ops, sites);
        }
    }
}

fn collect_not_operator_sites(node: Node, source: &str, sites: &mut Vec<MutationSite>) {
    let Some(not_kw) = node.child(0) else { return };
    if not_kw.kind() != "not" {
        return;
    }
    let Some(operand) = node.child(1) else { return };
    sites.push(MutationSite {
        line: not_kw.start_position().row + 1,
        column: not_kw.start_position().column + 1,
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        operator: "negate_remove".to_string(),
        original: node_text(node, source).to_string(),
        replacement: node_text(operand, source).to_string(),
    });
}

fn collect_arithmetic_sites(node: Node, source: &str, sites: &mut Vec<MutationSite>) {
    for i in 0..node.child_count() {
        let Some(child) = node.child(i) else { continue };
        let kind = child.kind();
        if matches!(kind, "+" | "-" | "*" | "/" | "//" | "%" | "**") {
            // Leave string concatenation alone.
            if kind == "+" {
                if let Some(left) = node.child(0) {
                    if left.kind() == "string" || left.kind() == "concatenated_string" {
                        continue;
                    }
                }
            }
            let ops = operators::arithmetic_mutations(node_text(child, source));
            push_sites(child, source, ops, sites);
        }
    }
}

fn collect_number_sites(node: Node, source: &str, sites: &mut Vec<MutationSite>) {
    let ops = operators::number_mutations(node_text(node, source));
    push_sites(node, source, ops, sites);
}

fn collect_string_sites(node: Node, source: &str, sites: &mut Vec<MutationSite>) {
    let ops = operators::string_mutations(node_text(node, source));
    push_sites(node, source, ops, sites);
}

fn collect_boolean_literal_sites(node: Node, source: &str, sites: &mut Vec<MutationSite>) {
    // Return-position booleans are covered by the return mutations.
    if let Some(parent) = node.parent() {
        if parent.kind() == "return_statement" {
            return;
        }
    }
    let ops = operators::boolean_mutations(node_text(node, source));
    push_sites(node, source, ops, sites);
}

fn collect_return_sites(node: Node, source: &str, sites: &mut Vec<MutationSite>) {
    // Bare `return` is already `return None`; nothing to mutate.
    if node.child_count() < 2 {
        return;
    }
    let Some(expr) = node.child(1) else { return };
    if expr.kind() == "yield" {
        return;
    }
    let ops = operators::return_mutations(node_text(expr, source));
    push_sites(node, source, ops, sites);
}

fn collect_loop_control_sites(node: Node, source: &str, sites: &mut Vec<MutationSite>) {
    let ops = operators::loop_control_mutations(node_text(node, source));
    push_sites(node, source, ops, sites);
}
