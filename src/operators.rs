/// Mutation operator catalogue for Python. Fixed and file-scoped; each
/// entry names the transformation kind and the replacement text spliced
/// into a mutant body.

pub struct MutationOp {
    pub operator_name: &'static str,
    pub replacement: String,
}

fn op(operator_name: &'static str, replacement: &str) -> MutationOp {
    MutationOp {
        operator_name,
        replacement: replacement.to_string(),
    }
}

/// Comparison operators: boundary shifts and outright negations.
pub fn comparison_mutations(op_text: &str) -> Vec<MutationOp> {
    match op_text {
        ">" => vec![op("boundary", ">="), op("negate_cmp", "<=")],
        ">=" => vec![op("boundary", ">"), op("negate_cmp", "<")],
        "<" => vec![op("boundary", "<="), op("negate_cmp", ">=")],
        "<=" => vec![op("boundary", "<"), op("negate_cmp", ">")],
        "==" => vec![op("negate_eq", "!=")],
        "!=" => vec![op("negate_eq", "==")],
        "is" => vec![op("negate_is", "is not")],
        "is not" => vec![op("negate_is", "is")],
        "in" => vec![op("negate_in", "not in")],
        "not in" => vec![op("negate_in", "in")],
        _ => vec![],
    }
}

pub fn boolean_mutations(text: &str) -> Vec<MutationOp> {
    match text {
        "True" => vec![op("bool_flip", "False")],
        "False" => vec![op("bool_flip", "True")],
        _ => vec![],
    }
}

pub fn logical_mutations(op_text: &str) -> Vec<MutationOp> {
    match op_text {
        "and" => vec![op("logic_flip", "or")],
        "or" => vec![op("logic_flip", "and")],
        _ => vec![],
    }
}

pub fn arithmetic_mutations(op_text: &str) -> Vec<MutationOp> {
    match op_text {
        "+" => vec![op("arith", "-")],
        "-" => vec![op("arith", "+")],
        "*" => vec![op("arith", "/")],
        "/" => vec![op("arith", "*")],
        "//" => vec![op("arith", "/")],
        "%" => vec![op("arith", "/")],
        "**" => vec![op("arith", "*")],
        _ => vec![],
    }
}

/// Integer and float literals get nudged by one. Only plain decimal
/// literals are touched; hex/octal/binary/underscored forms are left
/// alone rather than risk rendering something the target did not mean.
pub fn number_mutations(text: &str) -> Vec<MutationOp> {
    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = text.parse::<u64>() {
            return vec![MutationOp {
                operator_name: "number",
                replacement: (n + 1).to_string(),
            }];
        }
    }
    if text.contains('.') && !text.contains(['e', 'E', '_', 'j', 'J']) {
        if let Ok(f) = text.parse::<f64>() {
            return vec![MutationOp {
                operator_name: "number",
                replacement: format!("{:?}", f + 1.0),
            }];
        }
    }
    vec![]
}

/// Pad plain string literals so equality checks and lookups keyed on them
/// fail. Prefixed strings (f/r/b) and empty strings are skipped.
pub fn string_mutations(text: &str) -> Vec<MutationOp> {
    let quote = match text.chars().next() {
        Some(c @ ('"' | '\'')) => c,
        _ => return vec![],
    };
    if text.len() < 2 || !text.ends_with(quote) {
        return vec![];
    }
    let inner = &text[1..text.len() - 1];
    if inner.is_empty() || inner.contains(quote) {
        return vec![];
    }
    vec![MutationOp {
        operator_name: "string_pad",
        replacement: format!("{quote}XX{inner}XX{quote}"),
    }]
}

pub fn loop_control_mutations(keyword: &str) -> Vec<MutationOp> {
    match keyword {
        "break" => vec![op("loop_flow", "continue")],
        "continue" => vec![op("loop_flow", "break")],
        _ => vec![],
    }
}

/// Return value mutations, keyed on the shape of the returned expression.
pub fn return_mutations(return_value: &str) -> Vec<MutationOp> {
    let trimmed = return_value.trim();
    if trimmed == "None" {
        vec![op("return_val", "return \"\"")]
    } else if trimmed == "True" {
        vec![op("return_val", "return False")]
    } else if trimmed == "False" {
        vec![op("return_val", "return True")]
    } else {
        vec![op("return_val", "return None")]
    }
}
