use pymutor::operators;

// --- comparison_mutations ---

#[test]
fn greater_than_gets_boundary_and_negation() {
    let ops = operators::comparison_mutations(">");
    let replacements: Vec<&str> = ops.iter().map(|o| o.replacement.as_str()).collect();
    assert_eq!(replacements, vec![">=", "<="]);
}

#[test]
fn less_equal_gets_boundary_and_negation() {
    let ops = operators::comparison_mutations("<=");
    let replacements: Vec<&str> = ops.iter().map(|o| o.replacement.as_str()).collect();
    assert_eq!(replacements, vec!["<", ">"]);
}

#[test]
fn equality_gets_single_negation() {
    let ops = operators::comparison_mutations("==");
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].replacement, "!=");
}

#[test]
fn is_and_in_negate() {
    assert_eq!(operators::comparison_mutations("is")[0].replacement, "is not");
    assert_eq!(operators::comparison_mutations("is not")[0].replacement, "is");
    assert_eq!(operators::comparison_mutations("in")[0].replacement, "not in");
    assert_eq!(operators::comparison_mutations("not in")[0].replacement, "in");
}

#[test]
fn unknown_comparison_yields_nothing() {
    assert!(operators::comparison_mutations("<=>").is_empty());
}

// --- boolean_mutations ---

#[test]
fn booleans_flip() {
    assert_eq!(operators::boolean_mutations("True")[0].replacement, "False");
    assert_eq!(operators::boolean_mutations("False")[0].replacement, "True");
    assert!(operators::boolean_mutations("None").is_empty());
}

// --- logical_mutations ---

#[test]
fn and_or_flip() {
    assert_eq!(operators::logical_mutations("and")[0].replacement, "or");
    assert_eq!(operators::logical_mutations("or")[0].replacement, "and");
}

// --- arithmetic_mutations ---

#[test]
fn arithmetic_operators_swap() {
    assert_eq!(operators::arithmetic_mutations("+")[0].replacement, "-");
    assert_eq!(operators::arithmetic_mutations("-")[0].replacement, "+");
    assert_eq!(operators::arithmetic_mutations("*")[0].replacement, "/");
    assert_eq!(operators::arithmetic_mutations("//")[0].replacement, "/");
    assert_eq!(operators::arithmetic_mutations("**")[0].replacement, "*");
}

// --- number_mutations ---

#[test]
fn integers_are_nudged_up() {
    assert_eq!(operators::number_mutations("0")[0].replacement, "1");
    assert_eq!(operators::number_mutations("41")[0].replacement, "42");
}

#[test]
fn floats_are_nudged_up() {
    assert_eq!(operators::number_mutations("1.5")[0].replacement, "2.5");
}

#[test]
fn exotic_number_forms_are_left_alone() {
    assert!(operators::number_mutations("0x1f").is_empty());
    assert!(operators::number_mutations("0b101").is_empty());
    assert!(operators::number_mutations("1_000").is_empty());
    assert!(operators::number_mutations("1e6").is_empty());
    assert!(operators::number_mutations("3j").is_empty());
}

// --- string_mutations ---

#[test]
fn plain_strings_are_padded() {
    assert_eq!(
        operators::string_mutations("\"hello\"")[0].replacement,
        "\"XXhelloXX\""
    );
    assert_eq!(
        operators::string_mutations("'hello'")[0].replacement,
        "'XXhelloXX'"
    );
}

#[test]
fn empty_and_prefixed_strings_are_skipped() {
    assert!(operators::string_mutations("\"\"").is_empty());
    assert!(operators::string_mutations("f\"x{y}\"").is_empty());
    assert!(operators::string_mutations("r'raw'").is_empty());
}

// --- loop_control_mutations ---

#[test]
fn break_and_continue_swap() {
    assert_eq!(operators::loop_control_mutations("break")[0].replacement, "continue");
    assert_eq!(operators::loop_control_mutations("continue")[0].replacement, "break");
}

// --- return_mutations ---

#[test]
fn return_none_becomes_empty_string() {
    assert_eq!(operators::return_mutations("None")[0].replacement, "return \"\"");
}

#[test]
fn return_booleans_flip() {
    assert_eq!(operators::return_mutations("True")[0].replacement, "return False");
    assert_eq!(operators::return_mutations("False")[0].replacement, "return True");
}

#[test]
fn return_expression_becomes_none() {
    assert_eq!(
        operators::return_mutations("a + b")[0].replacement,
        "return None"
    );
}
