//! Word Expansion
//!
//! Main entry point for shell word expansion.
//!
//! Handles shell word expansion including:
//! - Variable expansion ($VAR, ${VAR})
//! - Command substitution $(...)
//! - Arithmetic expansion $((...)
//! - Tilde expansion (~)
//! - Brace expansion {a,b,c}
//! - Glob expansion (*, ?, [...])
//!
//! This module provides the high-level expansion functions.
//! The actual expansion logic is implemented in the expansion/ submodules.
//! Command substitution requires runtime dependencies (script execution).

use crate::ast::types::{
    WordNode, WordPart, LiteralPart, SingleQuotedPart, DoubleQuotedPart,
    ParameterExpansionPart, CommandSubstitutionPart, ArithmeticExpansionPart,
    TildeExpansionPart, GlobPart, BraceExpansionPart, ScriptNode,
};
use crate::interpreter::types::{ExecResult, InterpreterState};

// Re-export commonly used expansion functions
pub use crate::interpreter::expansion::analysis::*;
pub use crate::interpreter::expansion::brace_range::*;
pub use crate::interpreter::expansion::glob_escape::*;
pub use crate::interpreter::expansion::pattern::*;
pub use crate::interpreter::expansion::pattern_removal::*;
pub use crate::interpreter::expansion::quoting::*;
pub use crate::interpreter::expansion::tilde::*;
pub use crate::interpreter::expansion::variable::*;
pub use crate::interpreter::expansion::word_split::*;

/// Result of word expansion.
#[derive(Debug, Clone)]
pub struct WordExpansionResult {
    /// The expanded string value
    pub value: String,
    /// Whether the expansion produced multiple words (from word splitting)
    pub split_words: Option<Vec<String>>,
    /// Any stderr output from command substitutions
    pub stderr: String,
    /// Exit code from command substitutions (if any)
    pub exit_code: Option<i32>,
}

impl WordExpansionResult {
    /// Create a simple result with just a value.
    pub fn simple(value: String) -> Self {
        Self {
            value,
            split_words: None,
            stderr: String::new(),
            exit_code: None,
        }
    }

    /// Create a result with split words.
    pub fn with_split(value: String, words: Vec<String>) -> Self {
        Self {
            value,
            split_words: Some(words),
            stderr: String::new(),
            exit_code: None,
        }
    }
}

/// Options for word expansion.
#[derive(Debug, Clone, Default)]
pub struct WordExpansionOptions {
    /// Whether we're inside double quotes
    pub in_double_quotes: bool,
    /// Whether to perform word splitting
    pub do_word_split: bool,
    /// Whether to perform glob expansion
    pub do_glob: bool,
    /// Whether to preserve empty fields
    pub preserve_empty: bool,
    /// Whether extglob is enabled
    pub extglob: bool,
}

/// Callback type for command substitution execution.
///
/// The runtime must provide this callback to execute command substitutions.
/// It takes the command string and returns the execution result.
pub type CommandSubstitutionFn = Box<dyn Fn(&str, &mut InterpreterState) -> ExecResult + Send + Sync>;

/// Expand a word without glob expansion.
///
/// This performs all expansions except glob expansion:
/// - Tilde expansion
/// - Parameter expansion
/// - Command substitution (requires callback)
/// - Arithmetic expansion
/// - Brace expansion
/// - Quote removal
///
/// For command substitution, if no callback is provided, $(...) and `...`
/// are left unexpanded.
pub fn expand_word_no_glob(
    state: &InterpreterState,
    word: &WordNode,
    options: &WordExpansionOptions,
) -> WordExpansionResult {
    let mut result = String::new();

    for part in &word.parts {
        result.push_str(&expand_part_no_glob(state, part, options));
    }

    WordExpansionResult::simple(result)
}

/// Expand a single word part without glob expansion.
fn expand_part_no_glob(
    state: &InterpreterState,
    part: &WordPart,
    options: &WordExpansionOptions,
) -> String {
    use crate::interpreter::helpers::word_parts::get_literal_value;
    use crate::interpreter::expansion::tilde::apply_tilde_expansion;
    use crate::interpreter::expansion::variable::get_variable;

    // Handle literal parts
    if let Some(literal) = get_literal_value(part) {
        return literal.to_string();
    }

    match part {
        WordPart::TildeExpansion(tilde) => {
            // Tilde expansion doesn't happen inside double quotes
            if options.in_double_quotes {
                return match &tilde.user {
                    Some(u) => format!("~{}", u),
                    None => "~".to_string(),
                };
            }
            // apply_tilde_expansion expects a &str value, not Option<&str>
            // For TildeExpansionPart, we construct the tilde string
            let tilde_str = match &tilde.user {
                Some(u) => format!("~{}", u),
                None => "~".to_string(),
            };
            apply_tilde_expansion(state, &tilde_str)
        }
        WordPart::ParameterExpansion(param) => {
            // Simple variable expansion
            get_variable(state, &param.parameter)
        }
        WordPart::DoubleQuoted(dq) => {
            // Expand contents of double quotes
            let inner_options = WordExpansionOptions {
                in_double_quotes: true,
                ..options.clone()
            };
            let mut result = String::new();
            for inner_part in &dq.parts {
                result.push_str(&expand_part_no_glob(state, inner_part, &inner_options));
            }
            result
        }
        WordPart::CommandSubstitution(_) => {
            // Command substitution requires runtime callback
            // Return empty string if no callback provided
            String::new()
        }
        WordPart::ArithmeticExpansion(arith) => {
            // Arithmetic expansion
            use crate::interpreter::arithmetic::evaluate_arithmetic;
            use crate::interpreter::types::{ExecutionLimits, InterpreterContext};

            // Evaluate the expression
            // Note: This creates a temporary mutable state, which is not ideal
            // In a real implementation, the state should be passed mutably
            let limits = ExecutionLimits::default();
            let mut state_clone = state.clone();
            let mut ctx = InterpreterContext::new(&mut state_clone, &limits);
            match evaluate_arithmetic(&mut ctx, &arith.expression.expression, false) {
                Ok(value) => value.to_string(),
                Err(_) => "0".to_string(),
            }
        }
        WordPart::Glob(glob) => {
            // In non-glob mode, return the pattern as-is
            glob.pattern.clone()
        }
        WordPart::BraceExpansion(_) => {
            // Brace expansion is complex and typically handled at a higher level
            // For now, return empty
            String::new()
        }
        _ => String::new(),
    }
}

/// Check if a word is "fully quoted" - meaning glob characters should be treated literally.
///
/// A word is fully quoted if all its parts are either:
/// - SingleQuoted
/// - DoubleQuoted (entirely quoted variable expansion like "$pat")
/// - Escaped characters
pub fn is_word_fully_quoted(word: &WordNode) -> bool {
    use crate::interpreter::helpers::word_parts::is_quoted_part;

    // Empty word is considered quoted (matches empty pattern literally)
    if word.parts.is_empty() {
        return true;
    }

    // Check if we have any unquoted parts with actual content
    for part in &word.parts {
        if !is_quoted_part(part) {
            return false;
        }
    }
    true
}

/// Check if a word contains any glob patterns.
pub fn word_has_glob_pattern(word: &WordNode, extglob: bool) -> bool {
    use crate::interpreter::expansion::glob_escape::has_glob_pattern;

    for part in &word.parts {
        match part {
            WordPart::Glob(_) => return true,
            WordPart::Literal(lit) => {
                if has_glob_pattern(&lit.value, extglob) {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// Callback used to run a parsed command substitution body and capture its
/// output. Implemented by the execution engine, which recursively calls
/// back into `execute_script`.
pub type CommandSubstFn<'a> = dyn Fn(&ScriptNode, &mut InterpreterState) -> ExecResult + 'a;

/// Strip a single trailing run of newlines, the way `$(...)` and `` `...` ``
/// do when capturing command output.
fn strip_command_subst_trailing_newlines(mut s: String) -> String {
    while s.ends_with('\n') {
        s.pop();
    }
    s
}

/// Fully expand a word: variables, arithmetic, command substitution, tilde
/// and brace expansion, quote removal. Does not perform pathname (glob)
/// expansion or IFS word splitting - see [`expand_word_with_glob`] for the
/// complete pipeline the executor actually uses for command arguments.
pub fn expand_word(
    state: &mut InterpreterState,
    word: &WordNode,
    options: &WordExpansionOptions,
    exec_fn: Option<&CommandSubstFn>,
) -> WordExpansionResult {
    let mut value = String::new();
    let mut stderr = String::new();
    let mut exit_code = None;

    for part in &word.parts {
        let piece = expand_part(state, part, options, exec_fn, &mut stderr, &mut exit_code);
        value.push_str(&piece);
    }

    WordExpansionResult { value, split_words: None, stderr, exit_code }
}

fn expand_part(
    state: &mut InterpreterState,
    part: &WordPart,
    options: &WordExpansionOptions,
    exec_fn: Option<&CommandSubstFn>,
    stderr: &mut String,
    exit_code: &mut Option<i32>,
) -> String {
    use crate::interpreter::expansion::tilde::apply_tilde_expansion;
    use crate::interpreter::expansion::variable::get_variable;
    use crate::interpreter::helpers::word_parts::get_literal_value;

    if let Some(literal) = get_literal_value(part) {
        return literal.to_string();
    }

    match part {
        WordPart::TildeExpansion(tilde) => {
            if options.in_double_quotes {
                return match &tilde.user {
                    Some(u) => format!("~{}", u),
                    None => "~".to_string(),
                };
            }
            let tilde_str = match &tilde.user {
                Some(u) => format!("~{}", u),
                None => "~".to_string(),
            };
            apply_tilde_expansion(state, &tilde_str)
        }
        WordPart::ParameterExpansion(param) => {
            expand_parameter_expansion(state, options, exec_fn, stderr, exit_code, param)
        }
        WordPart::SingleQuoted(sq) => sq.value.clone(),
        WordPart::Escaped(e) => e.character.to_string(),
        WordPart::DoubleQuoted(dq) => {
            let inner_options = WordExpansionOptions { in_double_quotes: true, ..options.clone() };
            let mut result = String::new();
            for inner_part in &dq.parts {
                result.push_str(&expand_part(state, inner_part, &inner_options, exec_fn, stderr, exit_code));
            }
            result
        }
        WordPart::CommandSubstitution(subst) => {
            let Some(exec_fn) = exec_fn else { return String::new() };
            let result = exec_fn(&subst.body, state);
            stderr.push_str(&result.stderr);
            *exit_code = Some(result.exit_code);
            strip_command_subst_trailing_newlines(result.stdout)
        }
        WordPart::ArithmeticExpansion(arith) => {
            use crate::interpreter::arithmetic::evaluate_arithmetic;
            use crate::interpreter::types::{ExecutionLimits, InterpreterContext};

            let limits = ExecutionLimits::default();
            let mut ctx = InterpreterContext::new(state, &limits);
            match evaluate_arithmetic(&mut ctx, &arith.expression.expression, false, None) {
                Ok(value) => value.to_string(),
                Err(e) => {
                    stderr.push_str(&format!("bash: {}\n", e));
                    "0".to_string()
                }
            }
        }
        WordPart::Glob(glob) => glob.pattern.clone(),
        WordPart::BraceExpansion(_) => {
            // Brace expansion happens before word expansion, at the statement
            // level (a single word can expand into several). A surviving
            // BraceExpansionPart here means it was nested somewhere that
            // doesn't pre-expand (e.g. inside an unexpanded parameter
            // default); render it back out literally.
            let BraceExpansionPart { prefix, items, suffix } = glob_brace_ref(part);
            let mut rendered = String::new();
            rendered.push('{');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    rendered.push(',');
                }
                rendered.push_str(&item_to_string(item));
            }
            rendered.push('}');
            format!("{}{}{}", prefix, rendered, suffix)
        }
        _ => String::new(),
    }
}

/// Evaluate an arithmetic expression node in a throwaway `ExecutionLimits`
/// context, the same stopgap the substring/length operators below use for
/// offsets (`${var:start:len}`) that reference arithmetic.
fn eval_arith_node(
    state: &mut InterpreterState,
    node: &crate::ast::types::ArithmeticExpressionNode,
) -> i64 {
    use crate::interpreter::arithmetic::evaluate_arithmetic;
    use crate::interpreter::types::{ExecutionLimits, InterpreterContext};

    let limits = ExecutionLimits::default();
    let mut ctx = InterpreterContext::new(state, &limits);
    evaluate_arithmetic(&mut ctx, &node.expression, false, None).unwrap_or(0)
}

/// Expand a nested word (the default/alternative/pattern/replacement operand
/// of a parameter operation) down to a plain string.
fn expand_nested_word(
    state: &mut InterpreterState,
    word: &WordNode,
    options: &WordExpansionOptions,
    exec_fn: Option<&CommandSubstFn>,
    stderr: &mut String,
    exit_code: &mut Option<i32>,
) -> String {
    let mut out = String::new();
    for part in &word.parts {
        out.push_str(&expand_part(state, part, options, exec_fn, stderr, exit_code));
    }
    out
}

/// Dispatch a `${...}` parameter expansion to the right operator handler.
///
/// `param.parameter` is the bare name (or array subscript form) for every
/// operation except `Indirection`, where it is the name of the variable
/// holding the *referenced* parameter name.
fn expand_parameter_expansion(
    state: &mut InterpreterState,
    options: &WordExpansionOptions,
    exec_fn: Option<&CommandSubstFn>,
    stderr: &mut String,
    exit_code: &mut Option<i32>,
    param: &ParameterExpansionPart,
) -> String {
    use crate::ast::types::ParameterOperation;
    use crate::interpreter::expansion::indirect_expansion::expand_indirect_array;
    use crate::interpreter::expansion::parameter_ops::{get_array_keys, get_var_names_with_prefix_op};
    use crate::interpreter::expansion::variable::get_variable;

    let Some(op) = &param.operation else {
        return get_variable(state, &param.parameter);
    };

    match op {
        ParameterOperation::Inner(inner) => {
            expand_inner_parameter_op(state, &param.parameter, inner, options, exec_fn, stderr, exit_code)
        }
        ParameterOperation::Indirection(ind) => {
            // ${!ref} where ref holds an array reference like "arr[@]"/"arr[*]"
            if let Some(result) = expand_indirect_array(state, &param.parameter) {
                let ifs = get_ifs_for(state);
                return result.values.join(&ifs);
            }

            let resolved_name = get_variable(state, &param.parameter);
            match &ind.inner_op {
                None => get_variable(state, &resolved_name),
                Some(inner) => expand_inner_parameter_op(
                    state, &resolved_name, inner, options, exec_fn, stderr, exit_code,
                ),
            }
        }
        ParameterOperation::ArrayKeys(keys) => {
            let ifs = get_ifs_for(state);
            get_array_keys(state, &keys.array, keys.star).join(&ifs)
        }
        ParameterOperation::VarNamePrefix(prefix) => {
            let ifs = get_ifs_for(state);
            get_var_names_with_prefix_op(state, &prefix.prefix, prefix.star).join(&ifs)
        }
    }
}

fn get_ifs_for(state: &InterpreterState) -> String {
    state.env.get("IFS").cloned().unwrap_or_else(|| " ".to_string())
}

#[allow(clippy::too_many_arguments)]
fn expand_inner_parameter_op(
    state: &mut InterpreterState,
    parameter: &str,
    inner: &crate::ast::types::InnerParameterOperation,
    options: &WordExpansionOptions,
    exec_fn: Option<&CommandSubstFn>,
    stderr: &mut String,
    exit_code: &mut Option<i32>,
) -> String {
    use crate::ast::types::{InnerParameterOperation, PatternAnchor};
    use crate::interpreter::expansion::parameter_ops::{
        apply_case_modification, apply_pattern_removal_op, apply_pattern_replacement_op,
        apply_substring_op, apply_transform_op, get_parameter_length, should_use_alternative,
        should_use_default, ParameterOpContext,
    };
    use crate::interpreter::expansion::pattern::pattern_to_regex;

    let op_ctx = ParameterOpContext::new(state, parameter, options.in_double_quotes);

    match inner {
        InnerParameterOperation::DefaultValue(d) => {
            if should_use_default(&op_ctx, d.check_empty) {
                expand_nested_word(state, &d.word, options, exec_fn, stderr, exit_code)
            } else {
                op_ctx.value
            }
        }
        InnerParameterOperation::AssignDefault(a) => {
            if should_use_default(&op_ctx, a.check_empty) {
                let value = expand_nested_word(state, &a.word, options, exec_fn, stderr, exit_code);
                state.env.insert(parameter.to_string(), value.clone());
                value
            } else {
                op_ctx.value
            }
        }
        InnerParameterOperation::ErrorIfUnset(e) => {
            if should_use_default(&op_ctx, e.check_empty) {
                let message = match &e.word {
                    Some(w) => expand_nested_word(state, w, options, exec_fn, stderr, exit_code),
                    None => "parameter null or not set".to_string(),
                };
                stderr.push_str(&format!("bash: {}: {}\n", parameter, message));
                *exit_code = Some(1);
                String::new()
            } else {
                op_ctx.value
            }
        }
        InnerParameterOperation::UseAlternative(u) => {
            if should_use_alternative(&op_ctx, u.check_empty) {
                expand_nested_word(state, &u.word, options, exec_fn, stderr, exit_code)
            } else {
                String::new()
            }
        }
        InnerParameterOperation::Length(_) => get_parameter_length(state, parameter).to_string(),
        InnerParameterOperation::LengthSliceError(_) => {
            stderr.push_str("bash: bad substitution\n");
            *exit_code = Some(1);
            String::new()
        }
        InnerParameterOperation::BadSubstitution(b) => {
            stderr.push_str(&format!("bash: {}: bad substitution\n", b.text));
            *exit_code = Some(1);
            String::new()
        }
        InnerParameterOperation::Substring(s) => {
            let offset = eval_arith_node(state, &s.offset);
            let length = s.length.as_ref().map(|l| eval_arith_node(state, l));
            match apply_substring_op(&op_ctx.value, offset, length) {
                Ok(v) => v,
                Err(msg) => {
                    stderr.push_str(&format!("bash: {}: {}\n", parameter, msg));
                    *exit_code = Some(1);
                    String::new()
                }
            }
        }
        InnerParameterOperation::PatternRemoval(p) => {
            let pattern_str = expand_nested_word(state, &p.pattern, options, exec_fn, stderr, exit_code);
            let regex = pattern_to_regex(&pattern_str, p.greedy, options.extglob);
            apply_pattern_removal_op(&op_ctx.value, &regex, p.side, p.greedy)
        }
        InnerParameterOperation::PatternReplacement(p) => {
            let pattern_str = expand_nested_word(state, &p.pattern, options, exec_fn, stderr, exit_code);
            let replacement_str = match &p.replacement {
                Some(w) => expand_nested_word(state, w, options, exec_fn, stderr, exit_code),
                None => String::new(),
            };
            let regex = pattern_to_regex(&pattern_str, p.all, options.extglob);
            let anchor_start = matches!(p.anchor, Some(PatternAnchor::Start));
            let anchor_end = matches!(p.anchor, Some(PatternAnchor::End));
            apply_pattern_replacement_op(&op_ctx.value, &regex, &replacement_str, p.all, anchor_start, anchor_end)
        }
        InnerParameterOperation::CaseModification(c) => {
            // Pattern-restricted case modification (${var^^pattern}) isn't
            // distinguished here from the blanket form; only `direction`
            // and `all` drive the result.
            let operator = match (c.direction, c.all) {
                (crate::ast::types::CaseDirection::Upper, true) => "U",
                (crate::ast::types::CaseDirection::Upper, false) => "u",
                (crate::ast::types::CaseDirection::Lower, true) => "L",
                (crate::ast::types::CaseDirection::Lower, false) => "l",
            };
            apply_case_modification(&op_ctx.value, operator)
        }
        InnerParameterOperation::Transform(t) => {
            use crate::ast::types::TransformOperator;
            let operator = match t.operator {
                TransformOperator::Q => "Q",
                TransformOperator::P => "P",
                TransformOperator::A => "A",
                TransformOperator::LowerA => "a",
                TransformOperator::E => "E",
                TransformOperator::K => "K",
                TransformOperator::LowerK => "k",
                TransformOperator::LowerU => "u",
                TransformOperator::U => "U",
                TransformOperator::L => "L",
            };
            apply_transform_op(state, parameter, &op_ctx.value, operator)
        }
    }
}

fn glob_brace_ref(part: &WordPart) -> &BraceExpansionPart {
    match part {
        WordPart::BraceExpansion(b) => b,
        _ => unreachable!(),
    }
}

fn item_to_string(item: &BraceItem) -> String {
    match item {
        BraceItem::Literal(s) => s.clone(),
        BraceItem::Nested(parts) => parts
            .iter()
            .map(|p| get_item_part_literal(p))
            .collect::<Vec<_>>()
            .join(""),
    }
}

fn get_item_part_literal(part: &WordPart) -> String {
    use crate::interpreter::helpers::word_parts::get_literal_value;
    get_literal_value(part).map(|s| s.to_string()).unwrap_or_default()
}

/// Fully expand a word the way the executor needs it for command words and
/// arguments: [`expand_word`], then (unless quoted/noglob) IFS splitting and
/// pathname expansion.
pub fn expand_word_with_glob(
    state: &mut InterpreterState,
    word: &WordNode,
    exec_fn: Option<&CommandSubstFn>,
) -> WordExpansionResult {
    use crate::interpreter::expansion::word_split::smart_word_split_with_unquoted_literals;
    use crate::interpreter::expansion::word_glob_expansion::split_and_glob_expand;

    let quoted = is_word_fully_quoted(word);
    let options = WordExpansionOptions {
        in_double_quotes: false,
        do_word_split: !quoted,
        do_glob: !quoted,
        preserve_empty: quoted,
        extglob: state.shopt_options.extglob,
    };

    let expanded = expand_word(state, word, &options, exec_fn);

    if quoted {
        return expanded;
    }

    let ifs = state.env.get("IFS").cloned().unwrap_or_else(|| " \t\n".to_string());
    let split = smart_word_split_with_unquoted_literals(&expanded.value, &ifs, word);

    let noglob = state.options.noglob;
    let cwd = std::path::PathBuf::from(state.cwd.clone());
    let globbed = split_and_glob_expand(
        &split,
        &cwd,
        state.shopt_options.failglob,
        state.shopt_options.nullglob,
        noglob,
        state.shopt_options.extglob,
    )
    .unwrap_or(split);

    WordExpansionResult {
        value: expanded.value,
        split_words: Some(globbed),
        stderr: expanded.stderr,
        exit_code: expanded.exit_code,
    }
}

/// Check if a word contains command substitution.
pub fn word_has_command_substitution(word: &WordNode) -> bool {
    for part in &word.parts {
        if matches!(part, WordPart::CommandSubstitution(_)) {
            return true;
        }
        if let WordPart::DoubleQuoted(dq) = part {
            for inner in &dq.parts {
                if matches!(inner, WordPart::CommandSubstitution(_)) {
                    return true;
                }
            }
        }
    }
    false
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_literal_word(s: &str) -> WordNode {
        WordNode {
            parts: vec![WordPart::Literal(LiteralPart {
                value: s.to_string(),
            })],
        }
    }

    fn make_var_word(name: &str) -> WordNode {
        WordNode {
            parts: vec![WordPart::ParameterExpansion(ParameterExpansionPart {
                parameter: name.to_string(),
                operation: None,
            })],
        }
    }

    #[test]
    fn test_expand_word_literal() {
        let state = InterpreterState::default();
        let word = make_literal_word("hello");
        let options = WordExpansionOptions::default();
        let result = expand_word_no_glob(&state, &word, &options);
        assert_eq!(result.value, "hello");
    }

    #[test]
    fn test_expand_word_variable() {
        let mut state = InterpreterState::default();
        state.env.insert("FOO".to_string(), "bar".to_string());
        let word = make_var_word("FOO");
        let options = WordExpansionOptions::default();
        let result = expand_word_no_glob(&state, &word, &options);
        assert_eq!(result.value, "bar");
    }

    #[test]
    fn test_expand_word_unset_variable() {
        let state = InterpreterState::default();
        let word = make_var_word("UNSET");
        let options = WordExpansionOptions::default();
        let result = expand_word_no_glob(&state, &word, &options);
        assert_eq!(result.value, "");
    }

    #[test]
    fn test_is_word_fully_quoted_empty() {
        let word = WordNode { parts: vec![] };
        assert!(is_word_fully_quoted(&word));
    }

    #[test]
    fn test_is_word_fully_quoted_single_quoted() {
        let word = WordNode {
            parts: vec![WordPart::SingleQuoted(SingleQuotedPart {
                value: "hello".to_string(),
            })],
        };
        assert!(is_word_fully_quoted(&word));
    }

    #[test]
    fn test_is_word_fully_quoted_literal() {
        let word = make_literal_word("hello");
        assert!(!is_word_fully_quoted(&word));
    }

    #[test]
    fn test_word_has_glob_pattern() {
        let word = WordNode {
            parts: vec![WordPart::Glob(GlobPart {
                pattern: "*.txt".to_string(),
            })],
        };
        assert!(word_has_glob_pattern(&word, false));

        let word = make_literal_word("hello");
        assert!(!word_has_glob_pattern(&word, false));
    }

    #[test]
    fn test_word_has_command_substitution() {
        let word = WordNode {
            parts: vec![WordPart::CommandSubstitution(CommandSubstitutionPart {
                body: ScriptNode { statements: vec![] },
                legacy: false,
            })],
        };
        assert!(word_has_command_substitution(&word));

        let word = make_literal_word("hello");
        assert!(!word_has_command_substitution(&word));
    }
}
