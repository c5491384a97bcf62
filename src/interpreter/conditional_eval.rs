//! Conditional expression evaluation for `[[ ... ]]` and `test`/`[ ... ]`.
//!
//! Both builtins bottom out here: `[[ ]]` is parsed straight into a
//! [`ConditionalExpressionNode`] tree, while `test`/`[` builds the
//! equivalent tree from its argument list (see `builtins::test`) before
//! calling [`evaluate_conditional`]. Unary/binary string and numeric
//! comparisons reuse the `helpers::{file_tests,string_tests,...}` operator
//! tables; only the file-system-backed unary tests (`-e`, `-f`, ...) and the
//! `-nt`/`-ot`/`-ef` binaries live here, since they need the sync
//! `FileSystem` handle the helpers module deliberately stays free of.

use regex_lite::Regex;

use crate::ast::types::{
    CondBinaryNode, CondBinaryOperator, CondUnaryNode, CondUnaryOperator, ConditionalExpressionNode,
};
use crate::interpreter::helpers::numeric_compare::{compare_numeric, NumericOp};
use crate::interpreter::helpers::string_compare::{compare_strings_nocase, StringCompareOp};
use crate::interpreter::interpreter::FileSystem as SyncFileSystem;
use crate::interpreter::pattern_engine::{translate, TranslateMode};
use crate::interpreter::types::InterpreterState;
use crate::interpreter::word_expansion::{expand_word, CommandSubstFn, WordExpansionOptions};

/// Result of evaluating a conditional expression: truth value plus any
/// stderr/exit_code side effects accumulated from nested command/arithmetic
/// substitutions encountered while expanding operand words.
#[derive(Debug, Clone, Default)]
pub struct CondEvalResult {
    pub truth: bool,
    pub stderr: String,
}

/// Evaluate a `[[ ... ]]` / `test` expression tree against live shell state.
pub fn evaluate_conditional(
    state: &mut InterpreterState,
    fs: &dyn SyncFileSystem,
    expr: &ConditionalExpressionNode,
    exec_fn: Option<&CommandSubstFn>,
) -> CondEvalResult {
    let mut stderr = String::new();
    let truth = eval(state, fs, expr, exec_fn, &mut stderr);
    CondEvalResult { truth, stderr }
}

fn expand(
    state: &mut InterpreterState,
    word: &crate::ast::types::WordNode,
    exec_fn: Option<&CommandSubstFn>,
    stderr: &mut String,
) -> String {
    let options = WordExpansionOptions { in_double_quotes: true, ..Default::default() };
    let result = expand_word(state, word, &options, exec_fn);
    stderr.push_str(&result.stderr);
    result.value
}

fn eval(
    state: &mut InterpreterState,
    fs: &dyn SyncFileSystem,
    expr: &ConditionalExpressionNode,
    exec_fn: Option<&CommandSubstFn>,
    stderr: &mut String,
) -> bool {
    match expr {
        ConditionalExpressionNode::Word(w) => !expand(state, &w.word, exec_fn, stderr).is_empty(),
        ConditionalExpressionNode::Not(inner) => !eval(state, fs, &inner.operand, exec_fn, stderr),
        ConditionalExpressionNode::And(node) => {
            eval(state, fs, &node.left, exec_fn, stderr) && eval(state, fs, &node.right, exec_fn, stderr)
        }
        ConditionalExpressionNode::Or(node) => {
            eval(state, fs, &node.left, exec_fn, stderr) || eval(state, fs, &node.right, exec_fn, stderr)
        }
        ConditionalExpressionNode::Group(group) => eval(state, fs, &group.expression, exec_fn, stderr),
        ConditionalExpressionNode::Unary(unary) => eval_unary(state, fs, unary, exec_fn, stderr),
        ConditionalExpressionNode::Binary(binary) => eval_binary(state, fs, binary, exec_fn, stderr),
    }
}

fn eval_unary(
    state: &mut InterpreterState,
    fs: &dyn SyncFileSystem,
    node: &CondUnaryNode,
    exec_fn: Option<&CommandSubstFn>,
    stderr: &mut String,
) -> bool {
    let operand = expand(state, &node.operand, exec_fn, stderr);
    use CondUnaryOperator::*;
    match node.operator {
        E => fs.exists(&operand),
        F => fs.is_file(&operand),
        D => fs.is_dir(&operand),
        R | W => fs.exists(&operand),
        X => fs
            .stat(&operand)
            .map(|st| st.mode & 0o111 != 0)
            .unwrap_or(false),
        S => fs.stat(&operand).map(|st| st.size > 0).unwrap_or(false),
        L | H => fs.stat(&operand).map(|st| st.is_symlink).unwrap_or(false),
        P => fs.stat(&operand).map(|st| st.mode & 0o170000 == 0o010000).unwrap_or(false),
        UpperS => fs.stat(&operand).map(|st| st.mode & 0o170000 == 0o140000).unwrap_or(false),
        B => fs.stat(&operand).map(|st| st.mode & 0o170000 == 0o060000).unwrap_or(false),
        C => fs
            .stat(&operand)
            .map(|st| st.mode & 0o170000 == 0o020000)
            .unwrap_or(false)
            || crate::interpreter::helpers::file_tests::is_char_device(&operand),
        G => fs.stat(&operand).map(|st| st.mode & 0o2000 != 0).unwrap_or(false),
        K => fs.stat(&operand).map(|st| st.mode & 0o1000 != 0).unwrap_or(false),
        U => fs.stat(&operand).map(|st| st.mode & 0o4000 != 0).unwrap_or(false),
        // The virtual filesystem doesn't track real uid/gid; approximate
        // "owned by effective group/user" as "owned by root".
        UpperG => fs.stat(&operand).map(|st| st.gid == 0).unwrap_or(false),
        UpperO => fs.stat(&operand).map(|st| st.uid == 0).unwrap_or(false),
        N => fs.stat(&operand).map(|st| st.mtime > 0).unwrap_or(false),
        Z => operand.is_empty(),
        LowerN => !operand.is_empty(),
        LowerO => shell_option_enabled(state, &operand),
        V => crate::interpreter::expansion::variable::is_variable_set(state, &operand),
        UpperR => state
            .namerefs
            .as_ref()
            .map(|set| set.contains(&operand))
            .unwrap_or(false),
        T => false,
        A => fs.exists(&operand),
    }
}

fn shell_option_enabled(state: &InterpreterState, name: &str) -> bool {
    match name {
        "errexit" => state.options.errexit,
        "pipefail" => state.options.pipefail,
        "nounset" => state.options.nounset,
        "xtrace" => state.options.xtrace,
        "verbose" => state.options.verbose,
        "posix" => state.options.posix,
        "allexport" => state.options.allexport,
        "noclobber" => state.options.noclobber,
        "noglob" => state.options.noglob,
        "noexec" => state.options.noexec,
        "vi" => state.options.vi,
        "emacs" => state.options.emacs,
        _ => false,
    }
}

fn eval_binary(
    state: &mut InterpreterState,
    fs: &dyn SyncFileSystem,
    node: &CondBinaryNode,
    exec_fn: Option<&CommandSubstFn>,
    stderr: &mut String,
) -> bool {
    let left = expand(state, &node.left, exec_fn, stderr);

    use CondBinaryOperator::*;
    match node.operator {
        Eq | EqEq => {
            let pattern = expand(state, &node.right, exec_fn, stderr);
            pattern_matches(&left, &pattern, state.shopt_options.nocasematch)
        }
        Ne => {
            let pattern = expand(state, &node.right, exec_fn, stderr);
            !pattern_matches(&left, &pattern, state.shopt_options.nocasematch)
        }
        Match => {
            let pattern = expand(state, &node.right, exec_fn, stderr);
            match Regex::new(&pattern) {
                Ok(re) => re.is_match(&left),
                Err(e) => {
                    stderr.push_str(&format!("bash: =~: {}\n", e));
                    false
                }
            }
        }
        Lt => {
            let right = expand(state, &node.right, exec_fn, stderr);
            left < right
        }
        Gt => {
            let right = expand(state, &node.right, exec_fn, stderr);
            left > right
        }
        NumEq | NumNe | NumLt | NumLe | NumGt | NumGe => {
            let right = expand(state, &node.right, exec_fn, stderr);
            let l: i64 = left.trim().parse().unwrap_or(0);
            let r: i64 = right.trim().parse().unwrap_or(0);
            let op = match node.operator {
                NumEq => NumericOp::Eq,
                NumNe => NumericOp::Ne,
                NumLt => NumericOp::Lt,
                NumLe => NumericOp::Le,
                NumGt => NumericOp::Gt,
                NumGe => NumericOp::Ge,
                _ => unreachable!(),
            };
            compare_numeric(op, l, r)
        }
        Nt | Ot | Ef => {
            let right = expand(state, &node.right, exec_fn, stderr);
            let (Ok(a), Ok(b)) = (fs.stat(&left), fs.stat(&right)) else { return false };
            match node.operator {
                Nt => a.mtime > b.mtime,
                Ot => a.mtime < b.mtime,
                Ef => a.is_dir == b.is_dir && a.size == b.size && a.mtime == b.mtime,
                _ => unreachable!(),
            }
        }
    }
}

pub(crate) fn pattern_matches(value: &str, pattern: &str, nocase: bool) -> bool {
    if !crate::interpreter::expansion::glob_escape::has_glob_pattern(pattern, true) {
        return compare_strings_nocase(StringCompareOp::Eq, value, pattern, nocase);
    }
    let mut mode = TranslateMode::ENTIRE_STRING | TranslateMode::EXTENDED_OPERATORS;
    if nocase {
        mode = mode | TranslateMode::NO_GLOB_CASE;
    }
    match translate(pattern, mode) {
        Ok(regex) => Regex::new(&regex).map(|re| re.is_match(value)).unwrap_or(false),
        Err(_) => value == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{CondWordNode, LiteralPart, WordNode, WordPart};
    use crate::interpreter::sync_fs_adapter::SyncFsAdapter;
    use std::sync::Arc;

    fn literal_word(s: &str) -> WordNode {
        WordNode { parts: vec![WordPart::Literal(LiteralPart { value: s.to_string() })] }
    }

    fn word_node(s: &str) -> ConditionalExpressionNode {
        ConditionalExpressionNode::Word(CondWordNode { word: literal_word(s) })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_word_truthiness() {
        let fs = Arc::new(crate::fs::InMemoryFs::new());
        let rt = tokio::runtime::Handle::current();
        let adapter = SyncFsAdapter::new(fs, rt);
        let mut state = InterpreterState::default();

        let result = evaluate_conditional(&mut state, &adapter, &word_node("nonempty"), None);
        assert!(result.truth);

        let result = evaluate_conditional(&mut state, &adapter, &word_node(""), None);
        assert!(!result.truth);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_string_glob_equality() {
        let fs = Arc::new(crate::fs::InMemoryFs::new());
        let rt = tokio::runtime::Handle::current();
        let adapter = SyncFsAdapter::new(fs, rt);
        let mut state = InterpreterState::default();

        let expr = ConditionalExpressionNode::Binary(CondBinaryNode {
            operator: CondBinaryOperator::EqEq,
            left: literal_word("hello.txt"),
            right: literal_word("*.txt"),
        });
        let result = evaluate_conditional(&mut state, &adapter, &expr, None);
        assert!(result.truth);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_numeric_comparison() {
        let fs = Arc::new(crate::fs::InMemoryFs::new());
        let rt = tokio::runtime::Handle::current();
        let adapter = SyncFsAdapter::new(fs, rt);
        let mut state = InterpreterState::default();

        let expr = ConditionalExpressionNode::Binary(CondBinaryNode {
            operator: CondBinaryOperator::NumLt,
            left: literal_word("2"),
            right: literal_word("10"),
        });
        let result = evaluate_conditional(&mut state, &adapter, &expr, None);
        assert!(result.truth);
    }
}
