//! Control Flow Execution
//!
//! Handles control flow constructs:
//! - if/elif/else
//! - for loops
//! - C-style for loops
//! - while loops
//! - until loops
//! - case statements
//! - break/continue

use regex_lite::Regex;

use crate::ast::types::{ArithmeticExpressionNode, StatementNode};
use crate::interpreter::arithmetic::evaluate_arithmetic;
use crate::interpreter::errors::{ExecutionLimitError, InterpreterError, LimitType};
use crate::interpreter::helpers::condition::ConditionResult;
use crate::interpreter::helpers::loop_helpers::{handle_loop_error, LoopAction};
use crate::interpreter::types::{ExecResult, ExecutionLimits, InterpreterContext, InterpreterState};

/// Output of a for/while/until loop. Shares the stdout/stderr/exit_code
/// shape with `ConditionResult` and `ExecResult` so callers can fold it
/// straight into an `ExecResult`.
#[derive(Debug, Clone, Default)]
pub struct ForResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Execute an if/elif/.../else chain.
///
/// `clauses` is `(condition_statements, body_statements)` pairs in source
/// order. The first clause whose condition exits 0 has its body run; if
/// none match, `else_body` (if any) runs instead.
pub fn execute_if<EvalCond, ExecStmt>(
    state: &mut InterpreterState,
    clauses: &[(Vec<&StatementNode>, Vec<&StatementNode>)],
    else_body: Option<&[&StatementNode]>,
    mut eval_cond: EvalCond,
    mut exec_stmt: ExecStmt,
) -> Result<ConditionResult, InterpreterError>
where
    EvalCond: FnMut(&mut InterpreterState, &StatementNode) -> Result<ConditionResult, InterpreterError>,
    ExecStmt: FnMut(&mut InterpreterState, &StatementNode) -> Result<ExecResult, InterpreterError>,
{
    let mut stdout = String::new();
    let mut stderr = String::new();

    for (condition, body) in clauses {
        let mut cond_exit = 0;
        for stmt in condition {
            let res = eval_cond(state, stmt)?;
            stdout.push_str(&res.stdout);
            stderr.push_str(&res.stderr);
            cond_exit = res.exit_code;
        }

        if cond_exit == 0 {
            let mut exit_code = 0;
            for stmt in body {
                let res = exec_stmt(state, stmt)?;
                stdout.push_str(&res.stdout);
                stderr.push_str(&res.stderr);
                exit_code = res.exit_code;
            }
            return Ok(ConditionResult::new(stdout, stderr, exit_code));
        }
    }

    let mut exit_code = 0;
    if let Some(body) = else_body {
        for stmt in body {
            let res = exec_stmt(state, stmt)?;
            stdout.push_str(&res.stdout);
            stderr.push_str(&res.stderr);
            exit_code = res.exit_code;
        }
    }

    Ok(ConditionResult::new(stdout, stderr, exit_code))
}

/// Execute a `for VAR in WORDS; do BODY; done` loop.
pub fn execute_for<ExecStmt>(
    state: &mut InterpreterState,
    variable: &str,
    words: &[String],
    body: &[&StatementNode],
    max_iterations: usize,
    mut exec_stmt: ExecStmt,
) -> Result<ForResult, InterpreterError>
where
    ExecStmt: FnMut(&mut InterpreterState, &StatementNode) -> Result<ExecResult, InterpreterError>,
{
    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut exit_code = 0;
    let mut iterations = 0usize;

    state.loop_depth += 1;
    let depth = state.loop_depth;

    let mut word_idx = 0usize;
    let result: Result<(), InterpreterError> = 'words: loop {
        let Some(word) = words.get(word_idx) else {
            break 'words Ok(());
        };
        word_idx += 1;
        state.env.insert(variable.to_string(), word.clone());

        for stmt in body {
            iterations += 1;
            if iterations > max_iterations {
                let err = ExecutionLimitError::new(
                    "maximum loop iterations exceeded".to_string(),
                    LimitType::Iterations,
                    std::mem::take(&mut stdout),
                    std::mem::take(&mut stderr),
                );
                break 'words Err(InterpreterError::ExecutionLimit(err));
            }

            match exec_stmt(state, stmt) {
                Ok(res) => {
                    stdout.push_str(&res.stdout);
                    stderr.push_str(&res.stderr);
                    exit_code = res.exit_code;
                }
                Err(e) => {
                    let handled = handle_loop_error(e, std::mem::take(&mut stdout), std::mem::take(&mut stderr), depth);
                    stdout = handled.stdout;
                    stderr = handled.stderr;
                    match handled.action {
                        LoopAction::Break => break 'words Ok(()),
                        LoopAction::Continue => continue 'words,
                        LoopAction::Rethrow => break 'words Err(handled.error.unwrap()),
                        LoopAction::Error => {
                            exit_code = handled.exit_code.unwrap_or(1);
                            break;
                        }
                    }
                }
            }
        }
    };

    state.loop_depth -= 1;
    match result {
        Ok(()) => Ok(ForResult { stdout, stderr, exit_code }),
        Err(e) => Err(e),
    }
}

/// Execute a `while COND; do BODY; done` loop.
pub fn execute_while<EvalCond, ExecStmt>(
    state: &mut InterpreterState,
    condition: &[&StatementNode],
    body: &[&StatementNode],
    max_iterations: usize,
    eval_cond: EvalCond,
    exec_stmt: ExecStmt,
) -> Result<ForResult, InterpreterError>
where
    EvalCond: FnMut(&mut InterpreterState, &StatementNode) -> Result<ConditionResult, InterpreterError>,
    ExecStmt: FnMut(&mut InterpreterState, &StatementNode) -> Result<ExecResult, InterpreterError>,
{
    execute_while_until(state, condition, body, max_iterations, eval_cond, exec_stmt, false)
}

/// Execute an `until COND; do BODY; done` loop (runs while COND is false).
pub fn execute_until<EvalCond, ExecStmt>(
    state: &mut InterpreterState,
    condition: &[&StatementNode],
    body: &[&StatementNode],
    max_iterations: usize,
    eval_cond: EvalCond,
    exec_stmt: ExecStmt,
) -> Result<ForResult, InterpreterError>
where
    EvalCond: FnMut(&mut InterpreterState, &StatementNode) -> Result<ConditionResult, InterpreterError>,
    ExecStmt: FnMut(&mut InterpreterState, &StatementNode) -> Result<ExecResult, InterpreterError>,
{
    execute_while_until(state, condition, body, max_iterations, eval_cond, exec_stmt, true)
}

fn execute_while_until<EvalCond, ExecStmt>(
    state: &mut InterpreterState,
    condition: &[&StatementNode],
    body: &[&StatementNode],
    max_iterations: usize,
    mut eval_cond: EvalCond,
    mut exec_stmt: ExecStmt,
    negate: bool,
) -> Result<ForResult, InterpreterError>
where
    EvalCond: FnMut(&mut InterpreterState, &StatementNode) -> Result<ConditionResult, InterpreterError>,
    ExecStmt: FnMut(&mut InterpreterState, &StatementNode) -> Result<ExecResult, InterpreterError>,
{
    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut exit_code = 0;
    let mut iterations = 0usize;

    state.loop_depth += 1;
    let depth = state.loop_depth;

    let result: Result<(), InterpreterError> = 'cond: loop {
        let mut cond_exit = 0;
        for stmt in condition {
            let res = match eval_cond(state, stmt) {
                Ok(res) => res,
                Err(e) => break 'cond Err(e),
            };
            stdout.push_str(&res.stdout);
            stderr.push_str(&res.stderr);
            cond_exit = res.exit_code;
        }

        let should_run = if negate { cond_exit != 0 } else { cond_exit == 0 };
        if !should_run {
            break 'cond Ok(());
        }

        // Outcome of the body this iteration: None means "ran to
        // completion, reevaluate the condition".
        let mut outcome: Option<Result<(), InterpreterError>> = None;

        for stmt in body {
            iterations += 1;
            if iterations > max_iterations {
                let err = ExecutionLimitError::new(
                    "maximum loop iterations exceeded".to_string(),
                    LimitType::Iterations,
                    std::mem::take(&mut stdout),
                    std::mem::take(&mut stderr),
                );
                outcome = Some(Err(InterpreterError::ExecutionLimit(err)));
                break;
            }

            match exec_stmt(state, stmt) {
                Ok(res) => {
                    stdout.push_str(&res.stdout);
                    stderr.push_str(&res.stderr);
                    exit_code = res.exit_code;
                }
                Err(e) => {
                    let handled = handle_loop_error(e, std::mem::take(&mut stdout), std::mem::take(&mut stderr), depth);
                    stdout = handled.stdout;
                    stderr = handled.stderr;
                    match handled.action {
                        LoopAction::Break => outcome = Some(Ok(())),
                        LoopAction::Continue => {}
                        LoopAction::Rethrow => outcome = Some(Err(handled.error.unwrap())),
                        LoopAction::Error => exit_code = handled.exit_code.unwrap_or(1),
                    }
                    // Whatever happened, the rest of this iteration's body
                    // is skipped: break/continue/error/rethrow all stop the
                    // body early.
                    break;
                }
            }
        }

        if let Some(result) = outcome {
            break 'cond result;
        }
    };

    state.loop_depth -= 1;
    match result {
        Ok(()) => Ok(ForResult { stdout, stderr, exit_code }),
        Err(e) => Err(e),
    }
}

/// Execute a `for ((init; cond; update)); do BODY; done` loop.
///
/// `init` runs once before the first condition check; `cond` is
/// re-evaluated (truthy on non-zero, matching `((...))`) before every
/// iteration; `update` runs after every body. Any of the three clauses
/// may be omitted (`for ((;;))` loops until `break`). An arithmetic error
/// in any clause stops the loop and surfaces as stderr + exit 1, matching
/// the standalone `((...))` command's own error handling rather than
/// aborting the whole script.
pub fn execute_c_style_for<ExecStmt>(
    state: &mut InterpreterState,
    limits: &ExecutionLimits,
    init: Option<&ArithmeticExpressionNode>,
    condition: Option<&ArithmeticExpressionNode>,
    update: Option<&ArithmeticExpressionNode>,
    body: &[&StatementNode],
    max_iterations: usize,
    mut exec_stmt: ExecStmt,
) -> Result<ForResult, InterpreterError>
where
    ExecStmt: FnMut(&mut InterpreterState, &StatementNode) -> Result<ExecResult, InterpreterError>,
{
    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut exit_code = 0;

    if let Some(init) = init {
        let mut ctx = InterpreterContext::new(state, limits);
        if let Err(e) = evaluate_arithmetic(&mut ctx, &init.expression, false, None) {
            stderr.push_str(&format!("bash: {}\n", e));
            return Ok(ForResult { stdout, stderr, exit_code: 1 });
        }
    }

    let mut iterations = 0usize;
    state.loop_depth += 1;
    let depth = state.loop_depth;

    let result: Result<(), InterpreterError> = 'cond: loop {
        let should_run = match condition {
            Some(condition) => {
                let mut ctx = InterpreterContext::new(state, limits);
                match evaluate_arithmetic(&mut ctx, &condition.expression, false, None) {
                    Ok(value) => value != 0,
                    Err(e) => {
                        stderr.push_str(&format!("bash: {}\n", e));
                        exit_code = 1;
                        break 'cond Ok(());
                    }
                }
            }
            None => true,
        };

        if !should_run {
            break 'cond Ok(());
        }

        let mut outcome: Option<Result<(), InterpreterError>> = None;

        for stmt in body {
            iterations += 1;
            if iterations > max_iterations {
                let err = ExecutionLimitError::new(
                    "maximum loop iterations exceeded".to_string(),
                    LimitType::Iterations,
                    std::mem::take(&mut stdout),
                    std::mem::take(&mut stderr),
                );
                outcome = Some(Err(InterpreterError::ExecutionLimit(err)));
                break;
            }

            match exec_stmt(state, stmt) {
                Ok(res) => {
                    stdout.push_str(&res.stdout);
                    stderr.push_str(&res.stderr);
                    exit_code = res.exit_code;
                }
                Err(e) => {
                    let handled = handle_loop_error(e, std::mem::take(&mut stdout), std::mem::take(&mut stderr), depth);
                    stdout = handled.stdout;
                    stderr = handled.stderr;
                    match handled.action {
                        LoopAction::Break => outcome = Some(Ok(())),
                        LoopAction::Continue => {}
                        LoopAction::Rethrow => outcome = Some(Err(handled.error.unwrap())),
                        LoopAction::Error => exit_code = handled.exit_code.unwrap_or(1),
                    }
                    break;
                }
            }
        }

        if let Some(result) = outcome {
            break 'cond result;
        }

        if let Some(update) = update {
            let mut ctx = InterpreterContext::new(state, limits);
            if let Err(e) = evaluate_arithmetic(&mut ctx, &update.expression, false, None) {
                stderr.push_str(&format!("bash: {}\n", e));
                exit_code = 1;
                break 'cond Ok(());
            }
        }
    };

    state.loop_depth -= 1;
    match result {
        Ok(()) => Ok(ForResult { stdout, stderr, exit_code }),
        Err(e) => Err(e),
    }
}

/// Validate that a variable name is a valid identifier.
/// Returns true if valid, false otherwise.
pub fn is_valid_identifier(name: &str) -> bool {
    let re = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
    re.is_match(name)
}

/// Case statement terminator types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseTerminator {
    /// ;; - stop, no fall-through
    Break,
    /// ;& - unconditional fall-through (execute next body without pattern check)
    FallThrough,
    /// ;;& - continue pattern matching (check next case patterns)
    ContinueMatching,
}

impl CaseTerminator {
    /// Parse a terminator string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            ";;" => Some(CaseTerminator::Break),
            ";&" => Some(CaseTerminator::FallThrough),
            ";;&" => Some(CaseTerminator::ContinueMatching),
            _ => None,
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseTerminator::Break => ";;",
            CaseTerminator::FallThrough => ";&",
            CaseTerminator::ContinueMatching => ";;&",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{ArithAssignmentNode, ArithAssignmentOperator, ArithBinaryNode, ArithBinaryOperator, ArithExpr, ArithNumberNode, ArithVariableNode};

    fn arith(expr: ArithExpr) -> ArithmeticExpressionNode {
        ArithmeticExpressionNode { expression: expr, original_text: None }
    }

    fn assign(var: &str, value: ArithExpr) -> ArithExpr {
        ArithExpr::Assignment(Box::new(ArithAssignmentNode {
            operator: ArithAssignmentOperator::Assign,
            variable: var.to_string(),
            subscript: None,
            string_key: None,
            value,
        }))
    }

    fn number(n: i64) -> ArithExpr {
        ArithExpr::Number(ArithNumberNode { value: n })
    }

    fn var(name: &str) -> ArithExpr {
        ArithExpr::Variable(ArithVariableNode { name: name.to_string(), has_dollar_prefix: false })
    }

    fn empty_stmt() -> StatementNode {
        StatementNode {
            pipelines: Vec::new(),
            operators: Vec::new(),
            background: false,
            deferred_error: None,
            source_text: None,
        }
    }

    #[test]
    fn test_c_style_for_runs_body_per_iteration() {
        let mut state = InterpreterState::default();
        let limits = ExecutionLimits::default();

        let init = arith(assign("i", number(0)));
        let condition = arith(ArithExpr::Binary(Box::new(ArithBinaryNode {
            operator: ArithBinaryOperator::Lt,
            left: var("i"),
            right: number(3),
        })));
        let update = arith(assign("i", ArithExpr::Binary(Box::new(ArithBinaryNode {
            operator: ArithBinaryOperator::Add,
            left: var("i"),
            right: number(1),
        }))));

        let stmt = empty_stmt();
        let body = vec![&stmt];

        let mut runs = 0;
        let result = execute_c_style_for(
            &mut state,
            &limits,
            Some(&init),
            Some(&condition),
            Some(&update),
            &body,
            1000,
            |_state, _stmt| {
                runs += 1;
                Ok(ExecResult::new(String::new(), String::new(), 0))
            },
        )
        .unwrap();

        assert_eq!(runs, 3);
        assert_eq!(result.exit_code, 0);
        assert_eq!(state.env.get("i"), Some(&"3".to_string()));
    }

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("foo"));
        assert!(is_valid_identifier("_bar"));
        assert!(is_valid_identifier("foo123"));
        assert!(is_valid_identifier("_123"));
        assert!(!is_valid_identifier("123foo"));
        assert!(!is_valid_identifier("foo-bar"));
        assert!(!is_valid_identifier("foo bar"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn test_case_terminator() {
        assert_eq!(CaseTerminator::from_str(";;"), Some(CaseTerminator::Break));
        assert_eq!(CaseTerminator::from_str(";&"), Some(CaseTerminator::FallThrough));
        assert_eq!(CaseTerminator::from_str(";;&"), Some(CaseTerminator::ContinueMatching));
        assert_eq!(CaseTerminator::from_str("invalid"), None);

        assert_eq!(CaseTerminator::Break.as_str(), ";;");
        assert_eq!(CaseTerminator::FallThrough.as_str(), ";&");
        assert_eq!(CaseTerminator::ContinueMatching.as_str(), ";;&");
    }
}
