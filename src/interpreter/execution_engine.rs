//! Execution Engine
//!
//! The core execution engine that ties all interpreter components together.
//! Implements the full AST execution chain:
//!
//! execute_script -> execute_statement -> execute_pipeline -> execute_command

use crate::ast::types::{
    CommandNode, CompoundCommandNode, PipelineNode, ScriptNode, SimpleCommandNode, StatementNode,
    StatementOperator,
};
use crate::ast::types::WordNode;
use crate::interpreter::background::BackgroundExit;
use crate::interpreter::builtin_dispatch::{dispatch_builtin, BuiltinDispatchContext};
use crate::interpreter::control_flow::{execute_for, execute_if, execute_while, execute_until, ForResult};
use crate::interpreter::errors::{InterpreterError, ErrexitError};
use crate::interpreter::functions::{call_function, execute_function_def};
use crate::interpreter::handler_chain::{default_exec_handler, HandlerContext, HandlerError};
use crate::interpreter::helpers::condition::ConditionResult;
use crate::interpreter::interpreter::{
    build_exported_env, check_command_limit, should_trigger_errexit, update_exit_code,
    FileSystem as SyncFileSystem,
};
use crate::interpreter::pipeline_execution::{execute_pipeline, PipelineOptions, PipelineState, set_pipestatus};
use crate::interpreter::redirections::{apply_redirections, pre_expand_redirect_targets};
use crate::interpreter::simple_command_assignments::process_assignments;
use crate::interpreter::subshell_group::{execute_group, execute_subshell};
use crate::interpreter::types::{ExecResult, ExecutionLimits, InterpreterState};
use crate::interpreter::word_expansion::{expand_word, expand_word_with_glob, WordExpansionOptions};
use std::cell::RefCell;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex as AsyncMutex};

/// The execution engine that ties all interpreter components together.
pub struct ExecutionEngine<'a> {
    /// Execution limits (max commands, recursion depth, iterations)
    pub limits: &'a ExecutionLimits,
    /// Sync filesystem interface
    pub fs: &'a dyn SyncFileSystem,
}

impl<'a> ExecutionEngine<'a> {
    /// Create a new execution engine.
    pub fn new(limits: &'a ExecutionLimits, fs: &'a dyn SyncFileSystem) -> Self {
        Self { limits, fs }
    }

    /// Execute a complete script (list of statements).
    pub fn execute_script(
        &self,
        state: &mut InterpreterState,
        ast: &ScriptNode,
    ) -> Result<ExecResult, InterpreterError> {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut exit_code = 0;

        for statement in &ast.statements {
            match self.execute_statement(state, statement) {
                Ok(result) => {
                    stdout.push_str(&result.stdout);
                    stderr.push_str(&result.stderr);
                    exit_code = result.exit_code;
                    update_exit_code(state, exit_code);
                }
                Err(InterpreterError::Exit(e)) => {
                    // ExitError propagates up to terminate the script
                    let mut err = e;
                    err.prepend_output(&stdout, &stderr);
                    return Err(InterpreterError::Exit(err));
                }
                Err(InterpreterError::ExecutionLimit(e)) => {
                    // ExecutionLimitError must always propagate
                    return Err(InterpreterError::ExecutionLimit(e));
                }
                Err(InterpreterError::Errexit(e)) => {
                    // Errexit terminates the script
                    stdout.push_str(&e.stdout);
                    stderr.push_str(&e.stderr);
                    exit_code = e.exit_code;
                    return Ok(ExecResult::new(stdout, stderr, exit_code));
                }
                Err(InterpreterError::Break(mut e)) => {
                    // Break/continue outside loops - silently continue
                    e.prepend_output(&stdout, &stderr);
                    stdout = e.stdout.clone();
                    stderr = e.stderr.clone();
                    continue;
                }
                Err(InterpreterError::Continue(mut e)) => {
                    e.prepend_output(&stdout, &stderr);
                    stdout = e.stdout.clone();
                    stderr = e.stderr.clone();
                    continue;
                }
                Err(InterpreterError::Return(mut e)) => {
                    // Return outside function - propagate
                    e.prepend_output(&stdout, &stderr);
                    return Err(InterpreterError::Return(e));
                }
                Err(e) => {
                    // Other errors - convert to result
                    stderr.push_str(&format!("{}\n", e));
                    exit_code = 1;
                }
            }
        }

        Ok(ExecResult::new(stdout, stderr, exit_code))
    }

    /// Execute a single statement (list of pipelines with && || operators).
    pub fn execute_statement(
        &self,
        state: &mut InterpreterState,
        stmt: &StatementNode,
    ) -> Result<ExecResult, InterpreterError> {
        // Handle deferred syntax errors
        if let Some(ref err) = stmt.deferred_error {
            return Ok(ExecResult::new(
                String::new(),
                format!("bash: syntax error near unexpected token `{}'\n", err.token),
                2,
            ));
        }

        // noexec mode (set -n): parse but don't execute
        if state.options.noexec {
            return Ok(ExecResult::ok());
        }

        // Reset errexit_safe at start of each statement
        state.errexit_safe = Some(false);

        let mut stdout = String::new();
        let mut stderr = String::new();

        // verbose mode (set -v): print source before execution
        if state.options.verbose {
            if let Some(ref source) = stmt.source_text {
                stderr.push_str(source);
                stderr.push('\n');
            }
        }

        let mut exit_code = 0;
        let mut last_executed_index: i32 = -1;
        let mut last_pipeline_negated = false;

        for (i, pipeline) in stmt.pipelines.iter().enumerate() {
            // Check && / || short-circuit
            if i > 0 {
                let op = &stmt.operators[i - 1];
                match op {
                    StatementOperator::And => {
                        if exit_code != 0 {
                            continue;
                        }
                    }
                    StatementOperator::Or => {
                        if exit_code == 0 {
                            continue;
                        }
                    }
                    StatementOperator::Semi => {
                        // Always execute
                    }
                }
            }

            let result = self.execute_pipeline_node(state, pipeline)?;
            stdout.push_str(&result.stdout);
            stderr.push_str(&result.stderr);
            exit_code = result.exit_code;
            last_executed_index = i as i32;
            last_pipeline_negated = pipeline.negated;

            update_exit_code(state, exit_code);
        }

        // `cmd &`: the whole list already ran to completion synchronously above,
        // since this engine has no real concurrency. Stash its result behind a
        // background job so `wait`/`wait $!` can reap it, and report $? = 0 for
        // the backgrounding statement itself regardless of the job's own exit
        // code, matching bash. The job's own stdout/stderr is not spliced into
        // the foreground statement's result - only `wait` can observe its exit
        // code today.
        if stmt.background {
            let (tx, rx) = oneshot::channel();
            let exit_cell = Arc::new(AsyncMutex::new(Some(BackgroundExit {
                exit_code,
                stdout,
                stderr,
            })));
            let _ = tx.send(());
            let id = state.background_jobs.borrow_mut().push(rx, exit_cell);
            state.env.insert("!".to_string(), id);
            update_exit_code(state, 0);
            return Ok(ExecResult::ok());
        }

        // Check errexit
        let was_short_circuited = last_executed_index < (stmt.pipelines.len() as i32 - 1);
        let inner_was_safe = state.errexit_safe.unwrap_or(false);

        if should_trigger_errexit(state, exit_code, was_short_circuited, last_pipeline_negated)
            && !inner_was_safe
        {
            return Err(InterpreterError::Errexit(ErrexitError::new(
                exit_code, stdout, stderr,
            )));
        }

        Ok(ExecResult::new(stdout, stderr, exit_code))
    }

    /// Execute a pipeline (list of commands connected by |).
    pub fn execute_pipeline_node(
        &self,
        state: &mut InterpreterState,
        pipeline: &PipelineNode,
    ) -> Result<ExecResult, InterpreterError> {
        let mut pipe_state = PipelineState::new();
        let pipe_stderr = pipeline.pipe_stderr.clone().unwrap_or_default();

        let options = PipelineOptions {
            pipefail: state.options.pipefail,
            lastpipe: state.shopt_options.lastpipe,
            runs_in_subshell: false,
            time_pipeline: pipeline.timed,
            time_posix_format: pipeline.time_posix,
        };

        // We need to pass state through the closure, but execute_pipeline
        // takes ownership of the closure. Use a RefCell pattern.
        let state_cell = RefCell::new(state);

        let result = execute_pipeline(
            &mut pipe_state,
            &pipeline.commands,
            &pipe_stderr,
            &options,
            |cmd, stdin| {
                let state = &mut *state_cell.borrow_mut();
                self.execute_command(state, cmd, stdin)
            },
        )?;

        // Get state back
        let state = state_cell.into_inner();

        // Set PIPESTATUS
        set_pipestatus(&mut state.env, &result.exit_codes);

        let mut exec_result = result.to_exec_result();

        // Handle negation
        if pipeline.negated {
            exec_result.exit_code = if exec_result.exit_code == 0 { 1 } else { 0 };
        }

        Ok(exec_result)
    }

    /// Execute a single command.
    pub fn execute_command(
        &self,
        state: &mut InterpreterState,
        cmd: &CommandNode,
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        // Check command limit
        if let Some(msg) = check_command_limit(state, self.limits) {
            return Err(InterpreterError::ExecutionLimit(
                crate::interpreter::errors::ExecutionLimitError::simple(
                    msg,
                    crate::interpreter::errors::LimitType::Commands,
                ),
            ));
        }

        match cmd {
            CommandNode::Simple(simple) => self.execute_simple_command(state, simple, stdin),
            CommandNode::Compound(compound) => {
                self.execute_compound_command(state, compound, stdin)
            }
            CommandNode::FunctionDef(func_def) => {
                let current_source = state.current_source.clone();
                execute_function_def(state, func_def, current_source.as_deref())
                    .map_err(InterpreterError::Exit)
            }
        }
    }

    /// Execute a simple command (name + args + redirections).
    pub fn execute_simple_command(
        &self,
        state: &mut InterpreterState,
        cmd: &SimpleCommandNode,
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        // Set line number for $LINENO
        if let Some(line) = cmd.line {
            state.current_line = line as u32;
        }

        let exec_fn = |script: &ScriptNode, state: &mut InterpreterState| self.run_subst_script(state, script);
        let expand_word_fn = |state: &mut InterpreterState, word: &WordNode| {
            expand_word(state, word, &WordExpansionOptions::default(), Some(&exec_fn)).value
        };

        let assignment_result = process_assignments(state, cmd, &expand_word_fn);
        if let Some(error) = assignment_result.error {
            return Ok(error);
        }

        // Assignment-only command (`FOO=bar` with no command name): the
        // bindings are already permanent in `state.env`, nothing left to run.
        if cmd.name.is_none() {
            return Ok(ExecResult::new(String::new(), assignment_result.xtrace_output, 0));
        }

        let cmd_name = expand_word(state, cmd.name.as_ref().unwrap(), &WordExpansionOptions::default(), Some(&exec_fn)).value;

        let mut args: Vec<String> = Vec::new();
        for arg in &cmd.args {
            let result = expand_word_with_glob(state, arg, Some(&exec_fn));
            if let Some(words) = result.split_words {
                args.extend(words);
            } else {
                args.push(result.value);
            }
        }

        // Control-flow builtins raise an `InterpreterError` variant that has
        // to unwind through `execute_script`/loop bodies/`call_function`;
        // `dispatch_builtin` only ever hands back a plain `ExecResult`, so
        // these are special-cased here rather than routed through it.
        match cmd_name.as_str() {
            "exit" => {
                match crate::interpreter::builtins::exit_cmd::handle_exit(state, &args) {
                    Ok(_) => unreachable!("handle_exit always returns Err"),
                    Err(e) => return Err(e),
                }
            }
            "return" => {
                return match crate::interpreter::builtins::handle_return(state, &args) {
                    Ok(r) => Ok(ExecResult::new(r.stdout, r.stderr, r.exit_code)),
                    Err(e) => Err(e),
                };
            }
            "break" => {
                return match crate::interpreter::builtins::handle_break(state, &args) {
                    Ok(r) => Ok(ExecResult::new(r.stdout, r.stderr, r.exit_code)),
                    Err(e) => Err(e),
                };
            }
            "continue" => {
                return match crate::interpreter::builtins::handle_continue(state, &args) {
                    Ok(r) => Ok(ExecResult::new(r.stdout, r.stderr, r.exit_code)),
                    Err(e) => Err(e),
                };
            }
            _ => {}
        }

        let pre_expand = pre_expand_redirect_targets(state, &cmd.redirections, &expand_word_fn);
        if let Some(error) = pre_expand.error {
            return Ok(ExecResult::new(String::new(), error, 1));
        }

        if let Some(error) = crate::interpreter::redirections::process_fd_variable_redirections(state, &cmd.redirections, &expand_word_fn) {
            return Ok(error);
        }

        let result = self.dispatch_named_command(state, &cmd_name, &args, stdin, false);

        let result = apply_redirections(state, self.fs, result, &cmd.redirections, Some(&pre_expand.targets), &expand_word_fn);

        // Prefix assignments (`FOO=bar cmd`) are only visible to `cmd`; restore
        // whatever was there before (or remove it) now that it has run.
        for (name, previous) in assignment_result.temp_assignments {
            match previous {
                Some(value) => { state.env.insert(name, value); }
                None => { state.env.remove(&name); }
            }
        }

        Ok(result)
    }

    /// Convert a script-level control-flow error into a plain `ExecResult`,
    /// the way command/process substitution captures the body it runs: `exit`
    /// and an unhandled `errexit`/`return` still end the substitution's output
    /// at that point rather than aborting the whole script.
    fn run_subst_script(&self, state: &mut InterpreterState, script: &ScriptNode) -> ExecResult {
        match self.execute_script(state, script) {
            Ok(result) => result,
            Err(InterpreterError::Exit(e)) => ExecResult::new(e.stdout, e.stderr, e.exit_code),
            Err(InterpreterError::Errexit(e)) => ExecResult::new(e.stdout, e.stderr, e.exit_code),
            Err(InterpreterError::Return(e)) => ExecResult::new(e.stdout, e.stderr, e.exit_code),
            Err(InterpreterError::Break(e)) => ExecResult::new(e.stdout, e.stderr, 0),
            Err(InterpreterError::Continue(e)) => ExecResult::new(e.stdout, e.stderr, 0),
            Err(e) => ExecResult::new(String::new(), format!("{}\n", e), 1),
        }
    }

    /// Resolve and run a command by name: a user-defined function first
    /// (unless `skip_functions`, used when a builtin bounces back after
    /// losing to a function override check), then shell builtins, then an
    /// external process via the default exec handler. This is also the
    /// `run_command` callback `BuiltinDispatchContext` threads through so
    /// `command`/`builtin`/`exec` can recurse into the same resolution.
    fn dispatch_named_command(
        &self,
        state: &mut InterpreterState,
        command_name: &str,
        args: &[String],
        stdin: &str,
        skip_functions: bool,
    ) -> ExecResult {
        if !skip_functions {
            let func = state.functions.get(command_name).cloned();
            if let Some(func) = func {
                let result = call_function(
                    state,
                    &func,
                    args,
                    stdin,
                    None,
                    self.limits.max_recursion_depth,
                    |state, stdin| self.execute_compound_command(state, &func.body, stdin),
                );
                return match result {
                    Ok(r) => r,
                    Err(InterpreterError::Exit(e)) => ExecResult::new(e.stdout, e.stderr, e.exit_code),
                    Err(InterpreterError::Errexit(e)) => ExecResult::new(e.stdout, e.stderr, e.exit_code),
                    Err(e) => ExecResult::new(String::new(), format!("{}\n", e), 1),
                };
            }
        }

        // Builtins with a real implementation under `builtins/` that
        // `dispatch_builtin` doesn't know about yet, or whose `dispatch_builtin`
        // stub is weaker than the real one (`export`). Checked ahead of
        // `dispatch_builtin` so the real implementation always wins.
        match command_name {
            "echo" => return run_echo(args),
            "printf" => return run_printf(args),
            "cd" => return self.run_cd(state, args),
            "pwd" => return ExecResult::new(format!("{}\n", state.cwd), String::new(), 0),
            "export" => {
                let r = crate::interpreter::builtins::handle_export(state, args);
                return ExecResult::new(r.stdout, r.stderr, r.exit_code);
            }
            "unset" => return crate::interpreter::builtins::handle_unset(state, args),
            "read" => {
                let r = crate::interpreter::builtins::handle_read(state, args, stdin, -1);
                return ExecResult::new(r.stdout, r.stderr, r.exit_code);
            }
            "let" => {
                let (stdout, stderr, exit_code) = crate::interpreter::builtins::handle_let(state, args);
                return ExecResult::new(stdout, stderr, exit_code);
            }
            _ => {}
        }

        let state_cell = RefCell::new(state);
        let run_command = |name: &str, cmd_args: &[String], _quoted: &[bool], cmd_stdin: &str, skip_fns: bool, _use_default_path: bool, _stdin_fd: i32| {
            let inner_state = &mut *state_cell.borrow_mut();
            self.dispatch_named_command(inner_state, name, cmd_args, cmd_stdin, skip_fns)
        };
        let build_env = || build_exported_env(&state_cell.borrow());
        let exec_script = |_path: &str, _script_args: &[String], _script_stdin: Option<&str>| -> ExecResult {
            ExecResult::new(String::new(), String::new(), 127)
        };

        let mut ctx = BuiltinDispatchContext {
            state: &state_cell,
            run_command: &run_command,
            build_exported_env: &build_env,
            execute_user_script: &exec_script,
        };

        if let Some(result) = dispatch_builtin(&mut ctx, command_name, args, &[], stdin, skip_functions, false, -1) {
            return result;
        }

        let (cwd, env) = {
            let state = state_cell.borrow();
            (state.cwd.clone(), build_exported_env(&state))
        };
        let cancelled = AtomicBool::new(false);
        let handler_ctx = HandlerContext { cwd: &cwd, env: &env, stdin, cancelled: &cancelled };
        let handler = default_exec_handler();

        match handler(&handler_ctx, command_name, args) {
            Ok(result) => result,
            Err(HandlerError::ExitStatus(127)) => ExecResult::new(
                String::new(),
                format!("bash: {}: command not found\n", command_name),
                127,
            ),
            Err(HandlerError::ExitStatus(code)) => ExecResult::new(String::new(), String::new(), code),
            Err(HandlerError::WrappedExitStatus(code, msg)) => ExecResult::new(String::new(), msg, code),
            Err(HandlerError::Fatal(msg)) => ExecResult::new(String::new(), format!("bash: {}\n", msg), 127),
        }
    }

    /// `cd`: resolves against the sandboxed filesystem rather than the real
    /// one, so it works the same way under `SyncFsAdapter`'s in-memory or
    /// host-backed implementations.
    fn run_cd(&self, state: &mut InterpreterState, args: &[String]) -> ExecResult {
        let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with('-') || a.as_str() == "-").collect();

        let mut print_path = false;
        let target = match positional.first() {
            None => state.env.get("HOME").cloned().unwrap_or_else(|| "/".to_string()),
            Some(t) if t.as_str() == "-" => {
                print_path = true;
                state.previous_dir.clone()
            }
            Some(t) if t.as_str() == "~" => state.env.get("HOME").cloned().unwrap_or_else(|| "/".to_string()),
            Some(t) => t.to_string(),
        };

        let new_cwd = if target.starts_with('/') {
            target.clone()
        } else {
            self.fs.resolve_path(&state.cwd, &target)
        };

        if !self.fs.is_dir(&new_cwd) {
            return ExecResult::new(String::new(), format!("bash: cd: {}: No such file or directory\n", target), 1);
        }

        state.previous_dir = state.cwd.clone();
        state.cwd = new_cwd.clone();
        state.env.insert("PWD".to_string(), new_cwd.clone());
        state.env.insert("OLDPWD".to_string(), state.previous_dir.clone());

        if print_path {
            ExecResult::new(format!("{}\n", new_cwd), String::new(), 0)
        } else {
            ExecResult::ok()
        }
    }

    /// Execute a compound command (if, for, while, etc.).
    pub fn execute_compound_command(
        &self,
        state: &mut InterpreterState,
        compound: &CompoundCommandNode,
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        let exec_fn = |script: &ScriptNode, state: &mut InterpreterState| self.run_subst_script(state, script);

        match compound {
            CompoundCommandNode::If(if_node) => {
                // Build clauses for execute_if
                let clauses: Vec<(Vec<&StatementNode>, Vec<&StatementNode>)> = if_node
                    .clauses
                    .iter()
                    .map(|c| {
                        (
                            c.condition.iter().collect(),
                            c.body.iter().collect(),
                        )
                    })
                    .collect();

                let else_body: Option<Vec<&StatementNode>> =
                    if_node.else_body.as_ref().map(|b| b.iter().collect());

                let result = execute_if(
                    state,
                    &clauses,
                    else_body.as_deref(),
                    |state, stmt| {
                        let res = self.execute_statement(state, stmt)?;
                        Ok(ConditionResult {
                            stdout: res.stdout,
                            stderr: res.stderr,
                            exit_code: res.exit_code,
                        })
                    },
                    |state, stmt| self.execute_statement(state, stmt),
                )?;

                Ok(ExecResult::new(result.stdout, result.stderr, result.exit_code))
            }

            CompoundCommandNode::For(for_node) => {
                // Expand words
                let mut words: Vec<String> = Vec::new();
                if let Some(ref word_list) = for_node.words {
                    for word in word_list {
                        let result = expand_word_with_glob(state, word, Some(&exec_fn));
                        if let Some(split) = result.split_words {
                            words.extend(split);
                        } else {
                            words.push(result.value);
                        }
                    }
                } else {
                    // Default to positional parameters
                    let argc: usize = state.env.get("#")
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0);
                    for i in 1..=argc {
                        if let Some(val) = state.env.get(&i.to_string()) {
                            words.push(val.clone());
                        }
                    }
                }

                let body: Vec<&StatementNode> = for_node.body.iter().collect();

                let result = execute_for(
                    state,
                    &for_node.variable,
                    &words,
                    &body,
                    self.limits.max_iterations as usize,
                    |state, stmt| self.execute_statement(state, stmt),
                )?;

                Ok(ExecResult::new(result.stdout, result.stderr, result.exit_code))
            }

            CompoundCommandNode::While(while_node) => {
                let condition: Vec<&StatementNode> = while_node.condition.iter().collect();
                let body: Vec<&StatementNode> = while_node.body.iter().collect();

                let result = execute_while(
                    state,
                    &condition,
                    &body,
                    self.limits.max_iterations as usize,
                    |state, stmt| {
                        let res = self.execute_statement(state, stmt)?;
                        Ok(ConditionResult {
                            stdout: res.stdout,
                            stderr: res.stderr,
                            exit_code: res.exit_code,
                        })
                    },
                    |state, stmt| self.execute_statement(state, stmt),
                )?;

                Ok(ExecResult::new(result.stdout, result.stderr, result.exit_code))
            }

            CompoundCommandNode::Until(until_node) => {
                let condition: Vec<&StatementNode> = until_node.condition.iter().collect();
                let body: Vec<&StatementNode> = until_node.body.iter().collect();

                let result = execute_until(
                    state,
                    &condition,
                    &body,
                    self.limits.max_iterations as usize,
                    |state, stmt| {
                        let res = self.execute_statement(state, stmt)?;
                        Ok(ConditionResult {
                            stdout: res.stdout,
                            stderr: res.stderr,
                            exit_code: res.exit_code,
                        })
                    },
                    |state, stmt| self.execute_statement(state, stmt),
                )?;

                Ok(ExecResult::new(result.stdout, result.stderr, result.exit_code))
            }

            CompoundCommandNode::Case(case_node) => {
                use crate::ast::types::CaseTerminator;
                use crate::interpreter::conditional_eval::pattern_matches;

                let subject = expand_word(state, &case_node.word, &WordExpansionOptions::default(), Some(&exec_fn)).value;
                let nocase = state.shopt_options.nocasematch;

                let mut stdout = String::new();
                let mut stderr = String::new();
                let mut exit_code = 0;
                let mut fallen_through = false;

                for item in &case_node.items {
                    let matched = fallen_through
                        || item.patterns.iter().any(|p| {
                            let pattern = expand_word(state, p, &WordExpansionOptions::default(), Some(&exec_fn)).value;
                            pattern_matches(&subject, &pattern, nocase)
                        });

                    if !matched {
                        continue;
                    }

                    for stmt in &item.body {
                        let result = self.execute_statement(state, stmt)?;
                        stdout.push_str(&result.stdout);
                        stderr.push_str(&result.stderr);
                        exit_code = result.exit_code;
                        update_exit_code(state, exit_code);
                    }

                    match item.terminator {
                        CaseTerminator::DoubleSemi => break,
                        CaseTerminator::SemiAnd => {
                            fallen_through = true;
                        }
                        CaseTerminator::SemiSemiAnd => {
                            fallen_through = false;
                        }
                    }
                }

                Ok(ExecResult::new(stdout, stderr, exit_code))
            }

            CompoundCommandNode::Subshell(subshell_node) => {
                execute_subshell(
                    state,
                    &subshell_node.body,
                    Some(stdin),
                    |state, stmt| self.execute_statement(state, stmt),
                )
            }

            CompoundCommandNode::Group(group_node) => {
                execute_group(
                    state,
                    &group_node.body,
                    Some(stdin),
                    |state, stmt| self.execute_statement(state, stmt),
                )
            }

            CompoundCommandNode::ArithmeticCommand(arith) => {
                use crate::interpreter::arithmetic::evaluate_arithmetic;
                use crate::interpreter::types::InterpreterContext;

                let mut ctx = InterpreterContext::new(state, self.limits);
                match evaluate_arithmetic(&mut ctx, &arith.expression.expression, false, None) {
                    Ok(value) => {
                        // Arithmetic command: exit 0 if non-zero, exit 1 if zero
                        let exit_code = if value != 0 { 0 } else { 1 };
                        Ok(ExecResult::new(String::new(), String::new(), exit_code))
                    }
                    Err(e) => {
                        Ok(ExecResult::new(
                            String::new(),
                            format!("bash: {}\n", e),
                            1,
                        ))
                    }
                }
            }

            CompoundCommandNode::ConditionalCommand(cond) => {
                use crate::interpreter::conditional_eval::evaluate_conditional;

                let result = evaluate_conditional(state, self.fs, &cond.expression, Some(&exec_fn));
                let exit_code = if result.truth { 0 } else { 1 };
                Ok(ExecResult::new(String::new(), result.stderr, exit_code))
            }

            CompoundCommandNode::CStyleFor(cfor) => {
                use crate::interpreter::control_flow::execute_c_style_for;

                let body: Vec<&StatementNode> = cfor.body.iter().collect();

                let result = execute_c_style_for(
                    state,
                    self.limits,
                    cfor.init.as_ref(),
                    cfor.condition.as_ref(),
                    cfor.update.as_ref(),
                    &body,
                    self.limits.max_iterations as usize,
                    |state, stmt| self.execute_statement(state, stmt),
                )?;

                Ok(ExecResult::new(result.stdout, result.stderr, result.exit_code))
            }
        }
    }
}

/// `echo`: supports `-n` (no trailing newline), `-e` (interpret backslash
/// escapes) and `-E` (the default; disables escape interpretation again if
/// it follows a `-e`).
fn run_echo(args: &[String]) -> ExecResult {
    let mut interpret_escapes = false;
    let mut trailing_newline = true;
    let mut rest = args;

    while let Some(first) = rest.first() {
        match first.as_str() {
            "-n" => trailing_newline = false,
            "-e" => interpret_escapes = true,
            "-E" => interpret_escapes = false,
            _ => break,
        }
        rest = &rest[1..];
    }

    let mut out = String::new();
    for (i, word) in rest.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        if interpret_escapes {
            out.push_str(&interpret_echo_escapes(word));
        } else {
            out.push_str(word);
        }
    }
    if trailing_newline {
        out.push('\n');
    }
    ExecResult::new(out, String::new(), 0)
}

fn interpret_echo_escapes(s: &str) -> String {
    let mut out = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('a') => out.push('\u{07}'),
            Some('b') => out.push('\u{08}'),
            Some('c') => break,
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// `printf`: supports `%s`, `%d`/`%i`, `%%`, and `\n`/`\t`-style escapes in
/// the format string. The format is recycled over any arguments left once it
/// runs out of conversions, the way bash's does.
fn run_printf(args: &[String]) -> ExecResult {
    let Some(format) = args.first() else {
        return ExecResult::new(String::new(), "bash: printf: usage: printf format [arguments]\n".to_string(), 2);
    };
    let values = &args[1..];

    let mut out = String::new();
    let mut value_idx = 0;
    let mut consumed_any = false;

    loop {
        let mut chars = format.chars().peekable();
        let start_idx = value_idx;
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('\\') => out.push('\\'),
                    Some(other) => { out.push('\\'); out.push(other); }
                    None => out.push('\\'),
                }
                continue;
            }
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('%') => out.push('%'),
                Some('s') => {
                    out.push_str(values.get(value_idx).map(String::as_str).unwrap_or(""));
                    value_idx += 1;
                    consumed_any = true;
                }
                Some(spec @ ('d' | 'i')) => {
                    let _ = spec;
                    let raw = values.get(value_idx).map(String::as_str).unwrap_or("0");
                    let n: i64 = raw.trim().parse().unwrap_or(0);
                    out.push_str(&n.to_string());
                    value_idx += 1;
                    consumed_any = true;
                }
                Some('b') => {
                    out.push_str(&interpret_echo_escapes(values.get(value_idx).map(String::as_str).unwrap_or("")));
                    value_idx += 1;
                    consumed_any = true;
                }
                Some(other) => {
                    out.push('%');
                    out.push(other);
                }
                None => out.push('%'),
            }
        }

        if values.is_empty() || value_idx >= values.len() || value_idx == start_idx {
            break;
        }
        let _ = consumed_any;
    }

    ExecResult::new(out, String::new(), 0)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{InMemoryFs, FileSystem as AsyncFileSystem};
    use crate::interpreter::sync_fs_adapter::SyncFsAdapter;
    use std::sync::Arc;

    fn make_engine_and_state() -> (ExecutionEngine<'static>, InterpreterState, Arc<InMemoryFs>) {
        let fs = Arc::new(InMemoryFs::new());
        let limits = Box::leak(Box::new(ExecutionLimits::default()));

        // We need a static reference for the test, so we leak the adapter
        let handle = tokio::runtime::Handle::current();
        let adapter = Box::leak(Box::new(SyncFsAdapter::new(fs.clone(), handle)));

        let engine = ExecutionEngine::new(limits, adapter);
        let state = InterpreterState::default();

        (engine, state, fs)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_echo() {
        let (engine, mut state, _fs) = make_engine_and_state();

        let ast = crate::parser::parse("echo hello world").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();

        assert_eq!(result.stdout, "hello world\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_variable_expansion() {
        let (engine, mut state, _fs) = make_engine_and_state();

        let ast = crate::parser::parse("NAME=world; echo hello $NAME").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();

        assert_eq!(result.stdout, "hello world\n");
        assert_eq!(result.exit_code, 0);
        assert_eq!(state.env.get("NAME"), Some(&"world".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_true_false() {
        let (engine, mut state, _fs) = make_engine_and_state();

        let ast = crate::parser::parse("true").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.exit_code, 0);

        let ast = crate::parser::parse("false").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.exit_code, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_and_or() {
        let (engine, mut state, _fs) = make_engine_and_state();

        // true && echo yes
        let ast = crate::parser::parse("true && echo yes").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.stdout, "yes\n");

        // false && echo no (should not print)
        let ast = crate::parser::parse("false && echo no").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.stdout, "");

        // false || echo fallback
        let ast = crate::parser::parse("false || echo fallback").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.stdout, "fallback\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_if() {
        let (engine, mut state, _fs) = make_engine_and_state();

        let ast = crate::parser::parse("if true; then echo yes; fi").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.stdout, "yes\n");

        let ast = crate::parser::parse("if false; then echo no; else echo else; fi").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.stdout, "else\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_for() {
        let (engine, mut state, _fs) = make_engine_and_state();

        let ast = crate::parser::parse("for i in a b c; do echo $i; done").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.stdout, "a\nb\nc\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_while() {
        let (engine, mut state, _fs) = make_engine_and_state();

        let ast = crate::parser::parse("while false; do echo loop; done").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.stdout, "");
        assert_eq!(result.exit_code, 0);

        let ast = crate::parser::parse("x=3; while [ $x -gt 0 ]; do echo $x; x=$((x - 1)); done").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.stdout, "3\n2\n1\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_subshell() {
        let (engine, mut state, _fs) = make_engine_and_state();

        // Subshell should not affect parent
        let ast = crate::parser::parse("X=original; (X=modified; echo $X); echo $X").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.stdout, "modified\noriginal\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_group() {
        let (engine, mut state, _fs) = make_engine_and_state();

        let ast = crate::parser::parse("{ echo a; echo b; }").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.stdout, "a\nb\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_pwd_cd() {
        let fs = Arc::new(InMemoryFs::new());
        let limits = Box::leak(Box::new(ExecutionLimits::default()));

        // Create directory structure using async API directly
        fs.mkdir("/home", &crate::fs::MkdirOptions { recursive: false }).await.unwrap();
        fs.mkdir("/home/user", &crate::fs::MkdirOptions { recursive: false }).await.unwrap();

        // Now create the sync adapter
        let handle = tokio::runtime::Handle::current();
        let adapter = Box::leak(Box::new(SyncFsAdapter::new(fs.clone(), handle)));

        let engine = ExecutionEngine::new(limits, adapter);
        let mut state = InterpreterState::default();

        state.cwd = "/".to_string();
        state.env.insert("PWD".to_string(), "/".to_string());

        let ast = crate::parser::parse("pwd").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.stdout, "/\n");

        let ast = crate::parser::parse("cd /home/user && pwd").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.stdout, "/home/user\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_redirection_to_file() {
        let (engine, mut state, fs) = make_engine_and_state();
        state.cwd = "/".to_string();

        let ast = crate::parser::parse("echo hello > /out.txt").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.exit_code, 0);

        let contents = fs.read_file("/out.txt").await.unwrap();
        assert_eq!(contents, "hello\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_user_function_call() {
        let (engine, mut state, _fs) = make_engine_and_state();

        let ast = crate::parser::parse("greet() { echo hi $1; }; greet world").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.stdout, "hi world\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_printf() {
        let (engine, mut state, _fs) = make_engine_and_state();

        let ast = crate::parser::parse("printf '%s-%d\\n' foo 42").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.stdout, "foo-42\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_let() {
        let (engine, mut state, _fs) = make_engine_and_state();

        let ast = crate::parser::parse("let 'x = 2 + 3'; echo $x").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.stdout, "5\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_read() {
        let (engine, mut state, _fs) = make_engine_and_state();

        let ast = crate::parser::parse("read name").unwrap();
        let CommandNode::Simple(cmd) = &ast.statements[0].pipelines[0].commands[0] else {
            panic!("expected a simple command");
        };
        let result = engine.execute_simple_command(&mut state, cmd, "world\n").unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(state.env.get("name"), Some(&"world".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_background_and_wait() {
        let (engine, mut state, _fs) = make_engine_and_state();

        let ast = crate::parser::parse("echo backgrounded &").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(state.env.get("!").is_some());

        let ast = crate::parser::parse("wait $!").unwrap();
        let result = engine.execute_script(&mut state, &ast).unwrap();
        assert_eq!(result.exit_code, 0);
    }
}
