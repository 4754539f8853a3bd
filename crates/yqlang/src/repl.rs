//! Interactive session state for the console driver.
//!
//! Input lines accumulate until they parse, or until parsing fails with an
//! error other than unexpected end of input. Each completed snippet runs
//! synchronously under the configured allowance; globals persist between
//! snippets through the same JSON round-trip the event driver uses, so
//! `init` statements run only on the session's first snippet.

use serde_json::{Map as JsonMap, Value as Json};

use std::time::Duration;

use crate::{
    budget::Budget,
    errors::{CompileError, RuntimeError},
    host::{Action, BufferHost, EventMap},
    program::Program,
    runner::{RunnerConfig, execute_script},
};

/// Result of one completed snippet.
#[derive(Debug)]
pub struct ReplRun {
    /// Actions the snippet produced, in order.
    pub actions: Vec<Action>,
    /// The final expression value, rendered.
    pub value_repr: String,
    /// The runtime error that aborted the snippet, if any.
    pub error: Option<RuntimeError>,
}

/// What happened to a fed line.
#[derive(Debug)]
pub enum ReplOutcome {
    /// The input is incomplete; feed more lines.
    NeedMore,
    /// The accumulated input failed to compile; the buffer was discarded.
    CompileError(CompileError),
    /// The snippet ran.
    Ran(ReplRun),
}

/// A line-accumulating interactive session.
#[derive(Debug)]
pub struct ReplSession {
    pending: String,
    globals: Option<JsonMap<String, Json>>,
    config: RunnerConfig,
}

impl Default for ReplSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplSession {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    #[must_use]
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            pending: String::new(),
            globals: None,
            config,
        }
    }

    /// Whether the session is waiting for more lines of a multi-line
    /// construct.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Discards any accumulated partial input.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// The session's persisted globals, as they would be stored by a host.
    #[must_use]
    pub fn globals(&self) -> Option<&JsonMap<String, Json>> {
        self.globals.as_ref()
    }

    /// Feeds one input line.
    pub fn feed(&mut self, line: &str) -> ReplOutcome {
        if !self.pending.is_empty() {
            self.pending.push('\n');
        }
        self.pending.push_str(line);

        let program = match Program::compile(&self.pending, "<repl>") {
            Ok(program) => program,
            Err(err) if err.is_unexpected_eof() => return ReplOutcome::NeedMore,
            Err(err) => {
                self.pending.clear();
                return ReplOutcome::CompileError(err);
            }
        };
        self.pending.clear();

        let mut host = BufferHost::new();
        let mut budget = Budget::with_allowance(
            self.config.max_recursion_depth,
            Duration::from_millis(self.config.allowance_ms),
        );
        let finish = execute_script(
            &program,
            &EventMap::new(),
            self.globals.as_ref(),
            &mut host,
            &mut budget,
        );
        self.globals = Some(finish.globals);
        ReplOutcome::Ran(ReplRun {
            actions: host.into_actions(),
            value_repr: finish.value_repr,
            error: finish.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_until_parse_succeeds() {
        let mut session = ReplSession::new();
        assert!(matches!(session.feed("if true {"), ReplOutcome::NeedMore));
        assert!(session.is_pending());
        let ReplOutcome::Ran(run) = session.feed("say \"hi\" }") else {
            panic!("expected completed snippet");
        };
        assert_eq!(run.actions, vec![Action::Text("hi".to_owned())]);
    }

    #[test]
    fn hard_errors_clear_the_buffer() {
        let mut session = ReplSession::new();
        assert!(matches!(session.feed("x = )"), ReplOutcome::CompileError(_)));
        assert!(!session.is_pending());
    }

    #[test]
    fn globals_persist_between_snippets() {
        let mut session = ReplSession::new();
        let ReplOutcome::Ran(_) = session.feed("x = 41") else {
            panic!("expected run");
        };
        let ReplOutcome::Ran(run) = session.feed("x + 1") else {
            panic!("expected run");
        };
        assert_eq!(run.value_repr, "42");
    }

    #[test]
    fn init_runs_only_on_first_snippet() {
        let mut session = ReplSession::new();
        let ReplOutcome::Ran(_) = session.feed("init counter = 10") else {
            panic!("expected run");
        };
        let ReplOutcome::Ran(run) = session.feed("init counter = 99\ncounter") else {
            panic!("expected run");
        };
        assert_eq!(run.value_repr, "10");
    }
}
