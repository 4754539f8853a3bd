//! yqlang — an event-driven, embeddable scripting language.
//!
//! Each time a host emits an event (a message, a timer tick, a nudge) the
//! runtime executes a persisted script against it, producing side-effect
//! [`Action`]s and updating per-script globals that round-trip through JSON
//! between runs. Scripts execute on a bytecode VM under a strict CPU /
//! wall-clock budget and recursion cap.
//!
//! # Pipeline
//!
//! Source text → lexer → parser (AST with lexical scopes) → resolver (name
//! resolution, capture analysis, slot layout) → bytecode compiler →
//! stack-based VM with a reference-semantics heap.
//!
//! # Example
//!
//! ```
//! use yqlang::{BufferHost, EventMap, Program, Runner, RunnerConfig};
//!
//! let program = Program::compile(
//!     "init counter = 0\nif text { counter += 1; say \"seen \" + counter }",
//!     "counter.yq",
//! )
//! .unwrap();
//! let runner = Runner::new(program, RunnerConfig::default());
//!
//! let events = EventMap::new().with_text("hello");
//! let outcome = runner.run(events, None, BufferHost::new()).unwrap();
//! assert_eq!(outcome.globals.get("counter").and_then(|v| v.as_i64()), Some(1));
//! ```

mod ast;
mod budget;
mod builtins;
mod bytecode;
mod errors;
mod globals;
mod heap;
mod host;
mod intern;
mod lexer;
mod parse;
mod program;
mod repl;
mod resolver;
mod runner;
mod value;

pub use crate::{
    errors::{
        CompileError, CompileErrorKind, DriverError, RuntimeError, RuntimeErrorKind,
    },
    globals::SymbolTable,
    host::{Action, BufferHost, EventMap, HostContext, NullHost},
    program::Program,
    repl::{ReplOutcome, ReplRun, ReplSession},
    runner::{RunOutcome, Runner, RunnerConfig},
};
