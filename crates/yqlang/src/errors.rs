//! Error types for the three failure surfaces: compilation, execution, and
//! the driver.
//!
//! Compile errors carry a byte offset into the source; runtime errors carry
//! the bytecode offset of the faulting instruction. User-visible rendering is
//! a single line (`Runtime Error: <message>`), with the structured kind kept
//! for hosts that want to branch on it (the driver distinguishes
//! [`RuntimeErrorKind::Cancelled`] from genuine script bugs).

use std::fmt;

/// Result alias used throughout the compilation pipeline.
pub type CompileResult<T> = Result<T, CompileError>;

/// Result alias used throughout the VM and builtins.
pub type RunResult<T> = Result<T, RuntimeError>;

/// A fatal error raised while turning source text into a program.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    /// What went wrong.
    pub kind: CompileErrorKind,
    /// Byte offset into the source where the error was detected.
    pub pos: usize,
}

/// The kinds of compile-time failure.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileErrorKind {
    /// The lexer hit a character that starts no token.
    Tokenizer { ch: char },
    /// The parser found a token it cannot use here.
    UnexpectedToken {
        expected: Option<String>,
        got: String,
    },
    /// The parser ran out of tokens mid-construct. Kept distinct from
    /// `UnexpectedToken` so the REPL can keep accumulating input lines.
    UnexpectedEof,
    /// An identifier that can never resolve (e.g. `$name`).
    Name { name: String },
    /// A name declared twice in the same scope.
    Redeclaration { name: String },
    /// The left side of an assignment is not a place expression.
    IllegalAssignmentTarget,
    /// `this`, `$`, or `$N` used as a declaration or assignment target.
    ReservedName { name: String },
}

impl CompileError {
    pub(crate) fn new(kind: CompileErrorKind, pos: usize) -> Self {
        Self { kind, pos }
    }

    /// True when the input simply ended too early. The REPL treats this as
    /// "keep reading lines" rather than a hard failure.
    #[must_use]
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self.kind, CompileErrorKind::UnexpectedEof)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Compile Error: ")?;
        match &self.kind {
            CompileErrorKind::Tokenizer { ch } => {
                write!(f, "unrecognized character {ch:?} at offset {}", self.pos)
            }
            CompileErrorKind::UnexpectedToken { expected, got } => match expected {
                Some(expected) => {
                    write!(f, "expected {expected}, got {got} at offset {}", self.pos)
                }
                None => write!(f, "unexpected {got} at offset {}", self.pos),
            },
            CompileErrorKind::UnexpectedEof => write!(f, "unexpected end of input"),
            CompileErrorKind::Name { name } => {
                write!(f, "name {name:?} cannot be resolved at offset {}", self.pos)
            }
            CompileErrorKind::Redeclaration { name } => {
                write!(f, "{name:?} is already declared in this scope")
            }
            CompileErrorKind::IllegalAssignmentTarget => {
                write!(f, "illegal assignment target at offset {}", self.pos)
            }
            CompileErrorKind::ReservedName { name } => {
                write!(f, "{name:?} is reserved and cannot be assigned")
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// A fatal error raised while executing a program.
///
/// All runtime errors abort the current run; output actions buffered before
/// the fault are preserved by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    /// What went wrong.
    pub kind: RuntimeErrorKind,
    /// Bytecode offset of the faulting instruction, if known.
    pub instr: usize,
}

/// The kinds of runtime failure.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeErrorKind {
    /// An operand had the wrong type for the operation.
    TypeMismatch { expected: String, got: String },
    /// Index or slice endpoint outside the container.
    IndexOutOfRange { index: i64, len: usize },
    /// Attribute call fell through both the object and the builtin table.
    NoSuchMethod { receiver: String, method: String },
    /// Integer division or remainder by zero.
    DivideByZero,
    /// Call stack exceeded the configured recursion limit.
    RecursionTooDeep { limit: usize },
    /// A builtin received an argument list it cannot accept.
    BuiltinArity { name: &'static str, message: String },
    /// The driver cancelled the run (budget exhausted or host request).
    Cancelled,
    /// A list pattern was matched against a non-list value.
    PatternMatch { got: String },
}

impl RuntimeError {
    pub(crate) fn new(kind: RuntimeErrorKind) -> Self {
        Self { kind, instr: 0 }
    }

    /// Attaches the faulting instruction offset. The VM calls this at the
    /// dispatch loop boundary so individual operations don't need to know
    /// their own offset.
    #[must_use]
    pub(crate) fn at(mut self, instr: usize) -> Self {
        self.instr = instr;
        self
    }

    pub(crate) fn type_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        })
    }

    pub(crate) fn index_out_of_range(index: i64, len: usize) -> Self {
        Self::new(RuntimeErrorKind::IndexOutOfRange { index, len })
    }

    pub(crate) fn no_such_method(receiver: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::NoSuchMethod {
            receiver: receiver.into(),
            method: method.into(),
        })
    }

    pub(crate) fn divide_by_zero() -> Self {
        Self::new(RuntimeErrorKind::DivideByZero)
    }

    pub(crate) fn arity(name: &'static str, message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::BuiltinArity {
            name,
            message: message.into(),
        })
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(RuntimeErrorKind::Cancelled)
    }

    pub(crate) fn pattern_match(got: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::PatternMatch { got: got.into() })
    }

    /// True when the run was stopped by the driver rather than by a bug in
    /// the script.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, RuntimeErrorKind::Cancelled)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Runtime Error: ")?;
        match &self.kind {
            RuntimeErrorKind::TypeMismatch { expected, got } => {
                write!(f, "expected {expected}, got {got}")
            }
            RuntimeErrorKind::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            RuntimeErrorKind::NoSuchMethod { receiver, method } => {
                write!(f, "{receiver} has no method {method:?}")
            }
            RuntimeErrorKind::DivideByZero => write!(f, "division by zero"),
            RuntimeErrorKind::RecursionTooDeep { limit } => {
                write!(f, "recursion depth exceeded the limit of {limit}")
            }
            RuntimeErrorKind::BuiltinArity { name, message } => {
                write!(f, "{name}: {message}")
            }
            RuntimeErrorKind::Cancelled => write!(f, "execution cancelled"),
            RuntimeErrorKind::PatternMatch { got } => {
                write!(f, "cannot destructure {got} with a list pattern")
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Errors raised by the driver around a run, not by the script itself.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverError {
    /// The per-program concurrent-instance cap was hit.
    TooManyInstances { limit: usize },
    /// The prior-globals blob could not be decoded.
    Serialization { message: String },
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyInstances { limit } => {
                write!(f, "Driver Error: too many concurrent instances (limit {limit})")
            }
            Self::Serialization { message } => {
                write!(f, "Driver Error: {message}")
            }
        }
    }
}

impl std::error::Error for DriverError {}
