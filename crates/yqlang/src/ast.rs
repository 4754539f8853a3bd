//! Typed AST produced by the parser and annotated by the resolver.
//!
//! Identifier nodes start out unresolved; [`crate::resolver`] fills in a
//! [`Resolution`] for every occurrence and a [`FrameLayout`] for every
//! function literal (and for the module itself) before the compiler runs.

use crate::builtins::Builtin;

/// How one identifier occurrence resolves. Filled in by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Slot in the persistent global region.
    Global(u16),
    /// Local slot of the current frame. Whether the slot is an ordinary
    /// value or a promoted capture cell is recorded in the frame layout, not
    /// per occurrence.
    Local(u16),
    /// Capture slot of the current frame.
    Capture(u16),
    /// The reserved `this` receiver slot.
    This,
    /// The reserved `$` arguments list.
    Args,
    /// The reserved `$N` argument access (null when absent).
    Arg(u16),
    /// A builtin procedure referenced by name.
    Builtin(Builtin),
}

/// Where a closure capture is materialized from when the closure is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// The cell held in the enclosing frame's local slot.
    EnclosingLocal(u16),
    /// The cell held in the enclosing frame's capture slot (a transitive
    /// capture passing through).
    EnclosingCapture(u16),
}

/// Stack-slot layout of one frame, computed by the resolver.
///
/// Runtime frames are laid out as `[this, args, captures.., locals..]`; this
/// structure describes the locals portion plus how captures are sourced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameLayout {
    /// Total number of local slots (params first, then other bindings).
    pub num_locals: u16,
    /// Slots of the declared parameters, in declaration order.
    pub param_slots: Vec<u16>,
    /// Local slots promoted to heap cells because an inner frame captures
    /// them. Sorted ascending.
    pub cell_slots: Vec<u16>,
    /// One entry per capture slot of this frame, naming where the cell comes
    /// from in the enclosing frame.
    pub captures: Vec<CaptureSource>,
}

impl FrameLayout {
    /// Whether `slot` holds a promoted capture cell.
    #[must_use]
    pub fn is_cell(&self, slot: u16) -> bool {
        self.cell_slots.binary_search(&slot).is_ok()
    }
}

/// An identifier occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub pos: usize,
    /// Filled by the resolver; `None` only before resolution.
    pub res: Option<Resolution>,
}

impl Ident {
    pub(crate) fn new(name: String, pos: usize) -> Self {
        Self { name, pos, res: None }
    }

    /// The resolution, which must have been filled in.
    ///
    /// # Panics
    /// Panics if called before the resolver ran; compilation always resolves
    /// first.
    #[must_use]
    pub fn resolution(&self) -> Resolution {
        self.res.expect("identifier not resolved before compilation")
    }
}

/// Literal constants.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Binary operators in source order of the precedence table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    In,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
}

/// One postfix step of an access chain.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessStep {
    /// `.name`
    Attr { name: String, pos: usize },
    /// `[index]` where the index expression yields an integer or string key.
    Index(Expr),
    /// `[begin:end]` with either endpoint optional.
    Slice {
        begin: Option<Expr>,
        end: Option<Expr>,
    },
}

/// A function literal: lambda or `func` body.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncLit {
    /// Parameter names in declaration order.
    pub params: Vec<Ident>,
    pub body: Box<Stmt>,
    pub pos: usize,
    /// Filled by the resolver.
    pub layout: Option<FrameLayout>,
}

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal { value: Literal, pos: usize },
    Ident(Ident),
    ListLit { items: Vec<Expr>, pos: usize },
    ObjectLit { entries: Vec<(String, Expr)>, pos: usize },
    Unary { op: UnOp, expr: Box<Expr>, pos: usize },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr>, pos: usize },
    /// Short-circuit `&&`.
    And { lhs: Box<Expr>, rhs: Box<Expr>, pos: usize },
    /// Short-circuit `||`.
    Or { lhs: Box<Expr>, rhs: Box<Expr>, pos: usize },
    /// One postfix access step applied to a base expression. Chains nest.
    Access { base: Box<Expr>, step: Box<AccessStep>, pos: usize },
    /// `callee(args)`.
    Call { callee: Box<Expr>, args: Vec<Expr>, pos: usize },
    Lambda(FuncLit),
}

impl Expr {
    /// Source position of this expression.
    #[must_use]
    pub fn pos(&self) -> usize {
        match self {
            Self::Literal { pos, .. }
            | Self::ListLit { pos, .. }
            | Self::ObjectLit { pos, .. }
            | Self::Unary { pos, .. }
            | Self::Binary { pos, .. }
            | Self::And { pos, .. }
            | Self::Or { pos, .. }
            | Self::Access { pos, .. }
            | Self::Call { pos, .. } => *pos,
            Self::Ident(ident) => ident.pos,
            Self::Lambda(func) => func.pos,
        }
    }
}

/// Assignment targets (places).
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Ident(Ident),
    /// An access chain: base expression plus one or more steps.
    Access {
        base: Box<Expr>,
        steps: Vec<AccessStep>,
        pos: usize,
    },
    /// List-pattern destructuring; shorter-wins against the RHS.
    List { targets: Vec<AssignTarget>, pos: usize },
}

/// Patterns usable as `for` loop variables.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Ident(Ident),
    List { patterns: Vec<Pattern>, pos: usize },
}

/// Side-effect action statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Say,
    Nudge,
    PicSave,
    PicSend,
}

/// Compound-assignment operators map onto their binary op.
pub type AssignOp = Option<BinOp>;

/// Statements.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// A bare expression; its value lands in the statement register.
    Expr(Expr),
    Assign {
        target: AssignTarget,
        op: AssignOp,
        value: Expr,
        pos: usize,
    },
    Action {
        kind: ActionKind,
        value: Expr,
        pos: usize,
    },
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
        pos: usize,
    },
    /// `init STMT` — runs only on the first run of a script.
    Init { body: Box<Stmt>, pos: usize },
    Block { stmts: Vec<Stmt>, pos: usize },
    /// `func name(params) body` — sugar for binding a closure to `name`.
    FuncDecl {
        name: Ident,
        func: FuncLit,
        pos: usize,
    },
    Return { value: Option<Expr>, pos: usize },
    While {
        cond: Expr,
        body: Box<Stmt>,
        pos: usize,
    },
    For {
        pattern: Pattern,
        iterable: Expr,
        body: Box<Stmt>,
        pos: usize,
    },
    Continue { pos: usize },
    Break { pos: usize },
}

/// A parsed module: the top-level statement list plus, after resolution, the
/// module frame's layout and the number of global slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub stmts: Vec<Stmt>,
    /// Layout of the module frame (loop variables and other non-root
    /// bindings live here). Filled by the resolver.
    pub layout: Option<FrameLayout>,
    /// Global names in first-reference order. Filled by the resolver.
    pub globals: Vec<String>,
}

impl Module {
    pub(crate) fn new(stmts: Vec<Stmt>) -> Self {
        Self {
            stmts,
            layout: None,
            globals: Vec::new(),
        }
    }
}
