//! Name resolution and frame analysis.
//!
//! Walks the parsed module once, annotating every identifier occurrence with
//! a [`Resolution`] and every function literal (plus the module itself) with
//! a [`FrameLayout`]. Each binding gets a unique home:
//!
//! - bindings created in the module's root scope are globals;
//! - bindings created anywhere else live in a local slot of their frame;
//! - a free variable found in an enclosing frame becomes a capture, and the
//!   capture is recorded transitively in every frame between the definition
//!   and the use, with the defining slot promoted to a heap cell;
//! - a free variable found nowhere resolves to a builtin if one matches the
//!   name, otherwise it becomes a fresh global (created on first reference).
//!
//! The reserved forms `this`, `$`, and `$N` never bind; assigning them is a
//! [`CompileErrorKind::ReservedName`] error, and any other `$`-prefixed
//! spelling is a [`CompileErrorKind::Name`] error. Function names, parameter
//! names, and `for`-pattern variables are declarations; declaring the same
//! name twice in one scope is a [`CompileErrorKind::Redeclaration`] error.

use ahash::{AHashMap, AHashSet};

use crate::{
    ast::{
        AccessStep, AssignTarget, CaptureSource, Expr, FrameLayout, FuncLit, Ident, Module,
        Pattern, Resolution, Stmt,
    },
    builtins::Builtin,
    errors::{CompileError, CompileErrorKind, CompileResult},
};

/// Resolves every identifier in `module` and computes frame layouts.
pub fn resolve(module: &mut Module) -> CompileResult<()> {
    let mut resolver = Resolver::new();
    for stmt in &mut module.stmts {
        resolver.resolve_stmt(stmt)?;
    }
    let frame = resolver.frames.pop().expect("module frame missing");
    module.layout = Some(frame.finish());
    module.globals = resolver.globals;
    Ok(())
}

/// Where a visible binding lives.
#[derive(Debug, Clone, Copy)]
enum ScopeBinding {
    Global(u16),
    Frame { frame: usize, slot: u16 },
}

#[derive(Debug, Default)]
struct ScopeState {
    /// Index into `Resolver::frames` of the frame this scope belongs to.
    frame: usize,
    /// Whether this is the module's root scope (bindings become globals).
    module_root: bool,
    bindings: AHashMap<String, ScopeBinding>,
    /// Names introduced by declarations (func names, params, loop vars).
    declared: AHashSet<String>,
}

#[derive(Debug, Default)]
struct FrameState {
    next_local: u16,
    param_slots: Vec<u16>,
    cell_slots: Vec<u16>,
    captures: Vec<CaptureSource>,
    /// Maps a captured binding's identity `(defining frame, slot)` to its
    /// capture slot in this frame.
    capture_map: AHashMap<(usize, u16), u16>,
}

impl FrameState {
    fn alloc_local(&mut self) -> u16 {
        let slot = self.next_local;
        self.next_local += 1;
        slot
    }

    fn promote_cell(&mut self, slot: u16) {
        if !self.cell_slots.contains(&slot) {
            self.cell_slots.push(slot);
        }
    }

    fn finish(mut self) -> FrameLayout {
        self.cell_slots.sort_unstable();
        FrameLayout {
            num_locals: self.next_local,
            param_slots: self.param_slots,
            cell_slots: self.cell_slots,
            captures: self.captures,
        }
    }
}

struct Resolver {
    frames: Vec<FrameState>,
    scopes: Vec<ScopeState>,
    /// Global names in first-reference order; indices are the global slots.
    globals: Vec<String>,
}

impl Resolver {
    fn new() -> Self {
        Self {
            frames: vec![FrameState::default()],
            scopes: vec![ScopeState {
                frame: 0,
                module_root: true,
                ..ScopeState::default()
            }],
            globals: Vec::new(),
        }
    }

    fn current_frame(&self) -> usize {
        self.frames.len() - 1
    }

    fn new_global(&mut self, name: &str) -> u16 {
        let slot = u16::try_from(self.globals.len()).expect("too many globals");
        self.globals.push(name.to_owned());
        // globals always register in the module root scope so every later
        // reference, from any nesting depth, finds the same slot
        self.scopes[0]
            .bindings
            .insert(name.to_owned(), ScopeBinding::Global(slot));
        slot
    }

    fn lookup(&self, name: &str) -> Option<ScopeBinding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(name).copied())
    }

    /// Resolves a reserved spelling, or returns `None` for ordinary names.
    fn reserved(name: &str, pos: usize) -> CompileResult<Option<Resolution>> {
        if name == "this" {
            return Ok(Some(Resolution::This));
        }
        if let Some(rest) = name.strip_prefix('$') {
            if rest.is_empty() {
                return Ok(Some(Resolution::Args));
            }
            return match rest.parse::<u16>() {
                Ok(n) => Ok(Some(Resolution::Arg(n))),
                Err(_) => Err(CompileError::new(
                    CompileErrorKind::Name { name: name.to_owned() },
                    pos,
                )),
            };
        }
        Ok(None)
    }

    /// Records a capture of `(def_frame, slot)` through every frame between
    /// the definition and the current frame, returning the capture slot in
    /// the current frame.
    fn capture_binding(&mut self, def_frame: usize, slot: u16) -> u16 {
        self.frames[def_frame].promote_cell(slot);
        let current = self.current_frame();
        let mut source = CaptureSource::EnclosingLocal(slot);
        let mut capture_idx = 0;
        for fi in def_frame + 1..=current {
            let frame = &mut self.frames[fi];
            capture_idx = match frame.capture_map.get(&(def_frame, slot)) {
                Some(&idx) => idx,
                None => {
                    let idx = u16::try_from(frame.captures.len()).expect("too many captures");
                    frame.captures.push(source);
                    frame.capture_map.insert((def_frame, slot), idx);
                    idx
                }
            };
            source = CaptureSource::EnclosingCapture(capture_idx);
        }
        capture_idx
    }

    fn binding_resolution(&mut self, binding: ScopeBinding) -> Resolution {
        match binding {
            ScopeBinding::Global(slot) => Resolution::Global(slot),
            ScopeBinding::Frame { frame, slot } => {
                if frame == self.current_frame() {
                    Resolution::Local(slot)
                } else {
                    Resolution::Capture(self.capture_binding(frame, slot))
                }
            }
        }
    }

    /// Resolves a read occurrence of an identifier.
    fn resolve_read(&mut self, ident: &mut Ident) -> CompileResult<()> {
        if let Some(reserved) = Self::reserved(&ident.name, ident.pos)? {
            ident.res = Some(reserved);
            return Ok(());
        }
        let resolution = match self.lookup(&ident.name) {
            Some(binding) => self.binding_resolution(binding),
            None => match Builtin::from_name(&ident.name) {
                Some(builtin) => Resolution::Builtin(builtin),
                None => Resolution::Global(self.new_global(&ident.name)),
            },
        };
        ident.res = Some(resolution);
        Ok(())
    }

    /// Resolves an assignment occurrence, creating the binding if new.
    ///
    /// `declare` marks declarations (func names, params, loop variables),
    /// which must not repeat within one scope.
    fn resolve_bind(&mut self, ident: &mut Ident, declare: bool) -> CompileResult<()> {
        if Self::reserved(&ident.name, ident.pos)?.is_some() {
            return Err(CompileError::new(
                CompileErrorKind::ReservedName {
                    name: ident.name.clone(),
                },
                ident.pos,
            ));
        }
        if declare {
            let scope = self.scopes.last_mut().expect("scope stack empty");
            if !scope.declared.insert(ident.name.clone()) {
                return Err(CompileError::new(
                    CompileErrorKind::Redeclaration {
                        name: ident.name.clone(),
                    },
                    ident.pos,
                ));
            }
        }
        let resolution = if declare && !self.scopes.last().expect("scope stack empty").module_root {
            // declarations shadow enclosing bindings: always a fresh slot in
            // the current scope's frame
            self.declare_here(&ident.name)
        } else {
            match self.lookup(&ident.name) {
                Some(binding) => self.binding_resolution(binding),
                None => self.declare_here(&ident.name),
            }
        };
        ident.res = Some(resolution);
        Ok(())
    }

    /// Creates a binding for `name` in the current scope and returns its
    /// resolution: a global at the module root, a frame local elsewhere.
    fn declare_here(&mut self, name: &str) -> Resolution {
        let scope_is_root = self.scopes.last().expect("scope stack empty").module_root;
        if scope_is_root {
            Resolution::Global(self.new_global(name))
        } else {
            let frame_idx = self.scopes.last().expect("scope stack empty").frame;
            let slot = self.frames[frame_idx].alloc_local();
            self.scopes
                .last_mut()
                .expect("scope stack empty")
                .bindings
                .insert(name.to_owned(), ScopeBinding::Frame { frame: frame_idx, slot });
            Resolution::Local(slot)
        }
    }

    // -----------------------------------------------------------------
    // walkers

    fn resolve_stmt(&mut self, stmt: &mut Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Expr(expr) => self.resolve_expr(expr),
            Stmt::Assign { target, value, .. } => {
                // RHS first: `x = x + 1` reads the old binding, and a fresh
                // `x` on the left must not capture its own RHS occurrence
                self.resolve_expr(value)?;
                self.resolve_target(target)
            }
            Stmt::Action { value, .. } => self.resolve_expr(value),
            Stmt::If { cond, then, otherwise, .. } => {
                self.resolve_expr(cond)?;
                self.resolve_stmt(then)?;
                if let Some(otherwise) = otherwise {
                    self.resolve_stmt(otherwise)?;
                }
                Ok(())
            }
            Stmt::Init { body, .. } => self.resolve_stmt(body),
            Stmt::Block { stmts, .. } => {
                for stmt in stmts {
                    self.resolve_stmt(stmt)?;
                }
                Ok(())
            }
            Stmt::FuncDecl { name, func, .. } => {
                // bind the name before the body so the function can recurse
                self.resolve_bind(name, true)?;
                self.resolve_func(func)
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.resolve_expr(value)?;
                }
                Ok(())
            }
            Stmt::While { cond, body, .. } => {
                self.resolve_expr(cond)?;
                self.resolve_stmt(body)
            }
            Stmt::For {
                pattern,
                iterable,
                body,
                ..
            } => {
                self.resolve_expr(iterable)?;
                // the loop opens a fresh sub-scope holding the pattern vars
                self.scopes.push(ScopeState {
                    frame: self.current_frame(),
                    ..ScopeState::default()
                });
                self.resolve_pattern(pattern)?;
                self.resolve_stmt(body)?;
                self.scopes.pop();
                Ok(())
            }
            Stmt::Continue { .. } | Stmt::Break { .. } => Ok(()),
        }
    }

    fn resolve_pattern(&mut self, pattern: &mut Pattern) -> CompileResult<()> {
        match pattern {
            Pattern::Ident(ident) => self.resolve_bind(ident, true),
            Pattern::List { patterns, .. } => {
                for pattern in patterns {
                    self.resolve_pattern(pattern)?;
                }
                Ok(())
            }
        }
    }

    fn resolve_target(&mut self, target: &mut AssignTarget) -> CompileResult<()> {
        match target {
            AssignTarget::Ident(ident) => self.resolve_bind(ident, false),
            AssignTarget::Access { base, steps, .. } => {
                self.resolve_expr(base)?;
                for step in steps {
                    self.resolve_step(step)?;
                }
                Ok(())
            }
            AssignTarget::List { targets, .. } => {
                for target in targets {
                    self.resolve_target(target)?;
                }
                Ok(())
            }
        }
    }

    fn resolve_step(&mut self, step: &mut AccessStep) -> CompileResult<()> {
        match step {
            AccessStep::Attr { .. } => Ok(()),
            AccessStep::Index(index) => self.resolve_expr(index),
            AccessStep::Slice { begin, end } => {
                if let Some(begin) = begin {
                    self.resolve_expr(begin)?;
                }
                if let Some(end) = end {
                    self.resolve_expr(end)?;
                }
                Ok(())
            }
        }
    }

    fn resolve_expr(&mut self, expr: &mut Expr) -> CompileResult<()> {
        match expr {
            Expr::Literal { .. } => Ok(()),
            Expr::Ident(ident) => self.resolve_read(ident),
            Expr::ListLit { items, .. } => {
                for item in items {
                    self.resolve_expr(item)?;
                }
                Ok(())
            }
            Expr::ObjectLit { entries, .. } => {
                for (_, value) in entries {
                    self.resolve_expr(value)?;
                }
                Ok(())
            }
            Expr::Unary { expr, .. } => self.resolve_expr(expr),
            Expr::Binary { lhs, rhs, .. } | Expr::And { lhs, rhs, .. } | Expr::Or { lhs, rhs, .. } => {
                self.resolve_expr(lhs)?;
                self.resolve_expr(rhs)
            }
            Expr::Access { base, step, .. } => {
                self.resolve_expr(base)?;
                self.resolve_step(step)
            }
            Expr::Call { callee, args, .. } => {
                self.resolve_expr(callee)?;
                for arg in args {
                    self.resolve_expr(arg)?;
                }
                Ok(())
            }
            Expr::Lambda(func) => self.resolve_func(func),
        }
    }

    fn resolve_func(&mut self, func: &mut FuncLit) -> CompileResult<()> {
        self.frames.push(FrameState::default());
        self.scopes.push(ScopeState {
            frame: self.current_frame(),
            ..ScopeState::default()
        });
        for param in &mut func.params {
            self.resolve_bind(param, true)?;
            let Some(Resolution::Local(slot)) = param.res else {
                unreachable!("parameter resolved to a non-local");
            };
            let frame_idx = self.current_frame();
            self.frames[frame_idx].param_slots.push(slot);
        }
        self.resolve_stmt(&mut func.body)?;
        self.scopes.pop();
        let frame = self.frames.pop().expect("function frame missing");
        func.layout = Some(frame.finish());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn resolved(src: &str) -> Module {
        let mut module = parse(src).unwrap();
        resolve(&mut module).unwrap();
        module
    }

    fn first_ident_res(expr: &Expr) -> Resolution {
        match expr {
            Expr::Ident(ident) => ident.resolution(),
            other => panic!("expected identifier, got {other:?}"),
        }
    }

    #[test]
    fn top_level_bindings_are_globals() {
        let module = resolved("counter = 0\nsay counter");
        assert_eq!(module.globals, vec!["counter".to_owned()]);
        let Stmt::Action { value, .. } = &module.stmts[1] else {
            panic!("expected action");
        };
        assert_eq!(first_ident_res(value), Resolution::Global(0));
    }

    #[test]
    fn event_names_become_globals_on_read() {
        let module = resolved("if text { say text }");
        assert_eq!(module.globals, vec!["text".to_owned()]);
    }

    #[test]
    fn builtin_reads_resolve_to_builtins() {
        let module = resolved("say length");
        let Stmt::Action { value, .. } = &module.stmts[0] else {
            panic!("expected action");
        };
        assert!(matches!(first_ident_res(value), Resolution::Builtin(_)));
    }

    #[test]
    fn loop_variables_are_frame_locals() {
        let module = resolved("for i in x { say i }");
        let layout = module.layout.unwrap();
        assert_eq!(layout.num_locals, 1);
        // only `x` became a global
        assert_eq!(module.globals, vec!["x".to_owned()]);
    }

    #[test]
    fn captures_are_transitive_and_promote_cells() {
        // inner lambda reads `n`, a local of the outermost function, through
        // an intermediate lambda: both inner frames record the capture and
        // the defining slot becomes a cell
        let module = resolved("func outer(n) { mid = { -> x = { -> n }\nx } }");
        let Stmt::FuncDecl { func, .. } = &module.stmts[0] else {
            panic!("expected func decl");
        };
        let outer = func.layout.as_ref().unwrap();
        assert_eq!(outer.cell_slots, vec![0]);

        let Stmt::Block { stmts, .. } = func.body.as_ref() else {
            panic!("expected block body");
        };
        let Stmt::Assign { value: Expr::Lambda(mid), .. } = &stmts[0] else {
            panic!("expected lambda assignment");
        };
        let mid_layout = mid.layout.as_ref().unwrap();
        assert_eq!(mid_layout.captures, vec![CaptureSource::EnclosingLocal(0)]);

        let Stmt::Block { stmts: mid_stmts, .. } = mid.body.as_ref() else {
            panic!("expected block body");
        };
        let Stmt::Assign { value: Expr::Lambda(inner), .. } = &mid_stmts[0] else {
            panic!("expected inner lambda");
        };
        let inner_layout = inner.layout.as_ref().unwrap();
        assert_eq!(inner_layout.captures, vec![CaptureSource::EnclosingCapture(0)]);
    }

    #[test]
    fn reserved_names_reject_assignment() {
        let err = {
            let mut module = parse("this = 1").unwrap();
            resolve(&mut module).unwrap_err()
        };
        assert!(matches!(err.kind, CompileErrorKind::ReservedName { .. }));
    }

    #[test]
    fn dollar_junk_is_a_name_error() {
        let mut module = parse("say $oops").unwrap();
        let err = resolve(&mut module).unwrap_err();
        assert!(matches!(err.kind, CompileErrorKind::Name { .. }));
    }

    #[test]
    fn duplicate_params_are_redeclarations() {
        let mut module = parse("func f(a, a) { }").unwrap();
        let err = resolve(&mut module).unwrap_err();
        assert!(matches!(err.kind, CompileErrorKind::Redeclaration { .. }));
    }

    #[test]
    fn args_forms_resolve() {
        let module = resolved("f = { $0 + $1.length() + $.length() }");
        let Stmt::Assign { value: Expr::Lambda(func), .. } = &module.stmts[0] else {
            panic!("expected lambda");
        };
        assert!(func.layout.is_some());
    }
}
