//! AST to bytecode lowering.
//!
//! Each function literal (and the module body) compiles into its own
//! [`Code`] object through a [`CodeBuilder`]. Control flow lowers entirely to
//! jumps: `return` becomes `Return` (or `Exit` at module level), and
//! `break`/`continue` become jumps to per-loop labels, so no non-local
//! control exists at runtime.
//!
//! Expression statements save their value into the frame's statement
//! register; assignments, actions, declarations, and loops clear it. A
//! function without an executed `return` therefore yields its last
//! expression statement value, and the module exits with the register so the
//! REPL can print it.

use super::{
    builder::{CodeBuilder, JumpLabel},
    code::Const,
    op::Opcode,
};
use crate::{
    ast::{
        AccessStep, ActionKind, AssignTarget, BinOp, CaptureSource, Expr, FrameLayout, FuncLit,
        Ident, Literal, Module, Pattern, Resolution, Stmt, UnOp,
    },
    errors::{CompileError, CompileErrorKind, CompileResult},
    intern::Interns,
    program::{FrameInfo, Function},
};

/// Compiles a resolved module into its code object and function table.
///
/// Returns `(module code, functions, module frame info)`.
pub fn compile_module(
    module: &Module,
    interns: &mut Interns,
) -> CompileResult<(super::Code, Vec<Function>, FrameInfo)> {
    let layout = module
        .layout
        .clone()
        .expect("module not resolved before compilation");
    let mut functions = Vec::new();
    let mut compiler = Compiler {
        interns,
        functions: &mut functions,
        builder: CodeBuilder::new(),
        layout: layout.clone(),
        in_function: false,
        loops: Vec::new(),
    };
    for stmt in &module.stmts {
        compiler.compile_stmt(stmt)?;
    }
    compiler.builder.emit(Opcode::LoadReg);
    compiler.builder.emit(Opcode::Exit);
    let code = compiler.builder.build();
    Ok((code, functions, FrameInfo::from_layout(&layout)))
}

/// Tracks the jump targets of one enclosing loop.
struct LoopCtx {
    /// Bytecode offset `continue` jumps to: the condition for `while`, the
    /// `IterJumpDone` head for `for`.
    head: usize,
    /// Forward break jumps, patched at the loop epilogue.
    breaks: Vec<JumpLabel>,
}

struct Compiler<'a> {
    interns: &'a mut Interns,
    functions: &'a mut Vec<Function>,
    builder: CodeBuilder,
    layout: FrameLayout,
    in_function: bool,
    loops: Vec<LoopCtx>,
}

impl Compiler<'_> {
    /// Compiles a function literal into the function table, returning its id.
    fn compile_function(
        interns: &mut Interns,
        functions: &mut Vec<Function>,
        func: &FuncLit,
        name: Option<String>,
    ) -> CompileResult<u16> {
        let layout = func
            .layout
            .clone()
            .expect("function not resolved before compilation");
        let mut compiler = Compiler {
            interns: &mut *interns,
            functions: &mut *functions,
            builder: CodeBuilder::new(),
            layout: layout.clone(),
            in_function: true,
            loops: Vec::new(),
        };
        compiler.compile_stmt(&func.body)?;
        // implicit return: the last expression statement value, or null
        compiler.builder.emit(Opcode::LoadReg);
        compiler.builder.emit(Opcode::Return);
        let code = compiler.builder.build();

        let id = u16::try_from(functions.len()).expect("program exceeds u16 functions");
        functions.push(Function {
            name,
            code,
            param_count: u16::try_from(func.params.len()).expect("function exceeds u16 params"),
            frame: FrameInfo::from_layout(&layout),
        });
        Ok(id)
    }

    // -----------------------------------------------------------------
    // statements

    fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Expr(expr) => {
                self.builder.set_location(expr.pos());
                self.compile_expr(expr)?;
                self.builder.emit(Opcode::PopSaveReg);
                Ok(())
            }
            Stmt::Assign { target, op, value, pos } => {
                self.builder.set_location(*pos);
                self.compile_assign(target, *op, value)?;
                self.builder.emit(Opcode::ClearReg);
                Ok(())
            }
            Stmt::Action { kind, value, pos } => {
                self.builder.set_location(*pos);
                self.compile_expr(value)?;
                self.builder.emit_u8(Opcode::Action, action_code(*kind));
                self.builder.emit(Opcode::ClearReg);
                Ok(())
            }
            Stmt::If { cond, then, otherwise, pos } => {
                self.builder.set_location(*pos);
                self.compile_expr(cond)?;
                let to_else = self.builder.emit_jump(Opcode::JumpZero);
                self.compile_stmt(then)?;
                match otherwise {
                    Some(otherwise) => {
                        let to_end = self.builder.emit_jump(Opcode::Jump);
                        self.builder.patch_jump(to_else);
                        self.compile_stmt(otherwise)?;
                        self.builder.patch_jump(to_end);
                    }
                    None => self.builder.patch_jump(to_else),
                }
                Ok(())
            }
            Stmt::Init { body, pos } => {
                self.builder.set_location(*pos);
                let skip = self.builder.emit_jump(Opcode::JumpNotFirstRun);
                self.compile_stmt(body)?;
                self.builder.patch_jump(skip);
                Ok(())
            }
            Stmt::Block { stmts, .. } => {
                for stmt in stmts {
                    self.compile_stmt(stmt)?;
                }
                Ok(())
            }
            Stmt::FuncDecl { name, func, pos } => {
                self.builder.set_location(*pos);
                self.emit_closure(func, Some(name.name.clone()))?;
                self.store_binding(name)?;
                self.builder.emit(Opcode::ClearReg);
                Ok(())
            }
            Stmt::Return { value, pos } => {
                self.builder.set_location(*pos);
                match value {
                    Some(value) => self.compile_expr(value)?,
                    None => self.builder.emit(Opcode::LoadNull),
                }
                if self.in_function {
                    self.builder.emit(Opcode::Return);
                } else {
                    self.builder.emit(Opcode::Exit);
                }
                Ok(())
            }
            Stmt::While { cond, body, pos } => {
                self.builder.set_location(*pos);
                let head = self.builder.current_offset();
                self.compile_expr(cond)?;
                let exit = self.builder.emit_jump(Opcode::JumpZero);
                self.loops.push(LoopCtx { head, breaks: Vec::new() });
                self.compile_stmt(body)?;
                self.builder.emit_jump_to(Opcode::Jump, head);
                let ctx = self.loops.pop().expect("loop stack underflow");
                self.builder.patch_jump(exit);
                for label in ctx.breaks {
                    self.builder.patch_jump(label);
                }
                self.builder.emit(Opcode::ClearReg);
                Ok(())
            }
            Stmt::For { pattern, iterable, body, pos } => {
                self.builder.set_location(*pos);
                self.compile_expr(iterable)?;
                self.builder.emit(Opcode::PushIter);
                let head = self.builder.current_offset();
                let done = self.builder.emit_jump(Opcode::IterJumpDone);
                self.builder.emit(Opcode::IterNext);
                self.compile_pattern_store(pattern)?;
                self.loops.push(LoopCtx { head, breaks: Vec::new() });
                self.compile_stmt(body)?;
                self.builder.emit_jump_to(Opcode::Jump, head);
                let ctx = self.loops.pop().expect("loop stack underflow");
                // exhausted iterators and breaks both land on the epilogue,
                // which pops the iterator
                self.builder.patch_jump(done);
                for label in ctx.breaks {
                    self.builder.patch_jump(label);
                }
                self.builder.emit(Opcode::PopIter);
                self.builder.emit(Opcode::ClearReg);
                Ok(())
            }
            Stmt::Continue { pos } => {
                let Some(ctx) = self.loops.last() else {
                    return Err(CompileError::new(
                        CompileErrorKind::UnexpectedToken {
                            expected: None,
                            got: "'continue' outside of a loop".to_owned(),
                        },
                        *pos,
                    ));
                };
                let head = ctx.head;
                self.builder.emit_jump_to(Opcode::Jump, head);
                Ok(())
            }
            Stmt::Break { pos } => {
                if self.loops.is_empty() {
                    return Err(CompileError::new(
                        CompileErrorKind::UnexpectedToken {
                            expected: None,
                            got: "'break' outside of a loop".to_owned(),
                        },
                        *pos,
                    ));
                }
                let label = self.builder.emit_jump(Opcode::Jump);
                self.loops
                    .last_mut()
                    .expect("loop stack underflow")
                    .breaks
                    .push(label);
                Ok(())
            }
        }
    }

    /// Stores the element on top of the stack into a `for` pattern.
    fn compile_pattern_store(&mut self, pattern: &Pattern) -> CompileResult<()> {
        match pattern {
            Pattern::Ident(ident) => self.store_binding(ident),
            Pattern::List { patterns, .. } => {
                for (i, sub) in patterns.iter().enumerate() {
                    let index = u16::try_from(i).expect("pattern exceeds u16 elements");
                    let skip = self.builder.emit_elem_or_jump(index);
                    self.compile_pattern_store(sub)?;
                    self.builder.patch_jump(skip);
                }
                self.builder.emit(Opcode::Pop);
                Ok(())
            }
        }
    }

    fn compile_assign(
        &mut self,
        target: &AssignTarget,
        op: Option<BinOp>,
        value: &Expr,
    ) -> CompileResult<()> {
        match target {
            AssignTarget::Ident(ident) => {
                if let Some(op) = op {
                    self.load_binding(ident);
                    self.compile_expr(value)?;
                    self.builder.emit(binop_opcode(op));
                } else {
                    self.compile_expr(value)?;
                }
                self.store_binding(ident)
            }
            AssignTarget::Access { base, steps, .. } => {
                self.compile_expr(base)?;
                self.builder.emit(Opcode::PushView);
                for step in steps {
                    self.compile_step(step)?;
                }
                if let Some(op) = op {
                    self.builder.emit(Opcode::ViewRead);
                    self.compile_expr(value)?;
                    self.builder.emit(binop_opcode(op));
                } else {
                    self.compile_expr(value)?;
                }
                self.builder.emit(Opcode::ViewSet);
                Ok(())
            }
            AssignTarget::List { targets, pos } => {
                if op.is_some() {
                    return Err(CompileError::new(
                        CompileErrorKind::IllegalAssignmentTarget,
                        *pos,
                    ));
                }
                self.compile_expr(value)?;
                self.compile_destructure(targets)?;
                Ok(())
            }
        }
    }

    /// Destructures the list on top of the stack into `targets`, shorter-wins,
    /// then pops it.
    fn compile_destructure(&mut self, targets: &[AssignTarget]) -> CompileResult<()> {
        for (i, target) in targets.iter().enumerate() {
            let index = u16::try_from(i).expect("pattern exceeds u16 elements");
            let skip = self.builder.emit_elem_or_jump(index);
            match target {
                AssignTarget::Ident(ident) => self.store_binding(ident)?,
                AssignTarget::Access { base, steps, .. } => {
                    // the element stays beneath the view construction and is
                    // consumed by ViewSet
                    self.compile_expr(base)?;
                    self.builder.emit(Opcode::PushView);
                    for step in steps {
                        self.compile_step(step)?;
                    }
                    self.builder.emit(Opcode::ViewSet);
                }
                AssignTarget::List { targets, .. } => {
                    self.compile_destructure(targets)?;
                }
            }
            self.builder.patch_jump(skip);
        }
        self.builder.emit(Opcode::Pop);
        Ok(())
    }

    // -----------------------------------------------------------------
    // expressions

    fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Literal { value, .. } => {
                self.compile_literal(value);
                Ok(())
            }
            Expr::Ident(ident) => {
                self.load_binding(ident);
                Ok(())
            }
            Expr::ListLit { items, .. } => {
                for item in items {
                    self.compile_expr(item)?;
                }
                self.builder
                    .emit_make_list(u16::try_from(items.len()).expect("list literal exceeds u16"));
                Ok(())
            }
            Expr::ObjectLit { entries, .. } => {
                let mut key_ids = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    key_ids.push(self.interns.intern(key).operand());
                    self.compile_expr(value)?;
                }
                self.builder.emit_make_object(&key_ids);
                Ok(())
            }
            Expr::Unary { op, expr, .. } => {
                self.compile_expr(expr)?;
                self.builder.emit(match op {
                    UnOp::Not => Opcode::Not,
                    UnOp::Neg => Opcode::Neg,
                });
                Ok(())
            }
            Expr::Binary { op, lhs, rhs, pos } => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                self.builder.set_location(*pos);
                self.builder.emit(binop_opcode(*op));
                Ok(())
            }
            Expr::And { lhs, rhs, .. } => {
                self.compile_expr(lhs)?;
                let short = self.builder.emit_jump(Opcode::JumpZero);
                self.compile_expr(rhs)?;
                self.builder.emit(Opcode::ToBool);
                let end = self.builder.emit_jump(Opcode::Jump);
                self.builder.patch_jump(short);
                self.builder.emit(Opcode::LoadFalse);
                self.builder.patch_jump(end);
                Ok(())
            }
            Expr::Or { lhs, rhs, .. } => {
                self.compile_expr(lhs)?;
                let short = self.builder.emit_jump(Opcode::JumpZero);
                self.builder.emit(Opcode::LoadTrue);
                let end = self.builder.emit_jump(Opcode::Jump);
                self.builder.patch_jump(short);
                self.compile_expr(rhs)?;
                self.builder.emit(Opcode::ToBool);
                self.builder.patch_jump(end);
                Ok(())
            }
            Expr::Access { .. } => {
                self.compile_access_chain(expr)?;
                self.builder.emit(Opcode::ViewGet);
                Ok(())
            }
            Expr::Call { callee, args, pos } => self.compile_call(callee, args, *pos),
            Expr::Lambda(func) => self.emit_closure(func, None),
        }
    }

    fn compile_literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Null => self.builder.emit(Opcode::LoadNull),
            Literal::Bool(true) => self.builder.emit(Opcode::LoadTrue),
            Literal::Bool(false) => self.builder.emit(Opcode::LoadFalse),
            Literal::Int(v) => {
                if let Ok(small) = i8::try_from(*v) {
                    self.builder.emit_i8(Opcode::LoadSmallInt, small);
                } else {
                    let idx = self.builder.add_const(Const::Int(*v));
                    self.builder.emit_u16(Opcode::LoadConst, idx);
                }
            }
            Literal::Float(v) => {
                let idx = self.builder.add_const(Const::Float(*v));
                self.builder.emit_u16(Opcode::LoadConst, idx);
            }
            Literal::Str(s) => {
                let idx = self.builder.add_const(Const::Str(s.clone()));
                self.builder.emit_u16(Opcode::LoadConst, idx);
            }
        }
    }

    /// Compiles an access chain up to (but excluding) the final get: base
    /// expression, `PushView`, then every step.
    fn compile_access_chain(&mut self, expr: &Expr) -> CompileResult<()> {
        // flatten the nested Access spine into base + steps
        let mut steps = Vec::new();
        let mut cursor = expr;
        while let Expr::Access { base, step, .. } = cursor {
            steps.push(step);
            cursor = base;
        }
        steps.reverse();
        self.compile_expr(cursor)?;
        self.builder.emit(Opcode::PushView);
        for step in steps {
            self.compile_step(step)?;
        }
        Ok(())
    }

    fn compile_step(&mut self, step: &AccessStep) -> CompileResult<()> {
        match step {
            AccessStep::Attr { name, .. } => {
                let id = self.interns.intern(name).operand();
                self.builder.emit_u16(Opcode::ExtendViewAttr, id);
                Ok(())
            }
            AccessStep::Index(index) => {
                self.compile_expr(index)?;
                self.builder.emit(Opcode::ExtendView);
                Ok(())
            }
            AccessStep::Slice { begin, end } => {
                if let Some(begin) = begin {
                    self.compile_expr(begin)?;
                }
                if let Some(end) = end {
                    self.compile_expr(end)?;
                }
                self.builder.emit_make_slice(begin.is_some(), end.is_some());
                self.builder.emit(Opcode::ExtendView);
                Ok(())
            }
        }
    }

    fn compile_call(&mut self, callee: &Expr, args: &[Expr], pos: usize) -> CompileResult<()> {
        let argc = u8::try_from(args.len()).expect("call exceeds u8 arguments");
        match callee {
            // method call: the view binds object-stored procedures and
            // builtin fallbacks to the receiver
            Expr::Access { .. } => {
                self.compile_access_chain(callee)?;
                self.builder.emit(Opcode::ViewGetRef);
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.builder.set_location(pos);
                self.builder.emit_call(argc);
            }
            // statically known builtin: skip the callee push entirely
            Expr::Ident(ident) if matches!(ident.resolution(), Resolution::Builtin(_)) => {
                let Resolution::Builtin(builtin) = ident.resolution() else {
                    unreachable!();
                };
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.builder.set_location(pos);
                self.builder.emit_invoke_builtin(builtin as u8, argc);
            }
            other => {
                self.compile_expr(other)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.builder.set_location(pos);
                self.builder.emit_call(argc);
            }
        }
        Ok(())
    }

    fn emit_closure(&mut self, func: &FuncLit, name: Option<String>) -> CompileResult<()> {
        let id = Self::compile_function(self.interns, self.functions, func, name)?;
        let layout = func.layout.as_ref().expect("function not resolved");
        let captures: Vec<(u8, u16)> = layout
            .captures
            .iter()
            .map(|source| match source {
                CaptureSource::EnclosingLocal(slot) => (0u8, *slot),
                CaptureSource::EnclosingCapture(idx) => (1u8, *idx),
            })
            .collect();
        self.builder.emit_make_closure(id, &captures);
        Ok(())
    }

    // -----------------------------------------------------------------
    // bindings

    fn load_binding(&mut self, ident: &Ident) {
        self.builder.set_location(ident.pos);
        match ident.resolution() {
            Resolution::Global(slot) => self.builder.emit_u16(Opcode::LoadGlobal, slot),
            Resolution::Local(slot) => {
                if self.layout.is_cell(slot) {
                    self.builder.emit_u16(Opcode::LoadCell, slot);
                } else {
                    self.builder.emit_u16(Opcode::LoadLocal, slot);
                }
            }
            Resolution::Capture(slot) => self.builder.emit_u16(Opcode::LoadCapture, slot),
            Resolution::This => self.builder.emit(Opcode::LoadThis),
            Resolution::Args => self.builder.emit(Opcode::LoadArgs),
            Resolution::Arg(n) => self.builder.emit_u16(Opcode::LoadArg, n),
            Resolution::Builtin(builtin) => self.builder.emit_u8(Opcode::LoadBuiltin, builtin as u8),
        }
    }

    fn store_binding(&mut self, ident: &Ident) -> CompileResult<()> {
        match ident.resolution() {
            Resolution::Global(slot) => self.builder.emit_u16(Opcode::StoreGlobal, slot),
            Resolution::Local(slot) => {
                if self.layout.is_cell(slot) {
                    self.builder.emit_u16(Opcode::StoreCell, slot);
                } else {
                    self.builder.emit_u16(Opcode::StoreLocal, slot);
                }
            }
            Resolution::Capture(slot) => self.builder.emit_u16(Opcode::StoreCapture, slot),
            // the resolver rejects assignments to reserved forms and builtins
            // never appear as binding targets
            Resolution::This | Resolution::Args | Resolution::Arg(_) | Resolution::Builtin(_) => {
                return Err(CompileError::new(
                    CompileErrorKind::ReservedName {
                        name: ident.name.clone(),
                    },
                    ident.pos,
                ));
            }
        }
        Ok(())
    }
}

fn binop_opcode(op: BinOp) -> Opcode {
    match op {
        BinOp::In => Opcode::Contains,
        BinOp::Eq => Opcode::CmpEq,
        BinOp::Ne => Opcode::CmpNe,
        BinOp::Lt => Opcode::CmpLt,
        BinOp::Le => Opcode::CmpLe,
        BinOp::Gt => Opcode::CmpGt,
        BinOp::Ge => Opcode::CmpGe,
        BinOp::Add => Opcode::Add,
        BinOp::Sub => Opcode::Sub,
        BinOp::Mul => Opcode::Mul,
        BinOp::Div => Opcode::Div,
        BinOp::Rem => Opcode::Rem,
    }
}

fn action_code(kind: ActionKind) -> u8 {
    match kind {
        ActionKind::Say => 0,
        ActionKind::Nudge => 1,
        ActionKind::PicSave => 2,
        ActionKind::PicSend => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse::parse, resolver::resolve};

    fn compile(src: &str) -> (super::super::Code, Vec<Function>) {
        let mut module = parse(src).unwrap();
        resolve(&mut module).unwrap();
        let mut interns = Interns::new();
        let (code, functions, _) = compile_module(&module, &mut interns).unwrap();
        (code, functions)
    }

    #[test]
    fn module_ends_with_reg_exit() {
        let (code, _) = compile("1 + 2");
        let bytes = code.bytecode();
        assert_eq!(bytes[bytes.len() - 2], Opcode::LoadReg as u8);
        assert_eq!(bytes[bytes.len() - 1], Opcode::Exit as u8);
    }

    #[test]
    fn lambdas_compile_into_function_table() {
        let (_, functions) = compile("f = { $0 * $0 }\ng = { a -> a }");
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].param_count, 0);
        assert_eq!(functions[1].param_count, 1);
    }

    #[test]
    fn func_decl_records_name() {
        let (_, functions) = compile("func fact(n) { return 1 }");
        assert_eq!(functions[0].name.as_deref(), Some("fact"));
    }

    #[test]
    fn break_outside_loop_rejected() {
        let mut module = parse("break").unwrap();
        resolve(&mut module).unwrap();
        let mut interns = Interns::new();
        assert!(compile_module(&module, &mut interns).is_err());
    }

    #[test]
    fn disassembly_renders() {
        let (code, _) = compile("say [1, 2, 3]");
        let dis = code.disassemble();
        assert!(dis.contains("MakeList"));
        assert!(dis.contains("Action"));
    }
}
