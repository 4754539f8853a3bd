//! The virtual machine: a stack machine over byte-encoded instructions.
//!
//! One `Vm` executes one run of one program against a fresh heap, the
//! deserialized globals, and a host context. Frames carry fixed slot
//! layouts (`this`, the args list, capture cells, locals) plus watermarks
//! into the shared operand, view, and iterator stacks so returns unwind all
//! three. Budget checks run at instruction boundaries; runtime errors are
//! stamped with the faulting bytecode offset on the way out.

pub(crate) mod access;
pub(crate) mod binary;
mod call;
pub(crate) mod iter;

use rand::{SeedableRng, rngs::StdRng};
use smallvec::SmallVec;

use self::{
    access::{AccessView, StepValue},
    iter::ValueIter,
};
use super::{Code, Const, Opcode};
use crate::{
    budget::Budget,
    builtins::{self, Builtin},
    errors::{RunResult, RuntimeError},
    globals::Globals,
    heap::{Closure, FunctionId, Heap, HeapData, HeapId, Object},
    host::HostContext,
    program::Program,
    value::{Subscript, Value, as_int, display_string},
};

/// A function-call activation.
#[derive(Debug)]
pub(crate) struct Frame {
    /// `None` for the module body.
    function: Option<FunctionId>,
    /// Saved instruction pointer while a callee runs.
    ip: usize,
    stack_base: usize,
    view_base: usize,
    iter_base: usize,
    this: Value,
    /// The `$` arguments list (always a heap list).
    args: Value,
    /// Capture cells materialized from the closure.
    captures: SmallVec<[HeapId; 4]>,
    locals: Vec<Value>,
    /// Statement register: the last expression statement's value.
    reg: Value,
}

/// The virtual machine for one run.
pub(crate) struct Vm<'a, H: HostContext> {
    pub(crate) program: &'a Program,
    pub(crate) heap: &'a mut Heap,
    pub(crate) globals: &'a mut Globals,
    pub(crate) host: &'a mut H,
    pub(crate) budget: &'a mut Budget,
    pub(crate) rng: StdRng,
    first_run: bool,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    views: Vec<AccessView>,
    iters: Vec<ValueIter>,
    check_counter: u32,
}

impl<'a, H: HostContext> Vm<'a, H> {
    pub fn new(
        program: &'a Program,
        heap: &'a mut Heap,
        globals: &'a mut Globals,
        host: &'a mut H,
        budget: &'a mut Budget,
        first_run: bool,
    ) -> Self {
        Self {
            program,
            heap,
            globals,
            host,
            budget,
            rng: StdRng::from_entropy(),
            first_run,
            stack: Vec::with_capacity(usize::from(program.module.stack_size()) + 8),
            frames: Vec::new(),
            views: Vec::new(),
            iters: Vec::new(),
            check_counter: 0,
        }
    }

    /// Runs the module body to completion, returning its final value (the
    /// statement register at `Exit`).
    pub fn run_module(&mut self) -> RunResult<Value> {
        let args = self.heap.alloc_list(Vec::new());
        let mut locals = vec![Value::Undefined; usize::from(self.program.module_frame.num_locals)];
        for &slot in &self.program.module_frame.cell_slots {
            locals[usize::from(slot)] = Value::Ref(self.heap.allocate(HeapData::Cell(Value::Undefined)));
        }
        self.frames.push(Frame {
            function: None,
            ip: 0,
            stack_base: 0,
            view_base: 0,
            iter_base: 0,
            this: Value::Null,
            args,
            captures: SmallVec::new(),
            locals,
            reg: Value::Null,
        });
        self.execute(0)
    }

    fn frame_code(&self, function: Option<FunctionId>) -> &'a Code {
        match function {
            None => &self.program.module,
            Some(id) => &self.program.functions[usize::from(id.0)].code,
        }
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack empty")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack empty")
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }

    fn pop_args(&mut self, argc: usize) -> Vec<Value> {
        self.stack.split_off(self.stack.len() - argc)
    }

    /// The main dispatch loop. Runs until the frame stack shrinks back to
    /// `stop_depth` (via `Return`) or the module executes `Exit`.
    fn execute(&mut self, stop_depth: usize) -> RunResult<Value> {
        let mut code = self.frame_code(self.current_frame().function);
        let mut ip = self.current_frame().ip;
        loop {
            self.check_counter = self.check_counter.wrapping_add(1);
            if self.check_counter % 64 == 0 {
                self.budget.check().map_err(|e| e.at(ip))?;
            }
            let instr_ip = ip;
            match self.dispatch(&mut code, &mut ip, stop_depth) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(err) => return Err(err.at(instr_ip)),
            }
        }
    }

    /// Executes one instruction. Returns `Some(value)` when execution at
    /// this depth is complete.
    fn dispatch(&mut self, code: &mut &'a Code, ip: &mut usize, stop_depth: usize) -> RunResult<Option<Value>> {
        // copy the shared reference out so reassigning `*code` on frame
        // changes cannot conflict with the operand fetches below
        let current: &'a Code = *code;
        let bytes = current.bytecode();
        let op = Opcode::from_repr(bytes[*ip]).expect("invalid opcode in compiled code");
        *ip += 1;
        match op {
            Opcode::Nop => {}

            Opcode::LoadConst => {
                let idx = fetch_u16(bytes, ip);
                let value = match current.constant(idx) {
                    Const::Null => Value::Null,
                    Const::Bool(b) => Value::Bool(*b),
                    Const::Int(v) => Value::Int(*v),
                    Const::Float(v) => Value::Float(*v),
                    Const::Str(s) => {
                        let s = s.clone();
                        self.heap.alloc_str(s)
                    }
                };
                self.push(value);
            }
            Opcode::LoadNull => self.push(Value::Null),
            Opcode::LoadTrue => self.push(Value::Bool(true)),
            Opcode::LoadFalse => self.push(Value::Bool(false)),
            Opcode::LoadSmallInt => {
                let v = fetch_i8(bytes, ip);
                self.push(Value::Int(i64::from(v)));
            }
            Opcode::LoadBuiltin => {
                let id = fetch_u8(bytes, ip);
                let builtin = Builtin::from_repr(id).expect("invalid builtin id in compiled code");
                self.push(Value::Builtin(builtin));
            }

            Opcode::Pop => {
                self.pop();
            }
            Opcode::Dup => {
                let top = self.stack.last().expect("operand stack underflow").clone();
                self.push(top);
            }

            Opcode::LoadLocal => {
                let slot = fetch_u16(bytes, ip);
                let value = match &self.current_frame().locals[usize::from(slot)] {
                    Value::Undefined => Value::Null,
                    value => value.clone(),
                };
                self.push(value);
            }
            Opcode::StoreLocal => {
                let slot = fetch_u16(bytes, ip);
                let value = self.pop();
                self.current_frame_mut().locals[usize::from(slot)] = value;
            }
            Opcode::LoadCell => {
                let slot = fetch_u16(bytes, ip);
                let cell = self.local_cell(slot);
                let value = match self.heap.cell_get(cell) {
                    Value::Undefined => Value::Null,
                    value => value,
                };
                self.push(value);
            }
            Opcode::StoreCell => {
                let slot = fetch_u16(bytes, ip);
                let cell = self.local_cell(slot);
                let value = self.pop();
                self.heap.cell_set(cell, value);
            }
            Opcode::LoadCapture => {
                let slot = fetch_u16(bytes, ip);
                let cell = self.current_frame().captures[usize::from(slot)];
                let value = match self.heap.cell_get(cell) {
                    Value::Undefined => Value::Null,
                    value => value,
                };
                self.push(value);
            }
            Opcode::StoreCapture => {
                let slot = fetch_u16(bytes, ip);
                let cell = self.current_frame().captures[usize::from(slot)];
                let value = self.pop();
                self.heap.cell_set(cell, value);
            }
            Opcode::LoadGlobal => {
                let slot = fetch_u16(bytes, ip);
                let value = self.globals.get(slot);
                self.push(value);
            }
            Opcode::StoreGlobal => {
                let slot = fetch_u16(bytes, ip);
                let value = self.pop();
                self.globals.set(slot, value);
            }
            Opcode::LoadThis => {
                let this = self.current_frame().this.clone();
                self.push(this);
            }
            Opcode::LoadArgs => {
                let args = self.current_frame().args.clone();
                self.push(args);
            }
            Opcode::LoadArg => {
                let index = usize::from(fetch_u16(bytes, ip));
                let args = self.current_frame().args.clone();
                let value = match &args {
                    Value::Ref(id) => match self.heap.get(*id) {
                        HeapData::List(items) => items.get(index).cloned().unwrap_or(Value::Null),
                        _ => Value::Null,
                    },
                    _ => Value::Null,
                };
                self.push(value);
            }

            Opcode::Add => {
                let (a, b) = self.pop2();
                let result = binary::add(self.heap, a, b)?;
                self.push(result);
            }
            Opcode::Sub => {
                let (a, b) = self.pop2();
                let result = binary::sub(self.heap, a, b)?;
                self.push(result);
            }
            Opcode::Mul => {
                let (a, b) = self.pop2();
                let result = binary::mul(self.heap, a, b)?;
                self.push(result);
            }
            Opcode::Div => {
                let (a, b) = self.pop2();
                let result = binary::div(self.heap, a, b)?;
                self.push(result);
            }
            Opcode::Rem => {
                let (a, b) = self.pop2();
                let result = binary::rem(self.heap, a, b)?;
                self.push(result);
            }
            Opcode::Neg => {
                let a = self.pop();
                let result = binary::neg(self.heap, a)?;
                self.push(result);
            }
            Opcode::Not => {
                let a = self.pop();
                let truthy = a.truthy(self.heap);
                self.push(Value::Bool(!truthy));
            }
            Opcode::ToBool => {
                let a = self.pop();
                let truthy = a.truthy(self.heap);
                self.push(Value::Bool(truthy));
            }
            Opcode::CmpEq => {
                let (a, b) = self.pop2();
                let eq = crate::value::value_eq(&a, &b, self.heap);
                self.push(Value::Bool(eq));
            }
            Opcode::CmpNe => {
                let (a, b) = self.pop2();
                let eq = crate::value::value_eq(&a, &b, self.heap);
                self.push(Value::Bool(!eq));
            }
            Opcode::CmpLt => self.compare_top("<", |o| o.is_lt())?,
            Opcode::CmpLe => self.compare_top("<=", |o| o.is_le())?,
            Opcode::CmpGt => self.compare_top(">", |o| o.is_gt())?,
            Opcode::CmpGe => self.compare_top(">=", |o| o.is_ge())?,
            Opcode::Contains => {
                let (candidate, container) = self.pop2();
                let found = binary::contains(self.heap, &candidate, &container)?;
                self.push(Value::Bool(found));
            }

            Opcode::Jump => {
                *ip = fetch_u32(bytes, ip);
            }
            Opcode::JumpZero => {
                let target = fetch_u32(bytes, ip);
                let cond = self.pop();
                if !cond.truthy(self.heap) {
                    *ip = target;
                }
            }
            Opcode::JumpNotFirstRun => {
                let target = fetch_u32(bytes, ip);
                if !self.first_run {
                    *ip = target;
                }
            }

            Opcode::PushView => {
                let base = self.pop();
                self.views.push(AccessView::new(base));
            }
            Opcode::ExtendViewAttr => {
                let name_id = fetch_u16(bytes, ip);
                let name = self
                    .program
                    .interns
                    .get(crate::intern::StringId::from_index(name_id))
                    .to_owned();
                let view = self.views.last_mut().expect("view stack underflow");
                view.extend(StepValue::Attr(name), self.heap)?;
            }
            Opcode::ExtendView => {
                let step = self.pop();
                let view = self.views.last_mut().expect("view stack underflow");
                view.extend(StepValue::Value(step), self.heap)?;
            }
            Opcode::MakeSlice => {
                let flags = fetch_u8(bytes, ip);
                let end = if flags & 0b10 != 0 {
                    Some(self.pop_index_operand()?)
                } else {
                    None
                };
                let begin = if flags & 0b01 != 0 {
                    Some(self.pop_index_operand()?)
                } else {
                    None
                };
                self.push(Value::Subscript(Subscript { begin, end }));
            }
            Opcode::ViewGet => {
                let view = self.views.pop().expect("view stack underflow");
                let value = view.get(self.heap)?;
                self.push(value);
            }
            Opcode::ViewGetRef => {
                let view = self.views.pop().expect("view stack underflow");
                let value = view.get_ref(self.heap)?;
                self.push(value);
            }
            Opcode::ViewRead => {
                let view = self.views.last().expect("view stack underflow").clone();
                let value = view.get(self.heap)?;
                self.push(value);
            }
            Opcode::ViewSet => {
                let rhs = self.pop();
                let view = self.views.pop().expect("view stack underflow");
                view.set(rhs, self.heap)?;
            }

            Opcode::Call => {
                let argc = usize::from(fetch_u8(bytes, ip));
                let args = self.pop_args(argc);
                let callee = self.pop();
                self.current_frame_mut().ip = *ip;
                match self.call_value(callee, args, None)? {
                    call::CallOutcome::Value(value) => self.push(value),
                    call::CallOutcome::FramePushed => {
                        *code = self.frame_code(self.current_frame().function);
                        *ip = 0;
                    }
                }
            }
            Opcode::InvokeBuiltin => {
                let id = fetch_u8(bytes, ip);
                let argc = usize::from(fetch_u8(bytes, ip));
                let builtin = Builtin::from_repr(id).expect("invalid builtin id in compiled code");
                let args = self.pop_args(argc);
                self.current_frame_mut().ip = *ip;
                let result = builtins::invoke(self, builtin, None, args)?;
                self.push(result);
            }
            Opcode::Return => {
                let value = self.pop();
                self.pop_frame();
                if self.frames.len() == stop_depth {
                    return Ok(Some(value));
                }
                self.push(value);
                *code = self.frame_code(self.current_frame().function);
                *ip = self.current_frame().ip;
            }

            Opcode::PushIter => {
                let iterable = self.pop();
                let iter = ValueIter::new(iterable, self.heap)?;
                self.iters.push(iter);
            }
            Opcode::IterJumpDone => {
                let target = fetch_u32(bytes, ip);
                if self.iters.last().expect("iterator stack underflow").is_done(self.heap) {
                    *ip = target;
                }
            }
            Opcode::IterNext => {
                let iter = self.iters.last_mut().expect("iterator stack underflow");
                // IterJumpDone immediately precedes this instruction, so the
                // iterator cannot be exhausted here
                let value = iter.next(self.heap).unwrap_or(Value::Null);
                self.push(value);
            }
            Opcode::PopIter => {
                self.iters.pop();
            }

            Opcode::MakeList => {
                let count = usize::from(fetch_u16(bytes, ip));
                let items = self.pop_args(count);
                let list = self.heap.alloc_list(items);
                self.push(list);
            }
            Opcode::MakeObject => {
                let count = usize::from(fetch_u16(bytes, ip));
                let mut keys = Vec::with_capacity(count);
                for _ in 0..count {
                    keys.push(fetch_u16(bytes, ip));
                }
                let values = self.pop_args(count);
                let mut object = Object::new();
                for (key_id, value) in keys.into_iter().zip(values) {
                    let key = self
                        .program
                        .interns
                        .get(crate::intern::StringId::from_index(key_id))
                        .to_owned();
                    object.insert(key, value);
                }
                let obj = self.heap.alloc_object(object);
                self.push(obj);
            }
            Opcode::MakeClosure => {
                let function = FunctionId(fetch_u16(bytes, ip));
                let count = usize::from(fetch_u8(bytes, ip));
                let mut captures = SmallVec::with_capacity(count);
                for _ in 0..count {
                    let kind = fetch_u8(bytes, ip);
                    let slot = fetch_u16(bytes, ip);
                    let cell = match kind {
                        0 => self.local_cell(slot),
                        _ => self.current_frame().captures[usize::from(slot)],
                    };
                    captures.push(cell);
                }
                let closure = self.heap.allocate(HeapData::Closure(Closure { function, captures }));
                self.push(Value::Ref(closure));
            }

            Opcode::Action => {
                let action = fetch_u8(bytes, ip);
                let value = self.pop();
                self.perform_action(action, value)?;
            }
            Opcode::PopSaveReg => {
                let value = self.pop();
                self.current_frame_mut().reg = value;
            }
            Opcode::ClearReg => {
                self.current_frame_mut().reg = Value::Null;
            }
            Opcode::LoadReg => {
                let value = self.current_frame().reg.clone();
                self.push(value);
            }
            Opcode::ElemOrJump => {
                let index = usize::from(fetch_u16(bytes, ip));
                let target = fetch_u32(bytes, ip);
                let top = self.stack.last().expect("operand stack underflow");
                let element = match top {
                    Value::Ref(id) => match self.heap.get(*id) {
                        HeapData::List(items) => items.get(index).cloned(),
                        other => {
                            return Err(RuntimeError::pattern_match(other.kind_name()));
                        }
                    },
                    other => {
                        return Err(RuntimeError::pattern_match(other.kind_name(self.heap)));
                    }
                };
                match element {
                    Some(value) => self.push(value),
                    None => *ip = target,
                }
            }
            Opcode::Exit => {
                let value = self.pop();
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn pop2(&mut self) -> (Value, Value) {
        let b = self.pop();
        let a = self.pop();
        (a, b)
    }

    fn compare_top(
        &mut self,
        op: &'static str,
        decide: fn(std::cmp::Ordering) -> bool,
    ) -> RunResult<()> {
        let (a, b) = self.pop2();
        let ordering = binary::compare(self.heap, op, &a, &b)?;
        self.push(Value::Bool(decide(ordering)));
        Ok(())
    }

    /// Reads the cell id out of a promoted local slot.
    fn local_cell(&self, slot: u16) -> HeapId {
        match &self.current_frame().locals[usize::from(slot)] {
            Value::Ref(id) => *id,
            other => panic!("promoted slot {slot} holds {other:?} instead of a cell"),
        }
    }

    fn pop_index_operand(&mut self) -> RunResult<i64> {
        let value = self.pop();
        as_int(&value)
            .ok_or_else(|| RuntimeError::type_mismatch("integer slice endpoint", value.kind_name(self.heap)))
    }

    fn pop_frame(&mut self) {
        let frame = self.frames.pop().expect("frame stack underflow");
        self.stack.truncate(frame.stack_base);
        self.views.truncate(frame.view_base);
        self.iters.truncate(frame.iter_base);
    }

    fn perform_action(&mut self, action: u8, value: Value) -> RunResult<()> {
        match action {
            0 => {
                let text = display_string(&value, self.heap);
                self.host.say(text);
            }
            1 => {
                let target = as_int(&value).ok_or_else(|| {
                    RuntimeError::type_mismatch("integer nudge target", value.kind_name(self.heap))
                })?;
                self.host.nudge(target);
            }
            2 => {
                let id = display_string(&value, self.heap);
                self.host.pic_save(id);
            }
            _ => {
                let id = display_string(&value, self.heap);
                self.host.pic_send(id);
            }
        }
        Ok(())
    }
}

#[inline]
fn fetch_u8(bytes: &[u8], ip: &mut usize) -> u8 {
    let v = bytes[*ip];
    *ip += 1;
    v
}

#[inline]
fn fetch_i8(bytes: &[u8], ip: &mut usize) -> i8 {
    i8::from_ne_bytes([fetch_u8(bytes, ip)])
}

#[inline]
fn fetch_u16(bytes: &[u8], ip: &mut usize) -> u16 {
    let v = u16::from_le_bytes([bytes[*ip], bytes[*ip + 1]]);
    *ip += 2;
    v
}

#[inline]
fn fetch_u32(bytes: &[u8], ip: &mut usize) -> usize {
    let v = u32::from_le_bytes([bytes[*ip], bytes[*ip + 1], bytes[*ip + 2], bytes[*ip + 3]]);
    *ip += 4;
    v as usize
}
