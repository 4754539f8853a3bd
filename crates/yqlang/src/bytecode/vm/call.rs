//! Call dispatch: closures, bound procedures, builtins, and the re-entrant
//! path used by builtins that invoke user callbacks (`filter`, `map`,
//! `reduce`, `sorted`).

use smallvec::SmallVec;

use super::{Frame, Vm};
use crate::{
    builtins,
    errors::{RunResult, RuntimeError},
    heap::{Closure, HeapData},
    host::HostContext,
    value::Value,
};

/// What a call produced.
pub(crate) enum CallOutcome {
    /// A closure frame was pushed; the dispatch loop must reload.
    FramePushed,
    /// The call completed synchronously (builtins).
    Value(Value),
}

impl<H: HostContext> Vm<'_, H> {
    /// Dispatches a call on any callee value.
    ///
    /// `this` carries the receiver for bound calls; free calls inherit the
    /// calling frame's `this`.
    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        this: Option<Value>,
    ) -> RunResult<CallOutcome> {
        match &callee {
            Value::Builtin(builtin) => {
                let result = builtins::invoke(self, *builtin, this, args)?;
                Ok(CallOutcome::Value(result))
            }
            Value::Ref(id) => match self.heap.get(*id) {
                HeapData::Closure(closure) => {
                    let closure = closure.clone();
                    self.push_frame(&closure, args, this)?;
                    Ok(CallOutcome::FramePushed)
                }
                HeapData::Bound(bound) => {
                    let bound = bound.clone();
                    self.call_value(bound.callee, args, Some(bound.receiver))
                }
                other => Err(RuntimeError::type_mismatch("procedure", other.kind_name())),
            },
            other => Err(RuntimeError::type_mismatch("procedure", other.kind_name(self.heap))),
        }
    }

    /// Calls a callee and runs it to completion, re-entering the dispatch
    /// loop for closures. Used by builtins with user callbacks.
    pub(crate) fn call_callable(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        this: Option<Value>,
    ) -> RunResult<Value> {
        let depth = self.frames.len();
        match self.call_value(callee, args, this)? {
            CallOutcome::Value(value) => Ok(value),
            CallOutcome::FramePushed => self.execute(depth),
        }
    }

    /// Pushes a closure activation: checks recursion, packages the args
    /// list, allocates capture cells for promoted locals, and binds params.
    fn push_frame(&mut self, closure: &Closure, args: Vec<Value>, this: Option<Value>) -> RunResult<()> {
        self.budget.check_recursion(self.frames.len())?;
        let function = closure.function;
        let info = &self.program.functions[usize::from(function.0)].frame;
        let num_locals = usize::from(info.num_locals);
        let cell_slots = info.cell_slots.clone();
        let param_slots = info.param_slots.clone();

        let args_list = self.heap.alloc_list(args.clone());
        let mut locals = vec![Value::Undefined; num_locals];
        for &slot in &cell_slots {
            locals[usize::from(slot)] = Value::Ref(self.heap.allocate(HeapData::Cell(Value::Undefined)));
        }
        for (i, &slot) in param_slots.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or(Value::Null);
            if cell_slots.binary_search(&slot).is_ok() {
                let Value::Ref(cell) = locals[usize::from(slot)] else {
                    unreachable!("promoted param slot missing its cell");
                };
                self.heap.cell_set(cell, value);
            } else {
                locals[usize::from(slot)] = value;
            }
        }

        // a free call inherits the caller's receiver
        let this = this.unwrap_or_else(|| self.frames.last().map_or(Value::Null, |f| f.this.clone()));
        let captures: SmallVec<[crate::heap::HeapId; 4]> = closure.captures.clone();
        self.frames.push(Frame {
            function: Some(function),
            ip: 0,
            stack_base: self.stack.len(),
            view_base: self.views.len(),
            iter_base: self.iters.len(),
            this,
            args: args_list,
            captures,
            locals,
            reg: Value::Null,
        });
        Ok(())
    }
}
