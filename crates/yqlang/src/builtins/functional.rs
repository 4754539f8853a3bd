//! Callback builtins: `filter`, `map`, `reduce`, `sorted`.
//!
//! These re-enter the VM through `call_callable` to run user closures. The
//! `sorted` comparator contract: it returns truthy iff its first argument
//! should come *after* the second. Sorting is a stable merge sort so equal
//! elements keep their relative order even under user comparators.

use super::{Builtin, exactly, seq::collect};
use crate::{
    bytecode::vm::Vm,
    errors::{RunResult, RuntimeError},
    host::HostContext,
    value::{Value, value_cmp},
};

pub(super) fn filter<H: HostContext>(vm: &mut Vm<'_, H>, recv: Value, pred: Value) -> RunResult<Value> {
    let items = collect(vm, recv)?;
    let mut out = Vec::new();
    for item in items {
        let keep = vm.call_callable(pred.clone(), vec![item.clone()], None)?;
        if keep.truthy(vm.heap) {
            out.push(item);
        }
    }
    Ok(vm.heap.alloc_list(out))
}

pub(super) fn map<H: HostContext>(vm: &mut Vm<'_, H>, recv: Value, func: Value) -> RunResult<Value> {
    let items = collect(vm, recv)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(vm.call_callable(func.clone(), vec![item], None)?);
    }
    Ok(vm.heap.alloc_list(out))
}

pub(super) fn reduce<H: HostContext>(
    vm: &mut Vm<'_, H>,
    recv: Value,
    init: Value,
    func: Value,
) -> RunResult<Value> {
    let items = collect(vm, recv)?;
    let mut acc = init;
    for item in items {
        acc = vm.call_callable(func.clone(), vec![acc, item], None)?;
    }
    Ok(acc)
}

/// How elements are ordered during `sorted`.
enum SortOrder {
    /// The natural ordering of like kinds.
    Natural,
    /// A user comparator: truthy iff the first argument sorts after the
    /// second.
    Comparator(Value),
}

pub(super) fn sorted<H: HostContext>(vm: &mut Vm<'_, H>, recv: Value, args: Vec<Value>) -> RunResult<Value> {
    let order = match args.len() {
        0 => SortOrder::Natural,
        _ => {
            let [cmp] = exactly::<1>(Builtin::Sorted, args)?;
            SortOrder::Comparator(cmp)
        }
    };
    let items = collect(vm, recv)?;
    let sorted = merge_sort(vm, &order, items)?;
    Ok(vm.heap.alloc_list(sorted))
}

fn comes_after<H: HostContext>(
    vm: &mut Vm<'_, H>,
    order: &SortOrder,
    a: &Value,
    b: &Value,
) -> RunResult<bool> {
    match order {
        SortOrder::Natural => {
            let ordering = value_cmp(a, b, vm.heap).ok_or_else(|| {
                RuntimeError::type_mismatch(
                    "comparable values",
                    format!("{} and {}", a.kind_name(vm.heap), b.kind_name(vm.heap)),
                )
            })?;
            Ok(ordering.is_gt())
        }
        SortOrder::Comparator(cmp) => {
            let verdict = vm.call_callable(cmp.clone(), vec![a.clone(), b.clone()], None)?;
            Ok(verdict.truthy(vm.heap))
        }
    }
}

fn merge_sort<H: HostContext>(
    vm: &mut Vm<'_, H>,
    order: &SortOrder,
    mut items: Vec<Value>,
) -> RunResult<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(vm, order, items)?;
    let right = merge_sort(vm, order, right)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => {
                // stable: take from the left unless it sorts after the right
                if comes_after(vm, order, l, r)? {
                    out.push(right.next().expect("peeked"));
                } else {
                    out.push(left.next().expect("peeked"));
                }
            }
            (Some(_), None) => out.push(left.next().expect("peeked")),
            (None, Some(_)) => out.push(right.next().expect("peeked")),
            (None, None) => break,
        }
    }
    Ok(out)
}
