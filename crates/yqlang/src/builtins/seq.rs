//! Sequence and container builtins: `length`, `reversed`, `enumerated`,
//! `sum`, `max`, `min`, `find`, `findAll`, `split`, `join`.

use super::{Builtin, exactly, receiver};
use crate::{
    bytecode::vm::{Vm, binary, iter::ValueIter},
    errors::{RunResult, RuntimeError},
    heap::HeapData,
    host::HostContext,
    value::{Value, as_str, display_string, value_cmp, value_eq},
};

/// Collects every element of an iterable receiver.
pub(super) fn collect<H: HostContext>(vm: &mut Vm<'_, H>, value: Value) -> RunResult<Vec<Value>> {
    let mut iter = ValueIter::new(value, vm.heap)?;
    let mut out = Vec::new();
    while let Some(item) = iter.next(vm.heap) {
        out.push(item);
    }
    Ok(out)
}

pub(super) fn length<H: HostContext>(vm: &mut Vm<'_, H>, recv: Value) -> RunResult<Value> {
    let len = match &recv {
        Value::Range(r) => r.len(),
        Value::Ref(id) => match vm.heap.get(*id) {
            HeapData::Str(s) => s.chars().count(),
            HeapData::List(items) => items.len(),
            HeapData::Object(map) => map.len(),
            other => return Err(RuntimeError::type_mismatch("countable value", other.kind_name())),
        },
        other => return Err(RuntimeError::type_mismatch("countable value", other.kind_name(vm.heap))),
    };
    Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
}

pub(super) fn reversed<H: HostContext>(vm: &mut Vm<'_, H>, recv: Value) -> RunResult<Value> {
    match &recv {
        Value::Ref(id) => match vm.heap.get(*id) {
            HeapData::Str(s) => {
                let out: String = s.chars().rev().collect();
                Ok(vm.heap.alloc_str(out))
            }
            HeapData::List(items) => {
                let mut out = items.clone();
                out.reverse();
                Ok(vm.heap.alloc_list(out))
            }
            other => Err(RuntimeError::type_mismatch("string or list", other.kind_name())),
        },
        other => Err(RuntimeError::type_mismatch("string or list", other.kind_name(vm.heap))),
    }
}

pub(super) fn enumerated<H: HostContext>(vm: &mut Vm<'_, H>, recv: Value) -> RunResult<Value> {
    let items = collect(vm, recv)?;
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let index = Value::Int(i64::try_from(i).unwrap_or(i64::MAX));
        let pair = vm.heap.alloc_list(vec![index, item]);
        out.push(pair);
    }
    Ok(vm.heap.alloc_list(out))
}

pub(super) fn sum<H: HostContext>(vm: &mut Vm<'_, H>, recv: Value) -> RunResult<Value> {
    let items = collect(vm, recv)?;
    let mut iter = items.into_iter();
    let Some(first) = iter.next() else {
        return Ok(Value::Int(0));
    };
    let mut acc = first;
    for item in iter {
        acc = binary::add(vm.heap, acc, item)?;
    }
    Ok(acc)
}

/// `max`/`min`. Bound (or single-argument) form reduces over an iterable
/// receiver; the free multi-argument form reduces over the arguments.
pub(super) fn max_min<H: HostContext>(
    vm: &mut Vm<'_, H>,
    builtin: Builtin,
    this: Option<Value>,
    args: Vec<Value>,
    want_max: bool,
) -> RunResult<Value> {
    let candidates = if this.is_none() && args.len() >= 2 {
        args
    } else {
        let (recv, args) = receiver(builtin, this, args)?;
        exactly::<0>(builtin, args)?;
        collect(vm, recv)?
    };
    let mut iter = candidates.into_iter();
    let Some(first) = iter.next() else {
        return Err(RuntimeError::arity(builtin.name(), "empty sequence"));
    };
    let mut best = first;
    for item in iter {
        let ordering = value_cmp(&item, &best, vm.heap).ok_or_else(|| {
            RuntimeError::type_mismatch(
                "comparable values",
                format!("{} and {}", item.kind_name(vm.heap), best.kind_name(vm.heap)),
            )
        })?;
        let replace = if want_max {
            ordering.is_gt()
        } else {
            ordering.is_lt()
        };
        if replace {
            best = item;
        }
    }
    Ok(best)
}

/// Char index of a byte offset within `s`.
fn char_index_of(s: &str, byte: usize) -> i64 {
    i64::try_from(s[..byte].chars().count()).unwrap_or(i64::MAX)
}

pub(super) fn find<H: HostContext>(vm: &mut Vm<'_, H>, recv: Value, needle: Value) -> RunResult<Value> {
    match &recv {
        Value::Ref(id) => match vm.heap.get(*id) {
            HeapData::Str(s) => {
                let found = match &needle {
                    Value::Ref(nid) => match vm.heap.get(*nid) {
                        HeapData::Str(sub) => s.find(sub.as_str()),
                        HeapData::Regex(re) => re.re.find(s).map(|m| m.start()),
                        other => {
                            return Err(RuntimeError::type_mismatch("string or regex", other.kind_name()));
                        }
                    },
                    other => {
                        return Err(RuntimeError::type_mismatch("string or regex", other.kind_name(vm.heap)));
                    }
                };
                Ok(Value::Int(found.map_or(-1, |byte| char_index_of(s, byte))))
            }
            HeapData::List(items) => {
                let found = items.iter().position(|item| value_eq(item, &needle, vm.heap));
                Ok(Value::Int(
                    found.map_or(-1, |i| i64::try_from(i).unwrap_or(i64::MAX)),
                ))
            }
            other => Err(RuntimeError::type_mismatch("string or list", other.kind_name())),
        },
        other => Err(RuntimeError::type_mismatch("string or list", other.kind_name(vm.heap))),
    }
}

pub(super) fn find_all<H: HostContext>(vm: &mut Vm<'_, H>, recv: Value, needle: Value) -> RunResult<Value> {
    let indices: Vec<Value> = match &recv {
        Value::Ref(id) => match vm.heap.get(*id) {
            HeapData::Str(s) => match &needle {
                Value::Ref(nid) => match vm.heap.get(*nid) {
                    HeapData::Str(sub) => {
                        if sub.is_empty() {
                            Vec::new()
                        } else {
                            s.match_indices(sub.as_str())
                                .map(|(byte, _)| Value::Int(char_index_of(s, byte)))
                                .collect()
                        }
                    }
                    HeapData::Regex(re) => re
                        .re
                        .find_iter(s)
                        .map(|m| Value::Int(char_index_of(s, m.start())))
                        .collect(),
                    other => {
                        return Err(RuntimeError::type_mismatch("string or regex", other.kind_name()));
                    }
                },
                other => {
                    return Err(RuntimeError::type_mismatch("string or regex", other.kind_name(vm.heap)));
                }
            },
            HeapData::List(items) => items
                .iter()
                .enumerate()
                .filter(|(_, item)| value_eq(item, &needle, vm.heap))
                .map(|(i, _)| Value::Int(i64::try_from(i).unwrap_or(i64::MAX)))
                .collect(),
            other => return Err(RuntimeError::type_mismatch("string or list", other.kind_name())),
        },
        other => return Err(RuntimeError::type_mismatch("string or list", other.kind_name(vm.heap))),
    };
    Ok(vm.heap.alloc_list(indices))
}

pub(super) fn split<H: HostContext>(vm: &mut Vm<'_, H>, recv: Value, args: Vec<Value>) -> RunResult<Value> {
    let Some(subject) = as_str(&recv, vm.heap).map(str::to_owned) else {
        return Err(RuntimeError::type_mismatch("string", recv.kind_name(vm.heap)));
    };
    let parts: Vec<String> = match args.first() {
        None => subject.split_whitespace().map(str::to_owned).collect(),
        Some(sep) => match sep {
            Value::Ref(id) => match vm.heap.get(*id) {
                HeapData::Str(sep) => subject.split(sep.as_str()).map(str::to_owned).collect(),
                HeapData::Regex(re) => re.re.split(&subject).map(str::to_owned).collect(),
                other => {
                    return Err(RuntimeError::type_mismatch("string or regex", other.kind_name()));
                }
            },
            other => {
                return Err(RuntimeError::type_mismatch("string or regex", other.kind_name(vm.heap)));
            }
        },
    };
    let values: Vec<Value> = parts.into_iter().map(|p| vm.heap.alloc_str(p)).collect();
    Ok(vm.heap.alloc_list(values))
}

pub(super) fn join<H: HostContext>(vm: &mut Vm<'_, H>, recv: Value, args: Vec<Value>) -> RunResult<Value> {
    let sep = match args.first() {
        None => String::new(),
        Some(sep) => match as_str(sep, vm.heap) {
            Some(s) => s.to_owned(),
            None => display_string(sep, vm.heap),
        },
    };
    let items = collect(vm, recv)?;
    let rendered: Vec<String> = items
        .iter()
        .map(|item| display_string(item, vm.heap))
        .collect();
    Ok(vm.heap.alloc_str(rendered.join(&sep)))
}
