//! Arithmetic, comparison, and membership on values.
//!
//! Coercion rules: booleans promote to integers under arithmetic; an
//! integer meeting a float promotes to float; a string on either side of
//! `+` stringifies the other operand; `*` with an integer repeats strings
//! and lists; `+` on a list appends (or concatenates another list).
//! Integer division and remainder by zero are errors; float arithmetic is
//! plain IEEE-754.

use std::cmp::Ordering;

use crate::{
    errors::{RunResult, RuntimeError},
    heap::{Heap, HeapData},
    value::{Value, as_str, display_string, value_cmp, value_eq},
};

/// Numeric operand after boolean promotion.
enum Num {
    Int(i64),
    Float(f64),
}

fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::Int(v) => Some(Num::Int(*v)),
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Float(v) => Some(Num::Float(*v)),
        _ => None,
    }
}

fn type_error(op: &'static str, a: &Value, b: &Value, heap: &Heap) -> RuntimeError {
    RuntimeError::type_mismatch(
        format!("operands supporting '{op}'"),
        format!("{} and {}", a.kind_name(heap), b.kind_name(heap)),
    )
}

pub(crate) fn add(heap: &mut Heap, a: Value, b: Value) -> RunResult<Value> {
    // string concatenation stringifies the other side
    if let Some(s) = as_str(&a, heap) {
        let mut out = s.to_owned();
        out.push_str(&display_string(&b, heap));
        return Ok(heap.alloc_str(out));
    }
    if as_str(&b, heap).is_some() {
        let mut out = display_string(&a, heap);
        if let Some(s) = as_str(&b, heap) {
            out.push_str(s);
        }
        return Ok(heap.alloc_str(out));
    }
    // list append / concatenation produces a new list sharing element refs
    if let Value::Ref(id) = &a
        && let HeapData::List(items) = heap.get(*id)
    {
        let mut out = items.clone();
        match &b {
            Value::Ref(rid) => match heap.get(*rid) {
                HeapData::List(rhs) => out.extend(rhs.iter().cloned()),
                _ => out.push(b.clone()),
            },
            _ => out.push(b.clone()),
        }
        return Ok(heap.alloc_list(out));
    }
    match (as_num(&a), as_num(&b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => Ok(Value::Int(x.wrapping_add(y))),
        (Some(x), Some(y)) => Ok(Value::Float(to_f64(x) + to_f64(y))),
        _ => Err(type_error("+", &a, &b, heap)),
    }
}

pub(crate) fn sub(heap: &mut Heap, a: Value, b: Value) -> RunResult<Value> {
    match (as_num(&a), as_num(&b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => Ok(Value::Int(x.wrapping_sub(y))),
        (Some(x), Some(y)) => Ok(Value::Float(to_f64(x) - to_f64(y))),
        _ => Err(type_error("-", &a, &b, heap)),
    }
}

pub(crate) fn mul(heap: &mut Heap, a: Value, b: Value) -> RunResult<Value> {
    // repetition: string * int, list * int (either operand order)
    if let Some(result) = try_repeat(heap, &a, &b)? {
        return Ok(result);
    }
    if let Some(result) = try_repeat(heap, &b, &a)? {
        return Ok(result);
    }
    match (as_num(&a), as_num(&b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => Ok(Value::Int(x.wrapping_mul(y))),
        (Some(x), Some(y)) => Ok(Value::Float(to_f64(x) * to_f64(y))),
        _ => Err(type_error("*", &a, &b, heap)),
    }
}

fn try_repeat(heap: &mut Heap, subject: &Value, count: &Value) -> RunResult<Option<Value>> {
    let Value::Ref(id) = subject else {
        return Ok(None);
    };
    let Value::Int(n) = count else {
        return Ok(None);
    };
    let n = usize::try_from(*n).unwrap_or(0);
    match heap.get(*id) {
        HeapData::Str(s) => {
            let out = s.repeat(n);
            Ok(Some(heap.alloc_str(out)))
        }
        HeapData::List(items) => {
            let mut out = Vec::with_capacity(items.len() * n);
            for _ in 0..n {
                out.extend(items.iter().cloned());
            }
            Ok(Some(heap.alloc_list(out)))
        }
        _ => Ok(None),
    }
}

pub(crate) fn div(heap: &mut Heap, a: Value, b: Value) -> RunResult<Value> {
    match (as_num(&a), as_num(&b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => {
            if y == 0 {
                Err(RuntimeError::divide_by_zero())
            } else {
                Ok(Value::Int(x.wrapping_div(y)))
            }
        }
        (Some(x), Some(y)) => Ok(Value::Float(to_f64(x) / to_f64(y))),
        _ => Err(type_error("/", &a, &b, heap)),
    }
}

pub(crate) fn rem(heap: &mut Heap, a: Value, b: Value) -> RunResult<Value> {
    match (as_num(&a), as_num(&b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => {
            if y == 0 {
                Err(RuntimeError::divide_by_zero())
            } else {
                Ok(Value::Int(x.wrapping_rem(y)))
            }
        }
        (Some(x), Some(y)) => Ok(Value::Float(to_f64(x) % to_f64(y))),
        _ => Err(type_error("%", &a, &b, heap)),
    }
}

pub(crate) fn neg(heap: &Heap, a: Value) -> RunResult<Value> {
    match as_num(&a) {
        Some(Num::Int(x)) => Ok(Value::Int(x.wrapping_neg())),
        Some(Num::Float(x)) => Ok(Value::Float(-x)),
        None => Err(RuntimeError::type_mismatch("number", a.kind_name(heap))),
    }
}

fn to_f64(n: Num) -> f64 {
    match n {
        Num::Int(v) => v as f64,
        Num::Float(v) => v,
    }
}

/// Comparison backing `< <= > >=`; errors on unlike kinds.
pub(crate) fn compare(heap: &Heap, op: &'static str, a: &Value, b: &Value) -> RunResult<Ordering> {
    value_cmp(a, b, heap).ok_or_else(|| type_error(op, a, b, heap))
}

/// Membership test backing `x in c` and the `contains` builtin.
pub(crate) fn contains(heap: &Heap, candidate: &Value, container: &Value) -> RunResult<bool> {
    match container {
        Value::Range(r) => match candidate {
            Value::Int(v) => Ok(r.contains(*v)),
            Value::Bool(b) => Ok(r.contains(i64::from(*b))),
            _ => Ok(false),
        },
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Str(s) => match candidate {
                Value::Ref(cid) => match heap.get(*cid) {
                    HeapData::Str(needle) => Ok(s.contains(needle.as_str())),
                    HeapData::Regex(re) => Ok(re.re.is_match(s)),
                    _ => Ok(false),
                },
                _ => Ok(false),
            },
            HeapData::List(items) => Ok(items.iter().any(|item| value_eq(item, candidate, heap))),
            HeapData::Object(map) => match as_str(candidate, heap) {
                Some(key) => Ok(map.contains_key(key)),
                None => Ok(false),
            },
            other => Err(RuntimeError::type_mismatch("container", other.kind_name())),
        },
        other => Err(RuntimeError::type_mismatch("container", other.kind_name(heap))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_plus_stringifies() {
        let mut heap = Heap::new();
        let s = heap.alloc_str("221 = ");
        let joined = add(&mut heap, s, Value::Int(13)).unwrap();
        assert_eq!(display_string(&joined, &heap), "221 = 13");
    }

    #[test]
    fn list_plus_appends_or_concatenates() {
        let mut heap = Heap::new();
        let list = heap.alloc_list(vec![Value::Int(1)]);
        let appended = add(&mut heap, list.clone(), Value::Int(2)).unwrap();
        assert_eq!(display_string(&appended, &heap), "[1, 2]");

        let rhs = heap.alloc_list(vec![Value::Int(3), Value::Int(4)]);
        let joined = add(&mut heap, list, rhs).unwrap();
        assert_eq!(display_string(&joined, &heap), "[1, 3, 4]");
    }

    #[test]
    fn repetition() {
        let mut heap = Heap::new();
        let s = heap.alloc_str("ab");
        let repeated = mul(&mut heap, s, Value::Int(3)).unwrap();
        assert_eq!(display_string(&repeated, &heap), "ababab");

        let list = heap.alloc_list(vec![Value::Int(1)]);
        let repeated = mul(&mut heap, Value::Int(2), list).unwrap();
        assert_eq!(display_string(&repeated, &heap), "[1, 1]");
    }

    #[test]
    fn integer_division_checks_zero() {
        let mut heap = Heap::new();
        assert_eq!(div(&mut heap, Value::Int(7), Value::Int(2)).unwrap(), Value::Int(3));
        assert!(div(&mut heap, Value::Int(1), Value::Int(0)).is_err());
        assert!(rem(&mut heap, Value::Int(1), Value::Int(0)).is_err());
    }

    #[test]
    fn booleans_promote() {
        let mut heap = Heap::new();
        assert_eq!(add(&mut heap, Value::Bool(true), Value::Int(2)).unwrap(), Value::Int(3));
    }

    #[test]
    fn membership() {
        let mut heap = Heap::new();
        let list = heap.alloc_list(vec![Value::Int(1), Value::Int(2)]);
        assert!(contains(&heap, &Value::Int(2), &list).unwrap());
        assert!(!contains(&heap, &Value::Int(5), &list).unwrap());

        let hay = heap.alloc_str("hello");
        let needle = heap.alloc_str("ell");
        assert!(contains(&heap, &needle, &hay).unwrap());
    }
}
