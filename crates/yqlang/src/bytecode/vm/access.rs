//! The access-view engine: read and write paths for postfix chains like
//! `a.b[2:4][0].c`.
//!
//! A view is a stateful cursor living on the VM's view stack. `PushView`
//! starts it at a base value; each `ExtendView`/`ExtendViewAttr` resolves
//! the current selection to a value and applies one more step to it. The
//! final instruction decides the mode:
//!
//! - `ViewGet` materializes the selection (slices become new containers
//!   whose elements share refs with the original; a string index becomes a
//!   fresh one-character string; a missing object key reads as null);
//! - `ViewGetRef` materializes for a call: object-stored values bind to the
//!   receiver as `this`, and a miss falls back to a builtin of the same
//!   name bound to the receiver, raising `NoSuchMethod` when none exists;
//! - `ViewSet` mutates the innermost container in place: element write,
//!   slice splice, or object insert.

use crate::{
    builtins::Builtin,
    errors::{RunResult, RuntimeError},
    heap::{Bound, Heap, HeapData, HeapId},
    value::{Subscript, Value, as_int, display_string},
};

/// One step applied to a view.
pub(crate) enum StepValue {
    /// `.name` — an interned attribute name.
    Attr(String),
    /// `[expr]` or `[b:e]` — the evaluated step value from the stack.
    Value(Value),
}

/// What the cursor currently selects.
#[derive(Debug, Clone)]
enum Selection {
    /// A plain value with no writable location (chain start, or a computed
    /// intermediate).
    Value(Value),
    ListIndex { list: HeapId, index: usize },
    ListSlice { list: HeapId, begin: usize, end: usize },
    /// Character index into a string; reads materialize a one-char string,
    /// writes splice.
    StrIndex { string: HeapId, index: usize },
    /// Character range into a string.
    StrSlice { string: HeapId, begin: usize, end: usize },
    /// Object member, possibly missing (reads null, writes insert).
    ObjectKey { object: HeapId, key: String },
    /// Attribute on a non-object receiver: only meaningful as a method
    /// lookup.
    Method { receiver: Value, name: String },
}

/// A live access view.
#[derive(Debug, Clone)]
pub(crate) struct AccessView {
    sel: Selection,
}

impl AccessView {
    pub fn new(base: Value) -> Self {
        Self {
            sel: Selection::Value(base),
        }
    }

    /// Applies one step: resolves the current selection, then selects into
    /// the resolved value.
    pub fn extend(&mut self, step: StepValue, heap: &mut Heap) -> RunResult<()> {
        let value = self.resolve(heap)?;
        self.sel = match step {
            StepValue::Attr(name) => select_key(value, name, heap),
            StepValue::Value(step_value) => match step_value {
                Value::Int(_) | Value::Bool(_) => {
                    let index = as_int(&step_value).expect("checked variant");
                    select_index(value, index, heap)?
                }
                Value::Subscript(subscript) => select_slice(value, subscript, heap)?,
                Value::Ref(id) => match heap.get(id) {
                    HeapData::Str(key) => {
                        let key = key.clone();
                        select_key(value, key, heap)
                    }
                    other => {
                        return Err(RuntimeError::type_mismatch(
                            "index, key, or slice",
                            other.kind_name(),
                        ));
                    }
                },
                other => {
                    return Err(RuntimeError::type_mismatch(
                        "index, key, or slice",
                        other.kind_name(heap),
                    ));
                }
            },
        };
        Ok(())
    }

    /// Materializes the current selection as a value.
    pub fn get(&self, heap: &mut Heap) -> RunResult<Value> {
        self.resolve(heap)
    }

    /// Materializes the selection for a call, binding procedures to their
    /// receiver and falling back to builtins for attribute misses.
    pub fn get_ref(&self, heap: &mut Heap) -> RunResult<Value> {
        match &self.sel {
            Selection::ObjectKey { object, key } => {
                let HeapData::Object(map) = heap.get(*object) else {
                    return Err(RuntimeError::type_mismatch("object", heap.get(*object).kind_name()));
                };
                match map.get(key).cloned() {
                    Some(callee) => {
                        let receiver = Value::Ref(*object);
                        Ok(Value::Ref(heap.allocate(HeapData::Bound(Bound { callee, receiver }))))
                    }
                    None => bind_builtin(Value::Ref(*object), key, heap),
                }
            }
            Selection::Method { receiver, name } => bind_builtin(receiver.clone(), name, heap),
            _ => self.resolve(heap),
        }
    }

    /// Writes `rhs` through the selection, mutating in place.
    pub fn set(&self, rhs: Value, heap: &mut Heap) -> RunResult<()> {
        match &self.sel {
            Selection::ListIndex { list, index } => {
                let HeapData::List(items) = heap.get_mut(*list) else {
                    return Err(RuntimeError::type_mismatch("list", "value"));
                };
                items[*index] = rhs;
                Ok(())
            }
            Selection::ListSlice { list, begin, end } => {
                // clone the replacement elements before mutating, so
                // self-referential splices like `a[1:3] = a` stay sound
                let replacement = match &rhs {
                    Value::Ref(id) => match heap.get(*id) {
                        HeapData::List(items) => items.clone(),
                        _ => vec![rhs.clone()],
                    },
                    _ => vec![rhs.clone()],
                };
                let HeapData::List(items) = heap.get_mut(*list) else {
                    return Err(RuntimeError::type_mismatch("list", "value"));
                };
                items.splice(*begin..*end, replacement);
                Ok(())
            }
            Selection::StrIndex { string, index } => {
                splice_str(heap, *string, *index, *index + 1, rhs)
            }
            Selection::StrSlice { string, begin, end } => {
                splice_str(heap, *string, *begin, *end, rhs)
            }
            Selection::ObjectKey { object, key } => {
                let HeapData::Object(map) = heap.get_mut(*object) else {
                    return Err(RuntimeError::type_mismatch("object", "value"));
                };
                map.insert(key.clone(), rhs);
                Ok(())
            }
            Selection::Value(value) => Err(RuntimeError::type_mismatch(
                "assignable place",
                value.kind_name(heap),
            )),
            Selection::Method { receiver, .. } => Err(RuntimeError::type_mismatch(
                "assignable place",
                receiver.kind_name(heap),
            )),
        }
    }

    /// Resolves the selection to its current value without consuming the
    /// view.
    fn resolve(&self, heap: &mut Heap) -> RunResult<Value> {
        match &self.sel {
            Selection::Value(value) => Ok(value.clone()),
            Selection::ListIndex { list, index } => {
                let HeapData::List(items) = heap.get(*list) else {
                    return Err(RuntimeError::type_mismatch("list", "value"));
                };
                Ok(items.get(*index).cloned().unwrap_or(Value::Null))
            }
            Selection::ListSlice { list, begin, end } => {
                let HeapData::List(items) = heap.get(*list) else {
                    return Err(RuntimeError::type_mismatch("list", "value"));
                };
                let slice: Vec<Value> = items[*begin..*end].to_vec();
                Ok(heap.alloc_list(slice))
            }
            Selection::StrIndex { string, index } => {
                let HeapData::Str(s) = heap.get(*string) else {
                    return Err(RuntimeError::type_mismatch("string", "value"));
                };
                let c: String = s.chars().skip(*index).take(1).collect();
                Ok(heap.alloc_str(c))
            }
            Selection::StrSlice { string, begin, end } => {
                let HeapData::Str(s) = heap.get(*string) else {
                    return Err(RuntimeError::type_mismatch("string", "value"));
                };
                let slice: String = s.chars().skip(*begin).take(end.saturating_sub(*begin)).collect();
                Ok(heap.alloc_str(slice))
            }
            Selection::ObjectKey { object, key } => {
                let HeapData::Object(map) = heap.get(*object) else {
                    return Err(RuntimeError::type_mismatch("object", "value"));
                };
                Ok(map.get(key).cloned().unwrap_or(Value::Null))
            }
            // reading (not calling) a method selection yields the bound
            // procedure when the builtin exists, else null
            Selection::Method { receiver, name } => {
                match Builtin::from_name(name) {
                    Some(builtin) => {
                        let bound = Bound {
                            callee: Value::Builtin(builtin),
                            receiver: receiver.clone(),
                        };
                        Ok(Value::Ref(heap.allocate(HeapData::Bound(bound))))
                    }
                    None => Ok(Value::Null),
                }
            }
        }
    }
}

/// Looks up a builtin by name and binds it to `receiver`, or raises
/// `NoSuchMethod`.
fn bind_builtin(receiver: Value, name: &str, heap: &mut Heap) -> RunResult<Value> {
    match Builtin::from_name(name) {
        Some(builtin) => {
            let bound = Bound {
                callee: Value::Builtin(builtin),
                receiver,
            };
            Ok(Value::Ref(heap.allocate(HeapData::Bound(bound))))
        }
        None => Err(RuntimeError::no_such_method(receiver.kind_name(heap), name)),
    }
}

/// Selects `.name` / `["name"]` into a value.
fn select_key(value: Value, key: String, heap: &Heap) -> Selection {
    match &value {
        Value::Ref(id) if matches!(heap.get(*id), HeapData::Object(_)) => Selection::ObjectKey {
            object: *id,
            key,
        },
        _ => Selection::Method {
            receiver: value,
            name: key,
        },
    }
}

/// Selects an integer index into a list or string.
fn select_index(value: Value, index: i64, heap: &Heap) -> RunResult<Selection> {
    match &value {
        Value::Ref(id) => match heap.get(*id) {
            HeapData::List(items) => {
                let index = normalize_index(index, items.len())?;
                Ok(Selection::ListIndex { list: *id, index })
            }
            HeapData::Str(s) => {
                let index = normalize_index(index, s.chars().count())?;
                Ok(Selection::StrIndex { string: *id, index })
            }
            other => Err(RuntimeError::type_mismatch("indexable value", other.kind_name())),
        },
        other => Err(RuntimeError::type_mismatch("indexable value", other.kind_name(heap))),
    }
}

/// Selects a `[b:e]` slice into a list or string.
fn select_slice(value: Value, subscript: Subscript, heap: &Heap) -> RunResult<Selection> {
    match &value {
        Value::Ref(id) => match heap.get(*id) {
            HeapData::List(items) => {
                let (begin, end) = normalize_slice(subscript, items.len());
                Ok(Selection::ListSlice { list: *id, begin, end })
            }
            HeapData::Str(s) => {
                let (begin, end) = normalize_slice(subscript, s.chars().count());
                Ok(Selection::StrSlice { string: *id, begin, end })
            }
            other => Err(RuntimeError::type_mismatch("sliceable value", other.kind_name())),
        },
        other => Err(RuntimeError::type_mismatch("sliceable value", other.kind_name(heap))),
    }
}

/// Negative indices count from the end; out of range is an error.
fn normalize_index(index: i64, len: usize) -> RunResult<usize> {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let adjusted = if index < 0 { index + len_i } else { index };
    if adjusted < 0 || adjusted >= len_i {
        Err(RuntimeError::index_out_of_range(index, len))
    } else {
        Ok(usize::try_from(adjusted).expect("non-negative index"))
    }
}

/// Slice endpoints clamp to the container; `begin >= end` yields empty.
fn normalize_slice(subscript: Subscript, len: usize) -> (usize, usize) {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let fix = |endpoint: i64| -> i64 {
        let adjusted = if endpoint < 0 { endpoint + len_i } else { endpoint };
        adjusted.clamp(0, len_i)
    };
    let begin = fix(subscript.begin.unwrap_or(0));
    let end = fix(subscript.end.unwrap_or(len_i));
    let end = end.max(begin);
    (
        usize::try_from(begin).expect("clamped non-negative"),
        usize::try_from(end).expect("clamped non-negative"),
    )
}

/// Replaces the character range `[begin, end)` of the string cell with the
/// string-coerced `rhs`.
fn splice_str(heap: &mut Heap, string: HeapId, begin: usize, end: usize, rhs: Value) -> RunResult<()> {
    let replacement = display_string(&rhs, heap);
    let HeapData::Str(s) = heap.get_mut(string) else {
        return Err(RuntimeError::type_mismatch("string", "value"));
    };
    let byte_begin = char_to_byte(s, begin);
    let byte_end = char_to_byte(s, end);
    s.replace_range(byte_begin..byte_end, &replacement);
    Ok(())
}

/// Byte offset of the `index`-th character (saturating at the end).
fn char_to_byte(s: &str, index: usize) -> usize {
    s.char_indices().nth(index).map_or(s.len(), |(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Object;
    use crate::value::display_string;

    #[test]
    fn list_index_read_and_write() {
        let mut heap = Heap::new();
        let list = heap.alloc_list(vec![Value::Int(1), Value::Int(2)]);
        let mut view = AccessView::new(list.clone());
        view.extend(StepValue::Value(Value::Int(-1)), &mut heap).unwrap();
        assert_eq!(view.get(&mut heap).unwrap(), Value::Int(2));
        view.set(Value::Int(9), &mut heap).unwrap();
        assert_eq!(display_string(&list, &heap), "[1, 9]");
    }

    #[test]
    fn slice_assign_splices() {
        let mut heap = Heap::new();
        let list = heap.alloc_list(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]);
        let mut view = AccessView::new(list.clone());
        view.extend(
            StepValue::Value(Value::Subscript(Subscript { begin: Some(1), end: Some(3) })),
            &mut heap,
        )
        .unwrap();
        let rhs = heap.alloc_list(vec![Value::Int(9), Value::Int(8)]);
        view.set(rhs, &mut heap).unwrap();
        assert_eq!(display_string(&list, &heap), "[1, 9, 8, 4]");
    }

    #[test]
    fn string_slice_assign() {
        let mut heap = Heap::new();
        let s = heap.alloc_str("apple");
        let mut view = AccessView::new(s.clone());
        view.extend(
            StepValue::Value(Value::Subscript(Subscript { begin: Some(3), end: Some(4) })),
            &mut heap,
        )
        .unwrap();
        let rhs = heap.alloc_str("rov");
        view.set(rhs, &mut heap).unwrap();
        assert_eq!(display_string(&s, &heap), "approve");
    }

    #[test]
    fn string_index_is_one_char_view() {
        let mut heap = Heap::new();
        let s = heap.alloc_str("水多少啦");
        let mut view = AccessView::new(s.clone());
        view.extend(StepValue::Value(Value::Int(1)), &mut heap).unwrap();
        let c = view.get(&mut heap).unwrap();
        assert_eq!(display_string(&c, &heap), "多");
        view.set(Value::Int(7), &mut heap).unwrap();
        assert_eq!(display_string(&s, &heap), "水7少啦");
    }

    #[test]
    fn missing_object_key_reads_null_and_writes_insert() {
        let mut heap = Heap::new();
        let obj = heap.alloc_object(Object::new());
        let mut view = AccessView::new(obj.clone());
        view.extend(StepValue::Attr("content".to_owned()), &mut heap).unwrap();
        assert_eq!(view.get(&mut heap).unwrap(), Value::Null);
        view.set(Value::Int(1), &mut heap).unwrap();
        assert_eq!(display_string(&obj, &heap), "{content: 1}");
    }

    #[test]
    fn method_fallback_binds_builtin() {
        let mut heap = Heap::new();
        let s = heap.alloc_str("abc");
        let mut view = AccessView::new(s);
        view.extend(StepValue::Attr("length".to_owned()), &mut heap).unwrap();
        let bound = view.get_ref(&mut heap).unwrap();
        let Value::Ref(id) = bound else { panic!("expected ref") };
        assert!(matches!(heap.get(id), HeapData::Bound(_)));
    }

    #[test]
    fn unknown_method_raises() {
        let mut heap = Heap::new();
        let s = heap.alloc_str("abc");
        let mut view = AccessView::new(s);
        view.extend(StepValue::Attr("frobnicate".to_owned()), &mut heap).unwrap();
        let err = view.get_ref(&mut heap).unwrap_err();
        assert!(matches!(err.kind, crate::errors::RuntimeErrorKind::NoSuchMethod { .. }));
    }

    #[test]
    fn out_of_range_index_errors() {
        let mut heap = Heap::new();
        let list = heap.alloc_list(vec![Value::Int(1)]);
        let mut view = AccessView::new(list);
        let err = view.extend(StepValue::Value(Value::Int(5)), &mut heap).unwrap_err();
        assert!(matches!(err.kind, crate::errors::RuntimeErrorKind::IndexOutOfRange { .. }));
    }
}
