//! Iterators over the finite iterable kinds.
//!
//! `for x in c` visits list elements positionally, strings by code point,
//! ranges ascending, and objects in insertion order as `[key, value]`
//! pairs. Iterators live on the VM's iterator stack for the duration of the
//! loop and never escape into user-visible values.

use crate::{
    errors::{RunResult, RuntimeError},
    heap::{Heap, HeapData, HeapId},
    value::Value,
};

/// A live iteration over one iterable value.
#[derive(Debug)]
pub(crate) enum ValueIter {
    List { list: HeapId, index: usize },
    Str { string: HeapId, byte: usize },
    /// `last` is inclusive; empty when `current > last`.
    Range { current: i64, last: i64, chars: bool },
    Object { object: HeapId, index: usize },
}

impl ValueIter {
    /// Builds an iterator over `value`, or a type error for non-iterables.
    pub fn new(value: Value, heap: &Heap) -> RunResult<Self> {
        match &value {
            Value::Range(r) => Ok(Self::Range {
                current: r.begin,
                last: if r.inclusive { r.end } else { r.end - 1 },
                chars: r.chars,
            }),
            Value::Ref(id) => match heap.get(*id) {
                HeapData::List(_) => Ok(Self::List { list: *id, index: 0 }),
                HeapData::Str(_) => Ok(Self::Str { string: *id, byte: 0 }),
                HeapData::Object(_) => Ok(Self::Object { object: *id, index: 0 }),
                other => Err(RuntimeError::type_mismatch("iterable value", other.kind_name())),
            },
            other => Err(RuntimeError::type_mismatch("iterable value", other.kind_name(heap))),
        }
    }

    /// Whether the iteration is exhausted.
    pub fn is_done(&self, heap: &Heap) -> bool {
        match self {
            Self::List { list, index } => match heap.get(*list) {
                HeapData::List(items) => *index >= items.len(),
                _ => true,
            },
            Self::Str { string, byte } => match heap.get(*string) {
                HeapData::Str(s) => *byte >= s.len(),
                _ => true,
            },
            Self::Range { current, last, .. } => current > last,
            Self::Object { object, index } => match heap.get(*object) {
                HeapData::Object(map) => *index >= map.len(),
                _ => true,
            },
        }
    }

    /// Produces the next element, or `None` when exhausted.
    pub fn next(&mut self, heap: &mut Heap) -> Option<Value> {
        match self {
            Self::List { list, index } => {
                let HeapData::List(items) = heap.get(*list) else {
                    return None;
                };
                let item = items.get(*index)?.clone();
                *index += 1;
                Some(item)
            }
            Self::Str { string, byte } => {
                let HeapData::Str(s) = heap.get(*string) else {
                    return None;
                };
                let c = s[*byte..].chars().next()?;
                *byte += c.len_utf8();
                Some(heap.alloc_str(c.to_string()))
            }
            Self::Range { current, last, chars } => {
                if *current > *last {
                    return None;
                }
                let v = *current;
                *current += 1;
                if *chars {
                    let c = u32::try_from(v).ok().and_then(char::from_u32)?;
                    Some(heap.alloc_str(c.to_string()))
                } else {
                    Some(Value::Int(v))
                }
            }
            Self::Object { object, index } => {
                let HeapData::Object(map) = heap.get(*object) else {
                    return None;
                };
                let (key, value) = map.get_index(*index)?;
                let (key, value) = (key.clone(), value.clone());
                *index += 1;
                let key_value = heap.alloc_str(key);
                Some(heap.alloc_list(vec![key_value, value]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Range, display_string};

    #[test]
    fn list_iteration_is_positional() {
        let mut heap = Heap::new();
        let list = heap.alloc_list(vec![Value::Int(1), Value::Int(2)]);
        let mut iter = ValueIter::new(list, &heap).unwrap();
        assert_eq!(iter.next(&mut heap), Some(Value::Int(1)));
        assert_eq!(iter.next(&mut heap), Some(Value::Int(2)));
        assert!(iter.is_done(&heap));
    }

    #[test]
    fn string_iteration_by_code_point() {
        let mut heap = Heap::new();
        let s = heap.alloc_str("水啦");
        let mut iter = ValueIter::new(s, &heap).unwrap();
        let first = iter.next(&mut heap).unwrap();
        assert_eq!(display_string(&first, &heap), "水");
        let second = iter.next(&mut heap).unwrap();
        assert_eq!(display_string(&second, &heap), "啦");
        assert!(iter.is_done(&heap));
    }

    #[test]
    fn range_iteration_ascending() {
        let mut heap = Heap::new();
        let range = Value::Range(Range { begin: 0, end: 3, inclusive: false, chars: false });
        let mut iter = ValueIter::new(range, &heap).unwrap();
        let mut seen = Vec::new();
        while let Some(v) = iter.next(&mut heap) {
            seen.push(v);
        }
        assert_eq!(seen, vec![Value::Int(0), Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn object_iteration_yields_pairs_in_insertion_order() {
        let mut heap = Heap::new();
        let mut object = crate::heap::Object::new();
        object.insert("a".to_owned(), Value::Int(1));
        object.insert("b".to_owned(), Value::Int(2));
        let obj = heap.alloc_object(object);
        let mut iter = ValueIter::new(obj, &heap).unwrap();
        let first = iter.next(&mut heap).unwrap();
        assert_eq!(display_string(&first, &heap), "[\"a\", 1]");
        let second = iter.next(&mut heap).unwrap();
        assert_eq!(display_string(&second, &heap), "[\"b\", 2]");
        assert!(iter.is_done(&heap));
    }

    #[test]
    fn non_iterable_rejected() {
        let heap = Heap::new();
        assert!(ValueIter::new(Value::Int(3), &heap).is_err());
    }
}
