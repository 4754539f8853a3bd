//! The persistent global region and its JSON round-trip.
//!
//! Globals live in a flat slot vector addressed by the compile-time
//! [`SymbolTable`]. Between runs they are persisted as a JSON object
//! `{ "<name>": <value> }` in slot order. Only JSON-representable values
//! survive: closures, bound procedures, and regexes are dropped silently
//! (with a `tracing` debug event naming the key). Ranges round-trip through
//! the tagged form `{"$range": [begin, end, inclusive, chars]}`.

use serde_json::{Map as JsonMap, Value as Json};

use crate::{
    heap::{Heap, HeapData, Object},
    value::{Range, Value},
};

/// Depth cap when converting values to JSON; guards against cyclic
/// containers built through shared references.
const MAX_JSON_DEPTH: u32 = 64;

/// Key used for the tagged Range encoding.
const RANGE_TAG: &str = "$range";

/// Maps global names to their slots. Slot order is first-reference order and
/// is stable for a given source, which keeps serialized globals stable too.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SymbolTable {
    names: Vec<String>,
}

impl SymbolTable {
    pub(crate) fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// All global names in slot order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The slot for `name`, if the program references it.
    #[must_use]
    pub fn slot_of(&self, name: &str) -> Option<u16> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| u16::try_from(i).expect("symbol table exceeds u16"))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// The per-run global slot region.
///
/// `extra` holds prior persisted entries whose names this program never
/// references; they pass through serialization untouched so one script
/// revision cannot silently destroy another's state.
#[derive(Debug)]
pub(crate) struct Globals {
    slots: Vec<Value>,
    extra: JsonMap<String, Json>,
}

impl Globals {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![Value::Undefined; len],
            extra: JsonMap::new(),
        }
    }

    /// Script-visible read: never-assigned slots read as null.
    pub fn get(&self, slot: u16) -> Value {
        match &self.slots[slot as usize] {
            Value::Undefined => Value::Null,
            value => value.clone(),
        }
    }

    pub fn set(&mut self, slot: u16, value: Value) {
        self.slots[slot as usize] = value;
    }

    /// Raw slot read, keeping the `Undefined` sentinel (serialization skips
    /// those).
    pub fn raw(&self, slot: u16) -> &Value {
        &self.slots[slot as usize]
    }
}

/// Serializes the named globals into a JSON object, dropping values that
/// have no JSON form.
pub(crate) fn serialize_globals(globals: &Globals, symbols: &SymbolTable, heap: &Heap) -> JsonMap<String, Json> {
    let mut out = JsonMap::new();
    for (i, name) in symbols.names().iter().enumerate() {
        let slot = u16::try_from(i).expect("symbol table exceeds u16");
        let value = globals.raw(slot);
        if matches!(value, Value::Undefined) {
            continue;
        }
        match value_to_json(value, heap, 0) {
            Some(json) => {
                out.insert(name.clone(), json);
            }
            None => {
                tracing::debug!(global = %name, "dropping non-serializable global");
            }
        }
    }
    for (name, json) in &globals.extra {
        out.insert(name.clone(), json.clone());
    }
    out
}

/// Restores globals from a JSON object, allocating containers on `heap`.
/// Names the program does not reference are ignored.
pub(crate) fn deserialize_globals(prior: &JsonMap<String, Json>, symbols: &SymbolTable, heap: &mut Heap) -> Globals {
    let mut globals = Globals::new(symbols.len());
    for (name, json) in prior {
        match symbols.slot_of(name) {
            Some(slot) => {
                let value = json_to_value(json, heap);
                globals.set(slot, value);
            }
            None => {
                globals.extra.insert(name.clone(), json.clone());
            }
        }
    }
    globals
}

/// Converts a runtime value to JSON. Returns `None` for values with no JSON
/// form (closures, bound procedures, regexes).
pub(crate) fn value_to_json(value: &Value, heap: &Heap, depth: u32) -> Option<Json> {
    if depth > MAX_JSON_DEPTH {
        return None;
    }
    match value {
        Value::Undefined => None,
        Value::Null => Some(Json::Null),
        Value::Bool(b) => Some(Json::Bool(*b)),
        Value::Int(v) => Some(Json::from(*v)),
        Value::Float(v) => serde_json::Number::from_f64(*v).map(Json::Number),
        Value::Range(r) => {
            let parts = vec![
                Json::from(r.begin),
                Json::from(r.end),
                Json::Bool(r.inclusive),
                Json::Bool(r.chars),
            ];
            let mut map = JsonMap::new();
            map.insert(RANGE_TAG.to_owned(), Json::Array(parts));
            Some(Json::Object(map))
        }
        Value::Builtin(_) | Value::Subscript(_) => None,
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Str(s) => Some(Json::String(s.clone())),
            HeapData::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(value_to_json(item, heap, depth + 1)?);
                }
                Some(Json::Array(out))
            }
            HeapData::Object(map) => {
                let mut out = JsonMap::new();
                for (key, item) in map {
                    out.insert(key.clone(), value_to_json(item, heap, depth + 1)?);
                }
                Some(Json::Object(out))
            }
            HeapData::Regex(_) | HeapData::Closure(_) | HeapData::Bound(_) => None,
            HeapData::Cell(inner) => value_to_json(inner, heap, depth + 1),
        },
    }
}

/// Converts JSON into a runtime value, allocating containers on `heap`.
pub(crate) fn json_to_value(json: &Json, heap: &mut Heap) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(v) = n.as_i64() {
                Value::Int(v)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => heap.alloc_str(s.clone()),
        Json::Array(items) => {
            let values: Vec<Value> = items.iter().map(|item| json_to_value(item, heap)).collect();
            heap.alloc_list(values)
        }
        Json::Object(map) => {
            if let Some(range) = decode_range_tag(map) {
                return Value::Range(range);
            }
            let mut object = Object::new();
            for (key, item) in map {
                let value = json_to_value(item, heap);
                object.insert(key.clone(), value);
            }
            heap.alloc_object(object)
        }
    }
}

fn decode_range_tag(map: &JsonMap<String, Json>) -> Option<Range> {
    if map.len() != 1 {
        return None;
    }
    let Json::Array(parts) = map.get(RANGE_TAG)? else {
        return None;
    };
    if parts.len() != 4 {
        return None;
    }
    Some(Range {
        begin: parts[0].as_i64()?,
        end: parts[1].as_i64()?,
        inclusive: parts[2].as_bool()?,
        chars: parts[3].as_bool()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_values_and_order() {
        let symbols = SymbolTable::new(vec!["a".into(), "b".into(), "c".into()]);
        let mut heap = Heap::new();
        let mut globals = Globals::new(symbols.len());
        globals.set(0, Value::Int(3));
        let x = heap.alloc_str("x");
        let list = heap.alloc_list(vec![Value::Int(1), x]);
        globals.set(1, list);
        // slot 2 stays Undefined and is skipped

        let json = serialize_globals(&globals, &symbols, &heap);
        assert_eq!(json.len(), 2);
        assert_eq!(
            serde_json::to_string(&Json::Object(json.clone())).unwrap(),
            r#"{"a":3,"b":[1,"x"]}"#
        );

        let mut heap2 = Heap::new();
        let restored = deserialize_globals(&json, &symbols, &mut heap2);
        assert_eq!(restored.get(0), Value::Int(3));
        let json2 = serialize_globals(&restored, &symbols, &heap2);
        assert_eq!(json, json2);
    }

    #[test]
    fn ranges_round_trip_tagged() {
        let symbols = SymbolTable::new(vec!["r".into()]);
        let mut heap = Heap::new();
        let mut globals = Globals::new(1);
        let range = Range { begin: 1, end: 5, inclusive: false, chars: false };
        globals.set(0, Value::Range(range));

        let json = serialize_globals(&globals, &symbols, &heap);
        let restored = deserialize_globals(&json, &symbols, &mut heap);
        assert_eq!(restored.get(0), Value::Range(range));
    }

    #[test]
    fn closures_drop_silently() {
        use crate::heap::{Closure, HeapData};
        use smallvec::SmallVec;

        let symbols = SymbolTable::new(vec!["f".into(), "n".into()]);
        let mut heap = Heap::new();
        let mut globals = Globals::new(2);
        let closure = heap.allocate(HeapData::Closure(Closure {
            function: crate::heap::FunctionId(0),
            captures: SmallVec::new(),
        }));
        globals.set(0, Value::Ref(closure));
        globals.set(1, Value::Int(7));

        let json = serialize_globals(&globals, &symbols, &heap);
        assert!(!json.contains_key("f"));
        assert_eq!(json.get("n"), Some(&Json::from(7)));
    }
}
