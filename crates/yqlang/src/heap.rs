//! Arena heap backing the reference types.
//!
//! Strings, lists, objects, regexes, closures, bound procedures, and capture
//! cells live here; everything else is stored inline in [`crate::value::Value`].
//! Ids are never reused within a run. Nothing is freed mid-run: every run is
//! bounded by the driver's budget, so the whole arena is simply dropped when
//! the run ends. Allocation counts and an approximate byte size are still
//! tracked so hosts can observe heap growth.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::value::Value;

/// Handle to a cell in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId(u32);

impl HeapId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a compiled function inside a [`crate::Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FunctionId(pub u16);

/// A closure value: a compiled function plus the capture cells it closes
/// over. Captures are always shared cells, never copies, so a closure can
/// mutate the enclosing bindings.
#[derive(Debug, Clone)]
pub struct Closure {
    pub function: FunctionId,
    pub captures: SmallVec<[HeapId; 4]>,
}

/// A procedure packaged with a receiver; inside the body `this` refers to
/// that receiver.
#[derive(Debug, Clone)]
pub struct Bound {
    pub callee: Value,
    pub receiver: Value,
}

/// A compiled regular expression with its source pattern and flags.
#[derive(Debug, Clone)]
pub struct RegexValue {
    pub pattern: String,
    pub flags: String,
    pub re: regex::Regex,
}

/// String-keyed map with insertion order.
pub type Object = IndexMap<String, Value>;

/// Payload of one heap cell.
#[derive(Debug, Clone)]
pub enum HeapData {
    Str(String),
    List(Vec<Value>),
    Object(Object),
    Regex(RegexValue),
    Closure(Closure),
    Bound(Bound),
    /// A promoted local binding shared between a frame and the closures that
    /// capture it.
    Cell(Value),
}

impl HeapData {
    /// Static name of the stored kind, for error messages and stats.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Object(_) => "object",
            Self::Regex(_) => "regex",
            Self::Closure(_) => "function",
            Self::Bound(_) => "bound function",
            Self::Cell(_) => "cell",
        }
    }

    fn approx_bytes(&self) -> usize {
        match self {
            Self::Str(s) => s.len(),
            Self::List(items) => items.len() * std::mem::size_of::<Value>(),
            Self::Object(map) => map.iter().map(|(k, _)| k.len() + std::mem::size_of::<Value>()).sum(),
            Self::Regex(r) => r.pattern.len(),
            Self::Closure(_) | Self::Bound(_) | Self::Cell(_) => std::mem::size_of::<Value>(),
        }
    }
}

/// Snapshot of heap state, for hosts and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Number of cells allocated during the run.
    pub allocations: usize,
    /// Approximate payload bytes at snapshot time.
    pub approx_bytes: usize,
    /// Breakdown of cells by kind name.
    pub cells_by_kind: BTreeMap<&'static str, usize>,
}

/// The arena. Created fresh per run and dropped wholesale afterwards.
#[derive(Debug, Default)]
pub struct Heap {
    cells: Vec<HeapData>,
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a cell and returns its id.
    ///
    /// # Panics
    /// Panics if a single run allocates more than `u32::MAX` cells; the time
    /// budget cancels runs long before that.
    pub fn allocate(&mut self, data: HeapData) -> HeapId {
        let id = HeapId(u32::try_from(self.cells.len()).expect("heap exhausted"));
        self.cells.push(data);
        id
    }

    /// Convenience: allocates a string cell.
    pub fn alloc_str(&mut self, s: impl Into<String>) -> Value {
        Value::Ref(self.allocate(HeapData::Str(s.into())))
    }

    /// Convenience: allocates a list cell.
    pub fn alloc_list(&mut self, items: Vec<Value>) -> Value {
        Value::Ref(self.allocate(HeapData::List(items)))
    }

    /// Convenience: allocates an object cell.
    pub fn alloc_object(&mut self, map: Object) -> Value {
        Value::Ref(self.allocate(HeapData::Object(map)))
    }

    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.cells[id.index()]
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.cells[id.index()]
    }

    /// Reads the value out of a capture cell.
    ///
    /// # Panics
    /// Panics if `id` does not name a cell; the compiler only emits cell
    /// loads for promoted slots.
    #[must_use]
    pub fn cell_get(&self, id: HeapId) -> Value {
        match self.get(id) {
            HeapData::Cell(value) => value.clone(),
            other => panic!("cell load hit a {} cell", other.kind_name()),
        }
    }

    /// Writes the value into a capture cell.
    ///
    /// # Panics
    /// Panics if `id` does not name a cell.
    pub fn cell_set(&mut self, id: HeapId, value: Value) {
        match self.get_mut(id) {
            HeapData::Cell(slot) => *slot = value,
            other => panic!("cell store hit a {} cell", other.kind_name()),
        }
    }

    /// Number of cells allocated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Takes a point-in-time snapshot of allocation statistics.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut cells_by_kind = BTreeMap::new();
        let mut approx_bytes = 0;
        for cell in &self.cells {
            *cells_by_kind.entry(cell.kind_name()).or_insert(0) += 1;
            approx_bytes += cell.approx_bytes();
        }
        HeapStats {
            allocations: self.cells.len(),
            approx_bytes,
            cells_by_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_mutate() {
        let mut heap = Heap::new();
        let Value::Ref(id) = heap.alloc_list(vec![Value::Int(1), Value::Int(2)]) else {
            panic!("expected ref");
        };
        if let HeapData::List(items) = heap.get_mut(id) {
            items[0] = Value::Int(9);
        }
        let HeapData::List(items) = heap.get(id) else {
            panic!("expected list");
        };
        assert_eq!(items[0], Value::Int(9));
    }

    #[test]
    fn cells_round_trip() {
        let mut heap = Heap::new();
        let cell = heap.allocate(HeapData::Cell(Value::Null));
        heap.cell_set(cell, Value::Int(7));
        assert_eq!(heap.cell_get(cell), Value::Int(7));
    }

    #[test]
    fn stats_count_kinds() {
        let mut heap = Heap::new();
        heap.alloc_str("hello");
        heap.alloc_str("world");
        heap.alloc_list(vec![]);
        let stats = heap.stats();
        assert_eq!(stats.allocations, 3);
        assert_eq!(stats.cells_by_kind.get("string"), Some(&2));
        assert_eq!(stats.approx_bytes, 10);
    }
}
