//! String interning for identifier and attribute names.
//!
//! The compiler stores every identifier, attribute name, and object-literal
//! key exactly once and refers to it by a compact [`StringId`]. Bytecode
//! operands carry the raw index, so lookups during execution are a plain
//! vector access. The interner is populated during compilation and then
//! frozen inside the [`crate::Program`].

use ahash::AHashMap;

/// Index into the string interner's storage.
///
/// Uses `u32` to save space; bytecode operands narrow this further to `u16`,
/// which bounds a single program at 65 536 distinct names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct StringId(u32);

impl StringId {
    /// Reconstructs a `StringId` from a bytecode operand.
    #[inline]
    #[must_use]
    pub fn from_index(index: u16) -> Self {
        Self(u32::from(index))
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the operand form of this id.
    ///
    /// # Panics
    /// Panics if the id does not fit in a `u16`; the interner refuses to grow
    /// past that bound, so this cannot happen for ids it handed out.
    #[inline]
    #[must_use]
    pub fn operand(self) -> u16 {
        u16::try_from(self.0).expect("interned name id exceeds u16 operand range")
    }
}

/// Deduplicating store of names referenced by compiled code.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Interns {
    strings: Vec<String>,
    #[serde(skip)]
    index: AHashMap<String, StringId>,
}

impl Interns {
    /// Creates an empty interner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string, returning its id. Repeated calls with the same
    /// content return the same id.
    ///
    /// # Panics
    /// Panics if the program defines more than 65 536 distinct names.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.index.get(s) {
            return id;
        }
        let id = StringId(u32::try_from(self.strings.len()).expect("interner overflow"));
        assert!(id.0 <= u32::from(u16::MAX), "program defines too many distinct names");
        self.strings.push(s.to_owned());
        self.index.insert(s.to_owned(), id);
        id
    }

    /// Returns the string for an id.
    ///
    /// # Panics
    /// Panics if the id was not produced by this interner.
    #[must_use]
    pub fn get(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }

    /// Number of interned strings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether the interner is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Rebuilds the reverse index after deserialization.
    ///
    /// `index` is skipped by serde; programs loaded from a snapshot call this
    /// once so later compilations against the same interner stay deduplicated.
    pub fn rebuild_index(&mut self) {
        self.index = self
            .strings
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), StringId(u32::try_from(i).expect("interner overflow"))))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_deduplicates() {
        let mut interns = Interns::new();
        let a = interns.intern("content");
        let b = interns.intern("show");
        let c = interns.intern("content");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(interns.get(a), "content");
        assert_eq!(interns.len(), 2);
    }

    #[test]
    fn operand_round_trip() {
        let mut interns = Interns::new();
        let id = interns.intern("counter");
        assert_eq!(StringId::from_index(id.operand()), id);
    }
}
