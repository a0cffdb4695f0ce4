//! Interning for variable names and condition names.
//!
//! Rexx symbols are canonical upper-case and compared by value very often
//! (every `VariableFrame` lookup, every `TrapHandler` table access). Storing
//! them once and passing around a small `Copy` id avoids repeated allocation
//! and lets equality checks become integer comparisons.
//!
//! The first entry (index 0) is always `"<MAIN>"`, a pre-interned
//! sentinel name for the top-level scope.

use ahash::AHashMap;

/// Index into the interner's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

/// The `SymbolId` for `"<MAIN>"` — always index 0 in the interner.
pub const MAIN_SYMBOL_ID: SymbolId = SymbolId(0);

impl SymbolId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Builder used while instruction trees are constructed; consumed into an
/// [`Interner`] once construction is complete.
#[derive(Debug, Default)]
pub struct InternerBuilder {
    map: AHashMap<String, SymbolId>,
    names: Vec<String>,
}

impl InternerBuilder {
    pub fn new() -> Self {
        let mut builder = Self::default();
        let id = builder.intern("<MAIN>");
        debug_assert_eq!(id, MAIN_SYMBOL_ID);
        builder
    }

    /// Interns `name`, canonicalizing to upper case first (Rexx symbols are
    /// case-insensitive and stored upper-cased).
    pub fn intern(&mut self, name: &str) -> SymbolId {
        let canonical = name.to_ascii_uppercase();
        if let Some(&id) = self.map.get(&canonical) {
            return id;
        }
        let id = SymbolId(self.names.len().try_into().expect("SymbolId overflow"));
        self.names.push(canonical.clone());
        self.map.insert(canonical, id);
        id
    }

    pub fn build(self) -> Interner {
        Interner { names: self.names }
    }
}

/// Read-only, shared symbol table produced by an [`InternerBuilder`].
#[derive(Debug, Clone, Default)]
pub struct Interner {
    names: Vec<String>,
}

impl Interner {
    /// Looks up a symbol's canonical spelling.
    ///
    /// # Panics
    /// Panics if `id` was not produced by this interner.
    #[must_use]
    pub fn get(&self, id: SymbolId) -> &str {
        &self.names[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_case_insensitively() {
        let mut builder = InternerBuilder::new();
        let a = builder.intern("foo");
        let b = builder.intern("FOO");
        let c = builder.intern("Foo");
        assert_eq!(a, b);
        assert_eq!(b, c);
        let interner = builder.build();
        assert_eq!(interner.get(a), "FOO");
    }

    #[test]
    fn main_symbol_is_first() {
        let builder = InternerBuilder::new();
        let interner = builder.build();
        assert_eq!(interner.get(MAIN_SYMBOL_ID), "<MAIN>");
    }
}
