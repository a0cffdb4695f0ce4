//! Variable storage and PROCEDURE/EXPOSE scoping (`spec.md` §3
//! VariableFrame, §4.4 scoping rules).
//!
//! Rexx's default scoping rule is dynamic: an internal routine reached by
//! `CALL label` shares its caller's variable pool outright, unless its
//! first instruction is `PROCEDURE [EXPOSE name ...]`, which swaps in a
//! brand new pool where only the named variables remain connected —
//! *connected*, not copied, so an assignment on either side is visible on
//! the other. That sharing is modeled with `Rc<RefCell<Value>>` cells per
//! variable, the same "shared mutable cell" trick `crates/monty/src/
//! heap.rs`'s cell-backed values use for closures captured by reference
//! rather than value; `procedure_scope` clones the `Rc` for each exposed
//! name into the new frame instead of copying the value.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::intern::SymbolId;
use crate::value::Value;

type Cell = Rc<RefCell<Value>>;

/// A stem variable's tail collection (`spec.md` §3 "stem/compound").
///
/// Tails are constructed at runtime from evaluated expression text, so
/// unlike scalar names they cannot be pre-interned into a closed
/// [`crate::intern::Interner`] table; they are stored by their literal
/// string form instead.
#[derive(Debug, Clone, Default)]
pub struct Stem {
    /// The value substituted for any tail that was never explicitly set
    /// (`STEM. = value` assigns this).
    default: Option<Value>,
    tails: AHashMap<String, Value>,
}

impl Stem {
    #[must_use]
    pub fn get(&self, tail: &str) -> Value {
        self.tails
            .get(tail)
            .cloned()
            .or_else(|| self.default.clone())
            .unwrap_or(Value::Undefined)
    }

    pub fn set(&mut self, tail: impl Into<String>, value: Value) {
        self.tails.insert(tail.into(), value);
    }

    pub fn set_default(&mut self, value: Value) {
        self.default = Some(value);
        self.tails.clear();
    }
}

/// One scope's worth of variables (`spec.md` §3 VariableFrame). An
/// activation holds exactly one live `VariableFrame`, shared with its
/// caller unless it issues `PROCEDURE`.
#[derive(Debug, Clone, Default)]
pub struct VariableFrame {
    scalars: AHashMap<SymbolId, Cell>,
    stems: AHashMap<SymbolId, Rc<RefCell<Stem>>>,
}

impl VariableFrame {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a scalar. `None` means the variable has never been assigned
    /// — the caller raises NOVALUE or substitutes the uninterpreted
    /// symbol text, per `spec.md` §3 "NOVALUE flag".
    #[must_use]
    pub fn get(&self, name: SymbolId) -> Option<Value> {
        self.scalars.get(&name).map(|cell| cell.borrow().clone())
    }

    #[must_use]
    pub fn is_set(&self, name: SymbolId) -> bool {
        self.scalars.get(&name).is_some_and(|cell| !matches!(*cell.borrow(), Value::Undefined))
    }

    pub fn set(&mut self, name: SymbolId, value: Value) {
        match self.scalars.get(&name) {
            Some(cell) => *cell.borrow_mut() = value,
            None => {
                self.scalars.insert(name, Rc::new(RefCell::new(value)));
            }
        }
    }

    /// DROPs a variable back to its uninitialized (NOVALUE) state, rather
    /// than removing the cell outright — anything that EXPOSEs this name
    /// still observes the drop.
    pub fn drop_var(&mut self, name: SymbolId) {
        if let Some(cell) = self.scalars.get(&name) {
            *cell.borrow_mut() = Value::Undefined;
        }
    }

    pub fn stem_mut(&mut self, name: SymbolId) -> std::cell::RefMut<'_, Stem> {
        self.stems.entry(name).or_insert_with(|| Rc::new(RefCell::new(Stem::default()))).borrow_mut()
    }

    #[must_use]
    pub fn stem(&self, name: SymbolId) -> Option<std::cell::Ref<'_, Stem>> {
        self.stems.get(&name).map(|s| s.borrow())
    }

    fn cell_for(&mut self, name: SymbolId) -> Cell {
        self.scalars.entry(name).or_insert_with(|| Rc::new(RefCell::new(Value::Undefined))).clone()
    }

    /// Builds the frame a `PROCEDURE EXPOSE name ...` instruction swaps
    /// in: a fresh pool where only `expose` keeps the caller's cell
    /// identity (`spec.md` §4.4).
    #[must_use]
    pub fn procedure_scope(&mut self, expose: &[SymbolId]) -> Self {
        let mut scope = Self::new();
        for &name in expose {
            scope.scalars.insert(name, self.cell_for(name));
        }
        for &name in expose {
            if let Some(stem) = self.stems.get(&name) {
                scope.stems.insert(name, Rc::clone(stem));
            }
        }
        scope
    }

    /// A method's `EXPOSE name ...` instruction: aliases each named
    /// variable's cell from the receiver's object-variable dictionary
    /// (`source`) into this frame, in place, alongside whatever locals
    /// this frame already holds (`spec.md` §4.4 "aliases each named
    /// variable's slot into the current frame" — unlike
    /// `procedure_scope`, this does not replace the frame, since a
    /// method's locals and its exposed object variables coexist).
    pub fn expose_from(&mut self, source: &mut Self, names: &[SymbolId]) {
        for &name in names {
            self.scalars.insert(name, source.cell_for(name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::InternerBuilder;

    #[test]
    fn unset_variable_reads_as_none() {
        let frame = VariableFrame::new();
        let mut builder = InternerBuilder::new();
        let x = builder.intern("X");
        assert_eq!(frame.get(x), None);
    }

    #[test]
    fn exposed_variable_shares_identity_with_caller() {
        let mut builder = InternerBuilder::new();
        let x = builder.intern("X");
        let mut caller = VariableFrame::new();
        caller.set(x, Value::Integer(1));

        let mut callee = caller.procedure_scope(&[x]);
        callee.set(x, Value::Integer(2));

        assert_eq!(caller.get(x), Some(Value::Integer(2)));
    }

    #[test]
    fn expose_from_aliases_object_variables_alongside_locals() {
        let mut builder = InternerBuilder::new();
        let counter = builder.intern("COUNTER");
        let local = builder.intern("LOCAL");
        let mut object_vars = VariableFrame::new();
        object_vars.set(counter, Value::Integer(1));

        let mut method_frame = VariableFrame::new();
        method_frame.set(local, Value::Integer(99));
        method_frame.expose_from(&mut object_vars, &[counter]);
        method_frame.set(counter, Value::Integer(2));

        assert_eq!(object_vars.get(counter), Some(Value::Integer(2)));
        assert_eq!(method_frame.get(local), Some(Value::Integer(99)));
    }

    #[test]
    fn non_exposed_variable_is_not_visible_in_new_scope() {
        let mut builder = InternerBuilder::new();
        let x = builder.intern("X");
        let mut caller = VariableFrame::new();
        caller.set(x, Value::Integer(1));

        let callee = caller.procedure_scope(&[]);
        assert_eq!(callee.get(x), None);
    }

    #[test]
    fn stem_default_applies_to_unset_tails() {
        let mut builder = InternerBuilder::new();
        let stem = builder.intern("STEM.");
        let mut frame = VariableFrame::new();
        frame.stem_mut(stem).set_default(Value::Integer(0));
        frame.stem_mut(stem).set("1", Value::Integer(42));
        assert_eq!(frame.stem(stem).unwrap().get("1"), Value::Integer(42));
        assert_eq!(frame.stem(stem).unwrap().get("2"), Value::Integer(0));
    }
}
