//! The per-activation operand stack (`spec.md` §3 EvaluationStack).
//!
//! Bounded through a [`crate::resource::ResourceTracker`] rather than an
//! unchecked `Vec`, so a runaway expression (or a host embedding this
//! crate with a small memory budget) fails with a catchable condition
//! instead of exhausting process memory — the same reasoning
//! [`crate::resource`]'s own heap budget tracking applies.
//!
//! REPLY (`spec.md` §4.2) migrates an activation's continuation, stack
//! included, onto a new activity thread; [`EvaluationStack::take`] /
//! [`EvaluationStack::restore`] hand the raw contents across that
//! boundary without re-validating the resource budget (the budget
//! belongs to the activation, which migrates with its contents).

use crate::error::SyntaxError;
use crate::resource::{ResourceLimits, ResourceTracker};
use crate::value::Value;

pub struct EvaluationStack {
    values: Vec<Value>,
    tracker: Box<dyn ResourceTracker>,
}

impl EvaluationStack {
    #[must_use]
    pub fn new(limits: &ResourceLimits) -> Self {
        Self { values: Vec::new(), tracker: limits.evaluation_tracker() }
    }

    /// # Errors
    /// Returns [`SyntaxError::ControlStackFull`] if the configured depth
    /// limit has been reached.
    pub fn push(&mut self, value: Value) -> Result<(), SyntaxError> {
        if !self.tracker.enter() {
            return Err(SyntaxError::ControlStackFull);
        }
        self.values.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Value> {
        let value = self.values.pop();
        if value.is_some() {
            self.tracker.exit();
        }
        value
    }

    #[must_use]
    pub fn peek(&self) -> Option<&Value> {
        self.values.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Takes ownership of the stack contents for a REPLY frame migration,
    /// leaving this stack empty.
    #[must_use]
    pub fn take(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.values)
    }

    /// Restores contents handed over from [`Self::take`] on the
    /// destination activity thread. The tracker is re-primed to the
    /// restored depth so later pops still balance out.
    pub fn restore(&mut self, values: Vec<Value>) {
        for _ in 0..values.len() {
            self.tracker.enter();
        }
        self.values = values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_round_trips() {
        let mut stack = EvaluationStack::new(&ResourceLimits::unlimited());
        stack.push(Value::Integer(1)).unwrap();
        stack.push(Value::Integer(2)).unwrap();
        assert_eq!(stack.pop(), Some(Value::Integer(2)));
        assert_eq!(stack.pop(), Some(Value::Integer(1)));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn push_fails_past_limit() {
        let limits = ResourceLimits::builder().evaluation_stack(1).build();
        let mut stack = EvaluationStack::new(&limits);
        stack.push(Value::Integer(1)).unwrap();
        assert!(stack.push(Value::Integer(2)).is_err());
    }

    #[test]
    fn take_and_restore_preserve_contents() {
        let mut stack = EvaluationStack::new(&ResourceLimits::unlimited());
        stack.push(Value::Integer(7)).unwrap();
        let migrated = stack.take();
        assert!(stack.is_empty());
        let mut destination = EvaluationStack::new(&ResourceLimits::unlimited());
        destination.restore(migrated);
        assert_eq!(destination.pop(), Some(Value::Integer(7)));
    }
}
