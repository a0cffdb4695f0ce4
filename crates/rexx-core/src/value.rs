//! The minimal value representation the execution core needs in order to
//! drive expression evaluation, variable storage and TRACE formatting.
//!
//! `spec.md` §1 explicitly treats the built-in classes (String, Array, Stem,
//! Directory) as external collaborators: "Only their interface contracts
//! with the core are specified." `Value` therefore carries just enough of a
//! literal/numeric representation to exercise the engine (assignment,
//! arithmetic-free comparisons, TRACE's double-quoted rendering) plus an
//! opaque `External` handle the core never inspects, standing in for any
//! object produced by the real class library. This mirrors how
//! `src/heap.rs`'s `Object`/`HeapData` enum wraps real Python types
//! behind a `PyValue` dispatch without the execution engine caring about
//! their internals.

use std::fmt;
use std::rc::Rc;

/// An opaque reference to a host-managed object (an instance of String,
/// Array, Stem, Directory, or any user class). The core moves these around
/// and compares identity but never inspects their contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalId(pub u64);

#[derive(Debug, Clone)]
pub enum Value {
    /// A variable slot that has never been assigned. Reading one raises
    /// NOVALUE (or, if enabled, notifies the NOVALUE exit/condition).
    Undefined,
    Integer(i64),
    String(Rc<str>),
    /// An object owned by an external collaborator (String/Array/Stem/
    /// Directory instance, or a user object). The core treats this as an
    /// opaque handle.
    External(ExternalId),
}

impl Value {
    #[must_use]
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Self::String(s.into())
    }

    /// Rexx truthiness: only the strings `"0"` and `"1"` are valid booleans;
    /// anything else raises in real Rexx. For the execution core's purposes
    /// (loop/IF tests) we accept integers directly as a convenience so the
    /// demo instruction set does not need a full numeric-string parser.
    #[must_use]
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Self::Integer(0) => Some(false),
            Self::Integer(1) => Some(true),
            Self::String(s) => match s.as_ref() {
                "0" => Some(false),
                "1" => Some(true),
                _ => None,
            },
            _ => None,
        }
    }

    /// TRACE and SAY render values double-quoted (`spec.md` §4.6).
    #[must_use]
    pub fn trace_repr(&self) -> String {
        match self {
            Self::Undefined => "\"?\"".to_owned(),
            Self::Integer(i) => format!("\"{i}\""),
            Self::String(s) => format!("\"{s}\""),
            Self::External(id) => format!("\"<object {}>\"", id.0),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, ""),
            Self::Integer(i) => write!(f, "{i}"),
            Self::String(s) => write!(f, "{s}"),
            Self::External(id) => write!(f, "<object {}>", id.0),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::External(a), Self::External(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_accepts_canonical_bool_strings() {
        assert_eq!(Value::string("1").truthy(), Some(true));
        assert_eq!(Value::string("0").truthy(), Some(false));
        assert_eq!(Value::string("yes").truthy(), None);
    }

    #[test]
    fn trace_repr_is_double_quoted() {
        assert_eq!(Value::Integer(3).trace_repr(), "\"3\"");
    }
}
