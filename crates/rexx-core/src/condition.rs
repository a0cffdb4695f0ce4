//! The condition trap table and pending-condition queue (`spec.md` §4.3).
//!
//! Grounded on `original_source/interpreter/execution/RexxActivation.cpp`'s
//! `trap`/`processTraps`/`raise` trio and on `RaiseInstruction.hpp`'s
//! `raise_return`/`raise_array` flags (SPEC_FULL.md §C.5-6). The trap table
//! itself (`traps: condition -> TrapHandler`) uses `ahash::AHashMap`, the
//! same map `crates/monty/src/intern.rs` reaches for throughout.

use std::collections::VecDeque;
use std::fmt;

use ahash::AHashMap;

use crate::instruction::InstructionId;
use crate::intern::SymbolId;
use crate::value::Value;

/// One of the named Rexx conditions (`spec.md` §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionName {
    Halt,
    Novalue,
    Lostdigits,
    Notready,
    Error,
    Failure,
    Syntax,
    Nomethod,
    Nostring,
    /// Matches any condition not otherwise registered, subject to
    /// [`TrapHandler::can_handle`] (see Open Question decision in DESIGN.md).
    Any,
    User(SymbolId),
}

impl ConditionName {
    #[must_use]
    pub fn name(self, interner: &crate::intern::Interner) -> String {
        match self {
            Self::Halt => "HALT".to_owned(),
            Self::Novalue => "NOVALUE".to_owned(),
            Self::Lostdigits => "LOSTDIGITS".to_owned(),
            Self::Notready => "NOTREADY".to_owned(),
            Self::Error => "ERROR".to_owned(),
            Self::Failure => "FAILURE".to_owned(),
            Self::Syntax => "SYNTAX".to_owned(),
            Self::Nomethod => "NOMETHOD".to_owned(),
            Self::Nostring => "NOSTRING".to_owned(),
            Self::Any => "ANY".to_owned(),
            Self::User(id) => format!("USER {}", interner.get(id)),
        }
    }
}

/// CALL ON traps defer to the next clause boundary; SIGNAL ON traps unwind
/// immediately (`spec.md` §4.1, §4.3, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapKind {
    CallOn,
    SignalOn,
}

/// ENABLED traps fire; DISABLED (= DELAY) traps are re-queued until
/// explicitly undelayed (`spec.md` §3 TrapHandler.state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapState {
    Enabled,
    Disabled,
}

/// The condition directory latched at raise time (`spec.md` §4.3, §C.6).
///
/// Modeled as named fields rather than a loose string-keyed map for type
/// safety inside the core; a host that needs to hand this to the external
/// Directory class converts with [`ConditionObject::to_pairs`], which
/// reproduces the documented key set (`CONDITION`, `DESCRIPTION`, `RC`,
/// `ADDITIONAL`, `RESULT`, `PROPAGATED`, `INSTRUCTION`).
#[derive(Debug, Clone)]
pub struct ConditionObject {
    pub condition: ConditionName,
    pub description: Option<String>,
    pub rc: Option<Value>,
    pub additional: Vec<Value>,
    pub result: Option<Value>,
    /// Set when this condition arrived via INTERPRET/forwarding propagation
    /// rather than being raised directly in this activation.
    pub propagated: bool,
    /// Stamped by `trap()` with the kind of handler that caught it, so the
    /// eventual handler invocation knows whether it is a CALL or SIGNAL.
    pub instruction: Option<TrapKind>,
    /// Source line the condition was raised at, used for traceback output.
    pub line: u32,
}

impl ConditionObject {
    #[must_use]
    pub fn new(condition: ConditionName, line: u32) -> Self {
        Self {
            condition,
            description: None,
            rc: None,
            additional: Vec::new(),
            result: None,
            propagated: false,
            instruction: None,
            line,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_rc(mut self, rc: Value) -> Self {
        self.rc = Some(rc);
        self
    }

    #[must_use]
    pub fn with_additional(mut self, additional: Vec<Value>) -> Self {
        self.additional = additional;
        self
    }

    /// The documented key/value pairs, for handing off to a host Directory
    /// implementation (`spec.md` §6, §4.3).
    #[must_use]
    pub fn to_pairs(&self, interner: &crate::intern::Interner) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("CONDITION", self.condition.name(interner))];
        if let Some(desc) = &self.description {
            pairs.push(("DESCRIPTION", desc.clone()));
        }
        if let Some(rc) = &self.rc {
            pairs.push(("RC", rc.to_string()));
        }
        if !self.additional.is_empty() {
            pairs.push((
                "ADDITIONAL",
                self.additional.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            ));
        }
        if let Some(result) = &self.result {
            pairs.push(("RESULT", result.to_string()));
        }
        pairs.push(("PROPAGATED", if self.propagated { "1" } else { "0" }.to_owned()));
        if let Some(kind) = self.instruction {
            let name = match kind {
                TrapKind::CallOn => "CALL",
                TrapKind::SignalOn => "SIGNAL",
            };
            pairs.push(("INSTRUCTION", name.to_owned()));
        }
        pairs
    }
}

impl fmt::Display for ConditionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "{:?} ({desc})", self.condition),
            None => write!(f, "{:?}", self.condition),
        }
    }
}

/// A single trap table entry (`spec.md` §3 TrapHandler).
#[derive(Debug, Clone)]
pub struct TrapHandler {
    pub condition: ConditionName,
    pub kind: TrapKind,
    pub state: TrapState,
    /// The CALL or SIGNAL instruction (its target label) to invoke.
    pub handler: InstructionId,
    pub condition_object: Option<ConditionObject>,
}

impl TrapHandler {
    #[must_use]
    pub fn new(condition: ConditionName, kind: TrapKind, handler: InstructionId) -> Self {
        Self {
            condition,
            kind,
            state: TrapState::Enabled,
            handler,
            condition_object: None,
        }
    }

    /// Whether an `ANY` handler is willing to take `raised`.
    ///
    /// `spec.md` §9 leaves this underspecified ("should be derived from the
    /// Rexx language reference"). Decision (recorded in DESIGN.md): ANY
    /// never catches SYNTAX — syntax errors are serious enough that the
    /// language requires trapping them by name — but does catch every other
    /// condition, including a caller-specific USER condition.
    #[must_use]
    pub fn can_handle(&self, raised: ConditionName) -> bool {
        if self.condition != ConditionName::Any {
            return self.condition == raised;
        }
        !matches!(raised, ConditionName::Syntax)
    }
}

/// Pending CALL ON handlers awaiting the next clause boundary
/// (`spec.md` §3, §4.5).
#[derive(Debug, Clone, Default)]
pub struct ConditionQueue {
    queue: VecDeque<TrapHandler>,
}

impl ConditionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handler: TrapHandler) {
        self.queue.push_back(handler);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Drains the queue, handing each entry to `f`. Handlers still
    /// `TrapState::Disabled` are re-appended (`spec.md` §4.3 processTraps:
    /// "Handlers in DISABLED state are re-appended to the queue").
    pub fn drain_process(&mut self, mut f: impl FnMut(&TrapHandler)) {
        let pending: Vec<_> = self.queue.drain(..).collect();
        for handler in pending {
            if handler.state == TrapState::Disabled {
                self.queue.push_back(handler);
            } else {
                f(&handler);
            }
        }
    }

    pub fn merge_from(&mut self, mut other: Self) {
        self.queue.append(&mut other.queue);
    }
}

/// Per-activation trap table (`condition -> TrapHandler`), `spec.md` §3
/// Settings.traps.
#[derive(Debug, Clone, Default)]
pub struct TrapTable {
    traps: AHashMap<ConditionName, TrapHandler>,
}

impl TrapTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, handler: TrapHandler) {
        self.traps.insert(handler.condition, handler);
    }

    pub fn remove(&mut self, condition: ConditionName) -> Option<TrapHandler> {
        self.traps.remove(&condition)
    }

    #[must_use]
    pub fn get(&self, condition: ConditionName) -> Option<&TrapHandler> {
        self.traps.get(&condition)
    }

    pub fn get_mut(&mut self, condition: ConditionName) -> Option<&mut TrapHandler> {
        self.traps.get_mut(&condition)
    }

    #[must_use]
    pub fn any_handler(&self) -> Option<&TrapHandler> {
        self.traps.get(&ConditionName::Any)
    }

    /// `spec.md` §8 trap-state invariant: `trapState(C) ∈ {"ON","DELAY"}`.
    #[must_use]
    pub fn state(&self, condition: ConditionName) -> Option<&'static str> {
        self.traps.get(&condition).map(|handler| match handler.state {
            TrapState::Enabled => "ON",
            TrapState::Disabled => "DELAY",
        })
    }

    /// `spec.md` §8: "NOVALUE novalue-on bit is set iff any enabled trap's
    /// condition is in {NOVALUE, ANY}".
    #[must_use]
    pub fn novalue_armed(&self) -> bool {
        [ConditionName::Novalue, ConditionName::Any]
            .into_iter()
            .filter_map(|c| self.traps.get(&c))
            .any(|handler| handler.state == TrapState::Enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(condition: ConditionName, kind: TrapKind) -> TrapHandler {
        TrapHandler::new(condition, kind, InstructionId::new(0))
    }

    #[test]
    fn any_handler_never_catches_syntax() {
        let any = handler(ConditionName::Any, TrapKind::CallOn);
        assert!(!any.can_handle(ConditionName::Syntax));
        assert!(any.can_handle(ConditionName::Notready));
        assert!(any.can_handle(ConditionName::Error));
    }

    #[test]
    fn disabled_handlers_are_requeued() {
        let mut queue = ConditionQueue::new();
        let mut h = handler(ConditionName::Error, TrapKind::CallOn);
        h.state = TrapState::Disabled;
        queue.push(h);
        let mut fired = 0;
        queue.drain_process(|_| fired += 1);
        assert_eq!(fired, 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn novalue_armed_by_any_trap() {
        let mut traps = TrapTable::new();
        assert!(!traps.novalue_armed());
        traps.set(handler(ConditionName::Any, TrapKind::CallOn));
        assert!(traps.novalue_armed());
    }
}
