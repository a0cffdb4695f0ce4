//! The instruction tree the execution core dispatches over (`spec.md` §6).
//!
//! `spec.md` §1 puts source compilation out of scope: "lexing, parsing ...
//! remain out of scope." What the core *does* own is the contract an
//! already-parsed instruction tree must satisfy to be run: an `execute`
//! dispatch, a position (for TRACE and traceback), a `kind` tag, and a
//! label directory used by SIGNAL. This is grounded on the same flat-
//! arena-addressed-by-small-id dispatch style `crates/monty/src/
//! namespace.rs`'s `NamespaceId`/`Namespaces` pair uses for its own
//! stack-of-scopes arena.
//!
//! Because there is no expression evaluator in scope, operands are plain
//! [`crate::value::Value`] literals or variable reads; a host that adds a
//! real expression compiler on top of this crate would replace
//! [`Operand`] with its own expression-tree id without touching the rest
//! of the dispatch loop.

use ahash::AHashMap;

use crate::condition::ConditionName;
use crate::intern::SymbolId;
use crate::value::Value;

/// Index into a [`Program`]'s instruction arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstructionId(u32);

impl InstructionId {
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Something an instruction reads: a literal or a variable's current
/// value.
#[derive(Debug, Clone)]
pub enum Operand {
    Literal(Value),
    Variable(SymbolId),
}

/// The static shape of a loop-start instruction, consumed by
/// [`crate::activation::Activation`] to construct a runtime
/// [`crate::do_block::DoBlock`] (`spec.md` §4.4).
#[derive(Debug, Clone)]
pub enum LoopSpec {
    Forever,
    /// `DO WHILE cond` / `DO UNTIL cond`; `negate` is true for UNTIL
    /// (loop continues while the condition is false).
    Conditional { condition: Operand, negate: bool },
    Repetitive {
        control: SymbolId,
        from: Operand,
        to: Option<Operand>,
        by: Option<Operand>,
        for_count: Option<Operand>,
    },
}

/// One node of the instruction tree. `spec.md` §6 requires only that the
/// core be able to `execute` a node, read its source position, read a
/// `kind` tag, and resolve labels — the variant list below is the
/// smallest set of clause kinds needed to exercise every module named in
/// §2 (conditions, loops, scoping, TRACE) without reaching into
/// class-library or expression-evaluator territory.
#[derive(Debug, Clone)]
pub enum InstructionKind {
    Nop,
    Assign { target: SymbolId, value: Operand },
    Say { value: Operand },
    Trace { setting: crate::trace::TraceSetting },
    If { condition: Operand, then_branch: InstructionId, else_branch: Option<InstructionId> },
    DoStart { spec: LoopSpec, body_end: InstructionId },
    DoEnd { start: InstructionId },
    Leave { label: Option<SymbolId> },
    Iterate { label: Option<SymbolId> },
    CallInternal { target: InstructionId },
    CallOn { condition: ConditionName, target: InstructionId },
    SignalOn { condition: ConditionName, target: InstructionId },
    TrapOff { condition: ConditionName },
    SignalLabel { label: SymbolId },
    Raise { condition: ConditionName, description: Option<Operand>, additional: Vec<Operand>, propagate: bool },
    Procedure { expose: Vec<SymbolId> },
    Expose { names: Vec<SymbolId> },
    Guard { on: bool, condition: Option<Operand> },
    Reply { value: Option<Operand> },
    Return { value: Option<Operand> },
    Exit { value: Option<Operand> },
    /// Marks the end of the instruction stream; `Activation::run` stops
    /// when it reaches this rather than indexing out of bounds.
    EndOfProgram,
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub line: u32,
    pub label: Option<SymbolId>,
}

impl Instruction {
    #[must_use]
    pub fn new(kind: InstructionKind, line: u32) -> Self {
        Self { kind, line, label: None }
    }

    #[must_use]
    pub fn with_label(mut self, label: SymbolId) -> Self {
        self.label = Some(label);
        self
    }
}

/// A flat instruction arena plus its label directory (`spec.md` §6
/// "label directory"). Built once by a host/compiler and shared
/// read-only across every activation that runs it (internal routine
/// calls and INTERPRET reuse the same arena with a different entry
/// point).
#[derive(Debug, Clone, Default)]
pub struct Program {
    instructions: Vec<Instruction>,
    labels: AHashMap<SymbolId, InstructionId>,
}

impl Program {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: Instruction) -> InstructionId {
        let id = InstructionId::new(u32::try_from(self.instructions.len()).expect("program too large"));
        if let Some(label) = instruction.label {
            self.labels.insert(label, id);
        }
        self.instructions.push(instruction);
        id
    }

    #[must_use]
    pub fn get(&self, id: InstructionId) -> &Instruction {
        &self.instructions[id.index()]
    }

    #[must_use]
    pub fn label(&self, name: SymbolId) -> Option<InstructionId> {
        self.labels.get(&name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The sentinel id past the final real instruction, used to detect
    /// falling off the end of the program.
    #[must_use]
    pub fn end(&self) -> InstructionId {
        InstructionId::new(u32::try_from(self.instructions.len()).expect("program too large"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_resolve_to_their_instruction() {
        let mut program = Program::new();
        let label = crate::intern::MAIN_SYMBOL_ID;
        let id = program.push(Instruction::new(InstructionKind::Nop, 1).with_label(label));
        assert_eq!(program.label(label), Some(id));
    }
}
