//! Block-structured loop state (`spec.md` §3 DoBlock, §4.4 loop control).
//!
//! Field names and shapes are grounded on ooRexx's
//! `original_source/interpreter/instructions/DoBlock.hpp`. That header
//! stores the loop control variable, the TO bound, the BY increment, a
//! FOR count, a comparison selector and an indent snapshot, threaded as a
//! singly linked list via a `previous` pointer. Here the linked list
//! becomes a plain `Vec<DoBlock>` stack owned by the activation
//! (`spec.md` §3 Activation.doBlockStack), so no `previous` field is
//! needed — LEAVE/ITERATE walk the `Vec` from the end instead of
//! following pointers.
//!
//! Note: the original header actually misspells the FOR-count setter as
//! `setForVount` — a copy/paste artifact of no semantic significance,
//! mentioned here only because it is how the field was confirmed to exist
//! at all in the absence of the matching `.cpp`.

use crate::instruction::{InstructionId, Operand};
use crate::intern::SymbolId;
use crate::value::Value;

/// Which direction the TO bound is tested in, chosen from the sign of BY
/// at loop entry (`spec.md` §4.4: "a positive BY tests control <= to; a
/// negative BY tests control >= to").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundCompare {
    LessEqual,
    GreaterEqual,
}

impl BoundCompare {
    #[must_use]
    pub fn from_by(by: i64) -> Self {
        if by < 0 { Self::GreaterEqual } else { Self::LessEqual }
    }

    #[must_use]
    pub fn test(self, control: i64, to: i64) -> bool {
        match self {
            Self::LessEqual => control <= to,
            Self::GreaterEqual => control >= to,
        }
    }
}

/// One entry on the activation's loop-state stack.
///
/// A `DoBlock` is pushed when a `DO`/loop instruction starts and popped
/// when its body completes normally, via LEAVE, or via unwind past it.
/// Every field is optional except `start`/`end`/`indent` because a DO
/// block can be a bare `DO...END` (none set), `DO FOREVER`, `DO WHILE`/
/// `DO UNTIL` (handled by re-evaluating the instruction, not stored
/// here), or a repetitive `DO control = from TO to BY by [FOR n]`.
#[derive(Debug, Clone)]
pub struct DoBlock {
    pub label: Option<SymbolId>,
    pub repeat: LoopRepeat,
    pub control: Option<SymbolId>,
    pub to: Option<i64>,
    pub by: i64,
    pub for_count: Option<i64>,
    pub compare: BoundCompare,
    /// `DO WHILE`/`DO UNTIL`'s guard, re-evaluated once per iteration.
    /// `negate` is true for UNTIL (loop continues while false).
    pub condition: Option<(Operand, bool)>,
    /// TRACE indent level in effect when this block was entered; restored
    /// on LEAVE/normal exit so trace output un-indents correctly.
    pub indent: u32,
    /// First instruction of the loop body, the ITERATE target.
    pub start: InstructionId,
    /// Instruction immediately following `END`, the LEAVE target.
    pub end: InstructionId,
}

/// How a `DoEnd` decides whether to loop back to `start` or fall through
/// past `end` (`spec.md` §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopRepeat {
    /// A bare `DO ... END`: the body runs exactly once.
    Once,
    Forever,
    /// `DO WHILE`/`DO UNTIL`: re-evaluate `condition` each iteration.
    Conditional,
    /// `DO control = from TO to BY by [FOR n]`: advance via
    /// [`DoBlock::advance`].
    Counted,
}

impl DoBlock {
    #[must_use]
    pub fn once(start: InstructionId, end: InstructionId, indent: u32) -> Self {
        Self {
            label: None,
            repeat: LoopRepeat::Once,
            control: None,
            to: None,
            by: 1,
            for_count: None,
            compare: BoundCompare::LessEqual,
            condition: None,
            indent,
            start,
            end,
        }
    }

    #[must_use]
    pub fn forever(start: InstructionId, end: InstructionId, indent: u32) -> Self {
        Self { repeat: LoopRepeat::Forever, ..Self::once(start, end, indent) }
    }

    #[must_use]
    pub fn conditional(condition: Operand, negate: bool, start: InstructionId, end: InstructionId, indent: u32) -> Self {
        Self {
            repeat: LoopRepeat::Conditional,
            condition: Some((condition, negate)),
            ..Self::once(start, end, indent)
        }
    }

    #[must_use]
    pub fn repetitive(
        control: SymbolId,
        from: i64,
        to: Option<i64>,
        by: i64,
        for_count: Option<i64>,
        start: InstructionId,
        end: InstructionId,
        indent: u32,
    ) -> Self {
        let _ = from;
        Self {
            label: None,
            repeat: LoopRepeat::Counted,
            control: Some(control),
            to,
            by,
            for_count,
            compare: BoundCompare::from_by(by),
            condition: None,
            indent,
            start,
            end,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: SymbolId) -> Self {
        self.label = Some(label);
        self
    }

    /// Advances the loop control variable and FOR counter, returning the
    /// next control value if the loop should continue for another
    /// iteration (`spec.md` §4.4).
    pub fn advance(&mut self, current: i64) -> Option<i64> {
        if let Some(remaining) = self.for_count.as_mut() {
            if *remaining <= 0 {
                return None;
            }
            *remaining -= 1;
        }
        let next = current + self.by;
        match self.to {
            Some(to) if !self.compare.test(next, to) => None,
            _ => Some(next),
        }
    }

    #[must_use]
    pub fn matches_name(&self, label: SymbolId) -> bool {
        self.label == Some(label)
    }

    #[must_use]
    pub fn as_value(value: i64) -> Value {
        Value::Integer(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iid(n: u32) -> InstructionId {
        InstructionId::new(n)
    }

    #[test]
    fn ascending_loop_stops_past_to() {
        let mut block = DoBlock::repetitive(
            crate::intern::MAIN_SYMBOL_ID,
            1,
            Some(3),
            1,
            None,
            iid(0),
            iid(1),
            0,
        );
        assert_eq!(block.advance(1), Some(2));
        assert_eq!(block.advance(2), Some(3));
        assert_eq!(block.advance(3), None);
    }

    #[test]
    fn descending_loop_uses_greater_equal() {
        let mut block =
            DoBlock::repetitive(crate::intern::MAIN_SYMBOL_ID, 3, Some(1), -1, None, iid(0), iid(1), 0);
        assert_eq!(block.advance(3), Some(2));
        assert_eq!(block.advance(2), Some(1));
        assert_eq!(block.advance(1), None);
    }

    #[test]
    fn for_count_bounds_iteration_regardless_of_to() {
        let mut block =
            DoBlock::repetitive(crate::intern::MAIN_SYMBOL_ID, 1, None, 1, Some(2), iid(0), iid(1), 0);
        assert_eq!(block.advance(1), Some(2));
        assert_eq!(block.advance(2), None);
    }
}
