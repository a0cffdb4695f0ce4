//! Per-activation settings: the authoritative flag bit set, NUMERIC
//! environment, current ADDRESS and trap table (`spec.md` §3 Settings,
//! §4.1 "authoritative list of flag bits").
//!
//! The flag set uses `bitflags`, justified by the sibling example repo
//! `examples/isgasho-rd`'s Cargo.toml dependency on the same crate for an
//! analogous "many independent boolean bits on one record" struct, rather
//! than hand-rolling `u32` shifts.

use bitflags::bitflags;

use crate::condition::TrapTable;
use crate::trace::TraceSetting;

bitflags! {
    /// `spec.md` §4.1's authoritative flag list. Settings propagate by
    /// value from a caller to INTERPRET/internal-call children and are
    /// then independently mutable (`spec.md` §4.1 "settings are copied,
    /// not shared, at every new activation except where noted").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ActivationFlags: u32 {
        /// REPLY has already been issued on this activation; a second
        /// REPLY, or a RETURN/EXIT with an expression, is a syntax error.
        const REPLY_ISSUED = 1 << 0;
        /// Currently stopped at an interactive TRACE `?` pause.
        const DEBUG_PAUSE = 1 << 1;
        /// Set for the duration of clause-boundary processing, so a
        /// condition raised while processing CALL ON traps does not
        /// recursively reprocess the queue.
        const CLAUSE_BOUNDARY = 1 << 2;
        /// PROCEDURE has already run; a second one is a syntax error.
        const PROCEDURE_ISSUED = 1 << 3;
        /// This activation only forwards conditions to its caller and is
        /// skipped when `trap()` walks the chain looking for a live
        /// Rexx frame to deliver to (SPEC_FULL.md §C.1).
        const FORWARDED = 1 << 4;
        /// A HALT condition is queued but not yet delivered.
        const HALT_PENDING = 1 << 5;
        /// TRACE output is suppressed regardless of `trace.setting`
        /// (used while replaying a SIGNAL target's own TRACE OFF).
        const TRACE_SUPPRESSED = 1 << 6;
    }
}

impl Default for ActivationFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// NUMERIC DIGITS/FUZZ/FORM (`spec.md` §6 external interface). Arbitrary
/// precision decimal arithmetic itself is out of scope (no class-library
/// semantics); these three fields exist because TRACE and the condition
/// system both need to report/restore them verbatim across a debug pause
/// or INTERPRET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericSettings {
    pub digits: u32,
    pub fuzz: u32,
    pub form_engineering: bool,
}

impl Default for NumericSettings {
    fn default() -> Self {
        Self { digits: 9, fuzz: 0, form_engineering: false }
    }
}

/// Everything about an activation's execution environment that is
/// settings-scoped rather than stack-scoped (`spec.md` §3 Settings).
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub flags: ActivationFlags,
    pub numeric: NumericSettings,
    pub trace: TraceSetting,
    pub traps: TrapTable,
    /// The current ADDRESS environment name, e.g. `"SYSTEM"`.
    pub address: Option<String>,
    /// Line of the most recently executed SIGNAL, visible to Rexx code
    /// as the `SIGL` variable (SPEC_FULL.md §C.7).
    pub sigl: u32,
}

impl Settings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings inherited by a child activation (internal CALL, method
    /// invocation or INTERPRET): same numeric/trace/trap configuration,
    /// but with activation-local flags cleared.
    #[must_use]
    pub fn inherit(&self) -> Self {
        Self {
            flags: ActivationFlags::empty(),
            numeric: self.numeric,
            trace: self.trace,
            traps: self.traps.clone(),
            address: self.address.clone(),
            sigl: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inherit_resets_flags_but_keeps_trace() {
        let mut parent = Settings::new();
        parent.flags |= ActivationFlags::REPLY_ISSUED;
        parent.trace = TraceSetting::new(crate::trace::TraceOption::All);

        let child = parent.inherit();
        assert!(!child.flags.contains(ActivationFlags::REPLY_ISSUED));
        assert_eq!(child.trace.option, crate::trace::TraceOption::All);
    }
}
