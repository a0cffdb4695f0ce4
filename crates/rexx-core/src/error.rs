//! Error and unwind plumbing for the execution core.
//!
//! `spec.md` §4.1/§9 describes a "sentinel carrying a pointer to its target
//! activation" thrown by a faulting instruction and caught by every
//! enclosing activation until it reaches the target, with the rule that
//! only the target activation ever consumes the sentinel. `src/run.rs`
//! and `crates/monty/src/namespace.rs` use Rust's `Result` + `?`
//! throughout instead of panics/exceptions for this kind of propagation
//! (`RunResult<'c, T>`), and [`Unwind`] follows the same shape.

use thiserror::Error;

use crate::activation::ActivationId;
use crate::condition::ConditionObject;

/// A numbered Rexx syntax error (`spec.md` §7, "Syntax errors (numbered)").
///
/// Real Rexx has several hundred numbered conditions; only the handful the
/// execution core itself raises are named here. A host embedding this crate
/// for a full interpreter would extend this with its own numbering scheme
/// for parser- and library-raised errors, which is out of scope (§1
/// Non-goals: source compilation, class-library methods).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("Program interrupted")]
    ProgramInterrupted,
    #[error("control stack full")]
    ControlStackFull,
    #[error("REPLY already issued")]
    ReplyAlready,
    #[error("RETURN/EXIT with an expression is invalid after REPLY")]
    ReplyReturn,
    #[error("invalid LEAVE/ITERATE, name does not match an active loop")]
    InvalidLeaveIterateName,
    #[error("invalid LEAVE/ITERATE, no active loop")]
    InvalidLeaveIterate,
    #[error("PROCEDURE is only valid as the first instruction of an internal routine")]
    InvalidProcedure,
    #[error("EXPOSE is only valid as the first instruction of a method")]
    InvalidExpose,
    #[error("variable is not an object variable and cannot be exposed")]
    InvalidExposeTarget,
    #[error("TRACE is invalid while not in a debug pause")]
    InvalidTraceDebug,
    #[error("this activation has no object scope to guard")]
    InvalidGuard,
}

/// The fatal-unwind sentinel. Produced by [`crate::activation::Activation::raise`]
/// and propagated with `?` through every instruction `execute` call until it
/// reaches `target`. Every intermediate `Activation::run` loop catches it,
/// runs its own clause-boundary/cleanup work, and rethrows if it is not the
/// target (§4.1 "Error unwinding").
#[derive(Debug, Clone)]
pub struct Unwind {
    pub target: ActivationId,
    pub condition: ConditionObject,
}

/// Top level error type returned by [`crate::activation::Activation::run`].
#[derive(Debug, Error)]
pub enum RunError {
    /// An unwind that was never caught by its target (the target activation
    /// already popped off the stack — a host/engine bug, not a Rexx-level
    /// condition).
    #[error("unwind target activation {0:?} is no longer on the stack")]
    OrphanedUnwind(ActivationId),
    /// A condition reached the top-level activity without being trapped.
    #[error("unhandled condition {condition}")]
    Unhandled { condition: ConditionObject },
}
