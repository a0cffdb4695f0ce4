//! `rexx_core` — the execution core of a Rexx interpreter: the
//! activation/stack-frame object, its instruction dispatch loop, the
//! condition trap/signal system, block-structured loop state, variable
//! scoping (PROCEDURE/EXPOSE/GUARD) and the TRACE subsystem.
//!
//! Source compilation (lexing/parsing), the garbage collector, and the
//! built-in class library (String/Array/Stem/Directory method bodies)
//! are all out of scope: this crate runs an already-built
//! [`instruction::Program`], treating values it cannot interpret itself
//! as opaque handles (see [`value::Value::External`]).

pub mod activation;
pub mod activity;
pub mod condition;
pub mod do_block;
pub mod error;
pub mod evaluation_stack;
pub mod instruction;
pub mod intern;
pub mod object_scope;
pub mod package;
pub mod random;
pub mod resource;
pub mod settings;
pub mod trace;
pub mod value;
pub mod variable_frame;

pub use activation::{Activation, ActivationId, Context, State};
pub use condition::{ConditionName, ConditionObject, TrapHandler, TrapKind, TrapState};
pub use error::{RunError, SyntaxError, Unwind};
pub use instruction::{Instruction, InstructionId, InstructionKind, Operand, Program};
pub use package::Package;
pub use value::Value;

/// The top-level API surface: runs a [`Package`] on a fresh
/// [`activity::LocalActivity`] from its first instruction, the same role
/// `crates/monty/src/lib.rs`'s own `Executor` plays over a `Namespace`.
pub struct Executor {
    limits: resource::ResourceLimits,
}

impl Executor {
    #[must_use]
    pub fn new() -> Self {
        Self { limits: resource::ResourceLimits::unlimited() }
    }

    #[must_use]
    pub fn with_limits(limits: resource::ResourceLimits) -> Self {
        Self { limits }
    }

    /// Runs `package` to completion, sending TRACE/SAY output to `sink`.
    ///
    /// # Errors
    /// Propagates any [`RunError`] the top-level activation produces —
    /// in particular an unhandled condition that reached the end of the
    /// call stack.
    pub fn run(&self, package: &Package, sink: &mut dyn trace::TraceSink) -> Result<Value, RunError> {
        let mut activity = activity::LocalActivity::new();
        let id = activity.allocate_activation_id();
        let mut interner = intern::InternerBuilder::new();
        let rc_symbol = interner.intern("RC");
        let mut activation = Activation::new(
            id,
            Context::Program,
            package.initial_settings(),
            variable_frame::VariableFrame::new(),
            InstructionId::new(0),
            &self.limits,
            rc_symbol,
        );
        activation.run(&package.program, &mut activity, sink)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::CollectingSink;

    #[test]
    fn executor_runs_an_empty_program_to_undefined() {
        let mut program = Program::new();
        program.push(Instruction::new(InstructionKind::Return { value: None }, 1));
        let package = Package::new("EMPTY", program);
        let executor = Executor::new();
        let mut sink = CollectingSink::default();
        let result = executor.run(&package, &mut sink).unwrap();
        assert_eq!(result, Value::Undefined);
    }
}
