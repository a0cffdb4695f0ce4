//! The execution core's centerpiece: the activation/stack-frame object
//! and its instruction dispatch loop (`spec.md` §3 Activation, §4.1-§4.5).
//!
//! This is where every other module meets: [`crate::variable_frame`] for
//! scoping, [`crate::condition`] for traps, [`crate::do_block`] for loop
//! state, [`crate::trace`] for TRACE output, [`crate::object_scope`] for
//! GUARD, [`crate::evaluation_stack`] for operand storage, and
//! [`crate::activity`] for the host thread boundary. The run loop and its
//! REPLY/condition/loop-control handling follow
//! `original_source/interpreter/execution/RexxActivation.cpp`'s shape
//! (`run`, `processTraps`, `trap`, `reply`, `returnFrom`, `iterate`,
//! `leaveLoop`) translated into `Result`-propagated control flow per
//! SPEC_FULL.md §C and the DESIGN NOTES, rather than C++'s throw/catch.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::activity::ActivityRuntime;
use crate::condition::{ConditionName, ConditionObject, ConditionQueue, TrapHandler, TrapKind, TrapState};
use crate::do_block::{DoBlock, LoopRepeat};
use crate::error::{RunError, SyntaxError, Unwind};
use crate::evaluation_stack::EvaluationStack;
use crate::instruction::{Instruction, InstructionId, InstructionKind, LoopSpec, Operand, Program};
use crate::intern::SymbolId;
use crate::object_scope::ObjectScopeLock;
use crate::resource::ResourceLimits;
use crate::settings::Settings;
use crate::trace::TraceSink;
use crate::value::{ExternalId, Value};
use crate::variable_frame::VariableFrame;

/// Identifies one activation uniquely within its host. Allocated by
/// [`crate::activity::ActivityRuntime::allocate_activation_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivationId(u64);

impl ActivationId {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// What kind of clause sequence this activation is running
/// (`spec.md` §3 Activation.context).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    MethodCall,
    Program,
    Routine,
    InternalCall,
    Interpret,
    DebugPause,
}

/// `spec.md` §3 Activation.state / §8 "State machine" invariant:
/// ACTIVE -> REPLIED -> RETURNED, REPLIED only reachable from ACTIVE, and
/// RETURNED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Active,
    Replied,
    Returned,
}

/// How one instruction's execution affects the dispatch loop.
enum Flow {
    Continue,
    Jump(InstructionId),
    Return(Option<Value>),
    Reply(Option<Value>),
}

/// The stack-frame object (`spec.md` §3 Activation). Owns everything
/// scoped to one call: its variables, its operand stack, its loop state,
/// its trap table and pending-condition queue, and (for GUARDed methods)
/// a reference to the object's scope lock.
pub struct Activation {
    pub id: ActivationId,
    pub context: Context,
    pub state: State,
    pub receiver: Option<ExternalId>,
    pub scope_lock: Option<Rc<RefCell<ObjectScopeLock>>>,
    /// The receiver's object-variable dictionary, shared across every
    /// activation method-called on the same object (`spec.md` §4.1
    /// "resolves the object-variable dictionary for the scope").
    object_variables: Option<Rc<RefCell<VariableFrame>>>,
    pub parent: Option<ActivationId>,
    pub current: InstructionId,
    pub settings: Settings,
    pub evaluation_stack: EvaluationStack,
    pub variable_frame: VariableFrame,
    pub do_blocks: Vec<DoBlock>,
    pub conditions: ConditionQueue,
    reply_value: Option<Value>,
    rc_symbol: SymbolId,
}

impl Activation {
    #[must_use]
    pub fn new(
        id: ActivationId,
        context: Context,
        settings: Settings,
        variable_frame: VariableFrame,
        start: InstructionId,
        limits: &ResourceLimits,
        rc_symbol: SymbolId,
    ) -> Self {
        Self {
            id,
            context,
            state: State::Active,
            receiver: None,
            scope_lock: None,
            object_variables: None,
            parent: None,
            current: start,
            settings,
            evaluation_stack: EvaluationStack::new(limits),
            variable_frame,
            do_blocks: Vec::new(),
            conditions: ConditionQueue::new(),
            reply_value: None,
            rc_symbol,
        }
    }

    /// Builds the activation for an internal `CALL label`: shares the
    /// caller's variable frame outright (`spec.md` §4.4 default scoping)
    /// unless/until its own `PROCEDURE` instruction swaps a fresh one in.
    #[must_use]
    pub fn internal_call(id: ActivationId, caller: &Self, start: InstructionId, limits: &ResourceLimits) -> Self {
        let mut activation = Self::new(
            id,
            Context::InternalCall,
            caller.settings.inherit(),
            caller.variable_frame.clone(),
            start,
            limits,
            caller.rc_symbol,
        );
        activation.parent = Some(caller.id);
        activation
    }

    /// Builds the activation for a GUARDed method call: a fresh variable
    /// pool (object instance variables arrive only via EXPOSE), a shared
    /// handle to the receiver's scope lock, and a shared handle to the
    /// receiver's object-variable dictionary — the same dictionary every
    /// other activation method-called on this receiver aliases into via
    /// `EXPOSE` (`spec.md` §4.1, §4.4).
    #[must_use]
    pub fn method_call(
        id: ActivationId,
        receiver: ExternalId,
        scope_lock: Rc<RefCell<ObjectScopeLock>>,
        object_variables: Rc<RefCell<VariableFrame>>,
        settings: Settings,
        start: InstructionId,
        limits: &ResourceLimits,
        rc_symbol: SymbolId,
    ) -> Self {
        let mut activation = Self::new(id, Context::MethodCall, settings, VariableFrame::new(), start, limits, rc_symbol);
        activation.receiver = Some(receiver);
        activation.scope_lock = Some(scope_lock);
        activation.object_variables = Some(object_variables);
        activation
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    fn resolve(&self, operand: &Operand) -> Value {
        match operand {
            Operand::Literal(value) => value.clone(),
            Operand::Variable(name) => self.variable_frame.get(*name).unwrap_or(Value::Undefined),
        }
    }

    fn resolve_int(&self, operand: &Operand) -> i64 {
        match self.resolve(operand) {
            Value::Integer(i) => i,
            _ => 0,
        }
    }

    fn resolve_bool(&self, operand: &Operand) -> bool {
        self.resolve(operand).truthy().unwrap_or(false)
    }

    /// Raises `condition`, building the fatal-unwind sentinel that
    /// propagates via `?` until it reaches `target` (`spec.md` §4.1,
    /// §9). `propagate` models `RAISE ... RETURN`: the condition is
    /// handed to the *caller's* trap table rather than handled here
    /// (SPEC_FULL.md §C.5).
    #[must_use]
    pub fn raise(&self, condition: ConditionObject, target: ActivationId) -> Unwind {
        Unwind { target, condition }
    }

    /// SPEC_FULL.md §C.1: while `FORWARDED` is set, `trap` is delegated
    /// straight to the parent rather than consulting this activation's
    /// own (irrelevant) trap table.
    #[must_use]
    pub fn forwarded(&self) -> bool {
        self.settings.flags.contains(crate::settings::ActivationFlags::FORWARDED)
    }

    /// Looks up a handler for `condition` in this activation's trap
    /// table (`spec.md` §4.3 `trap()`), falling back to the `ANY` entry.
    #[must_use]
    pub fn find_trap(&self, condition: ConditionName) -> Option<&TrapHandler> {
        self.settings.traps.get(condition).or_else(|| {
            self.settings
                .traps
                .any_handler()
                .filter(|handler| handler.can_handle(condition))
        })
    }

    /// Registers a `CALL ON`/`SIGNAL ON` trap.
    pub fn enable_trap(&mut self, condition: ConditionName, kind: TrapKind, target: InstructionId) {
        self.settings.traps.set(TrapHandler::new(condition, kind, target));
    }

    pub fn disable_trap(&mut self, condition: ConditionName) {
        if let Some(handler) = self.settings.traps.get_mut(condition) {
            handler.state = TrapState::Disabled;
        }
    }

    /// `spec.md` §4.3 processTraps: copy `RC` into the local `RC`
    /// variable *before* dispatching (SPEC_FULL.md §C.3), then queue the
    /// CALL ON handler to run at the next clause boundary, or jump
    /// immediately for SIGNAL ON.
    fn dispatch_trap(&mut self, handler: TrapHandler, condition: ConditionObject, rc_symbol: SymbolId) -> Option<InstructionId> {
        if let Some(rc) = &condition.rc {
            self.variable_frame.set(rc_symbol, rc.clone());
        }
        match handler.kind {
            TrapKind::CallOn => {
                self.conditions.push(TrapHandler { condition_object: Some(condition), ..handler });
                None
            }
            TrapKind::SignalOn => Some(handler.handler),
        }
    }

    /// Runs this activation to completion (`spec.md` §4.1).
    ///
    /// # Errors
    /// Returns an [`Unwind`] if a condition reaches this activation's
    /// caller without being handled here, or a [`RunError`] if the
    /// unwind's target has already left the call stack.
    pub fn run(
        &mut self,
        program: &Program,
        activity: &mut dyn ActivityRuntime,
        sink: &mut dyn TraceSink,
    ) -> Result<Value, RunError> {
        loop {
            if self.current == program.end() {
                break;
            }
            let instruction = program.get(self.current).clone();
            trace!(line = instruction.line, "executing clause");
            if !self.settings.flags.contains(crate::settings::ActivationFlags::TRACE_SUPPRESSED) {
                let mut formatter = crate::trace::TraceFormatter::new(self.settings.trace);
                formatter.set_indent(self.do_blocks.len() as u32);
                formatter.trace_clause(sink, instruction.line, "");
            }

            let outcome = self.execute_one(&instruction, program, activity, sink);
            match outcome {
                Ok(Flow::Continue) => {
                    self.current = self.current.next();
                }
                Ok(Flow::Jump(target)) => {
                    self.current = target;
                }
                Ok(Flow::Return(value)) => {
                    self.state = State::Returned;
                    return Ok(value.unwrap_or(Value::Undefined));
                }
                Ok(Flow::Reply(value)) => {
                    self.reply_value = value;
                    self.state = State::Replied;
                    self.settings.flags.insert(crate::settings::ActivationFlags::REPLY_ISSUED);
                    self.current = self.current.next();
                }
                Err(unwind) => self.handle_unwind(unwind, activity)?,
            }

            self.process_clause_boundary(program, activity, sink)?;
        }

        match self.state {
            State::Returned => Ok(Value::Undefined),
            _ => Ok(self.reply_value.clone().unwrap_or(Value::Undefined)),
        }
    }

    /// Looks up a trap for `unwind.condition` and either jumps this
    /// activation to a `SIGNAL ON` target (unwinding enclosing DO blocks,
    /// since that jump never returns to the raising clause) or queues a
    /// `CALL ON` handler for dispatch at the next clause boundary. Returns
    /// the unhandled-condition error this activation's caller should see
    /// when no trap matches.
    fn handle_unwind(&mut self, unwind: Unwind, activity: &mut dyn ActivityRuntime) -> Result<(), RunError> {
        if unwind.target != self.id {
            return Err(RunError::OrphanedUnwind(unwind.target));
        }
        activity.call_halt_clear_exit();
        match self.find_trap(unwind.condition.condition) {
            Some(handler) => {
                let handler = handler.clone();
                let rc_symbol = self.rc_symbol;
                let line = unwind.condition.line;
                if let Some(target) = self.dispatch_trap(handler, unwind.condition, rc_symbol) {
                    self.settings.sigl = line;
                    self.unwind_do_blocks_past(target);
                    self.current = target;
                } else {
                    self.current = self.current.next();
                }
                Ok(())
            }
            // Nobody traps it here: the caller (this run's caller, one
            // frame up the host's call stack) gets a chance via the
            // Err(RunError::Unhandled) this returns, re-raised as a fresh
            // Unwind targeting its own activation (`spec.md` §4.1 "error
            // unwinding" walks the chain one frame at a time).
            None => Err(RunError::Unhandled { condition: unwind.condition }),
        }
    }

    /// `spec.md` §4.5: after each clause, dispatch the first CALL ON
    /// handler whose condition fired since the last boundary. Unlike
    /// `SIGNAL ON` (a permanent jump that never returns to the raising
    /// clause), `CALL ON` is an actual call: it runs the handler as an
    /// internal-call activation to completion and resumes the interrupted
    /// clause sequence at `self.current` unchanged — "the actual call
    /// happens in `processTraps`"
    /// (`original_source/interpreter/execution/RexxActivation.cpp`), the
    /// same call-and-resume shape as `call_internal`'s handling of `CALL
    /// label`. Do blocks are left untouched: the handler doesn't jump this
    /// activation anywhere, it just runs alongside it.
    fn process_clause_boundary(
        &mut self,
        program: &Program,
        activity: &mut dyn ActivityRuntime,
        sink: &mut dyn TraceSink,
    ) -> Result<(), RunError> {
        self.settings.flags.insert(crate::settings::ActivationFlags::CLAUSE_BOUNDARY);
        let mut dispatch = None;
        self.conditions.drain_process(|handler| {
            debug!(condition = ?handler.condition, "processing queued trap");
            let line = handler.condition_object.as_ref().map_or(0, |c| c.line);
            dispatch = Some((handler.handler, line));
        });
        let result = if let Some((target, line)) = dispatch {
            self.settings.sigl = line;
            match self.call_internal(target, program, activity, sink) {
                Ok(_flow) => Ok(()),
                Err(unwind) => self.handle_unwind(unwind, activity),
            }
        } else {
            Ok(())
        };
        self.settings.flags.remove(crate::settings::ActivationFlags::CLAUSE_BOUNDARY);
        result
    }

    fn execute_one(
        &mut self,
        instruction: &Instruction,
        program: &Program,
        activity: &mut dyn ActivityRuntime,
        sink: &mut dyn TraceSink,
    ) -> Result<Flow, Unwind> {
        match &instruction.kind {
            InstructionKind::Nop | InstructionKind::EndOfProgram => Ok(Flow::Continue),
            InstructionKind::Assign { target, value } => {
                let value = self.resolve(value);
                self.variable_frame.set(*target, value);
                Ok(Flow::Continue)
            }
            InstructionKind::Say { value } => {
                let value = self.resolve(value);
                if !self.settings.flags.contains(crate::settings::ActivationFlags::TRACE_SUPPRESSED) {
                    sink.write_line(&value.to_string());
                }
                Ok(Flow::Continue)
            }
            InstructionKind::Trace { setting } => {
                self.settings.trace = *setting;
                Ok(Flow::Continue)
            }
            InstructionKind::If { condition, then_branch, else_branch } => {
                if self.resolve_bool(condition) {
                    Ok(Flow::Jump(*then_branch))
                } else if let Some(target) = else_branch {
                    Ok(Flow::Jump(*target))
                } else {
                    Ok(Flow::Continue)
                }
            }
            InstructionKind::DoStart { spec, body_end } => self.start_do_block(instruction, spec, *body_end),
            InstructionKind::DoEnd { start } => Ok(self.end_do_block(*start)),
            InstructionKind::Leave { label } => Ok(self.leave(*label)),
            InstructionKind::Iterate { label } => Ok(self.iterate(*label)),
            InstructionKind::CallInternal { target } => self.call_internal(*target, program, activity, sink),
            InstructionKind::CallOn { condition, target } => {
                self.enable_trap(*condition, TrapKind::CallOn, *target);
                Ok(Flow::Continue)
            }
            InstructionKind::SignalOn { condition, target } => {
                self.enable_trap(*condition, TrapKind::SignalOn, *target);
                Ok(Flow::Continue)
            }
            InstructionKind::TrapOff { condition } => {
                self.settings.traps.remove(*condition);
                Ok(Flow::Continue)
            }
            InstructionKind::SignalLabel { label } => {
                match program.label(*label) {
                    Some(target) => {
                        self.settings.sigl = instruction.line;
                        self.unwind_do_blocks_past(target);
                        Ok(Flow::Jump(target))
                    }
                    None => Err(self.syntax_unwind(SyntaxError::InvalidLeaveIterate)),
                }
            }
            InstructionKind::Raise { condition, description, additional, propagate } => {
                let mut object = ConditionObject::new(*condition, instruction.line);
                if let Some(desc) = description {
                    object.description = Some(self.resolve(desc).to_string());
                }
                object.additional = additional.iter().map(|op| self.resolve(op)).collect();
                object.propagated = *propagate;
                let target = if *propagate { self.parent.unwrap_or(self.id) } else { self.id };
                Err(self.raise(object, target))
            }
            InstructionKind::Procedure { expose } => {
                if self.settings.flags.contains(crate::settings::ActivationFlags::PROCEDURE_ISSUED) {
                    return Err(self.syntax_unwind(SyntaxError::InvalidProcedure));
                }
                self.settings.flags.insert(crate::settings::ActivationFlags::PROCEDURE_ISSUED);
                self.variable_frame = self.variable_frame.procedure_scope(expose);
                Ok(Flow::Continue)
            }
            InstructionKind::Expose { names } => {
                if self.context != Context::MethodCall {
                    return Err(self.syntax_unwind(SyntaxError::InvalidExpose));
                }
                let Some(object_variables) = &self.object_variables else {
                    return Err(self.syntax_unwind(SyntaxError::InvalidExpose));
                };
                let mut dictionary = object_variables.borrow_mut();
                self.variable_frame.expose_from(&mut dictionary, names);
                Ok(Flow::Continue)
            }
            InstructionKind::Guard { on, condition } => self.guard(*on, condition.as_ref(), activity),
            InstructionKind::Reply { value } => {
                if self.settings.flags.contains(crate::settings::ActivationFlags::REPLY_ISSUED) {
                    return Err(self.syntax_unwind(SyntaxError::ReplyAlready));
                }
                Ok(Flow::Reply(value.as_ref().map(|op| self.resolve(op))))
            }
            InstructionKind::Return { value } => {
                if self.settings.flags.contains(crate::settings::ActivationFlags::REPLY_ISSUED) && value.is_some() {
                    return Err(self.syntax_unwind(SyntaxError::ReplyReturn));
                }
                Ok(Flow::Return(value.as_ref().map(|op| self.resolve(op))))
            }
            InstructionKind::Exit { value } => Ok(Flow::Return(value.as_ref().map(|op| self.resolve(op)))),
        }
    }

    /// `CALL label`: spawns a child activation sharing this one's variable
    /// frame (`spec.md` §4.4 default scoping) and runs it to completion
    /// before resuming this clause sequence. An unhandled condition in the
    /// child is re-raised here, targeting this activation, mirroring how
    /// `original_source/interpreter/execution/RexxActivation.cpp`'s
    /// internal call frames propagate conditions up one level at a time.
    fn call_internal(
        &mut self,
        target: InstructionId,
        program: &Program,
        activity: &mut dyn ActivityRuntime,
        sink: &mut dyn TraceSink,
    ) -> Result<Flow, Unwind> {
        let limits = ResourceLimits::unlimited();
        let child_id = activity.allocate_activation_id();
        activity.push_stack_frame(child_id);
        let mut child = Self::internal_call(child_id, self, target, &limits);
        let outcome = child.run(program, activity, sink);
        activity.pop_stack_frame();
        // Without PROCEDURE, the child shares the caller's namespace
        // outright, so its whole frame (including anything it newly
        // created) replaces this one's. Once PROCEDURE swaps in a
        // reduced exposed-only frame, only those named cells are still
        // shared (by Rc identity, mutated in place) — merging the
        // truncated frame back would erase everything the child didn't
        // expose.
        if !child.settings.flags.contains(crate::settings::ActivationFlags::PROCEDURE_ISSUED) {
            self.variable_frame = child.variable_frame;
        }
        match outcome {
            Ok(_value) => Ok(Flow::Continue),
            Err(RunError::Unhandled { condition }) => Err(Unwind { target: self.id, condition }),
            Err(RunError::OrphanedUnwind(id)) => Err(Unwind {
                target: self.id,
                condition: ConditionObject::new(ConditionName::Failure, 0)
                    .with_description(format!("orphaned unwind target {id:?}")),
            }),
        }
    }

    fn syntax_unwind(&self, error: SyntaxError) -> Unwind {
        let condition = ConditionObject::new(ConditionName::Syntax, 0).with_description(error.to_string());
        Unwind { target: self.id, condition }
    }

    fn start_do_block(&mut self, instruction: &Instruction, spec: &LoopSpec, body_end: InstructionId) -> Result<Flow, Unwind> {
        let indent = self.do_blocks.len() as u32;
        let body_start = self.current.next();
        let mut block = match spec {
            LoopSpec::Forever => DoBlock::forever(body_start, body_end, indent),
            LoopSpec::Conditional { condition, negate } => {
                let proceed = self.resolve_bool(condition) != *negate;
                if !proceed {
                    return Ok(Flow::Jump(body_end));
                }
                DoBlock::conditional(condition.clone(), *negate, body_start, body_end, indent)
            }
            LoopSpec::Repetitive { control, from, to, by, for_count } => {
                let from = self.resolve_int(from);
                let to = to.as_ref().map(|op| self.resolve_int(op));
                let by = by.as_ref().map_or(1, |op| self.resolve_int(op));
                let for_count = for_count.as_ref().map(|op| self.resolve_int(op));
                self.variable_frame.set(*control, Value::Integer(from));
                let block = DoBlock::repetitive(*control, from, to, by, for_count, body_start, body_end, indent);
                if let Some(to) = block.to {
                    if !block.compare.test(from, to) {
                        return Ok(Flow::Jump(body_end));
                    }
                }
                block
            }
        };
        if let Some(label) = instruction.label {
            block = block.with_label(label);
        }
        self.do_blocks.push(block);
        Ok(Flow::Continue)
    }

    fn end_do_block(&mut self, start: InstructionId) -> Flow {
        let Some(position) = self.do_blocks.iter().rposition(|b| b.start == start) else {
            return Flow::Continue;
        };
        let repeat_again = {
            let block = &mut self.do_blocks[position];
            match block.repeat {
                LoopRepeat::Once => false,
                LoopRepeat::Forever => true,
                LoopRepeat::Conditional => {
                    let (condition, negate) = block.condition.clone().expect("conditional block has a condition");
                    self.resolve_bool(&condition) != negate
                }
                LoopRepeat::Counted => {
                    let control = block.control.expect("counted block has a control var");
                    let current = self.variable_frame.get(control).and_then(|v| match v {
                        Value::Integer(i) => Some(i),
                        _ => None,
                    }).unwrap_or(0);
                    match block.advance(current) {
                        Some(next) => {
                            self.variable_frame.set(control, Value::Integer(next));
                            true
                        }
                        None => false,
                    }
                }
            }
        };
        if repeat_again {
            Flow::Jump(self.do_blocks[position].start)
        } else {
            let block = self.do_blocks.remove(position);
            Flow::Jump(block.end)
        }
    }

    /// `spec.md` §4.4 LEAVE: pops (without re-running) the named loop, or
    /// the innermost one if unnamed.
    fn leave(&mut self, label: Option<SymbolId>) -> Flow {
        let position = self.find_loop(label);
        match position {
            Some(position) => {
                let block = self.do_blocks.split_off(position).into_iter().next().expect("position is in range");
                Flow::Jump(block.end)
            }
            None => Flow::Continue,
        }
    }

    /// `spec.md` §4.4 ITERATE: jumps back to the named (or innermost)
    /// loop's start, popping any more-nested loops along the way.
    fn iterate(&mut self, label: Option<SymbolId>) -> Flow {
        match self.find_loop(label) {
            Some(position) => {
                self.do_blocks.truncate(position + 1);
                Flow::Jump(self.do_blocks[position].start)
            }
            None => Flow::Continue,
        }
    }

    fn find_loop(&self, label: Option<SymbolId>) -> Option<usize> {
        match label {
            Some(name) => self.do_blocks.iter().rposition(|b| b.matches_name(name)),
            None => {
                if self.do_blocks.is_empty() {
                    None
                } else {
                    Some(self.do_blocks.len() - 1)
                }
            }
        }
    }

    /// A SIGNAL-to-label jump must discard any loop state the jump
    /// bypasses (`spec.md` §4.4 "SIGNAL unwinds enclosing DO blocks").
    fn unwind_do_blocks_past(&mut self, target: InstructionId) {
        self.do_blocks.retain(|block| block.start <= target && target < block.end);
    }

    fn guard(&mut self, on: bool, condition: Option<&Operand>, activity: &mut dyn ActivityRuntime) -> Result<Flow, Unwind> {
        let Some(lock) = self.scope_lock.clone() else {
            return Err(self.syntax_unwind(SyntaxError::InvalidGuard));
        };
        if on {
            if condition.is_some_and(|cond| !self.resolve_bool(cond)) {
                return Ok(Flow::Continue);
            }
            let mut guard = lock.borrow_mut();
            if !guard.try_acquire(self.id) {
                activity.guard_wait(&mut guard, self.id);
            }
        } else {
            lock.borrow_mut().release(self.id);
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::LocalActivity;
    use crate::instruction::Program;
    use crate::intern::InternerBuilder;
    use crate::trace::CollectingSink;

    fn build_count_to_three(builder: &mut InternerBuilder) -> (Program, SymbolId) {
        let control = builder.intern("I");
        let mut program = Program::new();
        let do_start = program.push(Instruction::new(
            InstructionKind::DoStart {
                spec: LoopSpec::Repetitive {
                    control,
                    from: Operand::Literal(Value::Integer(1)),
                    to: Some(Operand::Literal(Value::Integer(3))),
                    by: None,
                    for_count: None,
                },
                body_end: InstructionId::new(0),
            },
            1,
        ));
        let say = program.push(Instruction::new(InstructionKind::Say { value: Operand::Variable(control) }, 2));
        let do_end = program.push(Instruction::new(InstructionKind::DoEnd { start: say }, 3));
        program.push(Instruction::new(InstructionKind::Return { value: None }, 4));

        // patch DoStart's body_end now that DoEnd's successor is known
        let after_loop = do_end.next();
        let patched = Instruction::new(
            InstructionKind::DoStart {
                spec: LoopSpec::Repetitive {
                    control,
                    from: Operand::Literal(Value::Integer(1)),
                    to: Some(Operand::Literal(Value::Integer(3))),
                    by: None,
                    for_count: None,
                },
                body_end: after_loop,
            },
            1,
        );
        let mut fixed = Program::new();
        fixed.push(patched);
        fixed.push(Instruction::new(InstructionKind::Say { value: Operand::Variable(control) }, 2));
        fixed.push(Instruction::new(InstructionKind::DoEnd { start: say }, 3));
        fixed.push(Instruction::new(InstructionKind::Return { value: None }, 4));
        let _ = do_start;
        (fixed, control)
    }

    #[test]
    fn counted_loop_says_each_value_and_returns() {
        let mut builder = InternerBuilder::new();
        let (program, _control) = build_count_to_three(&mut builder);
        let limits = ResourceLimits::unlimited();
        let mut activity = LocalActivity::new();
        let id = activity.allocate_activation_id();
        let rc_symbol = builder.intern("RC");
        let mut activation = Activation::new(
            id,
            Context::Program,
            Settings::new(),
            VariableFrame::new(),
            InstructionId::new(0),
            &limits,
            rc_symbol,
        );
        let mut sink = CollectingSink::default();
        let result = activation.run(&program, &mut activity, &mut sink).unwrap();
        assert_eq!(result, Value::Undefined);
        assert_eq!(sink.lines.iter().filter(|l| l == &"1" || l == &"2" || l == &"3").count(), 3);
    }

    #[test]
    fn reply_then_return_both_observed() {
        let mut builder = InternerBuilder::new();
        let rc_symbol = builder.intern("RC");
        let mut program = Program::new();
        program.push(Instruction::new(InstructionKind::Reply { value: Some(Operand::Literal(Value::Integer(1))) }, 1));
        program.push(Instruction::new(InstructionKind::Return { value: None }, 2));
        let limits = ResourceLimits::unlimited();
        let mut activity = LocalActivity::new();
        let id = activity.allocate_activation_id();
        let mut activation = Activation::new(
            id,
            Context::Routine,
            Settings::new(),
            VariableFrame::new(),
            InstructionId::new(0),
            &limits,
            rc_symbol,
        );
        let mut sink = CollectingSink::default();
        let result = activation.run(&program, &mut activity, &mut sink).unwrap();
        assert_eq!(result, Value::Undefined);
        assert_eq!(activation.state, State::Returned);
        assert_eq!(activation.reply_value, Some(Value::Integer(1)));
    }

    #[test]
    fn return_with_value_after_reply_is_a_syntax_error() {
        let mut builder = InternerBuilder::new();
        let rc_symbol = builder.intern("RC");
        let mut program = Program::new();
        program.push(Instruction::new(InstructionKind::Reply { value: Some(Operand::Literal(Value::Integer(1))) }, 1));
        program.push(Instruction::new(InstructionKind::Return { value: Some(Operand::Literal(Value::Integer(2))) }, 2));
        let limits = ResourceLimits::unlimited();
        let mut activity = LocalActivity::new();
        let id = activity.allocate_activation_id();
        let mut activation = Activation::new(
            id,
            Context::Routine,
            Settings::new(),
            VariableFrame::new(),
            InstructionId::new(0),
            &limits,
            rc_symbol,
        );
        let mut sink = CollectingSink::default();
        let result = activation.run(&program, &mut activity, &mut sink);
        assert!(matches!(result, Err(RunError::Unhandled { .. })));
    }

    #[test]
    fn guard_without_scope_lock_is_a_syntax_error() {
        let mut builder = InternerBuilder::new();
        let rc_symbol = builder.intern("RC");
        let mut program = Program::new();
        program.push(Instruction::new(InstructionKind::Guard { on: true, condition: None }, 1));
        let limits = ResourceLimits::unlimited();
        let mut activity = LocalActivity::new();
        let id = activity.allocate_activation_id();
        let mut activation = Activation::new(
            id,
            Context::Program,
            Settings::new(),
            VariableFrame::new(),
            InstructionId::new(0),
            &limits,
            rc_symbol,
        );
        let mut sink = CollectingSink::default();
        let result = activation.run(&program, &mut activity, &mut sink);
        assert!(result.is_err());
    }
}
