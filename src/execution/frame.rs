//! Instrumentation hooks available to callable bodies

use super::trace::ExecutionTrace;
use crate::subject::SubjectModule;
use crate::typetracing::Operand;
use crate::value::{CompareOp, Fault};
use std::time::Instant;

/// Deepest chain of nested calls before the target is considered runaway
pub const MAX_CALL_DEPTH: usize = 64;

/// Execution context of one running test case.
///
/// Every hook checks the wall-clock deadline first, so a target that loops
/// through instrumented code is interrupted with [`Fault::Timeout`].
pub struct Frame<'a> {
    module: &'a SubjectModule,
    trace: &'a mut ExecutionTrace,
    deadline: Option<Instant>,
    call_depth: usize,
}

impl<'a> Frame<'a> {
    pub fn new(module: &'a SubjectModule, trace: &'a mut ExecutionTrace, deadline: Option<Instant>) -> Self {
        Self {
            module,
            trace,
            deadline,
            call_depth: 0,
        }
    }

    pub fn check_deadline(&self) -> Result<(), Fault> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Fault::Timeout),
            _ => Ok(()),
        }
    }

    pub fn trace(&self) -> &ExecutionTrace {
        &*self.trace
    }

    /// Entering the body of a code object
    pub fn enter(&mut self, code_object_id: usize) {
        self.trace.executed_code_object(code_object_id);
    }

    /// The instrumented line `line_id` is about to run
    pub fn line(&mut self, line_id: usize) -> Result<(), Fault> {
        self.check_deadline()?;
        self.trace.executed_line(line_id);
        Ok(())
    }

    /// Truthiness test of `value`; returns the arm to take
    pub fn branch(&mut self, predicate_id: usize, value: &Operand) -> Result<bool, Fault> {
        self.check_deadline()?;
        // evaluated through the operand so proxies see the truthiness test
        value.is_truthy();
        Ok(self.trace.passed_bool_predicate(predicate_id, value.unwrap_value()))
    }

    /// Comparison predicate `lhs <op> rhs`; returns the arm to take
    pub fn compare(&mut self, predicate_id: usize, lhs: &Operand, op: CompareOp, rhs: &Operand) -> Result<bool, Fault> {
        self.check_deadline()?;
        let outcome = lhs.compare(op, rhs)?;
        self.trace
            .passed_cmp_predicate(predicate_id, lhs.unwrap_value(), op, rhs.unwrap_value(), outcome);
        Ok(outcome)
    }

    /// Call another callable of the module by its (qualified) name
    pub fn call(&mut self, name: &str, args: &mut [Operand]) -> Result<Operand, Fault> {
        self.check_deadline()?;
        let module = self.module;
        let callable = module
            .callable_by_name(name)
            .ok_or_else(|| Fault::raised("NameError", format!("name '{}' is not defined", name)))?;
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(Fault::raised("RecursionError", "maximum recursion depth exceeded"));
        }
        self.enter(callable.code_object_id);
        self.call_depth += 1;
        let result = (callable.body)(self, args);
        self.call_depth -= 1;
        result
    }
}
