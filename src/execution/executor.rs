//! Running test cases against the module under test
//!
//! The executor turns a [`TestCase`] into an [`ExecutionResult`]. Statements run
//! in order; the first statement that raises stops the run and its fault is
//! stored with the statement's position. Panics inside callable bodies are
//! contained and reported as [`Fault::Panic`], and the wall-clock bound is
//! enforced both between statements and by every instrumentation hook.
//!
//! With type tracing enabled, each call is preceded by a shadow call on copies
//! of its arguments wrapped in proxies. The shadow call runs against a scratch
//! trace, so it never influences coverage, and its knowledge is attached to the
//! result for the type inference model.

use super::frame::Frame;
use super::trace::ExecutionTrace;
use crate::config::Configuration;
use crate::subject::{GenericCallable, SubjectModule};
use crate::testcase::{CollectionKind, Statement, TestCase, VariableReference};
use crate::typetracing::{shim_isinstance, ObjectProxy, Operand, ProxyKnowledge};
use crate::value::{Fault, TypeTag, Value};
use log::{debug, warn};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Knowledge observed for one parameter during a shadow call
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterUsage {
    pub callable_id: usize,
    pub parameter: usize,
    pub knowledge: ProxyKnowledge,
}

/// Outcome of running one test case
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub trace: ExecutionTrace,
    /// Statement position to the fault it raised
    pub exceptions: BTreeMap<usize, Fault>,
    /// Statements that completed without raising
    pub executed_statements: usize,
    pub timeout: bool,
    pub proxy_knowledge: Vec<ParameterUsage>,
}

impl ExecutionResult {
    pub fn has_exceptions(&self) -> bool {
        !self.exceptions.is_empty()
    }

    pub fn first_exception(&self) -> Option<(usize, &Fault)> {
        self.exceptions.iter().next().map(|(position, fault)| (*position, fault))
    }

    /// Result reported for a test case that could not finish in time
    pub fn timed_out() -> Self {
        Self {
            timeout: true,
            ..Self::default()
        }
    }
}

struct StatementOutcome {
    value: Value,
    /// A method or field assignment changed this earlier variable
    updated: Option<(VariableReference, Value)>,
}

/// Executes test cases; shared by all evaluation workers
pub struct TestCaseExecutor {
    module: Arc<SubjectModule>,
    timeout: Duration,
    type_tracing: bool,
    executions: AtomicUsize,
}

impl TestCaseExecutor {
    pub fn new(module: Arc<SubjectModule>, configuration: &Configuration) -> Self {
        Self {
            module,
            timeout: configuration.execution.timeout(),
            type_tracing: configuration.type_inference.type_tracing,
            executions: AtomicUsize::new(0),
        }
    }

    pub fn module(&self) -> &SubjectModule {
        &self.module
    }

    /// Number of test case executions so far
    pub fn execution_count(&self) -> usize {
        self.executions.load(Ordering::Relaxed)
    }

    /// Run with or without type tracing, as configured
    pub fn run(&self, test_case: &TestCase) -> ExecutionResult {
        if self.type_tracing {
            self.execute_with_type_tracing(test_case)
        } else {
            self.execute(test_case)
        }
    }

    pub fn execute(&self, test_case: &TestCase) -> ExecutionResult {
        self.execute_inner(test_case, false)
    }

    pub fn execute_with_type_tracing(&self, test_case: &TestCase) -> ExecutionResult {
        self.execute_inner(test_case, true)
    }

    fn execute_inner(&self, test_case: &TestCase, trace_types: bool) -> ExecutionResult {
        self.executions.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + self.timeout;
        let mut result = ExecutionResult::default();
        let mut variables: Vec<Value> = Vec::with_capacity(test_case.len());

        for (position, statement) in test_case.statements().iter().enumerate() {
            if Instant::now() >= deadline {
                result.timeout = true;
                break;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                self.execute_statement(statement, &variables, &mut result, deadline, trace_types)
            }))
            .unwrap_or_else(|payload| Err(Fault::Panic(panic_message(payload))));

            match outcome {
                Ok(StatementOutcome { value, updated }) => {
                    if let Some((reference, new_value)) = updated {
                        if let Some(slot) = variables.get_mut(reference.0) {
                            *slot = new_value;
                        }
                    }
                    variables.push(value);
                    result.executed_statements += 1;
                }
                Err(Fault::Timeout) => {
                    result.timeout = true;
                    result.exceptions.insert(position, Fault::Timeout);
                    break;
                }
                Err(fault) => {
                    debug!("statement {} raised {}", position, fault);
                    result.exceptions.insert(position, fault);
                    break;
                }
            }
        }
        if result.timeout {
            warn!(
                "test case of {} statements exceeded {:?}",
                test_case.len(),
                self.timeout
            );
        }
        result
    }

    fn variable(variables: &[Value], reference: VariableReference) -> Result<Value, Fault> {
        variables
            .get(reference.0)
            .cloned()
            .ok_or_else(|| Fault::raised("NameError", format!("name '{}' is not defined", reference)))
    }

    fn execute_statement(
        &self,
        statement: &Statement,
        variables: &[Value],
        result: &mut ExecutionResult,
        deadline: Instant,
        trace_types: bool,
    ) -> Result<StatementOutcome, Fault> {
        let plain = |value: Value| StatementOutcome { value, updated: None };
        match statement {
            Statement::Primitive(value) => Ok(plain(value.clone())),
            Statement::Collection { kind, elements } => {
                let values = elements
                    .iter()
                    .map(|reference| Self::variable(variables, *reference))
                    .collect::<Result<Vec<_>, _>>()?;
                let value = match kind {
                    CollectionKind::List => Value::List(values),
                    CollectionKind::Tuple => Value::Tuple(values),
                    CollectionKind::Set => Value::set_from(values)?,
                };
                Ok(plain(value))
            }
            Statement::Dict { entries } => {
                let pairs = entries
                    .iter()
                    .map(|(key, value)| Ok((Self::variable(variables, *key)?, Self::variable(variables, *value)?)))
                    .collect::<Result<Vec<_>, Fault>>()?;
                Ok(plain(Value::dict_from(pairs)?))
            }
            Statement::FieldAssign { target, field, value } => {
                let mut object = Self::variable(variables, *target)?;
                object.setattr(field, Self::variable(variables, *value)?)?;
                Ok(StatementOutcome {
                    value: Value::None,
                    updated: Some((*target, object)),
                })
            }
            Statement::Constructor { callable, args, .. } | Statement::Function { callable, args, .. } => {
                let callable = self.callable(*callable)?;
                let mut operands = args
                    .iter()
                    .map(|reference| Self::variable(variables, *reference).map(Operand::Value))
                    .collect::<Result<Vec<_>, _>>()?;
                let value = self.invoke(callable, &mut operands, 0, result, deadline, trace_types)?;
                Ok(plain(value))
            }
            Statement::Method { callable, callee, args, .. } => {
                let callable = self.callable(*callable)?;
                let receiver = Self::variable(variables, *callee)?;
                if let Some(class) = callable.owner_class() {
                    if !receiver.is_instance_of(&TypeTag::Class(class.to_string())) {
                        return Err(Fault::TypeError(format!(
                            "descriptor '{}' requires a '{}' object but received a '{}'",
                            callable.name,
                            class,
                            receiver.type_tag()
                        )));
                    }
                }
                let mut operands = Vec::with_capacity(args.len() + 1);
                operands.push(Operand::Value(receiver));
                for reference in args {
                    operands.push(Operand::Value(Self::variable(variables, *reference)?));
                }
                let value = self.invoke(callable, &mut operands, 1, result, deadline, trace_types)?;
                let receiver = operands.swap_remove(0).into_value();
                Ok(StatementOutcome {
                    value,
                    updated: Some((*callee, receiver)),
                })
            }
        }
    }

    fn callable(&self, id: usize) -> Result<&GenericCallable, Fault> {
        self.module
            .callable(id)
            .ok_or_else(|| Fault::raised("NameError", format!("callable {} is not defined", id)))
    }

    /// Call `callable` with `operands`; parameters start at `first_param`
    fn invoke(
        &self,
        callable: &GenericCallable,
        operands: &mut [Operand],
        first_param: usize,
        result: &mut ExecutionResult,
        deadline: Instant,
        trace_types: bool,
    ) -> Result<Value, Fault> {
        if trace_types && callable.has_untyped_params() {
            self.shadow_call(callable, operands, first_param, result, deadline);
        }
        let mut frame = Frame::new(&self.module, &mut result.trace, Some(deadline));
        frame.enter(callable.code_object_id);
        (callable.body)(&mut frame, operands).map(Operand::into_value)
    }

    /// Run the callable on proxied copies of its arguments and collect what
    /// the proxies observed. Faults of the shadow call are ignored.
    fn shadow_call(
        &self,
        callable: &GenericCallable,
        operands: &[Operand],
        first_param: usize,
        result: &mut ExecutionResult,
        deadline: Instant,
    ) {
        let mut shadow: Vec<Operand> = operands.to_vec();
        let mut proxies = Vec::new();
        for (parameter, operand) in shadow.iter_mut().enumerate().skip(first_param) {
            let proxy = ObjectProxy::new(operand.clone());
            proxies.push((parameter - first_param, proxy.clone()));
            *operand = Operand::Proxy(proxy);
        }

        let mut scratch = ExecutionTrace::new();
        {
            let _shim = shim_isinstance();
            let mut frame = Frame::new(&self.module, &mut scratch, Some(deadline));
            let outcome = catch_unwind(AssertUnwindSafe(|| (callable.body)(&mut frame, &mut shadow)));
            if let Ok(Err(fault)) = outcome {
                debug!("shadow call of {} raised {}", callable.qualified_name(), fault);
            }
        }

        for (parameter, proxy) in proxies {
            result.proxy_knowledge.push(ParameterUsage {
                callable_id: callable.id,
                parameter,
                knowledge: proxy.knowledge(),
            });
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
