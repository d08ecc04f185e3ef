//! Shared fixture modules for the integration tests

#![allow(dead_code)]

use covolve::subject::{ModuleBuilder, Parameter, PredicateMeta, SubjectModule};
use covolve::testcase::{Statement, TestCase, VariableReference};
use covolve::typetracing::Operand;
use covolve::value::{BinOp, CompareOp, Fault, ObjectValue, TypeTag, Value};
use covolve::Configuration;

pub fn none() -> Result<Operand, Fault> {
    Ok(Operand::Value(Value::None))
}

/// Functions that return `None` with and without branching
///
/// ```python
/// def explicit_return_none(x):
///     return None
///
/// def empty_function(x):
///     """"""
///
/// def only_return_on_branch(x):
///     if x:
///         return None
///
/// def return_on_both_branches(x):
///     if x:
///         return None
///     return None
///
/// def for_return(x):
///     for y in x:
///         return y
/// ```
pub fn artificial_none() -> SubjectModule {
    let mut builder = ModuleBuilder::new("artificial_none");

    let explicit = builder.code_object("explicit_return_none", None);
    let line = builder.line(explicit, 8, &[]);
    builder.function("explicit_return_none", explicit, vec![Parameter::untyped("x")], None, move |frame, _| {
        frame.line(line)?;
        none()
    });

    let empty = builder.code_object("empty_function", None);
    builder.function("empty_function", empty, vec![Parameter::untyped("x")], None, |_, _| none());

    let only = builder.code_object("only_return_on_branch", None);
    let test_line = builder.line(only, 20, &[]);
    let predicate = builder.predicate(only, 20, &[]);
    let return_line = builder.line(only, 21, &[(predicate, true)]);
    builder.function(
        "only_return_on_branch",
        only,
        vec![Parameter::untyped("x")],
        None,
        move |frame, args| {
            frame.line(test_line)?;
            if frame.branch(predicate, &args[0])? {
                frame.line(return_line)?;
            }
            none()
        },
    );

    let both = builder.code_object("return_on_both_branches", None);
    let predicate = builder.predicate(both, 25, &[]);
    let true_line = builder.line(both, 26, &[(predicate, true)]);
    let false_line = builder.line(both, 27, &[(predicate, false)]);
    builder.function(
        "return_on_both_branches",
        both,
        vec![Parameter::untyped("x")],
        None,
        move |frame, args| {
            if frame.branch(predicate, &args[0])? {
                frame.line(true_line)?;
                return none();
            }
            frame.line(false_line)?;
            none()
        },
    );

    let for_return = builder.code_object("for_return", None);
    let predicate = builder.predicate(for_return, 38, &[]);
    let body_line = builder.line(for_return, 39, &[(predicate, true)]);
    builder.function(
        "for_return",
        for_return,
        vec![Parameter::untyped("x")],
        None,
        move |frame, args| {
            let elements = args[0].iterate()?;
            let has_next = Operand::Value(Value::Bool(!elements.is_empty()));
            if frame.branch(predicate, &has_next)? {
                frame.line(body_line)?;
                if let Some(first) = elements.into_iter().next() {
                    return Ok(first);
                }
            }
            none()
        },
    );

    match builder.build() {
        Ok(module) => module,
        Err(err) => panic!("fixture module is malformed: {}", err),
    }
}

/// A small class with comparison predicates, an inter-procedural call and an
/// untyped parameter that is only used as a string
///
/// ```python
/// class Account:
///     def __init__(self, balance: int):
///         self.balance = balance
///
///     def deposit(self, amount: int):
///         if amount <= 0:
///             raise ValueError("amount must be positive")
///         self.balance += amount
///         if self.balance > 1000:
///             return "vip"
///         return "regular"
///
/// def greet(name):
///     if name.startswith("ad"):
///         return "hello admin"
///     return "hello"
///
/// def spin(n: int):
///     while True:
///         pass
/// ```
pub fn bank() -> SubjectModule {
    let mut builder = ModuleBuilder::new("bank");

    let init = builder.code_object("Account.__init__", None);
    builder.constructor("Account", init, vec![Parameter::typed("balance", TypeTag::Int)], |_, args| {
        let balance = args[0].unwrap_value().clone();
        Ok(Operand::Value(Value::Object(
            ObjectValue::new("Account").with_field("balance", balance),
        )))
    });

    let deposit = builder.code_object("Account.deposit", None);
    let positive = builder.predicate(deposit, 6, &[]);
    let vip = builder.predicate(deposit, 9, &[(positive, false)]);
    builder.method(
        "Account",
        "deposit",
        deposit,
        vec![Parameter::typed("amount", TypeTag::Int)],
        Some(TypeTag::Str),
        move |frame, args| {
            let zero = Operand::Value(Value::Int(0));
            if frame.compare(positive, &args[1], CompareOp::Le, &zero)? {
                return Err(Fault::ValueError("amount must be positive".into()));
            }
            let balance = args[0].getattr("balance")?;
            let updated = balance.binary(BinOp::Add, &args[1])?;
            args[0].setattr("balance", updated.clone())?;
            let threshold = Operand::Value(Value::Int(1000));
            if frame.compare(vip, &updated, CompareOp::Gt, &threshold)? {
                return Ok(Operand::Value(Value::from("vip")));
            }
            Ok(Operand::Value(Value::from("regular")))
        },
    );

    let greet = builder.code_object("greet", None);
    let admin = builder.predicate(greet, 16, &[]);
    builder.function("greet", greet, vec![Parameter::untyped("name")], Some(TypeTag::Str), move |frame, args| {
        let prefix = Operand::Value(Value::from("ad"));
        let starts = args[0].call_method("startswith", &[prefix])?;
        if frame.branch(admin, &starts)? {
            return Ok(Operand::Value(Value::from("hello admin")));
        }
        Ok(Operand::Value(Value::from("hello")))
    });

    let spin = builder.code_object("spin", None);
    let spin_line = builder.line(spin, 22, &[]);
    builder.function("spin", spin, vec![Parameter::typed("n", TypeTag::Int)], None, move |frame, _| loop {
        frame.line(spin_line)?;
    });

    match builder.build() {
        Ok(module) => module,
        Err(err) => panic!("fixture module is malformed: {}", err),
    }
}

/// Predicates of the code object a callable runs in
pub fn predicates_of<'a>(module: &'a SubjectModule, callable: &str) -> Vec<&'a PredicateMeta> {
    let code_object_id = module
        .callable_by_name(callable)
        .map(|callable| callable.code_object_id)
        .unwrap_or(usize::MAX);
    module
        .predicates()
        .iter()
        .filter(|predicate| predicate.code_object_id == code_object_id)
        .collect()
}

/// `x = value; f(x)`
pub fn call_with(module: &SubjectModule, callable: &str, value: Value) -> TestCase {
    let callable = module.callable_by_name(callable).map(|callable| callable.id).unwrap_or(usize::MAX);
    let mut test = TestCase::new();
    let argument = test.add_statement(Statement::Primitive(value));
    test.add_statement(Statement::Function {
        callable,
        args: vec![argument],
        returns: None,
    });
    test
}

pub fn var(position: usize) -> VariableReference {
    VariableReference(position)
}

/// Defaults with a short budget, suitable for tests
pub fn quick_config() -> Configuration {
    let mut config = Configuration::default();
    config.seed = 42;
    config.search.population = 10;
    config.search.worker_threads = 2;
    config.stopping.maximum_search_time = Some(20);
    config.stopping.maximum_iterations = Some(15);
    config.execution.timeout_millis = 200;
    config
}
