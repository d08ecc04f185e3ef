//! Execution tracer
//!
//! Runs test cases against the instrumented module and records which code
//! objects, predicates and lines were reached, together with the branch
//! distances of every evaluated predicate.

pub mod executor;
pub mod frame;
pub mod trace;

pub use executor::{ExecutionResult, ParameterUsage, TestCaseExecutor};
pub use frame::{Frame, MAX_CALL_DEPTH};
pub use trace::{levenshtein, normalise, ExecutionTrace, PredicateEvent, BOOL_PREDICATE_DISTANCE};
