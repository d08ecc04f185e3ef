//! # covolve
//!
//! Coverage-guided evolutionary generation of unit tests.
//!
//! A module under test is described as instrumented code objects, predicates
//! and callables. Test cases are evolved with a many-objective genetic
//! algorithm whose fitness is the control-flow distance of an execution to each
//! branch or line goal, and unannotated parameters are typed from what a
//! tracing proxy observes while the callable runs.

pub mod config;
pub mod execution;
pub mod ga;
pub mod generator;
pub mod statistics;
pub mod subject;
pub mod testcase;
pub mod typetracing;
pub mod value;

// Re-export core types for easy access
pub use config::{ConfigError, Configuration, CoverageMetric, Selection};
pub use execution::{ExecutionResult, ExecutionTrace, Frame, TestCaseExecutor};
pub use ga::{
    CoverageArchive, CoverageGoal, FitnessFunction, GoalPool, ManyObjectiveSearch, SearchResult, StopReason,
    TestCaseChromosome, TestSuiteChromosome, TypeInference,
};
pub use generator::{CodeRenderer, GenerationError, GenerationOutcome, ReturnCode, SeedProvider, TestGenerator};
pub use statistics::{InMemoryStatistics, MetricValue, RuntimeVariable, StatisticsSink};
pub use subject::{LoadError, ModuleBuilder, Parameter, SubjectModule, SubjectProvider};
pub use testcase::{ConstantPool, Statement, TestCase, TestFactory, VariableReference};
pub use typetracing::{ObjectProxy, Operand, ProxyKnowledge};
pub use value::{BinOp, CompareOp, Fault, TypeTag, UnaryOp, Value};
