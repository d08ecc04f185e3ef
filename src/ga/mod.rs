//! Search-based test generation
//!
//! Coverage goals and their fitness functions, the chromosome model, genetic
//! operators, the coverage archive and the many-objective search loop that
//! ties them together.

pub mod archive;
pub mod chromosome;
pub mod fitness;
pub mod goals;
pub mod inference;
pub mod operators;
pub mod search;
pub mod stopping;
pub mod suite;

pub use archive::CoverageArchive;
pub use chromosome::TestCaseChromosome;
pub use fitness::{FitnessFunction, GoalFitness};
pub use goals::{calculate_control_flow_distance, ControlFlowDistance, CoverageGoal, GoalPool};
pub use inference::TypeInference;
pub use search::{CoveragePoint, ManyObjectiveSearch, SearchResult};
pub use stopping::{StopReason, StoppingCondition};
pub use suite::TestSuiteChromosome;
