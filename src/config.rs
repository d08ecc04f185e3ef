//! Run configuration
//!
//! A single immutable [`Configuration`] value is built once before the search
//! starts and handed by reference to the search driver, the fitness functions,
//! the test factory and the genetic operators. Every section derives
//! `Deserialize` with `#[serde(default)]`, so a partial JSON document only needs
//! to name the values that differ from the defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors raised while loading or validating a configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{name} must be a probability in [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },

    #[error("{name} must be greater than zero")]
    ZeroSize { name: &'static str },

    #[error("{name} must not be negative, got {value}")]
    NegativeBound { name: &'static str, value: i64 },

    #[error("at least one coverage metric must be selected")]
    NoCoverageMetric,
}

/// Coverage criteria the search optimises for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CoverageMetric {
    /// One goal per predicate arm, plus reachability goals for branchless code objects
    Branch,
    /// One goal per instrumented line
    Line,
}

/// Parent selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    Tournament,
    Rank,
}

/// Parameters of the generational loop and its operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchAlgorithmConfiguration {
    /// Number of test cases in each generation
    pub population: usize,
    /// Maximum number of statements in a generated test case
    pub chromosome_length: usize,
    /// Probability that two selected parents are recombined
    pub crossover_rate: f64,
    pub test_delete_probability: f64,
    pub test_change_probability: f64,
    pub test_insert_probability: f64,
    /// Base of the geometric series that decides how many statements one insertion adds
    pub statement_insertion_probability: f64,
    pub selection: Selection,
    pub tournament_size: usize,
    /// Bias of rank selection, in (1, 2]
    pub rank_bias: f64,
    /// Evaluation workers per generation; 0 lets the pool pick the number of CPUs
    pub worker_threads: usize,
}

impl Default for SearchAlgorithmConfiguration {
    fn default() -> Self {
        Self {
            population: 50,
            chromosome_length: 40,
            crossover_rate: 0.75,
            test_delete_probability: 1.0 / 3.0,
            test_change_probability: 1.0 / 3.0,
            test_insert_probability: 1.0 / 3.0,
            statement_insertion_probability: 0.5,
            selection: Selection::Tournament,
            tournament_size: 5,
            rank_bias: 1.7,
            worker_threads: 0,
        }
    }
}

/// Budgets checked between generations. `None` disables a budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoppingConfiguration {
    /// Wall-clock budget of the whole search, in seconds
    pub maximum_search_time: Option<u64>,
    pub maximum_iterations: Option<usize>,
    pub maximum_test_executions: Option<usize>,
}

impl Default for StoppingConfiguration {
    fn default() -> Self {
        Self {
            maximum_search_time: Some(60),
            maximum_iterations: None,
            maximum_test_executions: None,
        }
    }
}

impl StoppingConfiguration {
    pub fn search_time_budget(&self) -> Option<Duration> {
        self.maximum_search_time.map(Duration::from_secs)
    }
}

/// Knobs for statement and value construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestCreationConfiguration {
    /// Maximum depth of recursive object construction for one parameter
    pub max_recursion: usize,
    /// Integers are drawn from `[-max_int, max_int]`
    pub max_int: i64,
    pub string_length: usize,
    pub bytes_length: usize,
    pub collection_size: usize,
    /// Largest delta applied when a numeric literal is mutated
    pub max_delta: i64,
    pub primitive_reuse_probability: f64,
    pub object_reuse_probability: f64,
    pub none_probability: f64,
    /// Chance that a mutated literal is replaced instead of perturbed
    pub random_perturbation: f64,
}

impl Default for TestCreationConfiguration {
    fn default() -> Self {
        Self {
            max_recursion: 10,
            max_int: 2048,
            string_length: 20,
            bytes_length: 20,
            collection_size: 5,
            max_delta: 20,
            primitive_reuse_probability: 0.5,
            object_reuse_probability: 0.9,
            none_probability: 0.1,
            random_perturbation: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedingConfiguration {
    /// Collect primitive operands of comparison predicates into the constant pool
    pub dynamic_constant_seeding: bool,
    pub seeded_primitives_reuse_probability: f64,
    /// Upper bound of constants kept per type
    pub max_dynamic_pool_size: usize,
}

impl Default for SeedingConfiguration {
    fn default() -> Self {
        Self {
            dynamic_constant_seeding: true,
            seeded_primitives_reuse_probability: 0.2,
            max_dynamic_pool_size: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeInferenceConfiguration {
    /// Shadow-execute calls with proxied arguments to learn parameter usage
    pub type_tracing: bool,
    /// Chance of picking an inferred type for an unannotated parameter
    pub inferred_type_probability: f64,
}

impl Default for TypeInferenceConfiguration {
    fn default() -> Self {
        Self {
            type_tracing: true,
            inferred_type_probability: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfiguration {
    /// Wall-clock bound of a single test case execution, in milliseconds
    pub timeout_millis: u64,
}

impl Default for ExecutionConfiguration {
    fn default() -> Self {
        Self { timeout_millis: 1000 }
    }
}

impl ExecutionConfiguration {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }
}

/// Complete configuration of one generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Name of the module under test, used in logs and statistics
    pub module_name: String,
    /// Seed of the driver's random number generator
    pub seed: u64,
    pub coverage_metrics: Vec<CoverageMetric>,
    pub search: SearchAlgorithmConfiguration,
    pub stopping: StoppingConfiguration,
    pub test_creation: TestCreationConfiguration,
    pub seeding: SeedingConfiguration,
    pub type_inference: TypeInferenceConfiguration,
    pub execution: ExecutionConfiguration,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            module_name: String::new(),
            seed: 0,
            coverage_metrics: vec![CoverageMetric::Branch],
            search: SearchAlgorithmConfiguration::default(),
            stopping: StoppingConfiguration::default(),
            test_creation: TestCreationConfiguration::default(),
            seeding: SeedingConfiguration::default(),
            type_inference: TypeInferenceConfiguration::default(),
            execution: ExecutionConfiguration::default(),
        }
    }
}

impl Configuration {
    /// Parse a (possibly partial) JSON document and validate the result
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let configuration: Configuration = serde_json::from_str(source)?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let probabilities = [
            ("crossover_rate", self.search.crossover_rate),
            ("test_delete_probability", self.search.test_delete_probability),
            ("test_change_probability", self.search.test_change_probability),
            ("test_insert_probability", self.search.test_insert_probability),
            ("statement_insertion_probability", self.search.statement_insertion_probability),
            ("primitive_reuse_probability", self.test_creation.primitive_reuse_probability),
            ("object_reuse_probability", self.test_creation.object_reuse_probability),
            ("none_probability", self.test_creation.none_probability),
            ("random_perturbation", self.test_creation.random_perturbation),
            (
                "seeded_primitives_reuse_probability",
                self.seeding.seeded_primitives_reuse_probability,
            ),
            ("inferred_type_probability", self.type_inference.inferred_type_probability),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidProbability { name, value });
            }
        }

        let sizes = [
            ("population", self.search.population),
            ("chromosome_length", self.search.chromosome_length),
            ("tournament_size", self.search.tournament_size),
            ("max_dynamic_pool_size", self.seeding.max_dynamic_pool_size),
        ];
        for (name, size) in sizes {
            if size == 0 {
                return Err(ConfigError::ZeroSize { name });
            }
        }
        let bounds = [
            ("max_int", self.test_creation.max_int),
            ("max_delta", self.test_creation.max_delta),
        ];
        for (name, value) in bounds {
            if value < 0 {
                return Err(ConfigError::NegativeBound { name, value });
            }
        }
        if self.execution.timeout_millis == 0 {
            return Err(ConfigError::ZeroSize { name: "timeout_millis" });
        }
        if self.coverage_metrics.is_empty() {
            return Err(ConfigError::NoCoverageMetric);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration_is_valid() {
        assert!(Configuration::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let configuration = Configuration::from_json_str(
            r#"{"module_name": "queue", "search": {"population": 8}, "stopping": {"maximum_iterations": 3}}"#,
        )
        .unwrap();

        assert_eq!(configuration.module_name, "queue");
        assert_eq!(configuration.search.population, 8);
        assert_eq!(configuration.search.chromosome_length, 40);
        assert_eq!(configuration.stopping.maximum_iterations, Some(3));
        assert_eq!(configuration.stopping.maximum_search_time, Some(60));
    }

    #[test]
    fn test_rejects_out_of_range_probability() {
        let mut configuration = Configuration::default();
        configuration.search.crossover_rate = 1.5;
        match configuration.validate() {
            Err(ConfigError::InvalidProbability { name, .. }) => assert_eq!(name, "crossover_rate"),
            other => panic!("unexpected validation result: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_empty_population() {
        let mut configuration = Configuration::default();
        configuration.search.population = 0;
        assert!(matches!(configuration.validate(), Err(ConfigError::ZeroSize { name: "population" })));
    }

    #[test]
    fn test_rejects_negative_value_bounds() {
        let mut configuration = Configuration::default();
        configuration.test_creation.max_int = -5;
        assert!(matches!(
            configuration.validate(),
            Err(ConfigError::NegativeBound { name: "max_int", value: -5 })
        ));

        configuration.test_creation.max_int = i64::MIN;
        assert!(configuration.validate().is_err());

        configuration.test_creation.max_int = 0;
        configuration.test_creation.max_delta = -1;
        assert!(matches!(
            configuration.validate(),
            Err(ConfigError::NegativeBound { name: "max_delta", .. })
        ));

        let err = Configuration::from_json_str(r#"{"test_creation": {"max_delta": -20}}"#).unwrap_err();
        assert!(err.to_string().contains("max_delta"));
    }
}
