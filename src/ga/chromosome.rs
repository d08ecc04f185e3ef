//! Test-case chromosomes
//!
//! A chromosome owns one test case and caches the last execution of it along
//! with the fitness values computed from that execution. Any mutable access to
//! the test case drops both caches, so a stale result can never be scored.

use super::goals::{calculate_control_flow_distance, CoverageGoal};
use crate::config::Configuration;
use crate::execution::{ExecutionResult, TestCaseExecutor};
use crate::testcase::{TestCase, TestFactory};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct TestCaseChromosome {
    test_case: TestCase,
    last_execution_result: Option<ExecutionResult>,
    fitness_cache: BTreeMap<CoverageGoal, f64>,
}

impl PartialEq for TestCaseChromosome {
    fn eq(&self, other: &Self) -> bool {
        self.test_case == other.test_case
    }
}

impl TestCaseChromosome {
    pub fn new(test_case: TestCase) -> Self {
        Self {
            test_case,
            last_execution_result: None,
            fitness_cache: BTreeMap::new(),
        }
    }

    pub fn test_case(&self) -> &TestCase {
        &self.test_case
    }

    /// Mutable access to the test case; drops the cached execution
    pub fn test_case_mut(&mut self) -> &mut TestCase {
        self.invalidate_cache();
        &mut self.test_case
    }

    pub fn into_test_case(self) -> TestCase {
        self.test_case
    }

    pub fn len(&self) -> usize {
        self.test_case.len()
    }

    pub fn is_empty(&self) -> bool {
        self.test_case.is_empty()
    }

    pub fn execution_result(&self) -> Option<&ExecutionResult> {
        self.last_execution_result.as_ref()
    }

    pub fn set_execution_result(&mut self, result: ExecutionResult) {
        self.fitness_cache.clear();
        self.last_execution_result = Some(result);
    }

    pub fn invalidate_cache(&mut self) {
        self.last_execution_result = None;
        self.fitness_cache.clear();
    }

    pub fn has_valid_result(&self) -> bool {
        self.last_execution_result.is_some()
    }

    /// Run the test case unless a valid result is cached. Returns whether an
    /// execution happened.
    pub fn execute(&mut self, executor: &TestCaseExecutor) -> bool {
        if self.last_execution_result.is_some() {
            return false;
        }
        let result = executor.run(&self.test_case);
        self.set_execution_result(result);
        true
    }

    /// Fitness towards `goal`, running the test case first if needed
    pub fn fitness_for(&mut self, goal: &CoverageGoal, executor: &TestCaseExecutor) -> f64 {
        if let Some(fitness) = self.fitness_cache.get(goal) {
            return *fitness;
        }
        self.execute(executor);
        let fitness = match &self.last_execution_result {
            Some(result) => calculate_control_flow_distance(goal, result, executor.module()).resulting_fitness(),
            None => f64::INFINITY,
        };
        self.fitness_cache.insert(*goal, fitness);
        fitness
    }

    /// Cached fitness values; empty until scored against some goal
    pub fn cached_fitness(&self) -> &BTreeMap<CoverageGoal, f64> {
        &self.fitness_cache
    }

    pub fn is_covering(&mut self, goal: &CoverageGoal, executor: &TestCaseExecutor) -> bool {
        self.fitness_for(goal, executor) == 0.0
    }

    /// Statements after the first raising one never run, so they are cut
    /// before mutating
    fn last_mutatable_position(&self) -> Option<usize> {
        self.last_execution_result
            .as_ref()
            .and_then(ExecutionResult::first_exception)
            .map(|(position, _)| position)
    }

    /// Apply deletion, change and insertion, each with its configured
    /// probability. Returns whether the test case changed.
    pub fn mutate(&mut self, factory: &TestFactory<'_>, config: &Configuration, rng: &mut ChaCha8Rng) -> bool {
        let search = &config.search;
        let mut changed = false;

        if let Some(position) = self.last_mutatable_position() {
            if position + 1 < self.test_case.len() {
                self.test_case.chop(position);
                changed = true;
            }
        }
        if rng.gen_bool(search.test_delete_probability) && self.mutation_delete(rng) {
            changed = true;
        }
        if rng.gen_bool(search.test_change_probability) && self.mutation_change(factory, rng) {
            changed = true;
        }
        if rng.gen_bool(search.test_insert_probability) && self.mutation_insert(factory, config, rng) {
            changed = true;
        }
        if self.test_case.is_empty() && factory.insert_random_statement(&mut self.test_case, rng).is_some() {
            changed = true;
        }
        if changed {
            self.invalidate_cache();
        }
        changed
    }

    fn mutation_delete(&mut self, rng: &mut ChaCha8Rng) -> bool {
        let probability = 1.0 / self.test_case.len().max(1) as f64;
        let mut changed = false;
        for position in (0..self.test_case.len()).rev() {
            if position < self.test_case.len() && rng.gen_bool(probability) {
                changed |= !self.test_case.remove_statement(position).is_empty();
            }
        }
        changed
    }

    fn mutation_change(&mut self, factory: &TestFactory<'_>, rng: &mut ChaCha8Rng) -> bool {
        let probability = 1.0 / self.test_case.len().max(1) as f64;
        let mut changed = false;
        for position in 0..self.test_case.len() {
            if rng.gen_bool(probability) {
                changed |= factory.change_statement(&mut self.test_case, position, rng);
            }
        }
        changed
    }

    /// Insert statements while a geometrically decaying coin keeps coming up
    fn mutation_insert(&mut self, factory: &TestFactory<'_>, config: &Configuration, rng: &mut ChaCha8Rng) -> bool {
        let alpha = config.search.statement_insertion_probability;
        let mut exponent = 1;
        let mut changed = false;
        while rng.gen::<f64>() <= alpha.powi(exponent) && self.test_case.len() < config.search.chromosome_length {
            if factory.insert_random_statement(&mut self.test_case, rng).is_some() {
                changed = true;
            }
            exponent += 1;
        }
        changed
    }
}
