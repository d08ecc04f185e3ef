//! Test-suite chromosomes

use super::chromosome::TestCaseChromosome;
use super::goals::CoverageGoal;
use crate::execution::TestCaseExecutor;

/// A set of test cases scored together. Coverage and fitness are cached per
/// goal set until membership or a member changes.
#[derive(Debug, Clone, Default)]
pub struct TestSuiteChromosome {
    test_cases: Vec<TestCaseChromosome>,
    coverage_cache: Option<(Vec<CoverageGoal>, f64)>,
    fitness_cache: Option<(Vec<CoverageGoal>, f64)>,
}

fn cached_for(cache: &Option<(Vec<CoverageGoal>, f64)>, goals: &[CoverageGoal]) -> Option<f64> {
    match cache {
        Some((cached_goals, value)) if cached_goals.as_slice() == goals => Some(*value),
        _ => None,
    }
}

impl TestSuiteChromosome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, test_case: TestCaseChromosome) {
        self.test_cases.push(test_case);
        self.invalidate_cache();
    }

    pub fn remove(&mut self, index: usize) -> Option<TestCaseChromosome> {
        if index >= self.test_cases.len() {
            return None;
        }
        self.invalidate_cache();
        Some(self.test_cases.remove(index))
    }

    pub fn test_cases(&self) -> &[TestCaseChromosome] {
        &self.test_cases
    }

    /// Mutable access to one member; drops the suite caches
    pub fn test_case_mut(&mut self, index: usize) -> Option<&mut TestCaseChromosome> {
        self.invalidate_cache();
        self.test_cases.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.test_cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.test_cases.is_empty()
    }

    /// Total number of statements over all test cases
    pub fn total_length(&self) -> usize {
        self.test_cases.iter().map(TestCaseChromosome::len).sum()
    }

    pub fn invalidate_cache(&mut self) {
        self.coverage_cache = None;
        self.fitness_cache = None;
    }

    /// Fraction of `goals` covered by at least one member
    pub fn coverage(&mut self, goals: &[CoverageGoal], executor: &TestCaseExecutor) -> f64 {
        if let Some(coverage) = cached_for(&self.coverage_cache, goals) {
            return coverage;
        }
        let coverage = if goals.is_empty() {
            1.0
        } else {
            let covered = goals
                .iter()
                .filter(|goal| self.test_cases.iter_mut().any(|test| test.fitness_for(goal, executor) == 0.0))
                .count();
            covered as f64 / goals.len() as f64
        };
        self.coverage_cache = Some((goals.to_vec(), coverage));
        coverage
    }

    /// Sum over `goals` of the best member fitness; 0.0 when all are covered
    pub fn fitness(&mut self, goals: &[CoverageGoal], executor: &TestCaseExecutor) -> f64 {
        if let Some(fitness) = cached_for(&self.fitness_cache, goals) {
            return fitness;
        }
        let fitness = goals
            .iter()
            .map(|goal| {
                self.test_cases
                    .iter_mut()
                    .map(|test| test.fitness_for(goal, executor))
                    .fold(f64::INFINITY, f64::min)
            })
            .sum();
        self.fitness_cache = Some((goals.to_vec(), fitness));
        fitness
    }
}
