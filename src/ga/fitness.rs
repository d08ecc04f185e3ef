//! Fitness functions
//!
//! All fitness functions here are minimised: 0.0 means the goal is covered.

use super::chromosome::TestCaseChromosome;
use super::goals::CoverageGoal;
use crate::execution::TestCaseExecutor;

/// Scores a test-case chromosome. Implementations only run the chromosome
/// when it has no valid cached execution.
pub trait FitnessFunction: Send + Sync {
    fn compute_fitness(&self, chromosome: &mut TestCaseChromosome, executor: &TestCaseExecutor) -> f64;

    fn is_maximisation_function(&self) -> bool {
        false
    }

    /// The goal scored by this function, if it targets a single one
    fn goal(&self) -> Option<&CoverageGoal>;
}

/// Approach level plus normalised branch distance towards one goal
#[derive(Debug, Clone, PartialEq)]
pub struct GoalFitness {
    goal: CoverageGoal,
}

impl GoalFitness {
    pub fn new(goal: CoverageGoal) -> Self {
        Self { goal }
    }
}

impl FitnessFunction for GoalFitness {
    fn compute_fitness(&self, chromosome: &mut TestCaseChromosome, executor: &TestCaseExecutor) -> f64 {
        chromosome.fitness_for(&self.goal, executor)
    }

    fn goal(&self) -> Option<&CoverageGoal> {
        Some(&self.goal)
    }
}
