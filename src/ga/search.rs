//! Many-objective search driver
//!
//! One run is a sequence of generations. Each generation breeds offspring
//! from the ranked population, evaluates them on the worker pool, updates the
//! archive and keeps the best chromosomes by preference sorting and crowding
//! distance. Evaluation is the only parallel step; everything that touches
//! shared state (the archive, the type inference model and the constant pool)
//! happens on the driving thread after the pool has finished.

use super::archive::CoverageArchive;
use super::chromosome::TestCaseChromosome;
use super::fitness::{FitnessFunction, GoalFitness};
use super::goals::CoverageGoal;
use super::inference::TypeInference;
use super::operators::{
    crowding_distance, preference_sorting, RankSelection, SelectionFunction, SinglePointRelativeCrossOver,
    TournamentSelection,
};
use super::stopping::{StopReason, StoppingCondition};
use super::suite::TestSuiteChromosome;
use crate::config::{Configuration, Selection};
use crate::execution::TestCaseExecutor;
use crate::testcase::{ConstantPool, TestCase, TestFactory};
use log::{debug, info};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Coverage reached after some time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoveragePoint {
    pub elapsed_millis: u64,
    pub coverage: f64,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub suite: TestSuiteChromosome,
    pub covered_goals: Vec<CoverageGoal>,
    pub open_goals: Vec<CoverageGoal>,
    pub iterations: usize,
    pub executions: usize,
    pub timeouts: usize,
    pub coverage_timeline: Vec<CoveragePoint>,
    /// Sum of the best fitness per goal, after every generation
    pub fitness_history: Vec<f64>,
    pub stop_reason: StopReason,
    pub type_inference: TypeInference,
}

impl SearchResult {
    pub fn coverage(&self) -> f64 {
        let total = self.covered_goals.len() + self.open_goals.len();
        if total == 0 {
            1.0
        } else {
            self.covered_goals.len() as f64 / total as f64
        }
    }
}

pub struct ManyObjectiveSearch<'a> {
    config: &'a Configuration,
    executor: &'a TestCaseExecutor,
    goals: Vec<CoverageGoal>,
    /// One minimised objective per goal, in goal order
    fitness_functions: Vec<Box<dyn FitnessFunction>>,
    cancelled: Arc<AtomicBool>,
    pool: ThreadPool,
}

impl<'a> ManyObjectiveSearch<'a> {
    pub fn new(
        config: &'a Configuration,
        executor: &'a TestCaseExecutor,
        goals: Vec<CoverageGoal>,
    ) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.search.worker_threads)
            .thread_name(|index| format!("covolve-eval-{}", index))
            .build()?;
        let fitness_functions = goals
            .iter()
            .map(|goal| Box::new(GoalFitness::new(*goal)) as Box<dyn FitnessFunction>)
            .collect();
        Ok(Self {
            config,
            executor,
            goals,
            fitness_functions,
            cancelled: Arc::new(AtomicBool::new(false)),
            pool,
        })
    }

    /// Stop at the next generation boundary once `flag` is set
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn generate_tests(&self, seeds: Vec<TestCase>, rng: &mut ChaCha8Rng) -> SearchResult {
        let stopping = StoppingCondition::new(&self.config.stopping, Arc::clone(&self.cancelled));
        let mut archive = CoverageArchive::new(self.goals.clone());
        let mut inference = TypeInference::new();
        let mut constants = ConstantPool::new(self.config.seeding.max_dynamic_pool_size);
        let population_size = self.config.search.population;
        let executions_before = self.executor.execution_count();
        let mut timeouts = 0;

        info!(
            "searching {} goals of {} with a population of {}",
            self.goals.len(),
            self.executor.module().name(),
            population_size
        );

        let mut population: Vec<TestCaseChromosome> = seeds
            .into_iter()
            .filter(|test| !test.is_empty())
            .take(population_size)
            .map(TestCaseChromosome::new)
            .collect();
        if !population.is_empty() {
            debug!("starting from {} seeded test cases", population.len());
        }
        {
            let factory = TestFactory::new(self.executor.module(), self.config, &inference, &constants);
            while population.len() < population_size {
                population.push(TestCaseChromosome::new(factory.random_test_case(rng)));
            }
        }
        timeouts += self.evaluate(&mut population, &mut inference, &mut constants);
        archive.update(&mut population, self.executor);
        let mut population = self.select_survivors(population, &archive, population_size);

        let mut iterations = 0;
        let mut coverage_timeline = vec![self.coverage_point(&stopping, &archive)];
        let mut fitness_history = vec![self.total_best_fitness(&archive)];

        let stop_reason = loop {
            let executions = self.executor.execution_count() - executions_before;
            if let Some(reason) = stopping.check(iterations, executions, archive.open_goals().len()) {
                break reason;
            }

            let mut offspring = self.breed(&population, &inference, &constants, rng);
            timeouts += self.evaluate(&mut offspring, &mut inference, &mut constants);
            let newly_covered = archive.update(&mut offspring, self.executor);

            population.extend(offspring);
            population = self.select_survivors(population, &archive, population_size);
            iterations += 1;
            coverage_timeline.push(self.coverage_point(&stopping, &archive));
            fitness_history.push(self.total_best_fitness(&archive));
            debug!(
                "generation {}: {} newly covered, coverage {:.3}, {} open goals",
                iterations,
                newly_covered,
                archive.coverage(),
                archive.open_goals().len()
            );
        };

        let mut suite = TestSuiteChromosome::new();
        for chromosome in archive.best_per_goal() {
            suite.add(chromosome);
        }
        let executions = self.executor.execution_count() - executions_before;
        info!(
            "search stopped after {} generations and {} executions: {}; coverage {:.3}",
            iterations,
            executions,
            stop_reason,
            archive.coverage()
        );

        SearchResult {
            suite,
            covered_goals: archive.covered_goals(),
            open_goals: archive.open_goals(),
            iterations,
            executions,
            timeouts,
            coverage_timeline,
            fitness_history,
            stop_reason,
            type_inference: inference,
        }
    }

    /// Run every chromosome without a cached result on the worker pool and
    /// score it against all goals, then fold new type knowledge and constants
    /// into the shared models. Returns the number of timed out executions.
    fn evaluate(
        &self,
        population: &mut [TestCaseChromosome],
        inference: &mut TypeInference,
        constants: &mut ConstantPool,
    ) -> usize {
        let executor = self.executor;
        let functions = &self.fitness_functions;
        let executed: Vec<bool> = self.pool.install(|| {
            population
                .par_iter_mut()
                .map(|chromosome| {
                    let executed = chromosome.execute(executor);
                    for function in functions {
                        function.compute_fitness(chromosome, executor);
                    }
                    executed
                })
                .collect()
        });

        let mut timeouts = 0;
        for (chromosome, executed) in population.iter().zip(executed) {
            if !executed {
                continue;
            }
            if let Some(result) = chromosome.execution_result() {
                if result.timeout {
                    timeouts += 1;
                }
                inference.record_all(&result.proxy_knowledge);
                if self.config.seeding.dynamic_constant_seeding {
                    constants.extend(result.trace.observed_constants.iter().cloned());
                }
            }
        }
        timeouts
    }

    fn breed(
        &self,
        population: &[TestCaseChromosome],
        inference: &TypeInference,
        constants: &ConstantPool,
        rng: &mut ChaCha8Rng,
    ) -> Vec<TestCaseChromosome> {
        let factory = TestFactory::new(self.executor.module(), self.config, inference, constants);
        let crossover = SinglePointRelativeCrossOver::new(self.config.search.chromosome_length);
        let target = population.len();
        let mut offspring = Vec::with_capacity(target);
        let mut attempts = 0;
        while offspring.len() < target && attempts < target * 10 {
            attempts += 1;
            let mut child1 = self.select_parent(population, rng);
            let mut child2 = self.select_parent(population, rng);
            if rng.gen_bool(self.config.search.crossover_rate) {
                crossover.cross_over(&mut child1, &mut child2, rng);
            }
            for mut child in [child1, child2] {
                child.mutate(&factory, self.config, rng);
                if !child.is_empty() && offspring.len() < target {
                    offspring.push(child);
                }
            }
        }
        offspring
    }

    /// A fresh chromosome holding a copy of a selected parent's test case
    fn select_parent(&self, population: &[TestCaseChromosome], rng: &mut ChaCha8Rng) -> TestCaseChromosome {
        let search = &self.config.search;
        let parent = match search.selection {
            Selection::Rank => RankSelection::new(search.rank_bias).select(population, rng),
            Selection::Tournament => TournamentSelection::new(search.tournament_size).select(population, rng),
        };
        parent
            .map(|parent| TestCaseChromosome::new(parent.test_case().clone()))
            .unwrap_or_default()
    }

    /// Rank by preference sorting over the open goals, break ties within a
    /// front by crowding distance, and keep the best `size`
    fn select_survivors(
        &self,
        mut union: Vec<TestCaseChromosome>,
        archive: &CoverageArchive,
        size: usize,
    ) -> Vec<TestCaseChromosome> {
        let open = archive.open_goals();
        let objectives: Vec<&dyn FitnessFunction> = self
            .fitness_functions
            .iter()
            .filter(|function| function.goal().map_or(false, |goal| open.contains(goal)))
            .map(|function| function.as_ref())
            .collect();
        let executor = self.executor;
        let fitness: Vec<Vec<f64>> = union
            .iter_mut()
            .map(|chromosome| {
                objectives
                    .iter()
                    .map(|function| function.compute_fitness(chromosome, executor))
                    .collect()
            })
            .collect();
        let lengths: Vec<usize> = union.iter().map(TestCaseChromosome::len).collect();

        let mut order = Vec::with_capacity(union.len());
        for front in preference_sorting(&fitness, &lengths) {
            let distances = crowding_distance(&fitness, &front);
            let mut ranked: Vec<(usize, f64)> = front.into_iter().zip(distances).collect();
            ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
            order.extend(ranked.into_iter().map(|(index, _)| index));
            if order.len() >= size {
                break;
            }
        }

        let mut slots: Vec<Option<TestCaseChromosome>> = union.drain(..).map(Some).collect();
        order
            .into_iter()
            .take(size)
            .filter_map(|index| slots.get_mut(index).and_then(Option::take))
            .collect()
    }

    fn coverage_point(&self, stopping: &StoppingCondition, archive: &CoverageArchive) -> CoveragePoint {
        CoveragePoint {
            elapsed_millis: u64::try_from(stopping.elapsed().as_millis()).unwrap_or(u64::MAX),
            coverage: archive.coverage(),
        }
    }

    fn total_best_fitness(&self, archive: &CoverageArchive) -> f64 {
        archive
            .goals()
            .iter()
            .filter_map(|goal| archive.best_fitness(goal))
            .sum()
    }
}
