//! Top-level orchestration of a generation run
//!
//! [`TestGenerator`] loads the module under test, derives the coverage goals,
//! runs the many-objective search and hands the resulting suite to the
//! renderer and the figures to the statistics sink. Only setup problems are
//! fatal; everything that happens during the search or while rendering is
//! reported as data.

use crate::config::{ConfigError, Configuration};
use crate::execution::TestCaseExecutor;
use crate::ga::{CoverageGoal, GoalPool, ManyObjectiveSearch, SearchResult, TestSuiteChromosome};
use crate::statistics::{RuntimeVariable, StatisticsSink};
use crate::subject::{LoadError, SubjectModule, SubjectProvider};
use crate::testcase::TestCase;
use log::{info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("failed to load the module under test: {0}")]
    TargetLoad(#[from] LoadError),

    #[error("module {0} offers no callable to test")]
    EmptyTestCluster(String),

    #[error("could not start the evaluation workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Exit status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Ok = 0,
    SetupFailed = 1,
    NoTestsGenerated = 2,
}

/// Supplies initial test cases for the first population
pub trait SeedProvider {
    fn seed_test_cases(&self, module: &SubjectModule) -> Vec<TestCase>;
}

/// Turns the final suite into test source code
pub trait CodeRenderer {
    fn render(&mut self, module: &SubjectModule, suite: &TestSuiteChromosome) -> Result<(), String>;
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub search: SearchResult,
    pub goals: Vec<CoverageGoal>,
    /// Set when the renderer rejected the suite; the suite and statistics are kept
    pub render_error: Option<String>,
}

pub struct TestGenerator<'a> {
    config: Configuration,
    provider: &'a dyn SubjectProvider,
    seeds: Option<&'a dyn SeedProvider>,
    renderer: Option<&'a mut dyn CodeRenderer>,
    statistics: Option<&'a mut dyn StatisticsSink>,
    cancelled: Arc<AtomicBool>,
}

impl<'a> TestGenerator<'a> {
    pub fn new(config: Configuration, provider: &'a dyn SubjectProvider) -> Self {
        Self {
            config,
            provider,
            seeds: None,
            renderer: None,
            statistics: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_seeds(mut self, seeds: &'a dyn SeedProvider) -> Self {
        self.seeds = Some(seeds);
        self
    }

    pub fn with_renderer(mut self, renderer: &'a mut dyn CodeRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_statistics(mut self, statistics: &'a mut dyn StatisticsSink) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Setting the flag stops the search at the next generation boundary
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Run and map the outcome to a return code
    pub fn run(&mut self) -> ReturnCode {
        match self.generate() {
            Ok(outcome) if outcome.search.suite.is_empty() => {
                warn!("no test case was generated");
                ReturnCode::NoTestsGenerated
            }
            Ok(_) => ReturnCode::Ok,
            Err(err) => {
                warn!("test generation failed: {}", err);
                ReturnCode::SetupFailed
            }
        }
    }

    pub fn generate(&mut self) -> Result<GenerationOutcome, GenerationError> {
        let started = Instant::now();
        self.config.validate()?;
        let module = Arc::new(self.provider.load()?);
        if module.callables().is_empty() {
            return Err(GenerationError::EmptyTestCluster(module.name().to_string()));
        }
        let properties = module.properties();
        info!(
            "loaded {}: {} code objects, {} predicates, {} lines, {} callables",
            module.name(),
            properties.code_objects,
            properties.predicates,
            properties.lines,
            properties.callables
        );

        let goals = GoalPool::from_module(&module, &self.config.coverage_metrics).into_goals();
        let executor = TestCaseExecutor::new(Arc::clone(&module), &self.config);
        let seeds = self
            .seeds
            .map(|provider| provider.seed_test_cases(&module))
            .unwrap_or_default();

        let search_started = Instant::now();
        let search = ManyObjectiveSearch::new(&self.config, &executor, goals.clone())?
            .with_cancellation(Arc::clone(&self.cancelled));
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut result = search.generate_tests(seeds, &mut rng);
        let search_time = search_started.elapsed();

        if let Some(sink) = self.statistics.as_deref_mut() {
            let coverage = result.suite.coverage(&goals, &executor);
            let branch_goals: Vec<CoverageGoal> = goals.iter().copied().filter(CoverageGoal::is_branch).collect();
            let line_goals: Vec<CoverageGoal> = goals.iter().copied().filter(CoverageGoal::is_line).collect();
            let branch_coverage = covered_fraction(&branch_goals, &result);
            let line_coverage = covered_fraction(&line_goals, &result);

            sink.track_output_variable(RuntimeVariable::TargetModule, module.name().into());
            sink.track_output_variable(RuntimeVariable::RandomSeed, self.config.seed.into());
            sink.track_output_variable(RuntimeVariable::CodeObjects, properties.code_objects.into());
            sink.track_output_variable(RuntimeVariable::Predicates, properties.predicates.into());
            sink.track_output_variable(RuntimeVariable::Lines, properties.lines.into());
            sink.track_output_variable(RuntimeVariable::Goals, goals.len().into());
            sink.track_output_variable(RuntimeVariable::CoveredGoals, result.covered_goals.len().into());
            sink.track_output_variable(RuntimeVariable::Coverage, coverage.into());
            sink.track_output_variable(RuntimeVariable::BranchCoverage, branch_coverage.into());
            sink.track_output_variable(RuntimeVariable::LineCoverage, line_coverage.into());
            sink.track_output_variable(RuntimeVariable::Iterations, result.iterations.into());
            sink.track_output_variable(RuntimeVariable::TestExecutions, result.executions.into());
            sink.track_output_variable(RuntimeVariable::Timeouts, result.timeouts.into());
            sink.track_output_variable(RuntimeVariable::Size, result.suite.len().into());
            sink.track_output_variable(RuntimeVariable::Length, result.suite.total_length().into());
            sink.track_output_variable(
                RuntimeVariable::CoverageTimeline,
                result
                    .coverage_timeline
                    .iter()
                    .map(|point| point.coverage)
                    .collect::<Vec<f64>>()
                    .into(),
            );
            sink.track_output_variable(RuntimeVariable::FitnessHistory, result.fitness_history.clone().into());
            sink.track_output_variable(RuntimeVariable::StopReason, result.stop_reason.to_string().into());
            sink.track_output_variable(RuntimeVariable::InferredParameters, result.type_inference.len().into());
            sink.track_output_variable(RuntimeVariable::SearchTime, millis(search_time).into());
            sink.track_output_variable(RuntimeVariable::TotalTime, millis(started.elapsed()).into());
        }

        info!(
            "generated {} test cases covering {}/{} goals",
            result.suite.len(),
            result.covered_goals.len(),
            goals.len()
        );

        let render_error = self
            .renderer
            .as_deref_mut()
            .and_then(|renderer| renderer.render(&module, &result.suite).err());
        if let Some(err) = &render_error {
            warn!("could not render the test suite for {}: {}", module.name(), err);
        }
        Ok(GenerationOutcome {
            search: result,
            goals,
            render_error,
        })
    }
}

fn covered_fraction(goals: &[CoverageGoal], result: &SearchResult) -> f64 {
    if goals.is_empty() {
        return 1.0;
    }
    let covered = goals.iter().filter(|goal| result.covered_goals.contains(goal)).count();
    covered as f64 / goals.len() as f64
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
