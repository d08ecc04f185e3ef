//! # Search Test Suite
//!
//! End-to-end runs of the many-objective search and the generator on the
//! fixture modules, with short budgets.

mod common;

use common::{artificial_none, bank, call_with, quick_config};
use covolve::statistics::RuntimeVariable;
use covolve::{
    CodeRenderer, Configuration, CoverageMetric, GoalPool, InMemoryStatistics, LoadError, ManyObjectiveSearch,
    MetricValue, ModuleBuilder, ReturnCode, SeedProvider, StopReason, SubjectModule, TestCase, TestCaseExecutor,
    TestGenerator, TestSuiteChromosome, TypeTag, Value,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn bank_config() -> Configuration {
    let mut config = quick_config();
    config.execution.timeout_millis = 50;
    config
}

struct GreetSeeds;

impl SeedProvider for GreetSeeds {
    fn seed_test_cases(&self, module: &SubjectModule) -> Vec<TestCase> {
        vec![call_with(module, "greet", Value::Int(1)), TestCase::new()]
    }
}

#[derive(Default)]
struct CountingRenderer {
    rendered: Vec<usize>,
}

impl CodeRenderer for CountingRenderer {
    fn render(&mut self, _module: &SubjectModule, suite: &TestSuiteChromosome) -> Result<(), String> {
        self.rendered.push(suite.len());
        Ok(())
    }
}

struct FailingRenderer;

impl CodeRenderer for FailingRenderer {
    fn render(&mut self, module: &SubjectModule, _suite: &TestSuiteChromosome) -> Result<(), String> {
        Err(format!("cannot write tests for {}", module.name()))
    }
}

#[test]
fn test_search_covers_most_of_artificial_none() {
    let config = quick_config();
    let module = Arc::new(artificial_none());
    let goals = GoalPool::from_module(&module, &config.coverage_metrics).into_goals();
    let executor = TestCaseExecutor::new(Arc::clone(&module), &config);
    let search = ManyObjectiveSearch::new(&config, &executor, goals.clone()).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let mut result = search.generate_tests(Vec::new(), &mut rng);
    assert!(!result.suite.is_empty());
    assert!(result.coverage() > 0.5, "coverage {}", result.coverage());
    assert_eq!(result.covered_goals.len() + result.open_goals.len(), goals.len());
    assert!(result.iterations <= 15);
    assert!(result.executions >= config.search.population);
    assert_eq!(result.coverage_timeline.len(), result.iterations + 1);
    assert_eq!(result.fitness_history.len(), result.iterations + 1);
    assert!(result.fitness_history.windows(2).all(|pair| pair[1] <= pair[0]));
    assert!(result.suite.test_cases().iter().all(|test| test.test_case().is_valid()));

    let suite_coverage = result.suite.coverage(&goals, &executor);
    assert_eq!(suite_coverage, result.coverage());
}

#[test]
fn test_search_stops_when_all_goals_are_covered() {
    let mut config = quick_config();
    config.stopping.maximum_iterations = Some(1000);
    let module = Arc::new(artificial_none());
    let goals: Vec<_> = GoalPool::from_module(&module, &[CoverageMetric::Branch])
        .into_goals()
        .into_iter()
        .filter(|goal| matches!(goal, covolve::CoverageGoal::CodeObject { .. }))
        .collect();
    let executor = TestCaseExecutor::new(Arc::clone(&module), &config);
    let search = ManyObjectiveSearch::new(&config, &executor, goals).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    let result = search.generate_tests(Vec::new(), &mut rng);
    assert_eq!(result.stop_reason, StopReason::AllGoalsCovered);
    assert!(result.open_goals.is_empty());
    assert!(result.suite.len() <= 2);
}

#[test]
fn test_cancelled_search_returns_initial_archive() {
    let config = quick_config();
    let module = Arc::new(artificial_none());
    let goals = GoalPool::from_module(&module, &config.coverage_metrics).into_goals();
    let executor = TestCaseExecutor::new(Arc::clone(&module), &config);
    let search = ManyObjectiveSearch::new(&config, &executor, goals).unwrap();
    search.cancellation_flag().store(true, Ordering::SeqCst);
    let mut rng = ChaCha8Rng::seed_from_u64(1);

    let result = search.generate_tests(Vec::new(), &mut rng);
    assert_eq!(result.stop_reason, StopReason::Cancelled);
    assert_eq!(result.iterations, 0);
    assert_eq!(result.executions, config.search.population);
}

#[test]
fn test_same_seed_gives_same_suite() {
    let mut config = quick_config();
    config.search.worker_threads = 1;
    config.stopping.maximum_iterations = Some(5);
    let run = |config: &Configuration| {
        let module = Arc::new(artificial_none());
        let goals = GoalPool::from_module(&module, &config.coverage_metrics).into_goals();
        let executor = TestCaseExecutor::new(module, config);
        let search = ManyObjectiveSearch::new(config, &executor, goals).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let result = search.generate_tests(Vec::new(), &mut rng);
        result
            .suite
            .test_cases()
            .iter()
            .map(|test| test.test_case().clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(run(&config), run(&config));
}

#[test]
fn test_generator_reports_statistics() {
    let provider = || -> Result<SubjectModule, LoadError> { Ok(bank()) };
    let mut statistics = InMemoryStatistics::new();
    let mut renderer = CountingRenderer::default();
    let code = TestGenerator::new(bank_config(), &provider)
        .with_seeds(&GreetSeeds)
        .with_renderer(&mut renderer)
        .with_statistics(&mut statistics)
        .run();

    assert_eq!(code, ReturnCode::Ok);
    assert_eq!(renderer.rendered.len(), 1);
    assert_eq!(statistics.get(RuntimeVariable::TargetModule), Some(&MetricValue::Text("bank".into())));
    assert_eq!(statistics.get(RuntimeVariable::Predicates), Some(&MetricValue::Integer(3)));
    assert_eq!(
        statistics.get(RuntimeVariable::Size),
        Some(&MetricValue::Integer(renderer.rendered[0] as u64))
    );
    match statistics.get(RuntimeVariable::Coverage) {
        Some(MetricValue::Float(coverage)) => assert!(*coverage > 0.0 && *coverage <= 1.0),
        other => panic!("unexpected coverage {:?}", other),
    }

    let json: serde_json::Value = serde_json::from_str(&statistics.to_json().unwrap()).unwrap();
    assert_eq!(json["RandomSeed"], 42);
    assert!(json["CoverageTimeline"].is_array());
    assert!(json["StopReason"].is_string());
}

#[test]
fn test_generator_learns_parameter_types() {
    let provider = || -> Result<SubjectModule, LoadError> { Ok(bank()) };
    let mut generator = TestGenerator::new(bank_config(), &provider).with_seeds(&GreetSeeds);
    let outcome = generator.generate().unwrap();

    let module = bank();
    let greet = module.callable_by_name("greet").unwrap().id;
    let inference = &outcome.search.type_inference;
    assert!(inference.knowledge_for(greet, 0).is_some());
    assert_eq!(inference.candidate_types(greet, 0).first(), Some(&TypeTag::Str));
}

#[test]
fn test_generator_setup_failures() {
    let empty = || ModuleBuilder::new("empty").build();
    assert_eq!(TestGenerator::new(quick_config(), &empty).run(), ReturnCode::SetupFailed);

    let missing = || -> Result<SubjectModule, LoadError> {
        Err(LoadError::Unavailable {
            module: "missing".into(),
            reason: "no such module".into(),
        })
    };
    assert_eq!(TestGenerator::new(quick_config(), &missing).run(), ReturnCode::SetupFailed);

    let mut invalid = quick_config();
    invalid.search.population = 0;
    let provider = || -> Result<SubjectModule, LoadError> { Ok(artificial_none()) };
    assert_eq!(TestGenerator::new(invalid, &provider).run(), ReturnCode::SetupFailed);
}

#[test]
fn test_render_failure_keeps_suite_and_statistics() {
    let provider = || -> Result<SubjectModule, LoadError> { Ok(artificial_none()) };
    let mut renderer = FailingRenderer;
    let mut statistics = InMemoryStatistics::new();
    let mut generator = TestGenerator::new(quick_config(), &provider)
        .with_renderer(&mut renderer)
        .with_statistics(&mut statistics);
    let outcome = generator.generate().unwrap();

    assert!(!outcome.search.suite.is_empty());
    assert!(outcome.render_error.unwrap().contains("artificial_none"));
    assert_eq!(
        statistics.get(RuntimeVariable::TargetModule),
        Some(&MetricValue::Text("artificial_none".into()))
    );
    assert!(statistics.get(RuntimeVariable::Coverage).is_some());

    let provider = || -> Result<SubjectModule, LoadError> { Ok(artificial_none()) };
    let mut renderer = FailingRenderer;
    let code = TestGenerator::new(quick_config(), &provider).with_renderer(&mut renderer).run();
    assert_eq!(code, ReturnCode::Ok);
}
