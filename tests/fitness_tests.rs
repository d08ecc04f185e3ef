//! # Fitness Test Suite
//!
//! Goal derivation and control-flow distances on small instrumented modules,
//! checked through the public chromosome and fitness-function API.

mod common;

use common::{artificial_none, bank, call_with, predicates_of, quick_config};
use covolve::execution::normalise;
use covolve::ga::{calculate_control_flow_distance, ControlFlowDistance, GoalFitness};
use covolve::{
    CoverageGoal, CoverageMetric, FitnessFunction, GoalPool, SubjectModule, TestCaseChromosome, TestCaseExecutor, Value,
};
use proptest::prelude::*;
use std::sync::Arc;

fn executor_for(module: SubjectModule) -> TestCaseExecutor {
    let mut config = quick_config();
    config.execution.timeout_millis = 50;
    TestCaseExecutor::new(Arc::new(module), &config)
}

fn branch(predicate_id: usize, value: bool) -> CoverageGoal {
    CoverageGoal::Branch { predicate_id, value }
}

fn code_object_of(module: &SubjectModule, callable: &str) -> usize {
    module.callable_by_name(callable).unwrap().code_object_id
}

fn line_at(module: &SubjectModule, line_number: u32) -> usize {
    module.lines().iter().find(|line| line.line_number == line_number).unwrap().id
}

#[test]
fn test_goal_pool_for_branch_coverage() {
    let module = artificial_none();
    let pool = GoalPool::from_module(&module, &[CoverageMetric::Branch]);
    let code_objects = pool
        .goals()
        .iter()
        .filter(|goal| matches!(goal, CoverageGoal::CodeObject { .. }))
        .count();
    assert_eq!(code_objects, 2);
    assert_eq!(pool.len(), 2 + 2 * module.predicates().len());
    assert!(pool.goals().iter().all(CoverageGoal::is_branch));
}

#[test]
fn test_goal_pool_with_line_coverage() {
    let module = artificial_none();
    let pool = GoalPool::from_module(&module, &[CoverageMetric::Branch, CoverageMetric::Line]);
    let lines = pool.goals().iter().filter(|goal| goal.is_line()).count();
    assert_eq!(lines, module.lines().len());
}

#[test]
fn test_branchless_function_is_covered_by_any_call() {
    let module = artificial_none();
    let explicit = CoverageGoal::CodeObject {
        code_object_id: code_object_of(&module, "explicit_return_none"),
    };
    let empty = CoverageGoal::CodeObject {
        code_object_id: code_object_of(&module, "empty_function"),
    };
    let test = call_with(&module, "explicit_return_none", Value::None);
    let executor = executor_for(module);

    let mut chromosome = TestCaseChromosome::new(test);
    assert_eq!(GoalFitness::new(explicit).compute_fitness(&mut chromosome, &executor), 0.0);
    assert_eq!(GoalFitness::new(empty).compute_fitness(&mut chromosome, &executor), 1.0);
    assert!(chromosome.is_covering(&explicit, &executor));
    assert!(!chromosome.is_covering(&empty, &executor));
}

#[test]
fn test_untaken_arm_of_boolean_predicate() {
    let module = artificial_none();
    let predicate = predicates_of(&module, "only_return_on_branch")[0].id;
    let return_line = line_at(&module, 21);
    let test = call_with(&module, "only_return_on_branch", Value::Int(0));
    let executor = executor_for(module);

    let mut chromosome = TestCaseChromosome::new(test);
    assert_eq!(chromosome.fitness_for(&branch(predicate, false), &executor), 0.0);
    assert_eq!(chromosome.fitness_for(&branch(predicate, true), &executor), normalise(1.0));
    let line = CoverageGoal::Line { line_id: return_line };
    assert_eq!(chromosome.fitness_for(&line, &executor), 1.0 + normalise(1.0));
}

#[test]
fn test_truthy_argument_covers_true_arm() {
    let module = artificial_none();
    let predicate = predicates_of(&module, "only_return_on_branch")[0].id;
    let test = call_with(&module, "only_return_on_branch", Value::Int(5));
    let executor = executor_for(module);

    let mut chromosome = TestCaseChromosome::new(test);
    assert_eq!(chromosome.fitness_for(&branch(predicate, true), &executor), 0.0);
    let false_arm = chromosome.fitness_for(&branch(predicate, false), &executor);
    assert!(false_arm > 0.0 && false_arm < 1.0);
}

#[test]
fn test_approach_level_through_control_dependency() {
    let module = bank();
    let predicates: Vec<usize> = predicates_of(&module, "deposit").iter().map(|p| p.id).collect();
    let (positive, vip) = (predicates[0], predicates[1]);
    let executor = executor_for(bank());

    let mut test = covolve::TestCase::new();
    let balance = test.add_statement(covolve::Statement::Primitive(Value::Int(10)));
    let account = test.add_statement(covolve::Statement::Constructor {
        callable: module.callable_by_name("Account").unwrap().id,
        class: "Account".into(),
        args: vec![balance],
    });
    let amount = test.add_statement(covolve::Statement::Primitive(Value::Int(-5)));
    test.add_statement(covolve::Statement::Method {
        callable: module.callable_by_name("Account.deposit").unwrap().id,
        callee: account,
        args: vec![amount],
        returns: Some(covolve::TypeTag::Str),
    });

    let mut chromosome = TestCaseChromosome::new(test);
    assert!(chromosome.execute(&executor));
    let result = chromosome.execution_result().unwrap();
    assert_eq!(result.executed_statements, 3);
    assert!(result.exceptions.contains_key(&3));

    assert_eq!(chromosome.fitness_for(&branch(positive, true), &executor), 0.0);
    let vip_fitness = chromosome.fitness_for(&branch(vip, true), &executor);
    assert!(vip_fitness > 1.0 && vip_fitness < 2.0, "{}", vip_fitness);
}

#[test]
fn test_unreached_code_object_adds_a_level() {
    let module = artificial_none();
    let predicate = predicates_of(&module, "return_on_both_branches")[0].id;
    let test = call_with(&module, "explicit_return_none", Value::None);
    let executor = executor_for(artificial_none());

    let mut chromosome = TestCaseChromosome::new(test);
    chromosome.execute(&executor);
    let distance =
        calculate_control_flow_distance(&branch(predicate, true), chromosome.execution_result().unwrap(), &module);
    assert_eq!(distance.approach_level, 2);
    assert_eq!(distance.branch_distance, 0.0);
}

#[test]
fn test_timeout_gives_worst_fitness() {
    let module = bank();
    let worst = ControlFlowDistance::worst(&module).resulting_fitness();
    let spin_line = line_at(&module, 22);
    let test = call_with(&module, "spin", Value::Int(1));
    let executor = executor_for(module);

    let mut chromosome = TestCaseChromosome::new(test);
    chromosome.execute(&executor);
    let result = chromosome.execution_result().unwrap();
    assert!(result.timeout);
    assert!(result.trace.covered_lines.contains(&spin_line));

    let line = CoverageGoal::Line { line_id: spin_line };
    assert!(!chromosome.is_covering(&line, &executor));
    assert_eq!(chromosome.fitness_for(&line, &executor), worst);
    assert!(worst > 5.0 && worst < 6.0);
}

#[test]
fn test_fitness_is_cached_until_the_test_changes() {
    let module = artificial_none();
    let predicate = predicates_of(&module, "only_return_on_branch")[0].id;
    let test = call_with(&module, "only_return_on_branch", Value::Int(0));
    let executor = executor_for(module);

    let mut chromosome = TestCaseChromosome::new(test);
    chromosome.fitness_for(&branch(predicate, true), &executor);
    chromosome.fitness_for(&branch(predicate, false), &executor);
    assert_eq!(executor.execution_count(), 1);
    assert_eq!(chromosome.cached_fitness().len(), 2);

    if let Some(covolve::Statement::Primitive(value)) = chromosome.test_case_mut().statement_mut(0) {
        *value = Value::Int(1);
    }
    assert!(!chromosome.has_valid_result());
    assert_eq!(chromosome.fitness_for(&branch(predicate, true), &executor), 0.0);
    assert_eq!(executor.execution_count(), 2);
}

proptest! {
    #[test]
    fn fitness_is_zero_exactly_when_covered(x in -50i64..50, both in any::<bool>()) {
        let module = artificial_none();
        let callable = if both { "return_on_both_branches" } else { "only_return_on_branch" };
        let goals = GoalPool::from_module(&module, &[CoverageMetric::Branch, CoverageMetric::Line]).into_goals();
        let test = call_with(&module, callable, Value::Int(x));
        let executor = executor_for(module);

        let mut chromosome = TestCaseChromosome::new(test);
        for goal in &goals {
            let fitness = chromosome.fitness_for(goal, &executor);
            prop_assert!(fitness >= 0.0);
            prop_assert_eq!(fitness == 0.0, chromosome.is_covering(goal, &executor), "{}", goal);
        }
    }
}
