//! Coverage goals and control-flow distances
//!
//! Goals are derived once from the module under test and never change. The
//! distance of an execution to a goal combines the approach level, the number
//! of control dependencies between the goal and the closest predicate that was
//! evaluated, with the branch distance of that predicate towards the arm the
//! goal needs.

use crate::config::CoverageMetric;
use crate::execution::{normalise, ExecutionResult, ExecutionTrace};
use crate::subject::{ControlDependency, SubjectModule};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CoverageGoal {
    /// Reach a code object that contains no predicate
    CodeObject { code_object_id: usize },
    /// Take one arm of a predicate
    Branch { predicate_id: usize, value: bool },
    /// Execute a line
    Line { line_id: usize },
}

impl CoverageGoal {
    /// Whether the execution behind `result` satisfies the goal
    pub fn is_covered(&self, result: &ExecutionResult) -> bool {
        if result.timeout {
            return false;
        }
        let trace = &result.trace;
        match *self {
            CoverageGoal::CodeObject { code_object_id } => trace.executed_code_objects.contains(&code_object_id),
            CoverageGoal::Branch { predicate_id, value } => trace.branch_distance(predicate_id, value) == Some(0.0),
            CoverageGoal::Line { line_id } => trace.covered_lines.contains(&line_id),
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, CoverageGoal::Branch { .. } | CoverageGoal::CodeObject { .. })
    }

    pub fn is_line(&self) -> bool {
        matches!(self, CoverageGoal::Line { .. })
    }
}

impl fmt::Display for CoverageGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoverageGoal::CodeObject { code_object_id } => write!(f, "code object {}", code_object_id),
            CoverageGoal::Branch { predicate_id, value } => {
                write!(f, "predicate {} ({})", predicate_id, if *value { "True" } else { "False" })
            }
            CoverageGoal::Line { line_id } => write!(f, "line {}", line_id),
        }
    }
}

/// Every goal of a run, in a stable order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoalPool {
    goals: Vec<CoverageGoal>,
}

impl GoalPool {
    pub fn from_module(module: &SubjectModule, metrics: &[CoverageMetric]) -> Self {
        let metrics: BTreeSet<CoverageMetric> = metrics.iter().copied().collect();
        let mut goals = Vec::new();
        if metrics.contains(&CoverageMetric::Branch) {
            for code_object_id in module.branchless_code_objects() {
                goals.push(CoverageGoal::CodeObject { code_object_id });
            }
            for predicate in module.predicates() {
                goals.push(CoverageGoal::Branch {
                    predicate_id: predicate.id,
                    value: true,
                });
                goals.push(CoverageGoal::Branch {
                    predicate_id: predicate.id,
                    value: false,
                });
            }
        }
        if metrics.contains(&CoverageMetric::Line) {
            for line in module.lines() {
                goals.push(CoverageGoal::Line { line_id: line.id });
            }
        }
        Self { goals }
    }

    pub fn goals(&self) -> &[CoverageGoal] {
        &self.goals
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn into_goals(self) -> Vec<CoverageGoal> {
        self.goals
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlFlowDistance {
    pub approach_level: usize,
    pub branch_distance: f64,
}

impl ControlFlowDistance {
    pub const COVERED: ControlFlowDistance = ControlFlowDistance {
        approach_level: 0,
        branch_distance: 0.0,
    };

    /// Distance strictly worse than any distance of a finished execution
    pub fn worst(module: &SubjectModule) -> Self {
        Self {
            approach_level: module.predicates().len() + 2,
            branch_distance: f64::INFINITY,
        }
    }

    /// `approach_level + normalise(branch_distance)`
    pub fn resulting_fitness(&self) -> f64 {
        self.approach_level as f64 + normalise(self.branch_distance)
    }
}

/// Distance of `result` to `goal`; zero exactly when the goal is covered
pub fn calculate_control_flow_distance(
    goal: &CoverageGoal,
    result: &ExecutionResult,
    module: &SubjectModule,
) -> ControlFlowDistance {
    if result.timeout {
        return ControlFlowDistance::worst(module);
    }
    let trace = &result.trace;
    match *goal {
        CoverageGoal::CodeObject { code_object_id } => {
            if trace.executed_code_objects.contains(&code_object_id) {
                ControlFlowDistance::COVERED
            } else {
                ControlFlowDistance {
                    approach_level: 1,
                    branch_distance: 0.0,
                }
            }
        }
        CoverageGoal::Branch { predicate_id, value } => {
            let predicate = match module.predicate(predicate_id) {
                Some(predicate) => predicate,
                None => return ControlFlowDistance::worst(module),
            };
            if let Some(distance) = trace.branch_distance(predicate_id, value) {
                return ControlFlowDistance {
                    approach_level: 0,
                    branch_distance: distance,
                };
            }
            distance_through_dependencies(&predicate.dependencies, predicate.code_object_id, trace, module)
        }
        CoverageGoal::Line { line_id } => {
            if trace.covered_lines.contains(&line_id) {
                return ControlFlowDistance::COVERED;
            }
            match module.line(line_id) {
                Some(line) => distance_through_dependencies(&line.dependencies, line.code_object_id, trace, module),
                None => ControlFlowDistance::worst(module),
            }
        }
    }
}

/// Walk the control dependencies outwards, one level at a time, until an
/// evaluated predicate is found
fn distance_through_dependencies(
    dependencies: &[ControlDependency],
    code_object_id: usize,
    trace: &ExecutionTrace,
    module: &SubjectModule,
) -> ControlFlowDistance {
    let mut level = 1;
    let mut frontier: Vec<ControlDependency> = dependencies.to_vec();
    let mut visited: BTreeSet<ControlDependency> = BTreeSet::new();
    while !frontier.is_empty() {
        let closest = frontier
            .iter()
            .filter_map(|dependency| trace.branch_distance(dependency.predicate_id, dependency.branch_value))
            .fold(None, |best: Option<f64>, distance| {
                Some(best.map_or(distance, |best| best.min(distance)))
            });
        if let Some(branch_distance) = closest {
            return ControlFlowDistance {
                approach_level: level,
                branch_distance,
            };
        }
        let mut next = Vec::new();
        for dependency in frontier {
            if !visited.insert(dependency) {
                continue;
            }
            if let Some(predicate) = module.predicate(dependency.predicate_id) {
                next.extend(predicate.dependencies.iter().copied());
            }
        }
        frontier = next;
        level += 1;
    }
    let unreached = usize::from(!trace.executed_code_objects.contains(&code_object_id));
    ControlFlowDistance {
        approach_level: level + unreached,
        branch_distance: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::ModuleBuilder;
    use crate::typetracing::Operand;
    use crate::value::Value;

    /// Nested `if a: if b: ...` with a line under the inner arm
    fn nested() -> SubjectModule {
        let mut builder = ModuleBuilder::new("nested");
        let code = builder.code_object("f", None);
        let outer = builder.predicate(code, 2, &[]);
        let inner = builder.predicate(code, 3, &[(outer, true)]);
        builder.line(code, 4, &[(inner, true)]);
        builder.function("f", code, vec![], None, |_, _| Ok(Operand::Value(Value::None)));
        builder.build().unwrap()
    }

    fn result(trace: ExecutionTrace) -> ExecutionResult {
        ExecutionResult {
            trace,
            ..ExecutionResult::default()
        }
    }

    #[test]
    fn test_goal_pool_per_metric() {
        let module = nested();
        assert_eq!(GoalPool::from_module(&module, &[CoverageMetric::Branch]).len(), 4);
        assert_eq!(GoalPool::from_module(&module, &[CoverageMetric::Line]).len(), 1);
        assert_eq!(
            GoalPool::from_module(&module, &[CoverageMetric::Branch, CoverageMetric::Line]).len(),
            5
        );
    }

    #[test]
    fn test_approach_level_counts_missed_dependencies() {
        let module = nested();
        let mut trace = ExecutionTrace::new();
        trace.executed_code_object(0);
        trace.passed_bool_predicate(0, &Value::Bool(false));
        let result = result(trace);

        let inner = CoverageGoal::Branch {
            predicate_id: 1,
            value: true,
        };
        let distance = calculate_control_flow_distance(&inner, &result, &module);
        assert_eq!(distance.approach_level, 1);
        assert_eq!(distance.branch_distance, 1.0);

        let line = CoverageGoal::Line { line_id: 0 };
        let distance = calculate_control_flow_distance(&line, &result, &module);
        assert_eq!(distance.approach_level, 2);
        assert!(distance.resulting_fitness() > 2.0);
    }

    #[test]
    fn test_unreached_code_object_adds_a_level() {
        let module = nested();
        let result = result(ExecutionTrace::new());
        let outer = CoverageGoal::Branch {
            predicate_id: 0,
            value: true,
        };
        assert_eq!(calculate_control_flow_distance(&outer, &result, &module).approach_level, 2);
    }

    #[test]
    fn test_timeout_is_worse_than_anything() {
        let module = nested();
        let mut timed_out = ExecutionResult::timed_out();
        timed_out.trace.executed_code_object(0);
        let goal = CoverageGoal::CodeObject { code_object_id: 0 };
        let worst = calculate_control_flow_distance(&goal, &timed_out, &module).resulting_fitness();
        let unreached = calculate_control_flow_distance(
            &CoverageGoal::Line { line_id: 0 },
            &result(ExecutionTrace::new()),
            &module,
        )
        .resulting_fitness();
        assert!(worst > unreached);
        assert!(!goal.is_covered(&timed_out));
    }
}
