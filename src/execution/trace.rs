//! Execution traces and branch distances
//!
//! An [`ExecutionTrace`] is filled by the instrumentation hooks while one test
//! case runs. For every predicate it keeps how often it was evaluated and the
//! smallest distance observed towards each of its two arms; the arm that was
//! taken always has distance 0 and the other arm a strictly positive one.

use crate::value::{CompareOp, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Distance of the untaken arm when no finer measure exists
pub const BOOL_PREDICATE_DISTANCE: f64 = 1.0;

/// Added to strict inequalities so that equal operands are still one step away
pub const STRICT_INEQUALITY_EPSILON: f64 = 1.0;

/// Upper bound on the number of predicate events kept per trace
pub const MAX_RECORDED_EVENTS: usize = 1024;

/// Upper bound on the number of distinct comparison constants kept per trace
pub const MAX_OBSERVED_CONSTANTS: usize = 1024;

/// Largest `f64` strictly below 1.0
const MAX_NORMALISED: f64 = 1.0 - f64::EPSILON / 2.0;

/// Map a distance in `[0, inf]` into `[0, 1)`, preserving order
pub fn normalise(distance: f64) -> f64 {
    if distance.is_nan() || distance.is_infinite() {
        return MAX_NORMALISED;
    }
    let distance = distance.max(0.0);
    (distance / (distance + 1.0)).min(MAX_NORMALISED)
}

/// One evaluation of an instrumented predicate
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateEvent {
    pub predicate_id: usize,
    /// `None` for boolean predicates
    pub operator: Option<CompareOp>,
    pub operands: Vec<Value>,
    pub outcome: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionTrace {
    pub executed_code_objects: BTreeSet<usize>,
    /// Predicate id to number of evaluations
    pub executed_predicates: BTreeMap<usize, usize>,
    pub true_distances: BTreeMap<usize, f64>,
    pub false_distances: BTreeMap<usize, f64>,
    pub covered_lines: BTreeSet<usize>,
    pub predicate_events: Vec<PredicateEvent>,
    /// Distinct primitive operands seen in comparisons
    pub observed_constants: Vec<Value>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed_code_object(&mut self, code_object_id: usize) {
        self.executed_code_objects.insert(code_object_id);
    }

    pub fn executed_line(&mut self, line_id: usize) {
        self.covered_lines.insert(line_id);
    }

    /// Record a comparison predicate whose evaluation gave `outcome`
    pub fn passed_cmp_predicate(&mut self, predicate_id: usize, lhs: &Value, op: CompareOp, rhs: &Value, outcome: bool) {
        let (true_distance, false_distance) = comparison_distances(lhs, op, rhs, outcome);
        self.update_predicate(predicate_id, outcome, true_distance, false_distance);
        for operand in [lhs, rhs] {
            if operand.type_tag().is_primitive() && !matches!(operand, Value::None) {
                self.observe_constant(operand);
            }
        }
        self.push_event(PredicateEvent {
            predicate_id,
            operator: Some(op),
            operands: vec![lhs.clone(), rhs.clone()],
            outcome,
        });
    }

    /// Record a predicate that tests the truthiness of `value`
    pub fn passed_bool_predicate(&mut self, predicate_id: usize, value: &Value) -> bool {
        let outcome = value.is_truthy();
        let false_distance = if outcome { truthiness_distance(value) } else { 0.0 };
        let true_distance = if outcome { 0.0 } else { BOOL_PREDICATE_DISTANCE };
        self.update_predicate(predicate_id, outcome, true_distance, false_distance);
        self.push_event(PredicateEvent {
            predicate_id,
            operator: None,
            operands: vec![value.clone()],
            outcome,
        });
        outcome
    }

    fn push_event(&mut self, event: PredicateEvent) {
        if self.predicate_events.len() < MAX_RECORDED_EVENTS {
            self.predicate_events.push(event);
        }
    }

    fn observe_constant(&mut self, value: &Value) {
        if self.observed_constants.len() < MAX_OBSERVED_CONSTANTS && !self.observed_constants.contains(value) {
            self.observed_constants.push(value.clone());
        }
    }

    fn update_predicate(&mut self, predicate_id: usize, outcome: bool, true_distance: f64, false_distance: f64) {
        let (true_distance, false_distance) = if outcome {
            (0.0, strictly_positive(false_distance))
        } else {
            (strictly_positive(true_distance), 0.0)
        };
        *self.executed_predicates.entry(predicate_id).or_insert(0) += 1;
        keep_minimum(&mut self.true_distances, predicate_id, true_distance);
        keep_minimum(&mut self.false_distances, predicate_id, false_distance);
    }

    pub fn was_executed(&self, predicate_id: usize) -> bool {
        self.executed_predicates.contains_key(&predicate_id)
    }

    /// Smallest distance observed towards the given arm of a predicate
    pub fn branch_distance(&self, predicate_id: usize, branch_value: bool) -> Option<f64> {
        let distances = if branch_value {
            &self.true_distances
        } else {
            &self.false_distances
        };
        distances.get(&predicate_id).copied()
    }

    /// Fold another trace into this one, as if both had run in sequence
    pub fn merge(&mut self, other: &ExecutionTrace) {
        self.executed_code_objects.extend(other.executed_code_objects.iter().copied());
        for (predicate_id, count) in &other.executed_predicates {
            *self.executed_predicates.entry(*predicate_id).or_insert(0) += count;
        }
        for (predicate_id, distance) in &other.true_distances {
            keep_minimum(&mut self.true_distances, *predicate_id, *distance);
        }
        for (predicate_id, distance) in &other.false_distances {
            keep_minimum(&mut self.false_distances, *predicate_id, *distance);
        }
        self.covered_lines.extend(other.covered_lines.iter().copied());
        for event in &other.predicate_events {
            self.push_event(event.clone());
        }
        for constant in &other.observed_constants {
            self.observe_constant(constant);
        }
    }
}

fn keep_minimum(distances: &mut BTreeMap<usize, f64>, predicate_id: usize, distance: f64) {
    distances
        .entry(predicate_id)
        .and_modify(|current| *current = current.min(distance))
        .or_insert(distance);
}

fn strictly_positive(distance: f64) -> f64 {
    if distance > 0.0 {
        distance
    } else {
        BOOL_PREDICATE_DISTANCE
    }
}

/// How far a truthy value is from being falsy
fn truthiness_distance(value: &Value) -> f64 {
    if value.is_numeric() {
        return value.as_f64().map_or(BOOL_PREDICATE_DISTANCE, f64::abs);
    }
    match value.len() {
        Ok(len) => len as f64,
        Err(_) => BOOL_PREDICATE_DISTANCE,
    }
}

/// Edit distance between two sequences
pub fn levenshtein<T: PartialEq>(left: &[T], right: &[T]) -> usize {
    if left.is_empty() {
        return right.len();
    }
    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0; right.len() + 1];
    for (i, l) in left.iter().enumerate() {
        current[0] = i + 1;
        for (j, r) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(l != r);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}

/// Distance between two values towards making them equal
fn equality_distance(lhs: &Value, rhs: &Value) -> f64 {
    if let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) {
        return (a - b).abs();
    }
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => {
            let a: Vec<char> = a.chars().collect();
            let b: Vec<char> = b.chars().collect();
            levenshtein(&a, &b) as f64
        }
        (Value::Bytes(a), Value::Bytes(b)) => levenshtein(a, b) as f64,
        _ if lhs.type_tag() == rhs.type_tag() => {
            if lhs.py_eq(rhs) {
                0.0
            } else {
                BOOL_PREDICATE_DISTANCE
            }
        }
        _ => f64::INFINITY,
    }
}

fn code_units<T: Copy + Into<u32>>(units: &[T]) -> Vec<f64> {
    units.iter().map(|unit| Into::<u32>::into(*unit) as f64).collect()
}

/// Signed measure of `lhs - rhs` used by ordering comparisons. Strings and
/// bytes compare their first differing position, or their lengths when one is
/// a prefix of the other.
fn ordering_difference(lhs: &Value, rhs: &Value) -> Option<f64> {
    if let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) {
        return Some(a - b);
    }
    let (a, b) = match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => {
            let a: Vec<char> = a.chars().collect();
            let b: Vec<char> = b.chars().collect();
            (code_units(&a), code_units(&b))
        }
        (Value::Bytes(a), Value::Bytes(b)) => (code_units(a), code_units(b)),
        _ => return None,
    };
    for (x, y) in a.iter().zip(&b) {
        if x != y {
            return Some(x - y);
        }
    }
    Some(a.len() as f64 - b.len() as f64)
}

/// Distances `(true arm, false arm)` of `lhs <op> rhs`.
/// Uses the outcome only where the operands offer no finer measure.
fn comparison_distances(lhs: &Value, op: CompareOp, rhs: &Value, outcome: bool) -> (f64, f64) {
    let by_outcome = if outcome {
        (0.0, BOOL_PREDICATE_DISTANCE)
    } else {
        (BOOL_PREDICATE_DISTANCE, 0.0)
    };
    let swap = |(t, f): (f64, f64)| (f, t);
    match op {
        CompareOp::Eq => {
            let distance = equality_distance(lhs, rhs);
            if outcome {
                (0.0, STRICT_INEQUALITY_EPSILON)
            } else {
                (distance, 0.0)
            }
        }
        CompareOp::Ne => swap(comparison_distances(lhs, CompareOp::Eq, rhs, !outcome)),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            let difference = match op {
                CompareOp::Lt | CompareOp::Le => ordering_difference(lhs, rhs),
                _ => ordering_difference(rhs, lhs),
            };
            let strict = matches!(op, CompareOp::Lt | CompareOp::Gt);
            match difference {
                Some(d) if !d.is_nan() => less_than_distances(d, strict),
                _ => by_outcome,
            }
        }
        CompareOp::In => {
            if outcome {
                return (0.0, STRICT_INEQUALITY_EPSILON);
            }
            let closest = rhs
                .iterate()
                .ok()
                .and_then(|elements| {
                    elements
                        .iter()
                        .map(|element| equality_distance(lhs, element))
                        .min_by(|a, b| a.total_cmp(b))
                })
                .unwrap_or(BOOL_PREDICATE_DISTANCE);
            (closest, 0.0)
        }
        CompareOp::NotIn => swap(comparison_distances(lhs, CompareOp::In, rhs, !outcome)),
        CompareOp::Is | CompareOp::IsNot => by_outcome,
    }
}

/// Distances of `d < 0` (strict) or `d <= 0`, where `d` is `lhs - rhs`
fn less_than_distances(d: f64, strict: bool) -> (f64, f64) {
    if strict {
        if d < 0.0 {
            (0.0, -d)
        } else {
            (d + STRICT_INEQUALITY_EPSILON, 0.0)
        }
    } else if d <= 0.0 {
        (0.0, -d + STRICT_INEQUALITY_EPSILON)
    } else {
        (d, 0.0)
    }
}
