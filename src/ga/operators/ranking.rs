//! Preference sorting, non-dominated sorting and crowding distance
//!
//! Every function takes a fitness matrix: one row per chromosome, one column
//! per open goal, all values minimised. Fronts are returned as lists of row
//! indices, best front first.

use std::cmp::Ordering;

/// Whether `left` is no worse than `right` everywhere and better somewhere
pub fn dominates(left: &[f64], right: &[f64]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut at_least_one_better = false;
    for (l, r) in left.iter().zip(right) {
        if r < l {
            return false;
        }
        if l < r {
            at_least_one_better = true;
        }
    }
    at_least_one_better
}

/// Fronts of the rows listed in `subset`
pub fn fast_non_dominated_sort(fitness: &[Vec<f64>], subset: &[usize]) -> Vec<Vec<usize>> {
    let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); subset.len()];
    let mut domination_count = vec![0usize; subset.len()];
    for p in 0..subset.len() {
        for q in (p + 1)..subset.len() {
            let (row_p, row_q) = (&fitness[subset[p]], &fitness[subset[q]]);
            if dominates(row_p, row_q) {
                dominated_by[p].push(q);
                domination_count[q] += 1;
            } else if dominates(row_q, row_p) {
                dominated_by[q].push(p);
                domination_count[p] += 1;
            }
        }
    }

    let mut fronts = Vec::new();
    let mut current: Vec<usize> = (0..subset.len()).filter(|p| domination_count[*p] == 0).collect();
    while !current.is_empty() {
        let mut next = Vec::new();
        for p in &current {
            for q in &dominated_by[*p] {
                domination_count[*q] -= 1;
                if domination_count[*q] == 0 {
                    next.push(*q);
                }
            }
        }
        fronts.push(current.iter().map(|p| subset[*p]).collect());
        current = next;
    }
    fronts
}

/// Preference sorting: front 0 holds, for every goal, the row with the lowest
/// fitness (shorter `lengths` win ties); the remaining rows follow in
/// non-dominated order
pub fn preference_sorting(fitness: &[Vec<f64>], lengths: &[usize]) -> Vec<Vec<usize>> {
    let goals = fitness.first().map_or(0, Vec::len);
    let mut first_front: Vec<usize> = Vec::new();
    for goal in 0..goals {
        let best = (0..fitness.len()).min_by(|a, b| {
            fitness[*a][goal]
                .partial_cmp(&fitness[*b][goal])
                .unwrap_or(Ordering::Equal)
                .then(lengths[*a].cmp(&lengths[*b]))
        });
        if let Some(best) = best {
            if !first_front.contains(&best) {
                first_front.push(best);
            }
        }
    }

    let remaining: Vec<usize> = (0..fitness.len()).filter(|row| !first_front.contains(row)).collect();
    let mut fronts = Vec::new();
    if !first_front.is_empty() {
        fronts.push(first_front);
    }
    fronts.extend(fast_non_dominated_sort(fitness, &remaining));
    fronts
}

/// Crowding distance of every row in `front`, aligned with `front`
pub fn crowding_distance(fitness: &[Vec<f64>], front: &[usize]) -> Vec<f64> {
    let mut distances = vec![0.0; front.len()];
    if front.len() <= 2 {
        return vec![f64::INFINITY; front.len()];
    }
    let goals = fitness[front[0]].len();
    for goal in 0..goals {
        let mut order: Vec<usize> = (0..front.len()).collect();
        order.sort_by(|a, b| {
            fitness[front[*a]][goal]
                .partial_cmp(&fitness[front[*b]][goal])
                .unwrap_or(Ordering::Equal)
        });
        let min = fitness[front[order[0]]][goal];
        let max = fitness[front[order[order.len() - 1]]][goal];
        distances[order[0]] = f64::INFINITY;
        distances[order[order.len() - 1]] = f64::INFINITY;
        let range = max - min;
        if range <= 0.0 || !range.is_finite() {
            continue;
        }
        for window in 1..order.len() - 1 {
            let previous = fitness[front[order[window - 1]]][goal];
            let next = fitness[front[order[window + 1]]][goal];
            distances[order[window]] += (next - previous) / range;
        }
    }
    distances
}
