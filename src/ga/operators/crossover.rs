//! Single point relative crossover

use crate::ga::chromosome::TestCaseChromosome;
use crate::testcase::{Statement, TestCase};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Cuts both parents at the same relative position and swaps the tails.
///
/// Statements taken over from the other parent keep references into their own
/// tail; references into the discarded head are redirected to the closest
/// earlier variable of a compatible type, and a statement for which none
/// exists is dropped together with everything that depends on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinglePointRelativeCrossOver {
    max_length: usize,
}

impl SinglePointRelativeCrossOver {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    /// Recombine the parents in place. Parents shorter than two statements,
    /// and offspring longer than the length limit, are left unchanged.
    pub fn cross_over(&self, parent1: &mut TestCaseChromosome, parent2: &mut TestCaseChromosome, rng: &mut ChaCha8Rng) {
        if parent1.len() < 2 || parent2.len() < 2 {
            return;
        }
        let split_point = rng.gen::<f64>();
        let position1 = relative_position(parent1.len(), split_point);
        let position2 = relative_position(parent2.len(), split_point);

        let offspring1 = splice(parent1.test_case(), position1, parent2.test_case(), position2);
        let offspring2 = splice(parent2.test_case(), position2, parent1.test_case(), position1);

        if offspring1.len() <= self.max_length && offspring2.len() <= self.max_length {
            *parent1.test_case_mut() = offspring1;
            *parent2.test_case_mut() = offspring2;
        }
    }
}

/// Cut position in `1..len` for a test case of `len >= 2` statements
fn relative_position(len: usize, split_point: f64) -> usize {
    (((len - 1) as f64 * split_point).floor() as usize + 1).min(len - 1)
}

/// `head[..head_len]` followed by `tail[tail_start..]`
pub fn splice(head: &TestCase, head_len: usize, tail: &TestCase, tail_start: usize) -> TestCase {
    let mut child = TestCase::new();
    for statement in head.statements().iter().take(head_len) {
        child.add_statement(statement.clone());
    }

    let mut moved: Vec<Option<usize>> = vec![None; tail.len()];
    for (index, statement) in tail.statements().iter().enumerate().skip(tail_start) {
        if let Some(statement) = relink(statement, tail, tail_start, &moved, &child) {
            moved[index] = Some(child.add_statement(statement).0);
        }
    }
    child
}

fn relink(
    statement: &Statement,
    tail: &TestCase,
    tail_start: usize,
    moved: &[Option<usize>],
    child: &TestCase,
) -> Option<Statement> {
    let mut statement = statement.clone();
    for reference in statement.references_mut() {
        if reference.0 >= tail_start {
            reference.0 = moved.get(reference.0).copied().flatten()?;
        } else {
            let expected = tail.return_type(*reference)?;
            *reference = child.variables_for_type(&expected, child.len()).last().copied()?;
        }
    }
    Some(statement)
}
