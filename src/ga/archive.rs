//! Many-objective coverage archive
//!
//! Tracks, for every goal, the best chromosome seen so far. A goal whose best
//! fitness reaches 0.0 moves from the open set to the covered set and stays
//! there for the rest of the run; later chromosomes covering it only replace
//! the stored solution when they are shorter.

use super::chromosome::TestCaseChromosome;
use super::goals::CoverageGoal;
use crate::execution::TestCaseExecutor;
use log::debug;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Candidate {
    chromosome: TestCaseChromosome,
    fitness: f64,
}

impl Candidate {
    fn is_improved_by(&self, fitness: f64, length: usize) -> bool {
        fitness < self.fitness || (fitness == self.fitness && length < self.chromosome.len())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoverageArchive {
    goals: Vec<CoverageGoal>,
    open: BTreeMap<CoverageGoal, Option<Candidate>>,
    covered: BTreeMap<CoverageGoal, Candidate>,
}

impl CoverageArchive {
    pub fn new(goals: Vec<CoverageGoal>) -> Self {
        let open = goals.iter().map(|goal| (*goal, None)).collect();
        Self {
            goals,
            open,
            covered: BTreeMap::new(),
        }
    }

    /// Score `population` against every goal and keep the best chromosomes.
    /// Returns the number of goals covered for the first time.
    pub fn update(&mut self, population: &mut [TestCaseChromosome], executor: &TestCaseExecutor) -> usize {
        let mut newly_covered = 0;
        for chromosome in population.iter_mut() {
            for goal in &self.goals {
                let fitness = chromosome.fitness_for(goal, executor);
                let length = chromosome.len();
                if let Some(solution) = self.covered.get_mut(goal) {
                    if fitness == 0.0 && length < solution.chromosome.len() {
                        solution.chromosome = chromosome.clone();
                    }
                    continue;
                }
                if fitness == 0.0 {
                    debug!("covered {} with a test case of {} statements", goal, length);
                    self.open.remove(goal);
                    self.covered.insert(
                        *goal,
                        Candidate {
                            chromosome: chromosome.clone(),
                            fitness,
                        },
                    );
                    newly_covered += 1;
                    continue;
                }
                if let Some(slot) = self.open.get_mut(goal) {
                    let replace = slot
                        .as_ref()
                        .map_or(true, |best| best.is_improved_by(fitness, length));
                    if replace {
                        *slot = Some(Candidate {
                            chromosome: chromosome.clone(),
                            fitness,
                        });
                    }
                }
            }
        }
        newly_covered
    }

    pub fn goals(&self) -> &[CoverageGoal] {
        &self.goals
    }

    pub fn open_goals(&self) -> Vec<CoverageGoal> {
        self.open.keys().copied().collect()
    }

    pub fn covered_goals(&self) -> Vec<CoverageGoal> {
        self.covered.keys().copied().collect()
    }

    pub fn is_covered(&self, goal: &CoverageGoal) -> bool {
        self.covered.contains_key(goal)
    }

    pub fn all_covered(&self) -> bool {
        self.open.is_empty()
    }

    /// Fraction of goals covered; 1.0 without goals
    pub fn coverage(&self) -> f64 {
        if self.goals.is_empty() {
            1.0
        } else {
            self.covered.len() as f64 / self.goals.len() as f64
        }
    }

    /// Best fitness seen so far for an open goal
    pub fn best_fitness(&self, goal: &CoverageGoal) -> Option<f64> {
        if self.covered.contains_key(goal) {
            return Some(0.0);
        }
        self.open.get(goal).and_then(|slot| slot.as_ref().map(|best| best.fitness))
    }

    /// Distinct chromosomes covering at least one goal
    pub fn solutions(&self) -> Vec<TestCaseChromosome> {
        distinct(self.covered.values().map(|candidate| &candidate.chromosome))
    }

    /// Solutions followed by the closest chromosome for every open goal
    pub fn best_per_goal(&self) -> Vec<TestCaseChromosome> {
        distinct(
            self.covered
                .values()
                .chain(self.open.values().flatten())
                .map(|candidate| &candidate.chromosome),
        )
    }
}

fn distinct<'a>(chromosomes: impl Iterator<Item = &'a TestCaseChromosome>) -> Vec<TestCaseChromosome> {
    let mut unique: Vec<TestCaseChromosome> = Vec::new();
    for chromosome in chromosomes {
        if !unique.contains(chromosome) {
            unique.push(chromosome.clone());
        }
    }
    unique
}
