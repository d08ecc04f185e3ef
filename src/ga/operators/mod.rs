//! Genetic operators: crossover, parent selection and ranking

pub mod crossover;
pub mod ranking;
pub mod selection;

pub use crossover::SinglePointRelativeCrossOver;
pub use ranking::{crowding_distance, dominates, fast_non_dominated_sort, preference_sorting};
pub use selection::{RankSelection, SelectionFunction, TournamentSelection};
