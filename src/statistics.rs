//! Output variables of a generation run
//!
//! The generator reports every figure of interest as a [`RuntimeVariable`]
//! into a [`StatisticsSink`]. [`InMemoryStatistics`] keeps them in a map and
//! can export them as one JSON object.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RuntimeVariable {
    TargetModule,
    RandomSeed,
    /// Wall-clock time of the whole run, in milliseconds
    TotalTime,
    /// Time spent in the search loop, in milliseconds
    SearchTime,
    CodeObjects,
    Predicates,
    Lines,
    Goals,
    CoveredGoals,
    Coverage,
    BranchCoverage,
    LineCoverage,
    Iterations,
    TestExecutions,
    Timeouts,
    /// Number of test cases in the final suite
    Size,
    /// Number of statements in the final suite
    Length,
    CoverageTimeline,
    FitnessHistory,
    StopReason,
    InferredParameters,
}

impl fmt::Display for RuntimeVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(u64),
    Float(f64),
    Text(String),
    Series(Vec<f64>),
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        MetricValue::Integer(value)
    }
}

impl From<usize> for MetricValue {
    fn from(value: usize) -> Self {
        MetricValue::Integer(value as u64)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Float(value)
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl From<Vec<f64>> for MetricValue {
    fn from(value: Vec<f64>) -> Self {
        MetricValue::Series(value)
    }
}

/// Receives output variables; later values for the same variable win
pub trait StatisticsSink {
    fn track_output_variable(&mut self, variable: RuntimeVariable, value: MetricValue);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct InMemoryStatistics {
    values: BTreeMap<RuntimeVariable, MetricValue>,
}

impl InMemoryStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, variable: RuntimeVariable) -> Option<&MetricValue> {
        self.values.get(&variable)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl StatisticsSink for InMemoryStatistics {
    fn track_output_variable(&mut self, variable: RuntimeVariable, value: MetricValue) {
        self.values.insert(variable, value);
    }
}
