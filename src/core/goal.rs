//! Goal criteria and their evaluation.
//!
//! A [`GoalState`] describes when a plan may stop early: a list of
//! criteria compared against a view aggregated from completed task
//! results. Evaluation never fails; a criterion that cannot be evaluated
//! (missing key, type mismatch) simply counts as unsatisfied.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::GoalCombinator;

/// Key under which non-object task payloads land in the aggregated view.
pub const RESULT_KEY: &str = "result";

/// Comparison operator applied between an aggregated value and a
/// criterion's expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Values are equal.
    Eq,
    /// Values differ.
    Ne,
    /// Actual > expected (numeric).
    Gt,
    /// Actual >= expected (numeric).
    Ge,
    /// Actual < expected (numeric).
    Lt,
    /// Actual <= expected (numeric).
    Le,
    /// Actual string contains the expected string, or actual array
    /// contains the expected value.
    Contains,
}

/// One condition that contributes to goal satisfaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalCriterion {
    /// Key looked up in the aggregated result view.
    pub name: String,
    /// Value the aggregate is compared against.
    pub expected: Value,
    /// How the comparison is performed.
    pub op: CompareOp,
    /// Whether the criterion held at the most recent evaluation.
    #[serde(default)]
    pub satisfied: bool,
}

impl GoalCriterion {
    /// Create an unsatisfied criterion.
    pub fn new(name: impl Into<String>, op: CompareOp, expected: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            expected: expected.into(),
            op,
            satisfied: false,
        }
    }
}

/// The goal a plan is trying to reach.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalState {
    /// Human-readable description of the goal.
    pub description: String,
    /// Criteria evaluated against aggregated results, in order.
    pub criteria: Vec<GoalCriterion>,
}

impl GoalState {
    /// Create a goal with no criteria. Such a goal is never satisfied.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            criteria: Vec::new(),
        }
    }

    /// Add a criterion.
    pub fn with_criterion(mut self, criterion: GoalCriterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    /// Whether every criterion is currently marked satisfied.
    pub fn all_satisfied(&self) -> bool {
        !self.criteria.is_empty() && self.criteria.iter().all(|c| c.satisfied)
    }
}

/// Stateless evaluator for goal criteria.
#[derive(Debug, Clone, Copy)]
pub struct GoalChecker {
    combinator: GoalCombinator,
}

impl GoalChecker {
    /// Create a checker with the given combinator.
    pub fn new(combinator: GoalCombinator) -> Self {
        Self { combinator }
    }

    /// Evaluate every criterion against the aggregated view, updating each
    /// `satisfied` flag, and return the combined verdict.
    ///
    /// A goal with no criteria is never satisfied, regardless of the
    /// combinator.
    pub fn evaluate(&self, goal: &mut GoalState, view: &Map<String, Value>) -> bool {
        if goal.criteria.is_empty() {
            return false;
        }

        for criterion in &mut goal.criteria {
            criterion.satisfied = view
                .get(&criterion.name)
                .map(|actual| compare(criterion.op, actual, &criterion.expected))
                .unwrap_or(false);
        }

        match self.combinator {
            GoalCombinator::All => goal.criteria.iter().all(|c| c.satisfied),
            GoalCombinator::Any => goal.criteria.iter().any(|c| c.satisfied),
        }
    }
}

impl Default for GoalChecker {
    fn default() -> Self {
        Self::new(GoalCombinator::All)
    }
}

/// Fold one completed task payload into the aggregated view.
///
/// Object payloads merge key-by-key with last write winning, the same rule
/// the rest of the engine uses for overlapping result keys. Any other
/// payload lands under [`RESULT_KEY`]; null payloads are ignored.
pub fn merge_payload(view: &mut Map<String, Value>, payload: &Value) {
    match payload {
        Value::Object(fields) => {
            for (key, value) in fields {
                view.insert(key.clone(), value.clone());
            }
        }
        Value::Null => {}
        other => {
            view.insert(RESULT_KEY.to_string(), other.clone());
        }
    }
}

/// Apply a comparison operator. Unevaluable pairs compare false.
fn compare(op: CompareOp, actual: &Value, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => actual == expected,
        CompareOp::Ne => actual != expected,
        CompareOp::Gt => numeric(actual, expected).map(|(a, e)| a > e).unwrap_or(false),
        CompareOp::Ge => numeric(actual, expected).map(|(a, e)| a >= e).unwrap_or(false),
        CompareOp::Lt => numeric(actual, expected).map(|(a, e)| a < e).unwrap_or(false),
        CompareOp::Le => numeric(actual, expected).map(|(a, e)| a <= e).unwrap_or(false),
        CompareOp::Contains => match (actual, expected) {
            (Value::String(a), Value::String(e)) => a.contains(e.as_str()),
            (Value::Array(items), e) => items.contains(e),
            _ => false,
        },
    }
}

fn numeric(actual: &Value, expected: &Value) -> Option<(f64, f64)> {
    Some((actual.as_f64()?, expected.as_f64()?))
}
