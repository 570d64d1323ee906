//! Condition evaluation: field/predicate checks against a JSON record.
//! Shared by auto-assignment and notification rules.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One check: look up `field` in the record and test it with `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Key in the record. Dots walk into nested objects ("task.category").
    pub field: String,
    pub op: Predicate,
}

/// Comparison applied to the field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Equals(Value),
    NotEquals(Value),
    /// Field must be text containing this substring.
    Contains(String),
    GreaterThan(f64),
    LessThan(f64),
    In(Vec<Value>),
    NotIn(Vec<Value>),
}

impl Condition {
    pub fn new(field: &str, op: Predicate) -> Self {
        Self {
            field: field.to_string(),
            op,
        }
    }

    /// Test this condition against a record. Missing fields read as null.
    pub fn holds(&self, record: &Value) -> bool {
        let actual = lookup(record, &self.field).unwrap_or(&Value::Null);
        match &self.op {
            Predicate::Equals(expected) => actual == expected,
            Predicate::NotEquals(expected) => actual != expected,
            Predicate::Contains(needle) => actual
                .as_str()
                .is_some_and(|text| text.contains(needle.as_str())),
            Predicate::GreaterThan(bound) => actual.as_f64().is_some_and(|n| n > *bound),
            Predicate::LessThan(bound) => actual.as_f64().is_some_and(|n| n < *bound),
            Predicate::In(set) => set.contains(actual),
            Predicate::NotIn(set) => !set.contains(actual),
        }
    }
}

/// True iff every condition holds. An empty list always holds.
pub fn evaluate(record: &Value, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| c.holds(record))
}

fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(record, |node, key| node.get(key))
}
