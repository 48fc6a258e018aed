//! Snapshot comparison.

use std::collections::HashMap;
use std::fmt;

use crate::value::Value;

/// A record of the reference snapshot not matched by the candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordDiff {
    /// Absent from the candidate.
    Missing { name: String, expected: Value },
    /// Present with a different value or type.
    Changed {
        name: String,
        expected: Value,
        actual: Value,
    },
}

impl RecordDiff {
    pub fn name(&self) -> &str {
        match self {
            Self::Missing { name, .. } | Self::Changed { name, .. } => name,
        }
    }
}

impl fmt::Display for RecordDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { name, expected } => {
                write!(f, "{name}: expected ({expected}), missing")
            }
            Self::Changed {
                name,
                expected,
                actual,
            } => {
                let ty = |v: &Value| v.value_type().map_or("empty", |t| t.name());
                write!(
                    f,
                    "{name}: expected ({} {expected}) != actual ({} {actual})",
                    ty(expected),
                    ty(actual)
                )
            }
        }
    }
}

/// Every reference record missing from or different in `candidate`, sorted
/// by name. Records only present in the candidate are ignored.
pub fn diff_records(
    reference: &HashMap<String, Value>,
    candidate: &HashMap<String, Value>,
) -> Vec<RecordDiff> {
    let mut diffs: Vec<RecordDiff> = reference
        .iter()
        .filter_map(|(name, expected)| match candidate.get(name) {
            None => Some(RecordDiff::Missing {
                name: name.clone(),
                expected: expected.clone(),
            }),
            Some(actual) if actual != expected => Some(RecordDiff::Changed {
                name: name.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            }),
            Some(_) => None,
        })
        .collect();
    diffs.sort_by(|a, b| a.name().cmp(b.name()));
    diffs
}
