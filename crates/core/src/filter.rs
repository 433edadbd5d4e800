//! Post-search filter expressions.
//!
//! A small predicate tree evaluated against each result's metadata after
//! deduplication.  Field paths are dot-separated lookups into the metadata
//! object; a path that resolves to nothing makes the condition false (or
//! true for `Exists` negation via `Not`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Contains,
    Exists,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterExpression {
    And(Vec<FilterExpression>),
    Or(Vec<FilterExpression>),
    Not(Box<FilterExpression>),
    Condition {
        field: String,
        op: FilterOp,
        #[serde(default)]
        value: Value,
    },
}

/// Nesting ceiling for field paths, mirroring the metadata strategy's bound.
const MAX_PATH_DEPTH: usize = 10;

/// Resolve a dot-separated path inside a metadata object.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for (depth, segment) in path.split('.').enumerate() {
        if depth >= MAX_PATH_DEPTH {
            return None;
        }
        current = current.get(segment)?;
    }
    Some(current)
}

impl FilterExpression {
    /// Evaluate against one result's metadata.  Structural problems (an
    /// empty conjunction, a non-scalar comparison) surface as
    /// `ValidationError` so the orchestrator can log and fall back to the
    /// unfiltered result set.
    pub fn matches(&self, metadata: &Value) -> Result<bool> {
        match self {
            Self::And(clauses) => {
                if clauses.is_empty() {
                    return Err(Error::Validation("empty 'and' filter clause".to_string()));
                }
                for clause in clauses {
                    if !clause.matches(metadata)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(clauses) => {
                if clauses.is_empty() {
                    return Err(Error::Validation("empty 'or' filter clause".to_string()));
                }
                for clause in clauses {
                    if clause.matches(metadata)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not(inner) => Ok(!inner.matches(metadata)?),
            Self::Condition { field, op, value } => {
                let found = lookup_path(metadata, field);
                match op {
                    FilterOp::Exists => Ok(found.is_some()),
                    FilterOp::Eq => Ok(found.is_some_and(|v| v == value)),
                    FilterOp::Ne => Ok(found.is_none_or(|v| v != value)),
                    FilterOp::Gt | FilterOp::Lt => {
                        let (Some(lhs), Some(rhs)) =
                            (found.and_then(Value::as_f64), value.as_f64())
                        else {
                            return Err(Error::Validation(format!(
                                "filter field '{field}' is not numeric"
                            )));
                        };
                        Ok(match op {
                            FilterOp::Gt => lhs > rhs,
                            _ => lhs < rhs,
                        })
                    }
                    FilterOp::Contains => {
                        let needle = value.as_str().ok_or_else(|| {
                            Error::Validation("'contains' requires a string value".to_string())
                        })?;
                        Ok(match found {
                            Some(Value::String(s)) => s.contains(needle),
                            Some(Value::Array(items)) => {
                                items.iter().any(|item| item.as_str() == Some(needle))
                            }
                            _ => false,
                        })
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta() -> Value {
        json!({
            "topic": "rust",
            "score": 42,
            "tags": ["async", "memory"],
            "nested": { "owner": { "team": "platform" } }
        })
    }

    #[test]
    fn condition_eq_and_exists() {
        let eq = FilterExpression::Condition {
            field: "topic".into(),
            op: FilterOp::Eq,
            value: json!("rust"),
        };
        assert!(eq.matches(&meta()).unwrap());

        let exists = FilterExpression::Condition {
            field: "nested.owner.team".into(),
            op: FilterOp::Exists,
            value: Value::Null,
        };
        assert!(exists.matches(&meta()).unwrap());

        let missing = FilterExpression::Condition {
            field: "nested.owner.name".into(),
            op: FilterOp::Exists,
            value: Value::Null,
        };
        assert!(!missing.matches(&meta()).unwrap());
    }

    #[test]
    fn numeric_comparison() {
        let gt = FilterExpression::Condition {
            field: "score".into(),
            op: FilterOp::Gt,
            value: json!(40),
        };
        assert!(gt.matches(&meta()).unwrap());

        let non_numeric = FilterExpression::Condition {
            field: "topic".into(),
            op: FilterOp::Lt,
            value: json!(1),
        };
        assert!(non_numeric.matches(&meta()).is_err());
    }

    #[test]
    fn contains_on_arrays_and_strings() {
        let in_array = FilterExpression::Condition {
            field: "tags".into(),
            op: FilterOp::Contains,
            value: json!("async"),
        };
        assert!(in_array.matches(&meta()).unwrap());

        let in_string = FilterExpression::Condition {
            field: "topic".into(),
            op: FilterOp::Contains,
            value: json!("us"),
        };
        assert!(in_string.matches(&meta()).unwrap());
    }

    #[test]
    fn boolean_composition() {
        let expr = FilterExpression::And(vec![
            FilterExpression::Condition {
                field: "topic".into(),
                op: FilterOp::Eq,
                value: json!("rust"),
            },
            FilterExpression::Not(Box::new(FilterExpression::Condition {
                field: "score".into(),
                op: FilterOp::Lt,
                value: json!(10),
            })),
        ]);
        assert!(expr.matches(&meta()).unwrap());
    }

    #[test]
    fn empty_clause_is_a_validation_error() {
        assert!(FilterExpression::And(vec![]).matches(&meta()).is_err());
        assert!(FilterExpression::Or(vec![]).matches(&meta()).is_err());
    }
}
