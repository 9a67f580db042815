use serde_json::{Map, Value};
use std::fmt;
use stl_schemas::{amount_to_micros, Contract};

/// Recognizes the contract a submission created among active candidates.
///
/// Prefer [`Matcher::NaturalKey`]: server-assigned fields (status, computed
/// totals) make whole-payload comparison unreliable.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// `payload[field] == value`, for records carrying a client-generated id.
    NaturalKey { field: String, value: Value },
    /// Every non-null field supplied here equals the candidate's. Decimal
    /// amounts compare numerically, so `"100"` matches `"100.0"`.
    PayloadSubset(Map<String, Value>),
    /// Every inner matcher holds.
    All(Vec<Matcher>),
}

impl Matcher {
    pub fn natural_key(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Matcher::NaturalKey {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, contract: &Contract) -> bool {
        match self {
            Matcher::NaturalKey { field, value } => contract
                .field(field)
                .is_some_and(|actual| values_equal(value, actual)),
            Matcher::PayloadSubset(expected) => subset_of(expected, &contract.payload),
            Matcher::All(all) => all.iter().all(|m| m.matches(contract)),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::NaturalKey { field, value } => write!(f, "{field}={value}"),
            Matcher::PayloadSubset(m) => {
                let keys: Vec<&str> = m
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, _)| k.as_str())
                    .collect();
                write!(f, "payload[{}]", keys.join(","))
            }
            Matcher::All(all) => {
                let parts: Vec<String> = all.iter().map(|m| m.to_string()).collect();
                write!(f, "all({})", parts.join(" & "))
            }
        }
    }
}

fn subset_of(expected: &Map<String, Value>, actual: &Map<String, Value>) -> bool {
    expected
        .iter()
        .filter(|(_, v)| !v.is_null())
        .all(|(k, want)| actual.get(k).is_some_and(|got| values_equal(want, got)))
}

fn values_equal(want: &Value, got: &Value) -> bool {
    match (want, got) {
        (Value::Object(w), Value::Object(g)) => subset_of(w, g),
        (Value::Array(w), Value::Array(g)) => {
            w.len() == g.len() && w.iter().zip(g).all(|(a, b)| values_equal(a, b))
        }
        _ => match (as_micros(want), as_micros(got)) {
            (Some(a), Some(b)) => a == b,
            _ => want == got,
        },
    }
}

fn as_micros(v: &Value) -> Option<i64> {
    match v {
        Value::String(s) => amount_to_micros(s).ok(),
        Value::Number(n) => amount_to_micros(&n.to_string()).ok(),
        _ => None,
    }
}
