//! Reduction of partial report rows into one row per grouping key.
//!
//! Grouping is a pure function of the row set. Summing is associative and a
//! row that is already the only one for its key sums to itself, so grouping
//! `previous result ++ new rows` gives the same aggregate as grouping every
//! row received so far.

use crate::batch::Row;
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// Which field identifies a group and which fields are summed within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    pub key_field: String,
    pub sum_fields: Vec<String>,
}

impl GroupSpec {
    pub fn new<I, S>(key_field: impl Into<String>, sum_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key_field: key_field.into(),
            sum_fields: sum_fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn group(&self, rows: Vec<Row>) -> Vec<Row> {
        group_results(rows, self)
    }
}

/// Grouping key extracted from a row.
///
/// Reducers emit numbers as strings more often than not, so integral strings
/// group (and sort) together with integral numbers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    Int(i64),
    Text(String),
}

impl GroupKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => Some(
                number
                    .as_i64()
                    .map(Self::Int)
                    .unwrap_or_else(|| Self::Text(number.to_string())),
            ),
            Value::String(text) => Some(
                text.trim()
                    .parse::<i64>()
                    .map(Self::Int)
                    .unwrap_or_else(|_| Self::Text(text.clone())),
            ),
            Value::Bool(flag) => Some(Self::Text(flag.to_string())),
            // extended json dates: {"$date": <millis>}
            Value::Object(object) => object.get("$date").and_then(Self::from_value),
            Value::Null | Value::Array(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Sum {
    Int(i64),
    Float(f64),
}

impl Sum {
    fn add(self, value: f64, integral: Option<i64>) -> Self {
        match (self, integral) {
            (Sum::Int(acc), Some(int)) => match acc.checked_add(int) {
                Some(total) => Sum::Int(total),
                None => Sum::Float(acc as f64 + value),
            },
            (Sum::Int(acc), None) => Sum::Float(acc as f64 + value),
            (Sum::Float(acc), _) => Sum::Float(acc + value),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Sum::Int(total) => Value::from(total),
            Sum::Float(total) => Number::from_f64(total)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

/// Reads a numeric field, accepting numbers and numeric strings.
/// `"nan"` and `"inf"` are not numbers here, since json cannot carry them.
pub fn numeric_field(row: &Row, field: &str) -> Option<f64> {
    let value = match row.get(field)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    };
    value.filter(|value: &f64| value.is_finite())
}

fn integral_field(row: &Row, field: &str) -> Option<i64> {
    match row.get(field)? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

struct Group {
    key_value: Value,
    sums: Vec<Sum>,
}

/// Groups `rows` by `spec.key_field` and sums `spec.sum_fields` per group.
///
/// Output rows are ordered by key and carry the key (as first seen) plus the
/// sums; every other field is dropped. Rows without a usable key are skipped.
/// Missing or non-numeric summed fields count as zero.
pub fn group_results(rows: Vec<Row>, spec: &GroupSpec) -> Vec<Row> {
    let mut groups: BTreeMap<GroupKey, Group> = BTreeMap::new();
    let mut skipped = 0usize;

    for row in rows {
        let Some(key_value) = row.get(&spec.key_field) else {
            skipped += 1;
            continue;
        };
        let Some(key) = GroupKey::from_value(key_value) else {
            skipped += 1;
            continue;
        };
        let group = groups.entry(key).or_insert_with(|| Group {
            key_value: key_value.clone(),
            sums: vec![Sum::Int(0); spec.sum_fields.len()],
        });
        for (sum, field) in group.sums.iter_mut().zip(&spec.sum_fields) {
            let (value, integral) = match numeric_field(&row, field) {
                Some(value) => (value, integral_field(&row, field)),
                None => (0.0, Some(0)),
            };
            *sum = sum.add(value, integral);
        }
    }

    if skipped > 0 {
        tracing::warn!(
            key_field = %spec.key_field,
            skipped,
            "rows without a grouping key were dropped"
        );
    }

    groups
        .into_values()
        .map(|group| {
            let mut row = Row::new();
            row.insert(spec.key_field.clone(), group.key_value);
            for (field, sum) in spec.sum_fields.iter().zip(group.sums) {
                row.insert(field.clone(), sum.into_value());
            }
            row
        })
        .collect()
}

/// Adds `output = numerator / denominator` to every row, or `null` when the
/// denominator is missing or zero. Recomputed from scratch, so re-running it
/// on its own output changes nothing.
pub fn with_ratio(mut rows: Vec<Row>, numerator: &str, denominator: &str, output: &str) -> Vec<Row> {
    for row in rows.iter_mut() {
        let ratio = match (numeric_field(row, numerator), numeric_field(row, denominator)) {
            (Some(num), Some(denom)) if denom != 0.0 => Number::from_f64(num / denom),
            _ => None,
        };
        row.insert(
            output.to_string(),
            ratio.map(Value::Number).unwrap_or(Value::Null),
        );
    }
    rows
}
