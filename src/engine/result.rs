//! Fully collected query results and their polars conversion.

use duckdb::types::Value;
use polars::prelude::*;

use crate::error::BidsResult;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn len(&self) -> usize { self.rows.len() }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub fn column_index(&self, name: &str) -> Option<usize> { self.columns.iter().position(|c| c == name) }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Text rendering of one cell, `None` for SQL NULL.
    pub fn text(&self, row: usize, column: &str) -> Option<String> { self.value(row, column).and_then(value_to_text) }

    pub fn to_dataframe(&self) -> BidsResult<DataFrame> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.columns.len());
        for (idx, name) in self.columns.iter().enumerate() {
            let values: Vec<AnyValue<'static>> = self.rows.iter().map(|r| r.get(idx).map(to_any_value).unwrap_or(AnyValue::Null)).collect();
            let series = Series::from_any_values(name.as_str().into(), &values, false)?;
            columns.push(series.into());
        }
        Ok(DataFrame::new(columns)?)
    }
}

pub fn value_to_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::Text(s) => Some(s.clone()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::TinyInt(n) => Some(n.to_string()),
        Value::SmallInt(n) => Some(n.to_string()),
        Value::Int(n) => Some(n.to_string()),
        Value::BigInt(n) => Some(n.to_string()),
        Value::HugeInt(n) => Some(n.to_string()),
        Value::UTinyInt(n) => Some(n.to_string()),
        Value::USmallInt(n) => Some(n.to_string()),
        Value::UInt(n) => Some(n.to_string()),
        Value::UBigInt(n) => Some(n.to_string()),
        Value::Float(n) => Some(n.to_string()),
        Value::Double(n) => Some(n.to_string()),
        other => Some(format!("{:?}", other)),
    }
}

pub fn value_to_i64(v: &Value) -> Option<i64> {
    match v {
        Value::TinyInt(n) => Some(*n as i64),
        Value::SmallInt(n) => Some(*n as i64),
        Value::Int(n) => Some(*n as i64),
        Value::BigInt(n) => Some(*n),
        Value::HugeInt(n) => i64::try_from(*n).ok(),
        Value::UTinyInt(n) => Some(*n as i64),
        Value::USmallInt(n) => Some(*n as i64),
        Value::UInt(n) => Some(*n as i64),
        Value::UBigInt(n) => i64::try_from(*n).ok(),
        _ => None,
    }
}

fn to_any_value(v: &Value) -> AnyValue<'static> {
    match v {
        Value::Null => AnyValue::Null,
        Value::Boolean(b) => AnyValue::Boolean(*b),
        Value::Float(n) => AnyValue::Float64(*n as f64),
        Value::Double(n) => AnyValue::Float64(*n),
        Value::Text(s) => AnyValue::StringOwned(s.as_str().into()),
        other => match value_to_i64(other) {
            Some(n) => AnyValue::Int64(n),
            None => AnyValue::StringOwned(value_to_text(other).unwrap_or_default().into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult {
            columns: vec!["subject".into(), "onset".into(), "n".into()],
            rows: vec![
                vec![Value::Text("01".into()), Value::Double(1.5), Value::BigInt(2)],
                vec![Value::Null, Value::Double(3.0), Value::HugeInt(7)],
            ],
        }
    }

    #[test]
    fn cell_access() {
        let r = sample();
        assert_eq!(r.len(), 2);
        assert_eq!(r.text(0, "subject").as_deref(), Some("01"));
        assert_eq!(r.text(1, "subject"), None);
        assert_eq!(r.value(1, "n").and_then(value_to_i64), Some(7));
        assert!(r.value(0, "missing").is_none());
    }

    #[test]
    fn converts_to_dataframe() {
        let df = sample().to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 3);
        assert_eq!(df.column("onset").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("n").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("subject").unwrap().null_count(), 1);
    }
}
