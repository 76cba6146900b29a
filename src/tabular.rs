//! # Tabular Extraction
//!
//! Pulls two numeric columns out of a table as aligned samples, dropping any
//! row where either value is missing. Used for scatter-style views such as
//! magnitude against colour.

use crate::fits::{ColumnData, Table};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TabularError {
    #[error("column '{name}' not found (available: {available})")]
    ColumnNotFound { name: String, available: String },

    #[error("column '{0}' is not a scalar numeric column")]
    NotNumeric(String),
}

fn numeric_column<'a>(table: &'a Table, name: &str) -> Result<&'a [f64], TabularError> {
    let column = table.column(name).ok_or_else(|| TabularError::ColumnNotFound {
        name: name.to_string(),
        available: table.column_names().join(", "),
    })?;
    match &column.data {
        ColumnData::Numeric(values) => Ok(values),
        _ => Err(TabularError::NotNumeric(column.name.clone())),
    }
}

/// Values of columns `a` and `b` at every row where both are finite, in
/// row order.
pub fn pair_columns(table: &Table, a: &str, b: &str) -> Result<(Vec<f64>, Vec<f64>), TabularError> {
    let xs = numeric_column(table, a)?;
    let ys = numeric_column(table, b)?;

    Ok(xs
        .iter()
        .zip(ys)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(&x, &y)| (x, y))
        .unzip())
}

/// Summary statistics of a finite sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

impl ColumnStats {
    /// Statistics over the finite values; `None` when there are none.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        let count = finite.len();
        let mean = finite.iter().sum::<f64>() / count as f64;
        let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        Some(Self {
            count,
            min: finite.iter().copied().fold(f64::INFINITY, f64::min),
            max: finite.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean,
            std_dev: variance.sqrt(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::Column;

    fn table(columns: Vec<(&str, ColumnData)>) -> Table {
        Table::new(
            columns
                .into_iter()
                .map(|(name, data)| Column {
                    name: name.to_string(),
                    format: "D".to_string(),
                    unit: None,
                    data,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn finite_columns_round_trip() {
        let t = table(vec![
            ("BV", ColumnData::Numeric(vec![0.1, 0.5, 1.2])),
            ("VMAG", ColumnData::Numeric(vec![3.0, 4.0, 5.0])),
        ]);
        let (x, y) = pair_columns(&t, "BV", "VMAG").unwrap();
        assert_eq!(x, vec![0.1, 0.5, 1.2]);
        assert_eq!(y, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn rows_with_missing_values_are_dropped_in_order() {
        let t = table(vec![
            ("a", ColumnData::Numeric(vec![1.0, f64::NAN, 3.0, 4.0, f64::INFINITY])),
            ("b", ColumnData::Numeric(vec![10.0, 20.0, f64::NAN, 40.0, 50.0])),
        ]);
        let (x, y) = pair_columns(&t, "a", "b").unwrap();
        assert_eq!(x, vec![1.0, 4.0]);
        assert_eq!(y, vec![10.0, 40.0]);
    }

    #[test]
    fn all_missing_gives_empty_pair() {
        let t = table(vec![
            ("a", ColumnData::Numeric(vec![f64::NAN; 3])),
            ("b", ColumnData::Numeric(vec![1.0, 2.0, 3.0])),
        ]);
        let (x, y) = pair_columns(&t, "a", "b").unwrap();
        assert!(x.is_empty() && y.is_empty());
    }

    #[test]
    fn lookup_falls_back_to_case_insensitive() {
        let t = table(vec![
            ("Flux", ColumnData::Numeric(vec![1.0])),
            ("FLUX", ColumnData::Numeric(vec![2.0])),
            ("err", ColumnData::Numeric(vec![0.1])),
        ]);
        let (x, _) = pair_columns(&t, "FLUX", "ERR").unwrap();
        assert_eq!(x, vec![2.0]);
        let (x, _) = pair_columns(&t, "flux", "err").unwrap();
        assert_eq!(x, vec![1.0]);
    }

    #[test]
    fn missing_and_text_columns_are_errors() {
        let t = table(vec![
            ("a", ColumnData::Numeric(vec![1.0])),
            ("name", ColumnData::Text(vec!["x".into()])),
        ]);
        match pair_columns(&t, "a", "nope") {
            Err(TabularError::ColumnNotFound { name, available }) => {
                assert_eq!(name, "nope");
                assert_eq!(available, "a, name");
            }
            other => panic!("expected ColumnNotFound, got {other:?}"),
        }
        assert_eq!(
            pair_columns(&t, "name", "a"),
            Err(TabularError::NotNumeric("name".into()))
        );
    }

    #[test]
    fn stats_over_finite_values() {
        let stats = ColumnStats::from_values(&[2.0, f64::NAN, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.count, 8);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.mean, 5.0);
        assert!((stats.std_dev - 2.0).abs() < 1e-12);
        assert!(ColumnStats::from_values(&[f64::NAN]).is_none());
    }
}
