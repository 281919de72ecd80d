//! Stage 2/4: column typing and the pure-math statistics engine.
//!
//! No statistics crate is used; every computation here is a direct
//! translation of the textbook formula, kept small enough to read as one.

use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Datetime,
    Boolean,
    CategoricalText,
    CategoricalNumeric,
    Text,
    Unknown,
}

/// Classifies a column from its non-null values. `declared_numeric` is the
/// hint carried by the source format (CSV/workbook cell typing); the
/// uniqueness ratio refines it into categorical vs. free text/numeric.
pub fn classify_column(values: &[Value]) -> ColumnType {
    let non_null: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    if non_null.is_empty() {
        return ColumnType::Unknown;
    }
    let uniqueness_ratio = unique_count(&non_null) as f64 / non_null.len() as f64;

    if non_null.iter().all(|v| v.is_boolean()) {
        return ColumnType::Boolean;
    }
    if non_null.iter().all(|v| v.is_i64() || v.is_u64()) {
        return if uniqueness_ratio < 0.1 { ColumnType::CategoricalNumeric } else { ColumnType::Integer };
    }
    if non_null.iter().all(|v| v.is_number()) {
        return if uniqueness_ratio < 0.1 { ColumnType::CategoricalNumeric } else { ColumnType::Float };
    }
    if non_null.iter().all(|v| v.as_str().map(looks_like_datetime).unwrap_or(false)) {
        return ColumnType::Datetime;
    }
    if uniqueness_ratio < 0.1 {
        return ColumnType::CategoricalText;
    }
    ColumnType::Text
}

fn looks_like_datetime(s: &str) -> bool {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || chrono::DateTime::parse_from_rfc3339(s).is_ok()
}

fn unique_count(values: &[&Value]) -> usize {
    let mut seen = std::collections::HashSet::new();
    for v in values {
        seen.insert(v.to_string());
    }
    seen.len()
}

pub fn as_f64_column(values: &[Value]) -> Vec<f64> {
    values.iter().filter_map(Value::as_f64).collect()
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

pub fn numeric_stats(values: &[f64]) -> Option<NumericStats> {
    if values.is_empty() {
        return None;
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(NumericStats { min, max, mean, std: variance.sqrt() })
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TextStats {
    pub min_length: usize,
    pub max_length: usize,
    pub mean_length: f64,
}

pub fn text_stats(values: &[Value]) -> Option<TextStats> {
    let lengths: Vec<usize> = values.iter().filter_map(|v| v.as_str()).map(str::len).collect();
    if lengths.is_empty() {
        return None;
    }
    let min_length = *lengths.iter().min().unwrap();
    let max_length = *lengths.iter().max().unwrap();
    let mean_length = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
    Some(TextStats { min_length, max_length, mean_length })
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatetimeRange {
    pub min: String,
    pub max: String,
}

pub fn datetime_range(values: &[Value]) -> Option<DatetimeRange> {
    let mut strings: Vec<&str> = values.iter().filter_map(|v| v.as_str()).collect();
    if strings.is_empty() {
        return None;
    }
    strings.sort_unstable();
    Some(DatetimeRange { min: strings[0].to_string(), max: strings[strings.len() - 1].to_string() })
}

/// Pearson correlation coefficient. Returns 0 when either series has zero
/// variance (undefined otherwise).
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let x = &x[..n];
    let y = &y[..n];
    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

/// Fisher-Pearson skewness and excess kurtosis (population moments).
pub fn skewness_kurtosis(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if n < 2.0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if std == 0.0 {
        return (0.0, 0.0);
    }
    let skew = values.iter().map(|v| ((v - mean) / std).powi(3)).sum::<f64>() / n;
    let kurt = values.iter().map(|v| ((v - mean) / std).powi(4)).sum::<f64>() / n - 3.0;
    (skew, kurt)
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FrequencyStats {
    pub unique_count: usize,
    pub total_count: usize,
    pub top_10: Vec<(String, usize)>,
}

pub fn frequency_stats(values: &[Value]) -> FrequencyStats {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut total = 0;
    for v in values {
        if v.is_null() {
            continue;
        }
        total += 1;
        *counts.entry(value_key(v)).or_insert(0) += 1;
    }
    let unique_count = counts.len();
    let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(10);
    FrequencyStats { unique_count, total_count: total, top_10: entries }
}

fn value_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_low_cardinality_integers_as_categorical() {
        let values: Vec<Value> = (0..100).map(|i| Value::from(i % 3)).collect();
        assert_eq!(classify_column(&values), ColumnType::CategoricalNumeric);
    }

    #[test]
    fn classifies_high_cardinality_integers_as_integer() {
        let values: Vec<Value> = (0..100).map(Value::from).collect();
        assert_eq!(classify_column(&values), ColumnType::Integer);
    }

    #[test]
    fn pearson_correlation_detects_perfect_linear_relationship() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let y = vec![2.0, 4.0, 6.0, 8.0];
        assert!((pearson_correlation(&x, &y) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pearson_correlation_is_zero_for_constant_series() {
        let x = vec![1.0, 1.0, 1.0];
        let y = vec![1.0, 2.0, 3.0];
        assert_eq!(pearson_correlation(&x, &y), 0.0);
    }

    #[test]
    fn frequency_stats_ranks_by_count() {
        let values = vec![Value::from("a"), Value::from("b"), Value::from("a"), Value::from("a")];
        let stats = frequency_stats(&values);
        assert_eq!(stats.top_10[0], ("a".to_string(), 3));
        assert_eq!(stats.total_count, 4);
    }
}
