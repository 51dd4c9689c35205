//! Tabular frame
//!
//! Typed, column-oriented dataset used by the pattern engine and the
//! visualization pipeline. Frames are immutable after construction;
//! derived frames (column subsets, time-sorted views) are new values.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::{ApiError, ApiResult};

/// Semantic column types, inferred at ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dtype {
    NumericContinuous,
    NumericDiscrete,
    CategoricalNominal,
    CategoricalOrdinal,
    Temporal,
    Boolean,
    Text,
    Geographic,
    Mixed,
}

impl Dtype {
    pub fn is_numeric(self) -> bool {
        matches!(self, Dtype::NumericContinuous | Dtype::NumericDiscrete)
    }

    pub fn is_categorical(self) -> bool {
        matches!(self, Dtype::CategoricalNominal | Dtype::CategoricalOrdinal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dtype::NumericContinuous => "numeric_continuous",
            Dtype::NumericDiscrete => "numeric_discrete",
            Dtype::CategoricalNominal => "categorical_nominal",
            Dtype::CategoricalOrdinal => "categorical_ordinal",
            Dtype::Temporal => "temporal",
            Dtype::Boolean => "boolean",
            Dtype::Text => "text",
            Dtype::Geographic => "geographic",
            Dtype::Mixed => "mixed",
        }
    }
}

/// Column storage, one variant per physical representation
#[derive(Debug, Clone)]
pub enum ColumnValues {
    Numeric(Vec<Option<f64>>),
    Boolean(Vec<Option<bool>>),
    Temporal(Vec<Option<DateTime<Utc>>>),
    Categorical(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(v) => v.len(),
            ColumnValues::Boolean(v) => v.len(),
            ColumnValues::Temporal(v) => v.len(),
            ColumnValues::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        match self {
            ColumnValues::Numeric(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnValues::Boolean(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnValues::Temporal(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnValues::Categorical(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }
}

/// A named, typed column with a null mask
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    dtype: Dtype,
    values: ColumnValues,
}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values.null_count()
    }

    pub fn non_null_count(&self) -> usize {
        self.len() - self.null_count()
    }

    pub fn unique_count(&self) -> usize {
        match &self.values {
            ColumnValues::Numeric(v) => v
                .iter()
                .flatten()
                .filter(|x| !x.is_nan())
                .map(|x| x.to_bits())
                .collect::<HashSet<_>>()
                .len(),
            ColumnValues::Boolean(v) => v.iter().flatten().collect::<HashSet<_>>().len(),
            ColumnValues::Temporal(v) => v
                .iter()
                .flatten()
                .map(|t| t.timestamp_micros())
                .collect::<HashSet<_>>()
                .len(),
            ColumnValues::Categorical(v) => {
                v.iter().flatten().map(|s| s.as_str()).collect::<HashSet<_>>().len()
            },
        }
    }

    /// Numeric view including the null mask
    pub fn numeric(&self) -> Option<&[Option<f64>]> {
        match &self.values {
            ColumnValues::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Non-null numeric values in row order
    pub fn numeric_dense(&self) -> Vec<f64> {
        match &self.values {
            ColumnValues::Numeric(v) => v.iter().flatten().copied().collect(),
            _ => Vec::new(),
        }
    }

    pub fn booleans(&self) -> Option<&[Option<bool>]> {
        match &self.values {
            ColumnValues::Boolean(v) => Some(v),
            _ => None,
        }
    }

    pub fn temporals(&self) -> Option<&[Option<DateTime<Utc>>]> {
        match &self.values {
            ColumnValues::Temporal(v) => Some(v),
            _ => None,
        }
    }

    pub fn strings(&self) -> Option<&[Option<String>]> {
        match &self.values {
            ColumnValues::Categorical(v) => Some(v),
            _ => None,
        }
    }
}

/// Immutable column-oriented dataset
#[derive(Debug, Clone)]
pub struct Frame {
    columns: Vec<Column>,
    row_count: usize,
}

impl Frame {
    /// Build a frame from a JSON payload: either a row array of objects
    /// or a column map of equal-length arrays
    pub fn from_json(value: &Value) -> ApiResult<Self> {
        match value {
            Value::Array(rows) => Self::from_rows(rows),
            Value::Object(map) => {
                let columns: Vec<(String, &Vec<Value>)> = map
                    .iter()
                    .map(|(name, col)| match col {
                        Value::Array(items) => Ok((name.clone(), items)),
                        _ => Err(ApiError::invalid_data(format!(
                            "column '{}' must be an array",
                            name
                        ))),
                    })
                    .collect::<ApiResult<_>>()?;
                Self::from_column_arrays(columns)
            },
            _ => Err(ApiError::invalid_data(
                "frame data must be a row array of objects or a column map of arrays",
            )),
        }
    }

    fn from_rows(rows: &[Value]) -> ApiResult<Self> {
        // Union of keys in first-seen order
        let mut names: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for row in rows {
            let obj = row.as_object().ok_or_else(|| {
                ApiError::invalid_data("every row in a row array must be an object")
            })?;
            for key in obj.keys() {
                if seen.insert(key.clone()) {
                    names.push(key.clone());
                }
            }
        }

        let raw: Vec<(String, Vec<Value>)> = names
            .into_iter()
            .map(|name| {
                let column: Vec<Value> = rows
                    .iter()
                    .map(|row| row.get(&name).cloned().unwrap_or(Value::Null))
                    .collect();
                (name, column)
            })
            .collect();

        let columns = raw
            .iter()
            .map(|(name, values)| infer_column(name, values))
            .collect::<Vec<_>>();

        Ok(Self { row_count: rows.len(), columns })
    }

    fn from_column_arrays(raw: Vec<(String, &Vec<Value>)>) -> ApiResult<Self> {
        let row_count = raw.first().map(|(_, v)| v.len()).unwrap_or(0);
        for (name, values) in &raw {
            if values.len() != row_count {
                return Err(ApiError::invalid_data(format!(
                    "column '{}' has {} values, expected {}",
                    name,
                    values.len(),
                    row_count
                )));
            }
        }

        let columns = raw
            .iter()
            .map(|(name, values)| infer_column(name, values.as_slice()))
            .collect::<Vec<_>>();

        Ok(Self { row_count, columns })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0 || self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Names of numeric columns in frame order
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.dtype.is_numeric())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// New frame restricted to the given columns, in the given order
    ///
    /// Unknown names are skipped rather than failing; callers validate
    /// column existence where it matters.
    pub fn select(&self, names: &[String]) -> Frame {
        let columns: Vec<Column> = names
            .iter()
            .filter_map(|n| self.column(n).cloned())
            .collect();
        Frame { row_count: self.row_count, columns }
    }

    /// The implicit temporal axis: the first temporal column, if any
    pub fn time_axis(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.dtype == Dtype::Temporal)
    }

    /// New frame sorted ascending by the temporal axis (nulls last).
    /// Returns a plain clone when no temporal axis exists.
    pub fn sort_by_time_axis(&self) -> Frame {
        let Some(axis) = self.time_axis() else {
            return self.clone();
        };
        let Some(stamps) = axis.temporals() else {
            return self.clone();
        };

        let mut order: Vec<usize> = (0..self.row_count).collect();
        order.sort_by_key(|&i| match stamps.get(i).copied().flatten() {
            Some(t) => (0_u8, t.timestamp_micros()),
            None => (1_u8, 0),
        });

        let columns = self
            .columns
            .iter()
            .map(|col| {
                let values = match &col.values {
                    ColumnValues::Numeric(v) => {
                        ColumnValues::Numeric(order.iter().map(|&i| v[i]).collect())
                    },
                    ColumnValues::Boolean(v) => {
                        ColumnValues::Boolean(order.iter().map(|&i| v[i]).collect())
                    },
                    ColumnValues::Temporal(v) => {
                        ColumnValues::Temporal(order.iter().map(|&i| v[i]).collect())
                    },
                    ColumnValues::Categorical(v) => {
                        ColumnValues::Categorical(order.iter().map(|&i| v[i].clone()).collect())
                    },
                };
                Column { name: col.name.clone(), dtype: col.dtype, values }
            })
            .collect();

        Frame { row_count: self.row_count, columns }
    }

    /// New frame holding only the given rows, in the given order
    pub fn take_rows(&self, indices: &[usize]) -> Frame {
        let indices: Vec<usize> = indices.iter().copied().filter(|&i| i < self.row_count).collect();
        let columns = self
            .columns
            .iter()
            .map(|col| {
                let values = match &col.values {
                    ColumnValues::Numeric(v) => {
                        ColumnValues::Numeric(indices.iter().map(|&i| v[i]).collect())
                    },
                    ColumnValues::Boolean(v) => {
                        ColumnValues::Boolean(indices.iter().map(|&i| v[i]).collect())
                    },
                    ColumnValues::Temporal(v) => {
                        ColumnValues::Temporal(indices.iter().map(|&i| v[i]).collect())
                    },
                    ColumnValues::Categorical(v) => {
                        ColumnValues::Categorical(indices.iter().map(|&i| v[i].clone()).collect())
                    },
                };
                Column { name: col.name.clone(), dtype: col.dtype, values }
            })
            .collect();
        Frame { row_count: indices.len(), columns }
    }

    /// Stable fingerprint of the first row, used in engine cache keys
    pub fn first_row_fingerprint(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for col in &self.columns {
            col.name.hash(&mut hasher);
            match &col.values {
                ColumnValues::Numeric(v) => {
                    v.first().copied().flatten().map(|x| x.to_bits()).hash(&mut hasher)
                },
                ColumnValues::Boolean(v) => v.first().copied().flatten().hash(&mut hasher),
                ColumnValues::Temporal(v) => v
                    .first()
                    .copied()
                    .flatten()
                    .map(|t| t.timestamp_micros())
                    .hash(&mut hasher),
                ColumnValues::Categorical(v) => {
                    v.first().cloned().flatten().hash(&mut hasher)
                },
            }
        }
        hasher.finish()
    }
}

/// Column names that mark geographic data
const GEO_NAMES: [&str; 7] = ["lat", "latitude", "lon", "longitude", "country", "state", "city"];

/// Infer a typed column from raw JSON values
///
/// Inference order: temporal, then boolean, then numeric (discrete when
/// unique-ratio < 0.05 and cardinality < 20), then categorical
/// (unique-ratio < 0.5) or text; geographic wins over categorical when
/// the column name says so; conflicting value types degrade to mixed.
fn infer_column(name: &str, raw: &[Value]) -> Column {
    let non_null: Vec<&Value> = raw.iter().filter(|v| !v.is_null()).collect();

    if non_null.is_empty() {
        return Column {
            name: name.to_string(),
            dtype: Dtype::Text,
            values: ColumnValues::Categorical(vec![None; raw.len()]),
        };
    }

    // Temporal: every non-null value is a timestamp-like string
    if non_null
        .iter()
        .all(|v| v.as_str().is_some_and(|s| parse_timestamp(s).is_some()))
    {
        let values = raw
            .iter()
            .map(|v| v.as_str().and_then(parse_timestamp))
            .collect();
        return Column {
            name: name.to_string(),
            dtype: Dtype::Temporal,
            values: ColumnValues::Temporal(values),
        };
    }

    if non_null.iter().all(|v| v.is_boolean()) {
        let values = raw.iter().map(|v| v.as_bool()).collect();
        return Column {
            name: name.to_string(),
            dtype: Dtype::Boolean,
            values: ColumnValues::Boolean(values),
        };
    }

    if non_null.iter().all(|v| v.is_number()) {
        let values: Vec<Option<f64>> = raw.iter().map(|v| v.as_f64()).collect();
        let cardinality = values
            .iter()
            .flatten()
            .filter(|x| !x.is_nan())
            .map(|x| x.to_bits())
            .collect::<HashSet<_>>()
            .len();
        let non_null_count = values.iter().flatten().count().max(1);
        let unique_ratio = cardinality as f64 / non_null_count as f64;

        let dtype = if unique_ratio < 0.05 && cardinality < 20 {
            Dtype::NumericDiscrete
        } else {
            Dtype::NumericContinuous
        };
        return Column {
            name: name.to_string(),
            dtype,
            values: ColumnValues::Numeric(values),
        };
    }

    if non_null.iter().all(|v| v.is_string()) {
        let values: Vec<Option<String>> =
            raw.iter().map(|v| v.as_str().map(|s| s.to_string())).collect();
        let cardinality = values
            .iter()
            .flatten()
            .map(|s| s.as_str())
            .collect::<HashSet<_>>()
            .len();
        let unique_ratio = cardinality as f64 / non_null.len() as f64;

        let dtype = if GEO_NAMES.contains(&name.to_lowercase().as_str()) {
            Dtype::Geographic
        } else if unique_ratio < 0.5 {
            Dtype::CategoricalNominal
        } else {
            Dtype::Text
        };
        return Column {
            name: name.to_string(),
            dtype,
            values: ColumnValues::Categorical(values),
        };
    }

    // Mixed value types: keep a stringified view
    let values = raw
        .iter()
        .map(|v| {
            if v.is_null() {
                None
            } else if let Some(s) = v.as_str() {
                Some(s.to_string())
            } else {
                Some(v.to_string())
            }
        })
        .collect();
    Column {
        name: name.to_string(),
        dtype: Dtype::Mixed,
        values: ColumnValues::Categorical(values),
    }
}

/// Parse the timestamp formats accepted at ingestion
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_rows() -> Value {
        json!([
            {"timestamp": "2024-01-01 00:00:00", "value": 1.5, "service": "api", "ok": true},
            {"timestamp": "2024-01-01 01:00:00", "value": 2.5, "service": "web", "ok": false},
            {"timestamp": "2024-01-01 02:00:00", "value": null, "service": "api", "ok": true},
        ])
    }

    #[test]
    fn test_row_ingestion_infers_dtypes() {
        let frame = Frame::from_json(&sample_rows()).unwrap();

        assert_eq!(frame.row_count(), 3);
        assert_eq!(frame.column("timestamp").unwrap().dtype(), Dtype::Temporal);
        assert_eq!(frame.column("value").unwrap().dtype(), Dtype::NumericContinuous);
        assert_eq!(frame.column("service").unwrap().dtype(), Dtype::CategoricalNominal);
        assert_eq!(frame.column("ok").unwrap().dtype(), Dtype::Boolean);
    }

    #[test]
    fn test_column_map_ingestion_matches_rows() {
        let by_columns = json!({
            "timestamp": ["2024-01-01 00:00:00", "2024-01-01 01:00:00", "2024-01-01 02:00:00"],
            "value": [1.5, 2.5, null],
            "service": ["api", "web", "api"],
            "ok": [true, false, true],
        });
        let a = Frame::from_json(&sample_rows()).unwrap();
        let b = Frame::from_json(&by_columns).unwrap();

        assert_eq!(a.column_names(), b.column_names());
        assert_eq!(a.column("value").unwrap().null_count(), 1);
        assert_eq!(b.column("value").unwrap().null_count(), 1);
        assert_eq!(a.first_row_fingerprint(), b.first_row_fingerprint());
    }

    #[test]
    fn test_unequal_column_lengths_rejected() {
        let bad = json!({"a": [1, 2, 3], "b": [1]});
        assert!(Frame::from_json(&bad).is_err());
    }

    #[test]
    fn test_discrete_split() {
        // 500 rows cycling through 4 values: unique ratio 0.008, cardinality 4
        let values: Vec<Value> = (0..500).map(|i| json!(i % 4)).collect();
        let frame = Frame::from_json(&json!({"level": values})).unwrap();
        assert_eq!(frame.column("level").unwrap().dtype(), Dtype::NumericDiscrete);
    }

    #[test]
    fn test_geographic_by_name() {
        let frame = Frame::from_json(&json!({
            "country": ["US", "DE", "US", "FR"],
        }))
        .unwrap();
        assert_eq!(frame.column("country").unwrap().dtype(), Dtype::Geographic);
    }

    #[test]
    fn test_sort_by_time_axis() {
        let frame = Frame::from_json(&json!([
            {"timestamp": "2024-01-02 00:00:00", "v": 2.0},
            {"timestamp": "2024-01-01 00:00:00", "v": 1.0},
            {"timestamp": "2024-01-03 00:00:00", "v": 3.0},
        ]))
        .unwrap();

        let sorted = frame.sort_by_time_axis();
        let values: Vec<f64> = sorted.column("v").unwrap().numeric_dense();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_select_preserves_requested_order() {
        let frame = Frame::from_json(&sample_rows()).unwrap();
        let sub = frame.select(&["value".to_string(), "service".to_string(), "nope".to_string()]);
        assert_eq!(sub.column_names(), vec!["value", "service"]);
        assert_eq!(sub.row_count(), 3);
    }

    #[test]
    fn test_mixed_column() {
        let frame = Frame::from_json(&json!({"odd": [1, "two", 3]})).unwrap();
        assert_eq!(frame.column("odd").unwrap().dtype(), Dtype::Mixed);
    }
}
