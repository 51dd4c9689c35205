//! Data shape analyzer
//!
//! Summarises a frame into the per-column characteristics that drive
//! chart recommendation: types, distributions, correlations, primary
//! metrics and dimensions, and an overall quality score.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

use super::models::{
    CategoricalStats, DataCharacteristics, DataShape, DistributionType, NumericStats,
    TemporalStats,
};
use crate::services::frame::{Column, Dtype, Frame};
use crate::services::patterns::numeric;

/// Column names that suggest a metric
const METRIC_KEYWORDS: [&str; 15] = [
    "count", "sum", "total", "amount", "value", "score", "rate", "ratio", "percentage",
    "duration", "latency", "cpu", "memory", "disk", "network",
];

/// Column names that suggest a dimension
const DIMENSION_KEYWORDS: [&str; 9] = [
    "name", "type", "category", "group", "class", "status", "region", "country", "department",
];

/// Column names that suggest a time axis
const TIME_KEYWORDS: [&str; 6] = ["time", "date", "timestamp", "datetime", "created", "updated"];

#[derive(Debug, Clone)]
pub struct ShapeAnalyzerConfig {
    /// Frames larger than this are sampled down before analysis
    pub sample_size: usize,
    /// Minimum |Pearson r| recorded in the correlations map
    pub correlation_threshold: f64,
}

impl Default for ShapeAnalyzerConfig {
    fn default() -> Self {
        Self { sample_size: 10_000, correlation_threshold: 0.5 }
    }
}

pub struct ShapeAnalyzer {
    config: ShapeAnalyzerConfig,
}

impl ShapeAnalyzer {
    pub fn new(config: ShapeAnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, frame: &Frame, target_columns: Option<&[String]>) -> DataShape {
        let mut warnings = Vec::new();

        let sampled;
        let frame = if frame.row_count() > self.config.sample_size {
            tracing::info!(
                "Sampling {} rows from {} total",
                self.config.sample_size,
                frame.row_count()
            );
            let mut indices: Vec<usize> = (0..frame.row_count()).collect();
            let mut rng = ChaCha8Rng::seed_from_u64(42);
            indices.shuffle(&mut rng);
            indices.truncate(self.config.sample_size);
            indices.sort_unstable();
            sampled = frame.take_rows(&indices);
            warnings.push(format!("Analysis based on sample of {} rows", self.config.sample_size));
            &sampled
        } else {
            frame
        };

        let selected: Vec<&Column> = match target_columns {
            Some(names) => names.iter().filter_map(|n| frame.column(n)).collect(),
            None => frame.columns().iter().collect(),
        };

        let column_characteristics: Vec<DataCharacteristics> = selected
            .iter()
            .map(|col| self.analyze_column(col, frame))
            .collect();

        let (has_time_series, time_column) = detect_time_series(frame);
        let primary_metrics = identify_primary_metrics(&column_characteristics);
        let primary_dimensions = identify_primary_dimensions(&column_characteristics);
        let data_quality_score = quality_score(&column_characteristics);

        DataShape {
            row_count: frame.row_count(),
            column_count: selected.len(),
            column_characteristics,
            has_time_series,
            time_column,
            primary_metrics,
            primary_dimensions,
            data_quality_score,
            warnings,
        }
    }

    fn analyze_column(&self, column: &Column, frame: &Frame) -> DataCharacteristics {
        let total = column.len().max(1);
        let cardinality = column.unique_count();
        let null_percentage = column.null_count() as f64 / total as f64;
        let unique_percentage = cardinality as f64 / total as f64;

        let mut characteristics = DataCharacteristics {
            name: column.name().to_string(),
            data_type: column.dtype(),
            cardinality,
            null_percentage,
            unique_percentage,
            numeric_stats: None,
            temporal_stats: None,
            categorical_stats: None,
            correlations: BTreeMap::new(),
        };

        match column.dtype() {
            Dtype::NumericContinuous | Dtype::NumericDiscrete => {
                characteristics.numeric_stats = numeric_stats(column);
                characteristics.correlations = self.correlations(column, frame);
            },
            Dtype::Temporal => {
                characteristics.temporal_stats = temporal_stats(column);
            },
            Dtype::CategoricalNominal | Dtype::CategoricalOrdinal | Dtype::Geographic => {
                characteristics.categorical_stats = categorical_stats(column);
            },
            Dtype::Boolean => {
                characteristics.categorical_stats = boolean_stats(column);
            },
            Dtype::Text | Dtype::Mixed => {},
        }

        characteristics
    }

    fn correlations(&self, column: &Column, frame: &Frame) -> BTreeMap<String, f64> {
        let mut correlations = BTreeMap::new();
        let Some(own) = column.numeric() else {
            return correlations;
        };

        for other in frame.columns() {
            if other.name() == column.name() || !other.dtype().is_numeric() {
                continue;
            }
            let Some(theirs) = other.numeric() else {
                continue;
            };

            let mut xs = Vec::new();
            let mut ys = Vec::new();
            for (a, b) in own.iter().zip(theirs) {
                if let (Some(a), Some(b)) = (a, b) {
                    xs.push(*a);
                    ys.push(*b);
                }
            }
            if xs.len() < 3 {
                continue;
            }
            let (r, _) = numeric::pearson(&xs, &ys);
            if r.abs() > self.config.correlation_threshold {
                correlations.insert(other.name().to_string(), (r * 1000.0).round() / 1000.0);
            }
        }
        correlations
    }
}

impl Default for ShapeAnalyzer {
    fn default() -> Self {
        Self::new(ShapeAnalyzerConfig::default())
    }
}

fn numeric_stats(column: &Column) -> Option<NumericStats> {
    let values = column.numeric_dense();
    if values.is_empty() {
        return None;
    }
    let summary = numeric::describe(&values);

    let iqr = summary.q3 - summary.q1;
    let lower = summary.q1 - 1.5 * iqr;
    let upper = summary.q3 + 1.5 * iqr;
    let outliers = values.iter().filter(|&&v| v < lower || v > upper).count();

    Some(NumericStats {
        min: summary.min,
        max: summary.max,
        mean: summary.mean,
        median: summary.median,
        std_dev: summary.std,
        distribution: Some(classify_distribution(&summary)),
        outlier_percentage: Some(outliers as f64 / values.len() as f64),
    })
}

/// Distribution label from skewness/kurtosis heuristics
fn classify_distribution(summary: &numeric::NumericSummary) -> DistributionType {
    let cv = if summary.mean.abs() > 0.0 { summary.std / summary.mean.abs() } else { f64::MAX };

    if summary.skew.abs() < 0.5 && summary.kurtosis.abs() < 1.0 {
        DistributionType::Normal
    } else if summary.skew > 1.0 {
        DistributionType::SkewedRight
    } else if summary.skew < -1.0 {
        DistributionType::SkewedLeft
    } else if summary.kurtosis.abs() > 3.0 {
        DistributionType::Bimodal
    } else if cv < 0.1 {
        DistributionType::Uniform
    } else {
        DistributionType::Unknown
    }
}

fn temporal_stats(column: &Column) -> Option<TemporalStats> {
    let stamps = column.temporals()?;
    let dense: Vec<_> = stamps.iter().flatten().collect();
    if dense.is_empty() {
        return None;
    }
    let min = dense.iter().min()?;
    let max = dense.iter().max()?;

    let mut gaps: Vec<i64> = dense.windows(2).map(|w| (*w[1] - *w[0]).num_seconds()).collect();
    gaps.sort_unstable();
    let frequency = gaps.get(gaps.len() / 2).map(|&median_gap| {
        if median_gap <= 0 {
            "irregular".to_string()
        } else if median_gap < 3600 {
            "minutely".to_string()
        } else if median_gap < 86_400 {
            "hourly".to_string()
        } else {
            "daily".to_string()
        }
    });

    Some(TemporalStats {
        time_range: Some((min.to_rfc3339(), max.to_rfc3339())),
        frequency,
    })
}

fn categorical_stats(column: &Column) -> Option<CategoricalStats> {
    let values = column.strings()?;
    let non_null: Vec<&str> = values.iter().flatten().map(|s| s.as_str()).collect();
    if non_null.is_empty() {
        return None;
    }
    let total = non_null.len() as f64;

    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for v in &non_null {
        *counts.entry(v).or_default() += 1;
    }
    let mut sorted: Vec<(&str, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let top_categories: Vec<(String, f64)> = sorted
        .iter()
        .take(10)
        .map(|(v, c)| (v.to_string(), *c as f64 / total))
        .collect();

    let count_values: Vec<f64> = sorted.iter().map(|(_, c)| *c as f64).collect();
    let distribution = if sorted.len() == 1 {
        "single_value"
    } else if sorted[0].1 as f64 / total > 0.8 {
        "dominant"
    } else if numeric::std_dev(&count_values) / numeric::mean(&count_values) < 0.5 {
        "balanced"
    } else {
        "imbalanced"
    };

    Some(CategoricalStats { top_categories, distribution: Some(distribution.to_string()) })
}

fn boolean_stats(column: &Column) -> Option<CategoricalStats> {
    let values = column.booleans()?;
    let non_null: Vec<bool> = values.iter().flatten().copied().collect();
    if non_null.is_empty() {
        return None;
    }
    let true_fraction =
        non_null.iter().filter(|&&b| b).count() as f64 / non_null.len() as f64;

    let distribution =
        if !(0.1..=0.9).contains(&true_fraction) { "dominant" } else { "balanced" };

    Some(CategoricalStats {
        top_categories: vec![
            ("true".to_string(), true_fraction),
            ("false".to_string(), 1.0 - true_fraction),
        ],
        distribution: Some(distribution.to_string()),
    })
}

/// Temporal column, or a time-named column whose leading values look
/// like timestamps
fn detect_time_series(frame: &Frame) -> (bool, Option<String>) {
    for column in frame.columns() {
        if column.dtype() == Dtype::Temporal {
            return (true, Some(column.name().to_string()));
        }
    }

    for column in frame.columns() {
        let lower = column.name().to_lowercase();
        if !TIME_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            continue;
        }
        // Epoch-like numeric values in a time-named column
        if let Some(values) = column.numeric() {
            let leading: Vec<f64> = values.iter().flatten().take(10).copied().collect();
            if !leading.is_empty() && leading.iter().all(|&v| v > 1.0e9) {
                return (true, Some(column.name().to_string()));
            }
        }
    }

    (false, None)
}

fn identify_primary_metrics(characteristics: &[DataCharacteristics]) -> Vec<String> {
    let mut metrics = Vec::new();
    for char in characteristics {
        if !char.is_numeric() {
            continue;
        }
        let lower = char.name.to_lowercase();
        let by_name = METRIC_KEYWORDS.iter().any(|kw| lower.contains(kw));
        let by_variance = char
            .numeric_stats
            .as_ref()
            .is_some_and(|s| s.mean.abs() > 0.0 && s.std_dev / s.mean.abs() > 0.1);
        if by_name || by_variance {
            metrics.push(char.name.clone());
        }
        if metrics.len() == 5 {
            break;
        }
    }
    metrics
}

fn identify_primary_dimensions(characteristics: &[DataCharacteristics]) -> Vec<String> {
    let mut dimensions = Vec::new();
    for char in characteristics {
        if !char.is_categorical() || !(2..=50).contains(&char.cardinality) {
            continue;
        }
        let lower = char.name.to_lowercase();
        let by_name = DIMENSION_KEYWORDS.iter().any(|kw| lower.contains(kw));
        let by_balance = char
            .categorical_stats
            .as_ref()
            .is_some_and(|s| s.distribution.as_deref() == Some("balanced"));
        if by_name || by_balance {
            dimensions.push(char.name.clone());
        }
        if dimensions.len() == 5 {
            break;
        }
    }
    dimensions
}

/// Mean per-column score of null, diversity and outlier penalties
fn quality_score(characteristics: &[DataCharacteristics]) -> f64 {
    if characteristics.is_empty() {
        return 0.0;
    }
    let total: f64 = characteristics
        .iter()
        .map(|char| {
            let null_penalty = 1.0 - char.null_percentage;
            let diversity = if char.unique_percentage < 0.1 {
                (char.unique_percentage * 10.0).min(1.0)
            } else {
                1.0
            };
            let outlier_penalty = char
                .numeric_stats
                .as_ref()
                .and_then(|s| s.outlier_percentage)
                .map(|p| 1.0 - (p * 5.0).min(0.5))
                .unwrap_or(1.0);
            null_penalty * diversity * outlier_penalty
        })
        .sum();
    total / characteristics.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn sample_frame() -> Frame {
        let rows: Vec<Value> = (0..100)
            .map(|i| {
                json!({
                    "timestamp": format!("2024-01-01 {:02}:00:00", i % 24),
                    "latency": 100.0 + (i % 13) as f64 * 17.0,
                    "throughput": 1000.0 + (i % 13) as f64 * 170.0,
                    "region": (["us-east", "us-west", "eu-central"][i % 3]),
                })
            })
            .collect();
        Frame::from_json(&json!(rows)).unwrap()
    }

    #[test]
    fn test_shape_has_time_series_and_metrics() {
        let shape = ShapeAnalyzer::default().analyze(&sample_frame(), None);

        assert!(shape.has_time_series);
        assert_eq!(shape.time_column.as_deref(), Some("timestamp"));
        assert!(shape.primary_metrics.contains(&"latency".to_string()));
        assert!(shape.primary_dimensions.contains(&"region".to_string()));
        assert!(shape.data_quality_score > 0.0 && shape.data_quality_score <= 1.0);
    }

    #[test]
    fn test_correlated_columns_recorded() {
        let shape = ShapeAnalyzer::default().analyze(&sample_frame(), None);
        let latency = shape.characteristics("latency").unwrap();
        assert!(latency.correlations.contains_key("throughput"));
        assert!(latency.correlations["throughput"] > 0.99);
    }

    #[test]
    fn test_sampling_large_frame() {
        let values: Vec<f64> = (0..20_000).map(|i| i as f64).collect();
        let frame = Frame::from_json(&json!({"value": values})).unwrap();
        let analyzer = ShapeAnalyzer::default();
        let shape = analyzer.analyze(&frame, None);

        assert_eq!(shape.row_count, 10_000);
        assert!(!shape.warnings.is_empty());

        // Seeded sampling keeps repeated runs identical
        let again = analyzer.analyze(&frame, None);
        let a = shape.characteristics("value").unwrap().numeric_stats.as_ref().unwrap();
        let b = again.characteristics("value").unwrap().numeric_stats.as_ref().unwrap();
        assert_eq!(a.mean, b.mean);
    }

    #[test]
    fn test_dominant_category_labelled() {
        let values: Vec<Value> = (0..100)
            .map(|i| if i < 90 { json!("a") } else { json!("b") })
            .collect();
        let frame = Frame::from_json(&json!({"kind": values})).unwrap();
        let shape = ShapeAnalyzer::default().analyze(&frame, None);
        let stats = shape
            .characteristics("kind")
            .unwrap()
            .categorical_stats
            .as_ref()
            .unwrap();
        assert_eq!(stats.distribution.as_deref(), Some("dominant"));
    }

    #[test]
    fn test_quality_score_penalizes_nulls() {
        let clean: Vec<Value> = (0..100).map(|i| json!(i as f64)).collect();
        let holey: Vec<Value> = (0..100)
            .map(|i| if i % 2 == 0 { Value::Null } else { json!(i as f64) })
            .collect();

        let clean_shape = ShapeAnalyzer::default()
            .analyze(&Frame::from_json(&json!({"v": clean})).unwrap(), None);
        let holey_shape = ShapeAnalyzer::default()
            .analyze(&Frame::from_json(&json!({"v": holey})).unwrap(), None);

        assert!(holey_shape.data_quality_score < clean_shape.data_quality_score);
    }

    #[test]
    fn test_target_column_selection() {
        let shape = ShapeAnalyzer::default()
            .analyze(&sample_frame(), Some(&["latency".to_string()]));
        assert_eq!(shape.column_count, 1);
        assert_eq!(shape.column_characteristics[0].name, "latency");
    }
}
