//! Anomaly detection over numeric columns
//!
//! Univariate detection runs an ensemble of isolation forest, LOF and
//! KNN scores; multivariate detection fits an isolation forest over the
//! standardized numeric matrix; contextual detection groups by
//! hour-of-day when a temporal axis exists.

use chrono::{DateTime, Timelike, Utc};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use super::models::{
    Detector, DetectorConfig, Impact, Pattern, PatternContext, PatternEvidence, PatternType,
};
use super::numeric;
use super::statistical::{hints, tests};
use crate::services::frame::Frame;

/// Seed for the isolation forests, fixed so repeated analyses of the
/// same frame produce identical scores
const FOREST_SEED: u64 = 42;

/// How eagerly anomalies are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    /// Expected anomaly rate for this sensitivity
    pub fn contamination(self) -> f64 {
        match self {
            Sensitivity::Low => 0.05,
            Sensitivity::Medium => 0.10,
            Sensitivity::High => 0.15,
        }
    }

    /// Confidence floor for emitted patterns
    pub fn confidence_threshold(self) -> f64 {
        match self {
            Sensitivity::Low => 0.8,
            Sensitivity::Medium => 0.7,
            Sensitivity::High => 0.6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnomalyDetectorConfig {
    pub base: DetectorConfig,
    pub sensitivity: Sensitivity,
}

impl Default for AnomalyDetectorConfig {
    fn default() -> Self {
        let sensitivity = Sensitivity::default();
        let base = DetectorConfig {
            confidence_threshold: sensitivity.confidence_threshold(),
            ..DetectorConfig::default()
        };
        Self { base, sensitivity }
    }
}

impl AnomalyDetectorConfig {
    pub fn with_sensitivity(sensitivity: Sensitivity) -> Self {
        Self {
            base: DetectorConfig {
                confidence_threshold: sensitivity.confidence_threshold(),
                ..DetectorConfig::default()
            },
            sensitivity,
        }
    }
}

pub struct AnomalyDetector {
    config: AnomalyDetectorConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyDetectorConfig) -> Self {
        Self { config }
    }

    fn detect_univariate(&self, name: &str, values: &[f64]) -> Option<Pattern> {
        let contamination = self.config.sensitivity.contamination();
        let rows: Vec<Vec<f64>> = values.iter().map(|&v| vec![v]).collect();

        // Independent per-method scores, higher = more anomalous
        let iforest = numeric::isolation_forest_scores(&rows, FOREST_SEED);
        let lof = numeric::lof_scores(&rows, 20);
        let knn = numeric::knn_scores(&rows, 5);
        let method_scores = [iforest, lof, knn];
        let method_names = ["IsolationForest", "LOF", "KNN"];

        // Average after each method votes at its own quantile threshold
        let n = values.len();
        let combined: Vec<f64> = (0..n)
            .map(|i| method_scores.iter().map(|s| s[i]).sum::<f64>() / method_scores.len() as f64)
            .collect();
        let threshold = numeric::quantile(&combined, 1.0 - contamination);

        let anomaly_indices: Vec<usize> = (0..n).filter(|&i| combined[i] > threshold).collect();
        if anomaly_indices.is_empty() {
            return None;
        }

        let per_method_flags: Vec<Vec<bool>> = method_scores
            .iter()
            .map(|scores| {
                let cut = numeric::quantile(scores, 1.0 - contamination);
                scores.iter().map(|&s| s > cut).collect()
            })
            .collect();

        // Confidence: mean fraction of methods that independently flag
        // each anomalous row
        let agreement: f64 = anomaly_indices
            .iter()
            .map(|&i| {
                per_method_flags.iter().filter(|flags| flags[i]).count() as f64
                    / per_method_flags.len() as f64
            })
            .sum::<f64>()
            / anomaly_indices.len() as f64;

        let z = numeric::zscores(values);
        let anomaly_rate = anomaly_indices.len() as f64 / n as f64;

        let mut evidence = vec![
            PatternEvidence::new(format!(
                "Found {} anomalies using {} methods",
                anomaly_indices.len(),
                method_names.len()
            ))
            .with_tests(tests(&[
                ("anomaly_count", anomaly_indices.len() as f64),
                ("anomaly_rate", anomaly_rate),
                ("methods_used", method_names.len() as f64),
            ])),
            PatternEvidence::new(format!("Average ensemble agreement: {:.1}%", agreement * 100.0))
                .with_tests(tests(&[("ensemble_agreement", agreement)])),
        ];

        let top_points: Vec<Value> = anomaly_indices
            .iter()
            .take(5)
            .map(|&i| {
                json!({
                    "index": i,
                    "value": values[i],
                    "anomaly_score": combined[i],
                    "z_score": z[i],
                })
            })
            .collect();
        evidence.push(PatternEvidence::new("Top anomalies detected").with_data_points(top_points));

        let q99 = numeric::quantile(values, 0.99);
        let q01 = numeric::quantile(values, 0.01);
        let extreme_high = anomaly_indices.iter().filter(|&&i| values[i] > q99).count();
        let extreme_low = anomaly_indices.iter().filter(|&&i| values[i] < q01).count();

        let mut parameters = Map::new();
        parameters.insert("anomaly_count".into(), json!(anomaly_indices.len()));
        parameters.insert("anomaly_rate".into(), json!(anomaly_rate));
        parameters.insert("anomaly_indices".into(), json!(anomaly_indices));
        parameters.insert("detection_methods".into(), json!(method_names));
        parameters.insert("contamination".into(), json!(contamination));
        parameters.insert(
            "anomaly_stats".into(),
            json!({
                "total": anomaly_indices.len(),
                "extreme_high": extreme_high,
                "extreme_low": extreme_low,
            }),
        );

        let mut recommendations = vec![
            format!("Investigate {} anomalous values in {}", anomaly_indices.len(), name),
            "Set up automated anomaly detection alerts".to_string(),
        ];
        if extreme_high > extreme_low {
            recommendations.push(
                "Focus on unusually high values - possible system overload or data errors"
                    .to_string(),
            );
        } else if extreme_low > extreme_high {
            recommendations.push(
                "Focus on unusually low values - possible system failures or missing data"
                    .to_string(),
            );
        } else {
            recommendations
                .push("Anomalies occur in both directions - investigate root causes".to_string());
        }

        Some(Pattern {
            pattern_type: PatternType::AnomalyPoint,
            confidence: agreement,
            description: format!(
                "{} contains {} anomalous values ({:.1}%)",
                name,
                anomaly_indices.len(),
                anomaly_rate * 100.0
            ),
            columns: vec![name.to_string()],
            parameters,
            evidence,
            detected_at: Utc::now(),
            impact: if anomaly_rate > 0.05 { Impact::High } else { Impact::Medium },
            recommendations,
            visual_hints: hints(&[
                ("chart_type", json!("scatter_plot")),
                ("highlight_anomalies", json!(true)),
                ("show_threshold", json!(true)),
                ("color_by", json!("anomaly_score")),
            ]),
        })
    }

    fn detect_multivariate(&self, frame: &Frame, numeric_columns: &[String]) -> Option<Pattern> {
        // Rows complete across every selected numeric column
        let column_values: Vec<Vec<Option<f64>>> = numeric_columns
            .iter()
            .filter_map(|name| frame.column(name).and_then(|c| c.numeric().map(|v| v.to_vec())))
            .collect();
        if column_values.len() < 2 {
            return None;
        }

        let matrix: Vec<Vec<f64>> = (0..frame.row_count())
            .filter_map(|row| {
                column_values
                    .iter()
                    .map(|col| col.get(row).copied().flatten())
                    .collect::<Option<Vec<f64>>>()
            })
            .collect();
        if matrix.len() < self.config.base.min_samples {
            return None;
        }

        let standardized = numeric::standardize(&matrix);
        let scores = numeric::isolation_forest_scores(&standardized, FOREST_SEED);
        let contamination = self.config.sensitivity.contamination();
        let threshold = numeric::quantile(&scores, 1.0 - contamination);

        let anomaly_mask: Vec<bool> = scores.iter().map(|&s| s > threshold).collect();
        let anomaly_count = anomaly_mask.iter().filter(|&&b| b).count();
        if anomaly_count == 0 {
            return None;
        }

        // Per-feature deviation of anomalous rows from the normal mass
        let mut contributors: Vec<Value> = Vec::new();
        for (d, name) in numeric_columns.iter().enumerate() {
            let anomaly_vals: Vec<f64> = matrix
                .iter()
                .zip(&anomaly_mask)
                .filter(|&(_, &flagged)| flagged)
                .map(|(row, _)| row[d])
                .collect();
            let normal_vals: Vec<f64> = matrix
                .iter()
                .zip(&anomaly_mask)
                .filter(|&(_, &flagged)| !flagged)
                .map(|(row, _)| row[d])
                .collect();
            if normal_vals.is_empty() {
                continue;
            }
            let normal_std = numeric::std_dev(&normal_vals);
            if normal_std <= 0.0 {
                continue;
            }
            let deviation =
                (numeric::mean(&anomaly_vals) - numeric::mean(&normal_vals)).abs() / normal_std;
            contributors.push(json!({
                "feature": name,
                "deviation": deviation,
                "anomaly_mean": numeric::mean(&anomaly_vals),
                "normal_mean": numeric::mean(&normal_vals),
            }));
        }
        contributors.sort_by(|a, b| {
            let da = a["deviation"].as_f64().unwrap_or(0.0);
            let db = b["deviation"].as_f64().unwrap_or(0.0);
            db.total_cmp(&da)
        });
        contributors.truncate(3);

        let top_feature = contributors
            .first()
            .and_then(|c| c["feature"].as_str())
            .unwrap_or("unknown")
            .to_string();

        let mut parameters = Map::new();
        parameters.insert("anomaly_count".into(), json!(anomaly_count));
        parameters.insert("anomaly_rate".into(), json!(anomaly_count as f64 / matrix.len() as f64));
        parameters.insert("top_contributors".into(), json!(contributors));
        parameters.insert("detection_method".into(), json!("IsolationForest"));

        Some(Pattern {
            pattern_type: PatternType::AnomalyCollective,
            confidence: 0.8,
            description: format!(
                "Multivariate anomalies detected across {} features",
                numeric_columns.len()
            ),
            columns: numeric_columns.to_vec(),
            parameters: parameters.clone(),
            evidence: vec![
                PatternEvidence::new(format!("Detected {} multivariate anomalies", anomaly_count))
                    .with_tests(tests(&[
                        ("anomaly_count", anomaly_count as f64),
                        ("dimensions", numeric_columns.len() as f64),
                    ])),
                PatternEvidence::new("Top contributing features to anomalies").with_data_points(
                    parameters["top_contributors"].as_array().cloned().unwrap_or_default(),
                ),
            ],
            detected_at: Utc::now(),
            impact: Impact::High,
            recommendations: vec![
                "Investigate combinations of features that create anomalies".to_string(),
                format!("Focus on {} which shows highest deviation", top_feature),
                "Consider multivariate monitoring for these feature combinations".to_string(),
            ],
            visual_hints: hints(&[
                ("chart_type", json!("parallel_coordinates")),
                ("highlight_anomalies", json!(true)),
                ("show_feature_importance", json!(true)),
            ]),
        })
    }

    fn detect_contextual(
        &self,
        name: &str,
        values: &[Option<f64>],
        stamps: &[Option<DateTime<Utc>>],
    ) -> Option<Pattern> {
        if values.iter().flatten().count() < self.config.base.min_samples * 2 {
            return None;
        }

        // Group by hour of day, z-score within each group
        let mut groups: BTreeMap<u32, Vec<(usize, f64)>> = BTreeMap::new();
        for (i, (value, stamp)) in values.iter().zip(stamps).enumerate() {
            if let (Some(v), Some(t)) = (value, stamp) {
                groups.entry(t.hour()).or_default().push((i, *v));
            }
        }
        if groups.len() < 2 {
            return None;
        }

        let mut contextual: Vec<Value> = Vec::new();
        for (hour, entries) in &groups {
            if entries.len() < 10 {
                continue;
            }
            let vals: Vec<f64> = entries.iter().map(|(_, v)| *v).collect();
            let m = numeric::mean(&vals);
            let s = numeric::std_dev(&vals);
            if s <= 0.0 {
                continue;
            }
            for (idx, v) in entries {
                let z = (v - m) / s;
                if z.abs() > 3.0 {
                    contextual.push(json!({
                        "index": idx,
                        "value": v,
                        "context": format!("hour_{}", hour),
                        "expected_mean": m,
                        "z_score": z,
                    }));
                }
            }
        }
        if contextual.is_empty() {
            return None;
        }

        let context_names: Vec<String> = crate::utils::unique_ordered(
            contextual
                .iter()
                .filter_map(|a| a["context"].as_str().map(|s| s.to_string())),
        );

        let mut parameters = Map::new();
        parameters.insert("anomaly_count".into(), json!(contextual.len()));
        parameters.insert("contexts_affected".into(), json!(context_names.len()));
        parameters.insert(
            "context_types".into(),
            json!(context_names.iter().take(5).collect::<Vec<_>>()),
        );

        Some(Pattern {
            pattern_type: PatternType::AnomalyContextual,
            confidence: 0.75,
            description: format!("{} shows contextual anomalies based on time patterns", name),
            columns: vec![name.to_string()],
            parameters,
            evidence: vec![
                PatternEvidence::new(format!("Found {} contextual anomalies", contextual.len()))
                    .with_tests(tests(&[(
                        "total_contextual_anomalies",
                        contextual.len() as f64,
                    )])),
                PatternEvidence::new(format!(
                    "Anomalies found in {} different contexts",
                    context_names.len()
                ))
                .with_data_points(context_names.iter().map(|c| json!(c)).collect()),
                PatternEvidence::new("Example contextual anomalies")
                    .with_data_points(contextual.iter().take(5).cloned().collect()),
            ],
            detected_at: Utc::now(),
            impact: Impact::Medium,
            recommendations: vec![
                "Consider time-based alerting thresholds".to_string(),
                "Anomalies vary by time context (hour, day, etc.)".to_string(),
                "Implement context-aware monitoring".to_string(),
            ],
            visual_hints: hints(&[
                ("chart_type", json!("heatmap")),
                ("group_by", json!("time_context")),
                ("highlight_anomalies", json!(true)),
            ]),
        })
    }
}

impl Detector for AnomalyDetector {
    fn name(&self) -> &'static str {
        "anomaly"
    }

    fn supported_types(&self) -> &'static [PatternType] {
        &[
            PatternType::AnomalyPoint,
            PatternType::AnomalyCollective,
            PatternType::AnomalyContextual,
        ]
    }

    fn detect(&self, frame: &Frame, columns: &[String], context: &PatternContext) -> Vec<Pattern> {
        let mut patterns = Vec::new();

        let numeric_columns: Vec<String> = columns
            .iter()
            .filter(|name| {
                frame
                    .column(name)
                    .is_some_and(|c| c.dtype().is_numeric())
            })
            .cloned()
            .collect();

        for name in &numeric_columns {
            if context.deadline_expired() {
                break;
            }
            let Some(column) = frame.column(name) else {
                continue;
            };
            let values = column.numeric_dense();
            if values.len() < self.config.base.min_samples {
                continue;
            }
            if let Some(pattern) = self.detect_univariate(name, &values) {
                patterns.push(pattern);
            }
        }

        if numeric_columns.len() >= 2
            && !context.deadline_expired()
            && let Some(pattern) = self.detect_multivariate(frame, &numeric_columns)
        {
            patterns.push(pattern);
        }

        if let Some(axis) = frame.time_axis() {
            let stamps = axis.temporals().map(|s| s.to_vec()).unwrap_or_default();
            for name in &numeric_columns {
                if context.deadline_expired() {
                    break;
                }
                let Some(values) = frame.column(name).and_then(|c| c.numeric().map(|v| v.to_vec()))
                else {
                    continue;
                };
                if let Some(pattern) = self.detect_contextual(name, &values, &stamps) {
                    patterns.push(pattern);
                }
            }
        }

        // Sensitivity sets the confidence floor for emitted anomalies
        patterns.retain(|p| p.confidence >= self.config.base.confidence_threshold);
        patterns
    }
}

#[cfg(test)]
mod tests_mod {
    use super::*;
    use serde_json::json;

    fn spiky_frame() -> Frame {
        // Spread-out bulk with three large spikes at 72..=74; the jitter
        // keeps values distinct so neighbour distances are informative
        let values: Vec<Value> = (0..168)
            .map(|i| {
                if (72..=74).contains(&i) {
                    json!(200.0)
                } else {
                    json!(50.0 + (i % 5) as f64 + (i * 7 % 13) as f64 * 0.17)
                }
            })
            .collect();
        Frame::from_json(&json!({"value": values})).unwrap()
    }

    fn detect(frame: &Frame, columns: &[&str]) -> Vec<Pattern> {
        // High sensitivity keeps the ensemble-agreement floor at 0.6
        let detector =
            AnomalyDetector::new(AnomalyDetectorConfig::with_sensitivity(Sensitivity::High));
        let columns: Vec<String> = columns.iter().map(|s| s.to_string()).collect();
        detector.detect(frame, &columns, &PatternContext::default())
    }

    #[test]
    fn test_univariate_spikes_flagged() {
        let patterns = detect(&spiky_frame(), &["value"]);
        let point = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::AnomalyPoint)
            .expect("anomaly point pattern");

        let indices: Vec<usize> = point.parameters["anomaly_indices"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_u64().unwrap() as usize)
            .collect();
        for expected in [72, 73, 74] {
            assert!(indices.contains(&expected), "index {} missing from {:?}", expected, indices);
        }
    }

    #[test]
    fn test_multivariate_pattern_over_two_columns() {
        let mut a: Vec<Value> = (0..100).map(|i| json!(10.0 + (i % 4) as f64)).collect();
        let mut b: Vec<Value> = (0..100).map(|i| json!(20.0 + (i % 3) as f64)).collect();
        a[50] = json!(100.0);
        b[50] = json!(-80.0);
        let frame = Frame::from_json(&json!({"a": a, "b": b})).unwrap();

        let patterns = detect(&frame, &["a", "b"]);
        let collective = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::AnomalyCollective)
            .expect("collective pattern");
        assert_eq!(collective.columns, vec!["a", "b"]);
        assert!((collective.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let frame = spiky_frame();
        let a = detect(&frame, &["value"]);
        let b = detect(&frame, &["value"]);
        assert_eq!(
            serde_json::to_string(&a.iter().map(|p| &p.parameters).collect::<Vec<_>>()).unwrap(),
            serde_json::to_string(&b.iter().map(|p| &p.parameters).collect::<Vec<_>>()).unwrap(),
        );
    }

    #[test]
    fn test_small_series_skipped() {
        let frame = Frame::from_json(&json!({"x": [1.0, 2.0, 3.0]})).unwrap();
        assert!(detect(&frame, &["x"]).is_empty());
    }
}
