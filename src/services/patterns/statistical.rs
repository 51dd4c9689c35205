//! Statistical pattern detection for numeric, categorical and boolean columns

use serde_json::{Map, Value, json};
use std::collections::HashMap;

use super::models::{
    Detector, DetectorConfig, Impact, Pattern, PatternContext, PatternEvidence, PatternType,
};
use super::numeric::{self, NumericSummary};
use crate::services::frame::{Column, Frame};

#[derive(Debug, Clone)]
pub struct StatisticalDetectorConfig {
    pub base: DetectorConfig,
    pub distribution_tests: bool,
    pub outlier_detection: bool,
    pub categorical_analysis: bool,
}

impl Default for StatisticalDetectorConfig {
    fn default() -> Self {
        Self {
            base: DetectorConfig::default(),
            distribution_tests: true,
            outlier_detection: true,
            categorical_analysis: true,
        }
    }
}

/// Detects distribution shapes, outliers, multimodality, missing data and
/// categorical imbalance
pub struct StatisticalDetector {
    config: StatisticalDetectorConfig,
}

impl StatisticalDetector {
    pub fn new(config: StatisticalDetectorConfig) -> Self {
        Self { config }
    }

    fn detect_numeric(&self, column: &Column) -> Vec<Pattern> {
        let values = column.numeric_dense();
        let mut patterns = Vec::new();
        let summary = numeric::describe(&values);

        if self.config.distribution_tests
            && let Some(pattern) = self.detect_distribution(column.name(), &values, &summary)
        {
            patterns.push(pattern);
        }

        if self.config.outlier_detection
            && let Some(pattern) = self.detect_outliers(column.name(), &values, &summary)
        {
            patterns.push(pattern);
        }

        if let Some(pattern) = self.detect_multimodal(column.name(), &values) {
            patterns.push(pattern);
        }

        if let Some(pattern) = self.detect_missing(column) {
            patterns.push(pattern);
        }

        patterns
    }

    fn detect_distribution(
        &self,
        name: &str,
        values: &[f64],
        summary: &NumericSummary,
    ) -> Option<Pattern> {
        let (_, p_value) = numeric::normal_omnibus_test(values)?;

        let parameters = summary_params(summary);

        if p_value > 0.05 {
            let evidence = vec![
                PatternEvidence::new("Passed normality test")
                    .with_tests(tests(&[("normaltest_pvalue", p_value)])),
            ];
            return Some(Pattern {
                pattern_type: PatternType::NormalDistribution,
                confidence: confidence_from_test(values.len(), p_value),
                description: format!("{} follows a normal distribution", name),
                columns: vec![name.to_string()],
                parameters,
                evidence,
                detected_at: chrono::Utc::now(),
                impact: Impact::Medium,
                recommendations: vec![
                    format!("{} is normally distributed - suitable for parametric tests", name),
                    "Can use mean and standard deviation for analysis".to_string(),
                    "Z-score normalization will be effective".to_string(),
                ],
                visual_hints: hints(&[
                    ("chart_type", json!("histogram")),
                    ("overlay", json!("distribution_curve")),
                    ("bins", json!(30)),
                ]),
            });
        }

        let skew = summary.skew;
        if skew.abs() > 1.0 {
            let direction = if skew > 0.0 { "right" } else { "left" };
            let evidence = vec![
                PatternEvidence::new(format!("High skewness value: {:.2}", skew))
                    .with_tests(tests(&[("skewness", skew.abs())])),
            ];
            return Some(Pattern {
                pattern_type: PatternType::SkewedDistribution,
                confidence: (skew.abs() / 3.0).min(1.0),
                description: format!("{} has a {}-skewed distribution", name, direction),
                columns: vec![name.to_string()],
                parameters,
                evidence,
                detected_at: chrono::Utc::now(),
                impact: Impact::Medium,
                recommendations: vec![
                    format!("Consider log or Box-Cox transformation for {}", name),
                    "Use median instead of mean for central tendency".to_string(),
                    "Non-parametric tests may be more appropriate".to_string(),
                ],
                visual_hints: hints(&[
                    ("chart_type", json!("histogram")),
                    ("overlay", json!("distribution_curve")),
                    ("bins", json!(30)),
                ]),
            });
        }

        let cv = if summary.mean.abs() > 0.0 { summary.std / summary.mean.abs() } else { f64::MAX };
        if cv < 0.1 {
            let evidence = vec![
                PatternEvidence::new(format!("Low coefficient of variation: {:.3}", cv))
                    .with_tests(tests(&[("cv", cv)])),
            ];
            return Some(Pattern {
                pattern_type: PatternType::UniformDistribution,
                confidence: 0.6,
                description: format!("{} has low variance, possibly uniform distribution", name),
                columns: vec![name.to_string()],
                parameters,
                evidence,
                detected_at: chrono::Utc::now(),
                impact: Impact::Medium,
                recommendations: vec![
                    format!("{} shows uniform distribution - check if this is expected", name),
                    "May indicate synthetic or generated data".to_string(),
                ],
                visual_hints: hints(&[("chart_type", json!("histogram"))]),
            });
        }

        None
    }

    fn detect_outliers(
        &self,
        name: &str,
        values: &[f64],
        summary: &NumericSummary,
    ) -> Option<Pattern> {
        let iqr = summary.q3 - summary.q1;
        let lower = summary.q1 - 1.5 * iqr;
        let upper = summary.q3 + 1.5 * iqr;

        let outliers: Vec<(usize, f64)> = values
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v < lower || v > upper)
            .map(|(i, &v)| (i, v))
            .collect();
        if outliers.is_empty() {
            return None;
        }

        let fraction = outliers.len() as f64 / values.len() as f64;
        let percentage = fraction * 100.0;

        let mut evidence = vec![
            PatternEvidence::new(format!("Found {} outliers using IQR method", outliers.len()))
                .with_tests(tests(&[("outlier_percentage", percentage)]))
                .with_data_points(
                    outliers
                        .iter()
                        .take(10)
                        .map(|(i, v)| json!({"index": i, "value": v}))
                        .collect(),
                ),
        ];

        let z = numeric::zscores(values);
        let z_outliers = z.iter().filter(|v| v.abs() > 3.0).count();
        if z_outliers > 0 {
            evidence.push(
                PatternEvidence::new(format!(
                    "Found {} outliers using Z-score method (|z| > 3)",
                    z_outliers
                ))
                .with_tests(tests(&[("zscore_outliers", z_outliers as f64)])),
            );
        }

        let mut parameters = Map::new();
        parameters.insert("outlier_count".into(), json!(outliers.len()));
        parameters.insert("outlier_percentage".into(), json!(percentage));
        parameters.insert("lower_bound".into(), json!(lower));
        parameters.insert("upper_bound".into(), json!(upper));
        parameters.insert("method".into(), json!("IQR"));

        Some(Pattern {
            pattern_type: PatternType::Outlier,
            confidence: (fraction * 20.0).min(1.0),
            description: format!("{} contains {:.1}% outliers", name, percentage),
            columns: vec![name.to_string()],
            parameters,
            evidence,
            detected_at: chrono::Utc::now(),
            impact: if percentage > 5.0 { Impact::High } else { Impact::Medium },
            recommendations: vec![
                format!("Investigate {} outlier values in {}", outliers.len(), name),
                "Consider outlier removal or transformation for modeling".to_string(),
                "Check if outliers represent valid extreme values or data errors".to_string(),
            ],
            visual_hints: hints(&[
                ("chart_type", json!("box_plot")),
                ("highlight", json!("outliers")),
                ("show_threshold_lines", json!(true)),
            ]),
        })
    }

    fn detect_multimodal(&self, name: &str, values: &[f64]) -> Option<Pattern> {
        let one = numeric::fit_gmm(values, 1)?;
        let two = numeric::fit_gmm(values, 2)?;

        if two.bic >= one.bic {
            return None;
        }

        let improvement = (one.bic - two.bic) / one.bic.abs().max(f64::MIN_POSITIVE);
        let mut mode_tests = Map::new();
        mode_tests.insert("bic_1_component".into(), json!(one.bic));
        mode_tests.insert("bic_2_components".into(), json!(two.bic));
        mode_tests.insert("improvement".into(), json!(improvement));

        let mut weight_tests = Map::new();
        for (i, w) in two.weights.iter().enumerate() {
            weight_tests.insert(format!("mode_{}_weight", i), json!(w));
        }

        let evidence = vec![
            PatternEvidence::new(format!("Detected {} distinct modes", two.means.len()))
                .with_tests(mode_tests),
            PatternEvidence::new(format!(
                "Mode centers: {}",
                two.means
                    .iter()
                    .map(|m| format!("{:.2}", m))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
            .with_tests(weight_tests),
        ];

        let mut parameters = Map::new();
        parameters.insert("n_modes".into(), json!(2));
        parameters.insert("mode_centers".into(), json!(two.means));
        parameters.insert("mode_weights".into(), json!(two.weights));

        Some(Pattern {
            pattern_type: PatternType::BimodalDistribution,
            confidence: (improvement * 10.0).min(0.9),
            description: format!(
                "{} shows bimodal distribution with peaks at {:.2} and {:.2}",
                name, two.means[0], two.means[1]
            ),
            columns: vec![name.to_string()],
            parameters,
            evidence,
            detected_at: chrono::Utc::now(),
            impact: Impact::Medium,
            recommendations: vec![
                format!("Consider segmenting {} data by the two distinct groups", name),
                "Investigate what causes the bimodal distribution".to_string(),
                "Use mixture models for more accurate analysis".to_string(),
            ],
            visual_hints: hints(&[
                ("chart_type", json!("histogram")),
                ("overlay", json!("kde")),
                ("show_modes", json!(true)),
            ]),
        })
    }

    fn detect_missing(&self, column: &Column) -> Option<Pattern> {
        let total = column.len();
        let missing = column.null_count();
        if missing == 0 || total == 0 {
            return None;
        }
        let ratio = missing as f64 / total as f64;

        let (impact, recommendations) = if ratio > 0.5 {
            (
                Impact::High,
                vec![
                    format!("Critical: {:.1}% of {} is missing", ratio * 100.0, column.name()),
                    "Consider dropping this column or advanced imputation".to_string(),
                    "Investigate data collection issues".to_string(),
                ],
            )
        } else if ratio > 0.2 {
            (
                Impact::Medium,
                vec![
                    format!(
                        "Significant missing data in {} ({:.1}%)",
                        column.name(),
                        ratio * 100.0
                    ),
                    "Consider imputation strategies".to_string(),
                    "Analyze if missingness is informative".to_string(),
                ],
            )
        } else {
            (
                Impact::Low,
                vec![
                    format!("Some missing data in {} ({:.1}%)", column.name(), ratio * 100.0),
                    "Simple imputation may be sufficient".to_string(),
                ],
            )
        };

        let mut parameters = Map::new();
        parameters.insert("missing_count".into(), json!(missing));
        parameters.insert("total_count".into(), json!(total));
        parameters.insert("missing_ratio".into(), json!(ratio));

        Some(Pattern {
            pattern_type: PatternType::MissingData,
            confidence: 0.95,
            description: format!("{} has {:.1}% missing values", column.name(), ratio * 100.0),
            columns: vec![column.name().to_string()],
            parameters,
            evidence: vec![
                PatternEvidence::new(format!(
                    "{} of {} values are missing",
                    missing, total
                ))
                .with_tests(tests(&[("missing_ratio", ratio)])),
            ],
            detected_at: chrono::Utc::now(),
            impact,
            recommendations,
            visual_hints: hints(&[
                ("chart_type", json!("heatmap")),
                ("show_missing", json!(true)),
            ]),
        })
    }

    fn detect_categorical(&self, column: &Column) -> Vec<Pattern> {
        let Some(values) = column.strings() else {
            return Vec::new();
        };
        let non_null: Vec<&str> = values.iter().flatten().map(|s| s.as_str()).collect();
        if non_null.is_empty() {
            return Vec::new();
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for v in &non_null {
            *counts.entry(v).or_default() += 1;
        }
        let total = non_null.len();
        let cardinality = counts.len();
        let cardinality_ratio = cardinality as f64 / total as f64;

        let mut patterns = Vec::new();

        if cardinality_ratio > 0.5 {
            let mut parameters = Map::new();
            parameters.insert("cardinality".into(), json!(cardinality));
            parameters.insert("total_records".into(), json!(total));
            parameters.insert("cardinality_ratio".into(), json!(cardinality_ratio));

            patterns.push(Pattern {
                pattern_type: PatternType::InconsistentData,
                confidence: cardinality_ratio.min(1.0),
                description: format!(
                    "{} has high cardinality ({} unique values)",
                    column.name(),
                    cardinality
                ),
                columns: vec![column.name().to_string()],
                parameters,
                evidence: vec![
                    PatternEvidence::new(format!(
                        "Column contains {} unique values out of {} records",
                        cardinality, total
                    ))
                    .with_tests(tests(&[("cardinality_ratio", cardinality_ratio)])),
                ],
                detected_at: chrono::Utc::now(),
                impact: Impact::High,
                recommendations: vec![
                    format!("Consider grouping similar values in {}", column.name()),
                    "Check for data entry inconsistencies".to_string(),
                    "May not be suitable for categorical encoding".to_string(),
                ],
                visual_hints: Map::new(),
            });
        }

        if counts.len() > 1 {
            let mut sorted: Vec<(&str, usize)> = counts.into_iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            let (dominant, dominant_count) = sorted[0];
            let dominant_fraction = dominant_count as f64 / total as f64;

            if dominant_fraction > 0.8 {
                let mut parameters = Map::new();
                parameters.insert("dominant_value".into(), json!(dominant));
                parameters.insert("dominant_proportion".into(), json!(dominant_fraction));

                patterns.push(Pattern {
                    pattern_type: PatternType::SkewedDistribution,
                    confidence: dominant_fraction,
                    description: format!(
                        "{} is dominated by value '{}' ({:.1}%)",
                        column.name(),
                        dominant,
                        dominant_fraction * 100.0
                    ),
                    columns: vec![column.name().to_string()],
                    parameters,
                    evidence: vec![
                        PatternEvidence::new(format!(
                            "Value '{}' appears in {:.1}% of records",
                            dominant,
                            dominant_fraction * 100.0
                        ))
                        .with_data_points(
                            sorted
                                .iter()
                                .take(5)
                                .map(|(v, c)| {
                                    json!({
                                        "value": v,
                                        "count": c,
                                        "proportion": *c as f64 / total as f64,
                                    })
                                })
                                .collect(),
                        ),
                    ],
                    detected_at: chrono::Utc::now(),
                    impact: Impact::Medium,
                    recommendations: vec![
                        format!("Consider if '{}' should be the default value", dominant),
                        "May need to handle class imbalance for modeling".to_string(),
                        "Investigate why this value dominates".to_string(),
                    ],
                    visual_hints: hints(&[
                        ("chart_type", json!("bar_chart")),
                        ("sort", json!("descending")),
                        ("show_percentages", json!(true)),
                    ]),
                });
            }
        }

        patterns
    }

    fn detect_boolean(&self, column: &Column) -> Option<Pattern> {
        let values = column.booleans()?;
        let non_null: Vec<bool> = values.iter().flatten().copied().collect();
        if non_null.is_empty() {
            return None;
        }
        let true_count = non_null.iter().filter(|&&b| b).count();
        let true_ratio = true_count as f64 / non_null.len() as f64;

        if (true_ratio - 0.5).abs() <= 0.4 {
            return None;
        }

        let dominant = true_ratio > 0.5;
        let dominant_ratio = true_ratio.max(1.0 - true_ratio);

        let mut parameters = Map::new();
        parameters.insert("true_count".into(), json!(true_count));
        parameters.insert("false_count".into(), json!(non_null.len() - true_count));
        parameters.insert("true_ratio".into(), json!(true_ratio));
        parameters.insert("dominant_value".into(), json!(dominant));

        Some(Pattern {
            pattern_type: PatternType::SkewedDistribution,
            confidence: dominant_ratio,
            description: format!(
                "{} is heavily skewed towards {} ({:.1}%)",
                column.name(),
                dominant,
                dominant_ratio * 100.0
            ),
            columns: vec![column.name().to_string()],
            parameters,
            evidence: vec![
                PatternEvidence::new(format!(
                    "{} appears in {:.1}% of records",
                    dominant,
                    dominant_ratio * 100.0
                ))
                .with_tests(tests(&[("imbalance_ratio", dominant_ratio)])),
            ],
            detected_at: chrono::Utc::now(),
            impact: Impact::Medium,
            recommendations: vec![
                format!(
                    "Consider if {} provides meaningful signal given the imbalance",
                    column.name()
                ),
                "May need special handling for modeling".to_string(),
            ],
            visual_hints: Map::new(),
        })
    }
}

impl Detector for StatisticalDetector {
    fn name(&self) -> &'static str {
        "statistical"
    }

    fn supported_types(&self) -> &'static [PatternType] {
        &[
            PatternType::NormalDistribution,
            PatternType::SkewedDistribution,
            PatternType::BimodalDistribution,
            PatternType::UniformDistribution,
            PatternType::Outlier,
            PatternType::MissingData,
            PatternType::InconsistentData,
        ]
    }

    fn detect(&self, frame: &Frame, columns: &[String], context: &PatternContext) -> Vec<Pattern> {
        let mut patterns = Vec::new();

        for name in columns {
            if context.deadline_expired() {
                break;
            }
            let Some(column) = frame.column(name) else {
                continue;
            };
            if column.non_null_count() < self.config.base.min_samples {
                continue;
            }

            if column.dtype().is_numeric() {
                patterns.extend(self.detect_numeric(column));
            } else if self.config.categorical_analysis && column.dtype().is_categorical() {
                patterns.extend(self.detect_categorical(column));
            } else if let Some(pattern) = self.detect_boolean(column) {
                patterns.push(pattern);
            }
        }

        // Returned patterns honor the configured confidence floor
        patterns.retain(|p| p.confidence >= self.config.base.confidence_threshold);
        patterns
    }
}

/// Confidence blend used by the distribution classifier: sample size,
/// test agreement and evidence count
fn confidence_from_test(sample_size: usize, p_value: f64) -> f64 {
    let sample_confidence = (sample_size as f64 / 1000.0).min(1.0);
    let test_confidence = p_value.clamp(0.0, 1.0);
    let evidence_confidence = 1.0_f64 / 3.0;
    (0.3 * sample_confidence + 0.5 * test_confidence + 0.2 * evidence_confidence).clamp(0.0, 1.0)
}

fn summary_params(summary: &NumericSummary) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("mean".into(), json!(summary.mean));
    map.insert("median".into(), json!(summary.median));
    map.insert("std".into(), json!(summary.std));
    map.insert("skew".into(), json!(summary.skew));
    map.insert("kurtosis".into(), json!(summary.kurtosis));
    map.insert("min".into(), json!(summary.min));
    map.insert("max".into(), json!(summary.max));
    map.insert("q1".into(), json!(summary.q1));
    map.insert("q3".into(), json!(summary.q3));
    map
}

pub(crate) fn tests(entries: &[(&str, f64)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

pub(crate) fn hints(entries: &[(&str, Value)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests_mod {
    use super::*;
    use serde_json::json;

    fn frame_from(value: Value) -> Frame {
        Frame::from_json(&value).unwrap()
    }

    fn detect(frame: &Frame, columns: &[&str]) -> Vec<Pattern> {
        let detector = StatisticalDetector::new(StatisticalDetectorConfig::default());
        let columns: Vec<String> = columns.iter().map(|s| s.to_string()).collect();
        detector.detect(frame, &columns, &PatternContext::default())
    }

    #[test]
    fn test_outlier_pattern_emitted() {
        let mut values: Vec<Value> = (0..100).map(|i| json!(50.0 + (i % 7) as f64)).collect();
        values[10] = json!(500.0);
        values[35] = json!(450.0);
        values[60] = json!(-400.0);
        values[85] = json!(-350.0);
        let frame = frame_from(json!({"latency": values}));

        let patterns = detect(&frame, &["latency"]);
        let outlier = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::Outlier)
            .expect("outlier pattern");
        assert_eq!(outlier.columns, vec!["latency"]);
        assert_eq!(outlier.param_f64("outlier_count", 0.0) as usize, 4);
        // 4% outliers scale to confidence 0.8, above the emission floor
        assert!((outlier.confidence - 0.8).abs() < 1e-9);
        assert!(!outlier.evidence.is_empty());
    }

    #[test]
    fn test_low_confidence_patterns_withheld() {
        // A single outlier in 100 rows gives confidence 0.2, below the
        // default 0.7 floor, so nothing is returned for it
        let mut values: Vec<Value> = (0..100).map(|i| json!(50.0 + (i % 7) as f64)).collect();
        values[10] = json!(500.0);
        let frame = frame_from(json!({"latency": values}));

        let patterns = detect(&frame, &["latency"]);
        assert!(
            patterns
                .iter()
                .all(|p| p.pattern_type != PatternType::Outlier)
        );
        for pattern in &patterns {
            assert!(pattern.confidence >= 0.7);
        }
    }

    #[test]
    fn test_missing_data_pattern() {
        let values: Vec<Value> = (0..100)
            .map(|i| if i % 3 == 0 { Value::Null } else { json!(i as f64) })
            .collect();
        let frame = frame_from(json!({"metric": values}));

        let patterns = detect(&frame, &["metric"]);
        let missing = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::MissingData)
            .expect("missing data pattern");
        assert!((missing.confidence - 0.95).abs() < 1e-9);
        assert!(missing.param_f64("missing_ratio", 0.0) > 0.3);
        assert_eq!(missing.impact, Impact::Medium);
    }

    #[test]
    fn test_categorical_imbalance() {
        let values: Vec<Value> = (0..100)
            .map(|i| if i < 90 { json!("prod") } else { json!("dev") })
            .collect();
        let frame = frame_from(json!({"env": values}));

        let patterns = detect(&frame, &["env"]);
        let skewed = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::SkewedDistribution)
            .expect("skewed distribution pattern");
        assert!((skewed.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_boolean_imbalance() {
        let values: Vec<Value> = (0..100).map(|i| json!(i < 95)).collect();
        let frame = frame_from(json!({"success": values}));

        let patterns = detect(&frame, &["success"]);
        assert!(
            patterns
                .iter()
                .any(|p| p.pattern_type == PatternType::SkewedDistribution)
        );
    }

    #[test]
    fn test_balanced_boolean_quiet() {
        let values: Vec<Value> = (0..100).map(|i| json!(i % 2 == 0)).collect();
        let frame = frame_from(json!({"flag": values}));
        assert!(detect(&frame, &["flag"]).is_empty());
    }

    #[test]
    fn test_too_few_samples_returns_empty() {
        let frame = frame_from(json!({"x": [1.0, 2.0, 3.0]}));
        assert!(detect(&frame, &["x"]).is_empty());
    }

    #[test]
    fn test_unknown_column_skipped() {
        let frame = frame_from(json!({"x": [1.0, 2.0, 3.0]}));
        assert!(detect(&frame, &["absent"]).is_empty());
    }
}
