//! Correlation and relationship detection between numeric columns

use chrono::Utc;
use serde_json::{Map, Value, json};

use super::models::{
    Detector, DetectorConfig, Impact, Pattern, PatternContext, PatternEvidence, PatternType,
};
use super::numeric;
use super::statistical::{hints, tests};
use crate::services::frame::Frame;

#[derive(Debug, Clone)]
pub struct CorrelationDetectorConfig {
    pub base: DetectorConfig,
    /// Minimum |r| for a pairwise correlation to be reported
    pub correlation_threshold: f64,
    pub lag_analysis: bool,
    pub max_lag: usize,
    pub detect_nonlinear: bool,
}

impl Default for CorrelationDetectorConfig {
    fn default() -> Self {
        Self {
            base: DetectorConfig::default(),
            correlation_threshold: 0.5,
            lag_analysis: true,
            max_lag: 10,
            detect_nonlinear: true,
        }
    }
}

pub struct CorrelationDetector {
    config: CorrelationDetectorConfig,
}

impl CorrelationDetector {
    pub fn new(config: CorrelationDetectorConfig) -> Self {
        Self { config }
    }

    /// Row-aligned non-null pairs for two columns
    fn paired(frame: &Frame, col1: &str, col2: &str) -> (Vec<f64>, Vec<f64>) {
        let a = frame.column(col1).and_then(|c| c.numeric());
        let b = frame.column(col2).and_then(|c| c.numeric());
        let (Some(a), Some(b)) = (a, b) else {
            return (Vec::new(), Vec::new());
        };

        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for (x, y) in a.iter().zip(b) {
            if let (Some(x), Some(y)) = (x, y) {
                xs.push(*x);
                ys.push(*y);
            }
        }
        (xs, ys)
    }

    fn detect_linear(&self, col1: &str, col2: &str, x: &[f64], y: &[f64]) -> Option<Pattern> {
        if x.len() < self.config.base.min_samples {
            return None;
        }

        let (pearson_r, pearson_p) = numeric::pearson(x, y);
        let (spearman_r, spearman_p) = numeric::spearman(x, y);
        let (kendall, _) = numeric::kendall_tau(x, y);

        if pearson_r.abs() < self.config.correlation_threshold
            && spearman_r.abs() < self.config.correlation_threshold
        {
            return None;
        }

        let (primary, primary_p, correlation_type) = if pearson_r.abs() >= spearman_r.abs() {
            (pearson_r, pearson_p, "linear")
        } else {
            (spearman_r, spearman_p, "monotonic")
        };
        let direction = if primary > 0.0 { "positive" } else { "negative" };
        let r_squared = pearson_r * pearson_r;
        let fit = numeric::linregress(x, y);

        let mut parameters = Map::new();
        parameters.insert("column1".into(), json!(col1));
        parameters.insert("column2".into(), json!(col2));
        parameters.insert("pearson_r".into(), json!(pearson_r));
        parameters.insert("spearman_r".into(), json!(spearman_r));
        parameters.insert("kendall_tau".into(), json!(kendall));
        parameters.insert("r_squared".into(), json!(r_squared));
        if let Some(fit) = &fit {
            parameters.insert("slope".into(), json!(fit.slope));
            parameters.insert("intercept".into(), json!(fit.intercept));
        }
        parameters.insert("direction".into(), json!(direction));
        parameters.insert("correlation_type".into(), json!(correlation_type));
        parameters.insert("p_value".into(), json!(primary_p));

        let abs_corr = primary.abs();
        let impact = if abs_corr > 0.8 {
            Impact::High
        } else if abs_corr > 0.6 {
            Impact::Medium
        } else {
            Impact::Low
        };

        let mut recommendations = if abs_corr > 0.8 {
            vec![
                format!("Very strong {} correlation between {} and {}", correlation_type, col1, col2),
                "Consider multicollinearity issues if using both in predictive models".to_string(),
                "One variable might be redundant".to_string(),
            ]
        } else if abs_corr > 0.6 {
            vec![
                format!("Strong {} correlation between {} and {}", correlation_type, col1, col2),
                "These variables provide related but not identical information".to_string(),
            ]
        } else {
            vec![
                format!("Moderate {} correlation between {} and {}", correlation_type, col1, col2),
                "Monitor this relationship over time".to_string(),
            ]
        };
        recommendations.push(if primary > 0.0 {
            "Variables move in the same direction".to_string()
        } else {
            "Variables move in opposite directions".to_string()
        });

        Some(Pattern {
            pattern_type: PatternType::LinearCorrelation,
            confidence: abs_corr.min(0.95),
            description: format!(
                "{} and {} show strong {} {} correlation",
                col1, col2, direction, correlation_type
            ),
            columns: vec![col1.to_string(), col2.to_string()],
            parameters,
            evidence: vec![
                PatternEvidence::new(format!(
                    "Pearson correlation: {:.3} (p={:.4})",
                    pearson_r, pearson_p
                ))
                .with_tests(tests(&[("pearson_r", pearson_r), ("pearson_p", pearson_p)])),
                PatternEvidence::new(format!(
                    "Spearman correlation: {:.3} (p={:.4})",
                    spearman_r, spearman_p
                ))
                .with_tests(tests(&[("spearman_r", spearman_r), ("spearman_p", spearman_p)])),
                PatternEvidence::new(format!(
                    "R-squared: {:.3} ({:.1}% variance explained)",
                    r_squared,
                    r_squared * 100.0
                ))
                .with_tests(tests(&[("r_squared", r_squared)])),
            ],
            detected_at: Utc::now(),
            impact,
            recommendations,
            visual_hints: hints(&[
                ("chart_type", json!("scatter_plot")),
                ("x_axis", json!(col1)),
                ("y_axis", json!(col2)),
                ("show_regression_line", json!(true)),
            ]),
        })
    }

    fn detect_nonlinear(&self, col1: &str, col2: &str, x: &[f64], y: &[f64]) -> Option<Pattern> {
        if x.len() < self.config.base.min_samples {
            return None;
        }

        let (pearson_r, _) = numeric::pearson(x, y);
        let mi = numeric::mutual_information(x, y, 10);
        let y_entropy = numeric::entropy_of_bins(&numeric::quantile_bins(y, 10));
        let normalized_mi = if y_entropy > 0.0 { mi / y_entropy } else { 0.0 };

        // Only interesting when it beats the linear account of the data
        if normalized_mi <= 0.3 || normalized_mi <= pearson_r.abs() {
            return None;
        }

        let x_squared: Vec<f64> = x.iter().map(|v| v * v).collect();
        let quad_mi = numeric::mutual_information(&x_squared, y, 10);

        let positives: Vec<(f64, f64)> = x
            .iter()
            .zip(y)
            .filter(|&(&xv, _)| xv > 0.0)
            .map(|(&xv, &yv)| (xv.ln(), yv))
            .collect();
        let log_mi = if positives.len() as f64 > self.config.base.min_samples as f64 * 0.8 {
            let lx: Vec<f64> = positives.iter().map(|(a, _)| *a).collect();
            let ly: Vec<f64> = positives.iter().map(|(_, b)| *b).collect();
            numeric::mutual_information(&lx, &ly, 10)
        } else {
            0.0
        };

        let relationship_type = if quad_mi > mi * 1.2 {
            "quadratic"
        } else if log_mi > mi * 1.2 {
            "logarithmic"
        } else {
            "complex non-linear"
        };

        let mut parameters = Map::new();
        parameters.insert("column1".into(), json!(col1));
        parameters.insert("column2".into(), json!(col2));
        parameters.insert("mutual_information".into(), json!(mi));
        parameters.insert("normalized_mi".into(), json!(normalized_mi));
        parameters.insert("relationship_type".into(), json!(relationship_type));
        parameters.insert("linear_correlation".into(), json!(pearson_r));

        Some(Pattern {
            pattern_type: PatternType::NonLinearCorrelation,
            confidence: normalized_mi.min(0.9),
            description: format!("{} and {} show {} relationship", col1, col2, relationship_type),
            columns: vec![col1.to_string(), col2.to_string()],
            parameters,
            evidence: vec![
                PatternEvidence::new(format!("Mutual information score: {:.3}", normalized_mi))
                    .with_tests(tests(&[
                        ("mutual_information", mi),
                        ("normalized_mi", normalized_mi),
                    ])),
                PatternEvidence::new(format!(
                    "Stronger than linear correlation (r={:.3})",
                    pearson_r
                ))
                .with_tests(tests(&[
                    ("linear_correlation", pearson_r),
                    ("nonlinear_strength", normalized_mi - pearson_r.abs()),
                ])),
            ],
            detected_at: Utc::now(),
            impact: Impact::Medium,
            recommendations: vec![
                format!("Consider {} transformation for modeling", relationship_type),
                "Non-linear relationship detected - linear models may not capture this".to_string(),
                "Use tree-based models or polynomial features".to_string(),
            ],
            visual_hints: hints(&[
                ("chart_type", json!("scatter_plot")),
                ("x_axis", json!(col1)),
                ("y_axis", json!(col2)),
                ("show_lowess", json!(true)),
                ("overlay_type", json!(relationship_type)),
            ]),
        })
    }

    fn detect_lag(&self, col1: &str, col2: &str, x: &[f64], y: &[f64]) -> Option<Pattern> {
        let n = x.len();
        if n < self.config.base.min_samples {
            return None;
        }
        let max_lag = self.config.max_lag.min(n / 4);

        let mut significant: Vec<(i64, f64, f64)> = Vec::new();
        for lag in 1..=max_lag {
            // Positive lag: col2 lags behind col1
            let (r, p) = numeric::pearson(&x[..n - lag], &y[lag..]);
            if r.abs() >= self.config.correlation_threshold && p < 0.05 {
                significant.push((lag as i64, r, p));
            }
            // Negative lag: col1 lags behind col2
            let (r, p) = numeric::pearson(&x[lag..], &y[..n - lag]);
            if r.abs() >= self.config.correlation_threshold && p < 0.05 {
                significant.push((-(lag as i64), r, p));
            }
        }
        if significant.is_empty() {
            return None;
        }

        let best = significant
            .iter()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .copied()?;
        let (best_lag, best_r, best_p) = best;

        let (leader, follower, lag_desc) = if best_lag > 0 {
            (col1, col2, format!("{} follows {} by {} periods", col2, col1, best_lag))
        } else {
            (col2, col1, format!("{} follows {} by {} periods", col1, col2, -best_lag))
        };

        let mut parameters = Map::new();
        parameters.insert("column1".into(), json!(col1));
        parameters.insert("column2".into(), json!(col2));
        parameters.insert("best_lag".into(), json!(best_lag));
        parameters.insert("best_correlation".into(), json!(best_r));
        parameters.insert("leader".into(), json!(leader));
        parameters.insert("follower".into(), json!(follower));
        parameters.insert(
            "all_significant_lags".into(),
            json!(
                significant
                    .iter()
                    .map(|(lag, r, p)| json!({"lag": lag, "correlation": r, "p_value": p}))
                    .collect::<Vec<_>>()
            ),
        );

        Some(Pattern {
            pattern_type: PatternType::LagCorrelation,
            confidence: best_r.abs().min(0.9),
            description: format!("{} with correlation {:.3}", lag_desc, best_r),
            columns: vec![col1.to_string(), col2.to_string()],
            parameters,
            evidence: vec![
                PatternEvidence::new(format!(
                    "Strongest correlation at lag {}: r={:.3}",
                    best_lag, best_r
                ))
                .with_tests(tests(&[
                    ("lag", best_lag as f64),
                    ("correlation", best_r),
                    ("p_value", best_p),
                ])),
                PatternEvidence::new(format!(
                    "Found {} significant lag correlations",
                    significant.len()
                ))
                .with_data_points(
                    significant
                        .iter()
                        .take(5)
                        .map(|(lag, r, _)| json!({"lag": lag, "correlation": r}))
                        .collect(),
                ),
            ],
            detected_at: Utc::now(),
            impact: if best_r.abs() > 0.7 { Impact::High } else { Impact::Medium },
            recommendations: vec![
                format!(
                    "{} can be used to predict {} with {} period lead time",
                    leader,
                    follower,
                    best_lag.abs()
                ),
                "Consider using lagged features in predictive models".to_string(),
                "Investigate causal relationship between variables".to_string(),
            ],
            visual_hints: hints(&[
                ("chart_type", json!("dual_line_chart")),
                ("show_lag", json!(best_lag)),
                ("highlight_correlation", json!(true)),
            ]),
        })
    }

    fn detect_network(&self, frame: &Frame, columns: &[String]) -> Option<Pattern> {
        let k = columns.len();
        if k < 3 {
            return None;
        }

        // Weighted adjacency over significant pairwise correlations
        let mut edges: Vec<(usize, usize, f64)> = Vec::new();
        let mut adjacency = vec![vec![false; k]; k];
        for i in 0..k {
            for j in (i + 1)..k {
                let (x, y) = Self::paired(frame, &columns[i], &columns[j]);
                if x.len() < self.config.base.min_samples {
                    continue;
                }
                let (r, _) = numeric::pearson(&x, &y);
                if r.abs() >= self.config.correlation_threshold {
                    edges.push((i, j, r));
                    adjacency[i][j] = true;
                    adjacency[j][i] = true;
                }
            }
        }
        if edges.is_empty() {
            return None;
        }

        let connected: Vec<usize> = (0..k)
            .filter(|&i| adjacency[i].iter().any(|&e| e))
            .collect();
        let node_count = connected.len();

        // Connected components over nodes that carry at least one edge
        let mut component_of = vec![usize::MAX; k];
        let mut components = 0;
        for &start in &connected {
            if component_of[start] != usize::MAX {
                continue;
            }
            let mut queue = vec![start];
            component_of[start] = components;
            while let Some(node) = queue.pop() {
                for next in 0..k {
                    if adjacency[node][next] && component_of[next] == usize::MAX {
                        component_of[next] = components;
                        queue.push(next);
                    }
                }
            }
            components += 1;
        }

        // Degree centrality: degree / (n - 1)
        let mut degrees: Vec<(usize, usize)> = connected
            .iter()
            .map(|&i| (i, adjacency[i].iter().filter(|&&e| e).count()))
            .collect();
        degrees.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let central: Vec<Value> = degrees
            .iter()
            .take(3)
            .map(|&(i, d)| json!({"variable": columns[i], "connections": d}))
            .collect();
        let central_names: Vec<&str> = degrees
            .iter()
            .take(3)
            .map(|&(i, _)| columns[i].as_str())
            .collect();

        let mut strongest = edges.clone();
        strongest.sort_by(|a, b| b.2.abs().total_cmp(&a.2.abs()));
        let top_edges: Vec<Value> = strongest
            .iter()
            .take(5)
            .map(|&(i, j, r)| json!({"var1": columns[i], "var2": columns[j], "correlation": r}))
            .collect();

        let density = if node_count > 1 {
            2.0 * edges.len() as f64 / (node_count as f64 * (node_count as f64 - 1.0))
        } else {
            0.0
        };
        let avg_correlation =
            edges.iter().map(|(_, _, r)| r.abs()).sum::<f64>() / edges.len() as f64;

        let (cluster_desc, recommendations) = if components > 1 {
            (
                format!("with {} distinct clusters", components),
                vec![
                    "Variables form distinct correlation clusters".to_string(),
                    "Consider analyzing each cluster separately".to_string(),
                ],
            )
        } else {
            (
                "forming a single connected network".to_string(),
                vec![
                    "All variables are interconnected through correlations".to_string(),
                    format!("{} is the most central variable", central_names[0]),
                    "Consider dimension reduction techniques like PCA".to_string(),
                ],
            )
        };

        let mut parameters = Map::new();
        parameters.insert("num_variables".into(), json!(node_count));
        parameters.insert("num_correlations".into(), json!(edges.len()));
        parameters.insert("num_components".into(), json!(components));
        parameters.insert("central_variables".into(), json!(central_names));
        parameters.insert("avg_correlation".into(), json!(avg_correlation));
        parameters.insert("network_density".into(), json!(density));
        parameters.insert("top_edges".into(), json!(top_edges));

        Some(Pattern {
            pattern_type: PatternType::NetworkCorrelation,
            confidence: 0.85,
            description: format!(
                "Complex correlation network detected among {} variables {}",
                node_count, cluster_desc
            ),
            columns: columns.to_vec(),
            parameters: parameters.clone(),
            evidence: vec![
                PatternEvidence::new(format!(
                    "Correlation network with {} variables and {} significant correlations",
                    node_count,
                    edges.len()
                ))
                .with_tests(tests(&[
                    ("nodes", node_count as f64),
                    ("edges", edges.len() as f64),
                    ("components", components as f64),
                ])),
                PatternEvidence::new(format!(
                    "Most connected variables: {}",
                    central_names.join(", ")
                ))
                .with_data_points(central),
                PatternEvidence::new("Strongest correlations in network").with_data_points(
                    parameters["top_edges"].as_array().cloned().unwrap_or_default(),
                ),
            ],
            detected_at: Utc::now(),
            impact: Impact::High,
            recommendations,
            visual_hints: hints(&[
                ("chart_type", json!("network_graph")),
                ("layout", json!("force_directed")),
                ("color_by", json!("centrality")),
                ("edge_width_by", json!("correlation_strength")),
            ]),
        })
    }
}

impl Detector for CorrelationDetector {
    fn name(&self) -> &'static str {
        "correlation"
    }

    fn supported_types(&self) -> &'static [PatternType] {
        &[
            PatternType::LinearCorrelation,
            PatternType::NonLinearCorrelation,
            PatternType::LagCorrelation,
            PatternType::NetworkCorrelation,
        ]
    }

    fn detect(&self, frame: &Frame, columns: &[String], context: &PatternContext) -> Vec<Pattern> {
        let numeric_columns: Vec<String> = columns
            .iter()
            .filter(|name| {
                frame
                    .column(name)
                    .is_some_and(|c| c.dtype().is_numeric())
            })
            .cloned()
            .collect();
        if numeric_columns.len() < 2 {
            return Vec::new();
        }

        let has_time_axis = frame.time_axis().is_some();
        let mut patterns = Vec::new();

        for i in 0..numeric_columns.len() {
            for j in (i + 1)..numeric_columns.len() {
                if context.deadline_expired() {
                    break;
                }
                let col1 = &numeric_columns[i];
                let col2 = &numeric_columns[j];
                let (x, y) = Self::paired(frame, col1, col2);
                if x.is_empty() {
                    continue;
                }

                if let Some(pattern) = self.detect_linear(col1, col2, &x, &y) {
                    patterns.push(pattern);
                }
                if self.config.detect_nonlinear
                    && let Some(pattern) = self.detect_nonlinear(col1, col2, &x, &y)
                {
                    patterns.push(pattern);
                }
                if self.config.lag_analysis
                    && has_time_axis
                    && let Some(pattern) = self.detect_lag(col1, col2, &x, &y)
                {
                    patterns.push(pattern);
                }
            }
        }

        if numeric_columns.len() >= 3
            && !context.deadline_expired()
            && let Some(pattern) = self.detect_network(frame, &numeric_columns)
        {
            patterns.push(pattern);
        }

        // Returned patterns honor the configured confidence floor
        patterns.retain(|p| p.confidence >= self.config.base.confidence_threshold);
        patterns
    }
}

#[cfg(test)]
mod tests_mod {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    fn noise(n: usize, std: f64, seed: u64) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let u1: f64 = rng.r#gen::<f64>().max(1e-12);
                let u2: f64 = rng.r#gen();
                std * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
            })
            .collect()
    }

    fn detect(frame: &Frame, columns: &[&str]) -> Vec<Pattern> {
        let detector = CorrelationDetector::new(CorrelationDetectorConfig::default());
        let columns: Vec<String> = columns.iter().map(|s| s.to_string()).collect();
        detector.detect(frame, &columns, &PatternContext::default())
    }

    #[test]
    fn test_linear_pair_detected_and_random_pair_quiet() {
        let x = noise(200, 1.0, 1);
        let y_lin: Vec<f64> = x
            .iter()
            .zip(noise(200, 0.5, 2))
            .map(|(a, e)| 2.0 * a + e)
            .collect();
        let y_rand = noise(200, 1.0, 3);

        let frame = Frame::from_json(&json!({
            "x": x, "y_lin": y_lin, "y_rand": y_rand,
        }))
        .unwrap();

        let patterns = detect(&frame, &["x", "y_lin", "y_rand"]);
        let linear: Vec<&Pattern> = patterns
            .iter()
            .filter(|p| p.pattern_type == PatternType::LinearCorrelation)
            .collect();

        assert_eq!(linear.len(), 1, "exactly one linear correlation expected");
        assert_eq!(linear[0].columns, vec!["x", "y_lin"]);
        assert!(linear[0].param_f64("pearson_r", 0.0) >= 0.8);
    }

    #[test]
    fn test_network_pattern_for_three_connected_columns() {
        let base = noise(150, 1.0, 5);
        let a: Vec<f64> = base.iter().map(|v| v * 1.0).collect();
        let b: Vec<f64> = base
            .iter()
            .zip(noise(150, 0.3, 6))
            .map(|(v, e)| v + e)
            .collect();
        let c: Vec<f64> = base
            .iter()
            .zip(noise(150, 0.3, 7))
            .map(|(v, e)| -v + e)
            .collect();

        let frame = Frame::from_json(&json!({"a": a, "b": b, "c": c})).unwrap();
        let patterns = detect(&frame, &["a", "b", "c"]);

        let network = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::NetworkCorrelation)
            .expect("network pattern");
        assert_eq!(network.param_f64("num_variables", 0.0) as usize, 3);
        assert_eq!(network.param_f64("num_components", 0.0) as usize, 1);
    }

    #[test]
    fn test_lag_correlation_with_time_axis() {
        let driver = noise(200, 1.0, 11);
        let mut follower = vec![0.0; 200];
        for i in 3..200 {
            follower[i] = driver[i - 3] * 1.5;
        }
        let timestamps: Vec<String> = (0..200)
            .map(|i| format!("2024-01-01 {:02}:{:02}:00", (i / 60) % 24, i % 60))
            .collect();

        let frame = Frame::from_json(&json!({
            "timestamp": timestamps,
            "driver": driver,
            "follower": follower,
        }))
        .unwrap();

        let patterns = detect(&frame, &["driver", "follower"]);
        let lag = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::LagCorrelation)
            .expect("lag pattern");
        assert_eq!(lag.param_f64("best_lag", 0.0) as i64, 3);
        assert_eq!(lag.parameters["leader"], json!("driver"));
    }

    #[test]
    fn test_single_column_returns_empty() {
        let frame = Frame::from_json(&json!({"x": noise(100, 1.0, 13)})).unwrap();
        assert!(detect(&frame, &["x"]).is_empty());
    }
}
