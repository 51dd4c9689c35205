//! Time-series pattern detection: trends, seasonality, stationarity,
//! autocorrelation and change points
//!
//! Requires a temporal axis on the frame; the series is analysed in
//! timestamp order.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use super::models::{
    Detector, DetectorConfig, Impact, Pattern, PatternContext, PatternEvidence, PatternType,
};
use super::numeric;
use super::statistical::{hints, tests};
use crate::services::frame::Frame;

#[derive(Debug, Clone)]
pub struct TimeSeriesDetectorConfig {
    pub base: DetectorConfig,
    /// Minimum points before a series is analysed
    pub min_periods: usize,
    /// var(seasonal) / var(total) needed to report seasonality
    pub seasonality_threshold: f64,
    /// Minimum |r| for a trend to be reported
    pub trend_threshold: f64,
}

impl Default for TimeSeriesDetectorConfig {
    fn default() -> Self {
        Self {
            base: DetectorConfig::default(),
            min_periods: 50,
            seasonality_threshold: 0.1,
            trend_threshold: 0.05,
        }
    }
}

/// Inferred sampling frequency of the temporal axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frequency {
    Minutely,
    Hourly,
    Daily,
    Unknown,
}

impl Frequency {
    /// Candidate seasonal periods to test for this frequency
    fn candidate_periods(self) -> &'static [usize] {
        match self {
            Frequency::Hourly => &[24, 168],
            Frequency::Daily => &[7, 30, 365],
            Frequency::Minutely => &[60, 1440],
            Frequency::Unknown => &[12, 52],
        }
    }
}

pub struct TimeSeriesDetector {
    config: TimeSeriesDetectorConfig,
}

impl TimeSeriesDetector {
    pub fn new(config: TimeSeriesDetectorConfig) -> Self {
        Self { config }
    }

    fn detect_trend(&self, name: &str, values: &[f64]) -> Option<Pattern> {
        let x: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
        let fit = numeric::linregress(&x, values)?;

        if fit.p_value >= 0.05 || fit.r.abs() < self.config.trend_threshold {
            return None;
        }
        let direction = if fit.slope > 0.0 { "increasing" } else { "decreasing" };

        // Log fit on the positive subsequence: exponential evidence only
        // when it both explains more variance and agrees in direction
        let mut pattern_type = PatternType::TrendLinear;
        let mut parameters = Map::new();
        let positives: Vec<(f64, f64)> = x
            .iter()
            .zip(values)
            .filter(|&(_, &v)| v > 0.0)
            .map(|(&i, &v)| (i, v.ln()))
            .collect();
        if positives.len() as f64 > self.config.min_periods as f64 * 0.8 {
            let log_x: Vec<f64> = positives.iter().map(|(i, _)| *i).collect();
            let log_y: Vec<f64> = positives.iter().map(|(_, v)| *v).collect();
            if let Some(log_fit) = numeric::linregress(&log_x, &log_y)
                && log_fit.r.abs() > fit.r.abs()
                && log_fit.p_value < 0.05
                && log_fit.slope.signum() == fit.slope.signum()
            {
                pattern_type = PatternType::TrendExponential;
                let growth_rate = (log_fit.slope.exp() - 1.0) * 100.0;
                parameters.insert("trend_type".into(), json!("exponential"));
                parameters.insert("growth_rate_percent".into(), json!(growth_rate));
                parameters.insert("r_squared".into(), json!(log_fit.r * log_fit.r));
                parameters.insert("p_value".into(), json!(log_fit.p_value));
            }
        }
        if pattern_type == PatternType::TrendLinear {
            parameters.insert("trend_type".into(), json!("linear"));
            parameters.insert("slope".into(), json!(fit.slope));
            parameters.insert("intercept".into(), json!(fit.intercept));
            parameters.insert("r_squared".into(), json!(fit.r * fit.r));
            parameters.insert("p_value".into(), json!(fit.p_value));
        }
        // Slope drives insight tallies for both trend kinds
        parameters
            .entry("slope".to_string())
            .or_insert_with(|| json!(fit.slope));

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        let trend_impact =
            if range > 0.0 { (fit.slope * values.len() as f64).abs() / range } else { 0.0 };
        parameters.insert("trend_impact".into(), json!(trend_impact));

        let evidence = vec![
            PatternEvidence::new(format!(
                "Statistical significance: p-value = {:.4}",
                fit.p_value
            ))
            .with_tests(tests(&[("p_value", fit.p_value), ("r_squared", fit.r * fit.r)])),
            PatternEvidence::new(format!(
                "Trend accounts for {:.1}% of value range",
                trend_impact * 100.0
            ))
            .with_tests(tests(&[("trend_impact", trend_impact)])),
        ];

        let trend_kind =
            if pattern_type == PatternType::TrendExponential { "exponential" } else { "linear" };
        let mut recommendations = vec![
            format!("Monitor {} trend in {}", direction, name),
            "Consider trend-adjusted analysis".to_string(),
            "Set up alerts for trend reversals".to_string(),
        ];
        if pattern_type == PatternType::TrendExponential {
            recommendations
                .push("Exponential growth/decay detected - may not be sustainable".to_string());
            recommendations.push("Consider log transformation for analysis".to_string());
        }

        Some(Pattern {
            pattern_type,
            confidence: fit.r.abs().min(0.95),
            description: format!("{} shows {} {} trend", name, direction, trend_kind),
            columns: vec![name.to_string()],
            parameters,
            evidence,
            detected_at: Utc::now(),
            impact: if trend_impact > 0.5 { Impact::High } else { Impact::Medium },
            recommendations,
            visual_hints: hints(&[
                ("chart_type", json!("line_chart")),
                ("overlay", json!("trend_line")),
                ("show_confidence_interval", json!(true)),
            ]),
        })
    }

    fn detect_seasonality(
        &self,
        name: &str,
        values: &[f64],
        frequency: Frequency,
    ) -> Vec<Pattern> {
        let mut patterns = Vec::new();

        for &period in frequency.candidate_periods() {
            if values.len() < period * 2 {
                continue;
            }
            let Some(decomp) = numeric::seasonal_decompose_additive(values, period) else {
                continue;
            };
            if decomp.strength <= self.config.seasonality_threshold {
                continue;
            }

            let season_type = match period {
                7 => "weekly".to_string(),
                24 => "daily".to_string(),
                30 => "monthly".to_string(),
                365 => "yearly".to_string(),
                p => format!("{}-period", p),
            };

            let peak = decomp
                .seasonal_means
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap_or(0);
            let trough = decomp
                .seasonal_means
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap_or(0);

            let mut parameters = Map::new();
            parameters.insert("period".into(), json!(period));
            parameters.insert("seasonality_type".into(), json!(season_type));
            parameters.insert("seasonality_strength".into(), json!(decomp.strength));
            parameters.insert("peak_position".into(), json!(peak));
            parameters.insert("trough_position".into(), json!(trough));
            parameters.insert("amplitude".into(), json!(decomp.amplitude));

            patterns.push(Pattern {
                pattern_type: PatternType::Seasonal,
                confidence: (decomp.strength * 2.0).min(0.95),
                description: format!("{} shows {} seasonality", name, season_type),
                columns: vec![name.to_string()],
                parameters,
                evidence: vec![
                    PatternEvidence::new(format!(
                        "Seasonality accounts for {:.1}% of variance",
                        decomp.strength * 100.0
                    ))
                    .with_tests(tests(&[("seasonality_strength", decomp.strength)])),
                    PatternEvidence::new(format!(
                        "Peak at position {}, trough at position {}",
                        peak, trough
                    ))
                    .with_data_points(vec![
                        json!({"position": peak, "type": "peak", "value": decomp.seasonal_means[peak]}),
                        json!({"position": trough, "type": "trough", "value": decomp.seasonal_means[trough]}),
                    ]),
                ],
                detected_at: Utc::now(),
                impact: if decomp.strength > 0.3 { Impact::High } else { Impact::Medium },
                recommendations: vec![
                    format!("Account for {} seasonality in forecasting", season_type),
                    format!("Peak activity at position {} of {}", peak, period),
                    "Consider seasonal adjustments for fair comparisons".to_string(),
                ],
                visual_hints: hints(&[
                    ("chart_type", json!("line_chart")),
                    ("show_decomposition", json!(true)),
                    ("highlight_period", json!(period)),
                ]),
            });
        }

        patterns
    }

    fn detect_stationarity(&self, name: &str, values: &[f64]) -> Option<Pattern> {
        let adf = numeric::adf_test(values)?;
        let kpss = numeric::kpss_test(values)?;

        let stationary_by_adf = adf.p_value < 0.05;
        let stationary_by_kpss = kpss.p_value > 0.05;

        // Disagreement between the tests is suppressed, not reported
        let (pattern_type, label, recommendations) = if stationary_by_adf && stationary_by_kpss {
            (
                PatternType::Stationary,
                "stationary",
                vec![
                    format!("{} is stationary - suitable for many time series models", name),
                    "Can use ARIMA models without differencing".to_string(),
                    "Statistical properties are consistent over time".to_string(),
                ],
            )
        } else if !stationary_by_adf && !stationary_by_kpss {
            (
                PatternType::NonStationary,
                "non-stationary",
                vec![
                    format!("{} is non-stationary - consider differencing", name),
                    "May need transformation before modeling".to_string(),
                    "Check for trends or structural breaks".to_string(),
                ],
            )
        } else {
            return None;
        };

        let mut parameters = Map::new();
        parameters.insert("stationarity".into(), json!(label));
        parameters.insert("adf_pvalue".into(), json!(adf.p_value));
        parameters.insert("kpss_pvalue".into(), json!(kpss.p_value));

        Some(Pattern {
            pattern_type,
            confidence: 0.9,
            description: format!("{} is {}", name, label),
            columns: vec![name.to_string()],
            parameters,
            evidence: vec![
                PatternEvidence::new(format!(
                    "ADF test: statistic={:.4}, p-value={:.4}",
                    adf.statistic, adf.p_value
                ))
                .with_tests(tests(&[
                    ("adf_statistic", adf.statistic),
                    ("adf_pvalue", adf.p_value),
                ])),
                PatternEvidence::new(format!(
                    "KPSS test: statistic={:.4}, p-value={:.4}",
                    kpss.statistic, kpss.p_value
                ))
                .with_tests(tests(&[
                    ("kpss_statistic", kpss.statistic),
                    ("kpss_pvalue", kpss.p_value),
                ])),
            ],
            detected_at: Utc::now(),
            impact: Impact::Medium,
            recommendations,
            visual_hints: Map::new(),
        })
    }

    fn detect_autocorrelation(&self, name: &str, values: &[f64]) -> Option<Pattern> {
        let max_lag = 40.min(values.len() / 4);
        if max_lag == 0 {
            return None;
        }
        let rows = numeric::ljung_box(values, max_lag);
        let significant: Vec<&numeric::LjungBoxRow> =
            rows.iter().filter(|r| r.p_value < 0.05).collect();
        if significant.is_empty() {
            return None;
        }

        let max_sig_lag = significant.iter().map(|r| r.lag).max().unwrap_or(1);
        let autocorr = numeric::acf(values, max_sig_lag);

        let mut lag_acf: Vec<(usize, f64)> = significant
            .iter()
            .take(5)
            .map(|r| (r.lag, autocorr[r.lag]))
            .collect();
        lag_acf.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        let (strongest_lag, strongest_acf) = lag_acf[0];

        let significant_lags: Vec<usize> = significant.iter().map(|r| r.lag).collect();
        let early_lags: Vec<usize> = significant_lags.iter().take(3).copied().collect();

        let (description_kind, recommendations) = if early_lags.contains(&1) {
            (
                "strong temporal dependence",
                vec![
                    "Consider autoregressive (AR) models".to_string(),
                    "Previous values strongly predict future values".to_string(),
                ],
            )
        } else if significant_lags.iter().take(5).any(|&lag| lag % 7 == 0) {
            (
                "weekly autocorrelation pattern",
                vec![
                    "Weekly patterns detected in autocorrelation".to_string(),
                    "Consider seasonal ARIMA models".to_string(),
                ],
            )
        } else {
            (
                "complex autocorrelation structure",
                vec![
                    "Complex temporal dependencies detected".to_string(),
                    "Consider ARIMA or state-space models".to_string(),
                ],
            )
        };

        let mut lag_tests = Map::new();
        for row in significant.iter().take(5) {
            lag_tests.insert(format!("lag_{}", row.lag), json!(row.p_value));
        }

        let mut parameters = Map::new();
        parameters.insert(
            "significant_lags".into(),
            json!(significant_lags.iter().take(10).collect::<Vec<_>>()),
        );
        parameters.insert("max_lag_tested".into(), json!(max_lag));
        parameters.insert("strongest_lag".into(), json!(strongest_lag));
        parameters.insert("strongest_acf".into(), json!(strongest_acf));

        Some(Pattern {
            pattern_type: PatternType::Cyclic,
            confidence: (significant_lags.len() as f64 / 10.0).min(0.9),
            description: format!("{} shows {}", name, description_kind),
            columns: vec![name.to_string()],
            parameters,
            evidence: vec![
                PatternEvidence::new(format!(
                    "Significant autocorrelation at {} lags",
                    significant_lags.len()
                ))
                .with_tests(lag_tests),
                PatternEvidence::new(format!(
                    "Strongest correlation at lag {} (r={:.3})",
                    strongest_lag, strongest_acf
                ))
                .with_data_points(
                    lag_acf
                        .iter()
                        .map(|(lag, r)| json!({"lag": lag, "acf": r}))
                        .collect(),
                ),
            ],
            detected_at: Utc::now(),
            impact: Impact::Medium,
            recommendations,
            visual_hints: hints(&[
                ("chart_type", json!("acf_plot")),
                ("max_lags", json!(strongest_lag + 5)),
            ]),
        })
    }

    fn detect_change_points(
        &self,
        name: &str,
        values: &[f64],
        stamps: &[Option<DateTime<Utc>>],
    ) -> Vec<Pattern> {
        let n = values.len();
        let window = (n / 20).max(10);
        if n < window * 2 + 1 {
            return Vec::new();
        }

        let rolling = numeric::rolling_mean_centered(values, window);
        let diffs: Vec<Option<f64>> = rolling
            .windows(2)
            .map(|w| match (w[0], w[1]) {
                (Some(a), Some(b)) => Some((b - a).abs()),
                _ => None,
            })
            .collect();
        let dense_diffs: Vec<f64> = diffs.iter().flatten().copied().collect();
        if dense_diffs.len() < 3 {
            return Vec::new();
        }
        let threshold = numeric::std_dev(&dense_diffs) * 2.0;

        let mut candidates = Vec::new();
        for i in window..n - window {
            let Some(diff) = diffs.get(i - 1).copied().flatten() else {
                continue;
            };
            if diff <= threshold {
                continue;
            }
            let before = numeric::mean(&values[i - window..i]);
            let after = numeric::mean(&values[i..i + window]);
            let magnitude = (after - before).abs();
            let relative = if before != 0.0 { magnitude / before.abs() } else { f64::INFINITY };

            if relative > 0.2 {
                candidates.push((i, before, after, magnitude, relative));
            }
        }

        candidates.sort_by(|a, b| b.4.total_cmp(&a.4));
        candidates.truncate(3);

        candidates
            .into_iter()
            .map(|(index, before, after, magnitude, relative)| {
                let timestamp = stamps
                    .get(index)
                    .copied()
                    .flatten()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| index.to_string());

                let mut parameters = Map::new();
                parameters.insert("index".into(), json!(index));
                parameters.insert("timestamp".into(), json!(timestamp));
                parameters.insert("before_mean".into(), json!(before));
                parameters.insert("after_mean".into(), json!(after));
                parameters.insert("change_magnitude".into(), json!(magnitude));
                parameters.insert("relative_change".into(), json!(relative));

                Pattern {
                    pattern_type: PatternType::ChangePoint,
                    confidence: relative.min(0.9),
                    description: format!(
                        "Significant change detected in {} at index {}",
                        name, index
                    ),
                    columns: vec![name.to_string()],
                    parameters: parameters.clone(),
                    evidence: vec![
                        PatternEvidence::new(format!(
                            "Mean changed from {:.2} to {:.2}",
                            before, after
                        ))
                        .with_data_points(vec![Value::Object(parameters)]),
                        PatternEvidence::new(format!("Relative change: {:.1}%", relative * 100.0))
                            .with_tests(tests(&[("relative_change", relative)])),
                    ],
                    detected_at: Utc::now(),
                    impact: if relative > 0.5 { Impact::High } else { Impact::Medium },
                    recommendations: vec![
                        format!("Investigate what happened around {}", timestamp),
                        "Consider separate models before/after change point".to_string(),
                        "May indicate system change or external event".to_string(),
                    ],
                    visual_hints: hints(&[
                        ("chart_type", json!("line_chart")),
                        ("highlight_points", json!([index])),
                        ("show_change_annotation", json!(true)),
                    ]),
                }
            })
            .collect()
    }
}

/// Infer sampling frequency from the median spacing of the axis
fn infer_frequency(stamps: &[Option<DateTime<Utc>>]) -> Frequency {
    let dense: Vec<i64> = stamps
        .iter()
        .flatten()
        .map(|t| t.timestamp())
        .collect();
    if dense.len() < 3 {
        return Frequency::Unknown;
    }
    let mut gaps: Vec<f64> = dense.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    gaps.sort_by(|a, b| a.total_cmp(b));
    let median_gap = gaps[gaps.len() / 2];

    if median_gap <= 0.0 {
        Frequency::Unknown
    } else if median_gap < 3600.0 {
        Frequency::Minutely
    } else if median_gap < 86_400.0 {
        Frequency::Hourly
    } else if median_gap < 86_400.0 * 7.0 {
        Frequency::Daily
    } else {
        Frequency::Unknown
    }
}

impl Detector for TimeSeriesDetector {
    fn name(&self) -> &'static str {
        "timeseries"
    }

    fn supported_types(&self) -> &'static [PatternType] {
        &[
            PatternType::TrendLinear,
            PatternType::TrendExponential,
            PatternType::Seasonal,
            PatternType::Cyclic,
            PatternType::Stationary,
            PatternType::NonStationary,
            PatternType::ChangePoint,
        ]
    }

    fn detect(&self, frame: &Frame, columns: &[String], context: &PatternContext) -> Vec<Pattern> {
        let sorted;
        let frame = if frame.time_axis().is_some() {
            sorted = frame.sort_by_time_axis();
            &sorted
        } else {
            frame
        };

        let stamps: Vec<Option<DateTime<Utc>>> = frame
            .time_axis()
            .and_then(|axis| axis.temporals().map(|s| s.to_vec()))
            .unwrap_or_default();
        let has_axis = !stamps.is_empty();
        let frequency = infer_frequency(&stamps);

        let mut patterns = Vec::new();

        for name in columns {
            if context.deadline_expired() {
                break;
            }
            let Some(column) = frame.column(name) else {
                continue;
            };
            if !column.dtype().is_numeric() {
                continue;
            }
            let values = column.numeric_dense();
            if values.len() < self.config.min_periods
                || values.len() < self.config.base.min_samples
            {
                continue;
            }

            if let Some(pattern) = self.detect_trend(name, &values) {
                patterns.push(pattern);
            }
            if has_axis {
                patterns.extend(self.detect_seasonality(name, &values, frequency));
            }
            if let Some(pattern) = self.detect_stationarity(name, &values) {
                patterns.push(pattern);
            }
            if let Some(pattern) = self.detect_autocorrelation(name, &values) {
                patterns.push(pattern);
            }
            patterns.extend(self.detect_change_points(name, &values, &stamps));
        }

        // Returned patterns honor the configured confidence floor
        patterns.retain(|p| p.confidence >= self.config.base.confidence_threshold);
        patterns
    }
}

#[cfg(test)]
mod tests_mod {
    use super::*;
    use serde_json::json;

    fn hourly_frame(values: &[f64]) -> Frame {
        let timestamps: Vec<Value> = (0..values.len())
            .map(|i| {
                let t = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap()
                    + chrono::Duration::hours(i as i64);
                json!(t.format("%Y-%m-%d %H:%M:%S").to_string())
            })
            .collect();
        Frame::from_json(&json!({
            "timestamp": timestamps,
            "value": values.iter().copied().collect::<Vec<f64>>(),
        }))
        .unwrap()
    }

    fn detect(frame: &Frame) -> Vec<Pattern> {
        let detector = TimeSeriesDetector::new(TimeSeriesDetectorConfig::default());
        detector.detect(frame, &["value".to_string()], &PatternContext::default())
    }

    #[test]
    fn test_linear_trend_detected() {
        let values: Vec<f64> = (0..100).map(|i| 10.0 + 0.5 * i as f64).collect();
        let patterns = detect(&hourly_frame(&values));
        let trend = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::TrendLinear)
            .expect("trend pattern");
        assert!(trend.param_f64("slope", 0.0) > 0.4);
        assert!(trend.confidence >= 0.9);
    }

    #[test]
    fn test_daily_seasonality_detected() {
        let values: Vec<f64> = (0..168)
            .map(|i| 50.0 + 10.0 * (2.0 * std::f64::consts::PI * i as f64 / 24.0).sin())
            .collect();
        let patterns = detect(&hourly_frame(&values));
        let seasonal = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::Seasonal)
            .expect("seasonal pattern");
        assert_eq!(seasonal.param_f64("period", 0.0) as usize, 24);
        assert!(seasonal.param_f64("seasonality_strength", 0.0) >= 0.1);
    }

    #[test]
    fn test_change_point_detected() {
        let values: Vec<f64> = (0..120)
            .map(|i| if i < 60 { 10.0 + (i % 3) as f64 * 0.1 } else { 30.0 + (i % 3) as f64 * 0.1 })
            .collect();
        let patterns = detect(&hourly_frame(&values));
        let cp = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::ChangePoint)
            .expect("change point pattern");
        let index = cp.param_f64("index", 0.0) as usize;
        assert!((55..=65).contains(&index), "change near 60, got {}", index);
    }

    #[test]
    fn test_cyclic_pattern_from_autocorrelation() {
        let values: Vec<f64> = (0..200)
            .map(|i| (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin() * 5.0 + 20.0)
            .collect();
        let patterns = detect(&hourly_frame(&values));
        assert!(patterns.iter().any(|p| p.pattern_type == PatternType::Cyclic));
    }

    #[test]
    fn test_short_series_ignored() {
        let values: Vec<f64> = (0..30).map(|i| i as f64).collect();
        assert!(detect(&hourly_frame(&values)).is_empty());
    }

    #[test]
    fn test_exponential_trend_requires_matching_sign() {
        // Exponential growth: log fit should beat linear and agree in sign
        let values: Vec<f64> = (0..100).map(|i| 10.0 * (0.05 * i as f64).exp()).collect();
        let patterns = detect(&hourly_frame(&values));
        assert!(
            patterns
                .iter()
                .any(|p| p.pattern_type == PatternType::TrendExponential)
        );
    }
}
