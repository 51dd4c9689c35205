//! Shared numeric routines for the pattern detectors
//!
//! Everything here is pure over slices of f64. The statistical tests
//! return classical two-sided p-values via `statrs` distributions; the
//! randomised algorithms (isolation forest) are seeded so repeated runs
//! over the same frame produce identical scores.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use statrs::distribution::{ChiSquared, ContinuousCDF, StudentsT};

// ============================================================================
// Moments and summaries
// ============================================================================

pub fn mean(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    x.iter().sum::<f64>() / x.len() as f64
}

/// Sample variance (ddof = 1)
pub fn variance(x: &[f64]) -> f64 {
    if x.len() < 2 {
        return 0.0;
    }
    let m = mean(x);
    x.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (x.len() - 1) as f64
}

pub fn std_dev(x: &[f64]) -> f64 {
    variance(x).sqrt()
}

/// Quantile with linear interpolation between order statistics
pub fn quantile(x: &[f64], q: f64) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    let mut sorted = x.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

pub fn median(x: &[f64]) -> f64 {
    quantile(x, 0.5)
}

/// Central moment of the given order (biased)
fn central_moment(x: &[f64], order: i32) -> f64 {
    let m = mean(x);
    x.iter().map(|v| (v - m).powi(order)).sum::<f64>() / x.len() as f64
}

/// Biased sample skewness g1 = m3 / m2^1.5
pub fn skewness_biased(x: &[f64]) -> f64 {
    let m2 = central_moment(x, 2);
    if m2 <= 0.0 {
        return 0.0;
    }
    central_moment(x, 3) / m2.powf(1.5)
}

/// Adjusted Fisher-Pearson skewness, matching the pandas convention
pub fn skewness(x: &[f64]) -> f64 {
    let n = x.len() as f64;
    if n < 3.0 {
        return 0.0;
    }
    skewness_biased(x) * (n * (n - 1.0)).sqrt() / (n - 2.0)
}

/// Biased kurtosis b2 = m4 / m2^2 (not excess)
pub fn kurtosis_biased(x: &[f64]) -> f64 {
    let m2 = central_moment(x, 2);
    if m2 <= 0.0 {
        return 0.0;
    }
    central_moment(x, 4) / (m2 * m2)
}

/// Adjusted excess kurtosis, matching the pandas convention
pub fn kurtosis(x: &[f64]) -> f64 {
    let n = x.len() as f64;
    if n < 4.0 {
        return 0.0;
    }
    let g2 = kurtosis_biased(x) - 3.0;
    ((n - 1.0) / ((n - 2.0) * (n - 3.0))) * ((n + 1.0) * g2 + 6.0)
}

/// Basic descriptive statistics for a numeric column
#[derive(Debug, Clone)]
pub struct NumericSummary {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub skew: f64,
    pub kurtosis: f64,
    pub min: f64,
    pub max: f64,
    pub q1: f64,
    pub q3: f64,
}

pub fn describe(x: &[f64]) -> NumericSummary {
    NumericSummary {
        mean: mean(x),
        median: median(x),
        std: std_dev(x),
        skew: skewness(x),
        kurtosis: kurtosis(x),
        min: x.iter().copied().fold(f64::INFINITY, f64::min),
        max: x.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        q1: quantile(x, 0.25),
        q3: quantile(x, 0.75),
    }
}

pub fn zscores(x: &[f64]) -> Vec<f64> {
    let m = mean(x);
    let s = std_dev(x);
    if s <= 0.0 {
        return vec![0.0; x.len()];
    }
    x.iter().map(|v| (v - m) / s).collect()
}

// ============================================================================
// Correlation and regression
// ============================================================================

/// Pearson correlation with a two-sided t-test p-value
pub fn pearson(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len().min(y.len());
    if n < 3 {
        return (0.0, 1.0);
    }
    let mx = mean(&x[..n]);
    let my = mean(&y[..n]);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for i in 0..n {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return (0.0, 1.0);
    }
    let r = (sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0);
    (r, correlation_p_value(r, n))
}

fn correlation_p_value(r: f64, n: usize) -> f64 {
    let df = n as f64 - 2.0;
    if df <= 0.0 {
        return 1.0;
    }
    if r.abs() >= 1.0 {
        return 0.0;
    }
    let t = r * (df / (1.0 - r * r)).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

/// Average ranks, with ties sharing the mean rank
pub fn ranks(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));

    let mut out = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && x[order[j + 1]] == x[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            out[idx] = avg_rank;
        }
        i = j + 1;
    }
    out
}

/// Spearman rank correlation with p-value
pub fn spearman(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len().min(y.len());
    if n < 3 {
        return (0.0, 1.0);
    }
    let rx = ranks(&x[..n]);
    let ry = ranks(&y[..n]);
    pearson(&rx, &ry)
}

/// Kendall tau-b with a normal-approximation p-value
pub fn kendall_tau(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len().min(y.len());
    if n < 3 {
        return (0.0, 1.0);
    }
    let mut concordant = 0_i64;
    let mut discordant = 0_i64;
    let mut ties_x = 0_i64;
    let mut ties_y = 0_i64;

    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];
            if dx == 0.0 && dy == 0.0 {
                continue;
            } else if dx == 0.0 {
                ties_x += 1;
            } else if dy == 0.0 {
                ties_y += 1;
            } else if (dx > 0.0) == (dy > 0.0) {
                concordant += 1;
            } else {
                discordant += 1;
            }
        }
    }

    let n0 = (n * (n - 1) / 2) as f64;
    let denom = ((n0 - ties_x as f64) * (n0 - ties_y as f64)).sqrt();
    if denom <= 0.0 {
        return (0.0, 1.0);
    }
    let tau = (concordant - discordant) as f64 / denom;

    // Normal approximation for the null distribution of tau
    let nf = n as f64;
    let var = (2.0 * (2.0 * nf + 5.0)) / (9.0 * nf * (nf - 1.0));
    let z = tau / var.sqrt();
    let p = 2.0 * (1.0 - standard_normal_cdf(z.abs()));
    (tau, p.clamp(0.0, 1.0))
}

fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

// Abramowitz & Stegun 7.1.26 rational approximation
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let y = 1.0
        - (((((1.061405429 * t - 1.453152027) * t) + 1.421413741) * t - 0.284496736) * t
            + 0.254829592)
            * t
            * (-x * x).exp();
    sign * y
}

/// Ordinary least squares over (x, y) pairs
#[derive(Debug, Clone)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r: f64,
    pub p_value: f64,
    pub std_err: f64,
}

pub fn linregress(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    let n = x.len().min(y.len());
    if n < 3 {
        return None;
    }
    let mx = mean(&x[..n]);
    let my = mean(&y[..n]);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for i in 0..n {
        sxy += (x[i] - mx) * (y[i] - my);
        sxx += (x[i] - mx).powi(2);
    }
    if sxx <= 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    let intercept = my - slope * mx;
    let (r, p_value) = pearson(&x[..n], &y[..n]);

    let residual_ss: f64 = (0..n)
        .map(|i| (y[i] - (intercept + slope * x[i])).powi(2))
        .sum();
    let df = (n - 2) as f64;
    let std_err = if df > 0.0 { (residual_ss / df / sxx).sqrt() } else { 0.0 };

    Some(LinearFit { slope, intercept, r, p_value, std_err })
}

// ============================================================================
// Normality (D'Agostino K-squared omnibus)
// ============================================================================

/// Omnibus normality test combining skewness and kurtosis.
/// Returns (k2 statistic, p-value); None below the minimum sample size.
pub fn normal_omnibus_test(x: &[f64]) -> Option<(f64, f64)> {
    let n = x.len();
    if n < 20 {
        return None;
    }
    let z1 = skew_test_z(x)?;
    let z2 = kurtosis_test_z(x)?;
    let k2 = z1 * z1 + z2 * z2;
    // Chi-squared with 2 degrees of freedom: sf(x) = exp(-x / 2)
    let p = (-k2 / 2.0).exp().clamp(0.0, 1.0);
    Some((k2, p))
}

fn skew_test_z(x: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    if n < 8.0 {
        return None;
    }
    let b1 = skewness_biased(x);
    let mut y = b1 * (((n + 1.0) * (n + 3.0)) / (6.0 * (n - 2.0))).sqrt();
    let beta2 = 3.0 * (n * n + 27.0 * n - 70.0) * (n + 1.0) * (n + 3.0)
        / ((n - 2.0) * (n + 5.0) * (n + 7.0) * (n + 9.0));
    let w2 = -1.0 + (2.0 * (beta2 - 1.0)).sqrt();
    let delta = 1.0 / (0.5 * w2.ln()).sqrt();
    let alpha = (2.0 / (w2 - 1.0)).sqrt();
    if y == 0.0 {
        y = 1.0;
    }
    Some(delta * (y / alpha + ((y / alpha).powi(2) + 1.0).sqrt()).ln())
}

fn kurtosis_test_z(x: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    if n < 5.0 {
        return None;
    }
    let b2 = kurtosis_biased(x);
    let e = 3.0 * (n - 1.0) / (n + 1.0);
    let var_b2 = 24.0 * n * (n - 2.0) * (n - 3.0) / ((n + 1.0).powi(2) * (n + 3.0) * (n + 5.0));
    let x_stat = (b2 - e) / var_b2.sqrt();
    let sqrt_beta1 = 6.0 * (n * n - 5.0 * n + 2.0) / ((n + 7.0) * (n + 9.0))
        * ((6.0 * (n + 3.0) * (n + 5.0)) / (n * (n - 2.0) * (n - 3.0))).sqrt();
    let a = 6.0 + 8.0 / sqrt_beta1 * (2.0 / sqrt_beta1 + (1.0 + 4.0 / sqrt_beta1.powi(2)).sqrt());
    let term1 = 1.0 - 2.0 / (9.0 * a);
    let denom = 1.0 + x_stat * (2.0 / (a - 4.0)).sqrt();
    if denom == 0.0 {
        return None;
    }
    let term2 = denom.signum() * ((1.0 - 2.0 / a) / denom.abs()).cbrt();
    Some((term1 - term2) / (2.0 / (9.0 * a)).sqrt())
}

// ============================================================================
// Gaussian mixture (EM with deterministic quantile initialisation)
// ============================================================================

#[derive(Debug, Clone)]
pub struct GmmFit {
    pub means: Vec<f64>,
    pub variances: Vec<f64>,
    pub weights: Vec<f64>,
    pub bic: f64,
}

/// Fit a k-component univariate Gaussian mixture by EM.
/// Initialisation places means at evenly spaced quantiles so the fit is
/// deterministic for a given input.
pub fn fit_gmm(x: &[f64], k: usize) -> Option<GmmFit> {
    let n = x.len();
    if n < k * 4 || k == 0 {
        return None;
    }
    let total_var = variance(x).max(1e-12);
    let floor = total_var * 1e-6;

    let mut means: Vec<f64> = (0..k)
        .map(|i| quantile(x, (i as f64 + 0.5) / k as f64))
        .collect();
    let mut variances = vec![(total_var / k as f64).max(floor); k];
    let mut weights = vec![1.0 / k as f64; k];

    let mut resp = vec![vec![0.0; k]; n];
    let mut prev_ll = f64::NEG_INFINITY;
    let mut log_likelihood = prev_ll;

    for _ in 0..200 {
        // E step
        log_likelihood = 0.0;
        for (i, &xi) in x.iter().enumerate() {
            let mut total = 0.0;
            for j in 0..k {
                let p = weights[j] * gaussian_pdf(xi, means[j], variances[j]);
                resp[i][j] = p;
                total += p;
            }
            if total <= 0.0 {
                total = f64::MIN_POSITIVE;
            }
            for j in 0..k {
                resp[i][j] /= total;
            }
            log_likelihood += total.ln();
        }

        // M step
        for j in 0..k {
            let nj: f64 = resp.iter().map(|r| r[j]).sum();
            if nj <= 0.0 {
                continue;
            }
            let mu = resp
                .iter()
                .zip(x)
                .map(|(r, &xi)| r[j] * xi)
                .sum::<f64>()
                / nj;
            let var = resp
                .iter()
                .zip(x)
                .map(|(r, &xi)| r[j] * (xi - mu).powi(2))
                .sum::<f64>()
                / nj;
            means[j] = mu;
            variances[j] = var.max(floor);
            weights[j] = nj / n as f64;
        }

        if (log_likelihood - prev_ll).abs() < 1e-6 {
            break;
        }
        prev_ll = log_likelihood;
    }

    // Parameter count: k means, k variances, k-1 free weights
    let params = (3 * k - 1) as f64;
    let bic = -2.0 * log_likelihood + params * (n as f64).ln();

    Some(GmmFit { means, variances, weights, bic })
}

fn gaussian_pdf(x: f64, mean: f64, var: f64) -> f64 {
    let var = var.max(f64::MIN_POSITIVE);
    (-((x - mean).powi(2)) / (2.0 * var)).exp() / (2.0 * std::f64::consts::PI * var).sqrt()
}

// ============================================================================
// Stationarity (ADF and KPSS with interpolated p-values)
// ============================================================================

#[derive(Debug, Clone)]
pub struct StationarityTest {
    pub statistic: f64,
    pub p_value: f64,
}

/// Augmented Dickey-Fuller test with constant, Schwert lag rule.
/// The p-value is interpolated from the tabulated critical values.
pub fn adf_test(x: &[f64]) -> Option<StationarityTest> {
    let n = x.len();
    if n < 20 {
        return None;
    }
    let max_lag = ((12.0 * (n as f64 / 100.0).powf(0.25)) as usize).min(n / 2 - 2);
    let diffs: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();

    // Rows start after max_lag differences are available
    let rows = diffs.len() - max_lag;
    if rows < max_lag + 4 {
        return None;
    }
    let k = max_lag + 2; // intercept + lagged level + lagged diffs

    let mut design = Vec::with_capacity(rows);
    let mut target = Vec::with_capacity(rows);
    for t in max_lag..diffs.len() {
        let mut row = Vec::with_capacity(k);
        row.push(1.0);
        row.push(x[t]); // y_{t-1} for the diff at index t
        for lag in 1..=max_lag {
            row.push(diffs[t - lag]);
        }
        design.push(row);
        target.push(diffs[t]);
    }

    let (coefs, std_errs) = ols(&design, &target)?;
    let stat = coefs[1] / std_errs[1];

    // Interpolation through the Dickey-Fuller critical values (constant only)
    let p = interpolate_p(
        stat,
        &[(-4.5, 0.001), (-3.43, 0.01), (-2.86, 0.05), (-2.57, 0.10), (-1.6, 0.5), (0.0, 0.95)],
    );
    Some(StationarityTest { statistic: stat, p_value: p })
}

/// KPSS test for level stationarity with a Bartlett long-run variance.
/// p-value interpolated from the tabulated critical values and clamped
/// to [0.01, 0.10] like the reference implementation.
pub fn kpss_test(x: &[f64]) -> Option<StationarityTest> {
    let n = x.len();
    if n < 20 {
        return None;
    }
    let m = mean(x);
    let residuals: Vec<f64> = x.iter().map(|v| v - m).collect();

    let mut partial = 0.0;
    let mut sum_sq_partial = 0.0;
    for &e in &residuals {
        partial += e;
        sum_sq_partial += partial * partial;
    }

    let lags = ((12.0 * (n as f64 / 100.0).powf(0.25)) as usize).min(n - 1);
    let gamma0: f64 = residuals.iter().map(|e| e * e).sum::<f64>() / n as f64;
    let mut long_run = gamma0;
    for j in 1..=lags {
        let gamma_j: f64 = residuals[j..]
            .iter()
            .zip(&residuals[..n - j])
            .map(|(a, b)| a * b)
            .sum::<f64>()
            / n as f64;
        long_run += 2.0 * (1.0 - j as f64 / (lags as f64 + 1.0)) * gamma_j;
    }
    if long_run <= 0.0 {
        return None;
    }

    let stat = sum_sq_partial / (n as f64 * n as f64 * long_run);
    let p = interpolate_p(
        stat,
        &[(0.347, 0.10), (0.463, 0.05), (0.574, 0.025), (0.739, 0.01)],
    )
    .clamp(0.01, 0.10);
    Some(StationarityTest { statistic: stat, p_value: p })
}

/// Piecewise-linear interpolation of a p-value over (statistic, p) knots.
/// Knots must be ordered by statistic ascending.
fn interpolate_p(stat: f64, knots: &[(f64, f64)]) -> f64 {
    if stat <= knots[0].0 {
        return knots[0].1;
    }
    if stat >= knots[knots.len() - 1].0 {
        return knots[knots.len() - 1].1;
    }
    for w in knots.windows(2) {
        let (s0, p0) = w[0];
        let (s1, p1) = w[1];
        if stat <= s1 {
            let frac = (stat - s0) / (s1 - s0);
            return p0 + frac * (p1 - p0);
        }
    }
    knots[knots.len() - 1].1
}

/// Multiple OLS via normal equations; returns (coefficients, standard errors)
fn ols(design: &[Vec<f64>], target: &[f64]) -> Option<(Vec<f64>, Vec<f64>)> {
    let n = design.len();
    let k = design.first()?.len();
    if n <= k {
        return None;
    }

    // X'X and X'y
    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, &y) in design.iter().zip(target) {
        for i in 0..k {
            xty[i] += row[i] * y;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    let inv = invert_matrix(&xtx)?;
    let coefs: Vec<f64> = (0..k)
        .map(|i| (0..k).map(|j| inv[i][j] * xty[j]).sum())
        .collect();

    let rss: f64 = design
        .iter()
        .zip(target)
        .map(|(row, &y)| {
            let fitted: f64 = row.iter().zip(&coefs).map(|(a, b)| a * b).sum();
            (y - fitted).powi(2)
        })
        .sum();
    let sigma2 = rss / (n - k) as f64;
    let std_errs: Vec<f64> = (0..k).map(|i| (inv[i][i] * sigma2).sqrt()).collect();

    Some((coefs, std_errs))
}

/// Gauss-Jordan inversion for the small matrices used here
fn invert_matrix(m: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let k = m.len();
    let mut aug: Vec<Vec<f64>> = m
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = row.clone();
            r.extend((0..k).map(|j| if i == j { 1.0 } else { 0.0 }));
            r
        })
        .collect();

    for col in 0..k {
        let pivot_row = (col..k).max_by(|&a, &b| aug[a][col].abs().total_cmp(&aug[b][col].abs()))?;
        if aug[pivot_row][col].abs() < 1e-12 {
            return None;
        }
        aug.swap(col, pivot_row);
        let pivot = aug[col][col];
        for v in aug[col].iter_mut() {
            *v /= pivot;
        }
        for row in 0..k {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            for j in 0..2 * k {
                aug[row][j] -= factor * aug[col][j];
            }
        }
    }

    Some(aug.into_iter().map(|row| row[k..].to_vec()).collect())
}

// ============================================================================
// Autocorrelation
// ============================================================================

/// Sample autocorrelation function up to nlags (index 0 is lag 0 = 1.0)
pub fn acf(x: &[f64], nlags: usize) -> Vec<f64> {
    let n = x.len();
    let m = mean(x);
    let denom: f64 = x.iter().map(|v| (v - m).powi(2)).sum();
    if denom <= 0.0 {
        return vec![0.0; nlags + 1];
    }
    (0..=nlags.min(n - 1))
        .map(|lag| {
            let num: f64 = x[lag..]
                .iter()
                .zip(&x[..n - lag])
                .map(|(a, b)| (a - m) * (b - m))
                .sum();
            num / denom
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct LjungBoxRow {
    pub lag: usize,
    pub statistic: f64,
    pub p_value: f64,
}

/// Ljung-Box Q statistics with chi-squared p-values for lags 1..=max_lag
pub fn ljung_box(x: &[f64], max_lag: usize) -> Vec<LjungBoxRow> {
    let n = x.len();
    if n < 3 || max_lag == 0 {
        return Vec::new();
    }
    let max_lag = max_lag.min(n - 2);
    let autocorr = acf(x, max_lag);
    let nf = n as f64;

    let mut q = 0.0;
    let mut rows = Vec::with_capacity(max_lag);
    for lag in 1..=max_lag {
        q += autocorr[lag].powi(2) / (nf - lag as f64);
        let statistic = nf * (nf + 2.0) * q;
        let p_value = match ChiSquared::new(lag as f64) {
            Ok(dist) => (1.0 - dist.cdf(statistic)).clamp(0.0, 1.0),
            Err(_) => 1.0,
        };
        rows.push(LjungBoxRow { lag, statistic, p_value });
    }
    rows
}

// ============================================================================
// Seasonal decomposition (additive)
// ============================================================================

#[derive(Debug, Clone)]
pub struct SeasonalDecomposition {
    /// var(seasonal) / var(series)
    pub strength: f64,
    /// Centered per-phase means, length = period
    pub seasonal_means: Vec<f64>,
    pub amplitude: f64,
}

/// Classical additive decomposition: centered moving-average trend,
/// per-phase seasonal means over the detrended series.
pub fn seasonal_decompose_additive(x: &[f64], period: usize) -> Option<SeasonalDecomposition> {
    let n = x.len();
    if period < 2 || n < period * 2 {
        return None;
    }

    let trend = centered_moving_average(x, period);

    let mut phase_sums = vec![0.0; period];
    let mut phase_counts = vec![0usize; period];
    for (i, t) in trend.iter().enumerate() {
        if let Some(tr) = t {
            phase_sums[i % period] += x[i] - tr;
            phase_counts[i % period] += 1;
        }
    }
    if phase_counts.iter().any(|&c| c == 0) {
        return None;
    }

    let mut seasonal_means: Vec<f64> = phase_sums
        .iter()
        .zip(&phase_counts)
        .map(|(s, &c)| s / c as f64)
        .collect();
    let grand = mean(&seasonal_means);
    for m in seasonal_means.iter_mut() {
        *m -= grand;
    }

    let seasonal_series: Vec<f64> = (0..n).map(|i| seasonal_means[i % period]).collect();
    let var_total = variance(x);
    if var_total <= 0.0 {
        return None;
    }
    let strength = variance(&seasonal_series) / var_total;

    let amplitude = seasonal_means.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        - seasonal_means.iter().copied().fold(f64::INFINITY, f64::min);

    Some(SeasonalDecomposition { strength, seasonal_means, amplitude })
}

/// Centered moving average; a 2-by-window pass for even windows
fn centered_moving_average(x: &[f64], window: usize) -> Vec<Option<f64>> {
    let n = x.len();
    let mut out = vec![None; n];
    if window % 2 == 1 {
        let half = window / 2;
        for i in half..n.saturating_sub(half) {
            out[i] = Some(x[i - half..=i + half].iter().sum::<f64>() / window as f64);
        }
    } else {
        // Average of two staggered windows, standard for even periods
        let half = window / 2;
        for i in half..n.saturating_sub(half) {
            let first: f64 = x[i - half..i + half].iter().sum::<f64>() / window as f64;
            let second: f64 = x[i - half + 1..=i + half].iter().sum::<f64>() / window as f64;
            out[i] = Some((first + second) / 2.0);
        }
    }
    out
}

/// Centered rolling mean used by change-point detection
pub fn rolling_mean_centered(x: &[f64], window: usize) -> Vec<Option<f64>> {
    let n = x.len();
    let mut out = vec![None; n];
    let half = window / 2;
    for i in 0..n {
        let lo = i.saturating_sub(half);
        let hi = (i + half + 1).min(n);
        if hi - lo >= window.min(n) || (i >= half && i + half < n) {
            out[i] = Some(x[lo..hi].iter().sum::<f64>() / (hi - lo) as f64);
        }
    }
    out
}

// ============================================================================
// Anomaly scoring (isolation forest, LOF, KNN)
// ============================================================================

/// Standardize each feature column to zero mean, unit variance
pub fn standardize(data: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(first) = data.first() else {
        return Vec::new();
    };
    let dims = first.len();
    let mut means = vec![0.0; dims];
    let mut stds = vec![0.0; dims];
    for d in 0..dims {
        let col: Vec<f64> = data.iter().map(|row| row[d]).collect();
        means[d] = mean(&col);
        let s = std_dev(&col);
        stds[d] = if s > 0.0 { s } else { 1.0 };
    }
    data.iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(d, v)| (v - means[d]) / stds[d])
                .collect()
        })
        .collect()
}

enum IsoNode {
    Internal { feature: usize, split: f64, left: Box<IsoNode>, right: Box<IsoNode> },
    External { size: usize },
}

/// Isolation forest anomaly scores in (0, 1]; higher means more isolated.
/// Seeded, so scores are reproducible for a given input.
pub fn isolation_forest_scores(data: &[Vec<f64>], seed: u64) -> Vec<f64> {
    let n = data.len();
    if n < 2 {
        return vec![0.5; n];
    }
    let n_trees = 100;
    let sample_size = n.min(256);
    let depth_limit = (sample_size as f64).log2().ceil() as usize;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut path_sums = vec![0.0; n];
    for _ in 0..n_trees {
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        indices.truncate(sample_size);

        let tree = build_iso_tree(data, &indices, 0, depth_limit, &mut rng);
        for (i, row) in data.iter().enumerate() {
            path_sums[i] += iso_path_length(&tree, row, 0);
        }
    }

    let c = average_path_length(sample_size);
    path_sums
        .iter()
        .map(|sum| {
            let avg = sum / n_trees as f64;
            (2.0_f64).powf(-avg / c)
        })
        .collect()
}

fn build_iso_tree(
    data: &[Vec<f64>],
    indices: &[usize],
    depth: usize,
    depth_limit: usize,
    rng: &mut ChaCha8Rng,
) -> IsoNode {
    if indices.len() <= 1 || depth >= depth_limit {
        return IsoNode::External { size: indices.len() };
    }
    let dims = data[0].len();
    let feature = rng.gen_range(0..dims);

    let lo = indices
        .iter()
        .map(|&i| data[i][feature])
        .fold(f64::INFINITY, f64::min);
    let hi = indices
        .iter()
        .map(|&i| data[i][feature])
        .fold(f64::NEG_INFINITY, f64::max);
    if !(hi > lo) {
        return IsoNode::External { size: indices.len() };
    }

    let split = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) =
        indices.iter().copied().partition(|&i| data[i][feature] < split);

    IsoNode::Internal {
        feature,
        split,
        left: Box::new(build_iso_tree(data, &left, depth + 1, depth_limit, rng)),
        right: Box::new(build_iso_tree(data, &right, depth + 1, depth_limit, rng)),
    }
}

fn iso_path_length(node: &IsoNode, row: &[f64], depth: usize) -> f64 {
    match node {
        IsoNode::External { size } => depth as f64 + average_path_length(*size),
        IsoNode::Internal { feature, split, left, right } => {
            if row[*feature] < *split {
                iso_path_length(left, row, depth + 1)
            } else {
                iso_path_length(right, row, depth + 1)
            }
        },
    }
}

/// Expected path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let nf = n as f64;
    let harmonic = (nf - 1.0).ln() + 0.577_215_664_901_532_9;
    2.0 * harmonic - 2.0 * (nf - 1.0) / nf
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Local outlier factor; values near 1 are inliers, larger is more outlying
pub fn lof_scores(data: &[Vec<f64>], k: usize) -> Vec<f64> {
    let n = data.len();
    if n < 3 {
        return vec![1.0; n];
    }
    let k = k.min(n - 1).max(1);

    // Sorted neighbour lists (skipping self)
    let mut neighbours: Vec<Vec<(usize, f64)>> = Vec::with_capacity(n);
    for i in 0..n {
        let mut dists: Vec<(usize, f64)> = (0..n)
            .filter(|&j| j != i)
            .map(|j| (j, euclidean(&data[i], &data[j])))
            .collect();
        dists.sort_by(|a, b| a.1.total_cmp(&b.1));
        dists.truncate(k);
        neighbours.push(dists);
    }

    let k_distance: Vec<f64> = neighbours
        .iter()
        .map(|nb| nb.last().map(|(_, d)| *d).unwrap_or(0.0))
        .collect();

    // Local reachability density
    let lrd: Vec<f64> = (0..n)
        .map(|i| {
            let reach_sum: f64 = neighbours[i]
                .iter()
                .map(|&(j, d)| d.max(k_distance[j]))
                .sum();
            if reach_sum <= 0.0 {
                f64::INFINITY
            } else {
                neighbours[i].len() as f64 / reach_sum
            }
        })
        .collect();

    (0..n)
        .map(|i| {
            if lrd[i].is_infinite() {
                return 1.0;
            }
            let ratio_sum: f64 = neighbours[i]
                .iter()
                .map(|&(j, _)| if lrd[j].is_infinite() { 1.0 } else { lrd[j] / lrd[i] })
                .sum();
            ratio_sum / neighbours[i].len() as f64
        })
        .collect()
}

/// Mean distance to the k nearest neighbours
pub fn knn_scores(data: &[Vec<f64>], k: usize) -> Vec<f64> {
    let n = data.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let k = k.min(n - 1).max(1);

    (0..n)
        .map(|i| {
            let mut dists: Vec<f64> = (0..n)
                .filter(|&j| j != i)
                .map(|j| euclidean(&data[i], &data[j]))
                .collect();
            dists.sort_by(|a, b| a.total_cmp(b));
            dists[..k].iter().sum::<f64>() / k as f64
        })
        .collect()
}

// ============================================================================
// Mutual information (quantile-binned)
// ============================================================================

/// Assign each value to one of up to `bins` quantile bins
pub fn quantile_bins(x: &[f64], bins: usize) -> Vec<usize> {
    if x.is_empty() || bins < 2 {
        return vec![0; x.len()];
    }
    let mut edges: Vec<f64> = (1..bins).map(|i| quantile(x, i as f64 / bins as f64)).collect();
    edges.dedup_by(|a, b| a == b);
    x.iter()
        .map(|&v| edges.iter().filter(|&&e| v > e).count())
        .collect()
}

/// Shannon entropy (nats) of a discrete assignment
pub fn entropy_of_bins(assignments: &[usize]) -> f64 {
    if assignments.is_empty() {
        return 0.0;
    }
    let mut counts = std::collections::HashMap::new();
    for &a in assignments {
        *counts.entry(a).or_insert(0usize) += 1;
    }
    let n = assignments.len() as f64;
    counts
        .values()
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.ln()
        })
        .sum()
}

/// Binned mutual information (nats) between two continuous variables
pub fn mutual_information(x: &[f64], y: &[f64], bins: usize) -> f64 {
    let n = x.len().min(y.len());
    if n < 4 {
        return 0.0;
    }
    let bx = quantile_bins(&x[..n], bins);
    let by = quantile_bins(&y[..n], bins);

    let mut joint = std::collections::HashMap::new();
    let mut px = std::collections::HashMap::new();
    let mut py = std::collections::HashMap::new();
    for i in 0..n {
        *joint.entry((bx[i], by[i])).or_insert(0usize) += 1;
        *px.entry(bx[i]).or_insert(0usize) += 1;
        *py.entry(by[i]).or_insert(0usize) += 1;
    }

    let nf = n as f64;
    joint
        .iter()
        .map(|(&(i, j), &c)| {
            let pxy = c as f64 / nf;
            let pi = px[&i] as f64 / nf;
            let pj = py[&j] as f64 / nf;
            pxy * (pxy / (pi * pj)).ln()
        })
        .sum::<f64>()
        .max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_normal(n: usize, mean: f64, std: f64, seed: u64) -> Vec<f64> {
        // Box-Muller over a seeded uniform stream
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let u1: f64 = rng.r#gen::<f64>().max(1e-12);
                let u2: f64 = rng.r#gen();
                mean + std
                    * (-2.0 * u1.ln()).sqrt()
                    * (2.0 * std::f64::consts::PI * u2).cos()
            })
            .collect()
    }

    #[test]
    fn test_describe_basics() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let summary = describe(&x);
        assert!((summary.mean - 3.0).abs() < 1e-12);
        assert!((summary.median - 3.0).abs() < 1e-12);
        assert!((summary.q1 - 2.0).abs() < 1e-12);
        assert!((summary.q3 - 4.0).abs() < 1e-12);
        assert!((summary.std - (2.5_f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_perfect_correlation() {
        let x: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        let (r, p) = pearson(&x, &y);
        assert!((r - 1.0).abs() < 1e-9);
        assert!(p < 1e-9);
    }

    #[test]
    fn test_spearman_monotonic() {
        let x: Vec<f64> = (1..60).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| v.powi(3)).collect();
        let (rho, p) = spearman(&x, &y);
        assert!(rho > 0.999);
        assert!(p < 0.001);
    }

    #[test]
    fn test_normal_omnibus_accepts_normal_data() {
        let x = seeded_normal(500, 10.0, 2.0, 7);
        let (_, p) = normal_omnibus_test(&x).unwrap();
        assert!(p > 0.01, "normal data should pass the omnibus test, p = {}", p);
    }

    #[test]
    fn test_normal_omnibus_rejects_skewed_data() {
        let x: Vec<f64> = seeded_normal(500, 0.0, 1.0, 9)
            .into_iter()
            .map(|v| v.exp())
            .collect();
        let (_, p) = normal_omnibus_test(&x).unwrap();
        assert!(p < 0.05, "log-normal data should fail the omnibus test, p = {}", p);
    }

    #[test]
    fn test_gmm_prefers_two_components_for_bimodal() {
        let mut x = seeded_normal(200, 0.0, 1.0, 3);
        x.extend(seeded_normal(200, 12.0, 1.0, 4));
        let one = fit_gmm(&x, 1).unwrap();
        let two = fit_gmm(&x, 2).unwrap();
        assert!(two.bic < one.bic);
    }

    #[test]
    fn test_adf_detects_stationary_noise() {
        let x = seeded_normal(300, 0.0, 1.0, 11);
        let result = adf_test(&x).unwrap();
        assert!(result.p_value < 0.05);
    }

    #[test]
    fn test_adf_random_walk_not_stationary() {
        // Random walk with drift
        let noise = seeded_normal(300, 0.0, 1.0, 13);
        let mut walk = Vec::with_capacity(noise.len());
        let mut acc = 0.0;
        for e in noise {
            acc += e + 0.2;
            walk.push(acc);
        }
        let result = adf_test(&walk).unwrap();
        assert!(result.p_value > 0.05);
    }

    #[test]
    fn test_kpss_level_stationary() {
        let x = seeded_normal(300, 5.0, 1.0, 17);
        let result = kpss_test(&x).unwrap();
        assert!(result.p_value > 0.05);
    }

    #[test]
    fn test_ljung_box_flags_autocorrelated_series() {
        let x: Vec<f64> = (0..200)
            .map(|i| (i as f64 * std::f64::consts::PI / 6.0).sin())
            .collect();
        let rows = ljung_box(&x, 20);
        assert!(rows.iter().any(|r| r.p_value < 0.05));
    }

    #[test]
    fn test_seasonal_decomposition_strength() {
        let x: Vec<f64> = (0..168)
            .map(|i| 50.0 + 10.0 * (2.0 * std::f64::consts::PI * i as f64 / 24.0).sin())
            .collect();
        let decomp = seasonal_decompose_additive(&x, 24).unwrap();
        assert!(decomp.strength > 0.9);
        assert!(decomp.amplitude > 15.0);
    }

    #[test]
    fn test_isolation_forest_isolates_spike() {
        let mut data: Vec<Vec<f64>> = seeded_normal(200, 50.0, 2.0, 21)
            .into_iter()
            .map(|v| vec![v])
            .collect();
        data[100] = vec![200.0];
        let scores = isolation_forest_scores(&data, 42);
        let max_idx = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap()
            .0;
        assert_eq!(max_idx, 100);
    }

    #[test]
    fn test_isolation_forest_deterministic() {
        let data: Vec<Vec<f64>> = seeded_normal(100, 0.0, 1.0, 23)
            .into_iter()
            .map(|v| vec![v])
            .collect();
        let a = isolation_forest_scores(&data, 42);
        let b = isolation_forest_scores(&data, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn test_lof_flags_isolated_point() {
        let mut data: Vec<Vec<f64>> = (0..100).map(|i| vec![(i % 10) as f64]).collect();
        data.push(vec![500.0]);
        let scores = lof_scores(&data, 10);
        assert!(scores[100] > scores[0]);
    }

    #[test]
    fn test_mutual_information_dependence() {
        let x: Vec<f64> = (0..500).map(|i| i as f64 / 10.0 - 25.0).collect();
        let y: Vec<f64> = x.iter().map(|v| v * v).collect();
        let noise = seeded_normal(500, 0.0, 1.0, 29);

        let dependent = mutual_information(&x, &y, 10);
        let independent = mutual_information(&x, &noise, 10);
        assert!(dependent > independent);
        assert!(dependent > 0.5);
    }

    #[test]
    fn test_ranks_with_ties() {
        let r = ranks(&[10.0, 20.0, 20.0, 30.0]);
        assert_eq!(r, vec![1.0, 2.5, 2.5, 4.0]);
    }
}
