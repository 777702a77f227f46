//! Two-sample significance testing for version comparisons.
//!
//! Implements Welch's unequal-variance t-test with a practical p-value
//! approximation: a normal-distribution tail via the Abramowitz–Stegun
//! error-function series for large degrees of freedom, and a
//! continued-fraction regularized incomplete beta for small ones. This is
//! a pragmatic approximation, not a certified statistics library.

use serde::{Deserialize, Serialize};

use crate::runner::CaseResult;

/// Result of one Welch's t-test between two samples.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TTestResult {
    pub mean_a: f64,
    pub mean_b: f64,
    /// `mean_b - mean_a`; positive means B is larger.
    pub difference: f64,
    pub p_value: f64,
    pub significant: bool,
    /// 95% confidence interval for the difference, `[low, high]`.
    pub confidence_interval: (f64, f64),
    pub sample_size_a: usize,
    pub sample_size_b: usize,
}

/// Per-metric comparison bundle between two versions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparisonStatistics {
    pub latency: TTestResult,
    pub cost: TTestResult,
    pub tokens: TTestResult,
}

fn mean(sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    sample.iter().sum::<f64>() / sample.len() as f64
}

/// Sample standard deviation with the n−1 denominator; 0 when n ≤ 1.
fn sample_std_dev(sample: &[f64], mean: f64) -> f64 {
    let n = sample.len();
    if n <= 1 {
        return 0.0;
    }
    let variance = sample.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    variance.sqrt()
}

/// Welch's two-sample t-test for unequal variances.
pub fn welch_t_test(sample_a: &[f64], sample_b: &[f64]) -> TTestResult {
    let n_a = sample_a.len();
    let n_b = sample_b.len();
    let mean_a = mean(sample_a);
    let mean_b = mean(sample_b);
    let difference = mean_b - mean_a;

    let std_a = sample_std_dev(sample_a, mean_a);
    let std_b = sample_std_dev(sample_b, mean_b);

    let se_a = if n_a > 0 { std_a / (n_a as f64).sqrt() } else { 0.0 };
    let se_b = if n_b > 0 { std_b / (n_b as f64).sqrt() } else { 0.0 };
    let pooled_se = (se_a * se_a + se_b * se_b).sqrt();

    let t = if pooled_se == 0.0 { 0.0 } else { difference / pooled_se };

    let df = welch_satterthwaite_df(std_a, std_b, n_a, n_b);
    let p_value = two_tailed_p(t, df);
    let margin = critical_t(df) * pooled_se;

    TTestResult {
        mean_a,
        mean_b,
        difference,
        p_value,
        significant: p_value < 0.05,
        confidence_interval: (difference - margin, difference + margin),
        sample_size_a: n_a,
        sample_size_b: n_b,
    }
}

/// Welch–Satterthwaite degrees of freedom. Falls back to the pooled
/// `nA + nB − 2` when either sample has zero variance (degenerate inputs
/// must not divide by zero).
fn welch_satterthwaite_df(std_a: f64, std_b: f64, n_a: usize, n_b: usize) -> f64 {
    if std_a == 0.0 || std_b == 0.0 || n_a <= 1 || n_b <= 1 {
        return (n_a + n_b) as f64 - 2.0;
    }
    let var_a = std_a * std_a / n_a as f64;
    let var_b = std_b * std_b / n_b as f64;
    let numerator = (var_a + var_b).powi(2);
    let denominator =
        var_a * var_a / (n_a as f64 - 1.0) + var_b * var_b / (n_b as f64 - 1.0);
    if denominator == 0.0 {
        return (n_a + n_b) as f64 - 2.0;
    }
    numerator / denominator
}

/// Two-tailed p-value for a t statistic with `df` degrees of freedom.
///
/// For df > 30 the t-distribution is close enough to normal that the
/// erf-series tail is used; for small df the Student CDF is evaluated
/// through the regularized incomplete beta. Always capped at 1.
fn two_tailed_p(t: f64, df: f64) -> f64 {
    if df <= 0.0 {
        return 1.0;
    }
    let p = if df > 30.0 {
        erfc(t.abs() / std::f64::consts::SQRT_2)
    } else {
        // P(|T| > t) = I_x(df/2, 1/2) with x = df / (df + t²).
        let x = df / (df + t * t);
        incomplete_beta(df / 2.0, 0.5, x)
    };
    p.clamp(0.0, 1.0)
}

/// Complementary error function via the Abramowitz–Stegun 7.1.26 series
/// (maximum absolute error ~1.5e-7, ample for a 0.05 threshold).
fn erfc(x: f64) -> f64 {
    let sign_negative = x < 0.0;
    let x = x.abs();

    const P: f64 = 0.327_591_1;
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;

    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    let erfc = poly * (-x * x).exp();

    if sign_negative {
        2.0 - erfc
    } else {
        erfc
    }
}

/// Natural log of the gamma function (Lanczos approximation).
fn ln_gamma(x: f64) -> f64 {
    const COF: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_9e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000_000_000_190_015;
    for c in COF {
        y += 1.0;
        ser += c / y;
    }
    -tmp + (2.506_628_274_631_000_5 * ser / x).ln()
}

const BETA_MAX_ITER: usize = 200;
const BETA_EPS: f64 = 1e-10;

/// Continued-fraction kernel for the incomplete beta (modified Lentz).
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const FPMIN: f64 = 1e-30;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < FPMIN {
        d = FPMIN;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=BETA_MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;

        if (del - 1.0).abs() < BETA_EPS {
            break;
        }
    }
    h
}

/// Regularized incomplete beta function I_x(a, b).
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Exact two-tailed 95% critical values for integer df 1–30.
const CRITICAL_T_TABLE: [f64; 30] = [
    12.706, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228, 2.201, 2.179, 2.160,
    2.145, 2.131, 2.120, 2.110, 2.101, 2.093, 2.086, 2.080, 2.074, 2.069, 2.064, 2.060, 2.056,
    2.052, 2.048, 2.045, 2.042,
];

/// Anchor points above the exact table; beyond df 100 the normal 1.96.
const CRITICAL_T_ANCHORS: [(f64, f64); 5] = [
    (30.0, 2.042),
    (40.0, 2.021),
    (60.0, 2.000),
    (80.0, 1.990),
    (100.0, 1.984),
];

/// Two-tailed 95% critical t value for `df` degrees of freedom: tabulated
/// for df 1–30 with linear interpolation between adjacent integers, anchor
/// interpolation up to 100, and 1.96 beyond.
fn critical_t(df: f64) -> f64 {
    if df <= 1.0 {
        return CRITICAL_T_TABLE[0];
    }
    if df > 100.0 {
        return 1.96;
    }
    if df <= 30.0 {
        let lower = df.floor() as usize;
        let upper = df.ceil() as usize;
        let t_lower = CRITICAL_T_TABLE[lower - 1];
        let t_upper = CRITICAL_T_TABLE[upper - 1];
        if lower == upper {
            return t_lower;
        }
        let frac = df - lower as f64;
        return t_lower + frac * (t_upper - t_lower);
    }
    for window in CRITICAL_T_ANCHORS.windows(2) {
        let (df_lo, t_lo) = window[0];
        let (df_hi, t_hi) = window[1];
        if df <= df_hi {
            let frac = (df - df_lo) / (df_hi - df_lo);
            return t_lo + frac * (t_hi - t_lo);
        }
    }
    1.96
}

/// Compare two versions' result sets metric by metric.
///
/// Only successful cases contribute samples, so the reported sample sizes
/// may differ between A and B (and from the dataset size).
pub fn compare_versions(results_a: &[CaseResult], results_b: &[CaseResult]) -> ComparisonStatistics {
    let successes = |results: &[CaseResult]| -> Vec<CaseResult> {
        results.iter().filter(|r| r.success).cloned().collect()
    };
    let a = successes(results_a);
    let b = successes(results_b);

    let extract = |results: &[CaseResult], f: fn(&CaseResult) -> f64| -> Vec<f64> {
        results.iter().map(f).collect()
    };

    ComparisonStatistics {
        latency: welch_t_test(
            &extract(&a, |r| r.latency_ms),
            &extract(&b, |r| r.latency_ms),
        ),
        cost: welch_t_test(&extract(&a, |r| r.cost), &extract(&b, |r| r.cost)),
        tokens: welch_t_test(
            &extract(&a, |r| (r.input_tokens + r.output_tokens) as f64),
            &extract(&b, |r| (r.input_tokens + r.output_tokens) as f64),
        ),
    }
}
